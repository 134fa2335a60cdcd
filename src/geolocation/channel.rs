use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::geo::Coordinate;

use super::{GeoUpdate, GeolocationError, GeolocationSource, PermissionState, PositionWatch};

#[derive(Default)]
struct ChannelInner {
    watcher: Option<mpsc::UnboundedSender<GeoUpdate>>,
    permission: PermissionState,
    last_position: Option<Coordinate>,
}

/// Source driven by its owner: whatever embeds the crate (a device bridge, a
/// replay, a test) pushes fixes and status into it.
#[derive(Default)]
pub struct ChannelSource {
    inner: Mutex<ChannelInner>,
}

impl ChannelSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_permission(permission: PermissionState) -> Self {
        let source = Self::default();
        source.lock().permission = permission;
        source
    }

    /// Returns whether a watcher received it.
    pub fn push_position(&self, lat: f64, lng: f64) -> bool {
        let position = Coordinate::new(lat, lng);
        let mut inner = self.lock();
        inner.last_position = Some(position);
        if inner.permission == PermissionState::Prompt {
            inner.permission = PermissionState::Granted;
        }
        Self::deliver(&mut inner, GeoUpdate::Position(position))
    }

    pub fn push_error(&self, error: GeolocationError) -> bool {
        let mut inner = self.lock();
        if let Some(permission) = error.permission_state() {
            inner.permission = permission;
        }
        Self::deliver(&mut inner, GeoUpdate::Error(error))
    }

    pub fn set_permission(&self, permission: PermissionState) -> bool {
        let mut inner = self.lock();
        inner.permission = permission;
        Self::deliver(&mut inner, GeoUpdate::Permission(permission))
    }

    pub fn is_watched(&self) -> bool {
        self.lock()
            .watcher
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    fn deliver(inner: &mut ChannelInner, update: GeoUpdate) -> bool {
        let Some(tx) = &inner.watcher else {
            return false;
        };
        if tx.send(update).is_ok() {
            return true;
        }
        inner.watcher = None;
        false
    }

    fn lock(&self) -> MutexGuard<'_, ChannelInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl GeolocationSource for ChannelSource {
    fn permission_state(&self) -> PermissionState {
        self.lock().permission
    }

    async fn watch(&self) -> PositionWatch {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        if inner.permission == PermissionState::Denied {
            let _ = tx.send(GeoUpdate::Error(GeolocationError::PermissionDenied));
        }
        // a new watch replaces the previous one, closing its stream
        inner.watcher = Some(tx);
        rx
    }

    async fn current_position(&self) -> Result<Coordinate, GeolocationError> {
        let inner = self.lock();
        match (inner.permission, inner.last_position) {
            (PermissionState::Denied, _) => Err(GeolocationError::PermissionDenied),
            (_, Some(position)) => Ok(position),
            (_, None) => Err(GeolocationError::PositionUnavailable(
                "no fix received yet".into(),
            )),
        }
    }
}
