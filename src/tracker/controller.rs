use std::{sync::Arc, time::Duration};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    geo::Coordinate,
    geolocation::{GeoUpdate, GeolocationError, GeolocationSource, PermissionState, PositionWatch},
    territory::{CaptureEvent, TerritoryStore},
};

use super::{PositionOutcome, TrackingSession, TrackingStatus, WalkSummary};

const ENABLE_LOGS: bool = true;
use crate::{log_debug, log_error, log_info, log_warn};

/// Fixes closer than this to the previous accepted fix are GPS noise.
pub const MIN_MOVE_METERS: f64 = 3.0;

const EVENT_CAPACITY: usize = 512;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("cannot {action} while {}", from.as_str())]
    InvalidTransition {
        from: TrackingStatus,
        action: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub tick_interval: Duration,
    pub min_move_meters: f64,
    /// Emit a heartbeat event every N ticks.
    pub heartbeat_every_ticks: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            min_move_meters: MIN_MOVE_METERS,
            heartbeat_every_ticks: 10,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct GeoStatus {
    position: Option<Coordinate>,
    error: Option<GeolocationError>,
    permission_state: PermissionState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSnapshot {
    pub session: TrackingSession,
    /// Latest raw fix, accepted or not. Map centre.
    pub position: Option<Coordinate>,
    pub error: Option<GeolocationError>,
    pub permission_state: PermissionState,
    /// Last failed tile write of this walk, if any.
    pub capture_error: Option<String>,
    pub new_tiles: usize,
    pub total_tiles: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum TrackerEvent {
    StateChanged(TrackerSnapshot),
    #[serde(rename_all = "camelCase")]
    Heartbeat {
        elapsed_seconds: u64,
        distance_meters: f64,
    },
    #[serde(rename_all = "camelCase")]
    PositionAccepted {
        position: Coordinate,
        distance_meters: f64,
    },
    #[serde(rename_all = "camelCase")]
    PositionRejected { distance_m: f64 },
    TileCaptured(CaptureEvent),
    /// The fix stays on the path; only its tile was not saved.
    #[serde(rename_all = "camelCase")]
    CaptureFailed { position: Coordinate, message: String },
    #[serde(rename_all = "camelCase")]
    GeolocationStatus {
        permission_state: PermissionState,
        error: Option<GeolocationError>,
    },
    SessionCompleted(WalkSummary),
}

struct PositionPump {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

/// Drives one walk at a time: subscribes to the position source, filters and
/// accumulates fixes, ticks the clock, and hands accepted fixes to the
/// territory store.
#[derive(Clone)]
pub struct TrackerController {
    state: Arc<Mutex<TrackingSession>>,
    territory: Arc<Mutex<TerritoryStore>>,
    source: Arc<dyn GeolocationSource>,
    geo: Arc<Mutex<GeoStatus>>,
    capture_error: Arc<Mutex<Option<String>>>,
    /// Serializes start/stop/reset.
    transition: Arc<Mutex<()>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    pump: Arc<Mutex<Option<PositionPump>>>,
    events: broadcast::Sender<TrackerEvent>,
    config: TrackerConfig,
}

impl TrackerController {
    pub fn new(
        territory: Arc<Mutex<TerritoryStore>>,
        source: Arc<dyn GeolocationSource>,
        config: TrackerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let geo = GeoStatus {
            permission_state: source.permission_state(),
            ..GeoStatus::default()
        };

        Self {
            state: Arc::new(Mutex::new(TrackingSession::new())),
            territory,
            source,
            geo: Arc::new(Mutex::new(geo)),
            capture_error: Arc::new(Mutex::new(None)),
            transition: Arc::new(Mutex::new(())),
            ticker: Arc::new(Mutex::new(None)),
            pump: Arc::new(Mutex::new(None)),
            events,
            config,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    pub fn territory(&self) -> Arc<Mutex<TerritoryStore>> {
        self.territory.clone()
    }

    pub async fn status(&self) -> TrackingStatus {
        self.state.lock().await.status
    }

    pub async fn get_state(&self) -> TrackingSession {
        self.state.lock().await.clone()
    }

    pub async fn snapshot(&self) -> TrackerSnapshot {
        let session = self.state.lock().await.clone();
        let geo = self.geo.lock().await.clone();
        let capture_error = self.capture_error.lock().await.clone();
        let (new_tiles, total_tiles) = {
            let territory = self.territory.lock().await;
            (territory.session_count(), territory.total_count())
        };

        TrackerSnapshot {
            session,
            position: geo.position,
            error: geo.error,
            permission_state: geo.permission_state,
            capture_error,
            new_tiles,
            total_tiles,
        }
    }

    /// `idle -> tracking`.
    pub async fn start(&self) -> Result<TrackingSession, TrackerError> {
        let _transition = self.transition.lock().await;

        let session = {
            let mut state = self.state.lock().await;
            if state.status != TrackingStatus::Idle {
                return Err(TrackerError::InvalidTransition {
                    from: state.status,
                    action: "start",
                });
            }

            let session_id = Uuid::new_v4().to_string();
            state.begin(session_id.clone(), Utc::now());
            self.territory.lock().await.reset_session();
            log_info!("walk {session_id} started");
            state.clone()
        };

        {
            let mut geo = self.geo.lock().await;
            geo.error = None;
            geo.permission_state = self.source.permission_state();
        }
        *self.capture_error.lock().await = None;

        let watch = self.source.watch().await;
        self.spawn_pump(watch).await;
        self.spawn_ticker().await;

        self.emit_state_changed().await;
        Ok(session)
    }

    /// `tracking -> summary`. Once this returns no further fix or tick is
    /// applied to the walk.
    pub async fn stop(&self) -> Result<WalkSummary, TrackerError> {
        let _transition = self.transition.lock().await;

        {
            let state = self.state.lock().await;
            if !state.is_tracking() {
                return Err(TrackerError::InvalidTransition {
                    from: state.status,
                    action: "stop",
                });
            }
        }

        // drains the fix in flight, if any, before the walk is closed
        self.stop_pump().await;

        let summary = {
            let mut state = self.state.lock().await;
            state.finish(Utc::now());
            let territory = self.territory.lock().await;
            WalkSummary::from_session(&state, territory.session_count(), territory.total_count())
        };

        self.stop_ticker().await;

        log_info!(
            "walk {} stopped: {:.1} m in {} s, {} new tiles",
            summary.id,
            summary.distance_meters,
            summary.elapsed_seconds,
            summary.new_tiles
        );

        self.emit_state_changed().await;
        self.emit(TrackerEvent::SessionCompleted(summary.clone()));
        Ok(summary)
    }

    /// `summary -> idle`.
    pub async fn new_walk(&self) -> Result<(), TrackerError> {
        let _transition = self.transition.lock().await;
        {
            let mut state = self.state.lock().await;
            if state.status != TrackingStatus::Summary {
                return Err(TrackerError::InvalidTransition {
                    from: state.status,
                    action: "begin a new walk",
                });
            }
            state.reset();
        }
        self.emit_state_changed().await;
        Ok(())
    }

    /// Back to `idle` from any state. A walk in progress is discarded without
    /// a summary. Captured territory is never touched.
    pub async fn reset(&self) {
        let _transition = self.transition.lock().await;
        let was_tracking = {
            let mut state = self.state.lock().await;
            let was_tracking = state.is_tracking();
            state.reset();
            was_tracking
        };

        if was_tracking {
            self.stop_pump().await;
            self.stop_ticker().await;
            log_warn!("walk in progress discarded by reset");
        }
        self.emit_state_changed().await;
    }

    /// Applies one fix. Called by the position pump; callers that own their
    /// own stream may call it directly.
    ///
    /// The session lock is released before the tile is written, so a slow
    /// port never holds up the clock.
    pub async fn handle_position(&self, position: Coordinate) -> PositionOutcome {
        let (outcome, distance_meters) = {
            let mut state = self.state.lock().await;
            let outcome = state.accept_position(position, self.config.min_move_meters);
            (outcome, state.distance_meters)
        };

        match outcome {
            PositionOutcome::Accepted { .. } => {
                let capture = self
                    .territory
                    .lock()
                    .await
                    .capture_tile(position.lat, position.lng)
                    .await;
                match capture {
                    Ok(capture) => {
                        if let Some(event) = capture.event {
                            self.emit(TrackerEvent::TileCaptured(event));
                        }
                    }
                    Err(err) => {
                        log_error!(
                            "tile capture failed at ({}, {}): {err:?}",
                            position.lat,
                            position.lng
                        );
                        let message = format!("{err:#}");
                        *self.capture_error.lock().await = Some(message.clone());
                        self.emit(TrackerEvent::CaptureFailed { position, message });
                    }
                }
                self.emit(TrackerEvent::PositionAccepted {
                    position,
                    distance_meters,
                });
            }
            PositionOutcome::Rejected { distance_m } => {
                log_debug!("jitter {distance_m:.2} m ignored");
                self.emit(TrackerEvent::PositionRejected { distance_m });
            }
            PositionOutcome::Invalid => {
                log_warn!("ignoring invalid fix ({}, {})", position.lat, position.lng);
            }
            PositionOutcome::Ignored => {}
        }

        outcome
    }

    async fn apply_update(&self, update: GeoUpdate) {
        match update {
            GeoUpdate::Position(position) => {
                {
                    let mut geo = self.geo.lock().await;
                    geo.position = Some(position);
                    geo.error = None;
                    if geo.permission_state == PermissionState::Prompt {
                        geo.permission_state = PermissionState::Granted;
                    }
                }
                self.handle_position(position).await;
            }
            GeoUpdate::Permission(permission_state) => {
                let error = {
                    let mut geo = self.geo.lock().await;
                    geo.permission_state = permission_state;
                    geo.error.clone()
                };
                self.emit(TrackerEvent::GeolocationStatus {
                    permission_state,
                    error,
                });
            }
            GeoUpdate::Error(error) => {
                log_warn!("geolocation error: {error}");
                let permission_state = {
                    let mut geo = self.geo.lock().await;
                    if let Some(permission_state) = error.permission_state() {
                        geo.permission_state = permission_state;
                    }
                    geo.error = Some(error.clone());
                    geo.permission_state
                };
                self.emit(TrackerEvent::GeolocationStatus {
                    permission_state,
                    error: Some(error),
                });
            }
        }
    }

    async fn spawn_pump(&self, mut watch: PositionWatch) {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let controller = self.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    update = watch.recv() => match update {
                        Some(update) => controller.apply_update(update).await,
                        None => {
                            log_warn!("position stream closed by source");
                            break;
                        }
                    },
                }
            }
        });

        let previous = self.pump.lock().await.replace(PositionPump {
            handle,
            cancel_token,
        });
        if let Some(previous) = previous {
            previous.cancel_token.cancel();
        }
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let state = self.state.clone();
        let events = self.events.clone();
        let tick_interval = self.config.tick_interval;
        let heartbeat_every_ticks = self.config.heartbeat_every_ticks.max(1);

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + tick_interval, tick_interval);
            let mut ticks: u32 = 0;

            loop {
                interval.tick().await;

                let (elapsed_seconds, distance_meters) = {
                    let mut state = state.lock().await;
                    if !state.tick() {
                        break;
                    }
                    (state.elapsed_seconds, state.distance_meters)
                };

                ticks = ticks.wrapping_add(1);
                if ticks % heartbeat_every_ticks == 0 {
                    let _ = events.send(TrackerEvent::Heartbeat {
                        elapsed_seconds,
                        distance_meters,
                    });
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    /// Cancels the pump and waits for it, so no fix is applied afterwards.
    async fn stop_pump(&self) {
        let pump = self.pump.lock().await.take();
        if let Some(pump) = pump {
            pump.cancel_token.cancel();
            if let Err(err) = pump.handle.await {
                if !err.is_cancelled() {
                    log_error!("position pump failed: {err}");
                }
            }
        }
    }

    async fn stop_ticker(&self) {
        let ticker = self.ticker.lock().await.take();
        if let Some(handle) = ticker {
            handle.abort();
        }
    }

    async fn emit_state_changed(&self) {
        let snapshot = self.snapshot().await;
        self.emit(TrackerEvent::StateChanged(snapshot));
    }

    fn emit(&self, event: TrackerEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}
