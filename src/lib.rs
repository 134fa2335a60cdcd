pub mod auth;
pub mod config;
pub mod db;
pub mod geo;
pub mod geolocation;
pub mod lobby;
pub mod storage;
pub mod territory;
pub mod tracker;
pub mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{broadcast::error::RecvError, Mutex};

use auth::AccountStore;
use config::AppConfig;
use db::{Database, WalkRecord};
use geo::Coordinate;
use geolocation::{GeolocationSource, SimulatedWalk, SimulatedWalkConfig};
use storage::KeyValueStore;
use territory::{seed::DEMO_CENTER, SeedPolicy, TerritoryStore};
use tracker::{TrackerController, TrackerEvent, WalkSummary};

const ENABLE_LOGS: bool = true;

/// Everything a front end needs, wired to one database.
pub struct App {
    pub db: Database,
    pub accounts: AccountStore,
    pub tracker: TrackerController,
    pub config: AppConfig,
}

impl App {
    pub async fn open(config: AppConfig, source: Arc<dyn GeolocationSource>) -> Result<Self> {
        let database = Database::new(config.database_path())?;
        Self::with_database(config, database, source).await
    }

    pub async fn with_database(
        config: AppConfig,
        database: Database,
        source: Arc<dyn GeolocationSource>,
    ) -> Result<Self> {
        let port: Arc<dyn KeyValueStore> = Arc::new(database.clone());

        let seed = if config.seed_demo {
            SeedPolicy::DemoWhenEmpty
        } else {
            SeedPolicy::Never
        };
        let territory = TerritoryStore::load(port.clone(), seed)
            .await
            .context("failed to load territories")?;
        let accounts = AccountStore::load(port)
            .await
            .context("failed to load accounts")?;
        let tracker = TrackerController::new(
            Arc::new(Mutex::new(territory)),
            source,
            config.tracker_config(),
        );

        Ok(Self {
            db: database,
            accounts,
            tracker,
            config,
        })
    }

    /// Stops the walk, credits it to the logged-in user and records it in the
    /// walk history.
    pub async fn finish_walk(&self) -> Result<WalkSummary> {
        let summary = self.tracker.stop().await?;
        let user = self.accounts.current_user().await;

        if user.is_some() && summary.has_activity() {
            if let Err(err) = self
                .accounts
                .update_stats(summary.distance_meters, summary.elapsed_seconds)
                .await
            {
                log_warn!("walk {} not added to profile totals: {err}", summary.id);
            }
        }

        let record = WalkRecord::from_summary(&summary, user.map(|user| user.username), Utc::now());
        self.db
            .insert_walk(&record)
            .await
            .with_context(|| format!("failed to record walk {}", summary.id))?;

        Ok(summary)
    }
}

/// Runs a simulated walk against the local data directory and prints the
/// summary.
pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("TerraTrail starting up...");

    let config = AppConfig::from_env()?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(simulated_walk(config))
}

async fn simulated_walk(config: AppConfig) -> Result<()> {
    let source = Arc::new(SimulatedWalk::new(SimulatedWalkConfig {
        start: Coordinate::new(DEMO_CENTER.0, DEMO_CENTER.1),
        ..SimulatedWalkConfig::default()
    }));
    let walk_duration = config.walk_duration;
    let app = App::open(config, source).await?;

    let mut events = app.tracker.subscribe();
    let reporter = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    log_warn!("event reporter skipped {skipped} events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            match event {
                TrackerEvent::Heartbeat {
                    elapsed_seconds,
                    distance_meters,
                } => log_info!("{elapsed_seconds} s, {distance_meters:.1} m"),
                TrackerEvent::TileCaptured(capture) => log_info!(
                    "captured {} ({} this walk, {} total)",
                    capture.key,
                    capture.session_count,
                    capture.total_count
                ),
                TrackerEvent::GeolocationStatus {
                    error: Some(error), ..
                } => log_warn!("geolocation: {error}"),
                TrackerEvent::SessionCompleted(_) => break,
                _ => {}
            }
        }
    });

    app.tracker.start().await?;
    tokio::time::sleep(walk_duration).await;
    let summary = app.finish_walk().await?;
    if let Err(err) = reporter.await {
        log_warn!("event reporter ended abnormally: {err}");
    }

    println!("Walk {}", summary.id);
    println!("  distance  {} km", summary.display_distance());
    println!("  time      {}", summary.display_duration());
    println!("  new tiles {}", summary.new_tiles);
    println!("  territory {} tiles", summary.total_tiles);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geolocation::ChannelSource;
    use std::path::PathBuf;

    fn test_config() -> AppConfig {
        AppConfig {
            data_dir: PathBuf::from("unused"),
            debug: false,
            seed_demo: false,
            min_move_meters: 3.0,
            walk_duration: std::time::Duration::from_secs(1),
        }
    }

    async fn app(source: Arc<ChannelSource>) -> App {
        let database = Database::in_memory().unwrap();
        App::with_database(test_config(), database, source)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn finished_walk_is_recorded_and_credited() {
        let source = Arc::new(ChannelSource::new());
        let app = app(source).await;
        app.accounts.register("walker", "secret").await.unwrap();

        app.tracker.start().await.unwrap();
        app.tracker.handle_position(Coordinate::new(12.9716, 77.5946)).await;
        app.tracker.handle_position(Coordinate::new(12.9816, 77.5946)).await;
        let summary = app.finish_walk().await.unwrap();

        let user = app.accounts.current_user().await.unwrap();
        assert_eq!(user.stats.total_walks, 1);
        assert_eq!(user.stats.total_distance, summary.distance_meters);

        let walks = app.db.list_walks(10, 0).await.unwrap();
        assert_eq!(walks.len(), 1);
        assert_eq!(walks[0].id, summary.id);
        assert_eq!(walks[0].username.as_deref(), Some("walker"));
        assert_eq!(walks[0].new_tiles, 2);
    }

    #[tokio::test]
    async fn anonymous_walks_are_recorded_without_an_owner() {
        let source = Arc::new(ChannelSource::new());
        let app = app(source).await;

        app.tracker.start().await.unwrap();
        app.tracker.handle_position(Coordinate::new(1.0, 1.0)).await;
        app.finish_walk().await.unwrap();

        let walks = app.db.list_walks(10, 0).await.unwrap();
        assert_eq!(walks.len(), 1);
        assert!(walks[0].username.is_none());
        assert!(!app.accounts.is_authenticated().await);
    }

    #[tokio::test]
    async fn territory_outlives_the_app_handle() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            data_dir: dir.path().to_path_buf(),
            ..test_config()
        };

        {
            let app = App::open(config.clone(), Arc::new(ChannelSource::new()))
                .await
                .unwrap();
            app.tracker.start().await.unwrap();
            app.tracker.handle_position(Coordinate::new(48.8566, 2.3522)).await;
            app.finish_walk().await.unwrap();
        }

        let app = App::open(config, Arc::new(ChannelSource::new())).await.unwrap();
        let territory = app.tracker.territory();
        let territory = territory.lock().await;
        assert_eq!(territory.total_count(), 1);
        assert!(territory.contains("48.857_2.352"));
    }

    #[tokio::test]
    async fn finishing_without_a_walk_is_an_error() {
        let app = app(Arc::new(ChannelSource::new())).await;
        assert!(app.finish_walk().await.is_err());
        assert!(app.db.list_walks(10, 0).await.unwrap().is_empty());
    }
}
