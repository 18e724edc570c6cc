pub mod boot;
pub mod clock;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod host;
pub mod models;
pub mod platform;
pub mod repeat_days;
pub mod ring;
pub mod scheduler;
pub mod service;
#[cfg(test)]
mod test_utils;
pub mod trigger;
pub mod validation;

use crate::boot::BootRecovery;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db::{migrations, Database};
use crate::host::{spawn_alarm_feed, spawn_reader, spawn_writer, Host, HostEvent, OutgoingMessage};
use crate::platform::{
    AlertSurface, AudioOutput, ChallengePresenter, PermissionProbe, ShellBridge, ThreadTimers,
    WakeLockProvider, WakeTimerBackend,
};
use crate::ring::{RingDelivery, RingPlatform};
use crate::scheduler::{ExactAlarmScheduler, WakeScheduler};
use crate::service::AlarmService;
use log::{error, info, warn};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};

/// Error type for startup failures
#[derive(Debug)]
pub enum InitError {
    NoProjectDirs,
    DataDirCreation(std::io::Error),
    DatabaseOpen(rusqlite::Error),
    Migration(rusqlite::Error),
}

impl std::fmt::Display for InitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitError::NoProjectDirs => write!(f, "Could not determine project directories"),
            InitError::DataDirCreation(e) => write!(f, "Could not create data directory: {e}"),
            InitError::DatabaseOpen(e) => write!(f, "Failed to open database: {e}"),
            InitError::Migration(e) => write!(f, "Failed to run database migrations: {e}"),
        }
    }
}

impl std::error::Error for InitError {}

fn db_path(config: &Config) -> Result<PathBuf, InitError> {
    let path = match &config.database_path {
        Some(path) => path.clone(),
        None => crate::config::project_dirs()
            .ok_or(InitError::NoProjectDirs)?
            .data_dir()
            .join("alarmgame.db"),
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(InitError::DataDirCreation)?;
    }
    Ok(path)
}

pub fn open_database(config: &Config) -> Result<Database, InitError> {
    let path = db_path(config)?;
    info!("Opening alarm store at {}", path.display());
    let db = Database::open(&path).map_err(InitError::DatabaseOpen)?;
    migrations::run(db.connection()).map_err(InitError::Migration)?;
    Ok(db)
}

fn ring_platform(bridge: &Arc<ShellBridge>) -> RingPlatform {
    let alerts: Arc<dyn AlertSurface> = Arc::<ShellBridge>::clone(bridge);
    let audio: Arc<dyn AudioOutput> = Arc::<ShellBridge>::clone(bridge);
    let challenge: Arc<dyn ChallengePresenter> = Arc::<ShellBridge>::clone(bridge);
    let wake_locks: Arc<dyn WakeLockProvider> = Arc::<ShellBridge>::clone(bridge);
    RingPlatform {
        alerts,
        audio,
        challenge,
        wake_locks,
    }
}

/// The wired alarm core, with the shell as its platform.
pub struct App {
    pub db: Arc<Mutex<Database>>,
    pub clock: Arc<dyn Clock>,
    pub timers: Arc<ThreadTimers>,
    pub bridge: Arc<ShellBridge>,
    pub scheduler: Arc<dyn WakeScheduler>,
    pub service: Arc<AlarmService>,
    pub ring: Arc<RingDelivery>,
}

impl App {
    pub fn new(db: Database, config: &Config, outbox: Sender<OutgoingMessage>) -> Self {
        let db = Arc::new(Mutex::new(db));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let timers = Arc::new(ThreadTimers::new(Arc::clone(&clock)));
        let bridge = Arc::new(ShellBridge::new(outbox));

        let backend: Arc<dyn WakeTimerBackend> = Arc::<ThreadTimers>::clone(&timers);
        let permissions: Arc<dyn PermissionProbe> = Arc::<ShellBridge>::clone(&bridge);
        let scheduler: Arc<dyn WakeScheduler> =
            Arc::new(ExactAlarmScheduler::new(backend, permissions));

        let service = Arc::new(AlarmService::new(
            Arc::clone(&db),
            Arc::clone(&scheduler),
            Arc::clone(&clock),
        ));
        let ring = Arc::new(RingDelivery::new(
            Arc::clone(&service),
            Arc::clone(&db),
            ring_platform(&bridge),
            Arc::clone(&clock),
            config.wake_lock_timeout(),
        ));

        Self {
            db,
            clock,
            timers,
            bridge,
            scheduler,
            service,
            ring,
        }
    }

    pub fn host(&self, config: &Config) -> Host {
        let boot = BootRecovery::new(Arc::clone(&self.service), config.boot_deadline());
        Host::new(
            Arc::clone(&self.service),
            Arc::clone(&self.ring),
            boot,
            Arc::clone(&self.bridge),
            Arc::clone(&self.db),
            Arc::clone(&self.clock),
            config.history_limit,
        )
    }
}

/// Serve the shell over `reader`/`writer` until it disconnects.
pub fn run<R, W>(config: &Config, reader: R, writer: W) -> Result<(), InitError>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let db = open_database(config)?;
    let (out_tx, out_rx) = mpsc::channel();
    let (events_tx, events_rx) = mpsc::channel();
    let writer_thread = spawn_writer(writer, out_rx);

    let app = App::new(db, config, out_tx.clone());
    let host = app.host(config);

    let wakes = events_tx.clone();
    let timer_thread = app.timers.start(move |slot| {
        let _ = wakes.send(HostEvent::Wake(slot.alarm_id()));
    });

    // The timer wheel lives in this process, so every start is a fresh boot.
    match app.service.rearm_enabled() {
        Ok(report) => info!("Startup re-armed {} alarms", report.armed),
        Err(e) => error!("Startup re-arm failed: {e}"),
    }

    let feed = match app.service.subscribe() {
        Ok(rx) => Some(spawn_alarm_feed(rx, out_tx.clone())),
        Err(e) => {
            warn!("Alarm list updates unavailable: {e}");
            None
        }
    };

    // Not joined: it stays blocked on the reader until the process exits.
    let _reader = spawn_reader(reader, events_tx);
    host.run(&events_rx, &out_tx);

    app.timers.stop();
    if timer_thread.join().is_err() {
        error!("Timer thread panicked");
    }
    drop(host);
    drop(app);
    drop(out_tx);
    if let Some(feed) = feed {
        let _ = feed.join();
    }
    if writer_thread.join().is_err() {
        error!("Writer thread panicked");
    }
    Ok(())
}
