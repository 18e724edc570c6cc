//! Re-arming after a device restart.
//!
//! Wake timers do not survive a reboot. When the boot signal arrives, every
//! enabled alarm is re-armed on a worker thread, and the completion token is
//! always handed back, even if the batch fails or panics.

use crate::error::AppResult;
use crate::scheduler::RearmReport;
use crate::service::AlarmService;
use log::{error, info, warn};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Token the OS hands out with the boot signal; finishing it lets the OS
/// reclaim the process.
pub trait BootCompletion: Send + 'static {
    fn finish(self: Box<Self>);
}

impl<F> BootCompletion for F
where
    F: FnOnce() + Send + 'static,
{
    fn finish(self: Box<Self>) {
        (*self)();
    }
}

struct FinishOnDrop(Option<Box<dyn BootCompletion>>);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        if let Some(completion) = self.0.take() {
            completion.finish();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootOutcome {
    Completed(RearmReport),
    Failed(String),
    /// The deadline passed first; the worker keeps going in the background.
    TimedOut,
}

pub struct BootRecovery {
    service: Arc<AlarmService>,
    deadline: Duration,
}

impl BootRecovery {
    pub fn new(service: Arc<AlarmService>, deadline: Duration) -> Self {
        Self { service, deadline }
    }

    /// Arm every enabled alarm, including ones whose time passed while the
    /// device was off. Goes through the service so no edit can interleave
    /// between reading a row and arming it.
    pub fn recover(&self) -> AppResult<RearmReport> {
        info!("Boot recovery: re-arming enabled alarms");
        self.service.rearm_enabled()
    }

    /// Handle the boot signal. Blocks for at most the configured deadline.
    ///
    /// The completion token is finished before the outcome is reported.
    pub fn on_boot_completed(&self, completion: Box<dyn BootCompletion>) -> BootOutcome {
        let (tx, rx) = mpsc::channel();
        let worker = Self {
            service: Arc::clone(&self.service),
            deadline: self.deadline,
        };

        thread::spawn(move || {
            let result = {
                let _finish = FinishOnDrop(Some(completion));
                worker.recover()
            };
            if let Err(e) = &result {
                error!("Boot recovery failed: {e}");
            }
            let _ = tx.send(result);
        });

        match rx.recv_timeout(self.deadline) {
            Ok(Ok(report)) => BootOutcome::Completed(report),
            Ok(Err(e)) => BootOutcome::Failed(e.to_string()),
            Err(RecvTimeoutError::Timeout) => {
                warn!("Boot recovery still running after {:?}", self.deadline);
                BootOutcome::TimedOut
            }
            Err(RecvTimeoutError::Disconnected) => {
                BootOutcome::Failed("boot recovery worker panicked".to_string())
            }
        }
    }
}
