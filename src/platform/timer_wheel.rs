//! In-process stand-in for the OS alarm-clock facility.
//!
//! One worker thread sleeps until the earliest pending deadline and hands
//! the fired slot to a callback. Deadlines already in the past fire on the
//! next loop iteration.

use crate::clock::Clock;
use crate::constants::TIMER_MAX_WAIT_MS;
use crate::platform::types::{TimerError, WakeSlot, WakeTimerBackend};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

struct Shared {
    pending: Mutex<HashMap<WakeSlot, i64>>,
    wakeup: Condvar,
    running: AtomicBool,
}

pub struct ThreadTimers {
    shared: Arc<Shared>,
    clock: Arc<dyn Clock>,
}

fn lock_pending(shared: &Shared) -> MutexGuard<'_, HashMap<WakeSlot, i64>> {
    match shared.pending.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("wake timer table mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl ThreadTimers {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(Shared {
                pending: Mutex::new(HashMap::new()),
                wakeup: Condvar::new(),
                running: AtomicBool::new(false),
            }),
            clock,
        }
    }

    /// Spawn the timer thread. `on_fire` runs on that thread without the table locked.
    pub fn start<F>(&self, on_fire: F) -> thread::JoinHandle<()>
    where
        F: Fn(WakeSlot) + Send + 'static,
    {
        self.shared.running.store(true, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let clock = Arc::clone(&self.clock);

        thread::spawn(move || {
            let mut pending = lock_pending(&shared);
            while shared.running.load(Ordering::SeqCst) {
                let now = clock.now_ms();
                let earliest = pending
                    .iter()
                    .min_by_key(|(_, at)| **at)
                    .map(|(slot, at)| (*slot, *at));

                match earliest {
                    Some((slot, at)) if at <= now => {
                        pending.remove(&slot);
                        drop(pending);
                        debug!("Wake timer fired for alarm {}", slot.alarm_id());
                        on_fire(slot);
                        pending = lock_pending(&shared);
                    }
                    Some((_, at)) => {
                        let wait_ms = u64::try_from(at - now)
                            .unwrap_or(0)
                            .min(TIMER_MAX_WAIT_MS);
                        pending = match shared
                            .wakeup
                            .wait_timeout(pending, Duration::from_millis(wait_ms))
                        {
                            Ok((guard, _)) => guard,
                            Err(poisoned) => poisoned.into_inner().0,
                        };
                    }
                    None => {
                        pending = match shared.wakeup.wait(pending) {
                            Ok(guard) => guard,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                    }
                }
            }
            debug!("Wake timer thread stopped");
        })
    }

    pub fn stop(&self) {
        let _pending = lock_pending(&self.shared);
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.wakeup.notify_all();
    }
}

impl WakeTimerBackend for ThreadTimers {
    fn set_alarm_clock(&self, slot: WakeSlot, trigger_at_ms: i64) -> Result<(), TimerError> {
        let mut pending = lock_pending(&self.shared);
        pending.insert(slot, trigger_at_ms);
        self.shared.wakeup.notify_all();
        Ok(())
    }

    fn cancel(&self, slot: WakeSlot) -> bool {
        let mut pending = lock_pending(&self.shared);
        let existed = pending.remove(&slot).is_some();
        self.shared.wakeup.notify_all();
        existed
    }

    fn pending(&self, slot: WakeSlot) -> Option<i64> {
        lock_pending(&self.shared).get(&slot).copied()
    }
}
