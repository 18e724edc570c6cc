//! Native messaging host for the platform shell.
//!
//! Frames are a little-endian `u32` length followed by that many bytes of
//! JSON. One reader thread turns stdin into [`HostEvent`]s, the timer thread
//! adds wakes, and the host loop answers on the outbox.

pub mod dtos;
pub mod messages;

pub use messages::{IncomingMessage, OutgoingMessage};

use crate::boot::{BootOutcome, BootRecovery};
use crate::clock::Clock;
use crate::constants::MAX_MESSAGE_SIZE;
use crate::db::{with_connection, Database};
use crate::error::AppResult;
use crate::models::{Alarm, AlarmHistory};
use crate::platform::{missing_permissions, ShellBridge};
use crate::ring::RingDelivery;
use crate::service::AlarmService;
use dtos::{AlarmDto, HistoryDto};
use log::{debug, error, info, warn};
use std::io::{self, Read, Write};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

#[derive(Debug)]
pub enum HostEvent {
    Message(IncomingMessage),
    /// A frame arrived but did not parse.
    Malformed(String),
    /// A wake timer fired for this alarm.
    Wake(i64),
    Shutdown,
}

pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = usize::try_from(u32::from_le_bytes(len_bytes))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Message too large: {len} bytes (max: {MAX_MESSAGE_SIZE} bytes)"),
        ));
    }

    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer)?;
    Ok(buffer)
}

pub fn write_message<W: Write>(writer: &mut W, message: &OutgoingMessage) -> io::Result<()> {
    let json = serde_json::to_vec(message)?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Reply too large: {} bytes", json.len()),
        ));
    }
    let len = u32::try_from(json.len()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&json)?;
    writer.flush()
}

/// Read frames until EOF or a broken stream, then send `Shutdown`.
pub fn spawn_reader<R>(mut reader: R, events: Sender<HostEvent>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        loop {
            let frame = match read_frame(&mut reader) {
                Ok(frame) => frame,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    info!("Shell closed the connection");
                    break;
                }
                Err(e) => {
                    error!("Failed to read frame: {e}");
                    break;
                }
            };
            let event = match serde_json::from_slice::<IncomingMessage>(&frame) {
                Ok(message) => HostEvent::Message(message),
                Err(e) => HostEvent::Malformed(e.to_string()),
            };
            if events.send(event).is_err() {
                return;
            }
        }
        let _ = events.send(HostEvent::Shutdown);
    })
}

pub fn spawn_writer<W>(mut writer: W, outbox: Receiver<OutgoingMessage>) -> JoinHandle<()>
where
    W: Write + Send + 'static,
{
    thread::spawn(move || {
        for message in outbox {
            if let Err(e) = write_message(&mut writer, &message) {
                error!("Failed to write message: {e}");
                break;
            }
        }
    })
}

/// Forward every alarm list the service publishes to the shell.
pub fn spawn_alarm_feed(
    feed: Receiver<Vec<Alarm>>,
    outbox: Sender<OutgoingMessage>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for alarms in feed {
            let message = OutgoingMessage::Alarms {
                alarms: alarms.into_iter().map(AlarmDto::from).collect(),
            };
            if outbox.send(message).is_err() {
                break;
            }
        }
    })
}

fn reply<T>(result: AppResult<T>, ok: impl FnOnce(T) -> OutgoingMessage) -> OutgoingMessage {
    match result {
        Ok(value) => ok(value),
        Err(e) => {
            warn!("Request failed: {e}");
            OutgoingMessage::error(e)
        }
    }
}

pub struct Host {
    service: Arc<AlarmService>,
    ring: Arc<RingDelivery>,
    boot: BootRecovery,
    bridge: Arc<ShellBridge>,
    db: Arc<Mutex<Database>>,
    clock: Arc<dyn Clock>,
    history_limit: usize,
}

impl Host {
    pub fn new(
        service: Arc<AlarmService>,
        ring: Arc<RingDelivery>,
        boot: BootRecovery,
        bridge: Arc<ShellBridge>,
        db: Arc<Mutex<Database>>,
        clock: Arc<dyn Clock>,
        history_limit: usize,
    ) -> Self {
        Self {
            service,
            ring,
            boot,
            bridge,
            db,
            clock,
            history_limit,
        }
    }

    /// Process events until `Shutdown` or until every sender is gone.
    pub fn run(&self, events: &Receiver<HostEvent>, outbox: &Sender<OutgoingMessage>) {
        for event in events {
            if matches!(event, HostEvent::Shutdown) {
                break;
            }
            if let Some(reply) = self.handle(event) {
                if outbox.send(reply).is_err() {
                    break;
                }
            }
        }
        info!("Host loop stopped");
    }

    pub fn handle(&self, event: HostEvent) -> Option<OutgoingMessage> {
        match event {
            HostEvent::Message(message) => Some(self.handle_message(message)),
            HostEvent::Malformed(reason) => {
                warn!("Ignoring malformed message: {reason}");
                Some(OutgoingMessage::error(format!("malformed message: {reason}")))
            }
            HostEvent::Wake(alarm_id) => Some(self.wake(alarm_id)),
            HostEvent::Shutdown => None,
        }
    }

    fn ring_state(&self) -> OutgoingMessage {
        OutgoingMessage::RingState {
            alarm_id: self.ring.ringing_alarm(),
            state: self.ring.state(),
        }
    }

    fn wake(&self, alarm_id: i64) -> OutgoingMessage {
        let state = self.ring.on_wake(alarm_id);
        debug!("Wake for alarm {alarm_id} left ring state {state:?}");
        self.ring_state()
    }

    fn permissions(&self) -> OutgoingMessage {
        OutgoingMessage::Permissions {
            missing: missing_permissions(self.bridge.as_ref()),
            scheduling_blocked: self.service.scheduling_blocked(),
        }
    }

    fn handle_message(&self, message: IncomingMessage) -> OutgoingMessage {
        match message {
            IncomingMessage::BootCompleted => self.boot_completed(),
            IncomingMessage::AlarmFired { alarm_id } => self.wake(alarm_id),
            IncomingMessage::ChallengeSucceeded { alarm_id } => {
                let result = self.ring.on_challenge_success(alarm_id);
                reply(result, |state| OutgoingMessage::RingState {
                    alarm_id: Some(alarm_id),
                    state,
                })
            }
            IncomingMessage::Snooze { alarm_id } => {
                let result = self.ring.on_snooze(alarm_id);
                reply(result, |state| OutgoingMessage::RingState {
                    alarm_id: Some(alarm_id),
                    state,
                })
            }
            IncomingMessage::SessionTerminated { alarm_id } => {
                let result = self.ring.on_session_terminated(alarm_id);
                reply(result, |()| self.ring_state())
            }
            IncomingMessage::ReopenRinging => {
                if self.ring.reopen().is_none() {
                    debug!("Reopen requested with nothing ringing");
                }
                self.ring_state()
            }
            IncomingMessage::SaveAlarm { alarm } => {
                let result = alarm.into_alarm().and_then(|a| self.service.upsert(a));
                reply(result, |saved| match saved {
                    Some((id, schedule)) => OutgoingMessage::Saved { id, schedule },
                    None => OutgoingMessage::Ok,
                })
            }
            IncomingMessage::ToggleAlarm { alarm_id, enabled } => {
                let now = self.clock.now_ms();
                let result = self.service.toggle_enabled(alarm_id, enabled, now);
                reply(result, |_| OutgoingMessage::Ok)
            }
            IncomingMessage::DeleteAlarm { alarm_id } => {
                reply(self.service.delete(alarm_id), |_| OutgoingMessage::Ok)
            }
            IncomingMessage::ListAlarms => reply(self.service.list(), |alarms| {
                OutgoingMessage::Alarms {
                    alarms: alarms.into_iter().map(AlarmDto::from).collect(),
                }
            }),
            IncomingMessage::GetHistory { alarm_id, limit } => {
                let limit = limit.unwrap_or(self.history_limit);
                let result = with_connection(&self.db, "load history", |conn| {
                    AlarmHistory::find_by_alarm(conn, alarm_id, limit)
                });
                reply(result, |rows| OutgoingMessage::History {
                    alarm_id,
                    entries: rows.into_iter().map(HistoryDto::from).collect(),
                })
            }
            IncomingMessage::PermissionsChanged {
                scheduling,
                notification,
                overlay,
            } => {
                self.bridge.set_permissions(scheduling, notification, overlay);
                if scheduling && self.service.scheduling_blocked() {
                    info!("Exact-alarm privilege granted, re-arming");
                    if let Err(e) = self.service.rearm_enabled() {
                        error!("Re-arm after privilege grant failed: {e}");
                    }
                }
                self.permissions()
            }
            IncomingMessage::CheckPermissions => self.permissions(),
        }
    }

    fn boot_completed(&self) -> OutgoingMessage {
        let completion = Box::new(|| debug!("Boot completion released"));
        match self.boot.on_boot_completed(completion) {
            BootOutcome::Completed(report) => OutgoingMessage::BootFinished {
                armed: report.armed,
                failed: report.failed.len() + report.denied.len(),
            },
            BootOutcome::Failed(reason) => OutgoingMessage::error(reason),
            BootOutcome::TimedOut => OutgoingMessage::error("boot recovery still running"),
        }
    }
}
