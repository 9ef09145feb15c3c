//! GRBL link and channel pump
//!
//! [`GrblLink`] owns one [`ByteChannel`] and drives it from a single worker
//! task. Each pump iteration:
//!
//! 1. sends a status query if periodic polling is due
//! 2. reads at most one line, classifies it and dispatches it
//! 3. writes the head of the command queue if the flow controller admits it
//!
//! Producers only ever append to the queue or write realtime bytes; the
//! pump is the sole reader and the sole consumer of the queue. All writes
//! go through the channel mutex so realtime bytes never land inside a
//! queued command.

use super::dispatcher::{panic_reason, MessageDispatcher, ObserverHandle};
use super::flow_control::{FlowControl, FlowStrategy, PlannerUsage};
use super::messages::{Message, Response};
use super::realtime::RealtimeCommand;
use super::response_parser::decode_line;
use super::state::{DeviceState, StateTracker};
use crate::communication::{ByteChannel, Command, CommandQueue};
use grblstream_core::{ConnectionError, ProtocolError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Runtime configuration of a link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Admission strategy for queued commands
    pub flow_control: FlowStrategy,
    /// Pause between pump iterations that found nothing to do
    pub idle_delay: Duration,
    /// Send `?` at this interval while the worker runs
    pub status_poll_interval: Option<Duration>,
    /// Query status and settings whenever the controller boots
    pub query_on_welcome: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            flow_control: FlowStrategy::default(),
            idle_delay: Duration::from_millis(10),
            status_poll_interval: None,
            query_on_welcome: false,
        }
    }
}

struct Shared {
    name: String,
    config: LinkConfig,
    channel: Mutex<Box<dyn ByteChannel>>,
    queue: CommandQueue,
    flow: Mutex<Box<dyn FlowControl>>,
    state: StateTracker,
    dispatcher: MessageDispatcher<GrblLink>,
    fault: Mutex<Option<ProtocolError>>,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<Result<()>>>>,
    last_poll: Mutex<Option<Instant>>,
}

/// Handle to a GRBL connection
///
/// Cheap to clone; every clone refers to the same link. Observers receive
/// a handle so they can enqueue follow-up commands.
#[derive(Clone)]
pub struct GrblLink {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for GrblLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrblLink")
            .field("name", &self.shared.name)
            .field("running", &self.is_running())
            .field("queued", &self.queued_len())
            .field("planner", &self.planner_usage())
            .finish()
    }
}

impl GrblLink {
    /// Create a link over `channel`. The worker is not started.
    pub fn new(channel: Box<dyn ByteChannel>, config: LinkConfig) -> Self {
        let name = channel.name();
        let flow = config.flow_control.build();
        tracing::debug!("Creating GRBL link on {} with {} flow control", name, flow.name());

        Self {
            shared: Arc::new(Shared {
                name,
                channel: Mutex::new(channel),
                queue: CommandQueue::new(),
                flow: Mutex::new(flow),
                state: StateTracker::new(),
                dispatcher: MessageDispatcher::new(),
                fault: Mutex::new(None),
                running: AtomicBool::new(false),
                worker: Mutex::new(None),
                last_poll: Mutex::new(None),
                config,
            }),
        }
    }

    /// Channel name
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Link configuration
    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }

    /// Append a command to the outbound queue
    ///
    /// Never blocks. The terminator is normalized to a single `\n`.
    /// Commands that the byte budget could never admit are rejected, as is
    /// anything enqueued while admission is halted after a desync.
    pub fn enqueue(&self, command: impl AsRef<[u8]>) -> Result<()> {
        let command = Command::new(command)?;
        self.enqueue_command(command)
    }

    /// Append an already built command to the outbound queue
    pub fn enqueue_command(&self, command: Command) -> Result<()> {
        if self.shared.fault.lock().is_some() {
            return Err(ProtocolError::AdmissionHalted.into());
        }

        let usage = {
            let flow = self.shared.flow.lock();
            match flow.max_command_len() {
                Some(max) if command.len() > max => Some(flow.usage()),
                _ => None,
            }
        };
        if let Some(usage) = usage {
            return Err(ProtocolError::CommandTooLong {
                len: command.len(),
                capacity: usage.capacity.unwrap_or_default(),
            }
            .into());
        }

        tracing::trace!("Queued: {}", command.text());
        self.shared.queue.push(command);
        Ok(())
    }

    /// Write a realtime command immediately, bypassing queue and flow control
    pub fn send_realtime(&self, command: RealtimeCommand) -> Result<()> {
        let byte = command.as_byte();
        tracing::debug!("SEND realtime: {:?} (0x{:02X})", command, byte);
        self.shared
            .channel
            .lock()
            .write_all(&[byte])
            .map_err(|e| connection_lost("realtime write", e))?;
        Ok(())
    }

    /// Write a raw realtime byte after checking it belongs to the realtime set
    pub fn send_realtime_byte(&self, byte: u8) -> Result<()> {
        let command = RealtimeCommand::try_from(byte)?;
        self.send_realtime(command)
    }

    /// Register an observer; it runs on the pump for every message
    pub fn register_observer<F>(&self, observer: F) -> ObserverHandle
    where
        F: Fn(&Message, &GrblLink) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.dispatcher.register(observer)
    }

    /// Remove an observer. Returns `false` if it was not registered.
    pub fn unregister_observer(&self, handle: ObserverHandle) -> bool {
        self.shared.dispatcher.unregister(handle)
    }

    /// Snapshot of the device state
    pub fn current_state(&self) -> DeviceState {
        self.shared.state.snapshot()
    }

    /// Planner accounting of the active flow controller
    pub fn planner_usage(&self) -> PlannerUsage {
        self.shared.flow.lock().usage()
    }

    /// Commands waiting in the outbound queue
    pub fn queued_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Check if nothing is queued or awaiting acknowledgment
    pub fn is_idle(&self) -> bool {
        self.queued_len() == 0 && self.planner_usage().in_flight == 0
    }

    /// The desync that halted admission, if any
    pub fn fault(&self) -> Option<ProtocolError> {
        self.shared.fault.lock().clone()
    }

    /// Check if the worker task is running
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Spawn the pump worker on the current tokio runtime
    pub fn start(&self) -> Result<()> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ConnectionError::NoRuntime)?;

        let mut worker = self.shared.worker.lock();
        if worker.is_some() {
            return Err(ConnectionError::AlreadyRunning.into());
        }

        self.shared.running.store(true, Ordering::SeqCst);
        let link = self.clone();
        *worker = Some(runtime.spawn(async move { link.run().await }));
        Ok(())
    }

    /// Stop the worker and wait for it to exit
    ///
    /// Returns the worker's own outcome, so a channel failure that ended
    /// the worker surfaces here. A desync that is still halting admission
    /// is returned as well. Commands in flight are discarded; queued
    /// commands stay queued.
    pub async fn stop(&self) -> Result<()> {
        let handle = self
            .shared
            .worker
            .lock()
            .take()
            .ok_or(ConnectionError::NotRunning)?;

        self.shared.running.store(false, Ordering::SeqCst);
        let outcome = match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(ConnectionError::WorkerPanicked {
                reason: panic_reason(e.into_panic().as_ref()),
            }
            .into()),
            Err(e) => Err(grblstream_core::Error::other(format!(
                "GRBL link worker on {} was cancelled: {}",
                self.shared.name, e
            ))),
        };

        self.shared.flow.lock().reset();
        match (outcome, self.fault()) {
            (Ok(()), Some(fault)) => Err(fault.into()),
            (outcome, _) => outcome,
        }
    }

    /// Run one pump iteration on the calling thread
    ///
    /// For driving the link without a worker, e.g. in tests. Returns
    /// whether a line was read or a command written. Fails while the
    /// worker is running.
    pub fn pump_once(&self) -> Result<bool> {
        if self.is_running() {
            return Err(ConnectionError::AlreadyRunning.into());
        }
        self.pump()
    }

    async fn run(self) -> Result<()> {
        tracing::info!("GRBL link worker started on {}", self.shared.name);
        let idle_delay = self.shared.config.idle_delay;

        let result = loop {
            if !self.is_running() {
                break Ok(());
            }
            match self.pump() {
                Ok(true) => tokio::task::yield_now().await,
                Ok(false) => tokio::time::sleep(idle_delay).await,
                Err(e) => {
                    tracing::error!("GRBL link on {} failed: {}", self.shared.name, e);
                    break Err(e);
                }
            }
        };

        self.shared.running.store(false, Ordering::SeqCst);
        tracing::info!("GRBL link worker stopped on {}", self.shared.name);
        result
    }

    fn pump(&self) -> Result<bool> {
        self.poll_status()?;
        let read = self.read_phase()?;
        let written = self.write_phase()?;
        Ok(read || written)
    }

    fn poll_status(&self) -> Result<()> {
        let Some(interval) = self.shared.config.status_poll_interval else {
            return Ok(());
        };

        let due = {
            let mut last = self.shared.last_poll.lock();
            match *last {
                Some(at) if at.elapsed() < interval => false,
                _ => {
                    *last = Some(Instant::now());
                    true
                }
            }
        };

        if due {
            self.send_realtime(RealtimeCommand::StatusQuery)?;
        }
        Ok(())
    }

    fn read_phase(&self) -> Result<bool> {
        let raw = {
            let mut channel = self.shared.channel.lock();
            let available = channel
                .bytes_available()
                .map_err(|e| connection_lost("read", e))?;
            if available == 0 {
                return Ok(false);
            }
            channel.read_line().map_err(|e| connection_lost("read", e))?
        };

        let Some(raw) = raw else {
            return Ok(false);
        };
        if let Some(message) = decode_line(&raw) {
            self.handle_message(message)?;
        }
        Ok(true)
    }

    fn write_phase(&self) -> Result<bool> {
        if self.shared.fault.lock().is_some() {
            return Ok(false);
        }

        let mut flow = self.shared.flow.lock();
        let Some(command) = self.shared.queue.pop_if(|head| flow.may_admit(head)) else {
            return Ok(false);
        };

        self.shared
            .channel
            .lock()
            .write_all(command.as_bytes())
            .map_err(|e| connection_lost("write", e))?;

        flow.on_admitted(command.clone());
        tracing::debug!("SEND: {} [{}]", command.text(), flow.usage());
        Ok(true)
    }

    fn handle_message(&self, message: Message) -> Result<()> {
        self.shared.state.apply(&message);

        let mut booted = false;
        match &message {
            Message::Response(response) => {
                if matches!(response, Response::Error { .. }) {
                    tracing::warn!("Controller reported {}", message);
                }
                self.acknowledge();
            }
            Message::Welcome { version } => {
                self.shared.flow.lock().reset();
                if let Some(fault) = self.shared.fault.lock().take() {
                    tracing::info!("Controller reset cleared fault: {}", fault);
                }
                tracing::info!("GRBL {} booted on {}", version, self.shared.name);
                booted = true;
            }
            Message::Alarm { .. } => tracing::warn!("Controller raised {}", message),
            _ => {}
        }

        self.shared.dispatcher.dispatch(&message, self);

        if booted && self.shared.config.query_on_welcome {
            self.query_status()?;
            if let Err(e) = self.query_settings() {
                tracing::warn!("Settings query after boot not queued: {}", e);
            }
        }
        Ok(())
    }

    fn acknowledge(&self) {
        let mut fault = self.shared.fault.lock();
        if fault.is_some() {
            tracing::debug!("Ignoring acknowledgment while admission is halted");
            return;
        }

        let mut flow = self.shared.flow.lock();
        match flow.on_response() {
            Ok(Some(retired)) => {
                tracing::debug!("ACK: {} [{}]", retired.text(), flow.usage());
            }
            Ok(None) => tracing::trace!("ACK with nothing tracked [{}]", flow.usage()),
            Err(e) => {
                tracing::error!(
                    "{} on {}; halting admission until the controller resets",
                    e,
                    self.shared.name
                );
                *fault = Some(e);
            }
        }
    }

    /// Clear an alarm lock (`$X`)
    pub fn unlock(&self) -> Result<()> {
        self.enqueue("$X")
    }

    /// Toggle g-code check mode (`$C`)
    pub fn toggle_check_mode(&self) -> Result<()> {
        self.enqueue("$C")
    }

    /// Run the homing cycle (`$H`)
    pub fn home(&self) -> Result<()> {
        self.enqueue("$H")
    }

    /// Request all `$` settings (`$$`)
    pub fn query_settings(&self) -> Result<()> {
        self.enqueue("$$")
    }

    /// Request the g-code parser state (`$G`)
    pub fn query_parser_state(&self) -> Result<()> {
        self.enqueue("$G")
    }

    /// Request a status report (`?`)
    pub fn query_status(&self) -> Result<()> {
        self.send_realtime(RealtimeCommand::StatusQuery)
    }

    /// Soft reset (Ctrl-X)
    pub fn soft_reset(&self) -> Result<()> {
        self.send_realtime(RealtimeCommand::SoftReset)
    }

    /// Pause motion (`!`)
    pub fn feed_hold(&self) -> Result<()> {
        self.send_realtime(RealtimeCommand::FeedHold)
    }

    /// Resume motion (`~`)
    pub fn cycle_start(&self) -> Result<()> {
        self.send_realtime(RealtimeCommand::CycleStart)
    }

    /// Cancel the active jog (0x85)
    pub fn jog_cancel(&self) -> Result<()> {
        self.send_realtime(RealtimeCommand::JogCancel)
    }
}

fn connection_lost(op: &str, e: std::io::Error) -> grblstream_core::Error {
    ConnectionError::ConnectionLost {
        reason: format!("{} failed: {}", op, e),
    }
    .into()
}
