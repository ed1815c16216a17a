use crate::Plc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

/// Where the trigger loop currently is; published for the UI and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Idle,
    Triggered,
    Detecting,
    Retrying,
    WritingResult,
}

/// One inspection handed from the monitor to the orchestrator.
///
/// The orchestrator reports retry progress through `state` and answers
/// the final verdict on `reply`; the monitor then writes the result
/// register exactly once.
pub struct InspectionRequest {
    pub state: Arc<watch::Sender<TriggerState>>,
    pub reply: oneshot::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Pre-formatted trigger register address (see `Protocol::register_address`).
    pub trigger_address: String,
    /// Pre-formatted result register address.
    pub result_address: String,
    pub poll_interval: Duration,
    pub trigger_delay: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            trigger_address: "D555".to_string(),
            result_address: "D556".to_string(),
            poll_interval: Duration::from_millis(500),
            trigger_delay: Duration::from_millis(800),
        }
    }
}

/// Read-failure backoff: at most three attempts, the delay between them
/// doubling from `READ_BACKOFF_START` up to `READ_BACKOFF_CAP`; after
/// the third failure the monitor surfaces a disconnect and moves to the
/// reconnect loop.
const READ_ATTEMPTS: u32 = 3;
const READ_BACKOFF_START: Duration = Duration::from_millis(250);
const READ_BACKOFF_CAP: Duration = Duration::from_secs(1);

/// Reconnect backoff after a surfaced disconnect: the same doubling
/// curve with a higher cap, retried until the line comes back or
/// shutdown fires.
const RECONNECT_BACKOFF_START: Duration = Duration::from_millis(500);
const RECONNECT_BACKOFF_CAP: Duration = Duration::from_secs(5);

/// Polls the trigger register and drives one inspection per rising
/// edge: acknowledge the trigger, wait the configured settle delay,
/// hand the cycle to the orchestrator, write the verdict back.
pub struct TriggerMonitor<P: Plc> {
    plc: P,
    config: MonitorConfig,
    requests: mpsc::Sender<InspectionRequest>,
    state: Arc<watch::Sender<TriggerState>>,
    state_rx: watch::Receiver<TriggerState>,
    connected: watch::Sender<bool>,
    connected_rx: watch::Receiver<bool>,
    shutdown: watch::Receiver<bool>,
}

impl<P: Plc> TriggerMonitor<P> {
    pub fn new(
        plc: P,
        config: MonitorConfig,
        requests: mpsc::Sender<InspectionRequest>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (state, state_rx) = watch::channel(TriggerState::Idle);
        let (connected, connected_rx) = watch::channel(false);
        Self {
            plc,
            config,
            requests,
            state: Arc::new(state),
            state_rx,
            connected,
            connected_rx,
            shutdown,
        }
    }

    /// Observe the trigger state machine.
    pub fn state(&self) -> watch::Receiver<TriggerState> {
        self.state_rx.clone()
    }

    /// Observe connection health; `false` while in reconnect backoff.
    pub fn connection(&self) -> watch::Receiver<bool> {
        self.connected_rx.clone()
    }

    /// Run until the shutdown signal fires. In-flight reads and writes
    /// are finished, not aborted; the signal is honored at every state
    /// boundary.
    pub async fn run(mut self) {
        if !self.establish_connection().await {
            return;
        }

        loop {
            self.state.send_replace(TriggerState::Idle);
            if self.pause(self.config.poll_interval).await {
                break;
            }

            let trigger = self.config.trigger_address.clone();
            match self.read_with_retries(&trigger).await {
                ReadOutcome::Value(1) => {
                    if self.run_trigger_cycle().await {
                        break;
                    }
                }
                ReadOutcome::Value(_) => {}
                ReadOutcome::Disconnected => {
                    if !self.establish_connection().await {
                        break;
                    }
                }
                ReadOutcome::Shutdown => break,
            }
        }

        self.plc.disconnect().await;
        self.connected.send_replace(false);
        log::info!("plc monitor stopped");
    }

    /// One trigger cycle; returns true when shutdown was requested.
    async fn run_trigger_cycle(&mut self) -> bool {
        // Acknowledge the trigger so the PLC can rearm it.
        let trigger = self.config.trigger_address.clone();
        if let Err(e) = self.plc.write_int16(&trigger, 0).await {
            log::warn!("failed to clear trigger register: {e}");
        }
        self.state.send_replace(TriggerState::Triggered);

        if self.pause(self.config.trigger_delay).await {
            return true;
        }

        self.state.send_replace(TriggerState::Detecting);
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = InspectionRequest { state: Arc::clone(&self.state), reply: reply_tx };

        let passed = if self.requests.send(request).await.is_ok() {
            // A dropped reply means the cycle never ran; fail it rather
            // than leave the PLC without a verdict.
            reply_rx.await.unwrap_or(false)
        } else {
            log::error!("inspection channel closed, failing trigger cycle");
            false
        };

        self.state.send_replace(TriggerState::WritingResult);
        let result = self.config.result_address.clone();
        if let Err(e) = self.plc.write_int16(&result, if passed { 1 } else { 0 }).await {
            log::warn!("failed to write result register: {e}");
        }
        false
    }

    /// Read a register, backing off exponentially (capped) between
    /// attempts; after `READ_ATTEMPTS` failures the line counts as
    /// disconnected.
    async fn read_with_retries(&mut self, address: &str) -> ReadOutcome {
        let mut delay = READ_BACKOFF_START;
        for attempt in 1..=READ_ATTEMPTS {
            match self.plc.read_int16(address).await {
                Ok(value) => return ReadOutcome::Value(value),
                Err(e) if attempt == READ_ATTEMPTS => {
                    log::error!("plc unreachable after {READ_ATTEMPTS} read attempts: {e}");
                    return ReadOutcome::Disconnected;
                }
                Err(e) => {
                    log::warn!(
                        "plc read failed (attempt {attempt} of {READ_ATTEMPTS}), next in {delay:?}: {e}"
                    );
                    if self.pause(delay).await {
                        return ReadOutcome::Shutdown;
                    }
                    delay = (delay * 2).min(READ_BACKOFF_CAP);
                }
            }
        }
        ReadOutcome::Disconnected
    }

    /// (Re)connect with the capped doubling backoff, retrying until the
    /// connection is back or shutdown fires; returns false when shutdown
    /// interrupted the attempt.
    async fn establish_connection(&mut self) -> bool {
        self.connected.send_replace(false);
        self.plc.disconnect().await;

        let mut delay = RECONNECT_BACKOFF_START;
        loop {
            if *self.shutdown.borrow() {
                return false;
            }
            match self.plc.connect().await {
                Ok(()) => {
                    self.connected.send_replace(true);
                    log::info!("plc connected");
                    return true;
                }
                Err(e) => {
                    log::warn!("plc connect failed, retrying in {delay:?}: {e}");
                    if self.pause(delay).await {
                        return false;
                    }
                    delay = (delay * 2).min(RECONNECT_BACKOFF_CAP);
                }
            }
        }
    }

    /// Sleep that wakes early on shutdown; returns true when shutting down.
    async fn pause(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.shutdown.wait_for(|&stop| stop) => return true,
        }
        *self.shutdown.borrow()
    }
}

enum ReadOutcome {
    Value(i16),
    Disconnected,
    Shutdown,
}
