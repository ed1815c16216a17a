use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use vigil_plc::{InspectionRequest, MonitorConfig, Plc, PlcError, TriggerMonitor, TriggerState};

/// PLC stub driven by a script of read results; writes and connects are
/// recorded for assertions.
#[derive(Clone, Default)]
struct ScriptedPlc {
    shared: Arc<Mutex<PlcState>>,
}

#[derive(Default)]
struct PlcState {
    reads: VecDeque<Result<i16, String>>,
    writes: Vec<(String, i16)>,
    connects: usize,
}

impl ScriptedPlc {
    fn push_reads(&self, reads: impl IntoIterator<Item = Result<i16, String>>) {
        self.shared.lock().unwrap().reads.extend(reads);
    }

    fn writes(&self) -> Vec<(String, i16)> {
        self.shared.lock().unwrap().writes.clone()
    }

    fn connects(&self) -> usize {
        self.shared.lock().unwrap().connects
    }
}

impl Plc for ScriptedPlc {
    async fn connect(&mut self) -> Result<(), PlcError> {
        self.shared.lock().unwrap().connects += 1;
        Ok(())
    }

    async fn disconnect(&mut self) {}

    async fn read_int16(&mut self, _address: &str) -> Result<i16, PlcError> {
        // Past the end of the script the line stays quiet.
        match self.shared.lock().unwrap().reads.pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(msg)) => Err(PlcError::Transport(msg)),
            None => Ok(0),
        }
    }

    async fn write_int16(&mut self, address: &str, value: i16) -> Result<(), PlcError> {
        self.shared.lock().unwrap().writes.push((address.to_string(), value));
        Ok(())
    }
}

fn fast_config() -> MonitorConfig {
    MonitorConfig {
        trigger_address: "D555".to_string(),
        result_address: "D556".to_string(),
        poll_interval: Duration::from_millis(5),
        trigger_delay: Duration::from_millis(5),
    }
}

/// Answer every inspection request with a fixed verdict.
fn auto_responder(mut rx: mpsc::Receiver<InspectionRequest>, verdict: bool) {
    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let _ = request.reply.send(verdict);
        }
    });
}

#[tokio::test]
async fn trigger_is_acknowledged_and_result_written_once() {
    let plc = ScriptedPlc::default();
    plc.push_reads([Ok(0), Ok(1)]);

    let (req_tx, req_rx) = mpsc::channel(1);
    let (stop_tx, stop_rx) = watch::channel(false);
    let monitor = TriggerMonitor::new(plc.clone(), fast_config(), req_tx, stop_rx);
    auto_responder(req_rx, true);

    let handle = tokio::spawn(monitor.run());
    tokio::time::sleep(Duration::from_millis(200)).await;
    stop_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

    let writes = plc.writes();
    assert_eq!(writes.first(), Some(&("D555".to_string(), 0)), "trigger must be cleared first");
    let result_writes: Vec<_> = writes.iter().filter(|(addr, _)| addr == "D556").collect();
    assert_eq!(result_writes.len(), 1, "exactly one result write per cycle: {writes:?}");
    assert_eq!(result_writes[0].1, 1);
}

#[tokio::test]
async fn failed_cycle_writes_zero() {
    let plc = ScriptedPlc::default();
    plc.push_reads([Ok(1)]);

    let (req_tx, req_rx) = mpsc::channel(1);
    let (stop_tx, stop_rx) = watch::channel(false);
    let monitor = TriggerMonitor::new(plc.clone(), fast_config(), req_tx, stop_rx);
    auto_responder(req_rx, false);

    let handle = tokio::spawn(monitor.run());
    tokio::time::sleep(Duration::from_millis(150)).await;
    stop_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

    let result_writes: Vec<_> =
        plc.writes().into_iter().filter(|(addr, _)| addr == "D556").collect();
    assert_eq!(result_writes, vec![("D556".to_string(), 0)]);
}

#[tokio::test]
async fn dropped_request_fails_the_cycle() {
    let plc = ScriptedPlc::default();
    plc.push_reads([Ok(1)]);

    let (req_tx, mut req_rx) = mpsc::channel(1);
    let (stop_tx, stop_rx) = watch::channel(false);
    let monitor = TriggerMonitor::new(plc.clone(), fast_config(), req_tx, stop_rx);
    // Consume the request and drop the reply without answering.
    tokio::spawn(async move {
        while let Some(request) = req_rx.recv().await {
            drop(request);
        }
    });

    let handle = tokio::spawn(monitor.run());
    tokio::time::sleep(Duration::from_millis(150)).await;
    stop_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

    let result_writes: Vec<_> =
        plc.writes().into_iter().filter(|(addr, _)| addr == "D556").collect();
    assert_eq!(result_writes, vec![("D556".to_string(), 0)]);
}

#[tokio::test(start_paused = true)]
async fn repeated_read_failures_reconnect() {
    let plc = ScriptedPlc::default();
    plc.push_reads([
        Err("cable pulled".to_string()),
        Err("cable pulled".to_string()),
        Err("cable pulled".to_string()),
        Ok(0),
    ]);

    let (req_tx, req_rx) = mpsc::channel(1);
    let (stop_tx, stop_rx) = watch::channel(false);
    let monitor = TriggerMonitor::new(plc.clone(), fast_config(), req_tx, stop_rx);
    let mut connection = monitor.connection();
    auto_responder(req_rx, true);

    let handle = tokio::spawn(monitor.run());

    // Wait until the reconnect happened (2 connects: initial + recovery).
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            if plc.connects() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("monitor should reconnect after repeated read failures");

    assert!(*connection.borrow_and_update(), "connection should be re-established");
    stop_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_stops_an_idle_monitor() {
    let plc = ScriptedPlc::default();
    let (req_tx, _req_rx) = mpsc::channel(1);
    let (stop_tx, stop_rx) = watch::channel(false);
    let monitor = TriggerMonitor::new(plc, fast_config(), req_tx, stop_rx);
    let mut state = monitor.state();

    let handle = tokio::spawn(monitor.run());
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(*state.borrow_and_update(), TriggerState::Idle);

    stop_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
}
