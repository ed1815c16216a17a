use inspector::orchestrator::{CyclePolicy, Orchestrator};
use inspector::persistence::{PersistenceQueue, PersistenceWorker};
use inspector::sim::SimPlc;
use inspector::ui::UiSink;
use inspector::{DetectionLog, InspectionStats};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use vigil_base::Tensor;
use vigil_camera::FrameHandoff;
use vigil_image::Image;
use vigil_infer::{
    CascadeRequest, Device, InferError, InferenceSession, ModelManager, ModelRole, Session,
    SessionSettings, TaskType,
};
use vigil_plc::{MonitorConfig, TriggerMonitor};

struct ScriptedSession {
    script: VecDeque<Vec<Tensor<f32>>>,
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

impl Session for ScriptedSession {
    fn run(&mut self, _input: Tensor<f32>) -> Result<Vec<Tensor<f32>>, InferError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(self.script.pop_front().unwrap_or_else(|| vec![empty_head()]))
    }
}

fn empty_head() -> Tensor<f32> {
    Tensor::new(vec![1, 5, 0], vec![]).unwrap()
}

fn head_with(count: usize) -> Vec<Tensor<f32>> {
    let n = count;
    let mut data = vec![0.0; 5 * n];
    for i in 0..n {
        let c = 10.0 + 14.0 * i as f32;
        data[i] = c;
        data[n + i] = c;
        data[2 * n + i] = 8.0;
        data[3 * n + i] = 8.0;
        data[4 * n + i] = 0.9;
    }
    vec![Tensor::new(vec![1, 5, n], data).unwrap()]
}

fn settings() -> SessionSettings {
    SessionSettings {
        task: TaskType::Detect,
        model_version: 11,
        device: Device::Cpu,
        input_w: 64,
        input_h: 64,
    }
}

fn scripted_manager(
    script: Vec<Vec<Tensor<f32>>>,
    delay: Duration,
) -> (Arc<ModelManager>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let session = ScriptedSession { script: script.into(), calls: Arc::clone(&calls), delay };
    let manager = Arc::new(ModelManager::new(settings()));
    manager.install(
        ModelRole::Primary,
        InferenceSession::from_parts(
            "scripted".to_string(),
            Box::new(session),
            vec!["screw".to_string()],
            &settings(),
        ),
    );
    (manager, calls)
}

fn policy() -> CyclePolicy {
    CyclePolicy {
        cascade: CascadeRequest {
            confidence: 0.25,
            iou: 0.45,
            class_agnostic_nms: false,
            roi: None,
            target_label: Some("screw".to_string()),
        },
        target_label: "screw".to_string(),
        target_count: 1,
        max_retry_count: 1,
        retry_interval: Duration::from_millis(20),
    }
}

fn temp_root(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("vigil-orch-{}-{tag}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else { return 0 };
    entries
        .flatten()
        .map(|e| if e.path().is_dir() { count_files(&e.path()) } else { 1 })
        .sum()
}

fn spawn_frame_producer(handoff: FrameHandoff, stop: watch::Receiver<bool>) {
    tokio::spawn(async move {
        let mut stop = stop;
        loop {
            handoff.publish(Image::gray(64, 64, 128).unwrap());
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(5)) => {}
                _ = stop.wait_for(|&s| s) => break,
            }
        }
    });
}

/// Full trigger cycle with one retry: first attempt finds nothing (NG),
/// the retry finds the screw (OK). The PLC must see exactly one final
/// verdict of 1, the model must have run twice, and only the passing
/// frame may be archived — under Qualified/.
#[tokio::test(flavor = "multi_thread")]
async fn retried_cycle_writes_single_pass_verdict() {
    let root = temp_root("retry");
    let (manager, calls) = scripted_manager(
        vec![vec![empty_head()], head_with(1)],
        Duration::ZERO,
    );

    let handoff = FrameHandoff::new();
    let (stop, stop_rx) = watch::channel(false);
    spawn_frame_producer(handoff.clone(), stop_rx.clone());

    let queue = PersistenceQueue::new(16);
    let (persist_stop, persist_stop_rx) = watch::channel(false);
    let persistence = tokio::spawn(
        PersistenceWorker::new(queue.clone(), root.clone(), 75, persist_stop_rx).run(),
    );

    let (ui, mut ui_rx) = UiSink::channel(64);
    tokio::spawn(async move { while ui_rx.recv().await.is_some() {} });

    let stats = Arc::new(InspectionStats::default());
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&manager),
        handoff.clone(),
        queue.clone(),
        ui,
        Arc::clone(&stats),
        DetectionLog::new(&root),
        policy(),
    ));
    let (req_tx, req_rx) = mpsc::channel(1);
    let orch_task = tokio::spawn(Arc::clone(&orchestrator).run(req_rx, stop_rx.clone()));

    let plc = SimPlc::new();
    let monitor_config = MonitorConfig {
        trigger_address: "D555".to_string(),
        result_address: "D556".to_string(),
        poll_interval: Duration::from_millis(5),
        trigger_delay: Duration::from_millis(5),
    };
    let monitor = TriggerMonitor::new(plc.clone(), monitor_config, req_tx, stop_rx.clone());
    let monitor_task = tokio::spawn(monitor.run());

    // Rising edge on the trigger register.
    plc.set("D555", 1);

    tokio::time::timeout(Duration::from_secs(5), async {
        while plc.get("D556") != 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("PLC should receive a pass verdict");

    assert_eq!(calls.load(Ordering::SeqCst), 2, "one inference per attempt");
    assert_eq!(plc.get("D555"), 0, "trigger register must be cleared");
    assert_eq!(stats.snapshot(), (1, 1, 0), "only the final verdict counts");

    // Shut down and flush the archive.
    stop.send(true).unwrap();
    let _ = tokio::time::timeout(Duration::from_secs(2), monitor_task).await;
    let _ = tokio::time::timeout(Duration::from_secs(2), orch_task).await;
    persist_stop.send(true).unwrap();
    let _ = tokio::time::timeout(Duration::from_secs(5), persistence).await;

    assert_eq!(
        count_files(&root.join("Images").join("Qualified")),
        1,
        "exactly the passing frame is archived"
    );
    assert_eq!(count_files(&root.join("Images").join("Unqualified")), 0);
    assert!(count_files(&root.join("Logs").join("DetectionLogs")) >= 1);

    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_retries_write_fail_verdict() {
    let root = temp_root("fail");
    let (manager, calls) =
        scripted_manager(vec![vec![empty_head()], vec![empty_head()]], Duration::ZERO);

    let handoff = FrameHandoff::new();
    let (stop, stop_rx) = watch::channel(false);
    spawn_frame_producer(handoff.clone(), stop_rx.clone());

    let queue = PersistenceQueue::new(16);
    let (ui, mut ui_rx) = UiSink::channel(64);
    tokio::spawn(async move { while ui_rx.recv().await.is_some() {} });

    let stats = Arc::new(InspectionStats::default());
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&manager),
        handoff.clone(),
        queue.clone(),
        ui,
        Arc::clone(&stats),
        DetectionLog::new(&root),
        policy(),
    ));
    let (req_tx, req_rx) = mpsc::channel(1);
    tokio::spawn(Arc::clone(&orchestrator).run(req_rx, stop_rx.clone()));

    let manual = orchestrator.manual_trigger(req_tx);
    let verdict = tokio::time::timeout(Duration::from_secs(5), manual.fire())
        .await
        .expect("cycle should complete");

    assert_eq!(verdict, Some(false));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(stats.snapshot(), (1, 0, 1));
    // The failed frame is queued under Unqualified.
    assert_eq!(queue.len(), 1);

    stop.send(true).unwrap();
    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test(flavor = "multi_thread")]
async fn manual_trigger_during_cycle_is_dropped() {
    let root = temp_root("busy");
    // Slow model keeps the first cycle in flight.
    let (manager, _) = scripted_manager(
        vec![head_with(1), head_with(1)],
        Duration::from_millis(300),
    );

    let handoff = FrameHandoff::new();
    let (stop, stop_rx) = watch::channel(false);
    spawn_frame_producer(handoff.clone(), stop_rx.clone());

    let queue = PersistenceQueue::new(16);
    let (ui, mut ui_rx) = UiSink::channel(64);
    tokio::spawn(async move { while ui_rx.recv().await.is_some() {} });

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&manager),
        handoff.clone(),
        queue.clone(),
        ui,
        Arc::new(InspectionStats::default()),
        DetectionLog::new(&root),
        policy(),
    ));
    let (req_tx, req_rx) = mpsc::channel(1);
    tokio::spawn(Arc::clone(&orchestrator).run(req_rx, stop_rx.clone()));

    let manual = orchestrator.manual_trigger(req_tx);
    let first = {
        let manual = manual.clone();
        tokio::spawn(async move { manual.fire().await })
    };
    // Give the first cycle time to start, then fire again mid-flight.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = manual.fire().await;

    assert_eq!(second, None, "trigger during a busy cycle is dropped, not queued");
    assert_eq!(orchestrator.dropped_triggers(), 1);
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(5), first).await.unwrap().unwrap(),
        Some(true)
    );

    stop.send(true).unwrap();
    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test(start_paused = true)]
async fn frame_timeout_fails_the_attempt() {
    let root = temp_root("timeout");
    let (manager, calls) = scripted_manager(vec![head_with(1)], Duration::ZERO);

    // No frame producer: acquisition must time out.
    let handoff = FrameHandoff::new();
    let (_stop, stop_rx) = watch::channel(false);

    let queue = PersistenceQueue::new(16);
    let (ui, mut ui_rx) = UiSink::channel(64);
    tokio::spawn(async move { while ui_rx.recv().await.is_some() {} });

    let stats = Arc::new(InspectionStats::default());
    let mut no_retry = policy();
    no_retry.max_retry_count = 0;
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&manager),
        handoff.clone(),
        queue.clone(),
        ui,
        Arc::clone(&stats),
        DetectionLog::new(&root),
        no_retry,
    ));
    let (req_tx, req_rx) = mpsc::channel(1);
    tokio::spawn(Arc::clone(&orchestrator).run(req_rx, stop_rx));

    let manual = orchestrator.manual_trigger(req_tx);
    let verdict = manual.fire().await;

    assert_eq!(verdict, Some(false));
    assert_eq!(calls.load(Ordering::SeqCst), 0, "no inference without a frame");
    assert_eq!(stats.snapshot(), (1, 0, 1));
    assert!(queue.is_empty(), "nothing to archive without a frame");

    std::fs::remove_dir_all(&root).ok();
}
