use inspector::orchestrator::{CyclePolicy, Orchestrator};
use inspector::persistence::{PersistenceQueue, PersistenceWorker, run_retention};
use inspector::sim::{SimCamera, SimPlc};
use inspector::ui::{UiEvent, UiSink};
use inspector::{ConfigStore, DetectionLog, InspectionStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use vigil_camera::{Camera, FrameHandoff};
use vigil_infer::ModelManager;
use vigil_plc::TriggerMonitor;

fn fatal(message: impl std::fmt::Display) -> ! {
    eprintln!("fatal: {message}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    let mut config_path = "inspector.json".to_string();
    let mut simulate = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--simulate" => simulate = true,
            other => config_path = other.to_string(),
        }
    }

    let store = ConfigStore::new(&config_path);
    let config = match store.load() {
        Ok(config) => config,
        Err(e) => fatal(format_args!("cannot load configuration: {e}")),
    };

    let storage_root = config.storage.storage_root.clone();
    if let Err(e) = std::fs::create_dir_all(&storage_root) {
        fatal(format_args!("cannot bind storage root {}: {e}", storage_root.display()));
    }
    if vigil_base::init_file_logger(storage_root.join("Logs").join("App")).is_err() {
        vigil_base::init_stdout_logger();
    }
    log::info!("inspector starting, config {}", store.path().display());

    if !simulate {
        // Vendor camera and PLC adapters are linked out of tree; this
        // binary only ships the loopback pair.
        fatal("no device adapters in this build; run with --simulate");
    }

    let manager = Arc::new(ModelManager::new(config.session_settings()));
    manager.set_fallback_enabled(config.fallback.enable_multi_model);
    manager.set_task_mode(config.detection.task_type);
    for (what, path) in [
        ("primary", &config.detection.model_path),
        ("auxiliary1", &config.fallback.aux1_path),
        ("auxiliary2", &config.fallback.aux2_path),
    ] {
        let result = match what {
            "primary" => manager.load_primary(path),
            "auxiliary1" => manager.load_auxiliary1(path),
            _ => manager.load_auxiliary2(path),
        };
        if let Err(e) = result {
            log::error!("could not load {what} model '{path}': {e}");
        }
    }

    let handoff = FrameHandoff::new();
    let (ui, mut ui_rx) = UiSink::channel(32);
    tokio::spawn(async move {
        while let Some(event) = ui_rx.recv().await {
            match event {
                UiEvent::Stats { total, ok, ng } => {
                    log::info!("stats: total {total}, ok {ok}, ng {ng}")
                }
                UiEvent::Result { passed } => {
                    log::info!("result: {}", if passed { "PASS" } else { "FAIL" })
                }
                UiEvent::Metrics(m) => log::debug!(
                    "timings: pre {:.1} ms, infer {:.1} ms, post {:.1} ms ({:.1} fps)",
                    m.preprocess_ms,
                    m.inference_ms,
                    m.postprocess_ms,
                    m.fps()
                ),
                UiEvent::Image(image) => log::debug!("result image {image:?}"),
                UiEvent::Log { level, message } => log::log!(level, "{message}"),
            }
        }
    });

    let queue = PersistenceQueue::new(config.storage.save_queue_capacity);
    let (persist_stop, persist_stop_rx) = watch::channel(false);
    let persistence_task = tokio::spawn(
        PersistenceWorker::new(
            queue.clone(),
            storage_root.clone(),
            config.storage.jpeg_quality,
            persist_stop_rx,
        )
        .run(),
    );
    let retention_task = tokio::spawn(run_retention(
        storage_root.clone(),
        config.storage.retain_days,
        persist_stop.subscribe(),
    ));

    let (stop, stop_rx) = watch::channel(false);
    let (requests, request_rx) = mpsc::channel(1);

    let policy = CyclePolicy {
        cascade: config.cascade_request(),
        target_label: config.policy.target_label.clone(),
        target_count: config.policy.target_count,
        max_retry_count: config.policy.max_retry_count,
        retry_interval: Duration::from_millis(config.policy.retry_interval_ms),
    };
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&manager),
        handoff.clone(),
        queue.clone(),
        ui.clone(),
        Arc::new(InspectionStats::default()),
        DetectionLog::new(&storage_root),
        policy,
    ));
    let orchestrator_task =
        tokio::spawn(Arc::clone(&orchestrator).run(request_rx, stop_rx.clone()));

    let mut camera = SimCamera::new(1280, 720, 25, handoff.clone());
    if let Err(e) = camera.start().await {
        log::error!("camera start failed: {e}");
    }

    let plc = SimPlc::new();
    let monitor_config = config.monitor_config();
    let trigger_address = monitor_config.trigger_address.clone();
    let monitor = TriggerMonitor::new(plc.clone(), monitor_config, requests, stop_rx.clone());
    let monitor_task = tokio::spawn(monitor.run());

    // Simulated line: raise the trigger register every few seconds.
    let line_plc = plc.clone();
    let mut line_stop = stop_rx.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(5)) => {
                    line_plc.set(&trigger_address, 1);
                }
                _ = line_stop.wait_for(|&s| s) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await.ok();
    log::info!("shutdown requested");

    // Stop order: trigger loop first, drain the in-flight cycle, then
    // flush persistence, release sessions, release the camera.
    stop.send(true).ok();
    let _ = monitor_task.await;
    let _ = orchestrator_task.await;
    persist_stop.send(true).ok();
    let _ = persistence_task.await;
    let _ = retention_task.await;
    camera.stop().await;
    drop(manager);
    log::info!("inspector stopped");
}
