use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vigil_camera::CameraConfig;
use vigil_infer::{CascadeRequest, Device, Roi, SessionSettings, TaskType};
use vigil_plc::{MonitorConfig, Protocol};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlcSection {
    pub protocol: Protocol,
    pub ip: String,
    pub port: u16,
    /// Trigger data-register number; the dialect formats the address.
    pub trigger_address: u32,
    /// Result data-register number.
    pub result_address: u32,
    pub poll_ms: u64,
    pub trigger_delay_ms: u64,
}

impl Default for PlcSection {
    fn default() -> Self {
        Self {
            protocol: Protocol::MitsubishiMcBinary,
            ip: "192.168.0.10".to_string(),
            port: 6000,
            trigger_address: 555,
            result_address: 556,
            poll_ms: 500,
            trigger_delay_ms: 800,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CamerasSection {
    pub cameras: Vec<CameraConfig>,
    pub active_camera_id: u32,
}

impl Default for CamerasSection {
    fn default() -> Self {
        Self { cameras: vec![CameraConfig::default()], active_camera_id: 0 }
    }
}

impl CamerasSection {
    pub fn active(&self) -> Option<&CameraConfig> {
        self.cameras.iter().find(|c| c.id() == self.active_camera_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectionSection {
    pub model_path: String,
    pub confidence: f32,
    pub iou: f32,
    /// Suppress across classes instead of per class.
    pub global_iou: bool,
    pub model_version: u32,
    pub task_type: TaskType,
    pub enable_gpu: bool,
    pub gpu_index: i32,
    pub input_width: u32,
    pub input_height: u32,
    pub roi: Option<Roi>,
}

impl Default for DetectionSection {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            confidence: 0.25,
            iou: 0.45,
            global_iou: false,
            model_version: 11,
            task_type: TaskType::Detect,
            enable_gpu: false,
            gpu_index: 0,
            input_width: 640,
            input_height: 640,
            roi: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FallbackSection {
    pub aux1_path: String,
    pub aux2_path: String,
    pub enable_multi_model: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicySection {
    pub target_label: String,
    pub target_count: usize,
    pub max_retry_count: u32,
    pub retry_interval_ms: u64,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            target_label: String::new(),
            target_count: 1,
            max_retry_count: 1,
            retry_interval_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    pub storage_root: PathBuf,
    pub retain_days: u32,
    pub jpeg_quality: u8,
    pub save_queue_capacity: usize,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./data"),
            retain_days: 30,
            jpeg_quality: 75,
            save_queue_capacity: 64,
        }
    }
}

/// Root configuration, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InspectorConfig {
    pub plc: PlcSection,
    pub cameras: CamerasSection,
    pub detection: DetectionSection,
    pub fallback: FallbackSection,
    pub policy: PolicySection,
    pub storage: StorageSection,
}

impl InspectorConfig {
    pub fn session_settings(&self) -> SessionSettings {
        let device = if self.detection.enable_gpu {
            Device::Cuda { device_id: self.detection.gpu_index }
        } else {
            Device::Cpu
        };
        SessionSettings {
            task: self.detection.task_type,
            model_version: self.detection.model_version,
            device,
            input_w: self.detection.input_width,
            input_h: self.detection.input_height,
        }
    }

    pub fn cascade_request(&self) -> CascadeRequest {
        CascadeRequest {
            confidence: self.detection.confidence,
            iou: self.detection.iou,
            class_agnostic_nms: self.detection.global_iou,
            roi: self.detection.roi,
            target_label: if self.policy.target_label.is_empty() {
                None
            } else {
                Some(self.policy.target_label.clone())
            },
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            trigger_address: self.plc.protocol.register_address(self.plc.trigger_address),
            result_address: self.plc.protocol.register_address(self.plc.result_address),
            poll_interval: Duration::from_millis(self.plc.poll_ms),
            trigger_delay: Duration::from_millis(self.plc.trigger_delay_ms),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "config io error: {err}"),
            ConfigError::Parse(msg) => write!(f, "config parse error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

/// Loads and saves the JSON configuration file.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the configuration; a missing file yields defaults and writes
    /// them back so the operator has something to edit.
    pub fn load(&self) -> Result<InspectorConfig, ConfigError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => {
                serde_json::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = InspectorConfig::default();
                self.save(&config)?;
                log::info!("wrote default configuration to {}", self.path.display());
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Atomic save: write to a temp file next to the target, then rename.
    pub fn save(&self, config: &InspectorConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(config)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
