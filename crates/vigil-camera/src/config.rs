use serde::{Deserialize, Serialize};

/// Configuration of one physical camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    id: u32,
    display_name: String,
    serial_number: String,
    exposure_us: f64,
    gain_db: f64,
    enabled: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            id: 0,
            display_name: "camera-0".to_string(),
            serial_number: String::new(),
            exposure_us: 10_000.0,
            gain_db: 0.0,
            enabled: true,
        }
    }
}

impl CameraConfig {
    pub fn with_id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_serial_number(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = serial.into();
        self
    }

    pub fn with_exposure_us(mut self, exposure_us: f64) -> Self {
        self.exposure_us = exposure_us;
        self
    }

    pub fn with_gain_db(mut self, gain_db: f64) -> Self {
        self.gain_db = gain_db;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn exposure_us(&self) -> f64 {
        self.exposure_us
    }

    pub fn gain_db(&self) -> f64 {
        self.gain_db
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}
