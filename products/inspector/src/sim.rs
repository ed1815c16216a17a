//! Loopback devices for bring-up and tests: an in-memory PLC register
//! bank and a synthetic camera. Real vendor adapters implement the same
//! traits out of tree.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use vigil_camera::{Camera, CameraError, FrameHandoff};
use vigil_image::Image;
use vigil_plc::{Plc, PlcError};

/// Shared register bank; clone handles to poke registers from outside.
#[derive(Clone, Default)]
pub struct SimPlc {
    registers: Arc<Mutex<HashMap<String, i16>>>,
}

impl SimPlc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the trigger register, as the line PLC would.
    pub fn set(&self, address: &str, value: i16) {
        self.registers.lock().unwrap_or_else(|e| e.into_inner()).insert(address.to_string(), value);
    }

    pub fn get(&self, address: &str) -> i16 {
        *self
            .registers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(address)
            .unwrap_or(&0)
    }
}

impl Plc for SimPlc {
    async fn connect(&mut self) -> Result<(), PlcError> {
        Ok(())
    }

    async fn disconnect(&mut self) {}

    async fn read_int16(&mut self, address: &str) -> Result<i16, PlcError> {
        Ok(self.get(address))
    }

    async fn write_int16(&mut self, address: &str, value: i16) -> Result<(), PlcError> {
        self.set(address, value);
        Ok(())
    }
}

/// Synthetic camera producing a moving gradient so archived frames are
/// distinguishable.
pub struct SimCamera {
    width: u32,
    height: u32,
    frame_interval: Duration,
    handoff: FrameHandoff,
    producer: Option<tokio::task::JoinHandle<()>>,
    stop: Option<watch::Sender<bool>>,
}

impl SimCamera {
    pub fn new(width: u32, height: u32, fps: u32, handoff: FrameHandoff) -> Self {
        Self {
            width,
            height,
            frame_interval: Duration::from_millis(1000 / fps.max(1) as u64),
            handoff,
            producer: None,
            stop: None,
        }
    }

    fn render(width: u32, height: u32, tick: u64) -> Image {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                let shade = ((x + y + tick as u32) % 256) as u8;
                data.extend_from_slice(&[shade, shade / 2, 255 - shade]);
            }
        }
        Image::new(width, height, 3, data).expect("synthetic frame geometry is valid")
    }
}

impl Camera for SimCamera {
    async fn start(&mut self) -> Result<(), CameraError> {
        if self.producer.is_some() {
            return Ok(());
        }
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let handoff = self.handoff.clone();
        let (width, height, interval) = (self.width, self.height, self.frame_interval);

        self.producer = Some(tokio::spawn(async move {
            let mut tick = 0u64;
            loop {
                handoff.publish(Self::render(width, height, tick));
                tick += 1;
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop_rx.wait_for(|&stop| stop) => break,
                }
            }
        }));
        self.stop = Some(stop_tx);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(true);
        }
        if let Some(producer) = self.producer.take() {
            let _ = producer.await;
        }
    }

    async fn capture_once(&mut self) -> Result<Image, CameraError> {
        Ok(Self::render(self.width, self.height, 0))
    }
}
