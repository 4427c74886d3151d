//! Simulated radio and camera so the node runs on a host machine.

use std::collections::HashSet;
use std::time::Duration;
use tokio::time;

use crate::camera::CameraSensor;
use crate::config::WifiCredential;
use crate::error::{AssociationError, CaptureError};
use crate::types::{FrameSize, JpegQuality};
use crate::wifi::WifiRadio;

const ASSOCIATION_LATENCY: Duration = Duration::from_millis(300);
const EXPOSURE_LATENCY: Duration = Duration::from_millis(150);

/// Associates with any network in its reachable set.
#[derive(Debug, Default)]
pub struct SimulatedRadio {
    reachable: HashSet<String>,
    hang_on: HashSet<String>,
    connected: Option<String>,
    attempts: Vec<String>,
}

impl SimulatedRadio {
    pub fn new<I, S>(reachable: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reachable: reachable.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn set_reachable<I, S>(&mut self, reachable: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reachable = reachable.into_iter().map(Into::into).collect();
    }

    /// Association with this network never completes.
    pub fn set_hang_on(&mut self, network_name: impl Into<String>) {
        self.hang_on.insert(network_name.into());
    }

    pub fn drop_link(&mut self) {
        self.connected = None;
    }

    /// Network names in the order association was attempted.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.clone()
    }

    pub fn clear_attempts(&mut self) {
        self.attempts.clear();
    }
}

impl WifiRadio for SimulatedRadio {
    async fn associate(&mut self, credential: &WifiCredential) -> Result<(), AssociationError> {
        self.attempts.push(credential.network_name.clone());
        if self.hang_on.contains(&credential.network_name) {
            std::future::pending::<()>().await;
        }
        time::sleep(ASSOCIATION_LATENCY).await;

        if self.reachable.contains(&credential.network_name) {
            self.connected = Some(credential.network_name.clone());
            Ok(())
        } else {
            Err(AssociationError::NotFound)
        }
    }

    fn is_link_up(&self) -> bool {
        self.connected.is_some()
    }

    async fn disconnect(&mut self) {
        self.connected = None;
    }
}

/// Produces random JPEG-framed payloads sized roughly like a real frame.
#[derive(Debug)]
pub struct SimulatedCamera {
    failure_rate: f32,
    frames_taken: u32,
}

impl SimulatedCamera {
    pub fn new(failure_rate: f32) -> Self {
        Self {
            failure_rate: failure_rate.clamp(0.0, 1.0),
            frames_taken: 0,
        }
    }

    pub fn frames_taken(&self) -> u32 {
        self.frames_taken
    }
}

impl CameraSensor for SimulatedCamera {
    async fn grab_frame(
        &mut self,
        frame_size: FrameSize,
        quality: JpegQuality,
    ) -> Result<Vec<u8>, CaptureError> {
        time::sleep(EXPOSURE_LATENCY).await;

        if self.failure_rate > 0.0 && rand::random::<f32>() < self.failure_rate {
            return Err(CaptureError::SensorBusy);
        }

        // Lower quality numbers compress less, so frames get bigger.
        let (width, height) = frame_size.dimensions();
        let pixels = (width * height) as usize;
        let body_len = (pixels / (8 + quality.value() as usize)).max(64);

        let mut frame = Vec::with_capacity(body_len + 4);
        frame.extend_from_slice(&[0xFF, 0xD8]);
        frame.extend((0..body_len).map(|_| rand::random::<u8>()));
        frame.extend_from_slice(&[0xFF, 0xD9]);

        self.frames_taken += 1;
        Ok(frame)
    }
}
