//! Scheduled capture-and-upload node for a WiFi security camera.
//!
//! The node wakes, joins the first reachable configured network, syncs its
//! clock over NTP, takes a photo during work hours and commits it to a
//! GitHub repository, then sleeps until the next slot.

pub mod camera;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod github;
pub mod orchestrator;
pub mod reading;
pub mod scheduler;
pub mod simulate;
pub mod status;
pub mod storage;
pub mod types;
pub mod uploader;
pub mod wifi;

#[cfg(test)]
mod testing;
