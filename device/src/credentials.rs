use crate::config::{DeviceIdentity, WifiCredential};
use crate::error::ConfigError;

/// The configured WiFi networks in priority order, plus the device identity.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    credentials: Vec<WifiCredential>,
    device: DeviceIdentity,
}

impl CredentialStore {
    pub fn new(credentials: Vec<WifiCredential>, device: DeviceIdentity) -> Self {
        Self { credentials, device }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.credentials.is_empty() {
            return Err(ConfigError::EmptyCredentialList);
        }
        if let Some(index) = self
            .credentials
            .iter()
            .position(|c| c.network_name.trim().is_empty())
        {
            return Err(ConfigError::MalformedCredential { index });
        }
        Ok(())
    }

    pub fn ordered_credentials(&self) -> &[WifiCredential] {
        &self.credentials
    }

    pub fn device(&self) -> &DeviceIdentity {
        &self.device
    }
}
