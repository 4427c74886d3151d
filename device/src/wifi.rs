//! WiFi credential failover.
//!
//! The radio itself is an external collaborator behind [`WifiRadio`]; this
//! module only decides which credential to try next and tracks the
//! resulting [`ConnectionState`].

use std::time::Duration;
use tokio::time;
use tracing::{info, warn};

use crate::config::WifiCredential;
use crate::error::{AssociationError, NetworkError};
use crate::types::ConnectionState;

pub trait WifiRadio {
    /// Runs one 802.11 association and handshake.
    async fn associate(&mut self, credential: &WifiCredential) -> Result<(), AssociationError>;

    fn is_link_up(&self) -> bool;

    async fn disconnect(&mut self);
}

pub struct NetworkConnector<R> {
    radio: R,
    state: ConnectionState,
    last_good: Option<usize>,
    attempt_timeout: Duration,
}

impl<R: WifiRadio> NetworkConnector<R> {
    pub fn new(radio: R, attempt_timeout: Duration) -> Self {
        Self {
            radio,
            state: ConnectionState::Disconnected,
            last_good: None,
            attempt_timeout,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Tries each credential in priority order, stopping at the first success.
    pub async fn connect(
        &mut self,
        credentials: &[WifiCredential],
    ) -> Result<ConnectionState, NetworkError> {
        let order: Vec<usize> = (0..credentials.len()).collect();
        self.attempt_in_order(credentials, &order).await
    }

    /// Leaves a live link alone. Otherwise retries the last credential that
    /// worked before falling back to the full priority order.
    pub async fn reconnect_if_dropped(
        &mut self,
        credentials: &[WifiCredential],
    ) -> Result<ConnectionState, NetworkError> {
        if matches!(self.state, ConnectionState::Connected(_)) && self.radio.is_link_up() {
            return Ok(self.state);
        }

        if matches!(self.state, ConnectionState::Connected(_)) {
            warn!("WiFi link dropped, reconnecting");
            self.radio.disconnect().await;
            self.state = ConnectionState::Disconnected;
        }

        let mut order = Vec::with_capacity(credentials.len());
        if let Some(i) = self.last_good.filter(|i| *i < credentials.len()) {
            order.push(i);
        }
        order.extend((0..credentials.len()).filter(|i| Some(*i) != self.last_good));
        self.attempt_in_order(credentials, &order).await
    }

    async fn attempt_in_order(
        &mut self,
        credentials: &[WifiCredential],
        order: &[usize],
    ) -> Result<ConnectionState, NetworkError> {
        if credentials.is_empty() {
            return Err(NetworkError::NoCredentials);
        }

        for &index in order {
            let credential = &credentials[index];
            self.state = ConnectionState::Connecting(index);
            info!(index, network = %credential.network_name, "Associating with WiFi network");

            match time::timeout(self.attempt_timeout, self.radio.associate(credential)).await {
                Ok(Ok(())) => {
                    self.state = ConnectionState::Connected(index);
                    self.last_good = Some(index);
                    info!(index, network = %credential.network_name, "WiFi connected");
                    return Ok(self.state);
                }
                Ok(Err(e)) => {
                    warn!(index, network = %credential.network_name, error = %e, "WiFi association failed");
                }
                Err(_) => {
                    warn!(
                        index,
                        network = %credential.network_name,
                        timeout_secs = self.attempt_timeout.as_secs(),
                        "WiFi association timed out"
                    );
                    self.radio.disconnect().await;
                }
            }
        }

        self.state = ConnectionState::Exhausted;
        Err(NetworkError::AllCredentialsExhausted {
            attempted: order.len(),
        })
    }
}
