//! Wall-clock time from NTP.
//!
//! The device has no battery-backed RTC, so local time is an NTP anchor plus
//! monotonic time elapsed since the anchor was taken. A failed sync keeps the
//! old anchor.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{self, Instant};
use tracing::{info, warn};

use crate::config::TimeConfig;
use crate::error::TimeError;

const NTP_PORT: u16 = 123;
const NTP_PACKET_LEN: usize = 48;
// Seconds between 1900-01-01 and 1970-01-01.
const NTP_UNIX_OFFSET: i64 = 2_208_988_800;
// LI = 0, VN = 4, Mode = 3 (client).
const SNTP_CLIENT_HEADER: u8 = 0x23;
const MODE_SERVER: u8 = 4;

pub trait TimeSource {
    async fn fetch_utc(&self, host: &str) -> Result<DateTime<Utc>, TimeError>;
}

/// Minimal SNTP v4 client.
#[derive(Debug, Default, Clone, Copy)]
pub struct SntpClient;

impl TimeSource for SntpClient {
    async fn fetch_utc(&self, host: &str) -> Result<DateTime<Utc>, TimeError> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))
            .await
            .map_err(|e| TimeError::Protocol(format!("bind: {e}")))?;
        socket
            .connect((host, NTP_PORT))
            .await
            .map_err(|e| TimeError::Protocol(format!("resolve {host}: {e}")))?;

        let mut request = [0u8; NTP_PACKET_LEN];
        request[0] = SNTP_CLIENT_HEADER;
        socket
            .send(&request)
            .await
            .map_err(|e| TimeError::Protocol(format!("send: {e}")))?;

        let mut response = [0u8; NTP_PACKET_LEN];
        let len = socket
            .recv(&mut response)
            .await
            .map_err(|e| TimeError::Protocol(format!("recv: {e}")))?;
        parse_sntp_response(&response[..len])
    }
}

/// Extracts the transmit timestamp from a server reply.
pub fn parse_sntp_response(packet: &[u8]) -> Result<DateTime<Utc>, TimeError> {
    if packet.len() < NTP_PACKET_LEN {
        return Err(TimeError::Protocol(format!("short packet ({} bytes)", packet.len())));
    }
    if packet[0] & 0x07 != MODE_SERVER {
        return Err(TimeError::Protocol(format!("unexpected mode {}", packet[0] & 0x07)));
    }
    if packet[1] == 0 {
        return Err(TimeError::Protocol("kiss-o'-death from server".into()));
    }

    let seconds = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]);
    let fraction = u32::from_be_bytes([packet[44], packet[45], packet[46], packet[47]]);
    if seconds == 0 {
        return Err(TimeError::Protocol("server sent an empty timestamp".into()));
    }

    let unix = i64::from(seconds) - NTP_UNIX_OFFSET;
    let nanos = ((u64::from(fraction) * 1_000_000_000) >> 32) as u32;
    DateTime::<Utc>::from_timestamp(unix, nanos)
        .ok_or_else(|| TimeError::Protocol(format!("timestamp {unix} out of range")))
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    utc: DateTime<Utc>,
    taken_at: Instant,
}

pub struct TimeService<S> {
    source: S,
    sync_timeout: Duration,
    anchor: Option<Anchor>,
    offset: FixedOffset,
}

impl<S: TimeSource> TimeService<S> {
    pub fn new(source: S, sync_timeout: Duration) -> Self {
        Self {
            source,
            sync_timeout,
            anchor: None,
            offset: Utc.fix(),
        }
    }

    pub fn is_synchronized(&self) -> bool {
        self.anchor.is_some()
    }

    pub async fn synchronize(&mut self, config: &TimeConfig) -> Result<(), TimeError> {
        let total = config.total_offset_seconds();
        let offset = i32::try_from(total)
            .ok()
            .and_then(FixedOffset::east_opt)
            .ok_or(TimeError::InvalidOffset(total))?;

        let utc = match time::timeout(self.sync_timeout, self.source.fetch_utc(&config.ntp_host)).await {
            Ok(Ok(utc)) => utc,
            Ok(Err(e)) => {
                warn!(host = %config.ntp_host, error = %e, "NTP query failed");
                return Err(e);
            }
            Err(_) => {
                warn!(host = %config.ntp_host, timeout_secs = self.sync_timeout.as_secs(), "NTP query timed out");
                return Err(TimeError::SyncTimeout(self.sync_timeout));
            }
        };

        self.anchor = Some(Anchor {
            utc,
            taken_at: Instant::now(),
        });
        self.offset = offset;
        info!(host = %config.ntp_host, utc = %utc, offset_secs = total, "Clock synchronized");
        Ok(())
    }

    pub fn now_local(&self) -> Result<DateTime<FixedOffset>, TimeError> {
        let anchor = self.anchor.ok_or(TimeError::NotYetSynchronized)?;
        let elapsed = chrono::Duration::from_std(anchor.taken_at.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        Ok((anchor.utc + elapsed).with_timezone(&self.offset))
    }
}
