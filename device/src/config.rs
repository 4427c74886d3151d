use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::credentials::CredentialStore;
use crate::error::ConfigError;
use crate::types::{FrameSize, JpegQuality};

const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

#[derive(Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct WifiCredential {
    pub network_name: String,
    pub secret: String,
}

impl WifiCredential {
    pub fn new(network_name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            network_name: network_name.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for WifiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WifiCredential")
            .field("network_name", &self.network_name)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize, Serialize, Clone)]
pub struct DeviceIdentity {
    pub admin_password: String,
    pub hostname: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            admin_password: String::new(),
            hostname: "esp32-cam-security".to_string(),
        }
    }
}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("admin_password", &"<redacted>")
            .field("hostname", &self.hostname)
            .finish()
    }
}

/// Where captures are committed. The token is a capability and is never printed.
#[derive(Deserialize, Serialize, Clone)]
pub struct UploadTarget {
    pub auth_token: String,
    pub owner: String,
    pub repository: String,
    pub branch: String,
    #[serde(default)]
    pub path_prefix: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

impl UploadTarget {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("auth_token", &self.auth_token),
            ("owner", &self.owner),
            ("repository", &self.repository),
            ("branch", &self.branch),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ConfigError::IncompleteUploadTarget(name));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadTarget")
            .field("auth_token", &"<redacted>")
            .field("owner", &self.owner)
            .field("repository", &self.repository)
            .field("branch", &self.branch)
            .field("path_prefix", &self.path_prefix)
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TimeConfig {
    pub utc_offset_seconds: i64,
    pub dst_offset_seconds: i64,
    pub ntp_host: String,
}

impl TimeConfig {
    pub fn total_offset_seconds(&self) -> i64 {
        self.utc_offset_seconds + self.dst_offset_seconds
    }
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            utc_offset_seconds: 0,
            dst_offset_seconds: 0,
            ntp_host: "pool.ntp.org".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub work_start_hour: i32,
    pub work_end_hour: i32,
    pub interval_hours: i32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            work_start_hour: 7,
            work_end_hour: 18,
            interval_hours: 3,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ImageConfig {
    pub quality: JpegQuality,
    pub frame_size: FrameSize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            quality: JpegQuality::default(),
            frame_size: FrameSize::Uxga,
        }
    }
}

/// Timeouts, delays and caps for the capture cycle.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeTuning {
    pub connect_timeout_secs: u64,
    pub ntp_timeout_secs: u64,
    pub retry_delay_secs: u64,
    pub max_sleep_secs: u64,
    pub failure_cap: u32,
}

impl RuntimeTuning {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn ntp_timeout(&self) -> Duration {
        Duration::from_secs(self.ntp_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn max_sleep(&self) -> Duration {
        Duration::from_secs(self.max_sleep_secs)
    }

    /// Zero timeouts fail every attempt at once; zero delays spin the cycle.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("ntp_timeout_secs", self.ntp_timeout_secs),
            ("retry_delay_secs", self.retry_delay_secs),
            ("max_sleep_secs", self.max_sleep_secs),
            ("failure_cap", u64::from(self.failure_cap)),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroTuning(field));
            }
        }
        Ok(())
    }
}

impl Default for RuntimeTuning {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 15,
            ntp_timeout_secs: 10,
            retry_delay_secs: 60,
            max_sleep_secs: 15 * 60,
            failure_cap: 3,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub wifi: Vec<WifiCredential>,
    #[serde(default)]
    pub device: DeviceIdentity,
    pub upload: UploadTarget,
    #[serde(default)]
    pub time: TimeConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub tuning: RuntimeTuning,
}

impl Config {
    /// Reads `device_config.json` if present, otherwise builds from the
    /// environment. Environment variables win over file values.
    pub fn load() -> Result<Self> {
        let path = Self::get_config_file_path();
        if !path.exists() {
            return Self::from_env();
        }
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        let mut config = Config {
            wifi: wifi_credentials_from_env(),
            device: DeviceIdentity::default(),
            upload: UploadTarget {
                auth_token: String::new(),
                owner: String::new(),
                repository: String::new(),
                branch: "main".to_string(),
                path_prefix: None,
                api_base_url: default_api_base_url(),
            },
            time: TimeConfig::default(),
            schedule: ScheduleConfig::default(),
            image: ImageConfig::default(),
            tuning: RuntimeTuning::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        let wifi = wifi_credentials_from_env();
        if !wifi.is_empty() {
            self.wifi = wifi;
        }

        if let Ok(v) = env::var("DEVICE_PASSWORD") {
            self.device.admin_password = v;
        }
        if let Ok(v) = env::var("DEVICE_HOSTNAME") {
            self.device.hostname = v;
        }

        if let Ok(v) = env::var("GITHUB_TOKEN") {
            self.upload.auth_token = v;
        }
        if let Ok(v) = env::var("GITHUB_OWNER") {
            self.upload.owner = v;
        }
        if let Ok(v) = env::var("GITHUB_REPO") {
            self.upload.repository = v;
        }
        if let Ok(v) = env::var("GITHUB_BRANCH") {
            self.upload.branch = v;
        }
        if let Ok(v) = env::var("GITHUB_PATH_PREFIX") {
            self.upload.path_prefix = Some(v).filter(|p| !p.trim().is_empty());
        }
        if let Ok(v) = env::var("GITHUB_API_URL") {
            self.upload.api_base_url = v;
        }

        if let Some(v) = env_parse::<i64>("GMT_OFFSET_SEC")? {
            self.time.utc_offset_seconds = v;
        }
        if let Some(v) = env_parse::<i64>("DAYLIGHT_OFFSET_SEC")? {
            self.time.dst_offset_seconds = v;
        }
        if let Ok(v) = env::var("NTP_SERVER") {
            self.time.ntp_host = v;
        }

        if let Some(v) = env_parse::<i32>("WORK_START_HOUR")? {
            self.schedule.work_start_hour = v;
        }
        if let Some(v) = env_parse::<i32>("WORK_END_HOUR")? {
            self.schedule.work_end_hour = v;
        }
        if let Some(v) = env_parse::<i32>("PHOTO_INTERVAL")? {
            self.schedule.interval_hours = v;
        }

        if let Some(q) = env_parse::<i64>("JPEG_QUALITY")? {
            self.image.quality = JpegQuality::try_from(q).context("JPEG_QUALITY")?;
        }
        if let Some(code) = env_parse::<i64>("FRAME_SIZE")? {
            self.image.frame_size = FrameSize::try_from(code).context("FRAME_SIZE")?;
        }
        Ok(())
    }

    /// Checks every invariant the capture cycle relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        CredentialStore::new(self.wifi.clone(), self.device.clone()).validate()?;
        self.upload.validate()?;

        for (field, value) in [
            ("work_start_hour", self.schedule.work_start_hour),
            ("work_end_hour", self.schedule.work_end_hour),
        ] {
            if !(0..=23).contains(&value) {
                return Err(ConfigError::HourOutOfRange { field, value });
            }
        }

        let offset = self.time.total_offset_seconds();
        if offset.abs() >= 86_400 {
            return Err(ConfigError::InvalidUtcOffset(offset));
        }
        self.tuning.validate()
    }

    pub fn get_config_dir() -> PathBuf {
        PathBuf::from(env::var("CONFIG_DIR").unwrap_or_else(|_| ".".to_string()))
    }

    fn get_config_file_path() -> PathBuf {
        Self::get_config_dir().join("device_config.json")
    }

    pub fn load_from_file() -> Result<Self> {
        Self::load_from_path(&Self::get_config_file_path())
    }

    pub fn load_from_path(path: &std::path::Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to_file(&self) -> Result<()> {
        self.save_to_path(&Self::get_config_file_path())
    }

    pub fn save_to_path(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;
        Ok(())
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

// WIFI_SSID_1/WIFI_PASSWORD_1, WIFI_SSID_2/... until the first missing SSID.
fn wifi_credentials_from_env() -> Vec<WifiCredential> {
    (1..)
        .map_while(|n| {
            let ssid = env::var(format!("WIFI_SSID_{n}")).ok()?;
            let password = env::var(format!("WIFI_PASSWORD_{n}")).unwrap_or_default();
            Some(WifiCredential::new(ssid, password))
        })
        .collect()
}

/// `None` when unset. A set value must parse into `T` in full.
fn env_parse<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) => {
            let parsed = raw.trim().parse::<T>();
            match parsed {
                Ok(v) => Ok(Some(v)),
                Err(_) => Err(ConfigError::InvalidEnvValue { key, value: raw }),
            }
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_config;
    use std::sync::{Mutex, MutexGuard};

    const ENV_KEYS: &[&str] = &[
        "CONFIG_DIR",
        "WIFI_SSID_1",
        "WIFI_PASSWORD_1",
        "WIFI_SSID_2",
        "WIFI_PASSWORD_2",
        "WIFI_SSID_3",
        "WIFI_SSID_4",
        "WIFI_PASSWORD_4",
        "DEVICE_PASSWORD",
        "DEVICE_HOSTNAME",
        "GITHUB_TOKEN",
        "GITHUB_OWNER",
        "GITHUB_REPO",
        "GITHUB_BRANCH",
        "GITHUB_PATH_PREFIX",
        "GITHUB_API_URL",
        "GMT_OFFSET_SEC",
        "DAYLIGHT_OFFSET_SEC",
        "NTP_SERVER",
        "WORK_START_HOUR",
        "WORK_END_HOUR",
        "PHOTO_INTERVAL",
        "JPEG_QUALITY",
        "FRAME_SIZE",
    ];

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Serializes tests that touch the process environment and clears every
    /// config variable before and after.
    struct EnvGuard {
        _lock: MutexGuard<'static, ()>,
    }

    impl EnvGuard {
        fn new() -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
            ENV_KEYS.iter().for_each(|key| env::remove_var(key));
            Self { _lock: lock }
        }

        fn set(&self, key: &'static str, value: &str) {
            assert!(ENV_KEYS.contains(&key), "{key} is not cleared by the guard");
            env::set_var(key, value);
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            ENV_KEYS.iter().for_each(|key| env::remove_var(key));
        }
    }

    #[test]
    fn sample_config_is_valid() {
        assert_eq!(sample_config().validate(), Ok(()));
    }

    #[test]
    fn empty_token_is_rejected() {
        let mut config = sample_config();
        config.upload.auth_token = " ".into();
        assert_eq!(
            config.validate(),
            Err(ConfigError::IncompleteUploadTarget("auth_token"))
        );
    }

    #[test]
    fn hours_outside_day_are_rejected_but_inverted_window_is_not() {
        let mut config = sample_config();
        config.schedule.work_end_hour = 24;
        assert_eq!(
            config.validate(),
            Err(ConfigError::HourOutOfRange { field: "work_end_hour", value: 24 })
        );

        config.schedule = ScheduleConfig {
            work_start_hour: 22,
            work_end_hour: 6,
            interval_hours: 0,
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn offset_of_a_full_day_is_rejected() {
        let mut config = sample_config();
        config.time.utc_offset_seconds = 86_000;
        config.time.dst_offset_seconds = 3_600;
        assert_eq!(config.validate(), Err(ConfigError::InvalidUtcOffset(89_600)));
    }

    #[test]
    fn zero_tuning_values_are_rejected() {
        let fields: [(&str, fn(&mut RuntimeTuning)); 5] = [
            ("connect_timeout_secs", |t| t.connect_timeout_secs = 0),
            ("ntp_timeout_secs", |t| t.ntp_timeout_secs = 0),
            ("retry_delay_secs", |t| t.retry_delay_secs = 0),
            ("max_sleep_secs", |t| t.max_sleep_secs = 0),
            ("failure_cap", |t| t.failure_cap = 0),
        ];
        for (field, zero) in fields {
            let mut config = sample_config();
            zero(&mut config.tuning);
            assert_eq!(config.validate(), Err(ConfigError::ZeroTuning(field)));
        }
    }

    #[test]
    fn env_overrides_file_values() {
        let env = EnvGuard::new();
        let dir = tempfile::tempdir().unwrap();
        sample_config()
            .save_to_path(&dir.path().join("device_config.json"))
            .unwrap();

        env.set("CONFIG_DIR", dir.path().to_str().unwrap());
        env.set("WORK_START_HOUR", " 8 ");
        env.set("GMT_OFFSET_SEC", "-3600");
        env.set("JPEG_QUALITY", "12");
        env.set("FRAME_SIZE", "8");
        env.set("GITHUB_BRANCH", "captures");
        env.set("GITHUB_PATH_PREFIX", "  ");

        let config = Config::load().unwrap();
        assert_eq!(config.schedule.work_start_hour, 8);
        assert_eq!(config.schedule.work_end_hour, 18);
        assert_eq!(config.time.utc_offset_seconds, -3_600);
        assert_eq!(config.image.quality.value(), 12);
        assert_eq!(config.image.frame_size, FrameSize::Vga);
        assert_eq!(config.upload.branch, "captures");
        assert_eq!(config.upload.path_prefix, None);
        assert_eq!(config.upload.auth_token, "ghp_secret");
        assert_eq!(config.wifi, sample_config().wifi);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn env_alone_builds_a_config_and_stops_at_first_missing_ssid() {
        let env = EnvGuard::new();
        let dir = tempfile::tempdir().unwrap();
        env.set("CONFIG_DIR", dir.path().to_str().unwrap());
        env.set("WIFI_SSID_1", "home");
        env.set("WIFI_PASSWORD_1", "pw1");
        env.set("WIFI_SSID_2", "workshop");
        env.set("WIFI_SSID_4", "never-read");
        env.set("WIFI_PASSWORD_4", "pw4");
        env.set("GITHUB_TOKEN", "token");
        env.set("GITHUB_OWNER", "owner");
        env.set("GITHUB_REPO", "repo");

        let config = Config::load().unwrap();
        assert_eq!(
            config.wifi,
            vec![
                WifiCredential::new("home", "pw1"),
                WifiCredential::new("workshop", ""),
            ]
        );
        assert_eq!(config.upload.branch, "main");
        assert_eq!(config.schedule, ScheduleConfig::default());
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn unusable_env_numbers_fail_the_load() {
        let env = EnvGuard::new();

        env.set("WORK_START_HOUR", "4294967303");
        let err = Config::from_env().unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::InvalidEnvValue {
                key: "WORK_START_HOUR",
                value: "4294967303".into()
            })
        );

        env.set("WORK_START_HOUR", "seven");
        assert!(Config::from_env().is_err());
        env.set("WORK_START_HOUR", "7");

        for value in ["abc", "100", "0"] {
            env.set("JPEG_QUALITY", value);
            assert!(Config::from_env().is_err(), "JPEG_QUALITY={value} accepted");
        }
        env.set("JPEG_QUALITY", "10");

        env.set("FRAME_SIZE", "99");
        assert!(Config::from_env().is_err());
        env.set("FRAME_SIZE", "13");
        assert_eq!(Config::from_env().unwrap().image.frame_size, FrameSize::Uxga);
    }

    #[test]
    fn debug_output_hides_secrets() {
        let rendered = format!("{:?}", sample_config());
        assert!(!rendered.contains("ghp_secret"));
        assert!(!rendered.contains("PASSWORD1"));
        assert!(!rendered.contains("\"admin\""));
        assert!(rendered.contains("SSID1"));
    }

    #[test]
    fn file_round_trip_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("device_config.json");
        let config = sample_config();
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.wifi, config.wifi);
        assert_eq!(loaded.upload.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(loaded.schedule, config.schedule);
        assert_eq!(loaded.image, config.image);
        assert_eq!(loaded.tuning.connect_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn minimal_file_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_config.json");
        fs::write(
            &path,
            r#"{
                "wifi": [{"network_name": "home", "secret": "pw"}],
                "upload": {"auth_token": "t", "owner": "o", "repository": "r", "branch": "main"}
            }"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.schedule, ScheduleConfig::default());
        assert_eq!(config.image.frame_size, FrameSize::Uxga);
        assert_eq!(config.image.quality.value(), 10);
        assert_eq!(config.time.ntp_host, "pool.ntp.org");
        assert_eq!(config.tuning.failure_cap, 3);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn bad_frame_size_fails_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device_config.json");
        fs::write(
            &path,
            r#"{
                "wifi": [{"network_name": "home", "secret": "pw"}],
                "upload": {"auth_token": "t", "owner": "o", "repository": "r", "branch": "main"},
                "image": {"quality": 10, "frame_size": 99}
            }"#,
        )
        .unwrap();

        assert!(Config::load_from_path(&path).is_err());
    }
}
