use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use capture_node::clock::SntpClient;
use capture_node::config::Config;
use capture_node::github::GithubClient;
use capture_node::orchestrator::Orchestrator;
use capture_node::simulate::{SimulatedCamera, SimulatedRadio};
use capture_node::storage::CaptureJournal;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false) {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::load().context("loading configuration")?;
    info!(?config, "Capture node starting");

    let config_dir = Config::get_config_dir();
    let journal_path = env::var("JOURNAL_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir.join("capture_journal.db"));
    let journal = CaptureJournal::open(&journal_path)
        .with_context(|| format!("opening journal {}", journal_path.display()))?;

    // Radio and sensor are simulated on the host.
    let reachable: Vec<String> = match env::var("SIM_REACHABLE_SSIDS") {
        Ok(list) => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => config.wifi.iter().map(|c| c.network_name.clone()).collect(),
    };
    let failure_rate = env::var("SIM_CAMERA_FAILURE_RATE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0);

    let user_agent = format!("{}/{}", config.device.hostname, env!("CARGO_PKG_VERSION"));
    let store = GithubClient::new(&user_agent)?;

    let mut orchestrator = Orchestrator::new(
        config,
        SimulatedRadio::new(reachable),
        SntpClient,
        SimulatedCamera::new(failure_rate),
        store,
        journal,
    );
    orchestrator
        .run(Some(config_dir.join("device_status.json")))
        .await
}
