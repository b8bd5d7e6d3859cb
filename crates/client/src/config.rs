use crate::poller::{PollConfig, DEFAULT_MAX_CONSECUTIVE_ERRORS, DEFAULT_POLL_INTERVAL};
use clap::Args;
use std::time::Duration;

pub const DEFAULT_SERVICE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_DEM_SOURCE: &str = "srtm";

#[derive(Clone, Debug, Args)]
pub struct ClientConfig {
    #[arg(
        long,
        long_help = "Base URL of the analysis service",
        env = "TERRAVIGIL_SERVICE_URL",
        default_value = DEFAULT_SERVICE_URL
    )]
    pub service_url: String,

    #[arg(
        long,
        long_help = "Delay between two job status requests, in milliseconds",
        env = "TERRAVIGIL_POLL_INTERVAL_MS",
        default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64
    )]
    pub poll_interval_ms: u64,

    #[arg(
        long,
        long_help = "Consecutive failed status requests after which polling is abandoned",
        env = "TERRAVIGIL_MAX_POLL_ERRORS",
        default_value_t = DEFAULT_MAX_CONSECUTIVE_ERRORS
    )]
    pub max_poll_errors: u32,

    #[arg(
        long,
        long_help = "Timeout of a single HTTP request, in seconds",
        env = "TERRAVIGIL_REQUEST_TIMEOUT_SECS",
        default_value_t = 120
    )]
    pub request_timeout_secs: u64,

    #[arg(
        long,
        long_help = "DEM source tag used when the service fetches the elevation model itself",
        env = "TERRAVIGIL_DEM_SOURCE",
        default_value = DEFAULT_DEM_SOURCE
    )]
    pub dem_source: String,
}

impl ClientConfig {
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            // A bound of zero would abort before the first retry could run.
            max_consecutive_errors: self.max_poll_errors.max(1),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            max_poll_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            request_timeout_secs: 120,
            dem_source: DEFAULT_DEM_SOURCE.to_string(),
        }
    }
}
