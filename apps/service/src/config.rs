//! Env-driven service configuration.

use std::env;
use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

use thiserror::Error;

#[derive(Clone, Debug)]
pub struct Config {
    pub service_name: String,
    pub bind_addr: SocketAddr,
    pub confirmation_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub event_queue_capacity: usize,
    pub adapter_driver: String,
    pub sim_step_delay: Duration,
    pub profile_path: Option<String>,
    pub seed_demo_jobs: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid AUTOAPPLY_BIND_ADDR: {0}")]
    BindAddrParse(#[from] AddrParseError),
    #[error("invalid AUTOAPPLY_CONFIRMATION_TIMEOUT_SECS: {0}")]
    InvalidConfirmationTimeout(String),
    #[error("invalid AUTOAPPLY_HEARTBEAT_SECS: {0}")]
    InvalidHeartbeat(String),
    #[error("invalid AUTOAPPLY_EVENT_QUEUE_CAPACITY: {0}")]
    InvalidEventQueueCapacity(String),
    #[error("invalid AUTOAPPLY_SIM_STEP_DELAY_MS: {0}")]
    InvalidSimStepDelay(String),
    #[error("unknown AUTOAPPLY_ADAPTER_DRIVER: {0} (expected \"simulated\")")]
    UnknownAdapterDriver(String),
    #[error("invalid AUTOAPPLY_SEED_DEMO_JOBS: {0} (expected \"true\" or \"false\")")]
    InvalidSeedDemoJobs(String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = env::var("AUTOAPPLY_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:4200".to_string())
            .parse()?;
        let service_name =
            env::var("AUTOAPPLY_SERVICE_NAME").unwrap_or_else(|_| "autoapply".to_string());
        let confirmation_timeout = env::var("AUTOAPPLY_CONFIRMATION_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|error| ConfigError::InvalidConfirmationTimeout(error.to_string()))?;
        let heartbeat_interval = env::var("AUTOAPPLY_HEARTBEAT_SECS")
            .unwrap_or_else(|_| "15".to_string())
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|error| ConfigError::InvalidHeartbeat(error.to_string()))?;
        let event_queue_capacity = env::var("AUTOAPPLY_EVENT_QUEUE_CAPACITY")
            .unwrap_or_else(|_| "64".to_string())
            .parse::<usize>()
            .map_err(|error| ConfigError::InvalidEventQueueCapacity(error.to_string()))?;
        let adapter_driver =
            env::var("AUTOAPPLY_ADAPTER_DRIVER").unwrap_or_else(|_| "simulated".to_string());
        if adapter_driver != "simulated" {
            return Err(ConfigError::UnknownAdapterDriver(adapter_driver));
        }
        let sim_step_delay = env::var("AUTOAPPLY_SIM_STEP_DELAY_MS")
            .unwrap_or_else(|_| "0".to_string())
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|error| ConfigError::InvalidSimStepDelay(error.to_string()))?;
        let profile_path = env::var("AUTOAPPLY_PROFILE_PATH")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let seed_demo_jobs = match env::var("AUTOAPPLY_SEED_DEMO_JOBS")
            .unwrap_or_else(|_| "true".to_string())
            .as_str()
        {
            "true" | "1" => true,
            "false" | "0" => false,
            other => return Err(ConfigError::InvalidSeedDemoJobs(other.to_string())),
        };

        Ok(Self {
            service_name,
            bind_addr,
            confirmation_timeout,
            heartbeat_interval,
            event_queue_capacity,
            adapter_driver,
            sim_step_delay,
            profile_path,
            seed_demo_jobs,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "autoapply".to_string(),
            bind_addr: std::net::SocketAddr::from(([127, 0, 0, 1], 4200)),
            confirmation_timeout: Duration::from_secs(300),
            heartbeat_interval: Duration::from_secs(15),
            event_queue_capacity: 64,
            adapter_driver: "simulated".to_string(),
            sim_step_delay: Duration::ZERO,
            profile_path: None,
            seed_demo_jobs: true,
        }
    }
}
