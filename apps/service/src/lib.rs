#![forbid(unsafe_code)]

//! One-click apply service: HTTP surface over the apply engine.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;

use apply_engine::{
    AdapterFactory, ApplyEngine, EngineSettings, InMemoryJobStore, JobId, JobPosting, JobStore,
    Platform, StaticProfile,
};

use crate::config::Config;
use crate::server::{AppState, build_router};
use crate::sim::SimulatedAdapterFactory;

pub mod config;
pub mod server;
pub mod sim;

/// Demo postings so a fresh service has something to apply to.
fn seed_demo_jobs(store: &InMemoryJobStore) {
    store.insert_job(JobPosting {
        job_id: JobId::from("acme::staff-engineer"),
        title: "Staff Engineer".to_string(),
        company: "Acme".to_string(),
        url: "https://www.linkedin.com/jobs/view/1001".to_string(),
        platform: Platform::LinkedIn,
    });
    store.insert_job(JobPosting {
        job_id: JobId::from("globex::platform-engineer"),
        title: "Platform Engineer".to_string(),
        company: "Globex".to_string(),
        url: "https://boards.greenhouse.io/globex/jobs/2002".to_string(),
        platform: Platform::Other,
    });
}

pub fn build_state(config: Config) -> Result<AppState> {
    let store = Arc::new(InMemoryJobStore::new());
    if config.seed_demo_jobs {
        seed_demo_jobs(&store);
        info!(jobs = store.job_count(), "seeded demo job postings");
    }
    let profile = match config.profile_path.as_deref() {
        Some(path) => StaticProfile::from_path(Path::new(path))?,
        None => StaticProfile::sample(),
    };
    let adapters: Arc<dyn AdapterFactory> =
        Arc::new(SimulatedAdapterFactory::new(config.sim_step_delay));
    let engine = Arc::new(ApplyEngine::new(
        store as Arc<dyn JobStore>,
        adapters,
        Arc::new(profile),
        EngineSettings {
            confirmation_timeout: config.confirmation_timeout,
            heartbeat_interval: config.heartbeat_interval,
            queue_capacity: config.event_queue_capacity,
        },
    ));
    Ok(AppState::new(config, engine))
}

pub fn build_app(config: Config) -> Result<axum::Router> {
    Ok(build_router(build_state(config)?))
}

pub async fn serve(config: Config) -> Result<()> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(
        service = %config.service_name,
        bind_addr = %config.bind_addr,
        adapter_driver = %config.adapter_driver,
        "autoapply service listening"
    );
    axum::serve(listener, build_app(config)?).await?;
    Ok(())
}
