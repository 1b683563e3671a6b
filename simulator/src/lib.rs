//! Development backend for the irrigation dashboard: the REST endpoints the
//! dashboard consumes, a `/ws` push channel, and simulated sensor readings.

pub mod dummy_samples;
pub mod sample_task;
pub mod state;
pub mod web;

use irrigation_shared::api::RemoteUser;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinHandle;

pub use state::AppState;

pub const DEMO_EMAIL: &str = "demo@farm.io";
pub const DEMO_PASSWORD: &str = "demo";

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub machines: Vec<String>,
    pub sample_every: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            machines: vec!["m-1".to_string(), "m-2".to_string()],
            sample_every: Duration::from_secs(2),
        }
    }
}

/// State with the configured machines and the demo account.
pub fn build_state(config: &SimConfig) -> AppState {
    let state = AppState::new(config.machines.iter().cloned());
    state.add_user(
        RemoteUser {
            id: "000000000000000000000001".to_string(),
            fname: "Demo".to_string(),
            lname: "Farmer".to_string(),
            hub: "Main Hub".to_string(),
            location_user: "Arusha".to_string(),
            email: DEMO_EMAIL.to_string(),
            role: "admin".to_string(),
            permissions: vec!["read".to_string(), "write".to_string()],
        },
        DEMO_PASSWORD.to_string(),
    );
    state
}

/// Binds `addr`, starts the sampler and the web server in the background.
/// Returns the bound address (useful with port 0) and the server task.
pub async fn spawn(
    addr: &str,
    config: SimConfig,
) -> anyhow::Result<(SocketAddr, AppState, JoinHandle<()>)> {
    let state = build_state(&config);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;

    let sampler = tokio::spawn(sample_task::sample_task(state.clone(), config.sample_every));
    let app = web::router(state.clone());

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            log::warn!("simulator server stopped: {e}");
        }
        sampler.abort();
    });

    Ok((local, state, server))
}
