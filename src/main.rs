use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use levelpilot::account::AccountStore;
use levelpilot::config::Config;
use levelpilot::gateway::create_gateway;
use levelpilot::server::{ApiServer, ApiState};
use levelpilot::supervisor::TaskSupervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present; real env always wins.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        bind = %config.bind_addr,
        max_accounts = config.max_accounts,
        cycle_wait_secs = config.supervisor.cycle_wait.as_secs(),
        "Starting levelpilot"
    );

    let store = Arc::new(AccountStore::new(config.max_accounts));
    let gateway = create_gateway(&config.gateway);
    let supervisor = Arc::new(TaskSupervisor::new(
        Arc::clone(&store),
        gateway,
        config.supervisor.clone(),
    ));

    ApiServer::start(ApiState { store, supervisor }, config.bind_addr).await
}
