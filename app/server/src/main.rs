use anyhow::Result;

use algo_sim::SimulatorConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the process environment still applies.
    dotenv::dotenv().ok();
    algo_sim_server::init_tracing();

    let config = SimulatorConfig::from_env()?;
    tracing::info!(config = ?config, "Configuration loaded");

    algo_sim_server::serve(config).await
}
