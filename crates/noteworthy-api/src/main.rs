mod error;
mod handlers;
mod setup;
mod state;
mod telemetry;

use noteworthy_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize the application (telemetry, services, routes)
    let (_state, router) = crate::setup::initialize_app(config.clone())?;

    // Start the server
    crate::setup::server::start_server(&config, router).await?;

    Ok(())
}
