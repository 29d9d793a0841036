use market_server::Config;
use market_server::logger::init_logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;
    init_logger(config.log_level.as_deref(), config.log_json, config.log_dir.as_deref());

    tracing::info!(
        environment = %config.environment,
        port = config.http_port,
        "Starting market-server"
    );

    if let Err(e) = market_server::run(config).await {
        tracing::error!(error = ?e, "Server error");
        return Err(e);
    }
    Ok(())
}
