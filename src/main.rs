use anyhow::{Context, Result};
use sitp_geocoder::{init_tracing, run, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = AppConfig::from_env();
    run(&config)
        .await
        .with_context(|| format!("failed to geocode {}", config.input_csv.display()))?;
    Ok(())
}
