use billing_core::observability::init_tracing;
use billing_service::config::BillingConfig;
use billing_service::startup::Application;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = BillingConfig::load()?;
    init_tracing(&config.service_name, &config.common.log_level);

    let app = Application::build(config).await?;
    app.run_until_stopped().await?;

    Ok(())
}
