use civicgate_infra::module_handlers::ModuleCollaborators;
use civicgate_infra::{Gateway, GatewayConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            civicgate_observability::init();
            tracing::error!(error = %e, "invalid gateway configuration");
            return Err(e.into());
        }
    };
    civicgate_observability::init_with(config.log_format);

    let gateway = Gateway::connect(&config).await?;

    // Until the citizenship and notification modules ship their own
    // persistence, their handlers write into process-local collaborators.
    let (collaborators, _citizens, _outbox) = ModuleCollaborators::in_memory();
    gateway.register_modules(&collaborators)?;

    tracing::info!(
        handler_timeout_ms = config.handler_timeout.as_millis() as u64,
        max_query_limit = config.max_query_limit,
        "integration gateway ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}
