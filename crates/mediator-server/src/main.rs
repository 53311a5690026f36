use mediator_server::{AppConfig, observability, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let config_path = config_path();
    let config = AppConfig::load(config_path.as_deref())?;
    observability::init_tracing(&config.logging.level)?;

    tracing::info!(
        fhir = %config.fhir.url,
        cht = %config.cht.url,
        openmrs = %config.openmrs.url,
        "starting mediator"
    );

    server::run(config).await
}

/// `--config <path>` beats `MEDIATOR_CONFIG`, which beats `mediator.toml`.
fn config_path() -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    std::env::var("MEDIATOR_CONFIG")
        .ok()
        .filter(|p| !p.is_empty())
        .or_else(|| Some("mediator.toml".to_string()))
}
