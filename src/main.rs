use std::error::Error;
use std::path::Path;

use api::core::app_state::AppConfig;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load environment variables from .env for local development.
    // In containers the variables come from the environment itself.
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    // Optional log file next to the console layer. The guard must stay
    // alive for the lifetime of the process or buffered lines are lost.
    let (file_layer, _guard) = if config.log_file.is_empty() {
        (None, None)
    } else {
        let path = Path::new(&config.log_file);
        let dir = path.parent().filter(|d| !d.as_os_str().is_empty());
        if let Some(dir) = dir {
            std::fs::create_dir_all(dir)?;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "mr-review-bot.log".into());
        let appender =
            tracing_appender::rolling::never(dir.unwrap_or_else(|| Path::new(".")), file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (
            Some(fmt::layer().with_ansi(false).with_writer(writer)),
            Some(guard),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    info!(host = %config.host, port = config.port, "starting mr-review-bot");

    api::start(config).await?;

    Ok(())
}
