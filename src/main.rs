/// Content Storage - multipart file upload and retrieval service
use content_storage::{config::ServerConfig, context::AppContext, error::StorageResult, server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> StorageResult<()> {
    // Load configuration (reads .env first)
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            format!(
                "content_storage={level},tower_http={level}",
                level = config.logging.level
            )
            .into()
        });
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // Print banner
    print_banner();

    // Create application context
    let ctx = AppContext::new(config).await?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
   ______            __             __     _____ __
  / ____/___  ____  / /____  ____  / /_   / ___// /_____  ________
 / /   / __ \/ __ \/ __/ _ \/ __ \/ __/   \__ \/ __/ __ \/ ___/ _ \
/ /___/ /_/ / / / / /_/  __/ / / / /_    ___/ / /_/ /_/ / /  /  __/
\____/\____/_/ /_/\__/\___/_/ /_/\__/   /____/\__/\____/_/   \___/

        Content Storage Service v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
