use anyhow::Context;
use content_core::{config::Config, init_tracing, services::AppState};

/// Prints the current menu tree as JSON.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    init_tracing(config.log_json);

    tracing::info!(
        "Configuration loaded for environment: {:?}",
        std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string())
    );

    if !config.storage.is_persistent() {
        tracing::warn!(
            "Storage backend {:?} keeps content in memory only; the tree below starts empty",
            config.storage
        );
    }

    let state = AppState::new(config)
        .await
        .context("Failed to initialize application state")?;

    let tree = state.menus.tree().await.context("Failed to load menu tree")?;
    let menus: usize = tree.iter().map(|node| node.menu_count()).sum();
    tracing::info!("Loaded {} root menus ({} menus total)", tree.len(), menus);

    println!("{}", serde_json::to_string_pretty(&tree)?);

    Ok(())
}
