use anyhow::{anyhow, ensure, Context};
use content_core::{
    config::Config,
    init_tracing,
    services::{
        catalog_import::{import_catalog, CatalogImport},
        AppState,
    },
};

/// Usage: import_catalog <catalog.json>
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    init_tracing(config.log_json);

    ensure!(
        config.storage.is_persistent(),
        "import_catalog needs a persistent storage backend; set storage.backend = \"mongo\""
    );

    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow!("usage: import_catalog <catalog.json>"))?;

    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read catalog file {}", path))?;
    let catalog: CatalogImport =
        serde_json::from_str(&raw).with_context(|| format!("Invalid catalog in {}", path))?;

    let state = AppState::new(config)
        .await
        .context("Failed to initialize application state")?;

    let summary = import_catalog(&state, catalog)
        .await
        .context("Catalog import failed")?;

    tracing::info!(
        "Imported {} menus, {} items and {} questions from {}",
        summary.menus,
        summary.items,
        summary.questions,
        path
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
