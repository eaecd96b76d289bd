use std::sync::Arc;
use tokio::sync::Mutex;
use validator::ValidationErrors;

use crate::config::{Config, StorageBackend};
use crate::error::CoreError;
use crate::repository::{InMemoryRepository, MongoRepository, Repository};
use crate::utils::time::{Clock, MonotonicClock};

pub mod catalog_import;
pub mod item_service;
pub mod menu_service;
pub mod quiz_bank;
pub mod session_service;

pub use item_service::ItemService;
pub use menu_service::MenuService;
pub use quiz_bank::QuizBank;
pub use session_service::SessionService;

/// Serializes structural menu mutations (create/move/delete and item
/// attachment) within this process. Writers in other processes are caught by
/// the repository's guarded writes: a move or submenu insert only lands if
/// every menu on the ancestor chain it validated is still at the version it
/// read.
pub type StructureLock = Arc<Mutex<()>>;

pub struct AppState {
    pub config: Config,
    pub repository: Arc<dyn Repository>,
    pub menus: MenuService,
    pub items: ItemService,
    pub quiz_bank: Arc<QuizBank>,
    pub sessions: SessionService,
}

impl AppState {
    /// Builds the state on the backend selected in `config`.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let repository: Arc<dyn Repository> = match config.storage {
            StorageBackend::Memory => {
                tracing::info!("Using in-memory content repository");
                Arc::new(InMemoryRepository::new())
            }
            StorageBackend::Mongo => {
                let uri = config
                    .mongo_uri
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("MONGO_URI is not configured"))?;
                let mongo = MongoRepository::connect(uri, &config.mongo_database).await?;
                mongo.ensure_indexes().await?;
                Arc::new(mongo)
            }
        };

        Ok(Self::with_repository(
            config,
            repository,
            Arc::new(MonotonicClock::new()),
        ))
    }

    pub fn with_repository(
        config: Config,
        repository: Arc<dyn Repository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let structure: StructureLock = Arc::new(Mutex::new(()));

        let menus = MenuService::new(repository.clone(), clock.clone(), structure.clone());
        let items = ItemService::new(repository.clone(), clock.clone(), structure);
        let quiz_bank = Arc::new(QuizBank::new(
            repository.clone(),
            clock.clone(),
            config.quiz.clone(),
        ));
        let sessions = SessionService::new(
            repository.clone(),
            quiz_bank.clone(),
            clock,
            config.quiz.clone(),
        );

        Self {
            config,
            repository,
            menus,
            items,
            quiz_bank,
            sessions,
        }
    }

    /// In-memory state with default settings.
    pub fn in_memory() -> Self {
        Self::with_repository(
            Config::default(),
            Arc::new(InMemoryRepository::new()),
            Arc::new(MonotonicClock::new()),
        )
    }
}

/// Maps `validator` failures onto stable error kinds. Option-list problems
/// are reported as `InvalidOptions`, everything else as `InvalidInput`.
pub(crate) fn validation_error(errors: ValidationErrors) -> CoreError {
    let field_errors = errors.field_errors();

    if let Some(option_errors) = field_errors.get("options") {
        return CoreError::InvalidOptions(first_message(option_errors, "invalid options"));
    }

    let mut fields: Vec<_> = field_errors.into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    match fields.into_iter().next() {
        Some((field, field_errors)) => CoreError::InvalidInput {
            field: field.to_string(),
            message: first_message(field_errors, "invalid value"),
        },
        None => CoreError::InvalidInput {
            field: "request".to_string(),
            message: errors.to_string(),
        },
    }
}

fn first_message(errors: &[validator::ValidationError], fallback: &str) -> String {
    errors
        .first()
        .and_then(|e| e.message.as_ref())
        .map(|m| m.to_string())
        .unwrap_or_else(|| fallback.to_string())
}
