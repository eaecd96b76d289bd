use thiserror::Error;

/// Failures raised by a persistence backend.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: &'static str, id: String },

    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        RepositoryError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(entity: &'static str, id: impl ToString) -> Self {
        RepositoryError::Conflict {
            entity,
            id: id.to_string(),
        }
    }
}

pub type RepoResult<T> = std::result::Result<T, RepositoryError>;

/// Every failure the content core reports to its caller.
///
/// Variants are stable; the transport maps [`CoreError::code`] to a localized
/// message instead of matching on display strings.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid parent menu: {0}")]
    InvalidParent(String),

    #[error("moving menu {menu_id} under {parent_id} would create a cycle")]
    CycleDetected { menu_id: String, parent_id: String },

    #[error("menu {menu_id} still has {child_menus} child menus and {items} items referencing it")]
    NotEmpty {
        menu_id: String,
        child_menus: usize,
        items: usize,
    },

    #[error("invalid item payload: {0}")]
    InvalidPayload(String),

    #[error("item {item_id} is of type {actual}, expected {expected}")]
    WrongType {
        item_id: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("item {item_id} points to missing menu {target}")]
    BrokenLink { item_id: String, target: String },

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("correct option {index} is out of range for {len} options")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("requested {requested} questions but only {available} match")]
    InsufficientQuestions { requested: usize, available: usize },

    #[error("session {0} is closed")]
    SessionClosed(String),

    #[error("question {question_id} is not part of session {session_id}")]
    UnknownQuestion {
        session_id: String,
        question_id: String,
    },

    #[error("option {index} is out of range for {len} options")]
    InvalidOption { index: i64, len: usize },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: &'static str, id: String },

    #[error(transparent)]
    Repository(RepositoryError),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InvalidParent(_) => "invalid_parent",
            CoreError::CycleDetected { .. } => "cycle_detected",
            CoreError::NotEmpty { .. } => "not_empty",
            CoreError::InvalidPayload(_) => "invalid_payload",
            CoreError::WrongType { .. } => "wrong_type",
            CoreError::BrokenLink { .. } => "broken_link",
            CoreError::InvalidOptions(_) => "invalid_options",
            CoreError::IndexOutOfRange { .. } => "index_out_of_range",
            CoreError::InsufficientQuestions { .. } => "insufficient_questions",
            CoreError::SessionClosed(_) => "session_closed",
            CoreError::UnknownQuestion { .. } => "unknown_question",
            CoreError::InvalidOption { .. } => "invalid_option",
            CoreError::NotFound { .. } => "not_found",
            CoreError::InvalidInput { .. } => "invalid_input",
            CoreError::Conflict { .. } => "conflict",
            CoreError::Repository(_) => "repository",
        }
    }
}

impl From<RepositoryError> for CoreError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => CoreError::NotFound { entity, id },
            RepositoryError::Conflict { entity, id } => CoreError::Conflict { entity, id },
            other => CoreError::Repository(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
