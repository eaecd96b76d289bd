//! Content hierarchy and quiz session core for a menu-driven bot.
//!
//! The bot transport calls into [`services::AppState`]: the menu tree and
//! its items for navigation, the quiz bank for questions, and the session
//! engine for playing a quiz. Persistence sits behind
//! [`repository::Repository`].

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod repository;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{CoreError, RepositoryError};
pub use services::AppState;

/// Installs the global tracing subscriber for the binaries.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "content_core=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
