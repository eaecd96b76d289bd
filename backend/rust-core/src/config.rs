use serde::Deserialize;
use std::env;
use std::str::FromStr;

use crate::models::Difficulty;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Mongo,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "memory" | "in-memory" | "inmemory" => Ok(StorageBackend::Memory),
            "mongo" | "mongodb" => Ok(StorageBackend::Mongo),
            _ => Err(format!("Invalid storage backend: {}", value)),
        }
    }
}

impl StorageBackend {
    /// Whether content written through this backend outlives the process.
    pub fn is_persistent(&self) -> bool {
        matches!(self, StorageBackend::Mongo)
    }
}

/// Upper bound for `quiz.session_ttl_seconds` (30 days).
pub const MAX_SESSION_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct QuizSettings {
    pub default_language: String,
    pub default_difficulty: Difficulty,
    pub default_question_count: usize,
    pub session_ttl_seconds: i64,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            default_language: "ar".to_string(),
            default_difficulty: Difficulty::Medium,
            default_question_count: 10,
            session_ttl_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub storage: StorageBackend,
    pub mongo_uri: Option<String>,
    pub mongo_database: String,
    pub quiz: QuizSettings,
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageBackend::Memory,
            mongo_uri: None,
            mongo_database: "content_core".to_string(),
            quiz: QuizSettings::default(),
            log_json: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first, then a local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml + ENV overrides (prefix: APP_)
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::default();

        let storage = match settings
            .get_string("storage.backend")
            .or_else(|_| env::var("STORAGE_BACKEND"))
        {
            Ok(value) => value.parse().map_err(config::ConfigError::Message)?,
            Err(_) => defaults.storage,
        };

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .ok();

        if storage == StorageBackend::Mongo && mongo_uri.is_none() {
            return Err(config::ConfigError::Message(
                "MONGO_URI must be set when the mongo storage backend is selected".to_string(),
            ));
        }

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or(defaults.mongo_database);

        let default_language = settings
            .get_string("quiz.default_language")
            .or_else(|_| env::var("QUIZ_DEFAULT_LANGUAGE"))
            .unwrap_or(defaults.quiz.default_language);

        let default_difficulty = match settings.get_string("quiz.default_difficulty") {
            Ok(value) => value.parse().map_err(config::ConfigError::Message)?,
            Err(_) => defaults.quiz.default_difficulty,
        };

        let default_question_count = settings
            .get_int("quiz.default_question_count")
            .ok()
            .filter(|v| *v > 0)
            .map(|v| v as usize)
            .unwrap_or(defaults.quiz.default_question_count);

        let session_ttl_seconds = settings
            .get_int("quiz.session_ttl_seconds")
            .ok()
            .or_else(|| {
                env::var("SESSION_DURATION_SECONDS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok())
            })
            .filter(|v| *v > 0)
            .unwrap_or(defaults.quiz.session_ttl_seconds);

        if session_ttl_seconds > MAX_SESSION_TTL_SECONDS {
            return Err(config::ConfigError::Message(format!(
                "quiz.session_ttl_seconds must not exceed {} (got {})",
                MAX_SESSION_TTL_SECONDS, session_ttl_seconds
            )));
        }

        let log_json = settings.get_bool("logging.json").unwrap_or(false);

        Ok(Config {
            storage,
            mongo_uri,
            mongo_database,
            quiz: QuizSettings {
                default_language,
                default_difficulty,
                default_question_count,
                session_ttl_seconds,
            },
            log_json,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "APP__STORAGE__BACKEND",
            "APP__QUIZ__DEFAULT_LANGUAGE",
            "APP__QUIZ__SESSION_TTL_SECONDS",
            "STORAGE_BACKEND",
            "MONGO_URI",
            "SESSION_DURATION_SECONDS",
        ] {
            env::remove_var(key);
        }
        env::set_var("SKIP_ROOT_ENV", "1");
        env::set_var("APP_ENV", "test-missing");
    }

    #[test]
    #[serial]
    fn defaults_apply_without_sources() {
        clear_env();
        let config = Config::load().unwrap();
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.quiz.default_language, "ar");
        assert_eq!(config.quiz.default_difficulty, Difficulty::Medium);
        assert_eq!(config.quiz.default_question_count, 10);
        assert_eq!(config.quiz.session_ttl_seconds, 3600);
    }

    #[test]
    #[serial]
    fn env_overrides_are_applied() {
        clear_env();
        env::set_var("APP__QUIZ__DEFAULT_LANGUAGE", "en");
        env::set_var("SESSION_DURATION_SECONDS", "120");
        let config = Config::load().unwrap();
        assert_eq!(config.quiz.default_language, "en");
        assert_eq!(config.quiz.session_ttl_seconds, 120);
        clear_env();
    }

    #[test]
    #[serial]
    fn oversized_session_ttl_is_rejected() {
        clear_env();
        env::set_var("APP__QUIZ__SESSION_TTL_SECONDS", "100000000000000");
        assert!(Config::load().is_err());

        env::set_var(
            "APP__QUIZ__SESSION_TTL_SECONDS",
            MAX_SESSION_TTL_SECONDS.to_string(),
        );
        let config = Config::load().unwrap();
        assert_eq!(config.quiz.session_ttl_seconds, MAX_SESSION_TTL_SECONDS);
        clear_env();
    }

    #[test]
    fn only_mongo_backend_is_persistent() {
        assert!(StorageBackend::Mongo.is_persistent());
        assert!(!StorageBackend::Memory.is_persistent());
    }

    #[test]
    #[serial]
    fn mongo_backend_requires_uri() {
        clear_env();
        env::set_var("STORAGE_BACKEND", "mongo");
        assert!(Config::load().is_err());
        clear_env();
    }
}
