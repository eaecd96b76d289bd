#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use content_core::{
    config::Config,
    models::{AddQuestionRequest, CreateMenuRequest, Difficulty, Menu, Quiz},
    repository::InMemoryRepository,
    services::AppState,
    utils::time::FixedClock,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Fresh in-memory state on the wall clock.
pub fn create_test_state() -> AppState {
    init_tracing();
    AppState::in_memory()
}

/// In-memory state driven by a clock the test controls.
pub fn create_test_state_with_clock() -> (AppState, Arc<FixedClock>) {
    init_tracing();
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
    ));
    let state = AppState::with_repository(
        Config::default(),
        Arc::new(InMemoryRepository::new()),
        clock.clone(),
    );
    (state, clock)
}

pub async fn root_menu(state: &AppState, name: &str) -> Menu {
    state
        .menus
        .create_menu(CreateMenuRequest::root(name))
        .await
        .expect("Failed to create root menu")
}

pub async fn child_menu(state: &AppState, name: &str, parent: &Menu) -> Menu {
    state
        .menus
        .create_menu(CreateMenuRequest::child(name, parent.id.clone()))
        .await
        .expect("Failed to create child menu")
}

/// Adds a question whose correct option is always index 1.
pub async fn seed_question(
    state: &AppState,
    text: &str,
    difficulty: Difficulty,
    category: &str,
) -> Quiz {
    state
        .quiz_bank
        .add_question(
            AddQuestionRequest::new(text, ["wrong", "right", "also wrong"], 1)
                .difficulty(difficulty)
                .category(category),
        )
        .await
        .expect("Failed to seed question")
}
