pub mod menu;
pub mod menu_item;
pub mod quiz;
pub mod session;

pub use menu::{CreateMenuRequest, Menu, MenuNode};
pub use menu_item::{
    AddItemRequest, FileKind, ItemContent, ItemType, MenuItem, QuizSelection, UpdateItemRequest,
};
pub use quiz::{
    AddQuestionRequest, Difficulty, QuestionFilter, QuestionView, Quiz, UpdateQuestionRequest,
};
pub use session::{QuestionOutcome, QuizResult, QuizSession, SessionState, SessionView};

/// Rejects text that is empty once surrounding whitespace is removed.
pub(crate) fn non_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("blank")
            .with_message("must not be blank".into()));
    }
    Ok(())
}
