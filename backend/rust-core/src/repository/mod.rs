//! Persistence boundary.
//!
//! Every component of the core reads and writes through [`Repository`]; the
//! backend makes each call atomic. Menus are versioned: a structural write
//! names the menus it read (the "guard") and only lands if none of them
//! changed since, bumping their versions in the same atomic step. Two writers
//! that each validated against a tree the other one is changing can therefore
//! never both succeed, whichever process they run in.
//!
//! Query results come back in no particular order; services sort them.

use async_trait::async_trait;

use crate::error::RepoResult;
use crate::models::{Menu, MenuItem, QuestionFilter, Quiz};
use crate::utils::id::{ItemId, MenuId, QuestionId};

pub mod memory;
pub mod mongo;

pub use memory::InMemoryRepository;
pub use mongo::MongoRepository;

pub const MENU_ENTITY: &str = "menu";
pub const ITEM_ENTITY: &str = "menu_item";
pub const QUESTION_ENTITY: &str = "quiz";

#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_menu(&self, id: &MenuId) -> RepoResult<Menu>;
    async fn create_menu(&self, menu: &Menu) -> RepoResult<Menu>;
    /// Stores `menu` if the stored version still equals `menu.version`, and
    /// returns the row with its version bumped. Fails with `Conflict` when
    /// another writer got there first.
    async fn update_menu(&self, menu: &Menu) -> RepoResult<Menu>;
    /// Versioned store of a moved `menu`, atomic with a check-and-bump of
    /// every menu in `guard` (the new ancestor chain as read by the caller).
    /// `Conflict` if any of them changed in between.
    async fn reparent_menu(&self, menu: &Menu, guard: &[Menu]) -> RepoResult<Menu>;
    async fn delete_menu(&self, id: &MenuId) -> RepoResult<()>;
    /// Direct children of `parent`, or the roots when `parent` is `None`.
    async fn query_children(&self, parent: Option<&MenuId>) -> RepoResult<Vec<Menu>>;

    async fn get_item(&self, id: &ItemId) -> RepoResult<MenuItem>;
    /// Inserts `item` if every menu in `guard` is still at its read version,
    /// bumping them in the same atomic step.
    async fn create_item(&self, item: &MenuItem, guard: &[Menu]) -> RepoResult<MenuItem>;
    async fn update_item(&self, item: &MenuItem) -> RepoResult<MenuItem>;
    async fn delete_item(&self, id: &ItemId) -> RepoResult<()>;
    /// Every item owned by `menu_id`, active or not.
    async fn query_items(&self, menu_id: &MenuId) -> RepoResult<Vec<MenuItem>>;
    /// Submenu items, anywhere in the tree, that point at `target`.
    async fn query_submenu_links(&self, target: &MenuId) -> RepoResult<Vec<MenuItem>>;

    async fn get_question(&self, id: &QuestionId) -> RepoResult<Quiz>;
    async fn create_question(&self, quiz: &Quiz) -> RepoResult<Quiz>;
    async fn update_question(&self, quiz: &Quiz) -> RepoResult<Quiz>;
    async fn delete_question(&self, id: &QuestionId) -> RepoResult<()>;
    async fn query_questions(&self, filter: &QuestionFilter) -> RepoResult<Vec<Quiz>>;
}
