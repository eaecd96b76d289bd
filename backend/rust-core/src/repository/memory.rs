use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{Repository, ITEM_ENTITY, MENU_ENTITY, QUESTION_ENTITY};
use crate::error::{RepoResult, RepositoryError};
use crate::models::{ItemContent, Menu, MenuItem, QuestionFilter, Quiz};
use crate::utils::id::{ItemId, MenuId, QuestionId};

/// Process-local backend. Each map sits behind its own lock, so a single
/// call is atomic with respect to every other call on the same entity type.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    menus: RwLock<HashMap<MenuId, Menu>>,
    items: RwLock<HashMap<ItemId, MenuItem>>,
    questions: RwLock<HashMap<QuestionId, Quiz>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_menu(&self, id: &MenuId) -> RepoResult<Menu> {
        self.menus
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(MENU_ENTITY, id))
    }

    async fn create_menu(&self, menu: &Menu) -> RepoResult<Menu> {
        let mut menus = self.menus.write().await;
        if menus.contains_key(&menu.id) {
            return Err(RepositoryError::conflict(MENU_ENTITY, &menu.id));
        }
        menus.insert(menu.id.clone(), menu.clone());
        Ok(menu.clone())
    }

    async fn update_menu(&self, menu: &Menu) -> RepoResult<Menu> {
        let mut menus = self.menus.write().await;
        let stored = menus
            .get_mut(&menu.id)
            .ok_or_else(|| RepositoryError::not_found(MENU_ENTITY, &menu.id))?;
        if stored.version != menu.version {
            return Err(RepositoryError::conflict(MENU_ENTITY, &menu.id));
        }
        let mut next = menu.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn reparent_menu(&self, menu: &Menu, guard: &[Menu]) -> RepoResult<Menu> {
        let mut menus = self.menus.write().await;
        check_versions(&menus, guard)?;
        let stored = menus
            .get(&menu.id)
            .ok_or_else(|| RepositoryError::not_found(MENU_ENTITY, &menu.id))?;
        if stored.version != menu.version {
            return Err(RepositoryError::conflict(MENU_ENTITY, &menu.id));
        }

        bump_versions(&mut menus, guard);
        let mut next = menu.clone();
        next.version += 1;
        menus.insert(next.id.clone(), next.clone());
        Ok(next)
    }

    async fn delete_menu(&self, id: &MenuId) -> RepoResult<()> {
        self.menus
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::not_found(MENU_ENTITY, id))
    }

    async fn query_children(&self, parent: Option<&MenuId>) -> RepoResult<Vec<Menu>> {
        Ok(self
            .menus
            .read()
            .await
            .values()
            .filter(|m| m.parent_id.as_ref() == parent)
            .cloned()
            .collect())
    }

    async fn get_item(&self, id: &ItemId) -> RepoResult<MenuItem> {
        self.items
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(ITEM_ENTITY, id))
    }

    async fn create_item(&self, item: &MenuItem, guard: &[Menu]) -> RepoResult<MenuItem> {
        // menus before items, the only place both are held
        let mut menus = self.menus.write().await;
        let mut items = self.items.write().await;
        check_versions(&menus, guard)?;
        if items.contains_key(&item.id) {
            return Err(RepositoryError::conflict(ITEM_ENTITY, &item.id));
        }
        bump_versions(&mut menus, guard);
        items.insert(item.id.clone(), item.clone());
        Ok(item.clone())
    }

    async fn update_item(&self, item: &MenuItem) -> RepoResult<MenuItem> {
        let mut items = self.items.write().await;
        let stored = items
            .get_mut(&item.id)
            .ok_or_else(|| RepositoryError::not_found(ITEM_ENTITY, &item.id))?;
        *stored = item.clone();
        Ok(item.clone())
    }

    async fn delete_item(&self, id: &ItemId) -> RepoResult<()> {
        self.items
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::not_found(ITEM_ENTITY, id))
    }

    async fn query_items(&self, menu_id: &MenuId) -> RepoResult<Vec<MenuItem>> {
        Ok(self
            .items
            .read()
            .await
            .values()
            .filter(|item| &item.menu_id == menu_id)
            .cloned()
            .collect())
    }

    async fn query_submenu_links(&self, target: &MenuId) -> RepoResult<Vec<MenuItem>> {
        Ok(self
            .items
            .read()
            .await
            .values()
            .filter(|item| {
                matches!(&item.content, ItemContent::Submenu { target_menu_id } if target_menu_id == target)
            })
            .cloned()
            .collect())
    }

    async fn get_question(&self, id: &QuestionId) -> RepoResult<Quiz> {
        self.questions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(QUESTION_ENTITY, id))
    }

    async fn create_question(&self, quiz: &Quiz) -> RepoResult<Quiz> {
        let mut questions = self.questions.write().await;
        if questions.contains_key(&quiz.id) {
            return Err(RepositoryError::conflict(QUESTION_ENTITY, &quiz.id));
        }
        questions.insert(quiz.id.clone(), quiz.clone());
        Ok(quiz.clone())
    }

    async fn update_question(&self, quiz: &Quiz) -> RepoResult<Quiz> {
        let mut questions = self.questions.write().await;
        let stored = questions
            .get_mut(&quiz.id)
            .ok_or_else(|| RepositoryError::not_found(QUESTION_ENTITY, &quiz.id))?;
        *stored = quiz.clone();
        Ok(quiz.clone())
    }

    async fn delete_question(&self, id: &QuestionId) -> RepoResult<()> {
        self.questions
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::not_found(QUESTION_ENTITY, id))
    }

    async fn query_questions(&self, filter: &QuestionFilter) -> RepoResult<Vec<Quiz>> {
        Ok(self
            .questions
            .read()
            .await
            .values()
            .filter(|q| filter.matches(q))
            .cloned()
            .collect())
    }
}

fn check_versions(menus: &HashMap<MenuId, Menu>, guard: &[Menu]) -> RepoResult<()> {
    for expected in guard {
        let stored = menus
            .get(&expected.id)
            .ok_or_else(|| RepositoryError::conflict(MENU_ENTITY, &expected.id))?;
        if stored.version != expected.version {
            return Err(RepositoryError::conflict(MENU_ENTITY, &expected.id));
        }
    }
    Ok(())
}

fn bump_versions(menus: &mut HashMap<MenuId, Menu>, guard: &[Menu]) {
    for expected in guard {
        if let Some(stored) = menus.get_mut(&expected.id) {
            stored.version += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn menu(name: &str, parent_id: Option<MenuId>) -> Menu {
        let now = Utc::now();
        Menu {
            id: MenuId::generate(),
            name: name.to_string(),
            parent_id,
            order_index: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn update_menu_rejects_stale_version() {
        let repo = InMemoryRepository::new();
        let created = repo.create_menu(&menu("Main", None)).await.unwrap();

        let mut first = created.clone();
        first.name = "First".to_string();
        let stored = repo.update_menu(&first).await.unwrap();
        assert_eq!(stored.version, 1);

        let mut stale = created;
        stale.name = "Stale".to_string();
        let err = repo.update_menu(&stale).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict { .. }));
        assert_eq!(repo.get_menu(&stored.id).await.unwrap().name, "First");
    }

    #[tokio::test]
    async fn query_children_separates_roots_from_children() {
        let repo = InMemoryRepository::new();
        let root = repo.create_menu(&menu("Main", None)).await.unwrap();
        repo.create_menu(&menu("Child", Some(root.id.clone())))
            .await
            .unwrap();

        assert_eq!(repo.query_children(None).await.unwrap().len(), 1);
        assert_eq!(repo.query_children(Some(&root.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reparent_rejects_changed_guard_and_bumps_it_on_success() {
        let repo = InMemoryRepository::new();
        let a = repo.create_menu(&menu("A", None)).await.unwrap();
        let b = repo.create_menu(&menu("B", None)).await.unwrap();
        let c = repo.create_menu(&menu("C", None)).await.unwrap();

        let mut moved = a.clone();
        moved.parent_id = Some(b.id.clone());
        let stored = repo.reparent_menu(&moved, &[b.clone()]).await.unwrap();
        assert_eq!(stored.version, a.version + 1);
        assert_eq!(repo.get_menu(&b.id).await.unwrap().version, b.version + 1);

        // `b` as read before the first move is stale now.
        let mut moved = c.clone();
        moved.parent_id = Some(b.id.clone());
        let err = repo.reparent_menu(&moved, &[b]).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict { .. }));
        assert!(repo.get_menu(&c.id).await.unwrap().is_root());
    }

    #[tokio::test]
    async fn missing_rows_are_not_found() {
        let repo = InMemoryRepository::new();
        let err = repo.delete_menu(&MenuId::from("nope")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { entity: "menu", .. }));
    }
}
