use std::collections::HashSet;
use std::sync::Arc;
use url::Url;
use validator::Validate;

use super::menu_service::ancestor_chain;
use super::{validation_error, StructureLock};
use crate::error::{CoreError, RepositoryError, Result};
use crate::metrics::MENU_ITEMS_TOTAL;
use crate::models::menu_item::item_order;
use crate::models::{
    AddItemRequest, ItemContent, ItemType, Menu, MenuItem, QuizSelection, UpdateItemRequest,
};
use crate::repository::Repository;
use crate::utils::id::{ItemId, MenuId};
use crate::utils::time::Clock;

pub struct ItemService {
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    structure: StructureLock,
}

impl ItemService {
    pub fn new(repo: Arc<dyn Repository>, clock: Arc<dyn Clock>, structure: StructureLock) -> Self {
        Self {
            repo,
            clock,
            structure,
        }
    }

    pub async fn add_item(&self, req: AddItemRequest) -> Result<MenuItem> {
        req.validate().map_err(validation_error)?;
        let _guard = self.structure.lock().await;

        self.repo.get_menu(&req.menu_id).await?;
        let guard = self.validate_content(&req.menu_id, &req.content).await?;

        let order_index = match req.order_index {
            Some(order_index) => order_index,
            None => self
                .repo
                .query_items(&req.menu_id)
                .await?
                .iter()
                .map(|item| item.order_index)
                .max()
                .map_or(0, |max| max.saturating_add(1)),
        };

        let now = self.clock.now();
        let item = MenuItem {
            id: ItemId::generate(),
            menu_id: req.menu_id,
            title: req.title,
            content: req.content,
            description: req.description,
            order_index,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.create_item(&item, &guard).await?;
        MENU_ITEMS_TOTAL.with_label_values(&["create"]).inc();

        tracing::info!(
            "Menu item created: {} ({}, {}) in menu {}",
            created.id,
            created.title,
            created.item_type().as_str(),
            created.menu_id
        );

        Ok(created)
    }

    pub async fn get_item(&self, item_id: &ItemId) -> Result<MenuItem> {
        Ok(self.repo.get_item(item_id).await?)
    }

    /// Visible items of `menu_id` in display order.
    pub async fn list_active_items(&self, menu_id: &MenuId) -> Result<Vec<MenuItem>> {
        let mut items = self.list_all_items(menu_id).await?;
        items.retain(|item| item.is_active);
        Ok(items)
    }

    /// Every item of `menu_id`, inactive ones included.
    pub async fn list_all_items(&self, menu_id: &MenuId) -> Result<Vec<MenuItem>> {
        self.repo.get_menu(menu_id).await?;
        let mut items = self.repo.query_items(menu_id).await?;
        items.sort_by(item_order);
        Ok(items)
    }

    pub async fn update_item(&self, item_id: &ItemId, req: UpdateItemRequest) -> Result<MenuItem> {
        req.validate().map_err(validation_error)?;

        let mut item = self.repo.get_item(item_id).await?;
        if let Some(title) = req.title {
            item.title = title;
        }
        if let Some(description) = req.description {
            item.description = Some(description).filter(|d| !d.trim().is_empty());
        }
        if let Some(order_index) = req.order_index {
            item.order_index = order_index;
        }
        item.updated_at = self.clock.now();

        let updated = self.repo.update_item(&item).await?;
        MENU_ITEMS_TOTAL.with_label_values(&["update"]).inc();
        tracing::info!("Menu item updated: {}", updated.id);

        Ok(updated)
    }

    pub async fn deactivate(&self, item_id: &ItemId) -> Result<MenuItem> {
        self.set_active(item_id, false).await
    }

    pub async fn reactivate(&self, item_id: &ItemId) -> Result<MenuItem> {
        self.set_active(item_id, true).await
    }

    pub async fn delete_item(&self, item_id: &ItemId) -> Result<()> {
        self.repo.delete_item(item_id).await?;
        MENU_ITEMS_TOTAL.with_label_values(&["delete"]).inc();
        tracing::info!("Menu item deleted: {}", item_id);
        Ok(())
    }

    /// Menu a submenu item navigates to.
    pub async fn resolve_submenu_target(&self, item_id: &ItemId) -> Result<Menu> {
        let item = self.repo.get_item(item_id).await?;

        let target = item.submenu_target().ok_or(CoreError::WrongType {
            item_id: item_id.to_string(),
            expected: ItemType::Submenu.as_str(),
            actual: item.item_type().as_str(),
        })?;

        match self.repo.get_menu(target).await {
            Ok(menu) => Ok(menu),
            Err(RepositoryError::NotFound { .. }) => {
                tracing::warn!("Submenu item {} points to missing menu {}", item_id, target);
                Err(CoreError::BrokenLink {
                    item_id: item_id.to_string(),
                    target: target.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Flips `is_active`. A call that changes nothing leaves the row and its
    /// `updated_at` untouched.
    async fn set_active(&self, item_id: &ItemId, active: bool) -> Result<MenuItem> {
        let mut item = self.repo.get_item(item_id).await?;
        if item.is_active == active {
            return Ok(item);
        }

        item.is_active = active;
        item.updated_at = self.clock.now();

        let updated = self.repo.update_item(&item).await?;
        let operation = if active { "reactivate" } else { "deactivate" };
        MENU_ITEMS_TOTAL.with_label_values(&[operation]).inc();
        tracing::info!("Menu item {}: {}", operation, updated.id);

        Ok(updated)
    }

    /// Checks the payload and returns the menus whose state it was checked
    /// against: the owner's ancestor chain for a submenu item, nothing
    /// otherwise.
    async fn validate_content(
        &self,
        menu_id: &MenuId,
        content: &ItemContent,
    ) -> Result<Vec<Menu>> {
        match content {
            ItemContent::File { file_url, .. } => {
                parse_url(file_url, "file URL")?;
            }
            ItemContent::Link { url } => {
                parse_url(url, "link URL")?;
            }
            ItemContent::Submenu { target_menu_id } => {
                match self.repo.get_menu(target_menu_id).await {
                    Ok(_) => {}
                    Err(RepositoryError::NotFound { .. }) => {
                        return Err(CoreError::InvalidPayload(format!(
                            "submenu target {} does not exist",
                            target_menu_id
                        )))
                    }
                    Err(e) => return Err(e.into()),
                }

                let chain = ancestor_chain(self.repo.as_ref(), menu_id).await?;
                if chain.iter().any(|m| &m.id == target_menu_id) {
                    return Err(CoreError::InvalidPayload(format!(
                        "submenu target {} is menu {} or one of its ancestors",
                        target_menu_id, menu_id
                    )));
                }
                return Ok(chain);
            }
            ItemContent::Quiz { selection } => self.validate_selection(selection).await?,
        }
        Ok(Vec::new())
    }

    async fn validate_selection(&self, selection: &QuizSelection) -> Result<()> {
        match selection {
            QuizSelection::Filter { count, .. } => {
                if *count == 0 {
                    return Err(CoreError::InvalidPayload(
                        "quiz question count must be positive".to_string(),
                    ));
                }
            }
            QuizSelection::Questions { question_ids } => {
                if question_ids.is_empty() {
                    return Err(CoreError::InvalidPayload(
                        "quiz question set must not be empty".to_string(),
                    ));
                }
                let mut seen = HashSet::new();
                for question_id in question_ids {
                    if !seen.insert(question_id) {
                        return Err(CoreError::InvalidPayload(format!(
                            "question {} listed twice",
                            question_id
                        )));
                    }
                    match self.repo.get_question(question_id).await {
                        Ok(_) => {}
                        Err(RepositoryError::NotFound { .. }) => {
                            return Err(CoreError::InvalidPayload(format!(
                                "question {} does not exist",
                                question_id
                            )))
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
        Ok(())
    }
}

fn parse_url(value: &str, what: &str) -> Result<Url> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidPayload(format!("{} is required", what)));
    }
    Url::parse(trimmed)
        .map_err(|e| CoreError::InvalidPayload(format!("{} {:?} is invalid: {}", what, value, e)))
}
