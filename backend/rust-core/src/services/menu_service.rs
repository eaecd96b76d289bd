use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use validator::Validate;

use super::{validation_error, StructureLock};
use crate::error::{CoreError, Result};
use crate::metrics::MENU_MUTATIONS_TOTAL;
use crate::models::menu::sibling_order;
use crate::models::menu_item::item_order;
use crate::models::{CreateMenuRequest, ItemContent, Menu, MenuItem, MenuNode};
use crate::repository::Repository;
use crate::utils::id::MenuId;
use crate::utils::time::Clock;

/// Returns `start` followed by each of its ancestors up to the root.
///
/// The walk is bounded by the number of distinct menus it can visit; meeting
/// a menu twice means the stored tree is already cyclic and is reported as
/// `CycleDetected`. A dangling parent reference ends the chain.
pub(crate) async fn ancestor_chain(repo: &dyn Repository, start: &MenuId) -> Result<Vec<Menu>> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(start.clone());

    while let Some(id) = current {
        if !seen.insert(id.clone()) {
            return Err(CoreError::CycleDetected {
                menu_id: start.to_string(),
                parent_id: id.to_string(),
            });
        }
        let menu = match repo.get_menu(&id).await {
            Ok(menu) => menu,
            Err(crate::error::RepositoryError::NotFound { .. }) if !chain.is_empty() => break,
            Err(e) => return Err(e.into()),
        };
        current = menu.parent_id.clone();
        chain.push(menu);
    }

    Ok(chain)
}

pub struct MenuService {
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    structure: StructureLock,
}

impl MenuService {
    pub fn new(repo: Arc<dyn Repository>, clock: Arc<dyn Clock>, structure: StructureLock) -> Self {
        Self {
            repo,
            clock,
            structure,
        }
    }

    /// Creates a root menu, or a child appended under `parent_id`.
    pub async fn create_menu(&self, req: CreateMenuRequest) -> Result<Menu> {
        req.validate().map_err(validation_error)?;
        let _guard = self.structure.lock().await;

        if let Some(parent_id) = &req.parent_id {
            match ancestor_chain(self.repo.as_ref(), parent_id).await {
                Ok(_) => {}
                Err(CoreError::NotFound { .. }) => {
                    return Err(CoreError::InvalidParent(format!(
                        "parent menu {} does not exist",
                        parent_id
                    )))
                }
                Err(CoreError::CycleDetected { .. }) => {
                    return Err(CoreError::InvalidParent(format!(
                        "ancestry of parent menu {} is cyclic",
                        parent_id
                    )))
                }
                Err(e) => return Err(e),
            }
        }

        let order_index = match req.order_index {
            Some(order_index) => order_index,
            None => self.next_order_index(req.parent_id.as_ref()).await?,
        };

        let now = self.clock.now();
        let menu = Menu {
            id: MenuId::generate(),
            name: req.name,
            parent_id: req.parent_id,
            order_index,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.create_menu(&menu).await?;
        MENU_MUTATIONS_TOTAL.with_label_values(&["create"]).inc();

        tracing::info!(
            "Menu created: {} ({}) under {:?}",
            created.id,
            created.name,
            created.parent_id.as_ref().map(MenuId::as_str)
        );

        Ok(created)
    }

    pub async fn get_menu(&self, id: &MenuId) -> Result<Menu> {
        Ok(self.repo.get_menu(id).await?)
    }

    pub async fn list_roots(&self) -> Result<Vec<Menu>> {
        let mut roots = self.repo.query_children(None).await?;
        roots.sort_by(sibling_order);
        Ok(roots)
    }

    /// Child menus of `menu_id` in sibling order.
    pub async fn list_children(&self, menu_id: &MenuId) -> Result<Vec<Menu>> {
        self.repo.get_menu(menu_id).await?;
        let mut children = self.repo.query_children(Some(menu_id)).await?;
        children.sort_by(sibling_order);
        Ok(children)
    }

    /// Reparents `menu_id` under `new_parent_id` (or to the root level when
    /// `None`) at `new_order_index`.
    pub async fn move_menu(
        &self,
        menu_id: &MenuId,
        new_parent_id: Option<&MenuId>,
        new_order_index: i32,
    ) -> Result<Menu> {
        let _guard = self.structure.lock().await;

        let mut menu = self.repo.get_menu(menu_id).await?;
        let mut new_ancestors = Vec::new();

        if let Some(parent_id) = new_parent_id {
            if parent_id == menu_id {
                return Err(CoreError::CycleDetected {
                    menu_id: menu_id.to_string(),
                    parent_id: parent_id.to_string(),
                });
            }

            let chain = match ancestor_chain(self.repo.as_ref(), parent_id).await {
                Ok(chain) => chain,
                Err(CoreError::NotFound { .. }) => {
                    return Err(CoreError::InvalidParent(format!(
                        "parent menu {} does not exist",
                        parent_id
                    )))
                }
                Err(e) => return Err(e),
            };

            if chain.iter().any(|m| &m.id == menu_id) {
                tracing::warn!(
                    "Refusing to move menu {} under its descendant {}",
                    menu_id,
                    parent_id
                );
                return Err(CoreError::CycleDetected {
                    menu_id: menu_id.to_string(),
                    parent_id: parent_id.to_string(),
                });
            }

            self.ensure_links_stay_acyclic(menu_id, &chain).await?;
            new_ancestors = chain;
        }

        menu.parent_id = new_parent_id.cloned();
        menu.order_index = new_order_index;
        menu.updated_at = self.clock.now();

        // The chain checked above must still be the stored one when the move
        // lands, or a concurrent move elsewhere could close a loop.
        let updated = self.repo.reparent_menu(&menu, &new_ancestors).await?;
        MENU_MUTATIONS_TOTAL.with_label_values(&["move"]).inc();

        tracing::info!(
            "Menu moved: {} -> parent {:?}, order {}",
            updated.id,
            updated.parent_id.as_ref().map(MenuId::as_str),
            updated.order_index
        );

        Ok(updated)
    }

    pub async fn rename_menu(&self, menu_id: &MenuId, name: impl Into<String>) -> Result<Menu> {
        let req = CreateMenuRequest::root(name);
        req.validate().map_err(validation_error)?;

        let mut menu = self.repo.get_menu(menu_id).await?;
        menu.name = req.name;
        menu.updated_at = self.clock.now();

        let updated = self.repo.update_menu(&menu).await?;
        MENU_MUTATIONS_TOTAL.with_label_values(&["rename"]).inc();
        tracing::info!("Menu renamed: {} -> {}", updated.id, updated.name);

        Ok(updated)
    }

    /// Deletes an empty menu. Child menus, owned items (active or not) and
    /// submenu items pointing here all block the delete.
    pub async fn delete_menu(&self, menu_id: &MenuId) -> Result<()> {
        let _guard = self.structure.lock().await;

        self.repo.get_menu(menu_id).await?;

        let child_menus = self.repo.query_children(Some(menu_id)).await?.len();
        let owned_items = self.repo.query_items(menu_id).await?.len();
        let inbound_links = self.repo.query_submenu_links(menu_id).await?.len();

        if child_menus > 0 || owned_items > 0 || inbound_links > 0 {
            return Err(CoreError::NotEmpty {
                menu_id: menu_id.to_string(),
                child_menus,
                items: owned_items + inbound_links,
            });
        }

        self.repo.delete_menu(menu_id).await?;
        MENU_MUTATIONS_TOTAL.with_label_values(&["delete"]).inc();
        tracing::info!("Menu deleted: {}", menu_id);

        Ok(())
    }

    /// Strict ancestors of `menu_id`, root first.
    pub async fn ancestors(&self, menu_id: &MenuId) -> Result<Vec<Menu>> {
        let mut chain = ancestor_chain(self.repo.as_ref(), menu_id).await?;
        chain.remove(0);
        chain.reverse();
        Ok(chain)
    }

    /// Root-first path ending with `menu_id` itself.
    pub async fn breadcrumb(&self, menu_id: &MenuId) -> Result<Vec<Menu>> {
        let mut chain = ancestor_chain(self.repo.as_ref(), menu_id).await?;
        chain.reverse();
        Ok(chain)
    }

    /// Snapshot of the whole forest with active items, in display order.
    pub async fn tree(&self) -> Result<Vec<MenuNode>> {
        let mut children: HashMap<Option<MenuId>, Vec<Menu>> = HashMap::new();
        let mut items: HashMap<MenuId, Vec<MenuItem>> = HashMap::new();
        let mut frontier: Vec<Option<MenuId>> = vec![None];
        let mut visited = HashSet::new();

        while let Some(parent) = frontier.pop() {
            let mut level = self.repo.query_children(parent.as_ref()).await?;
            level.sort_by(sibling_order);

            for menu in &level {
                if !visited.insert(menu.id.clone()) {
                    continue;
                }
                let mut active: Vec<MenuItem> = self
                    .repo
                    .query_items(&menu.id)
                    .await?
                    .into_iter()
                    .filter(|item| item.is_active)
                    .collect();
                active.sort_by(item_order);
                items.insert(menu.id.clone(), active);
                frontier.push(Some(menu.id.clone()));
            }
            children.insert(parent, level);
        }

        Ok(build_nodes(None, &mut children, &mut items))
    }

    async fn next_order_index(&self, parent_id: Option<&MenuId>) -> Result<i32> {
        let siblings = self.repo.query_children(parent_id).await?;
        Ok(siblings
            .iter()
            .map(|m| m.order_index)
            .max()
            .map_or(0, |max| max.saturating_add(1)))
    }

    /// A submenu item inside the moved subtree must not end up pointing at
    /// one of the subtree's new ancestors.
    async fn ensure_links_stay_acyclic(
        &self,
        menu_id: &MenuId,
        new_ancestors: &[Menu],
    ) -> Result<()> {
        let forbidden: HashSet<&MenuId> = new_ancestors.iter().map(|m| &m.id).collect();

        let mut pending = vec![menu_id.clone()];
        let mut visited = HashSet::new();
        while let Some(current) = pending.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            for item in self.repo.query_items(&current).await? {
                if let ItemContent::Submenu { target_menu_id } = &item.content {
                    if forbidden.contains(target_menu_id) {
                        return Err(CoreError::CycleDetected {
                            menu_id: menu_id.to_string(),
                            parent_id: target_menu_id.to_string(),
                        });
                    }
                }
            }
            pending.extend(
                self.repo
                    .query_children(Some(&current))
                    .await?
                    .into_iter()
                    .map(|m| m.id),
            );
        }

        Ok(())
    }
}

fn build_nodes(
    parent: Option<MenuId>,
    children: &mut HashMap<Option<MenuId>, Vec<Menu>>,
    items: &mut HashMap<MenuId, Vec<MenuItem>>,
) -> Vec<MenuNode> {
    let level = children.remove(&parent).unwrap_or_default();
    level
        .into_iter()
        .map(|menu| {
            let nested = build_nodes(Some(menu.id.clone()), children, items);
            MenuNode {
                items: items.remove(&menu.id).unwrap_or_default(),
                children: nested,
                menu,
            }
        })
        .collect()
}
