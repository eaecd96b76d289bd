use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use validator::Validate;

use super::menu_item::MenuItem;
use crate::utils::id::MenuId;

/// Node of the navigation tree stored in the "menus" collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Menu {
    #[serde(rename = "_id")]
    pub id: MenuId,
    pub name: String,
    /// `None` marks a root menu.
    #[serde(rename = "parentId", default)]
    pub parent_id: Option<MenuId>,
    #[serde(rename = "orderIndex", default)]
    pub order_index: i32,
    /// Bumped by every stored update; compare-and-swap key for reparenting.
    #[serde(default)]
    pub version: i64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Menu {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Sibling order: `order_index`, then creation time, then id.
pub fn sibling_order(a: &Menu, b: &Menu) -> Ordering {
    a.order_index
        .cmp(&b.order_index)
        .then(a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateMenuRequest {
    #[validate(
        length(min = 1, max = 200, message = "Name must be between 1 and 200 characters"),
        custom(function = "crate::models::non_blank")
    )]
    pub name: String,

    #[serde(default)]
    pub parent_id: Option<MenuId>,

    /// Appended after the last sibling when omitted.
    #[serde(default)]
    pub order_index: Option<i32>,
}

impl CreateMenuRequest {
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent_id: None,
            order_index: None,
        }
    }

    pub fn child(name: impl Into<String>, parent_id: MenuId) -> Self {
        Self {
            name: name.into(),
            parent_id: Some(parent_id),
            order_index: None,
        }
    }

    pub fn with_order(mut self, order_index: i32) -> Self {
        self.order_index = Some(order_index);
        self
    }
}

/// Nested snapshot of a menu with its active items and child menus.
#[derive(Debug, Clone, Serialize)]
pub struct MenuNode {
    pub menu: Menu,
    pub items: Vec<MenuItem>,
    pub children: Vec<MenuNode>,
}

impl MenuNode {
    /// Number of menus in this subtree, including this one.
    pub fn menu_count(&self) -> usize {
        1 + self.children.iter().map(MenuNode::menu_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn menu(order_index: i32, created_at: DateTime<Utc>) -> Menu {
        Menu {
            id: MenuId::generate(),
            name: "m".to_string(),
            parent_id: None,
            order_index,
            version: 0,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn sibling_order_uses_order_index_then_creation_time() {
        let t0 = Utc::now();
        let later = menu(0, t0 + Duration::seconds(1));
        let earlier = menu(0, t0);
        let first = menu(-1, t0 + Duration::seconds(5));

        let mut menus = vec![later.clone(), earlier.clone(), first.clone()];
        menus.sort_by(sibling_order);

        assert_eq!(menus[0].id, first.id);
        assert_eq!(menus[1].id, earlier.id);
        assert_eq!(menus[2].id, later.id);
    }

    #[test]
    fn empty_name_fails_validation() {
        assert!(CreateMenuRequest::root("").validate().is_err());
        assert!(CreateMenuRequest::root("Main Menu").validate().is_ok());
    }
}
