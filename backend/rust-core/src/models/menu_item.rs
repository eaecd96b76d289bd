use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use validator::Validate;

use super::quiz::QuestionFilter;
use crate::utils::id::{ItemId, MenuId, QuestionId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    File,
    Link,
    Submenu,
    Quiz,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::File => "file",
            ItemType::Link => "link",
            ItemType::Submenu => "submenu",
            ItemType::Quiz => "quiz",
        }
    }
}

/// How a quiz item picks its questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum QuizSelection {
    /// Random sample of `count` questions matching `filter`.
    Filter {
        #[serde(default)]
        filter: QuestionFilter,
        count: usize,
    },
    /// Fixed question set, asked in the listed order.
    Questions {
        #[serde(rename = "questionIds")]
        question_ids: Vec<QuestionId>,
    },
}

/// Payload of a menu item; the variant is the item's type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ItemContent {
    File {
        #[serde(rename = "fileUrl")]
        file_url: String,
        #[serde(rename = "fileName", default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
    },
    Link {
        url: String,
    },
    Submenu {
        #[serde(rename = "targetMenuId")]
        target_menu_id: MenuId,
    },
    Quiz {
        selection: QuizSelection,
    },
}

impl ItemContent {
    pub fn item_type(&self) -> ItemType {
        match self {
            ItemContent::File { .. } => ItemType::File,
            ItemContent::Link { .. } => ItemType::Link,
            ItemContent::Submenu { .. } => ItemType::Submenu,
            ItemContent::Quiz { .. } => ItemType::Quiz,
        }
    }

    pub fn file(file_url: impl Into<String>) -> Self {
        ItemContent::File {
            file_url: file_url.into(),
            file_name: None,
        }
    }

    pub fn link(url: impl Into<String>) -> Self {
        ItemContent::Link { url: url.into() }
    }

    pub fn submenu(target_menu_id: MenuId) -> Self {
        ItemContent::Submenu { target_menu_id }
    }

    pub fn quiz(filter: QuestionFilter, count: usize) -> Self {
        ItemContent::Quiz {
            selection: QuizSelection::Filter { filter, count },
        }
    }
}

/// Coarse media class of a file item, used by the transport to pick how to
/// send it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Audio,
    Document,
    Other,
}

const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".m4a", ".wav"];
const DOCUMENT_EXTENSIONS: &[&str] = &[".pdf", ".doc", ".docx"];

impl FileKind {
    /// Classifies by extension found in the display name or the URL path.
    pub fn classify(url: &str, file_name: Option<&str>) -> Self {
        let haystacks = [
            file_name.map(str::to_lowercase),
            Some(strip_query(url).to_lowercase()),
        ];
        let matches = |exts: &[&str]| {
            haystacks
                .iter()
                .flatten()
                .any(|h| exts.iter().any(|ext| h.ends_with(ext)))
        };

        if matches(AUDIO_EXTENSIONS) {
            FileKind::Audio
        } else if matches(DOCUMENT_EXTENSIONS) {
            FileKind::Document
        } else {
            FileKind::Other
        }
    }
}

fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

/// Entry of a menu stored in the "menu_items" collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    #[serde(rename = "_id")]
    pub id: ItemId,
    #[serde(rename = "menuId")]
    pub menu_id: MenuId,
    pub title: String,
    pub content: ItemContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "orderIndex", default)]
    pub order_index: i32,
    #[serde(rename = "isActive", default = "default_active")]
    pub is_active: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl MenuItem {
    pub fn item_type(&self) -> ItemType {
        self.content.item_type()
    }

    /// URL of a file item, or of a link item.
    pub fn file_url(&self) -> Option<&str> {
        match &self.content {
            ItemContent::File { file_url, .. } => Some(file_url),
            ItemContent::Link { url } => Some(url),
            _ => None,
        }
    }

    pub fn file_kind(&self) -> Option<FileKind> {
        match &self.content {
            ItemContent::File {
                file_url,
                file_name,
            } => Some(FileKind::classify(file_url, file_name.as_deref())),
            _ => None,
        }
    }

    pub fn submenu_target(&self) -> Option<&MenuId> {
        match &self.content {
            ItemContent::Submenu { target_menu_id } => Some(target_menu_id),
            _ => None,
        }
    }
}

/// Sibling order: `order_index`, then creation time, then id.
pub fn item_order(a: &MenuItem, b: &MenuItem) -> Ordering {
    a.order_index
        .cmp(&b.order_index)
        .then(a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddItemRequest {
    pub menu_id: MenuId,

    #[validate(
        length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"),
        custom(function = "crate::models::non_blank")
    )]
    pub title: String,

    pub content: ItemContent,

    #[serde(default)]
    pub description: Option<String>,

    /// Appended after the last item when omitted.
    #[serde(default)]
    pub order_index: Option<i32>,
}

impl AddItemRequest {
    pub fn new(menu_id: MenuId, title: impl Into<String>, content: ItemContent) -> Self {
        Self {
            menu_id,
            title: title.into(),
            content,
            description: None,
            order_index: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_order(mut self, order_index: i32) -> Self {
        self.order_index = Some(order_index);
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateItemRequest {
    #[validate(
        length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"),
        custom(function = "crate::models::non_blank")
    )]
    pub title: Option<String>,

    pub description: Option<String>,

    pub order_index: Option<i32>,
}
