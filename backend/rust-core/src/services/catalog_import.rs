//! Bulk import of a menu/question catalog described as JSON.
//!
//! Everything goes through the regular services, so an imported catalog is
//! held to exactly the same invariants as hand-made content. Menus and
//! questions can carry a `key` that other entries use to refer to them
//! before their ids exist.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::AppState;
use crate::error::{CoreError, Result};
use crate::models::{
    AddItemRequest, AddQuestionRequest, CreateMenuRequest, Difficulty, ItemContent,
    QuestionFilter, QuizSelection,
};
use crate::utils::id::{MenuId, QuestionId};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogImport {
    #[serde(default)]
    pub questions: Vec<CatalogQuestion>,
    #[serde(default)]
    pub menus: Vec<CatalogMenu>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogQuestion {
    #[serde(default)]
    pub key: Option<String>,
    pub question: String,
    pub options: Vec<String>,
    pub correct_option: i64,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogMenu {
    #[serde(default)]
    pub key: Option<String>,
    pub name: String,
    #[serde(default)]
    pub order_index: Option<i32>,
    #[serde(default)]
    pub items: Vec<CatalogItem>,
    #[serde(default)]
    pub children: Vec<CatalogMenu>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogItem {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub order_index: Option<i32>,
    #[serde(default = "default_active")]
    pub active: bool,
    pub content: CatalogContent,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CatalogContent {
    File {
        file_url: String,
        #[serde(default)]
        file_name: Option<String>,
    },
    Link {
        url: String,
    },
    /// `target` is the `key` of a menu anywhere in the catalog.
    Submenu {
        target: String,
    },
    /// Either a fixed list of question keys, or a filter with an optional
    /// count.
    Quiz {
        #[serde(default)]
        questions: Vec<String>,
        #[serde(default)]
        filter: QuestionFilter,
        #[serde(default)]
        count: Option<usize>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub menus: usize,
    pub items: usize,
    pub questions: usize,
}

struct PendingItem {
    menu_id: MenuId,
    item: CatalogItem,
}

pub async fn import_catalog(state: &AppState, catalog: CatalogImport) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    let mut question_keys: HashMap<String, QuestionId> = HashMap::new();
    for entry in catalog.questions {
        if let Some(key) = &entry.key {
            if question_keys.contains_key(key) {
                return Err(duplicate_key("question", key));
            }
        }

        let mut req = AddQuestionRequest::new(entry.question, entry.options, entry.correct_option);
        req.difficulty = entry.difficulty;
        req.category = entry.category;
        req.language = entry.language;

        let quiz = state.quiz_bank.add_question(req).await?;
        if let Some(key) = entry.key {
            question_keys.insert(key, quiz.id);
        }
        summary.questions += 1;
    }

    // Menus first; submenu items wait until every key is known.
    let mut menu_keys: HashMap<String, MenuId> = HashMap::new();
    let mut deferred: Vec<PendingItem> = Vec::new();
    let mut stack: Vec<(CatalogMenu, Option<MenuId>)> = catalog
        .menus
        .into_iter()
        .rev()
        .map(|menu| (menu, None))
        .collect();

    while let Some((spec, parent_id)) = stack.pop() {
        let req = CreateMenuRequest {
            name: spec.name,
            parent_id,
            order_index: spec.order_index,
        };
        let menu = state.menus.create_menu(req).await?;
        summary.menus += 1;

        if let Some(key) = spec.key {
            if menu_keys.insert(key.clone(), menu.id.clone()).is_some() {
                return Err(duplicate_key("menu", &key));
            }
        }

        // Items without an explicit order keep their position in the catalog.
        for (position, mut item) in spec.items.into_iter().enumerate() {
            item.order_index = item.order_index.or(Some(position as i32));
            if matches!(item.content, CatalogContent::Submenu { .. }) {
                deferred.push(PendingItem {
                    menu_id: menu.id.clone(),
                    item,
                });
            } else {
                let content = resolve_content(&item.content, &menu_keys, &question_keys, state)?;
                add_catalog_item(state, menu.id.clone(), item, content).await?;
                summary.items += 1;
            }
        }

        for child in spec.children.into_iter().rev() {
            stack.push((child, Some(menu.id.clone())));
        }
    }

    for pending in deferred {
        let content = resolve_content(&pending.item.content, &menu_keys, &question_keys, state)?;
        add_catalog_item(state, pending.menu_id, pending.item, content).await?;
        summary.items += 1;
    }

    tracing::info!(
        "Catalog imported: {} menus, {} items, {} questions",
        summary.menus,
        summary.items,
        summary.questions
    );

    Ok(summary)
}

fn duplicate_key(kind: &str, key: &str) -> CoreError {
    CoreError::InvalidInput {
        field: "key".to_string(),
        message: format!("{} key {:?} is used twice", kind, key),
    }
}

async fn add_catalog_item(
    state: &AppState,
    menu_id: MenuId,
    item: CatalogItem,
    content: ItemContent,
) -> Result<()> {
    let mut req = AddItemRequest::new(menu_id, item.title, content);
    req.description = item.description;
    req.order_index = item.order_index;

    let created = state.items.add_item(req).await?;
    if !item.active {
        state.items.deactivate(&created.id).await?;
    }
    Ok(())
}

fn resolve_content(
    content: &CatalogContent,
    menu_keys: &HashMap<String, MenuId>,
    question_keys: &HashMap<String, QuestionId>,
    state: &AppState,
) -> Result<ItemContent> {
    Ok(match content {
        CatalogContent::File {
            file_url,
            file_name,
        } => ItemContent::File {
            file_url: file_url.clone(),
            file_name: file_name.clone(),
        },
        CatalogContent::Link { url } => ItemContent::link(url.clone()),
        CatalogContent::Submenu { target } => {
            let target_menu_id = menu_keys.get(target).cloned().ok_or_else(|| {
                CoreError::InvalidPayload(format!("unknown submenu target key {:?}", target))
            })?;
            ItemContent::submenu(target_menu_id)
        }
        CatalogContent::Quiz {
            questions,
            filter,
            count,
        } => {
            let selection = if questions.is_empty() {
                QuizSelection::Filter {
                    filter: filter.clone(),
                    count: count.unwrap_or(state.config.quiz.default_question_count),
                }
            } else {
                let question_ids = questions
                    .iter()
                    .map(|key| {
                        question_keys.get(key).cloned().ok_or_else(|| {
                            CoreError::InvalidPayload(format!("unknown question key {:?}", key))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                QuizSelection::Questions { question_ids }
            };
            ItemContent::Quiz { selection }
        }
    })
}
