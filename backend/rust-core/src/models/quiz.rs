use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::Validate;

use crate::utils::id::QuestionId;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(format!("Invalid difficulty: {}", value)),
        }
    }
}

/// Multiple-choice question stored in the "quizzes" collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    #[serde(rename = "_id")]
    pub id: QuestionId,
    pub question: String,
    pub options: Vec<String>,
    #[serde(rename = "correctOption")]
    pub correct_option: usize,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub category: Option<String>,
    pub language: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Quiz {
    pub fn is_correct(&self, chosen: usize) -> bool {
        self.correct_option == chosen
    }
}

/// Question as shown to a player: no correct option.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionView {
    pub id: QuestionId,
    pub question: String,
    pub options: Vec<String>,
    pub difficulty: Difficulty,
    pub category: Option<String>,
    pub language: String,
}

impl From<&Quiz> for QuestionView {
    fn from(quiz: &Quiz) -> Self {
        QuestionView {
            id: quiz.id.clone(),
            question: quiz.question.clone(),
            options: quiz.options.clone(),
            difficulty: quiz.difficulty,
            category: quiz.category.clone(),
            language: quiz.language.clone(),
        }
    }
}

/// Conjunctive filter over the bank; `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl QuestionFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = Some(difficulty);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn matches(&self, quiz: &Quiz) -> bool {
        self.category
            .as_ref()
            .is_none_or(|c| quiz.category.as_deref() == Some(c.as_str()))
            && self.difficulty.is_none_or(|d| quiz.difficulty == d)
            && self.language.as_ref().is_none_or(|l| &quiz.language == l)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddQuestionRequest {
    #[validate(
        length(min = 1, message = "Question text must not be empty"),
        custom(function = "crate::models::non_blank")
    )]
    pub question: String,

    #[validate(length(min = 2, message = "At least two options are required"))]
    pub options: Vec<String>,

    /// Signed so that negative indices coming from the transport are rejected
    /// as out of range rather than failing to parse.
    pub correct_option: i64,

    /// Bank default when omitted.
    #[serde(default)]
    pub difficulty: Option<Difficulty>,

    #[serde(default)]
    pub category: Option<String>,

    /// Bank default when omitted.
    #[serde(default)]
    pub language: Option<String>,
}

impl AddQuestionRequest {
    pub fn new<S: Into<String>>(
        question: impl Into<String>,
        options: impl IntoIterator<Item = S>,
        correct_option: i64,
    ) -> Self {
        Self {
            question: question.into(),
            options: options.into_iter().map(Into::into).collect(),
            correct_option,
            difficulty: None,
            category: None,
            language: None,
        }
    }

    pub fn difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = Some(difficulty);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateQuestionRequest {
    #[validate(
        length(min = 1, message = "Question text must not be empty"),
        custom(function = "crate::models::non_blank")
    )]
    pub question: Option<String>,

    #[validate(length(min = 2, message = "At least two options are required"))]
    pub options: Option<Vec<String>>,

    pub correct_option: Option<i64>,

    pub difficulty: Option<Difficulty>,

    pub category: Option<String>,

    pub language: Option<String>,
}
