use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::Arc;
use validator::Validate;

use super::validation_error;
use crate::config::QuizSettings;
use crate::error::{CoreError, Result};
use crate::metrics::QUIZ_QUESTIONS_TOTAL;
use crate::models::{AddQuestionRequest, QuestionFilter, Quiz, UpdateQuestionRequest};
use crate::repository::Repository;
use crate::utils::id::QuestionId;
use crate::utils::time::Clock;

/// Catalog of multiple-choice questions.
pub struct QuizBank {
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    settings: QuizSettings,
}

impl QuizBank {
    pub fn new(repo: Arc<dyn Repository>, clock: Arc<dyn Clock>, settings: QuizSettings) -> Self {
        Self {
            repo,
            clock,
            settings,
        }
    }

    pub async fn add_question(&self, req: AddQuestionRequest) -> Result<Quiz> {
        req.validate().map_err(validation_error)?;
        let correct_option = validate_options(&req.options, req.correct_option)?;

        let now = self.clock.now();
        let quiz = Quiz {
            id: QuestionId::generate(),
            question: req.question,
            options: req.options,
            correct_option,
            difficulty: req.difficulty.unwrap_or(self.settings.default_difficulty),
            category: req.category.filter(|c| !c.trim().is_empty()),
            language: req
                .language
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| self.settings.default_language.clone()),
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.create_question(&quiz).await?;
        QUIZ_QUESTIONS_TOTAL.with_label_values(&["create"]).inc();

        tracing::info!(
            "Quiz question added: {} ({}, {:?}, {})",
            created.id,
            created.difficulty.as_str(),
            created.category,
            created.language
        );

        Ok(created)
    }

    pub async fn get_question(&self, id: &QuestionId) -> Result<Quiz> {
        Ok(self.repo.get_question(id).await?)
    }

    /// Applies the provided fields and revalidates the option list as a
    /// whole.
    pub async fn update_question(&self, id: &QuestionId, req: UpdateQuestionRequest) -> Result<Quiz> {
        req.validate().map_err(validation_error)?;

        let mut quiz = self.repo.get_question(id).await?;
        if let Some(question) = req.question {
            quiz.question = question;
        }
        let options = req.options.unwrap_or_else(|| quiz.options.clone());
        let correct_option = req.correct_option.unwrap_or(quiz.correct_option as i64);
        quiz.correct_option = validate_options(&options, correct_option)?;
        quiz.options = options;
        if let Some(difficulty) = req.difficulty {
            quiz.difficulty = difficulty;
        }
        if let Some(category) = req.category {
            quiz.category = Some(category).filter(|c| !c.trim().is_empty());
        }
        if let Some(language) = req.language.filter(|l| !l.trim().is_empty()) {
            quiz.language = language;
        }
        quiz.updated_at = self.clock.now();

        let updated = self.repo.update_question(&quiz).await?;
        QUIZ_QUESTIONS_TOTAL.with_label_values(&["update"]).inc();
        tracing::info!("Quiz question updated: {}", updated.id);

        Ok(updated)
    }

    /// Removes a question from the bank. Sessions already holding it keep
    /// their snapshot.
    pub async fn delete_question(&self, id: &QuestionId) -> Result<()> {
        self.repo.delete_question(id).await?;
        QUIZ_QUESTIONS_TOTAL.with_label_values(&["delete"]).inc();
        tracing::info!("Quiz question deleted: {}", id);
        Ok(())
    }

    /// Questions matching every provided filter field, in no particular
    /// order.
    pub async fn find(&self, filter: &QuestionFilter) -> Result<Vec<Quiz>> {
        Ok(self.repo.query_questions(filter).await?)
    }

    /// Draws `count` distinct questions matching `filter`.
    ///
    /// The pool is put in creation order before shuffling, so the same seed
    /// over the same bank yields the same sequence regardless of how the
    /// backend orders its results.
    pub async fn sample_questions(
        &self,
        filter: &QuestionFilter,
        count: usize,
        seed: Option<u64>,
    ) -> Result<Vec<Quiz>> {
        let mut pool = self.repo.query_questions(filter).await?;
        if pool.len() < count {
            tracing::debug!(
                "Not enough questions for {:?}: requested {}, available {}",
                filter,
                count,
                pool.len()
            );
            return Err(CoreError::InsufficientQuestions {
                requested: count,
                available: pool.len(),
            });
        }

        pool.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let mut rng = StdRng::seed_from_u64(seed.unwrap_or_else(rand::random));
        pool.shuffle(&mut rng);
        pool.truncate(count);

        Ok(pool)
    }

    /// One random question matching `filter`.
    pub async fn random_question(&self, filter: &QuestionFilter, seed: Option<u64>) -> Result<Quiz> {
        let mut picked = self.sample_questions(filter, 1, seed).await?;
        picked.pop().ok_or(CoreError::InsufficientQuestions {
            requested: 1,
            available: 0,
        })
    }
}

/// Checks the option list and returns `correct_option` as an index.
fn validate_options(options: &[String], correct_option: i64) -> Result<usize> {
    if options.len() < 2 {
        return Err(CoreError::InvalidOptions(format!(
            "at least two options are required, got {}",
            options.len()
        )));
    }

    let mut seen = HashSet::new();
    for option in options {
        let text = option.trim();
        if text.is_empty() {
            return Err(CoreError::InvalidOptions(
                "options must not be blank".to_string(),
            ));
        }
        if !seen.insert(text) {
            return Err(CoreError::InvalidOptions(format!(
                "duplicate option {:?}",
                text
            )));
        }
    }

    usize::try_from(correct_option)
        .ok()
        .filter(|index| *index < options.len())
        .ok_or(CoreError::IndexOutOfRange {
            index: correct_option,
            len: options.len(),
        })
}
