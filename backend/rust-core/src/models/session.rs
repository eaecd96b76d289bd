use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::quiz::{QuestionView, Quiz};
use crate::utils::id::{QuestionId, SessionId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    InProgress,
    Completed,
    Abandoned,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::InProgress => "in_progress",
            SessionState::Completed => "completed",
            SessionState::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::InProgress)
    }
}

/// One run through a selected set of questions.
///
/// Questions are snapshots taken from the bank when the session starts and
/// shared read-only; the answer map belongs to the session alone.
#[derive(Debug, Clone)]
pub struct QuizSession {
    pub id: SessionId,
    pub questions: Vec<Arc<Quiz>>,
    pub answers: HashMap<QuestionId, usize>,
    pub state: SessionState,
    /// Set once by `finish`.
    pub score: Option<usize>,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuizSession {
    pub fn question(&self, question_id: &QuestionId) -> Option<&Arc<Quiz>> {
        self.questions.iter().find(|q| &q.id == question_id)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// What the player may see of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub state: SessionState,
    pub questions: Vec<QuestionView>,
    pub answers: HashMap<QuestionId, usize>,
    pub score: Option<usize>,
    pub expires_at: DateTime<Utc>,
}

impl From<&QuizSession> for SessionView {
    fn from(session: &QuizSession) -> Self {
        SessionView {
            session_id: session.id.clone(),
            state: session.state,
            questions: session
                .questions
                .iter()
                .map(|q| QuestionView::from(q.as_ref()))
                .collect(),
            answers: session.answers.clone(),
            score: session.score,
            expires_at: session.expires_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionOutcome {
    pub question_id: QuestionId,
    pub chosen_option: Option<usize>,
    pub correct_option: usize,
    pub correct: bool,
}

/// Final tally returned by `finish`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizResult {
    pub session_id: SessionId,
    pub score: usize,
    pub total: usize,
    pub answered: usize,
    pub breakdown: Vec<QuestionOutcome>,
}

impl QuizResult {
    pub fn from_session(session: &QuizSession) -> Self {
        let breakdown: Vec<QuestionOutcome> = session
            .questions
            .iter()
            .map(|q| {
                let chosen = session.answers.get(&q.id).copied();
                QuestionOutcome {
                    question_id: q.id.clone(),
                    chosen_option: chosen,
                    correct_option: q.correct_option,
                    correct: chosen.is_some_and(|c| q.is_correct(c)),
                }
            })
            .collect();

        QuizResult {
            session_id: session.id.clone(),
            score: breakdown.iter().filter(|o| o.correct).count(),
            total: session.questions.len(),
            answered: session.answers.len(),
            breakdown,
        }
    }
}
