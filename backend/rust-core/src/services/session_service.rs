use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::quiz_bank::QuizBank;
use crate::config::QuizSettings;
use crate::error::{CoreError, Result};
use crate::metrics::{QUIZ_ANSWERS_SUBMITTED_TOTAL, QUIZ_SESSIONS_ACTIVE, QUIZ_SESSIONS_TOTAL};
use crate::models::{
    ItemContent, ItemType, QuestionFilter, Quiz, QuizResult, QuizSelection, QuizSession,
    SessionState, SessionView,
};
use crate::repository::Repository;
use crate::utils::id::{ItemId, QuestionId, SessionId};
use crate::utils::time::Clock;

const SESSION_ENTITY: &str = "quiz_session";

/// Drives quiz sessions from start to a terminal state.
///
/// Sessions live in memory only. Each operation takes the session map lock
/// for its whole read-modify-write, so a session is never observed half
/// updated.
pub struct SessionService {
    repo: Arc<dyn Repository>,
    bank: Arc<QuizBank>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    sessions: RwLock<HashMap<SessionId, QuizSession>>,
}

impl SessionService {
    pub fn new(
        repo: Arc<dyn Repository>,
        bank: Arc<QuizBank>,
        clock: Arc<dyn Clock>,
        settings: QuizSettings,
    ) -> Self {
        Self {
            repo,
            bank,
            clock,
            ttl: Duration::try_seconds(settings.session_ttl_seconds).unwrap_or(Duration::MAX),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Starts a session over `count` questions sampled from `filter`.
    pub async fn start(
        &self,
        filter: &QuestionFilter,
        count: usize,
        seed: Option<u64>,
    ) -> Result<SessionView> {
        if count == 0 {
            return Err(CoreError::InvalidInput {
                field: "count".to_string(),
                message: "a quiz needs at least one question".to_string(),
            });
        }
        let questions = self.bank.sample_questions(filter, count, seed).await?;
        self.open(questions).await
    }

    /// Starts a session from the selection rule of an active quiz item.
    pub async fn start_from_item(&self, item_id: &ItemId, seed: Option<u64>) -> Result<SessionView> {
        let item = self.repo.get_item(item_id).await?;
        if !item.is_active {
            return Err(CoreError::not_found("menu_item", item_id));
        }

        let selection = match &item.content {
            ItemContent::Quiz { selection } => selection,
            other => {
                return Err(CoreError::WrongType {
                    item_id: item_id.to_string(),
                    expected: ItemType::Quiz.as_str(),
                    actual: other.item_type().as_str(),
                })
            }
        };

        match selection {
            QuizSelection::Filter { filter, count } => self.start(filter, *count, seed).await,
            QuizSelection::Questions { question_ids } => {
                let mut questions = Vec::with_capacity(question_ids.len());
                for question_id in question_ids {
                    questions.push(self.bank.get_question(question_id).await?);
                }
                self.open(questions).await
            }
        }
    }

    /// Records `chosen_option` for `question_id`, replacing any earlier
    /// answer to it.
    pub async fn answer(
        &self,
        session_id: &SessionId,
        question_id: &QuestionId,
        chosen_option: i64,
    ) -> Result<()> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| CoreError::not_found(SESSION_ENTITY, session_id))?;

        ensure_open(session, now)?;

        let question = session
            .question(question_id)
            .ok_or_else(|| CoreError::UnknownQuestion {
                session_id: session_id.to_string(),
                question_id: question_id.to_string(),
            })?;

        let len = question.options.len();
        let chosen = usize::try_from(chosen_option)
            .ok()
            .filter(|index| *index < len)
            .ok_or(CoreError::InvalidOption {
                index: chosen_option,
                len,
            })?;

        let replaced = session.answers.insert(question_id.clone(), chosen).is_some();
        session.updated_at = now;

        let outcome = if replaced { "replaced" } else { "recorded" };
        QUIZ_ANSWERS_SUBMITTED_TOTAL
            .with_label_values(&[outcome])
            .inc();
        tracing::debug!(
            "Answer {} for session {}: question {} -> option {}",
            outcome,
            session_id,
            question_id,
            chosen
        );

        Ok(())
    }

    /// Completes the session and scores it. Unanswered questions count as
    /// wrong.
    pub async fn finish(&self, session_id: &SessionId) -> Result<QuizResult> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| CoreError::not_found(SESSION_ENTITY, session_id))?;

        ensure_open(session, now)?;

        let result = QuizResult::from_session(session);
        session.state = SessionState::Completed;
        session.score = Some(result.score);
        session.updated_at = now;

        QUIZ_SESSIONS_TOTAL.with_label_values(&["completed"]).inc();
        QUIZ_SESSIONS_ACTIVE.dec();
        tracing::info!(
            "Session completed: {} score {}/{}",
            session_id,
            result.score,
            result.total
        );

        Ok(result)
    }

    /// Cancels an in-progress session. No score is computed.
    pub async fn abandon(&self, session_id: &SessionId) -> Result<()> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| CoreError::not_found(SESSION_ENTITY, session_id))?;

        if session.state.is_terminal() {
            return Err(CoreError::SessionClosed(session_id.to_string()));
        }

        mark_abandoned(session, now, "abandoned");
        Ok(())
    }

    pub async fn view(&self, session_id: &SessionId) -> Result<SessionView> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(SessionView::from)
            .ok_or_else(|| CoreError::not_found(SESSION_ENTITY, session_id))
    }

    /// Abandons every in-progress session past its deadline and returns how
    /// many were closed.
    pub async fn expire_stale(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let mut expired = 0;
        for session in sessions.values_mut() {
            if session.state == SessionState::InProgress && session.is_expired(now) {
                mark_abandoned(session, now, "expired");
                expired += 1;
            }
        }
        if expired > 0 {
            tracing::info!("Expired {} stale quiz sessions", expired);
        }
        expired
    }

    /// Drops completed and abandoned sessions from memory.
    pub async fn purge_closed(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.state.is_terminal());
        before - sessions.len()
    }

    async fn open(&self, questions: Vec<Quiz>) -> Result<SessionView> {
        let now = self.clock.now();
        let session = QuizSession {
            id: SessionId::generate(),
            questions: questions.into_iter().map(Arc::new).collect(),
            answers: HashMap::new(),
            state: SessionState::InProgress,
            score: None,
            started_at: now,
            expires_at: now
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            updated_at: now,
        };
        let view = SessionView::from(&session);

        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);

        QUIZ_SESSIONS_TOTAL.with_label_values(&["started"]).inc();
        QUIZ_SESSIONS_ACTIVE.inc();
        tracing::info!(
            "Session started: {} with {} questions",
            view.session_id,
            view.questions.len()
        );

        Ok(view)
    }
}

/// Fails with `SessionClosed` unless the session can still take input. An
/// overdue session is abandoned on the spot.
fn ensure_open(session: &mut QuizSession, now: DateTime<Utc>) -> Result<()> {
    if session.state.is_terminal() {
        return Err(CoreError::SessionClosed(session.id.to_string()));
    }
    if session.is_expired(now) {
        mark_abandoned(session, now, "expired");
        return Err(CoreError::SessionClosed(session.id.to_string()));
    }
    Ok(())
}

fn mark_abandoned(session: &mut QuizSession, now: DateTime<Utc>, reason: &str) {
    session.state = SessionState::Abandoned;
    session.updated_at = now;
    QUIZ_SESSIONS_TOTAL.with_label_values(&[reason]).inc();
    QUIZ_SESSIONS_ACTIVE.dec();
    tracing::info!("Session {}: {}", reason, session.id);
}
