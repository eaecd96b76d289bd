use chrono::{DateTime, Duration, Utc};
use content_core::{
    config::Config,
    error::CoreError,
    models::{AddItemRequest, Difficulty, ItemContent, QuestionFilter, QuizSelection, SessionState},
    repository::InMemoryRepository,
    services::AppState,
    utils::{
        id::{QuestionId, SessionId},
        time::MonotonicClock,
    },
};
use std::sync::Arc;

mod common;

#[tokio::test]
async fn test_easy_geography_session_scores_and_closes() {
    let state = common::create_test_state();
    let q1 = common::seed_question(&state, "Longest river?", Difficulty::Easy, "geography").await;
    let q2 = common::seed_question(&state, "Highest peak?", Difficulty::Easy, "geography").await;
    common::seed_question(&state, "Hard one", Difficulty::Hard, "geography").await;

    let filter = QuestionFilter::any().with_difficulty(Difficulty::Easy);
    let session = state.sessions.start(&filter, 2, Some(1)).await.unwrap();
    let replay = state.sessions.start(&filter, 2, Some(1)).await.unwrap();

    let ids: Vec<QuestionId> = session.questions.iter().map(|q| q.id.clone()).collect();
    let replay_ids: Vec<QuestionId> = replay.questions.iter().map(|q| q.id.clone()).collect();
    assert_eq!(ids, replay_ids);
    assert!(ids.contains(&q1.id) && ids.contains(&q2.id));
    assert_eq!(session.state, SessionState::InProgress);

    for id in &ids {
        state.sessions.answer(&session.session_id, id, 1).await.unwrap();
    }
    let result = state.sessions.finish(&session.session_id).await.unwrap();
    assert_eq!(result.score, 2);
    assert_eq!(result.total, 2);
    assert_eq!(result.answered, 2);

    let err = state
        .sessions
        .answer(&session.session_id, &ids[0], 1)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::SessionClosed(_)));

    let view = state.sessions.view(&session.session_id).await.unwrap();
    assert_eq!(view.state, SessionState::Completed);
    assert_eq!(view.score, Some(2));
}

#[tokio::test]
async fn test_session_view_never_reveals_correct_option() {
    let state = common::create_test_state();
    common::seed_question(&state, "Q1", Difficulty::Easy, "math").await;

    let session = state
        .sessions
        .start(&QuestionFilter::any(), 1, None)
        .await
        .unwrap();

    let json = serde_json::to_string(&session).unwrap();
    assert!(!json.contains("correct"));
}

#[tokio::test]
async fn test_answer_validation() {
    let state = common::create_test_state();
    common::seed_question(&state, "Q1", Difficulty::Easy, "math").await;
    let outsider = common::seed_question(&state, "Q2", Difficulty::Hard, "math").await;

    let session = state
        .sessions
        .start(&QuestionFilter::any().with_difficulty(Difficulty::Easy), 1, None)
        .await
        .unwrap();
    let question_id = session.questions[0].id.clone();

    let err = state
        .sessions
        .answer(&session.session_id, &question_id, 3)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidOption { index: 3, len: 3 }));

    let err = state
        .sessions
        .answer(&session.session_id, &question_id, -1)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidOption { index: -1, .. }));

    let err = state
        .sessions
        .answer(&session.session_id, &outsider.id, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::UnknownQuestion { .. }));

    let err = state
        .sessions
        .answer(&SessionId::generate(), &question_id, 0)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not_found");
}

#[tokio::test]
async fn test_later_answer_replaces_earlier_one() {
    let state = common::create_test_state();
    common::seed_question(&state, "Q1", Difficulty::Easy, "math").await;

    let session = state
        .sessions
        .start(&QuestionFilter::any(), 1, None)
        .await
        .unwrap();
    let question_id = session.questions[0].id.clone();

    state
        .sessions
        .answer(&session.session_id, &question_id, 1)
        .await
        .unwrap();
    state
        .sessions
        .answer(&session.session_id, &question_id, 0)
        .await
        .unwrap();

    let view = state.sessions.view(&session.session_id).await.unwrap();
    assert_eq!(view.answers.get(&question_id), Some(&0));

    let result = state.sessions.finish(&session.session_id).await.unwrap();
    assert_eq!(result.score, 0);
    assert_eq!(result.answered, 1);
}

#[tokio::test]
async fn test_unanswered_questions_count_as_wrong() {
    let state = common::create_test_state();
    for i in 0..3 {
        common::seed_question(&state, &format!("Q{}", i), Difficulty::Easy, "math").await;
    }

    let session = state
        .sessions
        .start(&QuestionFilter::any(), 3, Some(7))
        .await
        .unwrap();
    state
        .sessions
        .answer(&session.session_id, &session.questions[0].id, 1)
        .await
        .unwrap();

    let result = state.sessions.finish(&session.session_id).await.unwrap();
    assert_eq!(result.score, 1);
    assert_eq!(result.total, 3);
    assert_eq!(
        result
            .breakdown
            .iter()
            .filter(|o| o.chosen_option.is_none())
            .count(),
        2
    );

    let err = state.sessions.finish(&session.session_id).await.unwrap_err();
    assert!(matches!(err, CoreError::SessionClosed(_)));
}

#[tokio::test]
async fn test_start_rejects_impossible_requests() {
    let state = common::create_test_state();
    common::seed_question(&state, "Q1", Difficulty::Easy, "math").await;

    let err = state
        .sessions
        .start(&QuestionFilter::any(), 0, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_input");

    let err = state
        .sessions
        .start(&QuestionFilter::any(), 2, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InsufficientQuestions { .. }));
}

#[tokio::test]
async fn test_abandoned_session_rejects_input() {
    let state = common::create_test_state();
    common::seed_question(&state, "Q1", Difficulty::Easy, "math").await;

    let session = state
        .sessions
        .start(&QuestionFilter::any(), 1, None)
        .await
        .unwrap();
    state.sessions.abandon(&session.session_id).await.unwrap();

    let err = state.sessions.finish(&session.session_id).await.unwrap_err();
    assert!(matches!(err, CoreError::SessionClosed(_)));
    let err = state.sessions.abandon(&session.session_id).await.unwrap_err();
    assert!(matches!(err, CoreError::SessionClosed(_)));

    let view = state.sessions.view(&session.session_id).await.unwrap();
    assert_eq!(view.state, SessionState::Abandoned);
    assert_eq!(view.score, None);
}

#[tokio::test]
async fn test_session_expires_after_ttl() {
    let (state, clock) = common::create_test_state_with_clock();
    common::seed_question(&state, "Q1", Difficulty::Easy, "math").await;

    let session = state
        .sessions
        .start(&QuestionFilter::any(), 1, None)
        .await
        .unwrap();
    let question_id = session.questions[0].id.clone();

    clock.advance(Duration::seconds(3599));
    state
        .sessions
        .answer(&session.session_id, &question_id, 1)
        .await
        .unwrap();

    clock.advance(Duration::seconds(1));
    let err = state
        .sessions
        .answer(&session.session_id, &question_id, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::SessionClosed(_)));

    let view = state.sessions.view(&session.session_id).await.unwrap();
    assert_eq!(view.state, SessionState::Abandoned);
}

#[tokio::test]
async fn test_expire_stale_and_purge_closed() {
    let (state, clock) = common::create_test_state_with_clock();
    common::seed_question(&state, "Q1", Difficulty::Easy, "math").await;

    let old = state
        .sessions
        .start(&QuestionFilter::any(), 1, None)
        .await
        .unwrap();
    clock.advance(Duration::seconds(1800));
    let fresh = state
        .sessions
        .start(&QuestionFilter::any(), 1, None)
        .await
        .unwrap();
    clock.advance(Duration::seconds(1800));

    assert_eq!(state.sessions.expire_stale().await, 1);
    assert_eq!(state.sessions.expire_stale().await, 0);

    assert_eq!(state.sessions.purge_closed().await, 1);
    assert!(state.sessions.view(&old.session_id).await.is_err());
    assert_eq!(
        state.sessions.view(&fresh.session_id).await.unwrap().state,
        SessionState::InProgress
    );
}

#[tokio::test]
async fn test_session_keeps_snapshot_of_deleted_question() {
    let state = common::create_test_state();
    let quiz = common::seed_question(&state, "Q1", Difficulty::Easy, "math").await;

    let session = state
        .sessions
        .start(&QuestionFilter::any(), 1, None)
        .await
        .unwrap();
    state.quiz_bank.delete_question(&quiz.id).await.unwrap();

    state
        .sessions
        .answer(&session.session_id, &quiz.id, 1)
        .await
        .unwrap();
    let result = state.sessions.finish(&session.session_id).await.unwrap();
    assert_eq!(result.score, 1);
}

#[tokio::test]
async fn test_start_from_quiz_item() {
    let state = common::create_test_state();
    let main = common::root_menu(&state, "Main Menu").await;
    let q1 = common::seed_question(&state, "Q1", Difficulty::Easy, "geography").await;
    let q2 = common::seed_question(&state, "Q2", Difficulty::Easy, "history").await;

    let by_filter = state
        .items
        .add_item(AddItemRequest::new(
            main.id.clone(),
            "Geography quiz",
            ItemContent::quiz(QuestionFilter::any().with_category("geography"), 1),
        ))
        .await
        .unwrap();
    let session = state
        .sessions
        .start_from_item(&by_filter.id, None)
        .await
        .unwrap();
    assert_eq!(session.questions.len(), 1);
    assert_eq!(session.questions[0].id, q1.id);

    let fixed = state
        .items
        .add_item(AddItemRequest::new(
            main.id.clone(),
            "Fixed quiz",
            ItemContent::Quiz {
                selection: QuizSelection::Questions {
                    question_ids: vec![q2.id.clone(), q1.id.clone()],
                },
            },
        ))
        .await
        .unwrap();
    let session = state.sessions.start_from_item(&fixed.id, None).await.unwrap();
    let ids: Vec<QuestionId> = session.questions.iter().map(|q| q.id.clone()).collect();
    assert_eq!(ids, vec![q2.id.clone(), q1.id.clone()]);

    let link = state
        .items
        .add_item(AddItemRequest::new(
            main.id.clone(),
            "Site",
            ItemContent::link("https://example.org"),
        ))
        .await
        .unwrap();
    let err = state
        .sessions
        .start_from_item(&link.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::WrongType { .. }));

    state.items.deactivate(&by_filter.id).await.unwrap();
    let err = state
        .sessions
        .start_from_item(&by_filter.id, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "not_found");
}

#[tokio::test]
async fn test_huge_session_ttl_saturates_instead_of_overflowing() {
    let mut config = Config::default();
    config.quiz.session_ttl_seconds = 100_000_000_000_000;
    let state = AppState::with_repository(
        config,
        Arc::new(InMemoryRepository::new()),
        Arc::new(MonotonicClock::new()),
    );
    common::seed_question(&state, "Q1", Difficulty::Easy, "math").await;

    let session = state
        .sessions
        .start(&QuestionFilter::any(), 1, None)
        .await
        .unwrap();

    assert_eq!(session.expires_at, DateTime::<Utc>::MAX_UTC);
    state
        .sessions
        .answer(&session.session_id, &session.questions[0].id, 1)
        .await
        .unwrap();
}
