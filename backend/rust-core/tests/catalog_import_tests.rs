use content_core::{
    error::CoreError,
    models::{ItemType, QuizSelection},
    services::catalog_import::{import_catalog, CatalogImport, ImportSummary},
};

mod common;

const CATALOG: &str = r#"{
    "questions": [
        {"key": "nile", "question": "Longest river?", "options": ["Nile", "Amazon"], "correct_option": 0, "difficulty": "easy", "category": "geography"},
        {"key": "everest", "question": "Highest peak?", "options": ["K2", "Everest"], "correct_option": 1, "difficulty": "easy", "category": "geography"}
    ],
    "menus": [
        {"key": "main", "name": "Main Menu", "items": [
            {"title": "Extras", "content": {"type": "submenu", "target": "extras"}},
            {"title": "Geography quiz", "content": {"type": "quiz", "questions": ["nile", "everest"]}}
        ], "children": [
            {"name": "Lessons", "items": [
                {"title": "Lesson 1", "content": {"type": "file", "file_url": "https://cdn.example.org/lesson1.mp3"}},
                {"title": "Old lesson", "active": false, "content": {"type": "link", "url": "https://example.org/old"}}
            ]}
        ]},
        {"key": "extras", "name": "Extras", "items": [
            {"title": "Random quiz", "content": {"type": "quiz", "filter": {"difficulty": "easy"}}}
        ]}
    ]
}"#;

#[tokio::test]
async fn test_import_builds_the_whole_catalog() {
    let state = common::create_test_state();
    let catalog: CatalogImport = serde_json::from_str(CATALOG).unwrap();

    let summary = import_catalog(&state, catalog).await.unwrap();
    assert_eq!(
        summary,
        ImportSummary {
            menus: 3,
            items: 5,
            questions: 2
        }
    );

    let tree = state.menus.tree().await.unwrap();
    let names: Vec<&str> = tree.iter().map(|n| n.menu.name.as_str()).collect();
    assert_eq!(names, vec!["Main Menu", "Extras"]);

    let main = &tree[0];
    let main_types: Vec<ItemType> = main.items.iter().map(|i| i.item_type()).collect();
    assert_eq!(main_types, vec![ItemType::Submenu, ItemType::Quiz]);
    assert_eq!(main.items[0].submenu_target(), Some(&tree[1].menu.id));

    let lessons = &main.children[0];
    assert_eq!(lessons.items.len(), 1);
    assert_eq!(
        state
            .items
            .list_all_items(&lessons.menu.id)
            .await
            .unwrap()
            .len(),
        2
    );

    // Filter quizzes without a count use the configured default.
    let random = &tree[1].items[0];
    match &random.content {
        content_core::models::ItemContent::Quiz {
            selection: QuizSelection::Filter { count, .. },
        } => assert_eq!(*count, state.config.quiz.default_question_count),
        other => panic!("unexpected content {:?}", other),
    }
}

#[tokio::test]
async fn test_imported_quiz_item_can_be_played() {
    let state = common::create_test_state();
    let catalog: CatalogImport = serde_json::from_str(CATALOG).unwrap();
    import_catalog(&state, catalog).await.unwrap();

    let tree = state.menus.tree().await.unwrap();
    let quiz_item = &tree[0].items[1];

    let session = state
        .sessions
        .start_from_item(&quiz_item.id, None)
        .await
        .unwrap();
    let texts: Vec<&str> = session
        .questions
        .iter()
        .map(|q| q.question.as_str())
        .collect();
    assert_eq!(texts, vec!["Longest river?", "Highest peak?"]);

    state
        .sessions
        .answer(&session.session_id, &session.questions[0].id, 0)
        .await
        .unwrap();
    state
        .sessions
        .answer(&session.session_id, &session.questions[1].id, 1)
        .await
        .unwrap();
    let result = state.sessions.finish(&session.session_id).await.unwrap();
    assert_eq!(result.score, 2);
}

#[tokio::test]
async fn test_import_rejects_unknown_keys() {
    let state = common::create_test_state();
    let catalog: CatalogImport = serde_json::from_str(
        r#"{"menus": [{"name": "Main Menu", "items": [
            {"title": "Nowhere", "content": {"type": "submenu", "target": "missing"}}
        ]}]}"#,
    )
    .unwrap();

    let err = import_catalog(&state, catalog).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidPayload(_)));
}

#[tokio::test]
async fn test_import_rejects_duplicate_menu_keys() {
    let state = common::create_test_state();
    let catalog: CatalogImport = serde_json::from_str(
        r#"{"menus": [
            {"key": "a", "name": "First"},
            {"key": "a", "name": "Second"}
        ]}"#,
    )
    .unwrap();

    let err = import_catalog(&state, catalog).await.unwrap_err();
    assert_eq!(err.code(), "invalid_input");
}

#[tokio::test]
async fn test_import_rejects_duplicate_question_keys() {
    let state = common::create_test_state();
    let catalog: CatalogImport = serde_json::from_str(
        r#"{"questions": [
            {"key": "q", "question": "First?", "options": ["a", "b"], "correct_option": 0},
            {"key": "q", "question": "Second?", "options": ["a", "b"], "correct_option": 1}
        ]}"#,
    )
    .unwrap();

    let err = import_catalog(&state, catalog).await.unwrap_err();
    assert_eq!(err.code(), "invalid_input");

    let stored = state
        .quiz_bank
        .find(&content_core::models::QuestionFilter::any())
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].question, "First?");
}
