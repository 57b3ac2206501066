use meetsfu_services::dao::{QuestionDao, UpvoteDao};
use meetsfu_services::dao::upvote::ToggleResult;

use crate::fixtures::TestApp;

#[tokio::test]
async fn upvote_toggles_between_added_and_removed() {
    let app = TestApp::spawn().await;
    let meeting = app.seed_meeting("Standup", false).await;
    let carol = app.seed_user("carol@test.local", "Carol").await;

    let questions = QuestionDao::new(&app.db);
    let upvotes = UpvoteDao::new(&app.db);

    let question = questions
        .create(meeting.id, carol.id, "When's the next release?".to_string())
        .await
        .expect("question should be created");
    assert_eq!(question.upvote_count, 0);

    let first = upvotes
        .toggle(&questions, question.id.unwrap(), carol.id)
        .await
        .expect("first toggle should succeed");
    assert_eq!(first, ToggleResult::Added);
    let after_first = questions.base.find_by_id(question.id.unwrap()).await.unwrap();
    assert_eq!(after_first.upvote_count, 1);

    let second = upvotes
        .toggle(&questions, question.id.unwrap(), carol.id)
        .await
        .expect("second toggle should succeed");
    assert_eq!(second, ToggleResult::Removed);
    let after_second = questions.base.find_by_id(question.id.unwrap()).await.unwrap();
    assert_eq!(after_second.upvote_count, 0);
}

#[tokio::test]
async fn concurrent_double_toggle_from_same_user_leaves_at_most_one_row() {
    let app = TestApp::spawn().await;
    let meeting = app.seed_meeting("Standup", false).await;
    let carol = app.seed_user("carol@test.local", "Carol").await;

    let questions = QuestionDao::new(&app.db);
    let upvotes = UpvoteDao::new(&app.db);
    let question = questions
        .create(meeting.id, carol.id, "Any blockers?".to_string())
        .await
        .unwrap();
    let question_id = question.id.unwrap();

    let (a, b) = tokio::join!(
        upvotes.toggle(&questions, question_id, carol.id),
        upvotes.toggle(&questions, question_id, carol.id),
    );
    assert!(a.is_ok());
    assert!(b.is_ok());

    let rows = upvotes
        .base
        .find_many(
            bson::doc! { "question_id": question_id, "user_id": carol.id },
            None,
        )
        .await
        .unwrap();
    assert!(rows.len() <= 1, "expected at most one upvote row, found {}", rows.len());
}

#[tokio::test]
async fn toggle_answered_and_pinned_are_independent_flags() {
    let app = TestApp::spawn().await;
    let meeting = app.seed_meeting("Standup", false).await;
    let carol = app.seed_user("carol@test.local", "Carol").await;

    let questions = QuestionDao::new(&app.db);
    let question = questions
        .create(meeting.id, carol.id, "What about staging?".to_string())
        .await
        .unwrap();
    let id = question.id.unwrap();

    let answered = questions.toggle_answered(id).await.unwrap();
    assert!(answered.answered);
    assert!(!answered.pinned);

    let pinned = questions.toggle_pinned(id).await.unwrap();
    assert!(pinned.answered);
    assert!(pinned.pinned);

    let unanswered = questions.toggle_answered(id).await.unwrap();
    assert!(!unanswered.answered);
    assert!(unanswered.pinned);
}
