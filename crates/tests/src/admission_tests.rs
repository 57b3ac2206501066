use meetsfu_db::models::meeting::Meeting;
use meetsfu_db::models::participant::{ParticipantRole, ParticipantStatus};
use meetsfu_services::dao::base::BaseDao;
use meetsfu_services::dao::{MeetingDao, ParticipantDao};
use meetsfu_services::AdmissionService;

use crate::fixtures::TestApp;

fn admission_service(app: &TestApp) -> AdmissionService {
    AdmissionService::new(
        BaseDao::new(&app.db, Meeting::COLLECTION),
        BaseDao::new(&app.db, meetsfu_db::models::participant::Participant::COLLECTION),
    )
}

#[tokio::test]
async fn host_transfer_swaps_roles_and_meeting_host() {
    let app = TestApp::spawn().await;
    let meeting = app.seed_meeting("Standup", false).await;
    let bob = app.seed_user("bob@test.local", "Bob").await;
    let bob_participant = app
        .seed_participant(meeting.id, &bob, ParticipantRole::Participant, ParticipantStatus::InMeeting)
        .await;

    let meetings = MeetingDao::new(&app.db);
    let participants = ParticipantDao::new(&app.db);
    let admission = admission_service(&app);

    let meeting_row = meetings.find_by_code(&meeting.code).await.unwrap();
    let host_row = participants
        .find_by_meeting_and_user(meeting.id, meeting.host.id)
        .await
        .unwrap()
        .unwrap();

    admission
        .transfer_host(&meeting_row, &host_row, &bob_participant)
        .await
        .expect("host transfer should succeed");

    let alice_after = participants
        .find_by_meeting_and_user(meeting.id, meeting.host.id)
        .await
        .unwrap()
        .unwrap();
    let bob_after = participants
        .find_by_meeting_and_user(meeting.id, bob.id)
        .await
        .unwrap()
        .unwrap();
    let meeting_after = meetings.find_by_code(&meeting.code).await.unwrap();

    assert_eq!(alice_after.role, ParticipantRole::Participant);
    assert_eq!(bob_after.role, ParticipantRole::Host);
    assert_eq!(meeting_after.host_user_id, bob.id);
}

#[tokio::test]
async fn non_host_cannot_transfer_host() {
    let app = TestApp::spawn().await;
    let meeting = app.seed_meeting("Standup", false).await;
    let bob = app.seed_user("bob@test.local", "Bob").await;
    let carol = app.seed_user("carol@test.local", "Carol").await;
    let bob_participant = app
        .seed_participant(meeting.id, &bob, ParticipantRole::Participant, ParticipantStatus::InMeeting)
        .await;
    let carol_participant = app
        .seed_participant(meeting.id, &carol, ParticipantRole::Participant, ParticipantStatus::InMeeting)
        .await;

    let meetings = MeetingDao::new(&app.db);
    let admission = admission_service(&app);
    let meeting_row = meetings.find_by_code(&meeting.code).await.unwrap();

    let err = admission
        .transfer_host(&meeting_row, &bob_participant, &carol_participant)
        .await
        .unwrap_err();

    assert!(matches!(err, meetsfu_services::AdmissionError::Forbidden(_)));
}

#[tokio::test]
async fn host_cannot_be_kicked_or_moved_to_lobby() {
    let app = TestApp::spawn().await;
    let meeting = app.seed_meeting("Standup", false).await;
    let participants = ParticipantDao::new(&app.db);
    let admission = admission_service(&app);

    let host_row = participants
        .find_by_meeting_and_user(meeting.id, meeting.host.id)
        .await
        .unwrap()
        .unwrap();

    let kick_err = admission.kick(&host_row, &host_row).await.unwrap_err();
    assert!(matches!(kick_err, meetsfu_services::AdmissionError::CannotTargetHost));

    let move_err = admission.move_to_lobby(&host_row, &host_row).await.unwrap_err();
    assert!(matches!(move_err, meetsfu_services::AdmissionError::CannotTargetHost));
}

#[tokio::test]
async fn lobby_admit_then_reject_on_distinct_participants() {
    let app = TestApp::spawn().await;
    let meeting = app.seed_meeting("Standup", true).await;
    let bob = app.seed_user("bob@test.local", "Bob").await;
    let carol = app.seed_user("carol@test.local", "Carol").await;
    let bob_participant = app
        .seed_participant(meeting.id, &bob, ParticipantRole::Participant, ParticipantStatus::InLobby)
        .await;
    let carol_participant = app
        .seed_participant(meeting.id, &carol, ParticipantRole::Participant, ParticipantStatus::InLobby)
        .await;

    let participants = ParticipantDao::new(&app.db);
    let admission = admission_service(&app);
    let host_row = participants
        .find_by_meeting_and_user(meeting.id, meeting.host.id)
        .await
        .unwrap()
        .unwrap();

    let admitted = admission
        .admit(meeting.id, &host_row, bob_participant.id.unwrap())
        .await
        .expect("admit should succeed");
    assert_eq!(admitted.status, ParticipantStatus::InMeeting);

    admission
        .reject(meeting.id, &host_row, carol_participant.id.unwrap())
        .await
        .expect("reject should succeed");
    let carol_after = participants
        .find_by_meeting_and_user(meeting.id, carol.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(carol_after.status, ParticipantStatus::Removed);
}

#[tokio::test]
async fn admit_rejects_a_target_not_in_lobby() {
    let app = TestApp::spawn().await;
    let meeting = app.seed_meeting("Standup", true).await;
    let bob = app.seed_user("bob@test.local", "Bob").await;
    let bob_participant = app
        .seed_participant(meeting.id, &bob, ParticipantRole::Participant, ParticipantStatus::InMeeting)
        .await;

    let participants = ParticipantDao::new(&app.db);
    let admission = admission_service(&app);
    let host_row = participants
        .find_by_meeting_and_user(meeting.id, meeting.host.id)
        .await
        .unwrap()
        .unwrap();

    let err = admission
        .admit(meeting.id, &host_row, bob_participant.id.unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        meetsfu_services::AdmissionError::ParticipantNotFound
    ));
}

#[tokio::test]
async fn end_meeting_requires_host_role() {
    let app = TestApp::spawn().await;
    let meeting = app.seed_meeting("Standup", false).await;
    let bob = app.seed_user("bob@test.local", "Bob").await;
    let bob_participant = app
        .seed_participant(meeting.id, &bob, ParticipantRole::Participant, ParticipantStatus::InMeeting)
        .await;

    let admission = admission_service(&app);
    let err = admission
        .end_meeting(&bob_participant, meeting.id)
        .await
        .unwrap_err();
    assert!(matches!(err, meetsfu_services::AdmissionError::Forbidden(_)));

    let participants = ParticipantDao::new(&app.db);
    let host_row = participants
        .find_by_meeting_and_user(meeting.id, meeting.host.id)
        .await
        .unwrap()
        .unwrap();
    admission
        .end_meeting(&host_row, meeting.id)
        .await
        .expect("host should be able to end the meeting");

    let meetings = MeetingDao::new(&app.db);
    let ended = meetings.find_by_code(&meeting.code).await.unwrap();
    assert_eq!(ended.status, meetsfu_db::models::meeting::MeetingStatus::Ended);
}
