use mongodb::{Database, IndexModel, options::IndexOptions};
use tracing::info;

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    // Users
    create_indexes(
        db,
        "users",
        vec![index_unique(bson::doc! { "email": 1 })],
    )
    .await?;

    // Meetings
    create_indexes(
        db,
        "meetings",
        vec![
            index_unique(bson::doc! { "code": 1 }),
            index(bson::doc! { "host_user_id": 1 }),
            index(bson::doc! { "status": 1, "scheduled_at": 1, "created_at": 1 }),
        ],
    )
    .await?;

    // Meeting Participants
    create_indexes(
        db,
        "meeting_participants",
        vec![
            index_unique(bson::doc! { "meeting_id": 1, "user_id": 1 }),
            index(bson::doc! { "meeting_id": 1, "status": 1 }),
        ],
    )
    .await?;

    // Breakout Rooms
    create_indexes(
        db,
        "breakout_rooms",
        vec![index(bson::doc! { "meeting_id": 1, "is_active": 1 })],
    )
    .await?;

    // Questions
    create_indexes(
        db,
        "questions",
        vec![index(bson::doc! { "meeting_id": 1, "created_at": 1 })],
    )
    .await?;

    // Question Upvotes
    create_indexes(
        db,
        "question_upvotes",
        vec![index_unique(bson::doc! { "question_id": 1, "user_id": 1 })],
    )
    .await?;

    // Chat Messages
    create_indexes(
        db,
        "chat_messages",
        vec![index(bson::doc! { "meeting_id": 1, "created_at": 1 })],
    )
    .await?;

    // Reminders
    create_indexes(
        db,
        "reminders",
        vec![index(bson::doc! { "sent": 1, "trigger_at": 1 })],
    )
    .await?;

    // Invitations
    create_indexes(
        db,
        "invitations",
        vec![index(bson::doc! { "meeting_id": 1 })],
    )
    .await?;

    info!("All indexes ensured");
    Ok(())
}

fn index(keys: bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn index_unique(keys: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

async fn create_indexes(
    db: &Database,
    collection: &str,
    indexes: Vec<IndexModel>,
) -> Result<(), mongodb::error::Error> {
    db.collection::<bson::Document>(collection)
        .create_indexes(indexes)
        .await?;
    info!(collection, "Indexes created");
    Ok(())
}
