use chrono::{Duration, Utc};
use soutien::application::ports::{ConversationRepository, RepositoryError};
use soutien::domain::{ConversationId, MessageRole, PageRequest, ThreadBinding, ThreadId};

use crate::helpers::{TestPostgres, USER_A, USER_B, user};

#[tokio::test]
#[ignore = "requires docker"]
async fn given_postgres_when_creating_conversation_then_it_reads_back_unbound() {
    let pg = TestPostgres::new().await;
    let repo = &pg.conversation_repository;

    let created = repo
        .create_conversation(&user(USER_A), "Premier échange")
        .await
        .expect("create");
    let loaded = repo
        .get_conversation(created.id)
        .await
        .expect("query")
        .expect("conversation exists");

    assert_eq!(loaded.title, "Premier échange");
    assert_eq!(loaded.anonymous_user_id, user(USER_A));
    assert!(loaded.thread_id.is_none());
    assert!(
        repo.get_conversation(ConversationId::from_i64(424242))
            .await
            .expect("query")
            .is_none()
    );
}

#[tokio::test]
#[ignore = "requires docker"]
async fn given_unbound_conversation_when_binding_threads_then_first_binding_wins() {
    let pg = TestPostgres::new().await;
    let repo = &pg.conversation_repository;
    let conversation = repo
        .create_conversation(&user(USER_A), "t")
        .await
        .expect("create");
    let thread = ThreadId::new("thread_abc");

    assert_eq!(
        repo.bind_thread(conversation.id, &thread).await.expect("bind"),
        ThreadBinding::Bound
    );
    assert_eq!(
        repo.bind_thread(conversation.id, &thread).await.expect("rebind"),
        ThreadBinding::AlreadyBound
    );
    let conflict = repo
        .bind_thread(conversation.id, &ThreadId::new("thread_other"))
        .await;
    assert!(matches!(conflict, Err(RepositoryError::ConstraintViolation(_))));

    let missing = repo
        .bind_thread(ConversationId::from_i64(999), &thread)
        .await;
    assert!(missing.is_err_and(|e| e.is_not_found()));

    let stored = repo
        .get_conversation(conversation.id)
        .await
        .expect("query")
        .expect("conversation");
    assert_eq!(stored.thread_id, Some(thread));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn given_messages_when_reading_history_then_chronological_and_activity_updated() {
    let pg = TestPostgres::new().await;
    let repo = &pg.conversation_repository;
    let conversation = repo
        .create_conversation(&user(USER_A), "t")
        .await
        .expect("create");

    let first = repo
        .append_message(conversation.id, MessageRole::User, "Bonjour")
        .await
        .expect("append");
    let second = repo
        .append_message(conversation.id, MessageRole::Assistant, "Bonjour, je vous écoute")
        .await
        .expect("append");

    let messages = repo.get_messages(conversation.id).await.expect("messages");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].id, first.id);
    assert_eq!(messages[1].id, second.id);
    assert_eq!(messages[1].role, MessageRole::Assistant);

    let loaded = repo
        .get_message(first.id)
        .await
        .expect("query")
        .expect("message");
    assert_eq!(loaded.content, "Bonjour");

    let refreshed = repo
        .get_conversation(conversation.id)
        .await
        .expect("query")
        .expect("conversation");
    assert!(refreshed.updated_at >= conversation.updated_at);

    let orphan = repo
        .append_message(ConversationId::from_i64(999), MessageRole::User, "x")
        .await;
    assert!(orphan.is_err_and(|e| e.is_not_found()));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn given_conversations_when_listing_by_user_then_paginates_with_first_message() {
    let pg = TestPostgres::new().await;
    let repo = &pg.conversation_repository;
    let older = repo
        .create_conversation(&user(USER_A), "ancienne")
        .await
        .expect("create");
    repo.append_message(older.id, MessageRole::User, "Premier message")
        .await
        .expect("append");
    repo.append_message(older.id, MessageRole::Assistant, "Réponse")
        .await
        .expect("append");
    let newer = repo
        .create_conversation(&user(USER_A), "récente")
        .await
        .expect("create");
    repo.create_conversation(&user(USER_B), "autre")
        .await
        .expect("create");

    assert_eq!(repo.count_by_user(&user(USER_A)).await.expect("count"), 2);

    let rows = repo
        .list_by_user(&user(USER_A), PageRequest { page: 1, per_page: 10 })
        .await
        .expect("list");
    let ids: Vec<ConversationId> = rows.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![newer.id, older.id]);
    assert_eq!(rows[1].message_count, 2);
    assert_eq!(rows[1].first_message.as_deref(), Some("Premier message"));
    assert_eq!(rows[0].first_message, None);

    let second_page = repo
        .list_by_user(&user(USER_A), PageRequest { page: 2, per_page: 1 })
        .await
        .expect("list");
    assert_eq!(second_page.len(), 1);
    assert_eq!(second_page[0].id, older.id);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn given_conversation_when_renaming_and_deleting_then_changes_persist() {
    let pg = TestPostgres::new().await;
    let repo = &pg.conversation_repository;
    let conversation = repo
        .create_conversation(&user(USER_A), "avant")
        .await
        .expect("create");
    let message = repo
        .append_message(conversation.id, MessageRole::User, "Bonjour")
        .await
        .expect("append");

    repo.rename_conversation(conversation.id, "après")
        .await
        .expect("rename");
    let renamed = repo
        .get_conversation(conversation.id)
        .await
        .expect("query")
        .expect("conversation");
    assert_eq!(renamed.title, "après");

    repo.delete_conversation(conversation.id)
        .await
        .expect("delete");
    assert!(
        repo.get_conversation(conversation.id)
            .await
            .expect("query")
            .is_none()
    );
    assert!(repo.get_message(message.id).await.expect("query").is_none());

    let again = repo.delete_conversation(conversation.id).await;
    assert!(again.is_err_and(|e| e.is_not_found()));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn given_activity_when_aggregating_then_counts_users_conversations_and_messages() {
    let pg = TestPostgres::new().await;
    let repo = &pg.conversation_repository;
    for owner in [USER_A, USER_A, USER_B] {
        let conversation = repo
            .create_conversation(&user(owner), "t")
            .await
            .expect("create");
        repo.append_message(conversation.id, MessageRole::User, "question")
            .await
            .expect("append");
        repo.append_message(conversation.id, MessageRole::Assistant, "réponse")
            .await
            .expect("append");
    }

    let totals = repo.activity_totals(None).await.expect("totals");
    assert_eq!(totals.users, 2);
    assert_eq!(totals.conversations, 3);
    assert_eq!(totals.messages, 6);
    assert_eq!(totals.user_messages, 3);

    let future = repo
        .activity_totals(Some(Utc::now() + Duration::days(1)))
        .await
        .expect("totals");
    assert_eq!(future.conversations, 0);

    let daily = repo
        .daily_activity(Utc::now() - Duration::days(30))
        .await
        .expect("daily");
    let conversations: i64 = daily.iter().map(|d| d.conversations).sum();
    let user_messages: i64 = daily.iter().map(|d| d.user_messages).sum();
    assert_eq!(conversations, 3);
    assert_eq!(user_messages, 3);
}
