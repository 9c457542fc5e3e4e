use std::sync::Arc;

use soutien::application::ports::ConversationRepository;
use soutien::application::services::{
    ChatTurnError, ChatTurnService, ErrorKind, TurnRequest, classification_channel,
};
use soutien::domain::{ConversationId, MessageRole, RunStatus, ThreadId};
use soutien::infrastructure::persistence::InMemoryStore;

use crate::helpers::{
    ChatFixture, ScriptedAssistant, ThreadRaceAssistant, USER_A, USER_B, fast_chat_config,
    seed_conversation,
};

fn turn(user_id: &str, conversation_id: Option<ConversationId>, message: &str) -> TurnRequest {
    TurnRequest {
        user_id: user_id.to_string(),
        conversation_id,
        message: message.to_string(),
    }
}

#[tokio::test]
async fn given_new_user_when_submitting_first_turn_then_persists_user_and_assistant_messages() {
    let mut fixture = ChatFixture::new(
        ScriptedAssistant::completing("Je suis là pour vous écouter."),
        fast_chat_config(5),
    );

    let outcome = fixture
        .service
        .submit_turn(turn(USER_A, None, "  Bonjour, j'ai besoin d'aide  "))
        .await
        .expect("turn succeeds");

    assert_eq!(outcome.response, "Je suis là pour vous écouter.");
    assert_eq!(outcome.thread_id.as_str(), "thread_1");
    assert_ne!(outcome.user_message_id, outcome.assistant_message_id);

    let conversation = fixture
        .store
        .get_conversation(outcome.conversation_id)
        .await
        .expect("query")
        .expect("conversation created");
    assert_eq!(conversation.title, "Bonjour, j'ai besoin d'aide");
    assert_eq!(conversation.thread_id, Some(outcome.thread_id.clone()));

    let messages = fixture
        .store
        .get_messages(outcome.conversation_id)
        .await
        .expect("messages");
    let roles: Vec<MessageRole> = messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![MessageRole::User, MessageRole::Assistant]);
    assert_eq!(messages[0].content, "Bonjour, j'ai besoin d'aide");
    assert_eq!(messages[0].id, outcome.user_message_id);
    assert_eq!(messages[1].id, outcome.assistant_message_id);

    let queued = fixture.queued_classifications();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].message_id, outcome.user_message_id);
    assert_eq!(queued[0].conversation_id, outcome.conversation_id);
}

#[tokio::test]
async fn given_bound_conversation_when_submitting_second_turn_then_reuses_thread() {
    let fixture = ChatFixture::new(ScriptedAssistant::completing("ok"), fast_chat_config(5));

    let first = fixture
        .service
        .submit_turn(turn(USER_A, None, "Premier message"))
        .await
        .expect("first turn");
    let second = fixture
        .service
        .submit_turn(turn(USER_A, Some(first.conversation_id), "Deuxième message"))
        .await
        .expect("second turn");

    assert_eq!(second.conversation_id, first.conversation_id);
    assert_eq!(second.thread_id, first.thread_id);
    assert_eq!(fixture.assistant.threads_created(), 1);
    assert_eq!(fixture.assistant.runs_created(), 2);

    let messages = fixture
        .store
        .get_messages(first.conversation_id)
        .await
        .expect("messages");
    assert_eq!(messages.len(), 4);
}

#[tokio::test]
async fn given_conversation_of_other_user_when_submitting_turn_then_forbidden_without_writes() {
    let fixture = ChatFixture::new(ScriptedAssistant::completing("ok"), fast_chat_config(5));
    let owned = fixture
        .service
        .submit_turn(turn(USER_A, None, "Message privé"))
        .await
        .expect("owner turn");

    let result = fixture
        .service
        .submit_turn(turn(USER_B, Some(owned.conversation_id), "Intrusion"))
        .await;

    let err = result.expect_err("other user must be rejected");
    assert!(matches!(err, ChatTurnError::Forbidden(id) if id == owned.conversation_id));
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let messages = fixture
        .store
        .get_messages(owned.conversation_id)
        .await
        .expect("messages");
    assert_eq!(messages.len(), 2);
    assert!(
        fixture
            .assistant
            .appended()
            .iter()
            .all(|(_, content)| content != "Intrusion")
    );
}

#[tokio::test]
async fn given_unknown_conversation_when_submitting_turn_then_not_found() {
    let fixture = ChatFixture::new(ScriptedAssistant::completing("ok"), fast_chat_config(5));

    let err = fixture
        .service
        .submit_turn(turn(USER_A, Some(ConversationId::from_i64(999)), "Bonjour"))
        .await
        .expect_err("unknown conversation");

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(fixture.assistant.threads_created(), 0);
}

#[tokio::test]
async fn given_run_never_completing_when_polling_exhausted_then_times_out_keeping_user_message() {
    let mut fixture = ChatFixture::new(ScriptedAssistant::never_completing(), fast_chat_config(3));

    let err = fixture
        .service
        .submit_turn(turn(USER_A, None, "Vous êtes là ?"))
        .await
        .expect_err("run must time out");

    let (conversation_id, attempts) = match err {
        ChatTurnError::Timeout {
            conversation_id,
            attempts,
        } => (conversation_id, attempts),
        other => panic!("expected timeout, got {:?}", other),
    };
    assert_eq!(attempts, 3);
    assert_eq!(fixture.assistant.status_polls(), 3);

    let messages = fixture
        .store
        .get_messages(conversation_id)
        .await
        .expect("messages");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, MessageRole::User);

    let conversation = fixture
        .store
        .get_conversation(conversation_id)
        .await
        .expect("query")
        .expect("conversation kept");
    assert!(conversation.thread_id.is_some());

    let queued = fixture.queued_classifications();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].message_id, messages[0].id);
}

#[tokio::test]
async fn given_run_ending_failed_when_polling_then_run_failed_without_messages() {
    let mut fixture = ChatFixture::new(
        ScriptedAssistant::ending_with(RunStatus::Failed),
        fast_chat_config(5),
    );

    let err = fixture
        .service
        .submit_turn(turn(USER_A, None, "Bonjour"))
        .await
        .expect_err("failed run");

    assert!(matches!(err, ChatTurnError::RunFailed(RunStatus::Failed)));
    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert!(err.is_retryable());
    assert_eq!(fixture.assistant.status_polls(), 2);
    assert!(fixture.queued_classifications().is_empty());

    let conversation_id = ConversationId::from_i64(1);
    let messages = fixture
        .store
        .get_messages(conversation_id)
        .await
        .expect("messages");
    assert!(messages.is_empty());
}

#[tokio::test]
async fn given_unreachable_assistant_when_submitting_turn_then_upstream_error_without_messages() {
    let mut fixture = ChatFixture::new(ScriptedAssistant::unreachable(), fast_chat_config(5));

    let err = fixture
        .service
        .submit_turn(turn(USER_A, None, "Bonjour"))
        .await
        .expect_err("assistant unreachable");

    assert!(matches!(err, ChatTurnError::Upstream(_)));
    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert!(fixture.assistant.appended().is_empty());
    assert!(fixture.queued_classifications().is_empty());

    let messages = fixture
        .store
        .get_messages(ConversationId::from_i64(1))
        .await
        .expect("messages");
    assert!(messages.is_empty());
}

#[tokio::test]
async fn given_invalid_input_when_submitting_turn_then_validation_error_before_any_call() {
    let fixture = ChatFixture::new(ScriptedAssistant::completing("ok"), fast_chat_config(5));
    let too_long = "a".repeat(2001);

    for (user_id, message) in [
        (USER_A, "   "),
        (USER_A, too_long.as_str()),
        ("not-a-uuid", "Bonjour"),
        ("", "Bonjour"),
    ] {
        let err = fixture
            .service
            .submit_turn(turn(user_id, None, message))
            .await
            .expect_err("invalid input");
        assert_eq!(err.kind(), ErrorKind::Validation, "input {:?}", (user_id, message));
        assert!(!err.is_retryable());
    }

    assert_eq!(fixture.assistant.threads_created(), 0);
    assert_eq!(fixture.assistant.runs_created(), 0);
}

#[tokio::test]
async fn given_message_at_length_limit_when_submitting_turn_then_accepts_it() {
    let fixture = ChatFixture::new(ScriptedAssistant::completing("ok"), fast_chat_config(5));
    let message = "é".repeat(2000);

    let outcome = fixture
        .service
        .submit_turn(turn(USER_A, None, &message))
        .await
        .expect("message at the limit is accepted");

    let conversation = fixture
        .store
        .get_conversation(outcome.conversation_id)
        .await
        .expect("query")
        .expect("conversation");
    assert_eq!(conversation.title.chars().count(), 50);
}

#[tokio::test]
async fn given_concurrent_thread_bind_when_submitting_turn_then_uses_winning_thread() {
    let store = Arc::new(InMemoryStore::new());
    let (conversation_id, _) = seed_conversation(&store, USER_A, "Course", &[]).await;
    let winner = ThreadId::new("thread_winner");
    let assistant = Arc::new(ThreadRaceAssistant::new(
        ScriptedAssistant::completing("Je vous écoute."),
        store.clone(),
        conversation_id,
        winner.clone(),
    ));
    let (dispatcher, _classification_queue) = classification_channel(16);
    let service = ChatTurnService::new(
        store.clone(),
        assistant.clone(),
        dispatcher,
        fast_chat_config(5),
    );

    let outcome = service
        .submit_turn(turn(USER_A, Some(conversation_id), "Vous êtes là ?"))
        .await
        .expect("turn succeeds on the winning thread");

    assert_eq!(outcome.thread_id, winner);
    assert_eq!(outcome.response, "Je vous écoute.");
    assert_eq!(assistant.inner.threads_created(), 1);
    assert_eq!(
        assistant.inner.appended(),
        vec![(winner.clone(), "Vous êtes là ?".to_string())]
    );

    let conversation = store
        .get_conversation(conversation_id)
        .await
        .expect("query")
        .expect("conversation");
    assert_eq!(conversation.thread_id, Some(winner));

    let roles: Vec<MessageRole> = store
        .get_messages(conversation_id)
        .await
        .expect("messages")
        .iter()
        .map(|m| m.role)
        .collect();
    assert_eq!(roles, vec![MessageRole::User, MessageRole::Assistant]);
}
