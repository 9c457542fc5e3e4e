use std::sync::Arc;

use soutien::application::ports::AnalysisRepository;
use soutien::application::services::{
    ClassificationError, ClassificationRequest, ErrorKind, parse_classifier_output,
    strip_code_fences,
};
use soutien::domain::{
    Emotion, EmotionClassification, MessageId, MessageRole, Sentiment, Urgency, ViolenceType,
};
use soutien::infrastructure::persistence::InMemoryStore;

use crate::helpers::{CannedLlm, FailingLlm, USER_A, classification_service, seed_conversation};

const CALM_RESPONSE: &str =
    r#"{"sentiment":"positif","emotion":"soulagement","urgence":1,"type_violence":"aucun"}"#;

#[tokio::test]
async fn given_user_message_when_classifier_answers_in_taxonomy_then_stores_it_unchanged() {
    let store = Arc::new(InMemoryStore::new());
    let llm = Arc::new(CannedLlm::new(CALM_RESPONSE));
    let service = classification_service(&store, llm.clone());
    let (conversation_id, messages) = seed_conversation(
        &store,
        USER_A,
        "Tout va bien",
        &[(MessageRole::User, "Tout va bien, merci")],
    )
    .await;

    let outcome = service
        .classify(ClassificationRequest {
            message_id: messages[0].id,
            conversation_id,
            message_content: messages[0].content.clone(),
        })
        .await
        .expect("classification succeeds");

    let expected = EmotionClassification {
        sentiment: Sentiment::Positive,
        emotion: Emotion::Relief,
        urgency: Urgency::new(1).expect("valid urgency"),
        violence_type: ViolenceType::Absent,
    };
    assert_eq!(outcome.classification, expected);
    assert_eq!(llm.calls(), 1);

    let stored = store
        .find_by_message(messages[0].id)
        .await
        .expect("query")
        .expect("analysis stored");
    assert_eq!(stored.id, outcome.analysis_id);
    assert_eq!(stored.classification, expected);
    assert_eq!(stored.conversation_id, conversation_id);
    assert_eq!(stored.raw_response, CALM_RESPONSE);
}

#[tokio::test]
async fn given_out_of_taxonomy_answer_when_classifying_then_stores_field_defaults() {
    let store = Arc::new(InMemoryStore::new());
    let service = classification_service(
        &store,
        Arc::new(CannedLlm::new(
            r#"{"sentiment":"heureux","emotion":"joie","urgence":9,"type_violence":"harcelement"}"#,
        )),
    );
    let (conversation_id, messages) = seed_conversation(
        &store,
        USER_A,
        "t",
        &[(MessageRole::User, "Je suis content")],
    )
    .await;

    let outcome = service
        .classify(ClassificationRequest {
            message_id: messages[0].id,
            conversation_id,
            message_content: "Je suis content".to_string(),
        })
        .await
        .expect("classification never fails on bad values");

    assert_eq!(outcome.classification, EmotionClassification::default());
    assert_eq!(outcome.classification.sentiment, Sentiment::Neutral);
    assert_eq!(outcome.classification.urgency.level(), 3);
    assert_eq!(outcome.classification.violence_type, ViolenceType::Absent);
}

#[tokio::test]
async fn given_analysed_message_when_classifying_again_then_conflict_and_single_row() {
    let store = Arc::new(InMemoryStore::new());
    let llm = Arc::new(CannedLlm::new(CALM_RESPONSE));
    let service = classification_service(&store, llm.clone());
    let (conversation_id, messages) =
        seed_conversation(&store, USER_A, "t", &[(MessageRole::User, "Bonjour")]).await;
    let request = ClassificationRequest {
        message_id: messages[0].id,
        conversation_id,
        message_content: "Bonjour".to_string(),
    };

    service.classify(request.clone()).await.expect("first run");
    let err = service.classify(request).await.expect_err("duplicate");

    assert!(matches!(err, ClassificationError::AlreadyAnalyzed(id) if id == messages[0].id));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(llm.calls(), 1);
    let analyses = store
        .list_for_conversation(conversation_id)
        .await
        .expect("analyses");
    assert_eq!(analyses.len(), 1);
}

#[tokio::test]
async fn given_assistant_message_when_classifying_then_rejects_before_calling_classifier() {
    let store = Arc::new(InMemoryStore::new());
    let llm = Arc::new(CannedLlm::new(CALM_RESPONSE));
    let service = classification_service(&store, llm.clone());
    let (conversation_id, messages) = seed_conversation(
        &store,
        USER_A,
        "t",
        &[
            (MessageRole::User, "Bonjour"),
            (MessageRole::Assistant, "Bonjour, comment allez-vous ?"),
        ],
    )
    .await;

    let err = service
        .classify(ClassificationRequest {
            message_id: messages[1].id,
            conversation_id,
            message_content: messages[1].content.clone(),
        })
        .await
        .expect_err("assistant messages are never analysed");

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn given_unknown_or_mismatched_message_when_classifying_then_rejects_without_llm_call() {
    let store = Arc::new(InMemoryStore::new());
    let llm = Arc::new(CannedLlm::new(CALM_RESPONSE));
    let service = classification_service(&store, llm.clone());
    let (first, messages) =
        seed_conversation(&store, USER_A, "a", &[(MessageRole::User, "Bonjour")]).await;
    let (second, _) = seed_conversation(&store, USER_A, "b", &[]).await;

    let unknown = service
        .classify(ClassificationRequest {
            message_id: MessageId::from_i64(4242),
            conversation_id: first,
            message_content: "Bonjour".to_string(),
        })
        .await
        .expect_err("unknown message");
    assert_eq!(unknown.kind(), ErrorKind::NotFound);

    let mismatched = service
        .classify(ClassificationRequest {
            message_id: messages[0].id,
            conversation_id: second,
            message_content: "Bonjour".to_string(),
        })
        .await
        .expect_err("message belongs elsewhere");
    assert_eq!(mismatched.kind(), ErrorKind::Validation);

    let blank = service
        .classify(ClassificationRequest {
            message_id: messages[0].id,
            conversation_id: first,
            message_content: "  ".to_string(),
        })
        .await
        .expect_err("blank content");
    assert_eq!(blank.kind(), ErrorKind::Validation);

    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn given_unusable_classifier_output_when_classifying_then_upstream_errors_and_nothing_stored()
{
    let store = Arc::new(InMemoryStore::new());
    let (conversation_id, messages) =
        seed_conversation(&store, USER_A, "t", &[(MessageRole::User, "Bonjour")]).await;
    let request = ClassificationRequest {
        message_id: messages[0].id,
        conversation_id,
        message_content: "Bonjour".to_string(),
    };

    let prose = classification_service(&store, Arc::new(CannedLlm::new("Je ne peux pas aider.")));
    let err = prose.classify(request.clone()).await.expect_err("prose");
    assert_eq!(err.kind(), ErrorKind::UpstreamFormat);
    assert!(!err.is_retryable());

    let array = classification_service(&store, Arc::new(CannedLlm::new("[1, 2]")));
    let err = array.classify(request.clone()).await.expect_err("array");
    assert_eq!(err.kind(), ErrorKind::UpstreamFormat);

    let failing = classification_service(&store, Arc::new(FailingLlm));
    let err = failing.classify(request).await.expect_err("unavailable");
    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert!(err.is_retryable());

    assert!(
        store
            .find_by_message(messages[0].id)
            .await
            .expect("query")
            .is_none()
    );
}

#[tokio::test]
async fn given_fenced_classifier_output_when_classifying_then_parses_inner_json() {
    let store = Arc::new(InMemoryStore::new());
    let fenced = "```json\n{\"sentiment\":\"negatif\",\"emotion\":\"peur\",\"urgence\":5,\"type_violence\":\"violence_physique\"}\n```";
    let service = classification_service(&store, Arc::new(CannedLlm::new(fenced)));
    let (conversation_id, messages) =
        seed_conversation(&store, USER_A, "t", &[(MessageRole::User, "J'ai peur")]).await;

    let outcome = service
        .classify(ClassificationRequest {
            message_id: messages[0].id,
            conversation_id,
            message_content: "J'ai peur".to_string(),
        })
        .await
        .expect("fenced output accepted");

    assert_eq!(outcome.classification.sentiment, Sentiment::Negative);
    assert_eq!(outcome.classification.emotion, Emotion::Fear);
    assert_eq!(outcome.classification.urgency.level(), 5);
    assert_eq!(
        outcome.classification.violence_type,
        ViolenceType::PhysicalViolence
    );
}

#[test]
fn given_fence_variants_when_stripping_then_returns_payload() {
    assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    assert_eq!(strip_code_fences("```{\"a\":1}```"), "{\"a\":1}");
    assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
}

#[test]
fn given_non_object_json_when_parsing_output_then_rejects() {
    assert!(parse_classifier_output("\"negatif\"").is_err());
    assert!(parse_classifier_output("42").is_err());
    assert!(parse_classifier_output("{\"sentiment\":\"neutre\"}").is_ok());
}
