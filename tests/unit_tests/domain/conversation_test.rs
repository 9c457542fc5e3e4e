use chrono::Utc;
use soutien::domain::{
    Conversation, ConversationId, ConversationSummary, MAX_TITLE_CHARS, truncate_chars,
};

fn summary(first_message: Option<&str>) -> ConversationSummary {
    ConversationSummary {
        id: ConversationId::from_i64(1),
        title: "t".to_string(),
        thread_id: None,
        first_message: first_message.map(String::from),
        message_count: first_message.map_or(0, |_| 1),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn given_long_first_message_when_deriving_title_then_keeps_first_fifty_chars() {
    let message = format!("  {}  ", "é".repeat(80));
    let title = Conversation::title_from_message(&message, 50);
    assert_eq!(title.chars().count(), 50);
    assert!(title.chars().all(|c| c == 'é'));
}

#[test]
fn given_short_first_message_when_deriving_title_then_returns_trimmed_message() {
    assert_eq!(
        Conversation::title_from_message("  Hello, I need help ", 50),
        "Hello, I need help"
    );
}

#[test]
fn given_oversized_limit_when_deriving_title_then_caps_at_column_width() {
    let title = Conversation::title_from_message(&"a".repeat(400), 1000);
    assert_eq!(title.chars().count(), MAX_TITLE_CHARS);
}

#[test]
fn given_multibyte_text_when_truncating_then_cuts_on_char_boundary() {
    assert_eq!(truncate_chars("ça va très bien", 4), "ça v");
    assert_eq!(truncate_chars("abc", 10), "abc");
    assert_eq!(truncate_chars("abc", 0), "");
}

#[test]
fn given_long_first_message_when_previewing_then_appends_ellipsis() {
    let preview = summary(Some("Je ne sais plus quoi faire")).preview(10);
    assert_eq!(preview.as_deref(), Some("Je ne sais..."));
}

#[test]
fn given_short_first_message_when_previewing_then_returns_it_unchanged() {
    let preview = summary(Some("Bonjour")).preview(50);
    assert_eq!(preview.as_deref(), Some("Bonjour"));
}

#[test]
fn given_no_messages_when_previewing_then_preview_is_absent() {
    assert_eq!(summary(None).preview(50), None);
}
