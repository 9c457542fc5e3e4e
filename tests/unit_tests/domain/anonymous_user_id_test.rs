use soutien::domain::AnonymousUserId;

use crate::helpers::USER_A;

#[test]
fn given_hyphenated_v4_uuid_when_parsing_then_accepts_and_displays_same_value() {
    let user_id = AnonymousUserId::parse(USER_A).expect("valid v4 id");
    assert_eq!(user_id.to_string(), USER_A);
}

#[test]
fn given_uuid_of_other_version_when_parsing_then_rejects() {
    let v1 = "6fa459ea-ee8a-11ea-adc1-0242ac120002";
    assert!(AnonymousUserId::parse(v1).is_err());
}

#[test]
fn given_wrong_variant_when_parsing_then_rejects() {
    let bad_variant = "3f2b6c1e-8d4a-4f7b-1c2e-1a5d6e7f8091";
    assert!(AnonymousUserId::parse(bad_variant).is_err());
}

#[test]
fn given_non_hyphenated_or_garbage_input_when_parsing_then_rejects() {
    assert!(AnonymousUserId::parse("3f2b6c1e8d4a4f7b9c2e1a5d6e7f8091").is_err());
    assert!(AnonymousUserId::parse("").is_err());
    assert!(AnonymousUserId::parse("not-a-user-id").is_err());
    let err = AnonymousUserId::parse("abc").unwrap_err();
    assert!(err.starts_with("Invalid user id"));
}
