use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use uuid::{Uuid, Variant};

const HYPHENATED_LEN: usize = 36;

/// Client-generated identifier of an anonymous chat user.
///
/// Only the hyphenated RFC 4122 version 4 form is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AnonymousUserId(Uuid);

impl AnonymousUserId {
    pub fn parse(input: &str) -> Result<Self, String> {
        input.parse()
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl FromStr for AnonymousUserId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("Invalid user id: {}", s);

        if s.len() != HYPHENATED_LEN {
            return Err(invalid());
        }

        let uuid = Uuid::parse_str(s).map_err(|_| invalid())?;
        if uuid.get_version_num() != 4 || uuid.get_variant() != Variant::RFC4122 {
            return Err(invalid());
        }

        Ok(Self(uuid))
    }
}

impl fmt::Display for AnonymousUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}
