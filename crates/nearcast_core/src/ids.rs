use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Durable client identity, stable across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(Uuid);

/// One-session, time-bounded opaque session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(Uuid);

macro_rules! uuid_id {
    ($name:ident, $what:expr) => {
        impl $name {
            /// Mint a fresh random identifier.
            pub fn random() -> Self {
                $name(Uuid::new_v4())
            }

            /// Parse the canonical hyphenated form.
            pub fn parse(s: &str) -> Result<Self, CoreError> {
                Uuid::parse_str(s)
                    .map($name)
                    .map_err(|_| CoreError::malformed(format!("{} id", $what)))
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                $name(uuid)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(ClientId, "client");
uuid_id!(TokenId, "token");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        let id = ClientId::random();
        assert_eq!(ClientId::parse(&id.to_string()).unwrap(), id);
        assert!(ClientId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn serde_is_transparent() {
        let token = TokenId::random();
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, format!("\"{}\"", token));
    }
}
