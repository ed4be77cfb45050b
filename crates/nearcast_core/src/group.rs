use serde::{Deserialize, Serialize};

/// A named group a client belongs to. Server-assigned at session creation
/// and immutable for the session; the group's uuid doubles as its pub/sub
/// channel name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    #[serde(rename = "groupid")]
    pub uuid: String,
    pub name: String,
}

impl Group {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>) -> Self {
        Group {
            uuid: uuid.into(),
            name: name.into(),
        }
    }
}
