use crate::ids::ClientId;
use crate::location::Location;
use serde::{Deserialize, Serialize};

/// The payload fanned out to subscribers on every broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserData {
    #[serde(rename = "clientid")]
    pub client_id: String,
    pub location: Location,
}

/// A client's choice of which plane feeds its data socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFilter {
    #[serde(rename = "filtertype")]
    pub kind: String,
    #[serde(rename = "filtervalue", default)]
    pub value: String,
}

impl UserFilter {
    /// The default filter: the local cell neighborhood.
    pub fn local() -> Self {
        UserFilter {
            kind: "local".to_string(),
            value: String::new(),
        }
    }

    /// A group filter for the given group uuid.
    pub fn group(group_id: impl Into<String>) -> Self {
        UserFilter {
            kind: "group".to_string(),
            value: group_id.into(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.kind == "local"
    }

    pub fn is_group(&self) -> bool {
        self.kind == "group"
    }
}

impl Default for UserFilter {
    fn default() -> Self {
        UserFilter::local()
    }
}

/// The archived track of one session, as served by the download endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "id")]
    pub client_id: ClientId,
    pub locations: Vec<Location>,
}

impl Activity {
    pub fn new(client_id: ClientId) -> Self {
        Activity {
            client_id,
            locations: Vec::new(),
        }
    }
}

/// Download response body: one activity per requested session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResponse {
    pub activities: Vec<Activity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_json_tags() {
        let filter: UserFilter =
            serde_json::from_str(r#"{"filtertype":"group","filtervalue":"gorilla-racing"}"#)
                .unwrap();
        assert!(filter.is_group());
        assert_eq!(filter.value, "gorilla-racing");

        // filtervalue may be omitted for local
        let local: UserFilter = serde_json::from_str(r#"{"filtertype":"local"}"#).unwrap();
        assert!(local.is_local());
        assert_eq!(local, UserFilter::local());
    }

    #[test]
    fn user_data_json_tags() {
        let data = UserData {
            client_id: "00000000-0000-0000-0000-0000000000a1".to_string(),
            location: Location::new(-34.9287, 138.5999, 86.45, 0.0, 0),
        };
        let json = serde_json::to_value(&data).unwrap();
        assert!(json.get("clientid").is_some());
        assert!(json["location"].get("lat").is_some());
    }
}
