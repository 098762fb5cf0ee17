use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,
    /// Tenant key the connection joins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Display name inside the room; falls back to `sub`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Destination URL of the issuing shop, e.g. `https://shop1.example.com`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    /// Additional custom claims
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Claims {
    /// Room key: the `room` claim, or the host part of `dest`
    pub fn room(&self) -> Option<&str> {
        self.room
            .as_deref()
            .or_else(|| self.dest.as_deref().and_then(dest_host))
            .filter(|room| !room.is_empty())
    }

    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.sub)
    }

    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.exp < now
    }
}

fn dest_host(dest: &str) -> Option<&str> {
    let rest = dest.split_once("://").map_or(dest, |(_, rest)| rest);
    let host = rest.split(['/', '?', '#']).next()?;
    // Drop any port
    let host = host.rsplit_once(':').map_or(host, |(host, _)| host);
    (!host.is_empty()).then_some(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(room: Option<&str>, dest: Option<&str>) -> Claims {
        Claims {
            sub: "user-1".to_string(),
            exp: chrono::Utc::now().timestamp() + 60,
            iat: 0,
            room: room.map(String::from),
            username: None,
            dest: dest.map(String::from),
            extra: HashMap::new(),
        }
    }

    #[test]
    fn test_room_claim_wins_over_dest() {
        let c = claims(Some("shop1"), Some("https://other.example.com"));
        assert_eq!(c.room(), Some("shop1"));
    }

    #[test]
    fn test_room_from_dest_host() {
        let c = claims(None, Some("https://shop1.example.com/admin?x=1"));
        assert_eq!(c.room(), Some("shop1.example.com"));

        let c = claims(None, Some("shop2.example.com:443"));
        assert_eq!(c.room(), Some("shop2.example.com"));

        let c = claims(None, None);
        assert_eq!(c.room(), None);
    }

    #[test]
    fn test_username_falls_back_to_sub() {
        let mut c = claims(Some("shop1"), None);
        assert_eq!(c.username(), "user-1");
        c.username = Some("alice".to_string());
        assert_eq!(c.username(), "alice");
        assert!(!c.is_expired());
    }
}
