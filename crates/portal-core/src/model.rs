use serde::{Deserialize, Serialize};

/// Usage statistics for a single shortened URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(rename = "shorturl")]
    pub short_url: String,
    #[serde(rename = "longurl")]
    pub long_url: String,
    /// Creation time formatted as `dd.mm.yyyy hh:mm:ss`.
    #[serde(rename = "createdAt")]
    pub created_at: String,
    pub usage: u64,
}

/// One shortened URL owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUrl {
    pub short_url: String,
    pub original_url: String,
}

/// Parses a caller-supplied user identifier.
///
/// A valid identifier is a base-10 unsigned integer. Everything else —
/// including the empty string that denotes an anonymous caller — yields
/// `None`.
pub fn parse_user_id(user_id: &str) -> Option<u64> {
    user_id.parse().ok()
}

/// Prepends `http://` when the URL carries no scheme.
///
/// `https://` URLs pass through untouched since they already start with
/// `http`.
pub fn normalize_url(long_url: &str) -> String {
    if long_url.starts_with("http") {
        long_url.to_owned()
    } else {
        format!("http://{long_url}")
    }
}
