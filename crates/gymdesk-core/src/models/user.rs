use serde::{Deserialize, Serialize};

/// Signed-in staff member, cached with the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_staff: bool,
}

impl UserProfile {
    pub fn display_name(&self) -> String {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) if !first.is_empty() => format!("{} {}", first, last),
            (Some(first), _) if !first.is_empty() => first.to_string(),
            _ => self.username.clone(),
        }
    }
}
