use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::UserProfile;

/// Session file name in the cache directory
pub const SESSION_FILE: &str = "session.json";

/// Sign-in state as seen by whoever renders the front desk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Anonymous,
    Authenticated,
    /// Refresh failed and credentials were destroyed; the user must sign in again.
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub username: String,
    #[serde(default)]
    pub user: Option<UserProfile>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl SessionData {
    pub fn new(
        username: &str,
        access_token: String,
        refresh_token: Option<String>,
        user: Option<UserProfile>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            username: username.to_string(),
            user,
            created_at: Utc::now(),
            refreshed_at: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Session {
    path: Option<PathBuf>,
    pub data: Option<SessionData>,
}

impl Session {
    /// Session persisted as `session.json` inside `cache_dir`.
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            path: Some(cache_dir.join(SESSION_FILE)),
            data: None,
        }
    }

    /// Session that lives only in memory.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load session from disk
    pub fn load(&mut self) -> Result<bool> {
        let Some(path) = self.path.as_ref() else {
            return Ok(self.data.is_some());
        };
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .context("Failed to read session file")?;
            let data: SessionData = serde_json::from_str(&contents)
                .context("Failed to parse session file")?;
            self.data = Some(data);
            return Ok(true);
        }
        Ok(false)
    }

    /// Save session to disk
    pub fn save(&self) -> Result<()> {
        if let (Some(path), Some(data)) = (self.path.as_ref(), self.data.as_ref()) {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(data)?;
            std::fs::write(path, contents).context("Failed to write session file")?;
        }
        Ok(())
    }

    /// Destroy both tokens and the cached profile
    pub fn clear(&mut self) -> Result<()> {
        self.data = None;
        if let Some(path) = self.path.as_ref() {
            if path.exists() {
                std::fs::remove_file(path).context("Failed to remove session file")?;
            }
        }
        Ok(())
    }

    pub fn update(&mut self, data: SessionData) {
        self.data = Some(data);
    }

    /// Swap in a refreshed access token, rotating the refresh token when the
    /// backend issued a new one. Returns false when there is no session.
    pub fn replace_access(&mut self, access_token: String, refresh_token: Option<String>) -> bool {
        match self.data.as_mut() {
            Some(data) => {
                data.access_token = access_token;
                if refresh_token.is_some() {
                    data.refresh_token = refresh_token;
                }
                data.refreshed_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.access_token.as_str())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.refresh_token.as_deref())
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.data.as_ref().and_then(|d| d.user.as_ref())
    }

    pub fn is_authenticated(&self) -> bool {
        self.data.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SessionData {
        SessionData::new("desk", "access-1".to_string(), Some("refresh-1".to_string()), None)
    }

    #[test]
    fn test_save_load_clear() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut session = Session::new(dir.path().to_path_buf());
        session.update(sample());
        session.save().expect("save");

        let mut restored = Session::new(dir.path().to_path_buf());
        assert!(restored.load().expect("load"));
        assert_eq!(restored.access_token(), Some("access-1"));
        assert_eq!(restored.refresh_token(), Some("refresh-1"));

        restored.clear().expect("clear");
        assert!(!restored.is_authenticated());
        assert!(!dir.path().join(SESSION_FILE).exists());

        let mut empty = Session::new(dir.path().to_path_buf());
        assert!(!empty.load().expect("load missing"));
    }

    #[test]
    fn test_replace_access_keeps_refresh_unless_rotated() {
        let mut session = Session::in_memory();
        assert!(!session.replace_access("nope".to_string(), None));

        session.update(sample());
        assert!(session.replace_access("access-2".to_string(), None));
        assert_eq!(session.access_token(), Some("access-2"));
        assert_eq!(session.refresh_token(), Some("refresh-1"));

        session.replace_access("access-3".to_string(), Some("refresh-2".to_string()));
        assert_eq!(session.refresh_token(), Some("refresh-2"));
        assert!(session.data.as_ref().and_then(|d| d.refreshed_at).is_some());
    }

    #[test]
    fn test_in_memory_save_is_noop() {
        let mut session = Session::in_memory();
        session.update(sample());
        session.save().expect("save");
        assert!(session.load().expect("load"));
    }
}
