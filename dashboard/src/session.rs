//! Persisted user session.
//!
//! The store is a small JSON map of string keys to string values; the
//! session is kept as JSON text under [`SESSION_KEY`].

use crate::error::Result;
use irrigation_shared::api::UserSession;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

pub const SESSION_KEY: &str = "userM";

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when nobody is logged in or the stored value is unreadable.
    pub fn load(&self) -> Result<Option<UserSession>> {
        let map = self.load_map()?;
        let Some(raw) = map.get(SESSION_KEY) else {
            return Ok(None);
        };
        match serde_json::from_str(raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                log::warn!("discarding unreadable session in {:?}: {e}", self.path);
                Ok(None)
            }
        }
    }

    pub fn save(&self, session: &UserSession) -> Result<()> {
        let mut map = self.load_map()?;
        map.insert(SESSION_KEY.to_string(), serde_json::to_string(session)?);
        self.save_map(&map)
    }

    /// Logout.
    pub fn clear(&self) -> Result<()> {
        let mut map = self.load_map()?;
        if map.remove(SESSION_KEY).is_some() {
            self.save_map(&map)?;
        }
        Ok(())
    }

    fn load_map(&self) -> Result<HashMap<String, String>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice::<HashMap<String, String>>(&bytes).unwrap_or_default())
    }

    fn save_map(&self, map: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec_pretty(map)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> UserSession {
        UserSession {
            user_id: "u1".into(),
            fname: "Ana".into(),
            lname: "Moshi".into(),
            hub: "Main Hub".into(),
            location_user: "Arusha".into(),
            email: "ana@farm.io".into(),
            role: "admin".into(),
            machine_id: "m-1".into(),
            permissions: vec!["read".into()],
        }
    }

    #[test]
    fn save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested/storage.json"));

        assert_eq!(store.load().unwrap(), None);
        store.save(&session()).unwrap();
        assert_eq!(store.load().unwrap(), Some(session()));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn other_keys_survive_logout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, r#"{ "theme": "dark" }"#).unwrap();

        let store = SessionStore::new(&path);
        store.save(&session()).unwrap();
        store.clear().unwrap();

        let raw: HashMap<String, String> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw.get("theme").map(String::as_str), Some("dark"));
        assert!(!raw.contains_key(SESSION_KEY));
    }

    #[test]
    fn garbage_session_reads_as_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, r#"{ "userM": "{oops" }"#).unwrap();
        assert_eq!(SessionStore::new(&path).load().unwrap(), None);
    }
}
