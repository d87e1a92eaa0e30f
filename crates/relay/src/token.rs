//! Shared secret for local clients, persisted in a per-user file.

use std::env;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub const TOKEN_FILE_NAME: &str = ".dandy-notifier-token";
const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("HOME is not set; cannot locate the token file")]
    NoHome,

    #[error("failed to read token file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write token file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact match against `"Bearer <token>"`.
    pub fn matches_bearer(&self, header: &str) -> bool {
        header
            .strip_prefix(BEARER_PREFIX)
            .map(|presented| presented == self.0)
            .unwrap_or(false)
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$HOME/.dandy-notifier-token`
    pub fn default_path() -> Result<PathBuf, TokenError> {
        env::var_os("HOME")
            .filter(|home| !home.is_empty())
            .map(|home| PathBuf::from(home).join(TOKEN_FILE_NAME))
            .ok_or(TokenError::NoHome)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored token, whitespace-trimmed. `None` when the file is
    /// missing or blank.
    pub fn load(&self) -> Result<Option<AuthToken>, TokenError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let trimmed = contents.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(AuthToken::new(trimmed)))
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(TokenError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    pub fn load_or_create(&self) -> Result<AuthToken, TokenError> {
        if let Some(token) = self.load()? {
            return Ok(token);
        }

        let token = AuthToken::generate();
        self.persist(&token).map_err(|source| TokenError::Write {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), "created new auth token");
        Ok(token)
    }

    /// Write via a sibling temp file and rename, owner read/write only.
    fn persist(&self, token: &AuthToken) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut temp_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| TOKEN_FILE_NAME.into());
        temp_name.push(".tmp");
        let temp_path = self.path.with_file_name(temp_name);

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&temp_path)?;
        file.write_all(token.as_str().as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn bearer_match_is_exact() {
        let token = AuthToken::new("s3cret");
        assert!(token.matches_bearer("Bearer s3cret"));
        assert!(!token.matches_bearer("bearer s3cret"));
        assert!(!token.matches_bearer("Bearer s3cret "));
        assert!(!token.matches_bearer("Bearer  s3cret"));
        assert!(!token.matches_bearer("s3cret"));
        assert!(!token.matches_bearer("Bearer other"));
    }

    #[test]
    fn debug_output_hides_secret() {
        let rendered = format!("{:?}", AuthToken::new("s3cret"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn first_start_creates_token_and_restart_reuses_it() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(TOKEN_FILE_NAME);
        let store = TokenStore::at(&path);

        let created = store.load_or_create().expect("create");
        assert!(!created.as_str().is_empty());
        assert!(path.exists());

        let reloaded = TokenStore::at(&path).load_or_create().expect("reuse");
        assert_eq!(reloaded, created);
    }

    #[test]
    fn existing_token_is_trimmed_and_reused_verbatim() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("token");
        fs::write(&path, "  hand-written-token\n").expect("write");

        let token = TokenStore::at(&path).load_or_create().expect("load");
        assert_eq!(token.as_str(), "hand-written-token");
        assert_eq!(fs::read_to_string(&path).expect("read"), "  hand-written-token\n");
    }

    #[test]
    fn blank_file_is_replaced() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("token");
        fs::write(&path, "\n  \n").expect("write");

        let token = TokenStore::at(&path).load_or_create().expect("create");
        assert!(!token.as_str().is_empty());
        assert_eq!(fs::read_to_string(&path).expect("read"), token.as_str());
    }

    #[test]
    fn missing_parent_directories_are_created() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("dir").join("token");
        TokenStore::at(&path).load_or_create().expect("create");
        assert!(path.is_file());
    }

    #[cfg(unix)]
    #[test]
    fn created_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("token");
        TokenStore::at(&path).load_or_create().expect("create");

        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn load_reports_missing_file_as_none() {
        let dir = tempdir().expect("tempdir");
        let store = TokenStore::at(dir.path().join("absent"));
        assert!(store.load().expect("load").is_none());
    }
}
