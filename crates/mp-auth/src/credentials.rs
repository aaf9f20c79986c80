//! Persisted credential bundle
//!
//! The bundle is a JSON document written by the external login step: a list
//! of named token/cookie records under `cookies`, plus whatever else the
//! browser tooling saved next to it. Names are not unique, so lookups walk a
//! priority list of aliases and take the first record that matches.
//!
//! The file is the single source of truth. Every mutation rewrites the whole
//! document via temp-file + rename; unknown keys are carried through untouched.
//! There is no cross-process locking; callers must not run two pipelines
//! against the same file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// One named token or cookie record.
///
/// `expires` is unix seconds as written by the browser tooling. Zero or a
/// negative value (conventionally `-1`) marks a session-scoped record with
/// no usable expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub name: String,
    pub value: String,
    #[serde(default = "session_scoped")]
    pub expires: f64,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "root_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, rename = "httpOnly")]
    pub http_only: bool,
    /// Fields we don't model (`sameSite`, ...), preserved on rewrite
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn session_scoped() -> f64 {
    -1.0
}

fn root_path() -> String {
    "/".into()
}

impl CredentialRecord {
    /// A secure, HTTP-only record scoped to `domain`.
    pub fn new(name: &str, value: String, domain: &str) -> Self {
        Self {
            name: name.to_string(),
            value,
            expires: session_scoped(),
            domain: domain.to_string(),
            path: root_path(),
            secure: true,
            http_only: true,
            extra: Map::new(),
        }
    }

    /// The record's own expiry attribute, `None` when session-scoped.
    pub fn expires_at(&self) -> Option<i64> {
        (self.expires > 0.0).then_some(self.expires as i64)
    }
}

/// The whole persisted document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialBundle {
    #[serde(rename = "cookies", default)]
    pub records: Vec<CredentialRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CredentialBundle {
    /// First record matching the alias list, honoring alias priority.
    pub fn find(&self, aliases: &[&str]) -> Option<&CredentialRecord> {
        aliases
            .iter()
            .find_map(|alias| self.records.iter().find(|r| r.name == *alias))
    }

    pub fn find_mut(&mut self, aliases: &[&str]) -> Option<&mut CredentialRecord> {
        let idx = aliases
            .iter()
            .find_map(|alias| self.records.iter().position(|r| r.name == *alias))?;
        self.records.get_mut(idx)
    }

    /// Replace the value of the record found via `aliases`, or append a new
    /// record named after the first alias. `expires` of `None` leaves an
    /// existing expiry attribute as it was.
    pub fn set_value(
        &mut self,
        aliases: &[&str],
        value: String,
        expires: Option<i64>,
        domain: &str,
    ) {
        match self.find_mut(aliases) {
            Some(record) => {
                record.value = value;
                if let Some(exp) = expires {
                    record.expires = exp as f64;
                }
            }
            None => {
                let Some(name) = aliases.first() else { return };
                let mut record = CredentialRecord::new(name, value, domain);
                if let Some(exp) = expires {
                    record.expires = exp as f64;
                }
                debug!(name, "appending new credential record");
                self.records.push(record);
            }
        }
    }
}

/// File-backed access to the credential bundle.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the whole bundle.
    ///
    /// A missing file means no login has ever been captured, which only a
    /// human can fix, so it surfaces as `AuthExpired`.
    pub async fn load(&self) -> Result<CredentialBundle> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::AuthExpired(format!(
                    "credential file {} not found",
                    self.path.display()
                )));
            }
            Err(e) => return Err(Error::Io(format!("reading credential file: {e}"))),
        };
        let bundle: CredentialBundle = serde_json::from_str(&contents)
            .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
        debug!(path = %self.path.display(), records = bundle.records.len(), "loaded credential bundle");
        Ok(bundle)
    }

    /// Rewrite the whole bundle atomically.
    pub async fn save(&self, bundle: &CredentialBundle) -> Result<()> {
        write_atomic(&self.path, bundle).await?;
        info!(path = %self.path.display(), records = bundle.records.len(), "persisted credential bundle");
        Ok(())
    }
}

/// Write the bundle to a temp file in the same directory, then rename it
/// over the target. Permissions are 0600 on unix since the file holds
/// live tokens.
async fn write_atomic(path: &Path, bundle: &CredentialBundle) -> Result<()> {
    let json = serde_json::to_string_pretty(bundle)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Io("credential path has no file name".into()))?
        .to_string_lossy();
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    Ok(())
}
