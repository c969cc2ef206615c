//! Named credentials read from the environment.

use std::collections::HashMap;

use dirsync_core::error::{SyncError, SyncResult};
use dirsync_core::{Credential, CredentialStore};

const DEFAULT_PREFIX: &str = "DIRSYNC_CRED";

/// Resolves `service_login` names from `<PREFIX>_<NAME>_USERNAME` and
/// `<PREFIX>_<NAME>_PASSWORD` variables.
///
/// The name is upper-cased and every character that is not ASCII
/// alphanumeric becomes `_`, so `svc-sync` reads `DIRSYNC_CRED_SVC_SYNC_*`.
pub struct EnvCredentialStore {
    prefix: String,
    vars: HashMap<String, String>,
}

impl EnvCredentialStore {
    /// Snapshot the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            vars: vars.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn variable(&self, name: &str, suffix: &str) -> String {
        let name: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}_{}_{}", self.prefix, name, suffix)
    }
}

impl CredentialStore for EnvCredentialStore {
    fn read(&self, name: &str) -> SyncResult<Credential> {
        let username = self.vars.get(&self.variable(name, "USERNAME"));
        let password = self.vars.get(&self.variable(name, "PASSWORD"));
        match (username, password) {
            (Some(username), Some(password)) => Ok(Credential {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => Err(SyncError::CredentialNotFound {
                name: name.to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for EnvCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvCredentialStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
