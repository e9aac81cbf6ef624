//! Mirror run configuration.
//!
//! A configuration can be loaded from a TOML file and then overridden field by
//! field by the caller (the CLI applies flags and environment on top).

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{MirrorError, Result};
use crate::remote::validate_remote_url;

/// Prefix of GitHub's pull request references.
pub const PULL_REQUEST_REFS: &str = "refs/pull";

pub const DEFAULT_SSH_USERNAME: &str = "git";

/// What to do with destination references missing from the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrunePolicy {
    /// Prune, but a prune failure only warns once the mirror push succeeded
    #[default]
    BestEffort,
    /// Prune, and fail the run if pruning fails
    Strict,
    /// Never prune
    Off,
}

/// SSH trust and key material.
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SshConfig {
    /// known_hosts file content; materialized to a temporary file when set
    pub known_hosts: String,
    /// known_hosts file used when no content is given
    pub known_hosts_path: Option<PathBuf>,
    /// Private key; empty means anonymous transport
    pub private_key: Zeroizing<String>,
    pub passphrase: Option<Zeroizing<String>>,
    pub username: Option<String>,
}

impl SshConfig {
    pub fn has_private_key(&self) -> bool {
        !self.private_key.trim().is_empty()
    }

    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(DEFAULT_SSH_USERNAME)
    }

    /// Configured known_hosts path, falling back to `~/.ssh/known_hosts`.
    pub fn known_hosts_path(&self) -> Option<PathBuf> {
        self.known_hosts_path
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".ssh").join("known_hosts")))
    }
}

impl fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshConfig")
            .field("known_hosts", &format_args!("<{} bytes>", self.known_hosts.len()))
            .field("known_hosts_path", &self.known_hosts_path)
            .field("private_key", &redacted(self.has_private_key()))
            .field("passphrase", &redacted(self.passphrase.is_some()))
            .field("username", &self.username)
            .finish()
    }
}

fn redacted(present: bool) -> &'static str {
    if present { "<redacted>" } else { "<none>" }
}

/// Everything one mirror run needs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MirrorConfig {
    pub src_repo: String,
    pub dst_repo: String,
    pub ssh: SshConfig,
    /// References whose name starts with any of these never reach the destination
    pub exclude_prefixes: Vec<String>,
    pub prune: PrunePolicy,
    /// Parent directory for the staging repository and temporary known_hosts
    pub temp_dir: Option<PathBuf>,
    pub debug: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            src_repo: String::new(),
            dst_repo: String::new(),
            ssh: SshConfig::default(),
            exclude_prefixes: vec![PULL_REQUEST_REFS.to_string()],
            prune: PrunePolicy::default(),
            temp_dir: None,
            debug: false,
        }
    }
}

impl MirrorConfig {
    pub fn new(src_repo: impl Into<String>, dst_repo: impl Into<String>) -> Self {
        Self {
            src_repo: src_repo.into(),
            dst_repo: dst_repo.into(),
            ..Self::default()
        }
    }

    pub fn with_exclude_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.exclude_prefixes = prefixes;
        self
    }

    pub fn with_prune(mut self, prune: PrunePolicy) -> Self {
        self.prune = prune;
        self
    }

    pub fn with_ssh(mut self, ssh: SshConfig) -> Self {
        self.ssh = ssh;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Load a configuration file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: MirrorConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.src_repo.trim().is_empty() {
            return Err(MirrorError::config("source repository is required"));
        }
        if self.dst_repo.trim().is_empty() {
            return Err(MirrorError::config("destination repository is required"));
        }
        validate_remote_url(&self.src_repo)
            .map_err(|e| MirrorError::config(format!("source repository: {e}")))?;
        validate_remote_url(&self.dst_repo)
            .map_err(|e| MirrorError::config(format!("destination repository: {e}")))?;
        if self.src_repo == self.dst_repo {
            return Err(MirrorError::config(
                "source and destination repositories are the same",
            ));
        }
        if self.exclude_prefixes.iter().any(|p| p.is_empty()) {
            return Err(MirrorError::config(
                "empty exclude prefix would exclude every reference",
            ));
        }
        Ok(())
    }
}
