//! Remote registration and URL checks shared by the source and destination.

use git2::{ErrorCode, Remote, Repository};
use serde::Serialize;
use url::Url;

use crate::error::{MirrorError, Phase, Result};

pub const SRC_REMOTE: &str = "src";
pub const DST_REMOTE: &str = "dst";

const DEFAULT_SSH_PORT: u16 = 22;

/// Result of a fetch or push that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "refs")]
pub enum Transfer {
    /// This many references changed
    Updated(usize),
    /// Nothing needed to change
    UpToDate,
}

impl Transfer {
    pub(crate) fn from_count(count: usize) -> Self {
        if count == 0 {
            Transfer::UpToDate
        } else {
            Transfer::Updated(count)
        }
    }

    pub fn is_up_to_date(&self) -> bool {
        matches!(self, Transfer::UpToDate)
    }
}

/// SSH port for `remote`, defaulting to 22 for non-SSH URLs where it is unused.
pub(crate) fn remote_port(remote: &Remote<'_>) -> u16 {
    remote
        .url()
        .and_then(ssh_port)
        .unwrap_or(DEFAULT_SSH_PORT)
}

/// Register `name` pointing at `url` in `repo`.
///
/// With `fetch_refspec` the remote's configured fetch refspec is replaced, so
/// fetches need no explicit refspecs.
pub(crate) fn create_remote<'r>(
    repo: &'r Repository,
    name: &str,
    url: &str,
    fetch_refspec: Option<&str>,
    phase: Phase,
) -> Result<Remote<'r>> {
    validate_remote_url(url).map_err(|message| MirrorError::remote_config(phase, name, message))?;

    let created = match fetch_refspec {
        Some(refspec) => repo.remote_with_fetch(name, url, refspec),
        None => repo.remote(name, url),
    };
    created.map_err(|e| {
        let message = match e.code() {
            ErrorCode::Exists => format!("remote '{name}' already exists"),
            _ => e.message().to_string(),
        };
        MirrorError::remote_config(phase, name, message)
    })
}

/// Structural check of a remote URL.
///
/// Accepts `scheme://` URLs, scp-like `user@host:path` and local paths.
pub fn validate_remote_url(url: &str) -> std::result::Result<(), String> {
    if url.trim().is_empty() {
        return Err("remote URL is empty".to_string());
    }
    if url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(format!("remote URL contains whitespace: {url:?}"));
    }
    if url.contains("://") {
        let parsed = Url::parse(url).map_err(|e| format!("invalid remote URL '{url}': {e}"))?;
        if parsed.scheme() != "file" && parsed.host_str().is_none_or(str::is_empty) {
            return Err(format!("remote URL has no host: {url}"));
        }
    }
    Ok(())
}

/// SSH port a URL connects to, or `None` when the URL is not an SSH URL.
pub fn ssh_port(url: &str) -> Option<u16> {
    if url.contains("://") {
        let parsed = Url::parse(url).ok()?;
        return match parsed.scheme() {
            "ssh" | "git+ssh" | "ssh+git" => Some(parsed.port().unwrap_or(DEFAULT_SSH_PORT)),
            _ => None,
        };
    }
    is_scp_like(url).then_some(DEFAULT_SSH_PORT)
}

// `[user@]host:path` where the part before ':' has no '/'.
fn is_scp_like(url: &str) -> bool {
    match url.split_once(':') {
        Some((host, _)) => !host.is_empty() && !host.contains('/') && host.len() > 1,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_remote_forms() {
        for url in [
            "https://github.com/org/repo.git",
            "ssh://git@example.com:2222/org/repo.git",
            "git@github.com:org/repo.git",
            "/srv/git/repo.git",
            "file:///srv/git/repo.git",
        ] {
            assert!(validate_remote_url(url).is_ok(), "{url}");
        }
    }

    #[test]
    fn rejects_malformed_urls() {
        assert!(validate_remote_url("").is_err());
        assert!(validate_remote_url("   ").is_err());
        assert!(validate_remote_url("https://exa mple.com/repo").is_err());
        assert!(validate_remote_url("https://").is_err());
        assert!(validate_remote_url("git@host:repo\n").is_err());
    }

    #[test]
    fn ssh_port_detection() {
        assert_eq!(ssh_port("ssh://git@example.com:2222/org/repo"), Some(2222));
        assert_eq!(ssh_port("ssh://git@example.com/org/repo"), Some(22));
        assert_eq!(ssh_port("git@github.com:org/repo.git"), Some(22));
        assert_eq!(ssh_port("https://github.com/org/repo.git"), None);
        assert_eq!(ssh_port("/srv/git/repo.git"), None);
        // Windows drive letters are not scp-like hosts.
        assert_eq!(ssh_port("C:/repos/repo.git"), None);
    }

    #[test]
    fn duplicate_remote_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let repo = Repository::init_bare(dir.path()).unwrap();
        create_remote(&repo, SRC_REMOTE, "/tmp/a", None, Phase::Staging).unwrap();
        let Err(err) = create_remote(&repo, SRC_REMOTE, "/tmp/b", None, Phase::Staging) else {
            panic!("second remote with the same name was accepted");
        };
        assert!(matches!(err, MirrorError::RemoteConfig { .. }));
        assert!(err.to_string().contains("already exists"));
    }
}
