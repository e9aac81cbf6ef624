//! OpenSSH `known_hosts` parsing and host key verification.
//!
//! Supports plain and hashed host names, `[host]:port` entries and
//! `@revoked` keys. Wildcard patterns are compared literally.

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

const DEFAULT_SSH_PORT: u16 = 22;
const HASHED_PREFIX: &str = "|1|";

/// Outcome of checking a presented host key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyStatus {
    /// A matching host line carries this exact key
    Trusted,
    /// The host is known but with a different key
    Mismatch,
    /// The key is explicitly revoked
    Revoked,
    /// No line matches the host
    Unknown,
}

#[derive(Debug, thiserror::Error)]
pub enum KnownHostsError {
    #[error("failed to read known_hosts file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed known_hosts line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    None,
    Revoked,
    CertAuthority,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HostPattern {
    Plain(String),
    Hashed { salt: Vec<u8>, hash: Vec<u8> },
}

#[derive(Debug, Clone)]
struct Entry {
    marker: Marker,
    patterns: Vec<HostPattern>,
    key_type: String,
    key: Vec<u8>,
}

/// Parsed set of trusted host keys.
#[derive(Debug, Clone, Default)]
pub struct KnownHosts {
    entries: Vec<Entry>,
}

impl KnownHosts {
    pub fn from_file(path: &Path) -> Result<Self, KnownHostsError> {
        let content = std::fs::read_to_string(path).map_err(|source| KnownHostsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, KnownHostsError> {
        let mut entries = Vec::new();
        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            entries.push(parse_line(line).map_err(|reason| KnownHostsError::Malformed {
                line: idx + 1,
                reason,
            })?);
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check `key` presented by `host` on `port`.
    pub fn verify(&self, host: &str, port: u16, key_type: &str, key: &[u8]) -> HostKeyStatus {
        if self
            .entries
            .iter()
            .any(|e| e.marker == Marker::Revoked && e.key == key)
        {
            return HostKeyStatus::Revoked;
        }

        let candidate = host_candidate(host, port);
        let mut known = false;
        for entry in self
            .entries
            .iter()
            .filter(|e| e.marker == Marker::None && e.matches(&candidate))
        {
            if entry.key_type == key_type && entry.key == key {
                return HostKeyStatus::Trusted;
            }
            known = true;
        }

        if known {
            HostKeyStatus::Mismatch
        } else {
            HostKeyStatus::Unknown
        }
    }
}

impl Entry {
    fn matches(&self, candidate: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(candidate))
    }
}

impl HostPattern {
    fn matches(&self, candidate: &str) -> bool {
        match self {
            HostPattern::Plain(pattern) => pattern == candidate,
            HostPattern::Hashed { salt, hash } => {
                let Ok(mut mac) = HmacSha1::new_from_slice(salt) else {
                    return false;
                };
                mac.update(candidate.as_bytes());
                mac.verify_slice(hash).is_ok()
            }
        }
    }
}

/// Host as it appears in known_hosts: bare for port 22, `[host]:port` otherwise.
fn host_candidate(host: &str, port: u16) -> String {
    let host = host.to_ascii_lowercase();
    if port == DEFAULT_SSH_PORT {
        host
    } else {
        format!("[{host}]:{port}")
    }
}

fn parse_line(line: &str) -> Result<Entry, String> {
    let mut fields = line.split_whitespace();
    let mut first = fields.next().ok_or("empty line")?;

    let marker = match first {
        "@revoked" => Marker::Revoked,
        "@cert-authority" => Marker::CertAuthority,
        m if m.starts_with('@') => return Err(format!("unknown marker '{m}'")),
        _ => Marker::None,
    };
    if marker != Marker::None {
        first = fields.next().ok_or("missing host patterns")?;
    }

    let patterns = first
        .split(',')
        .filter(|p| !p.is_empty())
        .map(parse_pattern)
        .collect::<Result<Vec<_>, _>>()?;
    if patterns.is_empty() {
        return Err("missing host patterns".to_string());
    }

    let key_type = fields.next().ok_or("missing key type")?.to_string();
    let encoded = fields.next().ok_or("missing key")?;
    let key = STANDARD
        .decode(encoded)
        .map_err(|e| format!("invalid base64 key: {e}"))?;

    Ok(Entry {
        marker,
        patterns,
        key_type,
        key,
    })
}

fn parse_pattern(raw: &str) -> Result<HostPattern, String> {
    if let Some(hashed) = raw.strip_prefix(HASHED_PREFIX) {
        let (salt, hash) = hashed
            .split_once('|')
            .ok_or_else(|| format!("invalid hashed host '{raw}'"))?;
        let salt = STANDARD
            .decode(salt)
            .map_err(|e| format!("invalid hashed host salt: {e}"))?;
        let hash = STANDARD
            .decode(hash)
            .map_err(|e| format!("invalid hashed host digest: {e}"))?;
        return Ok(HostPattern::Hashed { salt, hash });
    }

    Ok(HostPattern::Plain(raw.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ED25519: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl";
    const OTHER: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB";

    fn key(encoded: &str) -> Vec<u8> {
        STANDARD.decode(encoded).unwrap()
    }

    #[test]
    fn trusts_plain_host_entry() {
        let hosts = KnownHosts::parse(&format!(
            "# comment\n\ngithub.com,140.82.121.4 ssh-ed25519 {ED25519}\n"
        ))
        .unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(
            hosts.verify("github.com", 22, "ssh-ed25519", &key(ED25519)),
            HostKeyStatus::Trusted
        );
        assert_eq!(
            hosts.verify("140.82.121.4", 22, "ssh-ed25519", &key(ED25519)),
            HostKeyStatus::Trusted
        );
    }

    #[test]
    fn reports_mismatch_and_unknown() {
        let hosts = KnownHosts::parse(&format!("github.com ssh-ed25519 {ED25519}")).unwrap();
        assert_eq!(
            hosts.verify("github.com", 22, "ssh-ed25519", &key(OTHER)),
            HostKeyStatus::Mismatch
        );
        assert_eq!(
            hosts.verify("gitlab.com", 22, "ssh-ed25519", &key(ED25519)),
            HostKeyStatus::Unknown
        );
    }

    #[test]
    fn non_default_port_requires_bracketed_entry() {
        let hosts =
            KnownHosts::parse(&format!("[git.example.com]:2222 ssh-ed25519 {ED25519}")).unwrap();
        assert_eq!(
            hosts.verify("git.example.com", 2222, "ssh-ed25519", &key(ED25519)),
            HostKeyStatus::Trusted
        );
        assert_eq!(
            hosts.verify("git.example.com", 22, "ssh-ed25519", &key(ED25519)),
            HostKeyStatus::Unknown
        );
    }

    #[test]
    fn hashed_hosts() {
        let content = format!(
            "|1|MDEyMzQ1Njc4OWFiY2RlZmdoaWo=|4XKDM3Rddj4Zr5SeQ6VLeII6A5s= ssh-ed25519 {ED25519}\n\
             |1|MDEyMzQ1Njc4OWFiY2RlZmdoaWo=|OvJkATCEkejRPWj17xTkdbH4d44= ssh-ed25519 {OTHER}\n"
        );
        let hosts = KnownHosts::parse(&content).unwrap();
        assert_eq!(
            hosts.verify("git.example.com", 22, "ssh-ed25519", &key(ED25519)),
            HostKeyStatus::Trusted
        );
        assert_eq!(
            hosts.verify("git.example.com", 2222, "ssh-ed25519", &key(OTHER)),
            HostKeyStatus::Trusted
        );
        assert_eq!(
            hosts.verify("other.example.com", 22, "ssh-ed25519", &key(ED25519)),
            HostKeyStatus::Unknown
        );
    }

    #[test]
    fn revoked_key_wins() {
        let content = format!(
            "github.com ssh-ed25519 {ED25519}\n@revoked github.com ssh-ed25519 {ED25519}\n"
        );
        let hosts = KnownHosts::parse(&content).unwrap();
        assert_eq!(
            hosts.verify("github.com", 22, "ssh-ed25519", &key(ED25519)),
            HostKeyStatus::Revoked
        );
    }

    #[test]
    fn cert_authority_lines_do_not_trust_keys() {
        let hosts =
            KnownHosts::parse(&format!("@cert-authority git.example.com ssh-ed25519 {ED25519}"))
                .unwrap();
        assert_eq!(
            hosts.verify("git.example.com", 22, "ssh-ed25519", &key(ED25519)),
            HostKeyStatus::Unknown
        );
    }

    #[test]
    fn host_matching_is_case_insensitive() {
        let hosts = KnownHosts::parse(&format!("GitHub.com ssh-ed25519 {ED25519}")).unwrap();
        assert_eq!(
            hosts.verify("github.COM", 22, "ssh-ed25519", &key(ED25519)),
            HostKeyStatus::Trusted
        );
    }

    #[test]
    fn malformed_lines_are_rejected_with_line_number() {
        let err = KnownHosts::parse("github.com ssh-ed25519\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));

        let err = KnownHosts::parse(&format!("ok.com ssh-ed25519 {ED25519}\nbad ssh-rsa !!!"))
            .unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
