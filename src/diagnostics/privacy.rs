// SPDX-License-Identifier: MPL-2.0
//! Scrubbing of personal data before diagnostics leave the process.
//!
//! - [`sanitize_message`] replaces file system paths and e-mail addresses
//!   with fixed placeholders.
//! - [`IdentityAnonymizer`] replaces IP addresses, host names, the local user
//!   name and explicit identifiers with salted hashes, so that equal values
//!   stay correlatable within one export without being reversible.

use std::net::Ipv4Addr;
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::{Captures, Regex};

static PATH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    // Unix roots that commonly hold user data, `~/`, drive letters and UNC shares.
    // A path runs until whitespace or a quoting/bracketing delimiter.
    Regex::new(concat!(
        r#"(?:/(?:home|Users|tmp|var|etc|opt|data|storage|private)/[^\s"'()\[\]]+"#,
        r#"|~/[^\s"'()\[\]]+"#,
        r#"|[A-Za-z]:\\[^\s"'()\[\]]+"#,
        r#"|\\\\[^\s"'()\[\]]+)"#,
    ))
    .expect("path regex should compile")
});

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
        .expect("email regex should compile")
});

static IPV4_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("IPv4 regex should compile")
});

static IPV6_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    // Full and `::`-compressed forms with at least two groups; bare `::` is left alone.
    Regex::new(concat!(
        r"(?i)\b(?:[0-9a-f]{1,4}:){7}[0-9a-f]{1,4}\b",
        r"|\b(?:[0-9a-f]{1,4}:){1,6}:(?:[0-9a-f]{1,4}(?::[0-9a-f]{1,4}){0,5})?\b",
        r"|::1\b",
    ))
    .expect("IPv6 regex should compile")
});

static HOST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}\b")
        .expect("host regex should compile")
});

/// Top-level domains treated as host names rather than file extensions.
const KNOWN_TLDS: &[&str] = &[
    "com", "org", "net", "edu", "gov", "io", "dev", "app", "cloud", "ai", "co", "info", "me",
];

/// Suffixes that look like TLDs but are file extensions or code identifiers.
const NOT_HOSTS: &[&str] = &[
    "rs", "js", "ts", "py", "go", "md", "txt", "log", "json", "toml", "yaml", "yml", "html",
    "css", "png", "jpg", "so", "dll", "exe", "sh", "kv", "tmp",
];

/// Replaces file paths with `<path>` and e-mail addresses with `<email>`.
///
/// # Examples
///
/// ```
/// use app_vitals::diagnostics::sanitize_message;
///
/// let msg = "Failed to open /home/alice/notes.db for bob@example.com";
/// assert_eq!(sanitize_message(msg), "Failed to open <path> for <email>");
///
/// assert_eq!(sanitize_message("Invalid format"), "Invalid format");
/// ```
#[must_use]
pub fn sanitize_message(message: &str) -> String {
    let without_paths = PATH_PATTERN.replace_all(message, "<path>");
    EMAIL_PATTERN
        .replace_all(&without_paths, "<email>")
        .into_owned()
}

/// Salted one-way hashing of identifying values.
///
/// Every instance draws its own salt, so hashes from two exports cannot be
/// joined. Hashes are the first 8 hex digits of a keyed blake3 digest.
#[derive(Debug, Clone)]
pub struct IdentityAnonymizer {
    salt: [u8; 32],
    username: Option<(Regex, String)>,
}

impl IdentityAnonymizer {
    /// Creates an anonymizer with a random salt and the current OS user name.
    #[must_use]
    pub fn new() -> Self {
        Self::build(random_salt(), local_username().as_deref())
    }

    /// Deterministic salt for tests, with an explicit user name.
    #[must_use]
    pub fn with_seed(seed: u64, username: Option<&str>) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&seed.to_le_bytes());
        hasher.update(b"app_vitals_identity_seed");
        Self::build(*hasher.finalize().as_bytes(), username)
    }

    fn build(salt: [u8; 32], username: Option<&str>) -> Self {
        let username = username
            .filter(|name| name.len() > 1)
            .and_then(|name| {
                let pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(name))).ok()?;
                Some((pattern, format!("<user:{}>", hash_with(&salt, name))))
            });
        Self { salt, username }
    }

    /// Hashes an explicit identifier as `<kind:xxxxxxxx>`.
    #[must_use]
    pub fn hash_token(&self, kind: &str, value: &str) -> String {
        format!("<{kind}:{}>", self.hash(value))
    }

    /// Replaces the user name, IP addresses and host names found in `input`.
    ///
    /// Host names keep their top-level domain: `api.example.com` becomes
    /// `<host:xxxxxxxx>.com`.
    #[must_use]
    pub fn anonymize_string(&self, input: &str) -> String {
        let mut result = match &self.username {
            Some((pattern, replacement)) => {
                pattern.replace_all(input, replacement.as_str()).into_owned()
            }
            None => input.to_string(),
        };

        result = IPV4_PATTERN
            .replace_all(&result, |caps: &Captures| {
                let candidate = &caps[0];
                if candidate.parse::<Ipv4Addr>().is_ok() {
                    self.hash_token("ip", candidate)
                } else {
                    candidate.to_string()
                }
            })
            .into_owned();

        result = IPV6_PATTERN
            .replace_all(&result, |caps: &Captures| self.hash_token("ip", &caps[0]))
            .into_owned();

        HOST_PATTERN
            .replace_all(&result, |caps: &Captures| {
                let host = &caps[0];
                let Some((name, tld)) = host.rsplit_once('.') else {
                    return host.to_string();
                };
                let tld_lower = tld.to_ascii_lowercase();
                let looks_like_host = KNOWN_TLDS.contains(&tld_lower.as_str())
                    || (tld.len() == 2 && !NOT_HOSTS.contains(&tld_lower.as_str()));
                if looks_like_host {
                    format!("{}.{tld}", self.hash_token("host", name))
                } else {
                    host.to_string()
                }
            })
            .into_owned()
    }

    fn hash(&self, value: &str) -> String {
        hash_with(&self.salt, value)
    }
}

impl Default for IdentityAnonymizer {
    fn default() -> Self {
        Self::new()
    }
}

fn hash_with(salt: &[u8; 32], value: &str) -> String {
    let digest = blake3::keyed_hash(salt, value.as_bytes());
    digest.to_hex()[..8].to_string()
}

fn random_salt() -> [u8; 32] {
    let mut salt = [0u8; 32];
    if let Err(err) = getrandom::fill(&mut salt) {
        // Weaker but still per-process unique.
        tracing::warn!(error = %err, "OS randomness unavailable, deriving salt from clock");
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        let mut hasher = blake3::Hasher::new();
        hasher.update(&nanos.to_le_bytes());
        hasher.update(&std::process::id().to_le_bytes());
        salt = *hasher.finalize().as_bytes();
    }
    salt
}

fn local_username() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_removes_unix_and_windows_paths() {
        assert_eq!(
            sanitize_message("Copy from /home/u/a.txt to C:\\Users\\u\\b.txt failed"),
            "Copy from <path> to <path> failed"
        );
        assert_eq!(
            sanitize_message("open(\"/tmp/cache.db\")"),
            "open(\"<path>\")"
        );
    }

    #[test]
    fn sanitize_removes_email_addresses() {
        assert_eq!(
            sanitize_message("user jane.doe+test@mail.co.uk rejected"),
            "user <email> rejected"
        );
    }

    #[test]
    fn sanitize_keeps_plain_messages() {
        assert_eq!(sanitize_message(""), "");
        assert_eq!(sanitize_message("timeout after 30s"), "timeout after 30s");
    }

    #[test]
    fn hashes_are_stable_within_an_instance() {
        let anonymizer = IdentityAnonymizer::with_seed(7, None);
        let first = anonymizer.hash_token("user", "u-42");
        assert_eq!(first, anonymizer.hash_token("user", "u-42"));
        assert_ne!(first, anonymizer.hash_token("user", "u-43"));
        assert!(first.starts_with("<user:") && first.len() == "<user:>".len() + 8);
    }

    #[test]
    fn different_salts_do_not_correlate() {
        let a = IdentityAnonymizer::with_seed(1, None);
        let b = IdentityAnonymizer::with_seed(2, None);
        assert_ne!(a.hash_token("id", "same"), b.hash_token("id", "same"));
    }

    #[test]
    fn replaces_ipv4_but_not_version_numbers() {
        let anonymizer = IdentityAnonymizer::with_seed(3, None);
        let out = anonymizer.anonymize_string("peer 10.0.0.12 sent 999.1.1.1");
        assert!(out.starts_with("peer <ip:"));
        assert!(out.ends_with("sent 999.1.1.1"));
    }

    #[test]
    fn replaces_ipv6() {
        let anonymizer = IdentityAnonymizer::with_seed(3, None);
        let out = anonymizer.anonymize_string("bind fe80::1ff:fe23:4567:890a failed");
        assert!(!out.contains("fe80"));
        assert!(out.contains("<ip:"));
    }

    #[test]
    fn replaces_hosts_but_keeps_file_names() {
        let anonymizer = IdentityAnonymizer::with_seed(3, None);
        let out = anonymizer.anonymize_string("GET api.example.com failed, see main.rs");
        assert!(out.contains("<host:"));
        assert!(out.contains(".com failed"));
        assert!(out.ends_with("see main.rs"));
    }

    #[test]
    fn replaces_local_username_case_insensitively() {
        let anonymizer = IdentityAnonymizer::with_seed(3, Some("alice"));
        let out = anonymizer.anonymize_string("Alice lost her session; alice retried");
        assert!(!out.to_lowercase().contains("alice"));
        assert_eq!(out.matches("<user:").count(), 2);
    }

    #[test]
    fn username_respects_word_boundaries() {
        let anonymizer = IdentityAnonymizer::with_seed(3, Some("al"));
        assert_eq!(anonymizer.anonymize_string("also fine"), "also fine");
    }
}
