//! Static anomaly heuristics over the request shape.
//!
//! The shield looks for payloads that are never legitimate for this API:
//! path traversal, script and SQL injection fragments, JNDI lookups, probes
//! for well-known sensitive files and oversized request targets. Matching
//! is done on the lower-cased, percent-decoded path and query plus a few
//! free-text headers. The request body is not inspected.

use percent_encoding::percent_decode_str;

use super::RequestFacts;

/// Longest request target (path + query) accepted.
pub const MAX_TARGET_LEN: usize = 4096;

/// Largest total header size accepted.
pub const MAX_HEADER_BYTES: usize = 16 * 1024;

/// Named signature groups. The first matching group wins.
const SIGNATURES: &[(&str, &[&str])] = &[
    ("path_traversal", &["../", "..\\", "/..;/"]),
    ("null_byte", &["\0"]),
    (
        "script_injection",
        &["<script", "javascript:", "onerror=", "onload=", "<iframe"],
    ),
    (
        "sql_injection",
        &[
            "union select",
            "union all select",
            "' or '1'='1",
            "' or 1=1",
            "\" or 1=1",
            "; drop table",
            "information_schema",
            "sleep(",
            "benchmark(",
        ],
    ),
    ("jndi_lookup", &["${jndi:"]),
    ("command_injection", &["$(", ";cat ", "; cat ", "|sh", "&& curl", "&& wget"]),
    (
        "sensitive_file_probe",
        &["/etc/passwd", "/.env", "/.git/", "/wp-admin", "/wp-login.php", "/phpmyadmin"],
    ),
];

/// Outcome of a shield match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShieldMatch {
    /// Name of the signature group that matched.
    pub signature: &'static str,
}

/// Static request-shape inspector.
#[derive(Debug, Default, Clone, Copy)]
pub struct Shield;

impl Shield {
    /// Creates a shield with the built-in signature set.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns the first signature the request matches, if any.
    #[must_use]
    pub fn inspect(&self, facts: &RequestFacts) -> Option<ShieldMatch> {
        let target_len = facts
            .path
            .len()
            .saturating_add(facts.query.as_deref().map_or(0, str::len));
        if target_len > MAX_TARGET_LEN {
            return Some(ShieldMatch {
                signature: "oversized_target",
            });
        }
        if facts.header_bytes > MAX_HEADER_BYTES {
            return Some(ShieldMatch {
                signature: "oversized_headers",
            });
        }

        let mut haystacks = vec![decode_lower(&facts.path)];
        if let Some(query) = &facts.query {
            haystacks.push(decode_lower(query));
        }
        if let Some(ua) = &facts.user_agent {
            haystacks.push(ua.to_ascii_lowercase());
        }

        SIGNATURES
            .iter()
            .find(|(_, needles)| {
                haystacks
                    .iter()
                    .any(|hay| needles.iter().any(|needle| hay.contains(needle)))
            })
            .map(|(signature, _)| ShieldMatch {
                signature: *signature,
            })
    }
}

/// Percent-decodes (twice, to catch double encoding) and lower-cases.
fn decode_lower(raw: &str) -> String {
    let once = percent_decode(raw);
    percent_decode(&once).to_lowercase()
}

/// Form-style decode: `+` is a space, malformed escapes are kept verbatim.
fn percent_decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}
