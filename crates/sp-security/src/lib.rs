//! Scheme policy and suspicious-URL heuristics.

use serde::Deserialize;
use sp_core::SpidyError;
use sp_core::SpidyResult;
use sp_url::NavUrl;
use sp_url::SchemeKind;
use std::collections::HashMap;

const DEFAULT_MAX_URL_LENGTH: usize = 2000;
const CONTROL_SEQUENCES: &[&str] = &["%00", "%0d", "%0a", "\0"];
const EXECUTABLE_DATA_MARKERS: &[&str] = &["application/x-msdownload", "application/octet-stream"];

/// Tunables for the suspicion detector and the policy table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    pub max_url_length: usize,
    /// Schemes whose table entry is forced to `allowed = false`.
    pub blocked_schemes: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_url_length: DEFAULT_MAX_URL_LENGTH,
            blocked_schemes: Vec::new(),
        }
    }
}

impl SecurityConfig {
    pub fn validate(&self) -> SpidyResult<()> {
        if self.max_url_length == 0 {
            return Err(SpidyError::new(
                "config.max_url_length_invalid",
                "security.max_url_length must be greater than zero",
            ));
        }

        if let Some(empty) = self.blocked_schemes.iter().find(|name| name.trim().is_empty()) {
            return Err(SpidyError::new(
                "config.blocked_scheme_invalid",
                format!("blocked scheme name `{empty}` is empty"),
            ));
        }

        Ok(())
    }
}

/// Handling rules for a single scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemePolicy {
    pub allowed: bool,
    /// Defer to the OS default application instead of navigating in-view.
    pub external_handoff: bool,
    pub description: &'static str,
}

impl SchemePolicy {
    const fn allow(description: &'static str) -> Self {
        Self {
            allowed: true,
            external_handoff: false,
            description,
        }
    }

    const fn external(description: &'static str) -> Self {
        Self {
            allowed: true,
            external_handoff: true,
            description,
        }
    }
}

/// Result of resolving a scheme against the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeLookup<'a> {
    Listed(&'a SchemePolicy),
    /// `javascript:`/`vbscript:`; enforced ahead of any table entry.
    ScriptBlocked,
    /// No entry; callers fail open.
    Unknown,
}

/// Static per-gate mapping from scheme to policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemePolicyTable {
    entries: HashMap<SchemeKind, SchemePolicy>,
}

impl Default for SchemePolicyTable {
    fn default() -> Self {
        let entries = HashMap::from([
            (SchemeKind::Http, SchemePolicy::allow("HTTP protocol")),
            (SchemeKind::Https, SchemePolicy::allow("Secure HTTP protocol")),
            (SchemeKind::File, SchemePolicy::allow("Local file access")),
            (SchemeKind::Ftp, SchemePolicy::allow("File Transfer Protocol")),
            (
                SchemeKind::Ftps,
                SchemePolicy::allow("Secure File Transfer Protocol"),
            ),
            (SchemeKind::Data, SchemePolicy::allow("Data URI scheme")),
            (SchemeKind::Mailto, SchemePolicy::external("Email address link")),
            (SchemeKind::Tel, SchemePolicy::external("Telephone number link")),
            (SchemeKind::About, SchemePolicy::allow("Browser information")),
        ]);
        Self { entries }
    }
}

impl SchemePolicyTable {
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::default().with_blocked(&config.blocked_schemes)
    }

    /// Forces the named schemes to `allowed = false`, adding rows as needed.
    pub fn with_blocked(mut self, schemes: &[String]) -> Self {
        for name in schemes {
            let kind = SchemeKind::classify(name);
            if kind.is_script() {
                continue;
            }

            self.entries
                .entry(kind)
                .and_modify(|policy| policy.allowed = false)
                .or_insert(SchemePolicy {
                    allowed: false,
                    external_handoff: false,
                    description: "Blocked by configuration",
                });
        }
        self
    }

    pub fn lookup(&self, scheme: &SchemeKind) -> SchemeLookup<'_> {
        if scheme.is_script() {
            return SchemeLookup::ScriptBlocked;
        }

        match self.entries.get(scheme) {
            Some(policy) => SchemeLookup::Listed(policy),
            None => SchemeLookup::Unknown,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of the suspicion heuristics for one URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuspicionVerdict {
    pub is_suspicious: bool,
    pub reasons: Vec<String>,
}

impl SuspicionVerdict {
    fn flag(&mut self, reason: String) {
        self.is_suspicious = true;
        self.reasons.push(reason);
    }
}

/// Stateless URL heuristics; the caller owns the suspicious-attempt counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspicionDetector {
    max_url_length: usize,
}

impl Default for SuspicionDetector {
    fn default() -> Self {
        Self::new(&SecurityConfig::default())
    }
}

impl SuspicionDetector {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            max_url_length: config.max_url_length,
        }
    }

    pub fn max_url_length(&self) -> usize {
        self.max_url_length
    }

    pub fn evaluate(&self, url: &NavUrl) -> SuspicionVerdict {
        let mut verdict = SuspicionVerdict::default();

        if is_dangerous_scheme(url.scheme()) {
            verdict.flag(format!("Suspicious scheme: {}", url.scheme_name()));
        }

        let serialized = url.as_str().to_ascii_lowercase();
        if let Some(sequence) = CONTROL_SEQUENCES
            .iter()
            .find(|sequence| serialized.contains(**sequence))
        {
            verdict.flag(format!(
                "Suspicious characters in URL: found '{}'",
                sequence.escape_default()
            ));
        }

        let length = url.serialized_len();
        if length > self.max_url_length {
            verdict.flag(format!("Excessively long URL: {length} chars"));
        }

        verdict
    }
}

fn is_dangerous_scheme(scheme: &SchemeKind) -> bool {
    matches!(
        scheme,
        SchemeKind::Javascript | SchemeKind::Vbscript | SchemeKind::Data
    )
}

/// True for `data:` URLs declaring an executable MIME type.
pub fn carries_executable_data(url: &NavUrl) -> bool {
    if url.scheme() != &SchemeKind::Data {
        return false;
    }

    let serialized = url.as_str().to_ascii_lowercase();
    EXECUTABLE_DATA_MARKERS
        .iter()
        .any(|marker| serialized.contains(marker))
}
