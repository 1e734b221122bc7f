//! Shared primitives used across the Spidy navigation crates.

use core::fmt;
use serde::Serialize;

/// Result alias used across the workspace.
pub type SpidyResult<T> = Result<T, SpidyError>;

/// Coded error carried through every fallible gate operation.
///
/// Policy denials are never reported through this type; they travel as
/// decisions. Errors are reserved for malformed input, bad configuration and
/// collaborator failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpidyError {
    pub code: &'static str,
    pub message: String,
}

impl SpidyError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Wraps an I/O failure with the operation that produced it.
    pub fn io(code: &'static str, context: impl fmt::Display, error: std::io::Error) -> Self {
        Self::new(code, format!("{context}: {error}"))
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.code == code
    }
}

impl fmt::Display for SpidyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for SpidyError {}

/// What caused the rendering engine to start a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NavigationTrigger {
    LinkClicked,
    FormSubmitted,
    BackForward,
    Reload,
    Redirect,
    Typed,
    Other,
}

impl NavigationTrigger {
    pub const ALL: [Self; 7] = [
        Self::LinkClicked,
        Self::FormSubmitted,
        Self::BackForward,
        Self::Reload,
        Self::Redirect,
        Self::Typed,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LinkClicked => "link-clicked",
            Self::FormSubmitted => "form-submitted",
            Self::BackForward => "back-forward",
            Self::Reload => "reload",
            Self::Redirect => "redirect",
            Self::Typed => "typed",
            Self::Other => "other",
        }
    }

    /// Human-readable name used in log lines and audit records.
    pub fn label(self) -> &'static str {
        match self {
            Self::LinkClicked => "Link Click",
            Self::FormSubmitted => "Form Submission",
            Self::BackForward => "Back/Forward Navigation",
            Self::Reload => "Page Reload",
            Self::Redirect => "Redirect",
            Self::Typed => "URL Typed",
            Self::Other => "Other Navigation",
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|trigger| trigger.as_str() == normalized)
    }
}

impl fmt::Display for NavigationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
