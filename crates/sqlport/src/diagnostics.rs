//! Diagnostics accumulated during a translation run.
//!
//! Every recoverable problem (unrecognized statement, unmapped construct,
//! semantically risky rewrite) is surfaced here with its source span so a
//! human can patch the output. Diagnostics are ordered by the point at
//! which they were raised.

use crate::tokens::Span;
use serde::{Deserialize, Serialize};

// `Diagnostic` is serialize-only: the `rule` field borrows rule names for
// the whole program lifetime, which has no deserialized counterpart.

/// Severity level for a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A warning about a lossy or approximate rewrite
    Warning,
    /// An unsupported construct; the run result is at best partial
    Error,
}

/// A single warning or error raised during a run
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    /// Severity of the issue
    pub severity: Severity,
    /// Human-readable message
    pub message: String,
    /// Source span the diagnostic points at, if known
    pub span: Option<Span>,
    /// Name of the rewrite rule that raised this, if any
    pub rule: Option<&'static str>,
}

impl Diagnostic {
    /// Create a new error diagnostic
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            span: None,
            rule: None,
        }
    }

    /// Create a new warning diagnostic
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            span: None,
            rule: None,
        }
    }

    /// Set the source span
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Set the originating rule name
    pub fn with_rule(mut self, rule: &'static str) -> Self {
        self.rule = Some(rule);
        self
    }
}

/// Run-level outcome of a translation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationStatus {
    /// Fully translated, no errors (warnings allowed)
    Ok,
    /// One or more unsupported constructs; output still produced
    Partial,
    /// Tokenizer or parser could not produce any tree
    Fatal,
}

impl TranslationStatus {
    /// Derive the run status from the accumulated diagnostics.
    ///
    /// `Fatal` is never derived here; it is set directly by the run driver
    /// when no tree could be produced at all.
    pub fn from_diagnostics(diagnostics: &[Diagnostic]) -> Self {
        if diagnostics.iter().any(|d| d.severity == Severity::Error) {
            TranslationStatus::Partial
        } else {
            TranslationStatus::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ok_without_errors() {
        let diags = vec![Diagnostic::warning("style argument dropped")];
        assert_eq!(
            TranslationStatus::from_diagnostics(&diags),
            TranslationStatus::Ok
        );
    }

    #[test]
    fn status_partial_with_error() {
        let diags = vec![
            Diagnostic::warning("w"),
            Diagnostic::error("unsupported construct"),
        ];
        assert_eq!(
            TranslationStatus::from_diagnostics(&diags),
            TranslationStatus::Partial
        );
    }

    #[test]
    fn diagnostic_builders() {
        let d = Diagnostic::error("FOR XML is not supported")
            .with_span(Span::new(10, 17, 1, 11))
            .with_rule("for-xml");
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.span.unwrap().start, 10);
        assert_eq!(d.rule, Some("for-xml"));
    }
}
