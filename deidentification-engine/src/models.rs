use error_common::{PhiError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Half-open offset range `[start, end)` into one fixed text.
///
/// Offsets are UTF-8 byte offsets and must fall on char boundaries; every
/// producer and consumer in the workspace uses this convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn intersection_len(&self, other: &Span) -> usize {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        end.saturating_sub(start)
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.intersection_len(other) > 0
    }

    /// Slice of `text` covered by this span, if the span is valid for it
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        if self.is_empty() {
            return None;
        }
        text.get(self.start..self.end)
    }

    /// Check `start < end <= text.len()` on char boundaries.
    ///
    /// # Errors
    ///
    /// Returns the reason as a plain string so callers can attach their own
    /// item or request context.
    pub fn check_bounds(&self, text: &str) -> std::result::Result<(), String> {
        if self.start >= self.end {
            return Err(format!("start {} is not before end {}", self.start, self.end));
        }
        if self.end > text.len() {
            return Err(format!("end {} exceeds text length {}", self.end, text.len()));
        }
        if !text.is_char_boundary(self.start) || !text.is_char_boundary(self.end) {
            return Err(format!(
                "span {}..{} does not fall on character boundaries",
                self.start, self.end
            ));
        }
        Ok(())
    }
}

/// Typed, scored span proposed by a detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub category: String,
    #[serde(flatten)]
    pub span: Span,
    pub score: f64,
    #[serde(alias = "text")]
    pub source_text: String,
}

impl Candidate {
    /// Build a candidate from a span of `text`.
    ///
    /// # Errors
    ///
    /// `DetectorUnavailable` if the span is not valid for `text`; a detector
    /// that reports impossible offsets cannot be trusted for the request.
    pub fn from_text(
        text: &str,
        category: impl Into<String>,
        span: Span,
        score: f64,
    ) -> Result<Self> {
        span.check_bounds(text)
            .map_err(|reason| PhiError::detector_unavailable(format!("invalid candidate: {reason}")))?;
        let source_text = span.slice(text).unwrap_or_default().to_string();
        Ok(Self {
            category: category.into(),
            span,
            score,
            source_text,
        })
    }

    pub fn start(&self) -> usize {
        self.span.start
    }

    pub fn end(&self) -> usize {
        self.span.end
    }
}

/// Labelled identifying span of a corpus item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundTruthSpan {
    #[serde(alias = "entity_type")]
    pub category: String,
    #[serde(flatten)]
    pub span: Span,
    #[serde(alias = "text")]
    pub source_text: String,
}

/// Whether an applied span was replaced or deliberately left readable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanAction {
    Redacted,
    Preserved,
}

/// Audit record of one substitution, safe to display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedSpan {
    pub category: String,
    /// Offsets into the original text
    pub start: usize,
    pub end: usize,
    pub masked_preview: String,
    pub action: SpanAction,
}

/// Result of one `redact` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactionOutcome {
    pub redacted_text: String,
    pub applied_spans: Vec<AppliedSpan>,
    pub is_safe: bool,
    pub warnings: Vec<String>,
    /// Surviving candidates per category
    pub entity_counts: BTreeMap<String, usize>,
}

impl RedactionOutcome {
    pub fn entity_count(&self) -> usize {
        self.entity_counts.values().sum()
    }
}
