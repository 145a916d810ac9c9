use crate::models::{AppliedSpan, Candidate, Span, SpanAction};
use config_engine::{ReplacementStrategy, TransferFacilityMode};
use std::collections::BTreeSet;

pub const FIXED_MARKER: &str = "[REDACTED]";
pub const MASK_CHAR: char = '*';

/// Characters revealed at each end of a long masked preview
const PREVIEW_REVEAL: usize = 3;

/// Bracketed label for a category
pub fn type_marker(category: &str) -> String {
    let label = match category {
        "PERSON" | "GUARDIAN_NAME" | "PROVIDER_NAME" => "NAME",
        "PHONE_NUMBER" => "PHONE",
        "EMAIL_ADDRESS" => "EMAIL",
        "DATE_TIME" => "DATE",
        "MEDICAL_RECORD_NUMBER" => "MRN",
        "PEDIATRIC_AGE" => "AGE",
        "ROOM" => "ROOM",
        "LOCATION" => "LOCATION",
        other => return format!("[{}]", other.replace('_', " ")),
    };
    format!("[{label}]")
}

/// Display-safe rendering of identifying text.
///
/// Long values keep three characters at each end (`Sar***ah`); anything of
/// six characters or fewer is fully masked.
pub fn masked_preview(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    if total <= PREVIEW_REVEAL * 2 {
        return MASK_CHAR.to_string().repeat(total);
    }
    let head: String = chars.iter().take(PREVIEW_REVEAL).collect();
    let tail: String = chars.iter().skip(total - PREVIEW_REVEAL).collect();
    let middle = MASK_CHAR.to_string().repeat(total - PREVIEW_REVEAL * 2);
    format!("{head}{middle}{tail}")
}

/// Output of [`RedactionEngine::apply`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redaction {
    pub text: String,
    pub applied_spans: Vec<AppliedSpan>,
    /// Markers written into `text`, for the leak re-check
    pub markers: BTreeSet<String>,
}

/// Turns filtered candidates into redacted text
#[derive(Debug, Clone)]
pub struct RedactionEngine {
    facility_category: String,
}

struct Cluster<'a> {
    span: Span,
    winner: &'a Candidate,
}

impl RedactionEngine {
    pub fn new(facility_category: impl Into<String>) -> Self {
        Self {
            facility_category: facility_category.into(),
        }
    }

    /// Strategy actually used for a category under the facility mode
    pub fn effective_strategy(
        &self,
        category: &str,
        strategy: ReplacementStrategy,
        facility_mode: TransferFacilityMode,
    ) -> ReplacementStrategy {
        if category != self.facility_category {
            return strategy;
        }
        match facility_mode {
            TransferFacilityMode::Clinical => ReplacementStrategy::Keep,
            TransferFacilityMode::Conservative if strategy == ReplacementStrategy::Keep => {
                ReplacementStrategy::TypeMarker
            }
            TransferFacilityMode::Conservative => strategy,
        }
    }

    fn replacement(strategy: ReplacementStrategy, category: &str, original: &str) -> String {
        match strategy {
            ReplacementStrategy::TypeMarker => type_marker(category),
            ReplacementStrategy::FixedMarker => FIXED_MARKER.to_string(),
            ReplacementStrategy::MaskCharacters => {
                MASK_CHAR.to_string().repeat(original.chars().count())
            }
            ReplacementStrategy::Keep => original.to_string(),
        }
    }

    /// Group overlapping candidates by ascending start.
    ///
    /// A cluster covers the union of its members and takes the replacement
    /// of the last member to start (last writer wins).
    fn clusters<'a>(candidates: &'a [Candidate]) -> Vec<Cluster<'a>> {
        let mut ordered: Vec<&Candidate> = candidates.iter().collect();
        ordered.sort_by_key(|c| (c.span.start, c.span.end));

        let mut clusters: Vec<Cluster<'a>> = Vec::with_capacity(ordered.len());
        for candidate in ordered {
            match clusters.last_mut() {
                Some(current) if candidate.span.start < current.span.end => {
                    current.span.end = current.span.end.max(candidate.span.end);
                    current.winner = candidate;
                }
                _ => clusters.push(Cluster {
                    span: candidate.span,
                    winner: candidate,
                }),
            }
        }
        clusters
    }

    /// Substitute every candidate span of `text`.
    ///
    /// Candidates must already be bound-checked against `text`; spans that
    /// are not are skipped rather than sliced.
    pub fn apply(
        &self,
        text: &str,
        candidates: &[Candidate],
        strategy: ReplacementStrategy,
        facility_mode: TransferFacilityMode,
    ) -> Redaction {
        let mut output = String::with_capacity(text.len());
        let mut applied_spans = Vec::new();
        let mut markers = BTreeSet::new();
        let mut cursor = 0;

        for cluster in Self::clusters(candidates) {
            let (Some(before), Some(original)) = (
                text.get(cursor..cluster.span.start),
                cluster.span.slice(text),
            ) else {
                tracing::warn!(
                    start = cluster.span.start,
                    end = cluster.span.end,
                    "Skipping span outside text"
                );
                continue;
            };

            let category = cluster.winner.category.as_str();
            let effective = self.effective_strategy(category, strategy, facility_mode);
            let replacement = Self::replacement(effective, category, original);

            output.push_str(before);
            output.push_str(&replacement);
            cursor = cluster.span.end;

            let action = if effective == ReplacementStrategy::Keep {
                SpanAction::Preserved
            } else {
                markers.insert(replacement);
                SpanAction::Redacted
            };

            applied_spans.push(AppliedSpan {
                category: category.to_string(),
                start: cluster.span.start,
                end: cluster.span.end,
                masked_preview: masked_preview(original),
                action,
            });
        }

        output.push_str(text.get(cursor..).unwrap_or_default());

        Redaction {
            text: output,
            applied_spans,
            markers,
        }
    }
}
