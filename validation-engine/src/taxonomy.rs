use crate::matching::SpanMatcher;
use deidentification_engine::{Candidate, DenyListTable, GroundTruthSpan, Span};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt::{self, Write as _};

const CONTEXT_CHARS: usize = 50;
const EXAMPLES_PER_MODE: usize = 5;

/// Why a ground-truth span went undetected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureMode {
    /// A compatible candidate covers less than half the span
    SpanBoundary,
    /// The surface text is on the category's deny list
    DenyListFilter,
    /// The surface form is absent from the known-pattern corpus
    NovelVariant,
    PatternMiss,
}

impl FailureMode {
    pub fn recommendation(self) -> &'static str {
        match self {
            FailureMode::SpanBoundary => "Review entity boundary detection logic",
            FailureMode::DenyListFilter => "Remove incorrect deny list entries",
            FailureMode::NovelVariant => "Expand synthetic training data coverage",
            FailureMode::PatternMiss => "Add regex patterns to custom recognizers",
        }
    }
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureMode::SpanBoundary => "SPAN_BOUNDARY",
            FailureMode::DenyListFilter => "DENY_LIST_FILTER",
            FailureMode::NovelVariant => "NOVEL_VARIANT",
            FailureMode::PatternMiss => "PATTERN_MISS",
        };
        f.write_str(name)
    }
}

/// One missed ground-truth span, classified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureCase {
    pub item_id: String,
    pub category: String,
    pub text: String,
    #[serde(flatten)]
    pub span: Span,
    pub mode: FailureMode,
    /// Surrounding text, truncated with `...`
    pub context: String,
    /// Candidate text that partially covered the span
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_match: Option<String>,
}

/// Up to 50 chars either side of `span`, marked where truncated
pub fn context_window(text: &str, span: &Span) -> String {
    let before = text.get(..span.start).unwrap_or_default();
    let after = text.get(span.end..).unwrap_or_default();
    let covered = span.slice(text).unwrap_or_default();

    let before_chars = before.chars().count();
    let lead: String = before.chars().skip(before_chars.saturating_sub(CONTEXT_CHARS)).collect();
    let trail: String = after.chars().take(CONTEXT_CHARS).collect();

    let mut window = String::new();
    if before_chars > CONTEXT_CHARS {
        window.push_str("...");
    }
    window.push_str(&lead);
    window.push_str(covered);
    window.push_str(&trail);
    if after.chars().count() > CONTEXT_CHARS {
        window.push_str("...");
    }
    window
}

/// Buckets false negatives by remediation
#[derive(Debug, Clone)]
pub struct FailureClassifier {
    matcher: SpanMatcher,
    deny_lists: DenyListTable,
    /// Lower-cased known surface forms per category
    known_patterns: Option<BTreeMap<String, HashSet<String>>>,
}

impl FailureClassifier {
    pub fn new(matcher: SpanMatcher, deny_lists: DenyListTable) -> Self {
        Self {
            matcher,
            deny_lists,
            known_patterns: None,
        }
    }

    /// Enable novel-variant detection against known surface forms
    #[must_use]
    pub fn with_known_patterns(mut self, patterns: BTreeMap<String, Vec<String>>) -> Self {
        self.known_patterns = Some(
            patterns
                .into_iter()
                .map(|(category, forms)| {
                    (
                        category.to_ascii_uppercase(),
                        forms.iter().map(|f| f.trim().to_lowercase()).collect(),
                    )
                })
                .collect(),
        );
        self
    }

    fn is_novel(&self, missed: &GroundTruthSpan) -> bool {
        self.known_patterns.as_ref().is_some_and(|known| {
            known.get(&missed.category).map_or(true, |forms| {
                !forms.contains(&missed.source_text.trim().to_lowercase())
            })
        })
    }

    /// Classify one missed span against the item's full candidate list.
    ///
    /// The first matching mode wins, in the order span boundary, deny list,
    /// novel variant, pattern miss.
    pub fn classify(
        &self,
        item_id: &str,
        text: &str,
        missed: &GroundTruthSpan,
        candidates: &[Candidate],
    ) -> FailureCase {
        let surface = missed
            .span
            .slice(text)
            .map_or_else(|| missed.source_text.clone(), str::to_string);

        let partial = candidates.iter().find(|c| {
            let covered = missed.span.intersection_len(&c.span);
            self.matcher.accepts(&missed.category, &c.category)
                && covered > 0
                && (covered as f64) < missed.span.len() as f64 * 0.5
        });

        let mode = if partial.is_some() {
            FailureMode::SpanBoundary
        } else if self.deny_lists.is_denied(&missed.category, &surface) {
            FailureMode::DenyListFilter
        } else if self.is_novel(missed) {
            FailureMode::NovelVariant
        } else {
            FailureMode::PatternMiss
        };

        FailureCase {
            item_id: item_id.to_string(),
            category: missed.category.clone(),
            text: surface,
            span: missed.span,
            mode,
            context: context_window(text, &missed.span),
            partial_match: partial.map(|c| c.source_text.clone()),
        }
    }
}

/// Cases of one failure mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureBucket {
    pub mode: FailureMode,
    pub count: usize,
    pub percentage: f64,
    pub recommendation: String,
    pub examples: Vec<FailureCase>,
}

/// False negatives grouped by failure mode, largest bucket first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyReport {
    pub total_false_negatives: usize,
    pub buckets: Vec<FailureBucket>,
}

impl TaxonomyReport {
    pub fn from_cases(cases: &[FailureCase]) -> Self {
        let total = cases.len();
        let buckets = cases
            .iter()
            .into_group_map_by(|case| case.mode)
            .into_iter()
            .map(|(mode, group)| FailureBucket {
                mode,
                count: group.len(),
                percentage: group.len() as f64 / total as f64 * 100.0,
                recommendation: mode.recommendation().to_string(),
                examples: group.into_iter().take(EXAMPLES_PER_MODE).cloned().collect(),
            })
            .sorted_by(|a, b| b.count.cmp(&a.count).then(a.mode.cmp(&b.mode)))
            .collect();
        Self {
            total_false_negatives: total,
            buckets,
        }
    }

    pub fn count(&self, mode: FailureMode) -> usize {
        self.buckets
            .iter()
            .find(|b| b.mode == mode)
            .map_or(0, |b| b.count)
    }

    /// Plain-text report for terminals and CI logs
    pub fn render_text(&self) -> String {
        let rule = "=".repeat(70);
        let mut out = String::new();
        let _ = writeln!(out, "{rule}\nFALSE NEGATIVE TAXONOMY\n{rule}\n");
        let _ = writeln!(out, "TOTAL FALSE NEGATIVES: {}\n", self.total_false_negatives);
        if self.buckets.is_empty() {
            let _ = writeln!(out, "No false negatives.");
            return out;
        }

        let _ = writeln!(out, "BREAKDOWN BY FAILURE MODE:");
        for bucket in &self.buckets {
            let _ = writeln!(
                out,
                "\n{}: {} cases ({:.1}%)",
                bucket.mode, bucket.count, bucket.percentage
            );
            for case in &bucket.examples {
                let _ = writeln!(out, "  - {} \"{}\" in: {}", case.category, case.text, case.context);
                if let Some(partial) = &case.partial_match {
                    let _ = writeln!(out, "    Partial match: \"{partial}\"");
                }
            }
            if bucket.count > bucket.examples.len() {
                let _ = writeln!(out, "  ... and {} more", bucket.count - bucket.examples.len());
            }
        }

        let _ = writeln!(out, "\nRECOMMENDATIONS:");
        for bucket in &self.buckets {
            let _ = writeln!(out, "  {}: {}", bucket.mode, bucket.recommendation);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_engine::PhiSettings;

    fn classifier() -> FailureClassifier {
        let settings = PhiSettings::default();
        FailureClassifier::new(
            SpanMatcher::from_settings(&settings),
            DenyListTable::from_settings(&settings.deny_lists).unwrap(),
        )
    }

    fn missed(text: &str, category: &str, surface: &str) -> GroundTruthSpan {
        let start = text.find(surface).unwrap();
        GroundTruthSpan {
            category: category.to_string(),
            span: Span::new(start, start + surface.len()),
            source_text: surface.to_string(),
        }
    }

    fn candidate(text: &str, category: &str, surface: &str) -> Candidate {
        let start = text.find(surface).unwrap();
        Candidate {
            category: category.to_string(),
            span: Span::new(start, start + surface.len()),
            score: 0.9,
            source_text: surface.to_string(),
        }
    }

    #[test]
    fn test_partial_overlap_is_span_boundary() {
        let text = "Patient Mary Elizabeth Johnson admitted";
        let gt = missed(text, "PERSON", "Mary Elizabeth Johnson");
        let case = classifier().classify("1", text, &gt, &[candidate(text, "PERSON", "Mary")]);
        assert_eq!(case.mode, FailureMode::SpanBoundary);
        assert_eq!(case.partial_match.as_deref(), Some("Mary"));
    }

    #[test]
    fn test_deny_listed_surface() {
        let text = "Mom is at bedside";
        let gt = missed(text, "PERSON", "Mom");
        let case = classifier().classify("1", text, &gt, &[]);
        assert_eq!(case.mode, FailureMode::DenyListFilter);
    }

    #[test]
    fn test_novel_variant_only_with_known_patterns() {
        let text = "Sister Zephyrine called";
        let gt = missed(text, "PERSON", "Zephyrine");
        assert_eq!(classifier().classify("1", text, &gt, &[]).mode, FailureMode::PatternMiss);

        let tracked = classifier().with_known_patterns(BTreeMap::from([(
            "PERSON".to_string(),
            vec!["Jessica".to_string()],
        )]));
        assert_eq!(tracked.classify("1", text, &gt, &[]).mode, FailureMode::NovelVariant);
    }

    #[test]
    fn test_context_window_truncates() {
        let text = format!("{}Jessica{}", "a".repeat(60), "b".repeat(10));
        let span = Span::new(60, 67);
        let context = context_window(&text, &span);
        assert!(context.starts_with("..."));
        assert!(context.ends_with("bbbbbbbbbb"));
        assert_eq!(context.len(), 3 + 50 + 7 + 10);
    }

    #[test]
    fn test_report_buckets_and_overflow() {
        let text = "Sister Zephyrine called";
        let gt = missed(text, "PERSON", "Zephyrine");
        let case = classifier().classify("1", text, &gt, &[]);
        let cases = vec![case; 7];

        let report = TaxonomyReport::from_cases(&cases);
        assert_eq!(report.total_false_negatives, 7);
        assert_eq!(report.count(FailureMode::PatternMiss), 7);
        assert_eq!(report.buckets[0].examples.len(), 5);
        assert_eq!(report.buckets[0].percentage, 100.0);

        let rendered = report.render_text();
        assert!(rendered.contains("PATTERN_MISS: 7 cases (100.0%)"));
        assert!(rendered.contains("... and 2 more"));
        assert!(rendered.contains("Add regex patterns to custom recognizers"));
    }
}
