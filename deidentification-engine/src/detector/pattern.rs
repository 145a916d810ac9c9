use super::Recognizer;
use crate::models::{Candidate, Span};
use error_common::{PhiError, Result};
use regex::Regex;

/// Score added when a context word precedes a match
const CONTEXT_BOOST: f64 = 0.35;
/// Floor for a context-boosted score
const CONTEXT_MIN_SCORE: f64 = 0.4;
/// Words before a match searched for context
const CONTEXT_WINDOW_WORDS: usize = 5;

/// One scored regular expression
#[derive(Debug, Clone)]
pub struct PatternRule {
    name: String,
    regex: Regex,
    score: f64,
    /// Capture group whose span becomes the candidate; 0 is the whole match
    group: usize,
}

impl PatternRule {
    /// # Errors
    ///
    /// `Configuration` if the pattern does not compile.
    pub fn new(name: impl Into<String>, pattern: &str, score: f64) -> Result<Self> {
        let name = name.into();
        let regex = Regex::new(pattern)
            .map_err(|e| PhiError::configuration(format!("pattern {name} does not compile: {e}")))?;
        Ok(Self {
            name,
            regex,
            score,
            group: 0,
        })
    }

    /// Report only capture group `group`.
    ///
    /// Stands in for look-behind: `\bmom\s+([A-Z][a-z]+)` with group 1
    /// yields the name without the relationship word.
    #[must_use]
    pub fn capture(mut self, group: usize) -> Self {
        self.group = group;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn spans<'t>(&'t self, text: &'t str) -> impl Iterator<Item = Span> + 't {
        self.regex.captures_iter(text).filter_map(move |caps| {
            caps.get(self.group)
                .filter(|m| !m.as_str().is_empty())
                .map(|m| Span::new(m.start(), m.end()))
        })
    }
}

/// Regex recognizer for a single category with context-word boosting
#[derive(Debug, Clone)]
pub struct PatternRecognizer {
    name: String,
    category: String,
    rules: Vec<PatternRule>,
    context: Vec<String>,
}

impl PatternRecognizer {
    pub fn new(name: impl Into<String>, category: impl Into<String>, rules: Vec<PatternRule>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            rules,
            context: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_context(mut self, words: &[&str]) -> Self {
        self.context = words.iter().map(|w| w.to_lowercase()).collect();
        self
    }

    fn has_context(&self, text: &str, start: usize) -> bool {
        if self.context.is_empty() {
            return false;
        }
        let Some(prefix) = text.get(..start) else {
            return false;
        };

        let mut window: Vec<String> = prefix
            .split_whitespace()
            .rev()
            .take(CONTEXT_WINDOW_WORDS)
            .map(|w| {
                w.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .collect();
        window.reverse();
        let joined = window.join(" ");

        self.context.iter().any(|term| {
            if term.contains(' ') {
                joined.contains(term.as_str())
            } else {
                window.iter().any(|w| w == term)
            }
        })
    }

    fn score_with_context(&self, text: &str, span: Span, base: f64) -> f64 {
        if self.has_context(text, span.start) {
            (base + CONTEXT_BOOST).clamp(CONTEXT_MIN_SCORE, 1.0)
        } else {
            base
        }
    }
}

impl Recognizer for PatternRecognizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> &str {
        &self.category
    }

    fn recognize(&self, text: &str) -> Vec<Candidate> {
        self.rules
            .iter()
            .flat_map(|rule| rule.spans(text).map(move |span| (rule, span)))
            .filter_map(|(rule, span)| {
                let source_text = span.slice(text)?.to_string();
                Some(Candidate {
                    category: self.category.clone(),
                    span,
                    score: self.score_with_context(text, span, rule.score),
                    source_text,
                })
            })
            .collect()
    }
}
