use crate::models::Candidate;
use config_engine::{DenyListSettings, DenyMatchMode, PhiSettings, ThresholdSettings};
use error_common::{PhiError, Result};
use regex::{Regex, RegexBuilder};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Compiled deny list of one category
#[derive(Debug, Clone)]
pub struct DenyList {
    mode: DenyMatchMode,
    lowered: Vec<String>,
    exact: HashSet<String>,
    // One alternation over all terms, only for word-boundary lists
    bounded: Option<Regex>,
}

impl DenyList {
    /// # Errors
    ///
    /// `Configuration` if the word-boundary pattern cannot be compiled.
    pub fn compile(category: &str, settings: &DenyListSettings) -> Result<Self> {
        let lowered: Vec<String> = settings.terms.iter().map(|t| t.to_lowercase()).collect();

        let bounded = if settings.mode == DenyMatchMode::WordBoundary && !lowered.is_empty() {
            let alternation = settings
                .terms
                .iter()
                .map(|term| regex::escape(term))
                .collect::<Vec<_>>()
                .join("|");
            let regex = RegexBuilder::new(&format!(r"\b(?:{alternation})\b"))
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    PhiError::configuration(format!("deny list for {category} does not compile: {e}"))
                })?;
            Some(regex)
        } else {
            None
        };

        Ok(Self {
            mode: settings.mode,
            exact: lowered.iter().cloned().collect(),
            lowered,
            bounded,
        })
    }

    pub fn mode(&self) -> DenyMatchMode {
        self.mode
    }

    pub fn matches(&self, surface: &str) -> bool {
        match self.mode {
            DenyMatchMode::Exact => self.exact.contains(&surface.trim().to_lowercase()),
            DenyMatchMode::WordBoundary => self
                .bounded
                .as_ref()
                .is_some_and(|regex| regex.is_match(surface)),
            DenyMatchMode::Substring => {
                let lowered = surface.to_lowercase();
                self.lowered.iter().any(|term| lowered.contains(term.as_str()))
            }
        }
    }
}

/// Per-category deny lists; categories without a list are never denied
#[derive(Debug, Clone, Default)]
pub struct DenyListTable {
    lists: HashMap<String, DenyList>,
}

impl DenyListTable {
    /// # Errors
    ///
    /// `Configuration` if any list fails to compile.
    pub fn from_settings(settings: &BTreeMap<String, DenyListSettings>) -> Result<Self> {
        let lists = settings
            .iter()
            .map(|(category, list)| Ok((category.clone(), DenyList::compile(category, list)?)))
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(Self { lists })
    }

    pub fn get(&self, category: &str) -> Option<&DenyList> {
        self.lists.get(category)
    }

    pub fn is_denied(&self, category: &str, surface: &str) -> bool {
        self.lists
            .get(category)
            .is_some_and(|list| list.matches(surface))
    }
}

/// Threshold and deny-list gate between the detector and redaction.
///
/// Built once from settings and shared read-only; a calibration run
/// replaces the whole filter rather than editing it.
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    thresholds: ThresholdSettings,
    deny_lists: DenyListTable,
}

impl CandidateFilter {
    pub fn new(thresholds: ThresholdSettings, deny_lists: DenyListTable) -> Self {
        Self {
            thresholds,
            deny_lists,
        }
    }

    /// # Errors
    ///
    /// `Configuration` if a deny list fails to compile.
    pub fn from_settings(settings: &PhiSettings) -> Result<Self> {
        Ok(Self::new(
            settings.thresholds.clone(),
            DenyListTable::from_settings(&settings.deny_lists)?,
        ))
    }

    pub fn thresholds(&self) -> &ThresholdSettings {
        &self.thresholds
    }

    pub fn deny_lists(&self) -> &DenyListTable {
        &self.deny_lists
    }

    pub fn threshold_for(&self, category: &str) -> f64 {
        self.thresholds.threshold_for(category)
    }

    /// A score equal to the threshold is kept
    pub fn admits(&self, candidate: &Candidate) -> bool {
        if candidate.score < self.threshold_for(&candidate.category) {
            return false;
        }
        !self
            .deny_lists
            .is_denied(&candidate.category, &candidate.source_text)
    }

    /// Keep admitted candidates in their original order
    pub fn filter(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let before = candidates.len();
        let kept: Vec<Candidate> = candidates.into_iter().filter(|c| self.admits(c)).collect();
        tracing::debug!(before, after = kept.len(), "Filtered candidates");
        kept
    }
}
