use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{MatchMode, ProjectConfig};
use crate::normalize::{strip_quotes_space, tag_key};
use crate::vocabulary::Vocabulary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ResolutionSource {
    Override,
    Cache,
    Exact,
    Nearest { distance: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    Empty,
    DiscardList,
    Unmatched,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Canonical {
        tag: String,
        source: ResolutionSource,
    },
    Discarded {
        reason: DiscardReason,
    },
}

impl Resolution {
    pub fn canonical(&self) -> Option<&str> {
        match self {
            Self::Canonical { tag, .. } => Some(tag),
            Self::Discarded { .. } => None,
        }
    }
}

/// Run-scoped memory of raw tag -> canonical tag. `None` records a raw tag
/// that matched nothing.
///
/// Entries are only ever added, so a raw tag resolves the same way for the
/// remainder of the run once it has been seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CorrectionCache {
    entries: BTreeMap<String, Option<String>>,
}

impl CorrectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(corrections: &BTreeMap<String, String>, vocabulary: &Vocabulary) -> Self {
        let mut cache = Self::new();
        for (raw, target) in corrections {
            let canonical = tag_key(target);
            if !vocabulary.contains(&canonical) {
                warn!(raw = %raw, target = %target, "dropping seeded correction to unknown tag");
                continue;
            }
            cache.record(&cache_key(raw), Some(canonical));
        }
        if !cache.is_empty() {
            info!(entries = cache.len(), "seeded correction cache");
        }
        cache
    }

    fn get(&self, key: &str) -> Option<Option<&str>> {
        self.entries.get(key).map(|value| value.as_deref())
    }

    fn record(&mut self, key: &str, canonical: Option<String>) {
        self.entries.entry(key.to_string()).or_insert(canonical);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(raw, canonical)| (raw.as_str(), canonical.as_deref()))
    }

    pub fn unresolved(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, canonical)| canonical.is_none())
            .map(|(raw, _)| raw.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionTally {
    pub exact: usize,
    pub overridden: usize,
    pub cached: usize,
    pub nearest: usize,
    pub discard_listed: usize,
    pub unmatched: usize,
}

impl ResolutionTally {
    pub fn record(&mut self, resolution: &Resolution) {
        match resolution {
            Resolution::Canonical { source, .. } => match source {
                ResolutionSource::Exact => self.exact += 1,
                ResolutionSource::Override => self.overridden += 1,
                ResolutionSource::Cache => self.cached += 1,
                ResolutionSource::Nearest { .. } => self.nearest += 1,
            },
            Resolution::Discarded { reason } => match reason {
                DiscardReason::Empty => {}
                DiscardReason::DiscardList => self.discard_listed += 1,
                DiscardReason::Unmatched => self.unmatched += 1,
            },
        }
    }

    pub fn absorb(&mut self, other: &ResolutionTally) {
        self.exact += other.exact;
        self.overridden += other.overridden;
        self.cached += other.cached;
        self.nearest += other.nearest;
        self.discard_listed += other.discard_listed;
        self.unmatched += other.unmatched;
    }

    pub fn resolved(&self) -> usize {
        self.exact + self.overridden + self.cached + self.nearest
    }

    pub fn discarded(&self) -> usize {
        self.discard_listed + self.unmatched
    }
}

#[derive(Debug, Clone)]
struct TagMatcher {
    pattern: String,
    mode: MatchMode,
}

impl TagMatcher {
    fn new(pattern: &str, mode: MatchMode) -> Option<Self> {
        let pattern = tag_key(pattern);
        if pattern.is_empty() {
            return None;
        }
        Some(Self { pattern, mode })
    }

    fn matches(&self, key: &str) -> bool {
        match self.mode {
            MatchMode::Exact => key == self.pattern,
            MatchMode::Contains => key.contains(&self.pattern),
        }
    }
}

#[derive(Debug)]
pub struct Reconciler<'a> {
    vocabulary: &'a Vocabulary,
    discard: Vec<TagMatcher>,
    overrides: Vec<(TagMatcher, String)>,
}

impl<'a> Reconciler<'a> {
    pub fn new(vocabulary: &'a Vocabulary, config: &ProjectConfig) -> Self {
        let mut discard = Vec::with_capacity(config.discard.len());
        for rule in &config.discard {
            match TagMatcher::new(&rule.pattern, rule.mode) {
                Some(matcher) => discard.push(matcher),
                None => warn!(pattern = %rule.pattern, "ignoring empty discard rule"),
            }
        }

        let mut overrides = Vec::with_capacity(config.overrides.len());
        for rule in &config.overrides {
            let canonical = tag_key(&rule.canonical);
            if !vocabulary.contains(&canonical) {
                warn!(
                    pattern = %rule.pattern,
                    canonical = %rule.canonical,
                    "ignoring override whose target is not in the codebook"
                );
                continue;
            }
            match TagMatcher::new(&rule.pattern, rule.mode) {
                Some(matcher) => overrides.push((matcher, canonical)),
                None => warn!(canonical = %rule.canonical, "ignoring override with empty pattern"),
            }
        }

        Self {
            vocabulary,
            discard,
            overrides,
        }
    }

    pub fn resolve(&self, raw: &str, cache: &mut CorrectionCache) -> Resolution {
        let raw_key = cache_key(raw);
        let key = tag_key(&raw_key);
        if key.is_empty() {
            return Resolution::Discarded {
                reason: DiscardReason::Empty,
            };
        }

        if self.discard.iter().any(|matcher| matcher.matches(&key)) {
            debug!(raw = %raw_key, "discarding tag on discard list");
            return Resolution::Discarded {
                reason: DiscardReason::DiscardList,
            };
        }

        if let Some((_, canonical)) = self.overrides.iter().find(|(matcher, _)| matcher.matches(&key)) {
            cache.record(&raw_key, Some(canonical.clone()));
            return Resolution::Canonical {
                tag: canonical.clone(),
                source: ResolutionSource::Override,
            };
        }

        if let Some(cached) = cache.get(&raw_key) {
            return match cached {
                Some(canonical) => {
                    if canonical != key {
                        debug!(raw = %raw_key, canonical = %canonical, "using cached correction");
                    }
                    Resolution::Canonical {
                        tag: canonical.to_string(),
                        source: ResolutionSource::Cache,
                    }
                }
                None => {
                    debug!(raw = %raw_key, "tag previously found unmatched");
                    Resolution::Discarded {
                        reason: DiscardReason::Unmatched,
                    }
                }
            };
        }

        if self.vocabulary.contains(&key) {
            cache.record(&raw_key, Some(key.clone()));
            return Resolution::Canonical {
                tag: key,
                source: ResolutionSource::Exact,
            };
        }

        match self.nearest(&key) {
            Some((canonical, distance)) => {
                info!(raw = %raw_key, canonical = %canonical, distance, "replacing tag with nearest codebook entry");
                cache.record(&raw_key, Some(canonical.to_string()));
                Resolution::Canonical {
                    tag: canonical.to_string(),
                    source: ResolutionSource::Nearest { distance },
                }
            }
            None => {
                warn!(raw = %raw_key, "no codebook entry for tag; dropping it");
                cache.record(&raw_key, None);
                Resolution::Discarded {
                    reason: DiscardReason::Unmatched,
                }
            }
        }
    }

    // Strict `<` keeps the earliest codebook entry when distances tie.
    fn nearest(&self, key: &str) -> Option<(&str, usize)> {
        let mut best: Option<(&str, usize)> = None;
        for candidate in self.vocabulary.entries() {
            let distance = strsim::levenshtein(key, candidate);
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((candidate.as_str(), distance)),
            }
        }
        best
    }
}

fn cache_key(raw: &str) -> String {
    strip_quotes_space(raw)
}
