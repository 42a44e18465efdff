//! Envelope-against-criterion matching.

use crate::criteria::CriterionKind;
use rep_core::EventEnvelope;
use std::collections::HashMap;

/// Compiles and caches the regexes behind `*RegexEntityIds` criteria, so a
/// busy stream doesn't recompile a pattern on every envelope.
#[derive(Default)]
pub struct RegexCache {
    compiled: HashMap<String, regex::Regex>,
}

impl RegexCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_compile(&mut self, pattern: &str) -> Option<&regex::Regex> {
        if !self.compiled.contains_key(pattern) {
            match regex::Regex::new(pattern) {
                Ok(re) => {
                    self.compiled.insert(pattern.to_owned(), re);
                }
                Err(err) => {
                    tracing::warn!(pattern, %err, "invalid regex entity-id criterion, treating as non-matching");
                    return None;
                }
            }
        }
        self.compiled.get(pattern)
    }

    fn any_matches(&mut self, patterns: &[String], pid: &str) -> bool {
        patterns.iter().any(|p| self.get_or_compile(p).is_some_and(|re| re.is_match(pid)))
    }
}

/// Returns whether `env` matches `criterion`, per spec.md §4.3:
/// - `Exclude/IncludeTags` match on the envelope's tag set (any-of).
/// - `Exclude/IncludeEntityIds` match on literal `pid` equality.
/// - `Exclude/IncludeRegexEntityIds` match on regex.
pub fn matches(criterion: &CriterionKind, env: &EventEnvelope, regex_cache: &mut RegexCache) -> bool {
    match criterion {
        CriterionKind::ExcludeTags(tags) | CriterionKind::IncludeTags(tags) => {
            tags.iter().any(|t| env.tags.contains(t))
        }
        CriterionKind::ExcludeEntityIds(ids) => ids.contains(&env.persistence_id),
        CriterionKind::IncludeEntityIds(ids) => {
            ids.iter().any(|c| c.persistence_id == env.persistence_id)
        }
        CriterionKind::ExcludeRegexEntityIds(patterns) | CriterionKind::IncludeRegexEntityIds(patterns) => {
            regex_cache.any_matches(patterns, &env.persistence_id)
        }
    }
}
