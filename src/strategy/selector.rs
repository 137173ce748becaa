//! Selection among several strategies serving the same request

use super::{Candidate, Chooser, CreationInformation, DegreeOfFreedomChooser, Strategy, StrategyContext};
use crate::requirement::RequirementInformation;
use crate::tree::TreeNode;
use lru::LruCache;
use rand::RngCore;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Memoized `can_create_verbose` answers keyed by strategy name and request
/// signature
#[derive(Debug)]
pub struct FeasibilityCache {
    entries: Mutex<LruCache<String, Option<RequirementInformation>>>,
}

impl FeasibilityCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get_or_compute(
        &self,
        key: String,
        compute: impl FnOnce() -> Option<RequirementInformation>,
    ) -> Option<RequirementInformation> {
        if let Ok(mut entries) = self.entries.lock() {
            if let Some(hit) = entries.get(&key) {
                return hit.clone();
            }
        }
        let answer = compute();
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(key, answer.clone());
        }
        answer
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

/// Filters its options by feasibility, then lets the chooser pick. A
/// failed construction removes the option and the next one is tried.
#[derive(Debug)]
pub struct SelectorStrategy {
    name: String,
    options: Vec<Arc<dyn Strategy>>,
    chooser: Box<dyn Chooser>,
    cache: Option<Arc<FeasibilityCache>>,
}

impl SelectorStrategy {
    pub fn new(name: impl Into<String>, options: Vec<Arc<dyn Strategy>>) -> Self {
        Self {
            name: name.into(),
            options,
            chooser: Box::new(DegreeOfFreedomChooser::default()),
            cache: None,
        }
    }

    pub fn with_chooser(mut self, chooser: Box<dyn Chooser>) -> Self {
        self.chooser = chooser;
        self
    }

    pub fn with_cache(mut self, cache: Arc<FeasibilityCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn options(&self) -> &[Arc<dyn Strategy>] {
        &self.options
    }

    fn check(&self, option: &Arc<dyn Strategy>, info: &CreationInformation, ctx: &StrategyContext<'_>) -> Option<RequirementInformation> {
        match &self.cache {
            Some(cache) => cache.get_or_compute(format!("{}#{}", option.name(), info.signature()), || {
                option.can_create_verbose(info, ctx)
            }),
            None => option.can_create_verbose(info, ctx),
        }
    }

    /// Feasible options with the requirements each would carry
    pub fn feasible(&self, info: &CreationInformation, ctx: &StrategyContext<'_>) -> Vec<(usize, Candidate)> {
        self.options
            .iter()
            .enumerate()
            .filter_map(|(i, option)| {
                self.check(option, info, ctx)
                    .map(|requirements| (i, Candidate::new(option.name(), requirements)))
            })
            .collect()
    }
}

impl Strategy for SelectorStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    /// The requirements of the best feasible option
    fn can_create(&self, info: &CreationInformation, ctx: &StrategyContext<'_>) -> Option<RequirementInformation> {
        self.options
            .iter()
            .filter_map(|o| o.can_create(info, ctx))
            .min_by_key(RequirementInformation::unmet)
    }

    fn can_create_verbose(&self, info: &CreationInformation, ctx: &StrategyContext<'_>) -> Option<RequirementInformation> {
        self.feasible(info, ctx)
            .into_iter()
            .map(|(_, c)| c.requirements)
            .min_by_key(RequirementInformation::unmet)
    }

    fn create(&self, info: &CreationInformation, ctx: &StrategyContext<'_>, rng: &mut dyn RngCore) -> Option<TreeNode> {
        let mut feasible = self.feasible(info, ctx);
        while !feasible.is_empty() {
            let candidates: Vec<Candidate> = feasible.iter().map(|(_, c)| c.clone()).collect();
            let pick = self.chooser.choose(&candidates, rng)?;
            let (index, _) = feasible.swap_remove(pick);
            if let Some(node) = self.options[index].create(info, ctx, rng) {
                return Some(node);
            }
        }
        log::trace!("{}: nothing feasible for {} at depth {}", self.name, info.expected, info.depth);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_memoizes_answers() {
        let cache = FeasibilityCache::new(2);
        let mut calls = 0;
        for _ in 0..3 {
            cache.get_or_compute("a".into(), || {
                calls += 1;
                None
            });
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_evicts_least_recent() {
        let cache = FeasibilityCache::new(1);
        cache.get_or_compute("a".into(), || Some(RequirementInformation::new()));
        cache.get_or_compute("b".into(), || None);
        let mut recomputed = false;
        cache.get_or_compute("a".into(), || {
            recomputed = true;
            None
        });
        assert!(recomputed);
        cache.clear();
        assert!(cache.is_empty());
    }
}
