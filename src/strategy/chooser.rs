//! Choice policies over feasible candidates

use crate::requirement::RequirementInformation;
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, RngCore};
use std::collections::HashMap;
use std::fmt;

/// A feasible option with the requirements it would carry
#[derive(Debug, Clone)]
pub struct Candidate {
    pub key: String,
    pub requirements: RequirementInformation,
}

impl Candidate {
    pub fn new(key: impl Into<String>, requirements: RequirementInformation) -> Self {
        Self {
            key: key.into(),
            requirements,
        }
    }
}

pub trait Chooser: Send + Sync + fmt::Debug {
    /// Index of the picked option, `None` for an empty slice
    fn choose(&self, options: &[Candidate], rng: &mut dyn RngCore) -> Option<usize>;
}

/// Uniform choice
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomChooser;

impl Chooser for RandomChooser {
    fn choose(&self, options: &[Candidate], rng: &mut dyn RngCore) -> Option<usize> {
        if options.is_empty() {
            None
        } else {
            Some(rng.gen_range(0..options.len()))
        }
    }
}

/// Choice weighted by a per-key bias; unlisted keys get `fallback`
#[derive(Debug, Clone)]
pub struct BiasedChooser {
    bias: HashMap<String, f64>,
    fallback: f64,
}

impl BiasedChooser {
    pub fn new(bias: HashMap<String, f64>) -> Self {
        Self { bias, fallback: 1.0 }
    }

    pub fn with_fallback(mut self, fallback: f64) -> Self {
        self.fallback = fallback;
        self
    }
}

impl Chooser for BiasedChooser {
    fn choose(&self, options: &[Candidate], rng: &mut dyn RngCore) -> Option<usize> {
        if options.is_empty() {
            return None;
        }
        let weights: Vec<f64> = options
            .iter()
            .map(|o| self.bias.get(&o.key).copied().unwrap_or(self.fallback).max(0.0))
            .collect();
        match WeightedIndex::new(&weights) {
            Ok(dist) => Some(dist.sample(rng)),
            // all weights zero
            Err(_) => RandomChooser.choose(options, rng),
        }
    }
}

/// Prefers options whose requirements can all still be met; otherwise
/// the options with the fewest unmet requirements. Ties go to `inner`.
#[derive(Debug)]
pub struct DegreeOfFreedomChooser {
    inner: Box<dyn Chooser>,
}

impl Default for DegreeOfFreedomChooser {
    fn default() -> Self {
        Self::new(Box::new(RandomChooser))
    }
}

impl DegreeOfFreedomChooser {
    pub fn new(inner: Box<dyn Chooser>) -> Self {
        Self { inner }
    }
}

impl Chooser for DegreeOfFreedomChooser {
    fn choose(&self, options: &[Candidate], rng: &mut dyn RngCore) -> Option<usize> {
        let fulfilling: Vec<usize> = options
            .iter()
            .enumerate()
            .filter(|(_, o)| o.requirements.fulfills_all())
            .map(|(i, _)| i)
            .collect();
        let pool = if fulfilling.is_empty() {
            let fewest = options.iter().map(|o| o.requirements.unmet()).min()?;
            options
                .iter()
                .enumerate()
                .filter(|(_, o)| o.requirements.unmet() == fewest)
                .map(|(i, _)| i)
                .collect()
        } else {
            fulfilling
        };
        let subset: Vec<Candidate> = pool.iter().map(|&i| options[i].clone()).collect();
        self.inner.choose(&subset, rng).map(|i| pool[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirement::{Requirement, RequirementInformation};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn plain(key: &str) -> Candidate {
        Candidate::new(key, RequirementInformation::new())
    }

    fn unmet(key: &str, count: usize) -> Candidate {
        let mut info = RequirementInformation::new();
        for _ in 0..count {
            let mut r = Requirement::data_write(crate::tree::SlotRef::new("s", "x"));
            r.dof = 0;
            info.add(r);
        }
        Candidate::new(key, info)
    }

    #[test]
    fn test_random_covers_all_options() {
        let options = vec![plain("a"), plain("b"), plain("c")];
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen = [false; 3];
        for _ in 0..200 {
            seen[RandomChooser.choose(&options, &mut rng).unwrap()] = true;
        }
        assert!(seen.iter().all(|s| *s));
        assert_eq!(RandomChooser.choose(&[], &mut rng), None);
    }

    #[test]
    fn test_biased_skips_zero_weight() {
        let chooser = BiasedChooser::new(HashMap::from([("never".to_string(), 0.0)]));
        let options = vec![plain("never"), plain("often")];
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            assert_eq!(chooser.choose(&options, &mut rng), Some(1));
        }
    }

    #[test]
    fn test_biased_all_zero_falls_back_to_uniform() {
        let chooser = BiasedChooser::new(HashMap::new()).with_fallback(0.0);
        let options = vec![plain("a"), plain("b")];
        let mut rng = StdRng::seed_from_u64(3);
        assert!(chooser.choose(&options, &mut rng).is_some());
    }

    #[test]
    fn test_dof_prefers_fulfilling() {
        let chooser = DegreeOfFreedomChooser::default();
        let options = vec![unmet("bad", 1), plain("good"), unmet("worse", 2)];
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..50 {
            assert_eq!(chooser.choose(&options, &mut rng), Some(1));
        }
    }

    #[test]
    fn test_dof_falls_back_to_fewest_unmet() {
        let chooser = DegreeOfFreedomChooser::default();
        let options = vec![unmet("two", 2), unmet("one", 1), unmet("three", 3)];
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..50 {
            assert_eq!(chooser.choose(&options, &mut rng), Some(1));
        }
    }
}
