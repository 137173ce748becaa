//! Population seeding on scoped worker threads
//!
//! Each worker owns its trees and a [`StdRng`] seeded from the base seed and
//! its index, so a given seed and worker count reproduce the same
//! population.

use crate::error::{Error, Result};
use crate::operators::{AdditiveMutator, Mutator};
use crate::strategy::MasterStrategy;
use crate::tree::TreeNode;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::thread;

fn split(count: usize, workers: usize) -> Vec<usize> {
    let workers = workers.clamp(1, count.max(1));
    (0..workers)
        .map(|i| count / workers + usize::from(i < count % workers))
        .collect()
}

fn run<F>(count: usize, workers: usize, seed: u64, job: F) -> Result<Vec<TreeNode>>
where
    F: Fn(&mut StdRng) -> Result<TreeNode> + Sync,
{
    let shares = split(count, workers);
    let job = &job;
    let batches: Vec<Result<Vec<TreeNode>>> = thread::scope(|scope| {
        let handles: Vec<_> = shares
            .iter()
            .enumerate()
            .map(|(i, &share)| {
                scope.spawn(move || {
                    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                    (0..share).map(|_| job(&mut rng)).collect::<Result<Vec<_>>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|_| Err(Error::Other("population worker panicked".into()))))
            .collect()
    });
    let mut population = Vec::with_capacity(count);
    for batch in batches {
        population.extend(batch?);
    }
    log::info!("seeded {} individuals on {} workers", population.len(), shares.len());
    Ok(population)
}

/// `count` individuals each derived from `original` by additive creation
pub fn seed_population(
    additive: &AdditiveMutator,
    original: &TreeNode,
    count: usize,
    workers: usize,
    seed: u64,
) -> Result<Vec<TreeNode>> {
    run(count, workers, seed, |rng| additive.mutate(original, rng))
}

/// `count` fresh programs of the grammar's root type
pub fn random_population(master: &MasterStrategy, count: usize, workers: usize, seed: u64) -> Result<Vec<TreeNode>> {
    run(count, workers, seed, |rng| master.generate(rng))
}
