//! # Sampling in-context examples
//!
//! Training instances are grouped by the output of their first correct reference (their label). Labeled groups are
//! shuffled, then groups are visited round-robin, largest first, so the front of the sample covers as many labels as
//! possible. Prompt truncation drops examples from the back, which keeps that label spread intact.
//!
//! ## Determinism
//! The permutation of every group is a Fisher–Yates shuffle: for `i` from `len - 1` down to `1`, draw `j` uniformly
//! from `0..=i` and swap positions `i` and `j`. Draws come from a [ChaCha8Rng] seeded with the trial seed. Both the
//! algorithm and the ChaCha stream are fixed, so the same pool and seed produce the same sample on every platform
//! and every run.

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::scenario::Instance;

/// In-place Fisher–Yates shuffle driven by `rng`.
pub fn seeded_shuffle<T>(items: &mut [T], rng: &mut ChaCha8Rng) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// Pick up to `max_train_instances` examples from `all_train_instances`, spreading labels over the front.
///
/// Returns `min(max_train_instances, all_train_instances.len())` instances. Instances without a correct reference
/// share one group that keeps its input order.
pub fn sample_examples(all_train_instances: &[Instance], max_train_instances: usize, seed: u64) -> Vec<&Instance> {
    let num_to_sample = max_train_instances.min(all_train_instances.len());
    if num_to_sample == 0 {
        return Vec::new();
    }

    // groups in order of first appearance; `None` is the unlabeled group
    let mut group_index: HashMap<Option<&str>, usize> = HashMap::new();
    let mut groups: Vec<(Option<&str>, Vec<&Instance>)> = Vec::new();
    for instance in all_train_instances {
        let label = instance.first_correct_reference().map(|reference| reference.output.as_str());
        let idx = *group_index.entry(label).or_insert_with(|| {
            groups.push((label, Vec::new()));
            groups.len() - 1
        });
        groups[idx].1.push(instance);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for (label, members) in groups.iter_mut() {
        if label.is_some() {
            seeded_shuffle(members, &mut rng);
        }
    }
    // stable, so equally sized groups keep their order of first appearance
    groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    let mut cursors: Vec<_> = groups.into_iter().map(|(_, members)| members.into_iter()).collect();
    let mut examples = Vec::with_capacity(num_to_sample);
    while examples.len() < num_to_sample {
        for cursor in cursors.iter_mut() {
            if let Some(instance) = cursor.next() {
                examples.push(instance);
                if examples.len() == num_to_sample {
                    break;
                }
            }
        }
    }
    examples
}

#[cfg(test)]
mod test_sampling {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::{sample_examples, seeded_shuffle};
    use crate::scenario::{Instance, Reference};

    fn labeled(input: &str, label: &str) -> Instance {
        Instance::new(input, vec![Reference::correct(label)])
    }

    fn yes_no_pool() -> Vec<Instance> {
        vec![
            labeled("say no", "no"),
            labeled("say yes1", "yes"),
            labeled("say yes2", "yes"),
            labeled("say yes3", "yes"),
            labeled("say yes4", "yes"),
        ]
    }

    fn labels(examples: &[&Instance]) -> Vec<String> {
        examples.iter().map(|i| i.first_correct_reference().unwrap().output.clone()).collect()
    }

    #[test]
    fn test_diversity_ordering() {
        let pool = yes_no_pool();
        let examples = sample_examples(&pool, 4, 0);
        assert_eq!(vec!["yes", "no", "yes", "yes"], labels(&examples));
        // no instance is picked twice
        for (i, a) in examples.iter().enumerate() {
            for b in &examples[i + 1..] {
                assert_ne!(a.input, b.input);
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let pool: Vec<Instance> = (0..50).map(|i| labeled(&format!("q{}", i), &format!("l{}", i % 7))).collect();
        for seed in [0, 1, 42] {
            let first = sample_examples(&pool, 10, seed);
            let second = sample_examples(&pool, 10, seed);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_seed_changes_sample() {
        let pool: Vec<Instance> = (0..50).map(|i| labeled(&format!("q{}", i), "same")).collect();
        let draws: Vec<Vec<&Instance>> = (0..4).map(|seed| sample_examples(&pool, 10, seed)).collect();
        assert!(draws.windows(2).any(|pair| pair[0] != pair[1]));
    }

    #[test]
    fn test_count_bounds() {
        let pool = yes_no_pool();
        for max_train_instances in 0..8 {
            let examples = sample_examples(&pool, max_train_instances, 3);
            assert_eq!(max_train_instances.min(pool.len()), examples.len());
        }
    }

    #[test]
    fn test_empty_pool() {
        assert!(sample_examples(&[], 2, 0).is_empty());
    }

    #[test]
    fn test_greater_max_train_instances() {
        let pool = vec![labeled("say no", "no"), labeled("say yes", "yes"), labeled("say yes", "yes")];
        let examples = sample_examples(&pool, 10, 0);
        assert_eq!(3, examples.len());
        // diversity ordered, not input order
        assert_eq!(vec!["yes", "no", "yes"], labels(&examples));
    }

    #[test]
    fn test_without_references() {
        let pool = vec![
            Instance::new("prompt1", vec![]),
            Instance::new("prompt2", vec![]),
            Instance::new("prompt3", vec![]),
        ];
        let examples = sample_examples(&pool, 1, 0);
        assert_eq!(1, examples.len());
        assert_eq!("prompt1", examples[0].input);

        let inputs: Vec<&str> = sample_examples(&pool, 3, 9).iter().map(|i| i.input.as_str()).collect();
        assert_eq!(vec!["prompt1", "prompt2", "prompt3"], inputs);
    }

    #[test]
    fn test_unlabeled_group_joins_round_robin() {
        let pool = vec![
            Instance::new("free text", vec![Reference::incorrect("meh")]),
            labeled("a1", "a"),
            labeled("a2", "a"),
        ];
        let examples = sample_examples(&pool, 3, 0);
        assert_eq!("free text", examples[1].input);
    }

    #[test]
    fn test_seeded_shuffle_is_permutation() {
        let mut items: Vec<u32> = (0..20).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        seeded_shuffle(&mut items, &mut rng);
        let mut sorted = items.clone();
        sorted.sort();
        assert_eq!((0..20).collect::<Vec<u32>>(), sorted);

        let mut again: Vec<u32> = (0..20).collect();
        seeded_shuffle(&mut again, &mut ChaCha8Rng::seed_from_u64(7));
        assert_eq!(items, again);
    }
}
