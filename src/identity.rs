#![forbid(unsafe_code)]

// Display-name generation for simulated participants.

use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};

/// Produces a display name for each simulated participant. Names must be
/// unique within a run; the meeting server keys participants by them.
pub trait IdentitySource: Send + Sync {
    fn display_name(&self) -> String;
}

const ADJECTIVES: &[&str] = &[
    "Brave", "Calm", "Clever", "Eager", "Gentle", "Happy", "Jolly", "Keen", "Lively", "Merry",
    "Nimble", "Proud", "Quick", "Quiet", "Sharp", "Shy", "Swift", "Tidy", "Witty", "Zesty",
];

const NOUNS: &[&str] = &[
    "Falcon", "Otter", "Badger", "Heron", "Lynx", "Marmot", "Osprey", "Puffin", "Raven", "Stoat",
    "Tapir", "Vole", "Walrus", "Wombat", "Condor", "Dingo", "Gecko", "Ibis", "Jackal", "Kiwi",
];

/// Random adjective-noun names with a monotonic suffix. The suffix is what
/// actually guarantees in-run uniqueness; the words are just for readable
/// server-side participant lists.
pub struct RandomNameSource {
    counter: AtomicU32,
}

impl RandomNameSource {
    pub fn new() -> Self {
        Self {
            counter: AtomicU32::new(1),
        }
    }
}

impl Default for RandomNameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentitySource for RandomNameSource {
    fn display_name(&self) -> String {
        let mut rng = rand::thread_rng();
        let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
        let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{adjective} {noun} {n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique_within_a_run() {
        let source = RandomNameSource::new();
        let names: HashSet<String> = (0..500).map(|_| source.display_name()).collect();
        assert_eq!(names.len(), 500);
    }

    #[test]
    fn test_names_are_non_empty_words() {
        let source = RandomNameSource::new();
        let name = source.display_name();
        assert_eq!(name.split_whitespace().count(), 3);
    }
}
