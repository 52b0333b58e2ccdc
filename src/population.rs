#![forbid(unsafe_code)]

// Turns per-class client counts into the ordered population for a run.

use crate::identity::IdentitySource;
use serde::{Deserialize, Serialize};

/// What kind of participant a simulated client pretends to be. The class
/// decides which optional join steps run (unmute check, webcam share).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientClass {
    /// Publishes webcam and microphone.
    CameraMic,
    /// Microphone only.
    MicOnly,
    /// Joins listen-only, publishes nothing.
    ListenOnly,
}

impl ClientClass {
    pub fn wants_video(self) -> bool {
        matches!(self, ClientClass::CameraMic)
    }

    pub fn wants_audio(self) -> bool {
        matches!(self, ClientClass::CameraMic | ClientClass::MicOnly)
    }

    pub fn name(self) -> &'static str {
        match self {
            ClientClass::CameraMic => "camera+mic",
            ClientClass::MicOnly => "mic-only",
            ClientClass::ListenOnly => "listen-only",
        }
    }
}

/// How many clients of each class to generate. Zero counts are valid.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassCounts {
    pub cameras: usize,
    pub microphones: usize,
    pub listeners: usize,
}

impl ClassCounts {
    pub fn total(&self) -> usize {
        self.cameras + self.microphones + self.listeners
    }
}

/// One simulated participant. Immutable once generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub identity: String,
    pub class: ClientClass,
    pub wants_video: bool,
    pub wants_audio: bool,
}

impl ClientConfig {
    pub fn new(identity: String, class: ClientClass) -> Self {
        Self {
            identity,
            class,
            wants_video: class.wants_video(),
            wants_audio: class.wants_audio(),
        }
    }
}

/// Builds the run's population: camera+mic block, then mic-only block, then
/// listen-only block. Block order is kept stable so reports group naturally.
pub fn generate_population(counts: &ClassCounts, identities: &dyn IdentitySource) -> Vec<ClientConfig> {
    let mut population = Vec::with_capacity(counts.total());
    let blocks = [
        (ClientClass::CameraMic, counts.cameras),
        (ClientClass::MicOnly, counts.microphones),
        (ClientClass::ListenOnly, counts.listeners),
    ];
    for (class, count) in blocks {
        for _ in 0..count {
            population.push(ClientConfig::new(identities.display_name(), class));
        }
    }
    population
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct SequentialNames(AtomicU32);

    impl IdentitySource for SequentialNames {
        fn display_name(&self) -> String {
            format!("user-{}", self.0.fetch_add(1, Ordering::Relaxed))
        }
    }

    fn counts(cameras: usize, microphones: usize, listeners: usize) -> ClassCounts {
        ClassCounts {
            cameras,
            microphones,
            listeners,
        }
    }

    #[test]
    fn test_population_size_is_sum_of_counts() {
        let ids = SequentialNames(AtomicU32::new(0));
        for (c, m, l) in [(0, 0, 0), (1, 0, 0), (2, 3, 4), (0, 5, 0)] {
            let population = generate_population(&counts(c, m, l), &ids);
            assert_eq!(population.len(), c + m + l);
        }
    }

    #[test]
    fn test_class_flags_match_requesting_class() {
        let ids = SequentialNames(AtomicU32::new(0));
        let population = generate_population(&counts(2, 2, 2), &ids);

        for client in &population[0..2] {
            assert_eq!(client.class, ClientClass::CameraMic);
            assert!(client.wants_video && client.wants_audio);
        }
        for client in &population[2..4] {
            assert_eq!(client.class, ClientClass::MicOnly);
            assert!(!client.wants_video && client.wants_audio);
        }
        for client in &population[4..6] {
            assert_eq!(client.class, ClientClass::ListenOnly);
            assert!(!client.wants_video && !client.wants_audio);
        }
    }

    #[test]
    fn test_identities_are_fresh_per_client() {
        let ids = SequentialNames(AtomicU32::new(0));
        let population = generate_population(&counts(3, 3, 3), &ids);
        let mut names: Vec<&str> = population.iter().map(|c| c.identity.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 9);
    }

    #[test]
    fn test_zero_counts_yield_empty_population() {
        let ids = SequentialNames(AtomicU32::new(0));
        assert!(generate_population(&counts(0, 0, 0), &ids).is_empty());
    }
}
