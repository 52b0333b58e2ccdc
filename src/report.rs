#![forbid(unsafe_code)]

// Per-client outcomes and the run-level summary built from them.

use crate::population::ClientConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Terminal state of one simulated client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum JoinOutcome {
    Joined,
    Failed { step: String, reason: String },
}

impl JoinOutcome {
    pub fn is_joined(&self) -> bool {
        matches!(self, JoinOutcome::Joined)
    }
}

/// Exactly one of these exists per requested client per run. Never mutated
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinAttemptResult {
    pub config: ClientConfig,
    pub outcome: JoinOutcome,
    pub duration_ms: u64,
}

impl JoinAttemptResult {
    pub fn joined(config: ClientConfig, duration: Duration) -> Self {
        Self {
            config,
            outcome: JoinOutcome::Joined,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn failed(
        config: ClientConfig,
        step: impl Into<String>,
        reason: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            config,
            outcome: JoinOutcome::Failed {
                step: step.into(),
                reason: reason.into(),
            },
            duration_ms: duration.as_millis() as u64,
        }
    }
}

/// Timing distribution for a set of samples.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyStats {
    pub count: usize,
    pub min_ms: u64,
    pub max_ms: u64,
    pub avg_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

impl LatencyStats {
    fn from_samples(mut samples: Vec<u64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_unstable();
        let count = samples.len();
        Self {
            count,
            min_ms: samples[0],
            max_ms: *samples.last().unwrap(),
            avg_ms: samples.iter().sum::<u64>() / count as u64,
            p50_ms: percentile(&samples, 0.50),
            p95_ms: percentile(&samples, 0.95),
            p99_ms: percentile(&samples, 0.99),
        }
    }
}

/// Aggregated view of a completed run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub total_clients: usize,
    pub joined: usize,
    pub failed: usize,
    /// Failure counts keyed by the step that killed the client.
    pub failures_by_step: BTreeMap<String, usize>,
    /// Join time distribution over successful clients only.
    pub join_time: LatencyStats,
    pub results: Vec<JoinAttemptResult>,
}

impl RunReport {
    pub fn from_results(results: Vec<JoinAttemptResult>) -> Self {
        let total_clients = results.len();
        let joined = results.iter().filter(|r| r.outcome.is_joined()).count();
        let failed = total_clients - joined;

        let mut failures_by_step: BTreeMap<String, usize> = BTreeMap::new();
        for result in &results {
            if let JoinOutcome::Failed { step, .. } = &result.outcome {
                *failures_by_step.entry(step.clone()).or_default() += 1;
            }
        }

        let join_samples: Vec<u64> = results
            .iter()
            .filter(|r| r.outcome.is_joined())
            .map(|r| r.duration_ms)
            .collect();

        Self {
            total_clients,
            joined,
            failed,
            failures_by_step,
            join_time: LatencyStats::from_samples(join_samples),
            results,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_clients == 0 {
            return 0.0;
        }
        self.joined as f64 / self.total_clients as f64
    }

    pub fn print_summary(&self) {
        println!("\n=== Stress Run Summary ===");
        println!("Total Clients: {}", self.total_clients);
        println!("Joined: {}", self.joined);
        println!("Failed: {}", self.failed);
        println!("Success Rate: {:.1}%", self.success_rate() * 100.0);

        if self.join_time.count > 0 {
            println!("\nJoin Time (successful clients):");
            println!("  Average: {} ms", self.join_time.avg_ms);
            println!("  P50: {} ms", self.join_time.p50_ms);
            println!("  P95: {} ms", self.join_time.p95_ms);
            println!("  P99: {} ms", self.join_time.p99_ms);
        }

        if !self.failures_by_step.is_empty() {
            println!("\nFailures by Step:");
            for (step, count) in &self.failures_by_step {
                println!("  {step}: {count}");
            }
        }
        println!("==========================\n");
    }
}

fn percentile(sorted_data: &[u64], p: f64) -> u64 {
    if sorted_data.is_empty() {
        return 0;
    }
    let idx = (p * (sorted_data.len() - 1) as f64).round() as usize;
    sorted_data[idx.min(sorted_data.len() - 1)]
}
