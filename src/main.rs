#![forbid(unsafe_code)]

//! bbb-stress binary - drive a synthetic participant population against a
//! meeting and report join success/failure and timing.
//!
//! Usage:
//!   cargo run -- --cameras 2 --microphones 3 --listeners 20 --hold 60
//!   cargo run -- --listeners 50 --strategy parallel --batch-size 10
//!   cargo run -- --probe-server https://bbb.example.org/bigbluebutton \
//!                --secret s3cr3t --meeting demo
//!
//! The built-in run mode uses the simulated driver (see `sim`); production
//! runs embed the library with a real browser-automation adapter.

use anyhow::Result;
use bbb_stress::bbb::BbbHttpClient;
use bbb_stress::conference::ConferenceClient;
use bbb_stress::config::{LaunchPolicy, ModalPolicy, RunSpec};
use bbb_stress::identity::RandomNameSource;
use bbb_stress::orchestrator;
use bbb_stress::population::ClassCounts;
use bbb_stress::retry::RetryPolicy;
use bbb_stress::sim::{SimConfig, SimConference, SimDriver};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct CliConfig {
    meeting_id: String,
    cameras: usize,
    microphones: usize,
    listeners: usize,
    hold_secs: u64,
    strategy: String,
    batch_size: usize,
    client_delay_ms: u64,
    batch_delay_ms: u64,
    retry_attempts: u32,
    retry_delay_ms: u64,
    modal_best_effort: bool,
    sim_latency_ms: u64,
    sim_failure_rate: f64,
    probe_server: Option<String>,
    secret: Option<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            meeting_id: "stress-test-meeting".to_string(),
            cameras: 0,
            microphones: 0,
            listeners: 5,
            hold_secs: 60,
            strategy: "batched".to_string(),
            batch_size: 5,
            client_delay_ms: 2_000,
            batch_delay_ms: 10_000,
            retry_attempts: 3,
            retry_delay_ms: 2_000,
            modal_best_effort: false,
            sim_latency_ms: 50,
            sim_failure_rate: 0.0,
            probe_server: None,
            secret: None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config = CliConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--meeting" | "-m" => {
                if let Some(v) = args.get(i + 1) {
                    config.meeting_id = v.clone();
                }
                i += 2;
            }
            "--cameras" => {
                if let Some(v) = args.get(i + 1) {
                    config.cameras = v.parse().unwrap_or(config.cameras);
                }
                i += 2;
            }
            "--microphones" => {
                if let Some(v) = args.get(i + 1) {
                    config.microphones = v.parse().unwrap_or(config.microphones);
                }
                i += 2;
            }
            "--listeners" => {
                if let Some(v) = args.get(i + 1) {
                    config.listeners = v.parse().unwrap_or(config.listeners);
                }
                i += 2;
            }
            "--hold" | "-d" => {
                if let Some(v) = args.get(i + 1) {
                    config.hold_secs = v.parse().unwrap_or(config.hold_secs);
                }
                i += 2;
            }
            "--strategy" => {
                if let Some(v) = args.get(i + 1) {
                    config.strategy = v.clone();
                }
                i += 2;
            }
            "--batch-size" | "-b" => {
                if let Some(v) = args.get(i + 1) {
                    config.batch_size = v.parse().unwrap_or(config.batch_size).max(1);
                }
                i += 2;
            }
            "--client-delay" => {
                if let Some(v) = args.get(i + 1) {
                    config.client_delay_ms = v.parse().unwrap_or(config.client_delay_ms);
                }
                i += 2;
            }
            "--batch-delay" => {
                if let Some(v) = args.get(i + 1) {
                    config.batch_delay_ms = v.parse().unwrap_or(config.batch_delay_ms);
                }
                i += 2;
            }
            "--retries" => {
                if let Some(v) = args.get(i + 1) {
                    config.retry_attempts = v.parse().unwrap_or(config.retry_attempts);
                }
                i += 2;
            }
            "--retry-delay" => {
                if let Some(v) = args.get(i + 1) {
                    config.retry_delay_ms = v.parse().unwrap_or(config.retry_delay_ms);
                }
                i += 2;
            }
            "--modal-best-effort" => {
                config.modal_best_effort = true;
                i += 1;
            }
            "--sim-latency" => {
                if let Some(v) = args.get(i + 1) {
                    config.sim_latency_ms = v.parse().unwrap_or(config.sim_latency_ms);
                }
                i += 2;
            }
            "--sim-failure-rate" => {
                if let Some(v) = args.get(i + 1) {
                    config.sim_failure_rate =
                        v.parse::<f64>().unwrap_or(0.0).clamp(0.0, 1.0);
                }
                i += 2;
            }
            "--probe-server" => {
                if let Some(v) = args.get(i + 1) {
                    config.probe_server = Some(v.clone());
                }
                i += 2;
            }
            "--secret" => {
                if let Some(v) = args.get(i + 1) {
                    config.secret = Some(v.clone());
                }
                i += 2;
            }
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            _ => {
                i += 1;
            }
        }
    }

    // Control-plane smoke test: verify the server URL + shared secret pair
    // actually authenticates before anyone schedules a big run against it.
    if let Some(server) = config.probe_server.clone() {
        return probe_server(&config, &server).await;
    }

    run_stress(config).await
}

async fn probe_server(config: &CliConfig, server: &str) -> Result<()> {
    let secret = config
        .secret
        .clone()
        .ok_or_else(|| anyhow::anyhow!("--probe-server requires --secret"))?;
    let client = BbbHttpClient::new(server, secret);
    let password = client.moderator_password(&config.meeting_id).await?;
    println!(
        "Server accepted the checksum; meeting '{}' moderator password: {}",
        config.meeting_id, password
    );
    let url = client.join_url("Probe User", &config.meeting_id, &password)?;
    println!("Example join URL: {url}");
    Ok(())
}

async fn run_stress(config: CliConfig) -> Result<()> {
    let policy = match config.strategy.as_str() {
        "sequential" => LaunchPolicy::Sequential {
            client_delay: Duration::from_millis(config.client_delay_ms),
        },
        "parallel" => LaunchPolicy::Parallel {
            batch_size: config.batch_size,
        },
        "batched" => LaunchPolicy::Batched {
            batch_size: config.batch_size,
            client_delay: Duration::from_millis(config.client_delay_ms),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
        },
        other => {
            eprintln!("Unknown strategy '{other}', using batched");
            LaunchPolicy::default()
        }
    };

    let mut spec = RunSpec::new(
        config.meeting_id.clone(),
        ClassCounts {
            cameras: config.cameras,
            microphones: config.microphones,
            listeners: config.listeners,
        },
    );
    spec.hold = Duration::from_secs(config.hold_secs);
    spec.policy = policy;
    spec.join.retry = RetryPolicy::new(
        config.retry_attempts,
        Duration::from_millis(config.retry_delay_ms),
    );
    if config.modal_best_effort {
        spec.join.modal_policy = ModalPolicy::BestEffort;
    }

    println!("\n=== Starting Stress Run ===");
    println!("Meeting: {}", spec.meeting_id);
    println!(
        "Clients: {} ({} camera, {} mic, {} listen-only)",
        spec.class_counts.total(),
        spec.class_counts.cameras,
        spec.class_counts.microphones,
        spec.class_counts.listeners
    );
    println!("Strategy: {:?}", spec.policy);
    println!("Hold: {}s", config.hold_secs);
    println!(
        "Simulated driver: {}ms/step, {:.0}% wait failure rate",
        config.sim_latency_ms,
        config.sim_failure_rate * 100.0
    );
    println!("===========================\n");

    let driver = Arc::new(SimDriver::new(SimConfig {
        step_latency: Duration::from_millis(config.sim_latency_ms),
        failure_rate: config.sim_failure_rate,
    }));

    let report = orchestrator::run(
        &spec,
        driver,
        Arc::new(SimConference),
        Arc::new(RandomNameSource::new()),
    )
    .await?;

    report.print_summary();

    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write("stress_report.json", json)?;
    println!("Detailed results saved to: stress_report.json");

    Ok(())
}

fn print_usage() {
    println!("Stress harness for BigBlueButton-style meetings");
    println!("\nUsage:");
    println!("  cargo run -- [OPTIONS]");
    println!("\nOptions:");
    println!("  -m, --meeting <ID>          Meeting ID (default: stress-test-meeting)");
    println!("      --cameras <N>           Clients joining with webcam + microphone (default: 0)");
    println!("      --microphones <N>       Clients joining with microphone only (default: 0)");
    println!("      --listeners <N>         Clients joining listen-only (default: 5)");
    println!("  -d, --hold <SECS>           Hold duration after all clients resolve (default: 60)");
    println!("      --strategy <S>          sequential | batched | parallel (default: batched)");
    println!("  -b, --batch-size <N>        Clients per batch (default: 5)");
    println!("      --client-delay <MS>     Delay between clients in a batch (default: 2000)");
    println!("      --batch-delay <MS>      Delay between batches (default: 10000)");
    println!("      --retries <N>           Retry budget per flaky wait (default: 3)");
    println!("      --retry-delay <MS>      Delay between retry attempts (default: 2000)");
    println!("      --modal-best-effort     Tolerate a lingering confirmation overlay");
    println!("      --sim-latency <MS>      Simulated per-step latency (default: 50)");
    println!("      --sim-failure-rate <F>  Simulated wait failure probability 0.0-1.0");
    println!("      --probe-server <URL>    Verify server + secret, print moderator password");
    println!("      --secret <S>            Shared API secret for --probe-server");
    println!("  -h, --help                  Print this help message");
    println!("\nExamples:");
    println!("  # Five listeners, default batching");
    println!("  cargo run -- --listeners 5 --hold 30");
    println!();
    println!("  # Heavier mixed run, parallel batches of 10");
    println!("  cargo run -- --cameras 5 --microphones 15 --listeners 80 \\");
    println!("               --strategy parallel --batch-size 10");
    println!();
    println!("  # Check control-plane credentials");
    println!("  cargo run -- --probe-server https://bbb.example.org/bigbluebutton \\");
    println!("               --secret s3cr3t --meeting demo");
    println!("\nEnvironment Variables:");
    println!("  RUST_LOG=debug          Enable debug logging");
    println!("  RUST_LOG=info           Enable info logging (default)");
}
