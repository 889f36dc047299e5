//! Simulate command: a synthetic benchmark engine
//!
//! Exercises the full collaborator contract without a model server. Each
//! scenario stands for one iteration of a concurrency sweep: scenario `n`
//! (from 0) is reported at concurrency `2^n`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::cli::serve::{init_tracing, load_config_with_overrides};
use crate::cli::SimulateArgs;
use crate::dashboard::types::metric_names;
use crate::dashboard::{
    run_with_fallback, Dashboard, LiveMetricsSnapshot, LogLevel, Phase, RunSummary, ScatterSample,
    StatusUpdate,
};

/// Parameters of one synthetic run
#[derive(Debug, Clone)]
pub struct SyntheticRun {
    pub scenarios: Vec<String>,
    pub requests_per_scenario: u64,
    pub delay: Duration,
    /// Fail every Nth request (0 = never)
    pub error_every: u64,
    /// Seed for the latency generator; equal seeds give identical runs
    pub seed: u64,
}

impl From<&SimulateArgs> for SyntheticRun {
    fn from(args: &SimulateArgs) -> Self {
        Self {
            scenarios: args.scenarios.clone(),
            requests_per_scenario: args.requests,
            delay: Duration::from_millis(args.delay_ms),
            error_every: args.error_every,
            seed: 0x5eed_cafe,
        }
    }
}

/// Totals reported when a synthetic run finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTotals {
    pub requests: u64,
    pub errors: u64,
}

/// One successful request with plausible latencies and throughputs
fn synthetic_sample(rng: &mut StdRng) -> ScatterSample {
    ScatterSample {
        ttft: rng.gen_range(0.08..0.20),
        output_latency: rng.gen_range(0.015..0.035),
        input_throughput: rng.gen_range(800.0..1200.0),
        output_throughput: rng.gen_range(40.0..70.0),
    }
}

/// Drive `dashboard` through a synthetic benchmark
pub async fn drive(dashboard: Arc<dyn Dashboard>, run: SyntheticRun) -> RunTotals {
    let scenario_count = run.scenarios.len() as u64;
    let planned = scenario_count * run.requests_per_scenario;
    let mut rng = StdRng::seed_from_u64(run.seed);
    let mut totals = RunTotals {
        requests: 0,
        errors: 0,
    };

    dashboard.update_benchmark_status(
        StatusUpdate::new()
            .phase(Phase::Running)
            .totals(scenario_count as u32, run.requests_per_scenario as u32),
    );

    for (index, scenario) in run.scenarios.iter().enumerate() {
        let concurrency = 1u32 << index.min(16);
        dashboard.reset_panels();
        dashboard.update_benchmark_status(StatusUpdate::new().scenario(scenario.as_str()).iteration(0));
        dashboard.add_log_message(&format!("Starting scenario {}", scenario), LogLevel::Info);

        let mut samples: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut scenario_errors = 0;
        let mut snapshot = LiveMetricsSnapshot::default();
        let started = Instant::now();

        for iteration in 1..=run.requests_per_scenario {
            if !run.delay.is_zero() {
                tokio::time::sleep(run.delay).await;
            }
            totals.requests += 1;

            if run.error_every > 0 && totals.requests % run.error_every == 0 {
                totals.errors += 1;
                scenario_errors += 1;
                dashboard.handle_single_request(&snapshot, iteration, Some(500));
            } else {
                let sample = synthetic_sample(&mut rng);
                let e2e = sample.ttft + sample.output_latency * 100.0;

                for (name, value) in [
                    (metric_names::TTFT, sample.ttft),
                    (metric_names::OUTPUT_LATENCY, sample.output_latency),
                    (metric_names::INPUT_THROUGHPUT, sample.input_throughput),
                    (metric_names::OUTPUT_THROUGHPUT, sample.output_throughput),
                    (metric_names::E2E_LATENCY, e2e),
                ] {
                    samples.entry(name.to_string()).or_default().push(value);
                }

                snapshot = LiveMetricsSnapshot::from_samples(samples.clone());
                dashboard.handle_single_request(&snapshot, iteration, None);
                dashboard.update_scatter_plot_panel(Some(sample));
            }

            dashboard.update_benchmark_status(StatusUpdate::new().iteration(iteration as u32));
            if planned > 0 {
                dashboard.update_benchmark_progress_bars(totals.requests as f64 * 100.0 / planned as f64);
            }
        }

        dashboard.update_histogram_panel(&snapshot);
        dashboard.update_iteration_rps_vs_latency(
            concurrency,
            &snapshot,
            started.elapsed().as_secs_f64(),
            run.requests_per_scenario,
        );
        dashboard.add_historical_data(RunSummary {
            scenario: Some(scenario.clone()),
            total_requests: run.requests_per_scenario,
            error_count: scenario_errors,
            stats: snapshot.stats.clone(),
            ..RunSummary::new(format!("simulate-{}", scenario))
        });
        dashboard.add_log_message(
            &format!("Scenario {} finished with {} errors", scenario, scenario_errors),
            if scenario_errors > 0 { LogLevel::Warning } else { LogLevel::Info },
        );
    }

    dashboard.update_benchmark_status(StatusUpdate::new().phase(Phase::Completed).progress(100.0));
    totals
}

/// Main simulate command handler
pub async fn run_simulate(args: SimulateArgs) -> anyhow::Result<()> {
    let config = load_config_with_overrides(&args.config)?;
    init_tracing(&config.logging)?;

    let run = SyntheticRun::from(&args);
    let linger = Duration::from_secs(args.linger_secs);
    tracing::info!(
        scenarios = run.scenarios.len(),
        requests_per_scenario = run.requests_per_scenario,
        "Starting synthetic benchmark"
    );

    let totals = run_with_fallback(&config, |dashboard| async move {
        let totals = drive(dashboard, run).await;
        if !linger.is_zero() {
            tokio::time::sleep(linger).await;
        }
        totals
    })
    .await;

    tracing::info!(
        requests = totals.requests,
        errors = totals.errors,
        "Synthetic benchmark finished"
    );
    Ok(())
}
