//! Terminal dashboard used when streaming is disabled or unavailable

use async_trait::async_trait;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::dashboard::error::DashboardError;
use crate::dashboard::histogram::HistogramData;
use crate::dashboard::history::{HistoricalRecord, RunSummary};
use crate::dashboard::status::{BenchmarkStatus, Phase, StatusTracker, StatusUpdate};
use crate::dashboard::types::{
    metric_names, IterationThroughput, LiveMetricsSnapshot, LogLevel, ScatterSample,
    REPORTED_PERCENTILES,
};
use crate::dashboard::Dashboard;

const DEFAULT_RENDER_INTERVAL: Duration = Duration::from_secs(1);
const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Independently throttled panels
#[derive(Clone, Copy)]
enum Panel {
    Metrics = 0,
    Histogram = 1,
    Progress = 2,
}

/// Renders compact panels to a local writer (stderr by default).
///
/// Metric, histogram and progress panels are throttled to one render per
/// interval so a fast benchmark does not flood the terminal. A progress bar at
/// 0% or 100% is always drawn. Write failures are ignored.
pub struct PassiveDashboard {
    out: Mutex<Box<dyn Write + Send>>,
    status: StatusTracker,
    history: HistoricalRecord,
    total_requests: AtomicU64,
    error_requests: AtomicU64,
    render_interval: Duration,
    last_render: Mutex<[Option<Instant>; 3]>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl PassiveDashboard {
    pub fn stderr(history_capacity: usize) -> Self {
        Self::with_writer(Box::new(std::io::stderr()), history_capacity)
    }

    pub fn with_writer(out: Box<dyn Write + Send>, history_capacity: usize) -> Self {
        Self {
            out: Mutex::new(out),
            status: StatusTracker::new(),
            history: HistoricalRecord::new(history_capacity),
            total_requests: AtomicU64::new(0),
            error_requests: AtomicU64::new(0),
            render_interval: DEFAULT_RENDER_INTERVAL,
            last_render: Mutex::new([None; 3]),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Minimum time between two renders of the same panel
    pub fn render_interval(mut self, interval: Duration) -> Self {
        self.render_interval = interval;
        self
    }

    pub fn history(&self) -> &HistoricalRecord {
        &self.history
    }

    fn write_line(&self, line: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(out, "{}", line);
        let _ = out.flush();
    }

    fn due_for_render(&self, panel: Panel) -> bool {
        let mut last = self
            .last_render
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let slot = &mut last[panel as usize];
        let now = Instant::now();
        match *slot {
            Some(at) if now.duration_since(at) < self.render_interval => false,
            _ => {
                *slot = Some(now);
                true
            }
        }
    }

    fn render_metrics(&self, snapshot: &LiveMetricsSnapshot) {
        if snapshot.stats.is_empty() {
            return;
        }

        let mut header = vec!["Metric", "Count", "Mean", "Min", "Max"];
        header.extend(REPORTED_PERCENTILES.iter().map(|(label, _)| *label));

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(header);

        for (name, summary) in &snapshot.stats {
            let mut row = vec![
                Cell::new(name),
                Cell::new(summary.count),
                Cell::new(format!("{:.3}", summary.mean)),
                Cell::new(format!("{:.3}", summary.min)),
                Cell::new(format!("{:.3}", summary.max)),
            ];
            for (label, _) in REPORTED_PERCENTILES {
                let value = summary
                    .percentiles
                    .get(label)
                    .map(|v| format!("{:.3}", v))
                    .unwrap_or_else(|| "-".to_string());
                row.push(Cell::new(value));
            }
            table.add_row(row);
        }

        let total = self.total_requests.load(Ordering::Relaxed);
        let errors = self.error_requests.load(Ordering::Relaxed);
        self.write_line(&format!(
            "{} {} requests, {} errors\n{}",
            "metrics".bold(),
            total,
            errors,
            table
        ));
    }

    fn render_histograms(&self, snapshot: &LiveMetricsSnapshot) {
        for metric in [metric_names::TTFT, metric_names::OUTPUT_LATENCY] {
            let histogram = HistogramData::from_values(snapshot.samples(metric));
            if histogram.is_empty() {
                continue;
            }
            self.write_line(&format!(
                "{:>16} {} [{:.3} .. {:.3}]",
                metric,
                sparkline(&histogram.counts),
                histogram.min.unwrap_or_default(),
                histogram.max.unwrap_or_default(),
            ));
        }
    }
}

/// One block character per bin, scaled to the largest bin
fn sparkline(counts: &[u64]) -> String {
    let peak = counts.iter().copied().max().unwrap_or(0);
    if peak == 0 {
        return " ".repeat(counts.len());
    }
    counts
        .iter()
        .map(|&count| {
            if count == 0 {
                ' '
            } else {
                let level = (count * (SPARK_LEVELS.len() as u64 - 1)) / peak;
                SPARK_LEVELS[level as usize]
            }
        })
        .collect()
}

fn phase_label(phase: Phase) -> String {
    match phase {
        Phase::Idle => "IDLE".dimmed().to_string(),
        Phase::Running => "RUNNING".cyan().to_string(),
        Phase::Completed => "COMPLETED".green().to_string(),
        Phase::Failed => "FAILED".red().to_string(),
    }
}

fn level_label(level: LogLevel) -> String {
    match level {
        LogLevel::Debug => "DEBUG".dimmed().to_string(),
        LogLevel::Info => "INFO".blue().to_string(),
        LogLevel::Warning => "WARNING".yellow().to_string(),
        LogLevel::Error => "ERROR".red().to_string(),
    }
}

#[async_trait]
impl Dashboard for PassiveDashboard {
    fn update_metrics_panels(&self, snapshot: &LiveMetricsSnapshot) {
        if snapshot.validate().is_ok() && self.due_for_render(Panel::Metrics) {
            self.render_metrics(snapshot);
        }
    }

    fn update_histogram_panel(&self, snapshot: &LiveMetricsSnapshot) {
        if snapshot.validate().is_ok() && self.due_for_render(Panel::Histogram) {
            self.render_histograms(snapshot);
        }
    }

    fn update_scatter_plot_panel(&self, _sample: Option<ScatterSample>) {}

    fn update_iteration_rps_vs_latency(
        &self,
        concurrency: u32,
        snapshot: &LiveMetricsSnapshot,
        run_time: f64,
        total_requests: u64,
    ) {
        if let Some(point) =
            IterationThroughput::from_iteration(concurrency, snapshot, run_time, total_requests)
        {
            self.write_line(&format!(
                "{} concurrency {}: {:.2} req/s, latency {:.3}s",
                "iteration".bold(),
                point.concurrency,
                point.rps,
                point.e2e_latency
            ));
        }
    }

    fn reset_panels(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.error_requests.store(0, Ordering::Relaxed);
        *self
            .last_render
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = [None; 3];
        self.status.set_progress(0.0);
    }

    fn update_benchmark_status(&self, update: StatusUpdate) {
        let status = self.status.apply(update);
        let mut line = format!(
            "{} {:>5.1}%",
            phase_label(status.phase),
            status.progress_percentage
        );
        if let Some(scenario) = &status.current_scenario {
            line.push_str(&format!(" scenario {}", scenario));
        }
        if status.total_iterations > 0 {
            line.push_str(&format!(
                " iteration {}/{}",
                status.current_iteration, status.total_iterations
            ));
        }
        if let Some(message) = &status.error_message {
            line.push_str(&format!(" {}", message.red()));
        }
        self.write_line(&line);
    }

    fn update_benchmark_progress_bars(&self, progress: f64) {
        let progress = self.status.set_progress(progress);
        let boundary = progress <= 0.0 || progress >= 100.0;
        if !boundary && !self.due_for_render(Panel::Progress) {
            return;
        }
        let filled = (progress / 5.0).round() as usize;
        self.write_line(&format!(
            "[{}{}] {:>5.1}%",
            "#".repeat(filled),
            "-".repeat(20 - filled.min(20)),
            progress
        ));
    }

    fn add_log_message(&self, message: &str, level: LogLevel) {
        self.write_line(&format!("{} {}", level_label(level), message));
    }

    fn handle_single_request(
        &self,
        snapshot: &LiveMetricsSnapshot,
        total_requests: u64,
        error_code: Option<u16>,
    ) {
        self.total_requests.store(total_requests, Ordering::Relaxed);
        match error_code {
            None => self.update_metrics_panels(snapshot),
            Some(code) => {
                self.error_requests.fetch_add(1, Ordering::Relaxed);
                self.add_log_message(
                    &format!("Request {} failed with error code {}", total_requests, code),
                    LogLevel::Warning,
                );
            }
        }
    }

    fn add_historical_data(&self, summary: RunSummary) {
        self.history.push(summary);
    }

    fn status(&self) -> BenchmarkStatus {
        self.status.snapshot()
    }

    async fn start(&self) -> Result<(), DashboardError> {
        if !self.started.swap(true, Ordering::SeqCst) {
            self.status.mark_started();
            self.write_line(&format!("{}", "benchstream: terminal dashboard".bold()));
        }
        Ok(())
    }

    async fn stop(&self) {
        if !self.started.load(Ordering::SeqCst) || self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let status = self.status.snapshot();
        self.write_line(&format!(
            "{} {} requests, {} errors, {} runs recorded",
            phase_label(status.phase),
            self.total_requests.load(Ordering::Relaxed),
            self.error_requests.load(Ordering::Relaxed),
            self.history.len()
        ));
    }
}
