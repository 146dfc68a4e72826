//! Binary entry point for foreman.
//!
//! Exposes the library's two public operations — request handling and the
//! learning cycle — plus the maintenance surfaces (decay sweep, usage
//! analytics, worker introspection) and a `serve` mode that runs the
//! background scheduler.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// CLI output goes to stdout/stderr by design.
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]
// Allow multiple crate versions from transitive dependencies.
#![allow(clippy::multiple_crate_versions)]

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use foreman::app::AppContext;
use foreman::config::ForemanConfig;
use foreman::models::{FeedbackItem, Priority, WorkRequest};
use foreman::observability::{self, LogFormat, LoggingOptions};
use foreman::storage::FeedbackBackend;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Foreman - a self-improving request orchestrator for AI workers.
#[derive(Parser)]
#[command(name = "foreman")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Handle one request: analyze, decompose, execute, compile.
    Handle {
        /// The natural-language request.
        query: String,

        /// Kind hint (research, analysis, content, recommendation).
        #[arg(long)]
        kind: Option<String>,

        /// Priority: high, medium, or low.
        #[arg(long, default_value = "medium")]
        priority: String,

        /// Print the full compiled result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Record user feedback for a handled request.
    Feedback {
        /// The request being rated.
        request_id: String,

        /// The worker the request was handled by.
        worker: String,

        /// Rating from 1 to 5.
        rating: u8,

        /// Optional free-text comment.
        #[arg(long)]
        comment: Option<String>,
    },

    /// Run one learning cycle.
    Cycle {
        /// Process a single worker instead of discovering active ones.
        #[arg(long)]
        worker: Option<String>,
    },

    /// Run a memory decay sweep.
    Gc {
        /// Report what would change without changing it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Aggregate per-worker usage analytics.
    Analytics {
        /// Trailing window in days.
        #[arg(long, default_value_t = 30)]
        window_days: u32,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List registered workers.
    Workers,

    /// Run the background scheduler until interrupted.
    Serve {
        /// Expose Prometheus metrics on this port.
        #[arg(long)]
        metrics_port: Option<u16>,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    observability::init_logging(LoggingOptions {
        verbose: cli.verbose,
        format: if cli.log_json {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        },
    });

    let config = match cli.config {
        Some(ref path) => ForemanConfig::load(path).context("loading configuration")?,
        None => ForemanConfig::load_default(),
    };
    let ctx = AppContext::new(config).context("initializing application context")?;

    match cli.command {
        Commands::Handle {
            query,
            kind,
            priority,
            json,
        } => handle(&ctx, query, kind, &priority, json),
        Commands::Feedback {
            request_id,
            worker,
            rating,
            comment,
        } => feedback(&ctx, request_id, worker, rating, comment),
        Commands::Cycle { worker } => cycle(&ctx, worker.as_deref()),
        Commands::Gc { dry_run } => gc(&ctx, dry_run),
        Commands::Analytics { window_days, json } => analytics(&ctx, window_days, json),
        Commands::Workers => workers(&ctx),
        Commands::Serve { metrics_port } => serve(ctx, metrics_port),
    }
}

fn handle(
    ctx: &AppContext,
    query: String,
    kind: Option<String>,
    priority: &str,
    json: bool,
) -> anyhow::Result<()> {
    let mut request = WorkRequest::new(query).with_priority(Priority::parse(priority));
    if let Some(kind) = kind {
        request = request.with_kind(kind);
    }

    let result = ctx.orchestrator.handle(&request)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.summary);
        println!(
            "\n{} of {} subtasks completed ({} failed) in {}ms [request {}]",
            result.completed, result.total, result.failed, result.elapsed_ms, result.request_id
        );
        for report in &result.reports {
            match report.error {
                Some(ref error) => {
                    println!("  {} [{}] {}: {error}", report.subtask_id, report.status, report.worker_name);
                },
                None => {
                    println!("  {} [{}] {}", report.subtask_id, report.status, report.worker_name);
                },
            }
        }
    }
    Ok(())
}

fn feedback(
    ctx: &AppContext,
    request_id: String,
    worker: String,
    rating: u8,
    comment: Option<String>,
) -> anyhow::Result<()> {
    anyhow::ensure!((1..=5).contains(&rating), "rating must be between 1 and 5");

    let item = FeedbackItem {
        id: format!("fb_{}", uuid::Uuid::new_v4()),
        request_id,
        worker_name: worker,
        rating,
        comment,
        processed: false,
        created_at: foreman::current_timestamp(),
    };
    ctx.store.add_feedback(&item)?;
    println!("Recorded feedback {} (rating {rating}/5)", item.id);
    Ok(())
}

fn cycle(ctx: &AppContext, worker: Option<&str>) -> anyhow::Result<()> {
    let summary = ctx.learning.run_cycle(worker);
    println!("{}", summary.summary());
    for error in &summary.errors {
        println!("  error [{}]: {}", error.worker_name, error.message);
    }
    Ok(())
}

fn gc(ctx: &AppContext, dry_run: bool) -> anyhow::Result<()> {
    let report = ctx.decay_sweep().run(dry_run)?;
    println!("{}", report.summary());
    for (kind, count) in &report.deleted_by_kind {
        println!("  {kind}: {count}");
    }
    Ok(())
}

fn analytics(ctx: &AppContext, window_days: u32, json: bool) -> anyhow::Result<()> {
    let report = ctx.analytics.usage_report(window_days)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Usage over the last {} days:", report.window_days);
    for worker in &report.workers {
        println!(
            "  {:<16} {:>3} subtasks, {:>5.1}% success, {:>7.0}ms avg, score {:.2}",
            worker.worker_name,
            worker.total_subtasks,
            worker.success_rate * 100.0,
            worker.avg_duration_ms,
            worker.performance_score
        );
    }
    if !report.top_performers.is_empty() {
        println!("Top performers: {}", report.top_performers.join(", "));
    }
    if !report.needs_improvement.is_empty() {
        println!("Needs improvement: {}", report.needs_improvement.join(", "));
    }
    for recommendation in &report.recommendations {
        println!("! {recommendation}");
    }
    Ok(())
}

fn workers(ctx: &AppContext) -> anyhow::Result<()> {
    for descriptor in ctx.registry.descriptors() {
        println!(
            "{:<16} {} [{}]",
            descriptor.name,
            descriptor.description,
            descriptor.capabilities.join(", ")
        );
    }
    Ok(())
}

fn serve(ctx: AppContext, metrics_port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = metrics_port {
        observability::init_metrics(port).context("starting metrics exporter")?;
    }

    let ctx = Arc::new(ctx);
    let mut scheduler = ctx.build_scheduler();
    scheduler.start();
    println!("foreman scheduler running; press Ctrl-C to stop");

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })
    .context("installing signal handler")?;

    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }

    println!("shutting down");
    scheduler.shutdown();
    Ok(())
}
