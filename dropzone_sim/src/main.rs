//! Dropzone simulator CLI
//!
//! Runs block-delivery team scenarios in the deterministic grid world.

use clap::Parser;
use dropzone_sim::scenarios::ScenarioId;
use dropzone_sim::{ScenarioResult, ScenarioRunner, SimConfig};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Dropzone deterministic simulation CLI
#[derive(Parser, Debug)]
#[command(name = "dropzone-sim")]
#[command(about = "Run cooperative block-delivery scenarios", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (cooperative, mixed_team, deception, resort, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to run
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Tick budget per run
    #[arg(short, long, default_value = "2000")]
    ticks: u64,

    /// Sense radius of every agent
    #[arg(long, default_value = "1")]
    sense_radius: u32,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export per-tick frames of a single scenario to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// Keep trust ledgers in a sled database at this path between runs
    #[arg(long)]
    ledger: Option<String>,
}

fn main() {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides the verbosity flag
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("Dropzone simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(scenario) => vec![scenario],
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!("Available scenarios: cooperative, mixed_team, deception, resort, all");
                std::process::exit(1);
            }
        }
    };

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let runner = |seed: u64| {
        let runner = ScenarioRunner::new(SimConfig {
            seed,
            max_ticks: args.ticks,
            sense_radius: args.sense_radius,
        });
        match &args.ledger {
            Some(dir) => runner.with_ledger_dir(dir),
            None => runner,
        }
    };

    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            eprintln!("Error: --export only supports a single scenario, not 'all'");
            std::process::exit(1);
        }
        let scenario = scenarios[0];
        let outcome = runner(base_seed)
            .run_with_export(scenario)
            .and_then(|(result, export)| export.write_to_file(export_path).map(|_| result));
        match outcome {
            Ok(result) => {
                info!("Exported {} ticks to {}", result.total_ticks, export_path);
                report(&result);
                if !result.passed {
                    std::process::exit(1);
                }
            }
            Err(e) => {
                error!("✗ {} failed to run: {}", scenario, e);
                std::process::exit(1);
            }
        }
        return;
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut errors = 0;
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let seeded = runner(seed);
        for scenario in &scenarios {
            match seeded.run(*scenario) {
                Ok(result) => {
                    if !args.json {
                        report(&result);
                    }
                    all_results.push(result);
                }
                Err(e) => {
                    error!("✗ {} (seed={}) could not run: {}", scenario, seed, e);
                    errors += 1;
                }
            }
        }
    }

    let total = all_results.len();
    let failed = all_results.iter().filter(|r| !r.passed).count() + errors;

    if args.json {
        let summary = serde_json::json!({
            "total": total + errors,
            "passed": total + errors - failed,
            "failed": failed,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "ticks": r.total_ticks,
                    "deliveries": r.deliveries,
                    "sites": r.sites,
                    "messages": r.messages.sent,
                    "failure_reason": r.failure_reason,
                    "trust": r.trust,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to render summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed, total + errors);
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }
}

fn report(result: &ScenarioResult) {
    if result.passed {
        info!(
            "✓ {} (seed={}) PASSED in {} ticks, {} messages",
            result.scenario, result.seed, result.total_ticks, result.messages.sent
        );
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario,
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
    for row in &result.trust {
        info!("    {} → {}: {:+.3}", row.observer, row.peer, row.composite);
    }
}
