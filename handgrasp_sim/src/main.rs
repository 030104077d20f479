//! Hand grasp simulator CLI
//!
//! Runs deterministic grasp scenarios against the virtual clock, or against
//! wall time with `--realtime`.

use clap::Parser;
use handgrasp_core::HandConfig;
use handgrasp_sim::scenarios::ScenarioId;
use handgrasp_sim::{ScenarioResult, ScenarioRunner, SimError};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Hand grasp simulation CLI
#[derive(Parser, Debug)]
#[command(name = "handgrasp-sim")]
#[command(about = "Run deterministic grasp scenarios", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (curl_blend, settle_timeout, early_release, pinch_close,
    /// regrab, no_colliders, authored_attach, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Simulated seconds per scenario (default: per scenario)
    #[arg(short, long)]
    duration: Option<f64>,

    /// Frames per second
    #[arg(long, default_value = "90")]
    tick_rate: u32,

    /// Fingertip noise standard deviation in meters
    #[arg(long)]
    jitter: Option<f64>,

    /// Hand configuration file (JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Run against wall-clock time instead of the virtual clock
    #[arg(long)]
    realtime: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export per-frame data of a single scenario to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn build_runner(args: &Args, seed: u64, config: &HandConfig) -> ScenarioRunner {
    let mut runner = ScenarioRunner::new(seed)
        .with_tick_rate(args.tick_rate)
        .with_config(config.clone());
    if let Some(duration) = args.duration {
        runner = runner.with_duration(duration);
    }
    if let Some(jitter) = args.jitter {
        runner = runner.with_jitter(jitter);
    }
    runner
}

fn run_export(args: &Args, scenario: ScenarioId, seed: u64, config: &HandConfig, path: &str) -> Result<bool, SimError> {
    info!("Running with export to: {}", path);

    let (result, export) = build_runner(args, seed, config).run_recorded(scenario);
    export.write_to_file(path)?;
    info!("Exported {} frames to {}", export.frames.len(), path);

    if result.passed {
        info!("✓ {} (seed={}) PASSED - exported to {}", scenario.name(), seed, path);
    } else {
        error!(
            "✗ {} FAILED: {}",
            scenario.name(),
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
    Ok(result.passed)
}

fn main() {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides the flags
    let level = match (args.json, args.verbose) {
        (true, _) => "warn",
        (false, true) => "debug",
        (false, false) => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("Hand Grasp Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let config = match &args.config {
        Some(path) => match HandConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(2);
            }
        },
        None => HandConfig::default(),
    };

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(id) => vec![id],
            Err(e) => {
                eprintln!("Error: {}", e);
                let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
                eprintln!("Available scenarios: {}, all", names.join(", "));
                std::process::exit(1);
            }
        }
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    // Handle --export mode
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            eprintln!("Error: --export only supports a single scenario, not 'all'");
            std::process::exit(1);
        }

        match run_export(&args, scenarios[0], base_seed, &config, export_path) {
            Ok(true) => return,
            Ok(false) => std::process::exit(1),
            Err(e) => {
                error!("Export failed: {}", e);
                std::process::exit(2);
            }
        }
    }

    // Track results
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = build_runner(&args, seed, &config);

        for scenario in &scenarios {
            let result = if args.realtime {
                match runner.run_realtime(*scenario) {
                    Ok(result) => result,
                    Err(e) => {
                        error!("Realtime run failed: {}", e);
                        std::process::exit(2);
                    }
                }
            } else {
                runner.run(*scenario)
            };

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }

            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Failed to serialize summary: {}", e);
                std::process::exit(2);
            }
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);

            for result in &all_results {
                if !result.passed {
                    error!(
                        "  - {} seed={}: {}",
                        result.scenario.name(),
                        result.seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
