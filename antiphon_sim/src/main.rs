//! Antiphon simulator CLI
//!
//! Runs the ensemble scenarios deterministically, or plays a session
//! loaded from a state file, optionally in real time.

use antiphon_sim::scenarios::ScenarioId;
use antiphon_sim::{
    export_session, load_state, play_session, ScenarioResult, ScenarioRunner, SimConfig, SimError,
    SimExport,
};
use clap::Parser;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Antiphon ensemble simulator
#[derive(Parser, Debug)]
#[command(name = "antiphon-sim")]
#[command(about = "Run deterministic ensemble simulations for Antiphon", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,
    
    /// Number of players for scenarios with a variable board
    #[arg(short, long, default_value = "4")]
    players: usize,
    
    /// Scenario to run (triangle, duet, ring, scatter, chorus, backlog, vanish, refresh, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,
    
    /// Number of consecutive seeds to run (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,
    
    /// Maximum simulation duration in seconds
    #[arg(short, long, default_value = "30")]
    duration: f64,
    
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
    
    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
    
    /// Export the run (board, deliveries, notes) to a JSON file
    #[arg(long)]
    export: Option<String>,
    
    /// Play a session from a state file instead of running scenarios
    #[arg(long)]
    state: Option<String>,
    
    /// Pace a --state session against the wall clock
    #[arg(long)]
    realtime: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Loads a session from `path` and plays it for `--duration` seconds.
async fn run_session(args: &Args, seed: u64, path: &str) -> Result<SimExport, SimError> {
    let state = load_state(path)?;
    let config = SimConfig {
        seed,
        max_duration_secs: args.duration,
        ..Default::default()
    };
    let span = Duration::try_from_secs_f64(args.duration).unwrap_or(Duration::ZERO);
    let world = play_session(config, &state, span, args.realtime).await?;
    Ok(export_session(&world))
}

fn write_export(export: &SimExport, path: &str) {
    match export.write_to_file(path) {
        Ok(()) => info!("Exported {} deliveries to {}", export.deliveries.len(), path),
        Err(e) => error!("Failed to write export: {:?}", e),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);
    
    if !args.json {
        info!("Antiphon Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }
    
    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };
    
    if let Some(path) = &args.state {
        match run_session(&args, base_seed, path).await {
            Ok(export) => {
                info!(
                    "Session finished: {} deliveries, {} notes sounded",
                    export.deliveries.len(),
                    export.notes.len()
                );
                if let Some(export_path) = &args.export {
                    write_export(&export, export_path);
                }
            }
            Err(e) => {
                error!("Session failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }
    
    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(scenario) => vec![scenario],
            Err(e) => {
                eprintln!("Error: {}", e);
                let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
                eprintln!("Available scenarios: {}, all", names.join(", "));
                std::process::exit(1);
            }
        }
    };
    
    if args.export.is_some() && (scenarios.len() > 1 || args.seeds > 1) {
        eprintln!("Error: --export only supports a single scenario and seed");
        std::process::exit(1);
    }
    
    // Track results
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;
    
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        
        let runner = ScenarioRunner::new(seed, args.players)
            .with_duration(args.duration)
            .with_capture(args.export.is_some());
        
        for scenario in &scenarios {
            let result = runner.run(*scenario);
            
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
            
            if let (Some(path), Some(export)) = (&args.export, &result.export) {
                write_export(export, path);
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
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "time_secs": r.final_time_secs,
                    "players": r.final_player_count,
                    "metrics": r.metrics,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to render summary: {}", e),
        }
    } else {
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
