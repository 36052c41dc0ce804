//! Stepflow CLI Entry Point
//!
//! Runs a scenario file with the built-in steps.
//!
//! # Usage
//!
//! ```bash
//! # Run a scenario
//! stepflow deploy.yaml
//!
//! # Seed variables
//! stepflow deploy.yaml --var env=staging --vars-file vars.yaml
//!
//! # Resolve includes against another directory
//! stepflow deploy.yaml --include-dir ./roles
//!
//! # Dump the final namespace
//! stepflow deploy.yaml --print-vars
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info};
use serde_json::Value;

use stepflow::scenario::{load_scenario_file, load_variables_file};
use stepflow::steps::IncludeStep;
use stepflow::storage::DirFs;
use stepflow::{Engine, StepRegistry, Variables, APP_NAME, VERSION};

/// Command-line configuration parsed from arguments.
#[derive(Debug, Default)]
struct Config {
    scenario_path: Option<String>,
    vars: Vec<(String, String)>,
    vars_files: Vec<PathBuf>,
    include_dir: Option<PathBuf>,
    print_vars: bool,
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: stepflow [OPTIONS] <SCENARIO_FILE>");
    println!();
    println!("Arguments:");
    println!("  <SCENARIO_FILE>      Path to a JSON or YAML scenario");
    println!();
    println!("Options:");
    println!("  --var KEY=VALUE      Set a variable (repeatable)");
    println!("  --vars-file FILE     Load variables from a JSON or YAML mapping (repeatable)");
    println!("  --include-dir DIR    Base directory for included scenarios");
    println!("                       (default: the scenario's directory)");
    println!("  --print-vars         Print the final variables as JSON");
    println!("  --verbose            Enable debug logging");
    println!("  --help               Show this help message");
    println!("  --version            Show version information");
    println!();
    println!("Examples:");
    println!("  stepflow deploy.yaml");
    println!("  stepflow deploy.yaml --var env=staging --print-vars");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--print-vars" => {
                config.print_vars = true;
            }
            "--var" => {
                i += 1;
                let Some(pair) = args.get(i) else {
                    return Err("--var requires a KEY=VALUE argument".to_string());
                };
                let (key, value) = pair
                    .split_once('=')
                    .filter(|(key, _)| !key.is_empty())
                    .ok_or_else(|| format!("Invalid variable (expected KEY=VALUE): {}", pair))?;
                config.vars.push((key.to_string(), value.to_string()));
            }
            "--vars-file" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    return Err("--vars-file requires a path argument".to_string());
                };
                config.vars_files.push(PathBuf::from(path));
            }
            "--include-dir" => {
                i += 1;
                let Some(dir) = args.get(i) else {
                    return Err("--include-dir requires a path argument".to_string());
                };
                config.include_dir = Some(PathBuf::from(dir));
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if config.scenario_path.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.scenario_path = Some(arg.clone());
            }
        }
        i += 1;
    }

    if config.scenario_path.is_none() {
        return Err("missing <SCENARIO_FILE>".to_string());
    }

    Ok(config)
}

/// Files first, in order, then `--var` pairs on top.
fn collect_variables(config: &Config) -> Result<Variables, Box<dyn std::error::Error>> {
    let mut vars = Variables::new();

    for path in &config.vars_files {
        info!("Loading variables: {}", path.display());
        vars.extend(load_variables_file(path)?);
    }

    for (key, value) in &config.vars {
        vars.insert(key.clone(), Value::String(value.clone()));
    }

    Ok(vars)
}

fn include_root(config: &Config, scenario_path: &str) -> PathBuf {
    if let Some(dir) = &config.include_dir {
        return dir.clone();
    }
    match Path::new(scenario_path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);

    let scenario_path = config.scenario_path.clone().unwrap_or_default();

    let mut vars = collect_variables(&config)?;

    info!("Loading scenario: {}", scenario_path);
    let scenario = load_scenario_file(&scenario_path).map_err(|e| {
        error!("Failed to load scenario: {}", e);
        format!("Could not load scenario from '{}': {}", scenario_path, e)
    })?;

    let include_dir = include_root(&config, &scenario_path);
    info!("Include directory: {}", include_dir.display());

    let registry =
        StepRegistry::builtin().with("include", IncludeStep::factory(Arc::new(DirFs::new(include_dir)), ""));

    let mut engine = Engine::builder()
        .with_registry(registry)
        .with_default_evaluator_functions()
        .build();
    engine.append_commands(&scenario.commands)?;

    info!("Scenario loaded: {} steps", engine.len());

    let result = engine.execute(&mut vars);

    if config.print_vars {
        println!("{}", serde_json::to_string_pretty(&vars)?);
    }

    result?;
    info!("Scenario completed");

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
