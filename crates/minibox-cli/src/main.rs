//! Minibox CLI
//!
//! A command-line tool for screening, compiling and running untrusted Java
//! snippets.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use minibox::{
    Config, EXAMPLE_CONFIG, ExecutionLimits, RunEvent, RunOutcome, Runner, Verdict,
};
use tokio::io::AsyncReadExt;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "minibox")]
#[command(about = "Screen, compile and run untrusted Java snippets")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: minibox.toml)
        #[arg(short, long, default_value = "minibox.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Screen, compile and run a program, streaming its output
    Run {
        /// Source file to run, or "-" for stdin
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Wall clock limit in seconds
        #[arg(short, long)]
        timeout: Option<f64>,

        /// Maximum number of output lines to keep
        #[arg(long)]
        max_output_lines: Option<usize>,
    },

    /// Screen a program without compiling or running it
    Check {
        /// Source file to check, or "-" for stdin
        #[arg(value_name = "FILE")]
        source: PathBuf,
    },

    /// List the blocklist rules
    Rules,

    /// Show the active configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run {
            source,
            timeout,
            max_output_lines,
        } => run_program(config, &source, timeout, max_output_lines).await,
        Commands::Check { source } => check_program(config, &source).await,
        Commands::Rules => {
            list_rules(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn read_source(source: &Path) -> Result<String> {
    if source == Path::new("-") {
        let mut content = String::new();
        tokio::io::stdin()
            .read_to_string(&mut content)
            .await
            .context("failed to read source from stdin")?;
        Ok(content)
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("failed to read source file '{}'", source.display()))
    }
}

async fn run_program(
    config: Config,
    source: &Path,
    timeout: Option<f64>,
    max_output_lines: Option<usize>,
) -> Result<()> {
    let source_content = read_source(source).await?;

    // Only explicitly given values override the configured limits
    let mut overrides = ExecutionLimits::unset();
    if let Some(seconds) = timeout {
        anyhow::ensure!(
            seconds.is_finite() && seconds > 0.0,
            "--timeout must be a positive number of seconds"
        );
        overrides = overrides.with_wall_time_limit(seconds);
    }
    if let Some(lines) = max_output_lines {
        anyhow::ensure!(lines > 0, "--max-output-lines must be at least 1");
        overrides = overrides.with_max_output_lines(lines);
    }

    let runner = Runner::new(config).context("invalid configuration")?;
    info!(toolchain = %runner.config().toolchain.name, "running program");

    let mut stream = runner.stream(source_content, Some(overrides));
    let mut outcome = None;
    while let Some(event) = stream.recv().await {
        match event {
            RunEvent::Compiled { diagnostics } => {
                for diagnostic in &diagnostics {
                    eprintln!("{diagnostic}");
                }
                println!("Compilation successful!");
            }
            RunEvent::Line(line) => println!("{line}"),
            RunEvent::Finished(finished) => outcome = Some(finished),
        }
    }

    let outcome = outcome.context("run ended without an outcome")?;
    match &outcome {
        // Output and timeout marker were already streamed
        RunOutcome::Completed { .. } | RunOutcome::TimedOut { .. } => {}
        RunOutcome::RuntimeFailure { message, .. } => println!("Runtime error: {message}"),
        _ => {
            for line in outcome.render() {
                println!("{line}");
            }
        }
    }

    info!(outcome = outcome.kind(), "execution result");

    match outcome {
        RunOutcome::Completed {
            exit_code: Some(0), ..
        } => Ok(()),
        RunOutcome::Completed { exit_code, .. } => std::process::exit(exit_code.unwrap_or(1)),
        _ => std::process::exit(1),
    }
}

async fn check_program(config: Config, source: &Path) -> Result<()> {
    let source_content = read_source(source).await?;
    let runner = Runner::new(config).context("invalid configuration")?;

    match runner.screener().screen(&source_content) {
        Verdict::Pass => {
            println!("No blocked constructs found");
            Ok(())
        }
        Verdict::Reject(rejection) => {
            println!("Security Alert: {rejection}");
            std::process::exit(1);
        }
    }
}

fn list_rules(config: &Config) {
    println!("Literal rules ({}):\n", config.screen.literals.len());
    for literal in &config.screen.literals {
        println!("  {literal}");
    }

    println!("\nPattern rules ({}):\n", config.screen.patterns.len());
    for rule in &config.screen.patterns {
        println!("  {:<40} {}", rule.pattern, rule.reason());
    }

    println!("\nBuilt-in checks:\n");
    println!("  drive-letter path passed to new File/FileReader/FileWriter");
    println!("  parent directory token '..'");
}

fn show_config(config: &Config) {
    let limits = &config.limits;
    println!("Limits:");
    println!("  Wall time limit: {:?}", limits.timeout());
    println!("  Drain grace: {:?}", limits.grace());
    println!("  Compile time limit: {:?}", limits.compile_timeout());
    println!("  Max output lines: {:?}", limits.max_output_lines);
    println!();
    match &config.workspace.root {
        Some(root) => println!("Workspace root: {}", root.display()),
        None => println!("Workspace root: {}", std::env::temp_dir().display()),
    }
    println!("Workspace prefix: {}", config.workspace.prefix);
    println!();
    let toolchain = &config.toolchain;
    println!("Toolchain: {}", toolchain.name);
    println!("  Entry point: {}", toolchain.entry_point);
    println!("  Source file: {}", toolchain.compile.source_name);
    println!("  Compile: {}", toolchain.compile.command.join(" "));
    println!("  Run: {}", toolchain.run.command.join(" "));
    println!();
    println!(
        "Blocklist: {} literals, {} patterns",
        config.screen.literals.len(),
        config.screen.patterns.len()
    );
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
