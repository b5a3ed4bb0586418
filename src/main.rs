//! cortex-resample - HCP surface time series to fsaverage4
//!
//! Resamples fs_LR 32k dense time series with Connectome Workbench, merges
//! hemispheres into bilateral records and verifies the resampled outputs.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

use cortex_resample::batch::BatchReport;
use cortex_resample::cli::{Cli, Commands, ConfigArgs, MergeArgs, ReportFormat, ResampleArgs, VerifyArgs};
use cortex_resample::config::{generate_sample_config, Config};
use cortex_resample::core::{MergeSettings, PipelineEngine, ResampleSettings, VerifySettings};
use cortex_resample::error::PipelineError;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("{} {:#}", "error:".bright_red().bold(), err);
            let code = err
                .downcast_ref::<PipelineError>()
                .map(|e| e.exit_code())
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let log_filter = init_logging(cli.verbose)?;

    // `config --init --config new.toml` must work before the file exists
    let config = match (&cli.command, cli.config.as_deref()) {
        (Commands::Config(_), Some(path)) if !path.exists() => Config::default(),
        (_, explicit) => Config::load(explicit)?,
    };
    log_filter
        .reload(log_filter_for(cli.verbose, &config.general.log_level))
        .context("Failed to apply configured log level")?;

    let engine = PipelineEngine::new();
    listen_for_interrupt(&engine);

    match cli.command {
        Commands::Resample(args) => resample(engine, &config, args).await,
        Commands::Merge(args) => merge(engine, &config, args).await,
        Commands::Verify(args) => verify(engine, &config, args).await,
        Commands::Config(args) => show_config(&config, cli.config, args),
    }
}

type LogFilterHandle = reload::Handle<EnvFilter, Registry>;

fn log_filter_for(verbose: bool, configured: &str) -> EnvFilter {
    let level = if verbose { "debug" } else { configured };
    match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new(format!("cortex_resample={}", level)),
    }
}

/// Starts at `info` (or `debug` with `--verbose`) until the config is read
fn init_logging(verbose: bool) -> Result<LogFilterHandle> {
    let (filter, handle) = reload::Layer::new(log_filter_for(verbose, "info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .try_init()
        .context("Failed to initialize logging")?;
    Ok(handle)
}

/// First Ctrl-C stops dispatching new subjects, a second one exits
fn listen_for_interrupt(engine: &PipelineEngine) {
    let cancel = engine.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupt received: running subjects will finish, queued ones are skipped");
        cancel.store(true, Ordering::SeqCst);

        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupted again, exiting".bright_red());
            std::process::exit(130);
        }
    });
}

fn require(value: Option<PathBuf>, what: &str, flag: &str, key: &str) -> Result<PathBuf> {
    value.with_context(|| format!("No {} given: pass {} or set {} in the config file", what, flag, key))
}

async fn resample(engine: PipelineEngine, config: &Config, args: ResampleArgs) -> Result<ExitCode> {
    let paths = &config.paths;
    let mut settings = ResampleSettings::new(
        require(args.input.or_else(|| paths.input_dir.clone()), "input directory", "--input", "paths.input_dir")?,
        require(args.output.or_else(|| paths.output_dir.clone()), "output directory", "--output", "paths.output_dir")?,
        require(args.atlas.or_else(|| paths.atlas_dir.clone()), "atlas directory", "--atlas", "paths.atlas_dir")?,
    );
    settings.jobs = args.jobs.unwrap_or(config.resample.jobs);
    settings.kind = args.kind.map(Into::into).unwrap_or(config.resample.data_kind);
    settings.tool = args.tool.unwrap_or_else(|| config.resample.tool.clone());
    settings.max_depth = config.resample.max_depth;
    settings.show_progress = !args.no_progress;

    println!("{}", "cortex-resample: fs_LR 32k → fsaverage4".bright_cyan().bold());
    println!("Input:  {}", settings.input_dir.display());
    println!("Output: {}\n", settings.output_dir.display());

    let report = tokio::task::spawn_blocking(move || engine.run_resample(&settings))
        .await
        .context("Resample task panicked")??;

    print_batch(&report, args.report)
}

async fn merge(engine: PipelineEngine, config: &Config, args: MergeArgs) -> Result<ExitCode> {
    let paths = &config.paths;
    let mut settings = MergeSettings::new(
        require(args.input.or_else(|| paths.output_dir.clone()), "resampled directory", "INPUT", "paths.output_dir")?,
        require(args.output.or_else(|| paths.bilateral_dir.clone()), "bilateral directory", "OUTPUT", "paths.bilateral_dir")?,
    );
    settings.subjects = if args.all || args.subjects.is_empty() {
        None
    } else {
        Some(args.subjects)
    };
    settings.jobs = args.jobs.unwrap_or(config.merge.jobs);
    settings.kind = args.kind.map(Into::into).unwrap_or(config.resample.data_kind);
    settings.format = args.format.map(Into::into).unwrap_or(config.merge.formats);
    settings.value_bound = config.merge.value_bound;
    settings.show_progress = !args.no_progress;

    println!("{}", "cortex-resample: hemisphere merge".bright_cyan().bold());
    println!("Input:  {}", settings.input_dir.display());
    println!("Output: {}\n", settings.output_dir.display());

    let report = tokio::task::spawn_blocking(move || engine.run_merge(&settings))
        .await
        .context("Merge task panicked")??;

    print_batch(&report, args.report)
}

async fn verify(engine: PipelineEngine, config: &Config, args: VerifyArgs) -> Result<ExitCode> {
    let settings = VerifySettings {
        output_dir: require(
            args.output.or_else(|| config.paths.output_dir.clone()),
            "resampled directory",
            "OUTPUT",
            "paths.output_dir",
        )?,
        subjects: (!args.subjects.is_empty()).then_some(args.subjects),
    };

    let report = tokio::task::spawn_blocking(move || engine.run_verify(&settings))
        .await
        .context("Verify task panicked")??;

    match args.report {
        ReportFormat::Human => print!("{}", report.render_text()),
        ReportFormat::Json => println!("{}", report.to_json()?),
    }

    Ok(if report.all_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_batch(report: &BatchReport, format: ReportFormat) -> Result<ExitCode> {
    match format {
        ReportFormat::Json => println!("{}", report.to_json()?),
        ReportFormat::Human => {
            let ok = report.successful.len();
            let icon = if report.all_successful() {
                "✓".bright_green()
            } else {
                "⚠".yellow()
            };
            println!(
                "\n{} {}/{} subjects successful ({})",
                icon,
                ok,
                report.total,
                humantime::format_duration(std::time::Duration::from_secs(report.elapsed().as_secs()))
            );
            for failed in &report.failed {
                println!("  {} {}: {}", "✗".bright_red(), failed.subject, failed.reason);
            }
        }
    }

    Ok(if report.all_successful() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn show_config(config: &Config, explicit: Option<PathBuf>, args: ConfigArgs) -> Result<ExitCode> {
    let path = explicit.unwrap_or_else(Config::default_path);

    if args.init {
        if Config::init_at(&path)? {
            println!("{} Created {}", "✓".bright_green(), path.display());
        } else {
            println!("{} already exists, leaving it untouched", path.display());
        }
    }

    if args.show {
        println!("# effective configuration ({})", path.display());
        println!("{}", toml::to_string_pretty(config).context("Failed to serialize config")?);
    }

    if !args.init && !args.show {
        println!("Config file: {}", path.display());
        println!("Run with --init to create it, or --show to print the effective values.\n");
        print!("{}", generate_sample_config());
    }

    Ok(ExitCode::SUCCESS)
}
