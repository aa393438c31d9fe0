//! vistrace - Command Line Entry Point
//!
//! Traces Rhai scripts, prints filtered trace logs with visualization
//! decisions and keeps the last analysis on disk.

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vistrace::{
    analysis::{analyze_batch, AnalysisReport, Analyzer, BatchJob},
    config::AnalysisConfig,
    session::LastAnalysisStore,
    ScriptEngine, StructureFamily,
};

#[derive(Debug, Parser)]
#[command(name = "vistrace", version, about = "Trace data structures in Rhai scripts")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write daily rolling log files to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// More logging (-v, -vv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Trace, filter and classify a script
    Analyze {
        script: PathBuf,
        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Skip the advisory classifier
        #[arg(long)]
        offline: bool,
        /// Do not remember this analysis
        #[arg(long)]
        no_store: bool,
    },
    /// Trace a script and print the unfiltered log
    Trace {
        script: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Analyse several scripts concurrently
    Batch {
        #[arg(required = true)]
        scripts: Vec<PathBuf>,
        /// Worker threads
        #[arg(short, long, default_value_t = 4)]
        jobs: usize,
        #[arg(long)]
        offline: bool,
        /// Write one report per script into this directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Check that a script compiles
    Check { script: PathBuf },
    /// Print the last stored analysis
    Last,
    /// Print the active configuration
    Config {
        /// Write the default configuration if no file exists yet
        #[arg(long)]
        write_default: bool,
    },
}

fn init_logging(verbose: u8, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let default_filter = match verbose {
        0 => "info,vistrace=debug",
        _ => "info,vistrace=trace",
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "vistrace.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

fn read_script(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read script {}", path.display()))
}

fn build_analyzer(config: AnalysisConfig, offline: bool) -> anyhow::Result<Analyzer> {
    if offline {
        return Ok(Analyzer::new(config));
    }
    Analyzer::from_config(config).context("Failed to set up the advisory classifier")
}

fn emit<T: serde::Serialize>(value: &T, output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("Wrote {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn summary(report: &AnalysisReport) -> String {
    let decisions: Vec<String> = StructureFamily::ALL
        .iter()
        .map(|family| {
            let choice = report
                .visualizations
                .get(*family)
                .map(|d| d.visualization_type.to_string())
                .unwrap_or_else(|| "-".to_string());
            format!("{}={}", family.plural(), choice)
        })
        .collect();
    match &report.error {
        Some(fault) => format!("{} ({})", decisions.join(" "), fault),
        None => decisions.join(" "),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose, cli.log_dir.as_deref());

    let config = AnalysisConfig::load_or_default(cli.config.as_deref());

    match cli.command {
        Command::Analyze {
            script,
            output,
            offline,
            no_store,
        } => {
            let source = read_script(&script)?;
            let analyzer = build_analyzer(config, offline)?;
            let report = analyzer.analyze(&source);

            if !no_store {
                if let Err(e) = LastAnalysisStore::in_data_dir().and_then(|store| store.save(&report)) {
                    tracing::warn!("Could not store the analysis: {}", e);
                }
            }
            emit(&report, output.as_deref())?;
            tracing::info!("{}: {}", script.display(), summary(&report));
        }
        Command::Trace { script, output } => {
            let source = read_script(&script)?;
            let run = Analyzer::new(config).trace(&source);
            if let Some(fault) = &run.fault {
                tracing::warn!("{}", fault);
            }
            emit(&run.log, output.as_deref())?;
        }
        Command::Batch {
            scripts,
            jobs,
            offline,
            output_dir,
        } => {
            let batch = scripts
                .iter()
                .map(|path| BatchJob::from_file(path))
                .collect::<vistrace::Result<Vec<_>>>()
                .context("Failed to read batch scripts")?;
            let analyzer = build_analyzer(config, offline)?;
            let outcomes = analyze_batch(&analyzer, batch, jobs);

            if let Some(dir) = &output_dir {
                std::fs::create_dir_all(dir)?;
            }
            for (path, outcome) in scripts.iter().zip(&outcomes) {
                println!("{}: {}", outcome.label, summary(&outcome.report));
                if let Some(dir) = &output_dir {
                    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("script");
                    emit(&outcome.report, Some(&dir.join(format!("{}.json", stem))))?;
                }
            }
        }
        Command::Check { script } => {
            let source = read_script(&script)?;
            let engine = ScriptEngine::new(&config.limits);
            if let Err(e) = engine.validate(&source) {
                bail!("{}: {}", script.display(), e);
            }
            println!("{}: ok", script.display());
        }
        Command::Last => {
            let store = LastAnalysisStore::in_data_dir()?;
            match store.load()? {
                Some(report) => emit(&report, None)?,
                None => println!("No analysis stored yet"),
            }
        }
        Command::Config { write_default } => {
            if write_default {
                let path = cli
                    .config
                    .clone()
                    .or_else(AnalysisConfig::default_path)
                    .context("Could not determine the config directory")?;
                if path.exists() {
                    bail!("{} already exists", path.display());
                }
                AnalysisConfig::default().save(&path)?;
                println!("Wrote {}", path.display());
            } else {
                print!("{}", config.to_toml()?);
            }
        }
    }

    Ok(())
}
