use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use env_logger::{Builder, Env};
use log::{debug, error, info, warn, LevelFilter};
use polars::prelude::DataFrame;
use sysinfo::{get_current_pid, ProcessExt, System, SystemExt};

use heart_disease_pipeline::model::{
    artifact_path, write_metrics_report, METRICS_FILE_NAME, MODEL_FILE_NAME,
};
use heart_disease_pipeline::{
    build_models, clean_data, importance_table, persist_predictions, read_table, score_data,
    write_table, CsvPredictionStore, LocalBucket, ObjectStore, PipelineConfig, PredictionStore,
    TrainedModel,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Acquire, clean, model and score heart-disease data")]
struct Cli {
    /// Which step to run
    #[arg(value_enum)]
    step: Step,
    #[arg(short, long, help = "Path to input data")]
    input: Option<PathBuf>,
    #[arg(short, long, help = "Path to the JSON configuration file")]
    config: Option<PathBuf>,
    #[arg(short, long, help = "Path to save the output table (directory for download)")]
    output: Option<PathBuf>,
    #[arg(short, long, help = "Path to a trained model artifact")]
    model: Option<PathBuf>,
    #[arg(short, long, help = "Delete stored predictions before inserting new ones")]
    truncate: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Verbose level")]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Step {
    #[value(name = "upload")]
    Upload,
    #[value(name = "download")]
    Download,
    #[value(name = "clean_data")]
    CleanData,
    #[value(name = "build_models")]
    BuildModels,
    #[value(name = "score_data")]
    ScoreData,
    #[value(name = "database")]
    Database,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Upload => "upload",
            Step::Download => "download",
            Step::CleanData => "clean_data",
            Step::BuildModels => "build_models",
            Step::ScoreData => "score_data",
            Step::Database => "database",
        };
        f.write_str(name)
    }
}

fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let env = Env::new().filter("HEART_LOG");
    Builder::new()
        .filter(Some("heart_disease_pipeline"), log_level)
        .filter(Some("heart_pipeline"), log_level)
        .parse_env(env)
        .init();
}

/// Resident memory of this process in bytes, 0 when unavailable.
fn monitor_memory() -> u64 {
    let mut system = System::new();
    match get_current_pid() {
        Ok(pid) => {
            system.refresh_process(pid);
            system.process(pid).map(|p| p.memory()).unwrap_or(0)
        }
        Err(_) => 0,
    }
}

fn required<'a>(value: &'a Option<PathBuf>, flag: &str, step: Step) -> Result<&'a Path> {
    value
        .as_deref()
        .with_context(|| format!("{} is required for step {}", flag, step))
}

async fn load_input(cli: &Cli) -> Result<DataFrame> {
    let input = required(&cli.input, "--input", cli.step)?;
    read_table(input)
        .await
        .with_context(|| format!("could not read {}", input.display()))
}

async fn save_output(output: Option<&Path>, df: &mut DataFrame) -> Result<()> {
    match output {
        Some(path) => write_table(path, df)
            .await
            .with_context(|| format!("could not write {}", path.display())),
        None => {
            info!("No output path given\n{}", df.head(Some(5)));
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_path(path)
            .with_context(|| format!("could not load configuration {}", path.display())),
        None => {
            warn!("No configuration file given, using defaults");
            Ok(PipelineConfig::default())
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.step {
        Step::Upload => {
            let bucket = LocalBucket::from_config(&config.upload)?;
            let local = cli.input.as_deref().unwrap_or(&config.upload.local_path);
            bucket.upload(local).await?;
        }
        Step::Download => {
            let bucket = LocalBucket::from_config(&config.download)?;
            let dest = required(&cli.output, "--output", cli.step)?;
            bucket.download(dest).await?;
        }
        Step::CleanData => {
            let df = load_input(cli).await?;
            let mut cleaned = clean_data(df, &config.clean_data.col_names)?;
            save_output(cli.output.as_deref(), &mut cleaned).await?;
        }
        Step::BuildModels => {
            let df = load_input(cli).await?;
            let output = required(&cli.output, "--output", cli.step)?;
            let built = build_models(&df, &config.build_models)?;

            let mut table = importance_table(&built.importances)?;
            save_output(Some(output), &mut table).await?;
            write_metrics_report(artifact_path(output, METRICS_FILE_NAME), &built.metrics)?;
            built.model.save(artifact_path(output, MODEL_FILE_NAME))?;
        }
        Step::ScoreData => {
            let df = load_input(cli).await?;
            let model_path = required(&cli.model, "--model", cli.step)?;
            let model = TrainedModel::load(model_path)
                .with_context(|| format!("could not load model {}", model_path.display()))?;
            info!("Trained model object loaded from {}", model_path.display());
            let mut scored = score_data(df, &model)?;
            save_output(cli.output.as_deref(), &mut scored).await?;
        }
        Step::Database => {
            let df = load_input(cli).await?;
            let mut store = CsvPredictionStore::new(&config.database.path);
            persist_predictions(&mut store, &df, cli.truncate)?;
            for record in store.list(config.database.max_rows_show)? {
                debug!("{} -> y_prob={} y_bin={}", record.key(), record.y_prob, record.y_bin);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    debug!("Arguments {:#?}", cli);

    let start_time = Instant::now();
    let start_memory = monitor_memory();

    if let Err(e) = run(&cli).await {
        error!("Step {} failed: {:#}", cli.step, e);
        return Err(e);
    }

    let end_memory = monitor_memory();
    info!("Step {} finished in {:?}", cli.step, start_time.elapsed());
    info!(
        "Memory used: {} KiB",
        end_memory.saturating_sub(start_memory) / 1024
    );
    Ok(())
}
