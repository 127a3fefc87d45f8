//! DFM CLI - Bridge interface for the job queue
//!
//! Commands: analyze, batch, job, version
//! Outputs JSON to stdout, logs to stderr
//! Exit codes: 0 ok, 1 server error, 2 client error or failed batch item, 3 job not found

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use dfm_core::{
    AnalysisPipeline, AnalysisRequest, AnalyzerConfig, BatchStatus, DirectoryStore, FileType,
    KeyValueStore, MemoryStore, ProcessType, ENGINE_VERSION,
};

const EXIT_SERVER_ERROR: u8 = 1;
const EXIT_CLIENT_ERROR: u8 = 2;
const EXIT_NOT_FOUND: u8 = 3;

#[derive(Parser)]
#[command(name = "dfm-cli")]
#[command(about = "DFM CLI - Geometry analysis and manufacturability scoring")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON config file
    #[arg(short, long, env = "DFM_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Directory for cached results and job records (overrides config)
    #[arg(long, env = "DFM_STORE_DIR", global = true)]
    store_dir: Option<PathBuf>,

    /// Skip downloads and return seeded estimates
    #[arg(long, env = "DFM_ESTIMATE_ONLY", global = true)]
    estimate_only: bool,

    /// Run without result cache or job records
    #[arg(long, global = true)]
    no_cache: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one file
    Analyze {
        /// JSON payload (AnalysisRequest)
        #[arg(short, long)]
        payload: String,
    },

    /// Analyze a list of files concurrently
    Batch {
        /// File holding a JSON array of AnalysisRequest
        #[arg(short = 'f', long)]
        payload_file: PathBuf,
    },

    /// Look up a tracked job
    Job {
        #[arg(short, long)]
        id: String,
    },

    /// Engine version and supported types
    Version,
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dfm_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn emit(value: &Value) {
    println!("{:#}", value);
}

fn fail(code: u8, message: impl std::fmt::Display) -> ExitCode {
    emit(&json!({ "success": false, "error": message.to_string() }));
    ExitCode::from(code)
}

fn load_config(cli: &Cli) -> Result<AnalyzerConfig, String> {
    let mut config = match &cli.config {
        Some(path) => AnalyzerConfig::load(path).map_err(|e| e.to_string())?,
        None => AnalyzerConfig::default(),
    };
    if cli.estimate_only {
        config.estimate_only = true;
    }
    if let Some(dir) = &cli.store_dir {
        config.store_dir = Some(dir.clone());
    }
    Ok(config)
}

fn build_pipeline(cli: &Cli, config: AnalyzerConfig) -> Result<AnalysisPipeline, String> {
    let store: Option<Arc<dyn KeyValueStore>> = match (&config.store_dir, cli.no_cache) {
        (_, true) => None,
        (Some(dir), false) => Some(Arc::new(DirectoryStore::open(dir).map_err(|e| e.to_string())?)),
        (None, false) => Some(Arc::new(MemoryStore::new())),
    };
    let pipeline = AnalysisPipeline::new(config);
    Ok(match store {
        Some(store) => pipeline.with_store(store),
        None => pipeline,
    })
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        emit(&json!({
            "engine_version": ENGINE_VERSION,
            "file_types": FileType::ALL.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
            "process_types": ProcessType::ALL.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
        }));
        return ExitCode::SUCCESS;
    }

    let pipeline = match load_config(&cli).and_then(|config| build_pipeline(&cli, config)) {
        Ok(p) => p,
        Err(e) => return fail(EXIT_SERVER_ERROR, e),
    };

    match &cli.command {
        Commands::Analyze { payload } => {
            let request: AnalysisRequest = match serde_json::from_str(payload) {
                Ok(r) => r,
                Err(e) => return fail(EXIT_CLIENT_ERROR, format!("Invalid payload: {}", e)),
            };

            match pipeline.analyze(&request) {
                Ok(result) => {
                    emit(&json!({ "success": true, "result": result }));
                    ExitCode::SUCCESS
                }
                Err(e) if e.is_client_error() => fail(EXIT_CLIENT_ERROR, e),
                Err(e) => fail(EXIT_SERVER_ERROR, e),
            }
        }

        Commands::Batch { payload_file } => {
            let content = match fs::read_to_string(payload_file) {
                Ok(c) => c,
                Err(e) => return fail(EXIT_CLIENT_ERROR, format!("Cannot read {}: {}", payload_file.display(), e)),
            };
            let requests: Vec<AnalysisRequest> = match serde_json::from_str(&content) {
                Ok(r) => r,
                Err(e) => return fail(EXIT_CLIENT_ERROR, format!("Invalid payload: {}", e)),
            };

            let items = pipeline.analyze_batch(&requests);
            let all_ok = items.iter().all(|i| i.status == BatchStatus::Success);
            emit(&json!({ "success": all_ok, "results": items }));
            if all_ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_CLIENT_ERROR)
            }
        }

        Commands::Job { id } => match pipeline.job_status(id) {
            Ok(Some(record)) => {
                emit(&json!({ "success": true, "job": record }));
                ExitCode::SUCCESS
            }
            Ok(None) => fail(EXIT_NOT_FOUND, format!("Job not found: {}", id)),
            Err(e) => fail(EXIT_SERVER_ERROR, e),
        },

        Commands::Version => ExitCode::SUCCESS,
    }
}
