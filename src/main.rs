use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use sheet_jobs::execution::{
    DirectorySource, InMemoryJobStore, JobRequest, JobStatus, Orchestrator, OrchestratorOptions,
    TracingJobObserver,
};
use sheet_jobs::logging::init_tracing;
use sheet_jobs::processing::HeuristicNarrator;

#[derive(Parser)]
#[command(name = "sheet-jobs")]
#[command(about = "Run an analyze/transform/validate/extract job against a spreadsheet")]
#[command(version)]
struct Cli {
    /// Directory the input file is read from
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// File name inside --dir (.xlsx, .xls, .ods or .csv)
    #[arg(long)]
    file: String,

    /// One of analyze, transform, validate, extract
    #[arg(long)]
    operation: String,

    /// Operation parameters as a JSON object; defaults apply when omitted
    #[arg(long)]
    params: Option<String>,

    /// Worker threads (defaults to available parallelism)
    #[arg(long)]
    threads: Option<usize>,

    /// Seconds to wait for the job to finish
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

fn main() -> Result<()> {
    init_tracing("sheet_jobs=info");
    let cli = Cli::parse();

    let parameters = cli
        .params
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("--params is not valid JSON")?;

    let opts = OrchestratorOptions {
        num_threads: cli.threads,
        ..OrchestratorOptions::default()
    };
    let orchestrator = Orchestrator::new(
        Arc::new(DirectorySource::new(cli.dir.clone())),
        Arc::new(InMemoryJobStore::new()),
        Arc::new(HeuristicNarrator),
        opts,
    )?
    .with_observer(Arc::new(TracingJobObserver));

    let mut request = JobRequest::new(cli.file, cli.operation);
    if let Some(parameters) = parameters {
        request = request.with_parameters(parameters);
    }

    let job = orchestrator.submit(request).context("job rejected")?;
    let job = orchestrator.wait_for_terminal(job.id, Duration::from_secs(cli.timeout_secs))?;

    let details = orchestrator.job_details(job.id)?;
    println!("{}", serde_json::to_string_pretty(&details)?);
    info!(metrics = %orchestrator.metrics().snapshot(), "finished");

    if job.status == JobStatus::Failed {
        bail!("job {} failed: {}", job.id, job.error.unwrap_or_default());
    }
    Ok(())
}
