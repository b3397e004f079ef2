//! The `platewise analyze` command.

use super::expand_path;
use clap::Args;
use platewise_core::{
    AnalysisInput, AnalysisRequest, AnalysisResult, Config, Gateway, GatewayError,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Arguments for the `analyze` command.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Meal photo(s) to analyze
    #[arg(required_unless_present = "text", conflicts_with = "text")]
    pub images: Vec<PathBuf>,

    /// Analyze a text description of a meal instead of a photo
    #[arg(short, long)]
    pub text: Option<String>,

    /// Identifier echoed back in the result
    #[arg(long)]
    pub request_id: Option<String>,

    /// Give up after this many milliseconds (overrides gateway.request_deadline_ms)
    #[arg(long)]
    pub deadline_ms: Option<u64>,

    /// Maximum concurrent analyses when several photos are given
    #[arg(short, long, default_value = "4")]
    pub parallel: usize,

    /// Print compact JSON (one line per result) instead of pretty JSON
    #[arg(long)]
    pub compact: bool,
}

/// One line of batch output.
#[derive(Debug, Serialize)]
struct BatchRecord {
    input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Execute the analyze command.
pub async fn execute(args: AnalyzeArgs, config: &Config) -> anyhow::Result<()> {
    let gateway = Arc::new(Gateway::from_config(config).await?);
    let deadline = args.deadline_ms.map(Duration::from_millis);

    let outcome = if let Some(text) = &args.text {
        let mut request = AnalysisRequest::new(AnalysisInput::text(text.as_str()));
        if let Some(id) = &args.request_id {
            request = request.with_request_id(id.as_str());
        }
        if let Some(deadline) = deadline {
            request = request.with_deadline(deadline);
        }
        analyze_one(&gateway, request, args.compact).await
    } else if args.images.len() == 1 {
        let path = expand_path(&args.images[0]);
        let input = AnalysisInput::from_image_path(&path).await?;
        let mut request = AnalysisRequest::new(input);
        if let Some(id) = &args.request_id {
            request = request.with_request_id(id.as_str());
        }
        if let Some(deadline) = deadline {
            request = request.with_deadline(deadline);
        }
        analyze_one(&gateway, request, args.compact).await
    } else {
        analyze_batch(&gateway, &args, deadline).await
    };

    // Persist before the runtime shuts down the background writer
    if let Err(e) = gateway.cache().flush().await {
        tracing::warn!("Failed to save result cache: {e}");
    }
    outcome
}

async fn analyze_one(
    gateway: &Gateway,
    request: AnalysisRequest,
    compact: bool,
) -> anyhow::Result<()> {
    match gateway.analyze(request).await {
        Ok(result) => {
            if result.is_empty() {
                tracing::info!("No food detected");
            }
            let json = if compact {
                serde_json::to_string(&result)?
            } else {
                serde_json::to_string_pretty(&result)?
            };
            println!("{json}");
            Ok(())
        }
        Err(e) => {
            report_failure(&e);
            Err(e.into())
        }
    }
}

/// Analyze several photos concurrently, printing one JSON line per photo as each completes.
///
/// Returns an error if any photo failed.
async fn analyze_batch(
    gateway: &Arc<Gateway>,
    args: &AnalyzeArgs,
    deadline: Option<Duration>,
) -> anyhow::Result<()> {
    let semaphore = Arc::new(Semaphore::new(args.parallel.max(1)));
    let mut handles = Vec::with_capacity(args.images.len());

    for (index, image) in args.images.iter().enumerate() {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            tracing::warn!("Analysis semaphore closed unexpectedly, stopping batch");
            break;
        };

        let gateway = gateway.clone();
        let path = expand_path(image);
        let request_id = args
            .request_id
            .as_ref()
            .map(|id| format!("{id}-{}", index + 1));

        handles.push(tokio::spawn(async move {
            let outcome = analyze_path(&gateway, &path, request_id, deadline).await;
            drop(permit);

            let record = match outcome {
                Ok(result) => BatchRecord {
                    input: path.display().to_string(),
                    result: Some(result),
                    error: None,
                },
                Err(message) => {
                    tracing::error!("{}: {message}", path.display());
                    BatchRecord {
                        input: path.display().to_string(),
                        result: None,
                        error: Some(message),
                    }
                }
            };
            let success = record.error.is_none();
            match serde_json::to_string(&record) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::error!("Failed to serialize result: {e}"),
            }
            success
        }));
    }

    let mut succeeded = 0usize;
    let mut failed = 0usize;
    for handle in handles {
        match handle.await {
            Ok(true) => succeeded += 1,
            Ok(false) => failed += 1,
            Err(e) => {
                tracing::error!("Analysis task panicked: {e}");
                failed += 1;
            }
        }
    }

    tracing::info!("Analyzed {succeeded} photo(s), {failed} failed");
    if failed > 0 {
        anyhow::bail!("{failed} of {} analyses failed", succeeded + failed);
    }
    Ok(())
}

async fn analyze_path(
    gateway: &Gateway,
    path: &std::path::Path,
    request_id: Option<String>,
    deadline: Option<Duration>,
) -> Result<AnalysisResult, String> {
    let input = AnalysisInput::from_image_path(path)
        .await
        .map_err(|e| format!("failed to read image: {e}"))?;
    let mut request = AnalysisRequest::new(input);
    if let Some(id) = request_id {
        request = request.with_request_id(id);
    }
    if let Some(deadline) = deadline {
        request = request.with_deadline(deadline);
    }
    gateway.analyze(request).await.map_err(|e| e.to_string())
}

fn report_failure(error: &GatewayError) {
    for outcome in error.outcomes() {
        tracing::error!("  {outcome}");
    }
}
