use anyhow::{bail, Context, Result};
use clap::Parser;
use pagewise::config::{self, IngestCli};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    config::init_logging();
    let cli = IngestCli::parse();
    let bytes = tokio::fs::read(&cli.file)
        .await
        .with_context(|| format!("failed to read {}", cli.file.display()))?;
    let title = match &cli.title {
        Some(title) => title.clone(),
        None => cli
            .file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .context("input path has no file name")?,
    };

    let backends = cli.model.connect().await?;
    let pipeline = cli.model.pipeline(&backends);
    let report = match pipeline
        .ingest(&title, &cli.file.to_string_lossy(), bytes)
        .await
    {
        Ok(report) => report,
        Err(err) => {
            error!(code = err.error_code(), document_id = ?err.document_id(), "ingestion failed");
            return Err(err).context(format!("failed to ingest {}", cli.file.display()));
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    for failure in &report.failures {
        warn!(page_number = failure.page_number, reason = %failure.reason, "page skipped");
    }
    if !report.processed {
        bail!(
            "document {} partially indexed: pages {:?} skipped",
            report.document_id,
            report.skipped_pages
        );
    }
    info!(
        document_id = report.document_id,
        pages = report.total_pages,
        "ingestion complete"
    );
    Ok(())
}
