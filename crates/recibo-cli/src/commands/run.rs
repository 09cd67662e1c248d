//! Run command - process a directory of receipt files.

use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::info;

use recibo_core::classify::ClassificationTable;
use recibo_core::config::ReciboConfig;
use recibo_core::extract::FileExtractor;
use recibo_core::llm::ModelClient;
use recibo_core::ocr::TesseractOcr;
use recibo_core::pipeline::{FileStatus, Pipeline, RunReport};

use super::default_config_path;

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Directory containing the receipt files
    #[arg(default_value = "./")]
    files_dir: PathBuf,

    /// Path to the classification CSV (nome_pagamento, codigos)
    #[arg(short, long, default_value = "./dbcodigocontas.csv")]
    table: PathBuf,

    /// LLM model name (overrides config and RECIBO_MODEL)
    #[arg(short, long)]
    model: Option<String>,

    /// Base URL of the LLM endpoint
    #[arg(long)]
    base_url: Option<String>,

    /// API key for the LLM endpoint
    #[arg(long)]
    api_key: Option<String>,

    /// Tesseract OCR language
    #[arg(long)]
    ocr_lang: Option<String>,

    /// Timeout in seconds for LLM calls
    #[arg(long)]
    timeout: Option<u64>,

    /// Compute destination names without renaming anything
    #[arg(long)]
    dry_run: bool,

    /// Write a CSV report of every file's outcome
    #[arg(long)]
    report: Option<PathBuf>,
}

pub async fn run(args: RunArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = resolve_config(&args, config_path)?;

    info!(
        model = %config.llm.model,
        base_url = %config.llm.base_url,
        api_key = %config.masked_api_key(),
        ocr_language = %config.ocr.language,
        timeout_s = config.llm.timeout_seconds,
        "configuration resolved"
    );

    if args.dry_run {
        println!(
            "{} Dry-run mode: no file will actually be renamed",
            style("ℹ").blue()
        );
    }

    // Fatal checks, all before any file is touched.
    let table = ClassificationTable::from_csv_path(&args.table)?;
    let ocr = TesseractOcr::verify(&config.ocr)?;

    let extractor = FileExtractor::new(ocr, config.pdf.clone(), config.image.clone());
    let client = ModelClient::new(config.llm.clone())?;
    let pipeline = Pipeline::new(
        extractor,
        client,
        table,
        config.validation.max_amount,
        args.dry_run,
    );

    let report = pipeline.run(&args.files_dir).await?;

    print_summary(&report, start);

    if let Some(report_path) = &args.report {
        write_report_csv(report_path, &report)?;
        println!(
            "{} Report written to {}",
            style("✓").green(),
            report_path.display()
        );
    }

    Ok(())
}

fn resolve_config(args: &RunArgs, config_path: Option<&str>) -> anyhow::Result<ReciboConfig> {
    let mut config = match config_path {
        Some(path) => ReciboConfig::from_file(std::path::Path::new(path))?,
        None => {
            let default_path = default_config_path();
            if default_path.exists() {
                ReciboConfig::from_file(&default_path)?
            } else {
                ReciboConfig::default()
            }
        }
    };

    config.apply_env();

    // CLI flags take precedence over env vars and the file.
    if let Some(model) = &args.model {
        config.llm.model = model.clone();
    }
    if let Some(base_url) = &args.base_url {
        config.llm.base_url = base_url.clone();
    }
    if let Some(api_key) = &args.api_key {
        config.llm.api_key = api_key.clone();
    }
    if let Some(lang) = &args.ocr_lang {
        config.ocr.language = lang.clone();
    }
    if let Some(timeout) = args.timeout {
        anyhow::ensure!(timeout > 0, "timeout must be greater than zero");
        config.llm.timeout_seconds = timeout;
    }

    Ok(config)
}

fn print_summary(report: &RunReport, start: Instant) {
    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        report.results.len(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} skipped, {} failed",
        style(report.successes()).green(),
        style(report.skipped()).yellow(),
        style(report.failures()).red()
    );

    for result in &report.results {
        if result.status == FileStatus::Success {
            if let Some(new_name) = &result.new_name {
                println!("   {} -> {}", result.file_name(), new_name);
            }
        }
    }

    if report.failures() > 0 {
        println!();
        println!("{}", style("Files with errors:").red());
        for result in report.non_successes() {
            if result.status != FileStatus::Failed {
                continue;
            }
            println!(
                "  - {}: [{}] {}",
                result.file_name(),
                result.error_kind().unwrap_or("unknown"),
                result.error.as_ref().map(render_error).unwrap_or_default()
            );
        }
    }
}

/// Render a per-file error. Every variant's `Display` already interpolates
/// the full message of its cause, so walking `source()` would print each
/// layer twice.
fn render_error(error: &recibo_core::ReciboError) -> String {
    error.to_string()
}

fn write_report_csv(path: &PathBuf, report: &RunReport) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record(["filename", "status", "new_name", "label", "error_kind", "error"])?;

    for result in &report.results {
        let status = match result.status {
            FileStatus::Success => "success",
            FileStatus::Skipped => "skipped",
            FileStatus::Failed => "failed",
        };
        wtr.write_record(&[
            result.file_name(),
            status.to_string(),
            result.new_name.clone().unwrap_or_default(),
            result.label.clone().unwrap_or_default(),
            result.error_kind().unwrap_or("").to_string(),
            result.error.as_ref().map(render_error).unwrap_or_default(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
