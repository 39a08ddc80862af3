mod exit_codes;
mod logging;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use sheetcheck_core::{BaseColumns, ObservedTable, Record, Table};
use sheetcheck_storage::{
    load_records, write_atomic, write_table_csv, FileObservedSource, HttpClientConfig,
    HttpFetcher, ObservedSource, ProofArchive, SheetValuesSource,
};
use sheetcheck_verify::export::{fill_report, record_matches, render_fill_report};
use sheetcheck_verify::{
    load_base_columns, CompareMode, MatchMode, ReportOptions, RunSettings, SourceLabels,
    TableBuilder, VerifyConfig, Verifier,
};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "sheetcheck")]
#[command(about = "Verify that a spreadsheet tab reproduces the catalog export")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compare an observed table against the canonical table built from records.
    Verify(VerifyArgs),
    /// Build the canonical table and write it as CSV.
    Export(ExportArgs),
}

#[derive(Debug, Args)]
struct SharedArgs {
    /// Catalog records JSON (defaults to SHEETCHECK_RECORDS or assets.json).
    #[arg(long)]
    records: Option<PathBuf>,
    /// YAML file replacing the default base column list.
    #[arg(long)]
    columns: Option<PathBuf>,
    #[arg(long)]
    match_preview: Option<usize>,
    /// Print every row/record correspondence instead of a preview.
    #[arg(long)]
    print_matches: bool,
}

#[derive(Debug, Args)]
struct VerifyArgs {
    #[command(flatten)]
    shared: SharedArgs,
    /// Observed table as a JSON values dump or CSV file.
    #[arg(long, conflicts_with = "sheet")]
    observed: Option<PathBuf>,
    /// Spreadsheet id (defaults to GOOGLE_SHEET_ID).
    #[arg(long)]
    sheet: Option<String>,
    /// Tab to read from the spreadsheet.
    #[arg(long)]
    tab: Option<String>,
    #[arg(long, default_value = "auto")]
    mode: CompareMode,
    #[arg(long, default_value = "order")]
    match_mode: MatchMode,
    #[arg(long)]
    max_diffs: Option<usize>,
    /// Write the narrative report to this file as well as stdout.
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    summary_json: Option<PathBuf>,
    /// Store the narrative report in a hash-addressed archive.
    #[arg(long)]
    archive_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ExportArgs {
    #[command(flatten)]
    shared: SharedArgs,
    /// CSV destination; stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();
    let settings = RunSettings::from_env();

    let result = match cli.command {
        Commands::Verify(args) => run_verify(args, settings).await,
        Commands::Export(args) => run_export(args, settings).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!(error = %format!("{err:#}"), "run aborted");
            eprintln!("error: {err:#}");
            ExitCode::from(exit_codes::FATAL)
        }
    }
}

async fn load_inputs(
    shared: &SharedArgs,
    settings: &RunSettings,
) -> Result<(BaseColumns, PathBuf, Vec<Record>)> {
    let columns_file = shared.columns.as_deref().or(settings.columns_file.as_deref());
    let base = load_base_columns(columns_file)?;
    let records_path = shared
        .records
        .clone()
        .unwrap_or_else(|| settings.records_path.clone());
    let records = load_records(&records_path).await?;
    info!(records = records.len(), path = %records_path.display(), "loaded catalog records");
    Ok((base, records_path, records))
}

fn report_options(shared: &SharedArgs, settings: &RunSettings, max_diffs: usize) -> ReportOptions {
    ReportOptions {
        max_diffs,
        match_preview: shared.match_preview.unwrap_or(settings.match_preview),
        print_all_matches: shared.print_matches,
    }
}

fn observed_source(args: &VerifyArgs, settings: &RunSettings) -> Result<Box<dyn ObservedSource>> {
    if let Some(path) = &args.observed {
        return Ok(Box::new(FileObservedSource::new(path)));
    }

    let sheet_id = args
        .sheet
        .clone()
        .or_else(|| settings.sheet_id.clone())
        .context("no observed table: pass --observed FILE, or --sheet (or GOOGLE_SHEET_ID) with --tab")?;
    let tab = args
        .tab
        .clone()
        .context("--tab is required when reading a live sheet")?;
    let token = settings
        .access_token
        .clone()
        .context("GOOGLE_ACCESS_TOKEN must hold a bearer token to read a live sheet")?;
    let fetcher = HttpFetcher::new(HttpClientConfig {
        timeout: Duration::from_secs(settings.http_timeout_secs),
        user_agent: Some(format!("sheetcheck/{}", env!("CARGO_PKG_VERSION"))),
        ..HttpClientConfig::default()
    })?;
    Ok(Box::new(SheetValuesSource::new(fetcher, token, sheet_id, tab)))
}

async fn run_verify(args: VerifyArgs, settings: RunSettings) -> Result<u8> {
    let (base, records_path, records) = load_inputs(&args.shared, &settings).await?;
    let source = observed_source(&args, &settings)?;
    let raw = source
        .read_raw()
        .await
        .with_context(|| format!("reading observed table {}", source.describe()))?;
    let observed = ObservedTable::from_raw(raw)
        .with_context(|| format!("observed table {}", source.describe()))?;

    let options = report_options(
        &args.shared,
        &settings,
        args.max_diffs.unwrap_or(settings.max_diffs),
    );
    let verifier = Verifier::new(
        base,
        VerifyConfig {
            mode: args.mode,
            match_mode: args.match_mode,
            report: options,
        },
    );
    let labels = SourceLabels {
        records: records_path.display().to_string(),
        observed: source.describe(),
    };
    let generated_at = Utc::now();
    let outcome = verifier.verify(&records, &observed, &labels, generated_at)?;
    let report = outcome.render(&options);
    print!("{report}");

    if let Some(path) = &args.out {
        write_atomic(path, report.as_bytes()).await?;
        info!(path = %path.display(), "wrote report");
    }
    if let Some(path) = &args.summary_json {
        let json = serde_json::to_vec_pretty(&outcome.summary).context("serializing summary")?;
        write_atomic(path, &json).await?;
        info!(path = %path.display(), "wrote summary");
    }
    if let Some(root) = args.archive_dir.as_ref().or(settings.archive_dir.as_ref()) {
        let stored = ProofArchive::new(root)
            .store_bytes(generated_at, &labels.observed, "txt", report.as_bytes())
            .await?;
        info!(
            path = %stored.absolute_path.display(),
            deduplicated = stored.deduplicated,
            "archived report"
        );
    }

    Ok(exit_codes::for_verdict(outcome.verdict()))
}

async fn run_export(args: ExportArgs, settings: RunSettings) -> Result<u8> {
    let (base, _, records) = load_inputs(&args.shared, &settings).await?;
    let builder = TableBuilder::new(&base);
    let schema = builder.build_header(&records);
    let table = builder.build_table(&records, schema.columns());
    info!(%schema, rows = table.rows.len(), "built canonical table");

    match &args.out {
        Some(path) => write_csv_file(path, &table).await?,
        None => write_table_csv(std::io::stdout().lock(), &table)?,
    }

    let options = report_options(&args.shared, &settings, settings.max_diffs);
    let report = fill_report(&table, &schema);
    eprint!(
        "{}",
        render_fill_report(&report, &record_matches(&builder, &records), &options)
    );
    Ok(exit_codes::SUCCESS)
}

async fn write_csv_file(path: &Path, table: &Table) -> Result<()> {
    let mut buffer = Vec::new();
    write_table_csv(&mut buffer, table)?;
    write_atomic(path, &buffer).await?;
    info!(path = %path.display(), bytes = buffer.len(), "wrote csv");
    Ok(())
}
