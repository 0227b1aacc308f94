use crate::config::SheetkitConfig;
use crate::core::dates::DateFormat;
use crate::core::grouping::GroupOptions;
use crate::core::lookup::{JoinOptions, ResultColumn};
use crate::error::SheetResult;
use crate::excel::naming::{
    grouped_output_path, timestamped_name, validate_input, GROUPED_PREFIX, LOOKUP_PREFIX,
};
use crate::excel::{detect_date_column, ExcelImporter, OutputMode};
use crate::runner::{
    GroupJob, Job, LookupJob, ProgressEvent, RunController, RunHandle, RunRequest, RunStatus,
    RunSummary,
};
use chrono::Local;
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Header appended by `lookup` when no target column is given
pub const DEFAULT_RESULT_HEADER: &str = "VLOOKUP";

/// Options of the `group` command
#[derive(Debug, Clone, Default)]
pub struct GroupArgs {
    pub input: PathBuf,
    pub column: Option<String>,
    pub format: Option<String>,
    pub output: Option<PathBuf>,
    pub timestamped: bool,
    pub mode: Option<OutputMode>,
    pub keep_key: bool,
    /// Overrides `keep_original` from the config when set
    pub keep_original: Option<bool>,
    /// Overrides `merge_on` from the config when set
    pub merge_on: Option<Vec<String>>,
    pub config: Option<PathBuf>,
    pub json: bool,
    pub verbose: bool,
}

/// Options of the `lookup` command
#[derive(Debug, Clone, Default)]
pub struct LookupArgs {
    pub primary: PathBuf,
    pub reference: PathBuf,
    pub lookup_column: String,
    pub search_column: String,
    pub result_column: String,
    pub target_column: Option<String>,
    pub not_found: Option<String>,
    pub output: Option<PathBuf>,
    pub mode: Option<OutputMode>,
    pub config: Option<PathBuf>,
    pub json: bool,
    pub verbose: bool,
}

/// Split the first sheet of a workbook into one sheet per date
pub fn group(args: GroupArgs) -> SheetResult<RunSummary> {
    let config = SheetkitConfig::load_or_default(args.config.as_deref())?;
    let date_format = args
        .format
        .as_deref()
        .map(DateFormat::from_token)
        .unwrap_or_else(|| config.date_format());

    let output = match args.output {
        Some(path) => path,
        None if args.timestamped => {
            let name = timestamped_name(GROUPED_PREFIX, Local::now().naive_local());
            sibling(&args.input, &name)
        }
        None => grouped_output_path(&args.input),
    };

    if !args.json {
        println!("{}", "📅 Sheetkit - Group by date".bold().green());
        println!("   Input:  {}", args.input.display());
        println!("   Output: {}", output.display());
        if let Some(column) = &args.column {
            println!("   Column: {}", column.bright_blue().bold());
        }
        println!("   Format: {}\n", date_format.token().bright_yellow());
    }

    let job = Job::Group(GroupJob {
        input: args.input,
        output,
        key_column: args.column,
        options: GroupOptions {
            date_format,
            keep_key_column: args.keep_key || config.keep_key_column,
            merge_on: args.merge_on.or_else(|| config.merge_on.clone()),
        },
        keep_original: args.keep_original.unwrap_or(config.keep_original),
    });
    let summary = run(job, args.mode, &config, args.json, args.verbose)?;

    if !args.json && summary.status.is_completed() {
        println!("   📊 Groups:       {}", summary.groups.to_string().bold());
        println!("   🔗 Merged rows:  {}", summary.merged_rows);
        if summary.invalid_rows > 0 {
            println!(
                "   {} Invalid dates: {} row(s) skipped",
                "⚠️".yellow(),
                summary.invalid_rows.to_string().yellow()
            );
        }
    }
    Ok(summary)
}

/// Multi-value VLOOKUP of one workbook against another
pub fn lookup(args: LookupArgs) -> SheetResult<RunSummary> {
    let config = SheetkitConfig::load_or_default(args.config.as_deref())?;
    let not_found = args.not_found.unwrap_or_else(|| config.not_found.clone());
    let target = match args.target_column {
        Some(name) => ResultColumn::Named(name),
        None => ResultColumn::Append(DEFAULT_RESULT_HEADER.to_string()),
    };

    let output = args.output.unwrap_or_else(|| {
        let name = timestamped_name(LOOKUP_PREFIX, Local::now().naive_local());
        sibling(&args.primary, &name)
    });

    if !args.json {
        println!("{}", "🔎 Sheetkit - Multi-value VLOOKUP".bold().green());
        println!("   Primary:   {}", args.primary.display());
        println!("   Reference: {}", args.reference.display());
        println!("   Output:    {}", output.display());
        println!(
            "   {} → {} ⇒ {}\n",
            args.lookup_column.bright_blue().bold(),
            args.search_column.bright_blue(),
            args.result_column.bright_blue()
        );
    }

    let job = Job::Lookup(LookupJob {
        primary: args.primary,
        reference: args.reference,
        output,
        lookup_column: args.lookup_column,
        search_column: args.search_column,
        result_column: args.result_column,
        join: JoinOptions { not_found, target },
    });
    let summary = run(job, args.mode, &config, args.json, args.verbose)?;

    if !args.json && summary.status.is_completed() {
        println!("   ✅ Matched:   {}", summary.matched.to_string().bold().green());
        println!("   ❔ Not found: {}", summary.not_found.to_string().yellow());
    }
    Ok(summary)
}

/// List the header of a workbook's first sheet
pub fn columns(input: PathBuf) -> SheetResult<()> {
    validate_input(&input)?;
    println!("{}", "📋 Sheetkit - Columns".bold().green());
    println!("   File: {}\n", input.display());

    let header = ExcelImporter::new(&input).list_columns()?;
    let date_column = detect_date_column(&header);
    for (idx, name) in header.iter().enumerate() {
        if Some(name.as_str()) == date_column {
            println!("   {:>3}  {}  {}", idx + 1, name.bright_blue().bold(), "(date)".cyan());
        } else {
            println!("   {:>3}  {}", idx + 1, name);
        }
    }
    println!();
    match date_column {
        Some(name) => println!("   Detected date column: {}", name.bold().green()),
        None => println!("{}", "   No date column detected; use --column with 'group'".yellow()),
    }
    Ok(())
}

/// `name` in the same directory as `input`
fn sibling(input: &Path, name: &str) -> PathBuf {
    input.with_file_name(name)
}

fn run(
    job: Job,
    mode: Option<OutputMode>,
    config: &SheetkitConfig,
    json: bool,
    verbose: bool,
) -> SheetResult<RunSummary> {
    let request = RunRequest {
        job,
        mode: mode.unwrap_or(config.mode),
        style: config.style.clone(),
        batch_size: config.batch_size,
    };
    let handle = RunController::new().start(request)?;
    if !json {
        print_progress(&handle, verbose);
    }
    let summary = handle.join();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_status(&summary);
    }
    Ok(summary)
}

/// Print events until the worker hangs up
fn print_progress(handle: &RunHandle, verbose: bool) {
    for event in handle.events() {
        match event {
            ProgressEvent::Stage(message) => println!("{}", format!("▸ {message}").cyan()),
            ProgressEvent::Rows { done, total } if verbose => {
                println!("   {} / {} rows", done, total);
            }
            ProgressEvent::Rows { .. } | ProgressEvent::Finished(_) => {}
        }
    }
    println!();
}

fn print_status(summary: &RunSummary) {
    match &summary.status {
        RunStatus::Completed => {
            println!("{}", "✅ Done!".bold().green());
            if let Some(path) = &summary.output {
                println!("   Excel file: {}", path.display());
            }
            println!("   Rows:       {}", summary.rows_scanned);
            println!("   Sheets:     {}", summary.sheets);
        }
        RunStatus::Cancelled => {
            println!("{}", "⏹  Cancelled - nothing written".yellow());
        }
        RunStatus::Failed(message) => {
            eprintln!("{}", format!("❌ {message}").bold().red());
        }
    }
}
