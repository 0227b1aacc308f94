use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use royalbit_sheetkit::cli::{self, GroupArgs, LookupArgs};
use royalbit_sheetkit::excel::OutputMode;
use royalbit_sheetkit::runner::{RunStatus, RunSummary};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sheetkit")]
#[command(
    about = "Split spreadsheets by date and run multi-value VLOOKUPs. Inputs are never modified."
)]
#[command(long_about = "Sheetkit - spreadsheet batch tools
Reads the first sheet of .xlsx/.xls/.xlsm/.xlsb/.ods files, writes a new .xlsx.

COMMANDS:
  group    - One sheet per date, duplicate rows merged
  lookup   - VLOOKUP where a cell may hold several newline-separated keys
  columns  - List the header of a workbook

EXAMPLES:
  sheetkit group orders.xlsx                       # auto-detects the date column
  sheetkit group orders.xlsx -c 下单时间 -f YYYY年MM月DD日 --mode styled
  sheetkit lookup orders.xlsx products.xlsx --lookup-column SKU \\
      --search-column SKU --result-column Name

LOGGING:
  -v enables debug logs on stderr; RUST_LOG overrides the filter.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Split rows into one sheet per calendar date.

The key column may hold Excel dates, datetimes, serial numbers or text such
as 2023-01-05, 2023/01/05, 2023年01月05日, 01-05-2023 or 05/01/2023.
Rows whose key cannot be read as a date are skipped and counted.

Rows of the same date with identical content collapse into one row. With
--merge-on COL..., rows agreeing on those columns merge and the cells that
differ are joined with a newline; a bare --merge-on merges every row of a
date into one.

SHEET NAME FORMATS (-f):
  YYYY-MM-DD (default) | YYYY/MM/DD | YYYY年MM月DD日 | MM-DD-YYYY | DD/MM/YYYY

OUTPUT:
  <input>_date_classified.xlsx next to the input, or
  分类表格_<YYYYMMDD_HHMMSS>.xlsx with --timestamped")]
    /// Split rows into one sheet per date
    Group {
        /// Input workbook
        input: PathBuf,

        /// Date column (default: first header containing date/日期/时间)
        #[arg(short, long)]
        column: Option<String>,

        /// Sheet name format token
        #[arg(short, long)]
        format: Option<String>,

        /// Output .xlsx path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Name the output 分类表格_<timestamp>.xlsx
        #[arg(long, conflicts_with = "output")]
        timestamped: bool,

        /// fast: values only; styled: header colors, wrap, row height
        #[arg(long, value_enum)]
        mode: Option<OutputMode>,

        /// Keep the date column in each sheet
        #[arg(long)]
        keep_key: bool,

        /// Copy the source sheet into the output first (default, see config)
        #[arg(long, overrides_with = "no_keep_original")]
        keep_original: bool,

        /// Leave the source sheet out of the output
        #[arg(long)]
        no_keep_original: bool,

        /// Merge rows of a date that agree on these columns
        #[arg(long, value_name = "COL", num_args = 0..)]
        merge_on: Option<Vec<String>>,

        /// YAML config file
        #[arg(long, env = "SHEETKIT_CONFIG")]
        config: Option<PathBuf>,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,

        /// Debug logging and row progress
        #[arg(short, long)]
        verbose: bool,
    },

    #[command(long_about = "Look up keys of one workbook in another.

Each cell of --lookup-column may contain several keys separated by line
breaks. Every key is searched in --search-column of the reference workbook
and replaced by the matching --result-column value; misses become the
not-found marker (default \"-\"). Results are joined with line breaks.

  X\\nZ\\nY  with {X: 10, Y: 20}  →  10\\n-\\n20

Results go to a new VLOOKUP column, or overwrite --target-column.

OUTPUT:
  VLOOKUP_结果_<YYYYMMDD_HHMMSS>.xlsx next to the primary workbook")]
    /// Multi-value VLOOKUP against a reference workbook
    Lookup {
        /// Workbook to fill in
        primary: PathBuf,

        /// Workbook to search
        reference: PathBuf,

        /// Column of the primary workbook holding the keys
        #[arg(long)]
        lookup_column: String,

        /// Key column of the reference workbook
        #[arg(long)]
        search_column: String,

        /// Value column of the reference workbook
        #[arg(long)]
        result_column: String,

        /// Write results into this column instead of appending one
        #[arg(long)]
        target_column: Option<String>,

        /// Marker for keys without a match
        #[arg(long)]
        not_found: Option<String>,

        /// Output .xlsx path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// fast: values only; styled: result column styled
        #[arg(long, value_enum)]
        mode: Option<OutputMode>,

        /// YAML config file
        #[arg(long, env = "SHEETKIT_CONFIG")]
        config: Option<PathBuf>,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,

        /// Debug logging and row progress
        #[arg(short, long)]
        verbose: bool,
    },

    /// List the columns of a workbook and the detected date column
    Columns {
        /// Input workbook
        input: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "royalbit_sheetkit=debug"
    } else {
        "royalbit_sheetkit=warn"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .init();
}

fn finish(summary: RunSummary) -> anyhow::Result<()> {
    match summary.status {
        RunStatus::Failed(message) => bail!(message),
        RunStatus::Completed | RunStatus::Cancelled => Ok(()),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Group {
            input,
            column,
            format,
            output,
            timestamped,
            mode,
            keep_key,
            keep_original,
            no_keep_original,
            merge_on,
            config,
            json,
            verbose,
        } => {
            init_tracing(verbose);
            let keep_original = match (keep_original, no_keep_original) {
                (_, true) => Some(false),
                (true, false) => Some(true),
                (false, false) => None,
            };
            let summary = cli::group(GroupArgs {
                input,
                column,
                format,
                output,
                timestamped,
                mode,
                keep_key,
                keep_original,
                merge_on,
                config,
                json,
                verbose,
            })
            .context("group failed")?;
            finish(summary)
        }

        Commands::Lookup {
            primary,
            reference,
            lookup_column,
            search_column,
            result_column,
            target_column,
            not_found,
            output,
            mode,
            config,
            json,
            verbose,
        } => {
            init_tracing(verbose);
            let summary = cli::lookup(LookupArgs {
                primary,
                reference,
                lookup_column,
                search_column,
                result_column,
                target_column,
                not_found,
                output,
                mode,
                config,
                json,
                verbose,
            })
            .context("lookup failed")?;
            finish(summary)
        }

        Commands::Columns { input } => {
            init_tracing(false);
            cli::columns(input)?;
            Ok(())
        }
    }
}
