// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

// Use library instead of local modules
use fluxo_grafico::{
    analyze_selection, load, AggregateOptions, ColumnNames, Selection, SheetOutcome, SheetReport,
    WeekGrouping, Workbook,
};

#[derive(Parser)]
#[command(name = "fluxo-grafico", version, about = "Receita e despesa por dia e por semana")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the sheets of a workbook
    Sheets {
        file: PathBuf,
    },
    /// Print daily and weekly totals for the selected sheets
    Report {
        file: PathBuf,
        /// Sheet to analyze (repeatable)
        #[arg(short, long = "sheet")]
        sheets: Vec<String>,
        /// Analyze every sheet
        #[arg(long, conflicts_with = "sheets")]
        all: bool,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
        #[command(flatten)]
        options: OptionArgs,
    },
    /// Interactive terminal view with charts
    #[cfg(feature = "tui")]
    View {
        file: PathBuf,
        #[command(flatten)]
        options: OptionArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Csv,
    Json,
}

#[derive(Args, Clone)]
struct OptionArgs {
    /// Group weeks by ISO year as well as week number
    #[arg(long)]
    by_year: bool,
    /// Read slash dates as DD/MM/YYYY
    #[arg(long)]
    day_first: bool,
    #[arg(long, default_value = fluxo_grafico::config::DEFAULT_DATE_COLUMN)]
    date_column: String,
    #[arg(long, default_value = fluxo_grafico::config::DEFAULT_REVENUE_COLUMN)]
    revenue_column: String,
    #[arg(long, default_value = fluxo_grafico::config::DEFAULT_EXPENSE_COLUMN)]
    expense_column: String,
}

impl OptionArgs {
    fn to_options(&self) -> AggregateOptions {
        let grouping = if self.by_year {
            WeekGrouping::IsoYearWeek
        } else {
            WeekGrouping::WeekNumber
        };

        AggregateOptions::default()
            .with_week_grouping(grouping)
            .with_day_first(self.day_first)
            .with_columns(ColumnNames {
                date: self.date_column.clone(),
                revenue: self.revenue_column.clone(),
                expense: self.expense_column.clone(),
            })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Sheets { file } => run_sheets(&file),
        Command::Report {
            file,
            sheets,
            all,
            format,
            options,
        } => run_report(&file, sheets, all, format, &options.to_options()),
        #[cfg(feature = "tui")]
        Command::View { file, options } => run_view(&file, &options.to_options()),
    }
}

fn read_workbook(path: &Path) -> Result<Workbook> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let workbook =
        load(&bytes).with_context(|| format!("Failed to load workbook: {}", path.display()))?;
    Ok(workbook)
}

fn run_sheets(path: &Path) -> Result<()> {
    let workbook = read_workbook(path)?;

    println!("📂 {}", path.display());
    for (i, name) in workbook.sheet_names.iter().enumerate() {
        let rows = workbook.sheet(name).map(|s| s.row_count()).unwrap_or(0);
        println!("  {:>2}. {} ({} rows)", i + 1, name, rows);
    }

    Ok(())
}

fn run_report(
    path: &Path,
    sheets: Vec<String>,
    all: bool,
    format: OutputFormat,
    options: &AggregateOptions,
) -> Result<()> {
    let workbook = read_workbook(path)?;

    let selection = if all {
        Selection::all(&workbook)
    } else {
        Selection::new(sheets)
    };

    let reports = match analyze_selection(&workbook, &selection, options) {
        Ok(reports) => reports,
        Err(err) if err.is_warning() => {
            eprintln!("⚠️  {}", err);
            eprintln!("   Sheets: {}", workbook.sheet_names.join(", "));
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    match format {
        OutputFormat::Table => {
            for report in &reports {
                print_report(report);
            }
        }
        OutputFormat::Csv => write_csv(&reports, io::stdout())?,
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
    }

    // Table output shows failures inline; machine formats get them on stderr
    if !matches!(format, OutputFormat::Table) {
        for err in reports.iter().filter_map(|r| r.error()) {
            eprintln!("❌ {}", err);
        }
    }

    Ok(())
}

fn print_report(report: &SheetReport) {
    println!("\n📊 Análise do mês: {}", report.sheet);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let analysis = match &report.outcome {
        SheetOutcome::Ready(analysis) => analysis,
        SheetOutcome::Failed { error, .. } => {
            println!("❌ {}", error);
            return;
        }
    };

    let chart = &analysis.daily_chart;
    println!("\n{}", analysis.daily_caption);
    println!(
        "{:<12} {:>14} {:>14}",
        chart.x_label, chart.revenue_label, chart.expense_label
    );
    for row in &analysis.aggregation.daily {
        println!(
            "{:<12} {:>14.2} {:>14.2}",
            row.date.format("%Y-%m-%d").to_string(),
            row.revenue,
            row.expense
        );
    }

    let chart = &analysis.weekly_chart;
    println!("\n{}", analysis.weekly_caption);
    println!(
        "{:<16} {:>14} {:>14}",
        chart.x_label, chart.revenue_label, chart.expense_label
    );
    for row in &analysis.aggregation.weekly {
        println!("{:<16} {:>14.2} {:>14.2}", row.label, row.revenue, row.expense);
    }

    let totals = &analysis.totals;
    println!(
        "\n✓ {} rows | {} {:.2} | {} {:.2} | saldo {:.2}",
        totals.rows,
        chart.revenue_label,
        totals.revenue,
        chart.expense_label,
        totals.expense,
        totals.balance
    );
}

#[derive(Serialize)]
struct CsvRow<'a> {
    sheet: &'a str,
    period: &'static str,
    key: String,
    revenue: f64,
    expense: f64,
}

fn write_csv<W: io::Write>(reports: &[SheetReport], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);

    for report in reports {
        let Some(analysis) = report.analysis() else {
            continue;
        };

        for row in &analysis.aggregation.daily {
            writer.serialize(CsvRow {
                sheet: &report.sheet,
                period: "daily",
                key: row.date.format("%Y-%m-%d").to_string(),
                revenue: row.revenue,
                expense: row.expense,
            })?;
        }
        for row in &analysis.aggregation.weekly {
            writer.serialize(CsvRow {
                sheet: &report.sheet,
                period: "weekly",
                key: row.label.clone(),
                revenue: row.revenue,
                expense: row.expense,
            })?;
        }
    }

    writer.flush().context("Failed to write CSV")?;
    Ok(())
}

#[cfg(feature = "tui")]
fn run_view(path: &Path, options: &AggregateOptions) -> Result<()> {
    println!("🖥️  Loading {}...\n", path.display());

    let workbook = read_workbook(path)?;
    println!("✓ Loaded {} sheets", workbook.sheet_names.len());
    println!("Starting UI... (Press 'q' to quit)\n");

    let mut app = ui::App::new(workbook, options.clone());
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}
