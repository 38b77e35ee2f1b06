// 🧾 Sheet reports
// What every front end shows for a selection of sheets

use crate::aggregate::{aggregate, Aggregation};
use crate::config::AggregateOptions;
use crate::error::{DataError, UserInputError};
use crate::loader::{SheetTable, Workbook};
use crate::schema::RawTable;
use serde::Serialize;
use tracing::{info, warn};

// ============================================================================
// SELECTION
// ============================================================================

/// Sheets the user picked, in the order they picked them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    sheets: Vec<String>,
}

impl Selection {
    /// Duplicates are dropped, first occurrence wins
    pub fn new<I, S>(sheets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for sheet in sheets {
            let sheet = sheet.into();
            if !unique.contains(&sheet) {
                unique.push(sheet);
            }
        }
        Selection { sheets: unique }
    }

    pub fn all(workbook: &Workbook) -> Self {
        Self::new(workbook.sheet_names.iter().cloned())
    }

    pub fn sheets(&self) -> &[String] {
        &self.sheets
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }
}

// ============================================================================
// REPORT TYPES
// ============================================================================

/// A two-line chart: one x axis, one line per amount column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub title: String,
    pub x_label: String,
    pub x: Vec<String>,
    pub revenue_label: String,
    pub revenue: Vec<f64>,
    pub expense_label: String,
    pub expense: Vec<f64>,
}

impl ChartSeries {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Largest value on either line, 0 when empty
    pub fn max_value(&self) -> f64 {
        self.revenue
            .iter()
            .chain(self.expense.iter())
            .copied()
            .fold(0.0, f64::max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Totals {
    pub rows: usize,
    pub revenue: f64,
    pub expense: f64,
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetAnalysis {
    pub totals: Totals,
    pub daily_chart: ChartSeries,
    pub weekly_chart: ChartSeries,
    pub daily_caption: String,
    pub weekly_caption: String,
    #[serde(flatten)]
    pub aggregation: Aggregation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SheetOutcome {
    Ready(SheetAnalysis),
    Failed {
        error: String,
        #[serde(skip)]
        cause: DataError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetReport {
    pub sheet: String,
    #[serde(flatten)]
    pub outcome: SheetOutcome,
}

impl SheetReport {
    pub fn analysis(&self) -> Option<&SheetAnalysis> {
        match &self.outcome {
            SheetOutcome::Ready(analysis) => Some(analysis),
            SheetOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&DataError> {
        match &self.outcome {
            SheetOutcome::Ready(_) => None,
            SheetOutcome::Failed { cause, .. } => Some(cause),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.analysis().is_some()
    }
}

// ============================================================================
// BUILDERS
// ============================================================================

/// Analyze every selected sheet.
///
/// The selection is checked up front: nothing is aggregated when it is empty
/// or names a sheet the workbook lacks. After that each sheet stands alone,
/// so one sheet's `DataError` never hides another sheet's result.
pub fn analyze_selection(
    workbook: &Workbook,
    selection: &Selection,
    options: &AggregateOptions,
) -> Result<Vec<SheetReport>, UserInputError> {
    if selection.is_empty() {
        return Err(UserInputError::NoSheetSelected);
    }

    let tables = selection
        .sheets()
        .iter()
        .map(|name| {
            workbook
                .sheet(name)
                .ok_or_else(|| UserInputError::UnknownSheet(name.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let reports: Vec<SheetReport> = tables
        .into_iter()
        .map(|table| build_report(table, options))
        .collect();

    let failed = reports.iter().filter(|r| !r.is_ready()).count();
    info!(sheets = reports.len(), failed, "selection analyzed");

    Ok(reports)
}

/// Analyze one sheet by name
pub fn analyze_sheet(
    workbook: &Workbook,
    sheet: &str,
    options: &AggregateOptions,
) -> Result<SheetReport, UserInputError> {
    let table = workbook
        .sheet(sheet)
        .ok_or_else(|| UserInputError::UnknownSheet(sheet.to_string()))?;
    Ok(build_report(table, options))
}

fn build_report(table: &SheetTable, options: &AggregateOptions) -> SheetReport {
    let outcome = match run_sheet(table, options) {
        Ok(analysis) => SheetOutcome::Ready(analysis),
        Err(cause) => {
            warn!(sheet = %table.name, error = %cause, "sheet analysis failed");
            SheetOutcome::Failed {
                error: cause.to_string(),
                cause,
            }
        }
    };

    SheetReport {
        sheet: table.name.clone(),
        outcome,
    }
}

fn run_sheet(table: &SheetTable, options: &AggregateOptions) -> Result<SheetAnalysis, DataError> {
    let raw = RawTable::from_sheet(table, &options.columns)?;
    let aggregation = aggregate(&raw, options)?;
    Ok(build_analysis(&table.name, raw.len(), aggregation, options))
}

/// Wrap an aggregation with the titles and series a front end draws
pub fn build_analysis(
    sheet: &str,
    rows: usize,
    aggregation: Aggregation,
    options: &AggregateOptions,
) -> SheetAnalysis {
    let columns = &options.columns;
    let (revenue, expense) = aggregation.daily_totals();

    let daily_chart = ChartSeries {
        title: format!("Receita e Despesa Diária - {}", sheet),
        x_label: columns.date.clone(),
        x: aggregation
            .daily
            .iter()
            .map(|d| d.date.format("%Y-%m-%d").to_string())
            .collect(),
        revenue_label: columns.revenue.clone(),
        revenue: aggregation.daily.iter().map(|d| d.revenue).collect(),
        expense_label: columns.expense.clone(),
        expense: aggregation.daily.iter().map(|d| d.expense).collect(),
    };

    let weekly_chart = ChartSeries {
        title: format!("Receita e Despesa Semanal - {}", sheet),
        x_label: "Semana".to_string(),
        x: aggregation.weekly.iter().map(|w| w.label.clone()).collect(),
        revenue_label: columns.revenue.clone(),
        revenue: aggregation.weekly.iter().map(|w| w.revenue).collect(),
        expense_label: columns.expense.clone(),
        expense: aggregation.weekly.iter().map(|w| w.expense).collect(),
    };

    SheetAnalysis {
        totals: Totals {
            rows,
            revenue,
            expense,
            balance: revenue - expense,
        },
        daily_chart,
        weekly_chart,
        daily_caption: format!("Dados Diários - {}", sheet),
        weekly_caption: format!("Dados Semanais - {}", sheet),
        aggregation,
    }
}

// ============================================================================
// TESTS
// ============================================================================
