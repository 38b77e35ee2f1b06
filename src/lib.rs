// Fluxo Gráfico - Core Library
// Exposes all modules for use in CLI, web server, and tests

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod loader;
pub mod report;
pub mod schema;
pub mod value;

// Re-export commonly used types
pub use aggregate::{aggregate, aggregate_table, week_label, Aggregation, DailyRow, WeeklyRow};
pub use cache::{content_hash, WorkbookCache};
pub use config::{AggregateOptions, ColumnNames, ServerConfig, WeekGrouping};
pub use error::{DataError, Error, FormatError, UserInputError};
pub use loader::{load, SheetTable, SpreadsheetLoader, Workbook, XlsxLoader};
pub use report::{
    analyze_selection, analyze_sheet, ChartSeries, Selection, SheetAnalysis, SheetOutcome,
    SheetReport, Totals,
};
pub use schema::{RawRow, RawTable, SheetSchema};
pub use value::CellValue;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
