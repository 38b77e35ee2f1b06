// ⚙️ Configuration
// Column names, week grouping and server settings

use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;

pub const DEFAULT_DATE_COLUMN: &str = "Data";
pub const DEFAULT_REVENUE_COLUMN: &str = "Receita";
pub const DEFAULT_EXPENSE_COLUMN: &str = "Despesa";

pub const DEFAULT_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_UPLOAD_MB: usize = 25;

/// Header names of the three columns every sheet must carry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub date: String,
    pub revenue: String,
    pub expense: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        ColumnNames {
            date: DEFAULT_DATE_COLUMN.to_string(),
            revenue: DEFAULT_REVENUE_COLUMN.to_string(),
            expense: DEFAULT_EXPENSE_COLUMN.to_string(),
        }
    }
}

/// How rows are bucketed into weeks.
///
/// `WeekNumber` keys on the ISO week number alone, so week 1 of 2024 and
/// week 1 of 2025 share a bucket. `IsoYearWeek` keys on (ISO year, week).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekGrouping {
    #[default]
    WeekNumber,
    IsoYearWeek,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateOptions {
    pub columns: ColumnNames,
    pub week_grouping: WeekGrouping,
    /// Read slash dates as DD/MM/YYYY instead of MM/DD/YYYY
    pub day_first: bool,
}

impl AggregateOptions {
    pub fn with_week_grouping(mut self, grouping: WeekGrouping) -> Self {
        self.week_grouping = grouping;
        self
    }

    pub fn with_day_first(mut self, day_first: bool) -> Self {
        self.day_first = day_first;
        self
    }

    pub fn with_columns(mut self, columns: ColumnNames) -> Self {
        self.columns = columns;
        self
    }
}

/// Web server settings, read from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub max_upload_bytes: usize,
    pub aggregate: AggregateOptions,
}

impl ServerConfig {
    /// Reads `FLUXO_ADDR`, `FLUXO_MAX_UPLOAD_MB`, `FLUXO_DATE_COLUMN`,
    /// `FLUXO_REVENUE_COLUMN`, `FLUXO_EXPENSE_COLUMN` and `FLUXO_DAY_FIRST`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        use anyhow::Context;

        let addr_str = lookup("FLUXO_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let addr: SocketAddr = addr_str
            .parse()
            .with_context(|| format!("FLUXO_ADDR is not a socket address: {}", addr_str))?;

        let max_upload_mb = match lookup("FLUXO_MAX_UPLOAD_MB") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("FLUXO_MAX_UPLOAD_MB is not a number: {}", raw))?,
            None => DEFAULT_MAX_UPLOAD_MB,
        };
        let max_upload_bytes = max_upload_mb
            .checked_mul(1024 * 1024)
            .with_context(|| format!("FLUXO_MAX_UPLOAD_MB is too large: {}", max_upload_mb))?;

        let defaults = ColumnNames::default();
        let columns = ColumnNames {
            date: lookup("FLUXO_DATE_COLUMN").unwrap_or(defaults.date),
            revenue: lookup("FLUXO_REVENUE_COLUMN").unwrap_or(defaults.revenue),
            expense: lookup("FLUXO_EXPENSE_COLUMN").unwrap_or(defaults.expense),
        };

        let day_first = lookup("FLUXO_DAY_FIRST")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(ServerConfig {
            addr,
            max_upload_bytes,
            aggregate: AggregateOptions::default()
                .with_columns(columns)
                .with_day_first(day_first),
        })
    }
}
