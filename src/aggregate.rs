// 📊 Aggregator
// Sums Receita/Despesa per calendar day and per ISO week

use crate::config::{AggregateOptions, WeekGrouping};
use crate::error::DataError;
use crate::schema::RawTable;
use crate::value::CellValue;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// OUTPUT TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRow {
    pub date: NaiveDate,
    pub revenue: f64,
    pub expense: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyRow {
    /// ISO week number, 1-53
    pub week: u32,
    /// Set only under `WeekGrouping::IsoYearWeek`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso_year: Option<i32>,
    pub label: String,
    pub revenue: f64,
    pub expense: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub daily: Vec<DailyRow>,
    pub weekly: Vec<WeeklyRow>,
}

impl Aggregation {
    pub fn is_empty(&self) -> bool {
        self.daily.is_empty() && self.weekly.is_empty()
    }

    /// (revenue, expense) summed over the daily buckets
    pub fn daily_totals(&self) -> (f64, f64) {
        self.daily
            .iter()
            .fold((0.0, 0.0), |(r, e), row| (r + row.revenue, e + row.expense))
    }

    /// (revenue, expense) summed over the weekly buckets
    pub fn weekly_totals(&self) -> (f64, f64) {
        self.weekly
            .iter()
            .fold((0.0, 0.0), |(r, e), row| (r + row.revenue, e + row.expense))
    }
}

/// Display label of a weekly bucket
pub fn week_label(week: u32) -> String {
    format!("Semana {}", week)
}

// ============================================================================
// AGGREGATION
// ============================================================================

/// A row after coercion
#[derive(Debug, Clone, Copy, PartialEq)]
struct Entry {
    date: NaiveDate,
    revenue: f64,
    expense: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Sums {
    revenue: f64,
    expense: f64,
}

impl Sums {
    fn add(&mut self, entry: &Entry) {
        self.revenue += entry.revenue;
        self.expense += entry.expense;
    }
}

/// Aggregate with default options
pub fn aggregate_table(table: &RawTable) -> Result<Aggregation, DataError> {
    aggregate(table, &AggregateOptions::default())
}

/// Group a sheet by date and by ISO week.
///
/// Every row must coerce; the first bad cell fails the whole sheet and no
/// partial result is returned.
pub fn aggregate(table: &RawTable, options: &AggregateOptions) -> Result<Aggregation, DataError> {
    let entries = coerce_rows(table, options)?;

    // Sorting the entries first makes float accumulation independent of the
    // row order in the file.
    let mut sorted = entries;
    sorted.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then(a.revenue.total_cmp(&b.revenue))
            .then(a.expense.total_cmp(&b.expense))
    });

    let mut by_day: BTreeMap<NaiveDate, Sums> = BTreeMap::new();
    let mut by_week: BTreeMap<(i32, u32), Sums> = BTreeMap::new();
    let mut iso_years: BTreeSet<i32> = BTreeSet::new();

    for entry in &sorted {
        by_day.entry(entry.date).or_default().add(entry);

        let iso = entry.date.iso_week();
        iso_years.insert(iso.year());
        let key = match options.week_grouping {
            WeekGrouping::WeekNumber => (0, iso.week()),
            WeekGrouping::IsoYearWeek => (iso.year(), iso.week()),
        };
        by_week.entry(key).or_default().add(entry);
    }

    let daily = by_day
        .into_iter()
        .map(|(date, sums)| DailyRow {
            date,
            revenue: sums.revenue,
            expense: sums.expense,
        })
        .collect();

    let spans_years = iso_years.len() > 1;
    let weekly = by_week
        .into_iter()
        .map(|((year, week), sums)| {
            let (iso_year, label) = match options.week_grouping {
                WeekGrouping::WeekNumber => (None, week_label(week)),
                WeekGrouping::IsoYearWeek if spans_years => {
                    (Some(year), format!("{}/{}", week_label(week), year))
                }
                WeekGrouping::IsoYearWeek => (Some(year), week_label(week)),
            };
            WeeklyRow {
                week,
                iso_year,
                label,
                revenue: sums.revenue,
                expense: sums.expense,
            }
        })
        .collect();

    Ok(Aggregation { daily, weekly })
}

fn coerce_rows(table: &RawTable, options: &AggregateOptions) -> Result<Vec<Entry>, DataError> {
    let columns = &table.columns;

    table
        .rows
        .iter()
        .map(|row| {
            let date = row
                .date
                .to_date(options.day_first)
                .ok_or_else(|| DataError::InvalidDate {
                    sheet: table.sheet.clone(),
                    row: row.line_number,
                    value: row.date.to_string(),
                })?;

            let amount = |cell: &CellValue, column: &str| {
                cell.to_amount().ok_or_else(|| DataError::InvalidNumber {
                    sheet: table.sheet.clone(),
                    row: row.line_number,
                    column: column.to_string(),
                    value: cell.to_string(),
                })
            };

            Ok(Entry {
                date,
                revenue: amount(&row.revenue, &columns.revenue)?,
                expense: amount(&row.expense, &columns.expense)?,
            })
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RawRow;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn create_test_table() -> RawTable {
        RawTable::new(
            "Janeiro",
            vec![
                RawRow::new("2024-01-01", 100.0, 40.0),
                RawRow::new("2024-01-01", 50.0, 10.0),
                RawRow::new("2024-01-08", 20.0, 5.0),
            ],
        )
    }

    #[test]
    fn test_daily_and_weekly_scenario() {
        let result = aggregate_table(&create_test_table()).unwrap();

        assert_eq!(
            result.daily,
            vec![
                DailyRow {
                    date: date(2024, 1, 1),
                    revenue: 150.0,
                    expense: 50.0
                },
                DailyRow {
                    date: date(2024, 1, 8),
                    revenue: 20.0,
                    expense: 5.0
                },
            ]
        );

        let weekly: Vec<(&str, f64, f64)> = result
            .weekly
            .iter()
            .map(|w| (w.label.as_str(), w.revenue, w.expense))
            .collect();
        assert_eq!(weekly, vec![("Semana 1", 150.0, 50.0), ("Semana 2", 20.0, 5.0)]);
        assert!(result.weekly.iter().all(|w| w.iso_year.is_none()));
    }

    #[test]
    fn test_unparseable_date_fails_whole_sheet() {
        let table = RawTable::new(
            "Janeiro",
            vec![
                RawRow::new("2024-01-01", 100.0, 40.0),
                RawRow::new("not-a-date", 50.0, 10.0),
            ],
        );

        let result = aggregate_table(&table);
        assert_eq!(
            result,
            Err(DataError::InvalidDate {
                sheet: "Janeiro".to_string(),
                row: 3,
                value: "not-a-date".to_string(),
            })
        );
    }

    #[test]
    fn test_empty_date_is_an_error() {
        let table = RawTable::new("S", vec![RawRow::new(CellValue::Empty, 1.0, 1.0)]);
        assert!(matches!(
            aggregate_table(&table),
            Err(DataError::InvalidDate { .. })
        ));
    }

    #[test]
    fn test_invalid_amount_fails() {
        let table = RawTable::new("S", vec![RawRow::new("2024-01-01", "cem", 1.0)]);
        assert_eq!(
            aggregate_table(&table),
            Err(DataError::InvalidNumber {
                sheet: "S".to_string(),
                row: 2,
                column: "Receita".to_string(),
                value: "cem".to_string(),
            })
        );
    }

    #[test]
    fn test_empty_amounts_count_as_zero() {
        let table = RawTable::new(
            "S",
            vec![
                RawRow::new("2024-01-01", CellValue::Empty, 3.0),
                RawRow::new("2024-01-01", 7.0, CellValue::Empty),
            ],
        );
        let result = aggregate_table(&table).unwrap();
        assert_eq!(result.daily[0].revenue, 7.0);
        assert_eq!(result.daily[0].expense, 3.0);
    }

    #[test]
    fn test_empty_table() {
        let result = aggregate_table(&RawTable::new("S", vec![])).unwrap();
        assert!(result.daily.is_empty());
        assert!(result.weekly.is_empty());
        assert!(result.is_empty());
    }

    #[test]
    fn test_timestamps_truncate_to_day() {
        let morning = date(2024, 2, 5).and_hms_opt(8, 0, 0).unwrap();
        let evening = date(2024, 2, 5).and_hms_opt(21, 15, 0).unwrap();
        let table = RawTable::new(
            "S",
            vec![RawRow::new(morning, 1.0, 0.0), RawRow::new(evening, 2.0, 0.0)],
        );

        let result = aggregate_table(&table).unwrap();
        assert_eq!(result.daily.len(), 1);
        assert_eq!(result.daily[0].revenue, 3.0);
    }

    #[test]
    fn test_week_number_merges_across_years() {
        // 2024-01-03 and 2025-01-01 are both ISO week 1
        let table = RawTable::new(
            "S",
            vec![
                RawRow::new("2024-01-03", 10.0, 1.0),
                RawRow::new("2025-01-01", 5.0, 2.0),
            ],
        );

        let result = aggregate_table(&table).unwrap();
        assert_eq!(result.daily.len(), 2);
        assert_eq!(result.weekly.len(), 1);
        assert_eq!(result.weekly[0].label, "Semana 1");
        assert_eq!(result.weekly[0].revenue, 15.0);
    }

    #[test]
    fn test_iso_year_week_separates_years() {
        let table = RawTable::new(
            "S",
            vec![
                RawRow::new("2025-01-01", 5.0, 2.0),
                RawRow::new("2024-01-03", 10.0, 1.0),
            ],
        );
        let options = AggregateOptions::default().with_week_grouping(WeekGrouping::IsoYearWeek);

        let result = aggregate(&table, &options).unwrap();
        let labels: Vec<&str> = result.weekly.iter().map(|w| w.label.as_str()).collect();
        assert_eq!(labels, vec!["Semana 1/2024", "Semana 1/2025"]);
        assert_eq!(result.weekly[0].iso_year, Some(2024));
    }

    #[test]
    fn test_iso_year_boundary() {
        // 2024-12-30 belongs to ISO week 1 of 2025
        let table = RawTable::new("S", vec![RawRow::new("2024-12-30", 1.0, 1.0)]);
        let options = AggregateOptions::default().with_week_grouping(WeekGrouping::IsoYearWeek);

        let result = aggregate(&table, &options).unwrap();
        assert_eq!(result.weekly[0].week, 1);
        assert_eq!(result.weekly[0].iso_year, Some(2025));
        assert_eq!(result.weekly[0].label, "Semana 1");
    }

    #[test]
    fn test_day_first_option() {
        let table = RawTable::new("S", vec![RawRow::new("02/03/2024", 1.0, 1.0)]);
        let options = AggregateOptions::default().with_day_first(true);

        let result = aggregate(&table, &options).unwrap();
        assert_eq!(result.daily[0].date, date(2024, 3, 2));
    }

    #[test]
    fn test_idempotent() {
        let table = create_test_table();
        assert_eq!(aggregate_table(&table), aggregate_table(&table));
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    fn arb_rows() -> impl Strategy<Value = Vec<(i64, f64, f64)>> {
        prop::collection::vec((0i64..800, 0.0f64..10_000.0, 0.0f64..10_000.0), 0..60)
    }

    /// Rows alongside a permutation of the same rows
    fn arb_permuted_rows(
    ) -> impl Strategy<Value = (Vec<(i64, f64, f64)>, Vec<(i64, f64, f64)>)> {
        arb_rows().prop_flat_map(|rows| (Just(rows.clone()), Just(rows).prop_shuffle()))
    }

    fn table_from(rows: &[(i64, f64, f64)]) -> RawTable {
        let base = date(2023, 11, 1);
        RawTable::new(
            "P",
            rows.iter()
                .map(|(offset, r, e)| {
                    RawRow::new(base + chrono::Duration::days(*offset), *r, *e)
                })
                .collect(),
        )
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-6 * (1.0 + a.abs().max(b.abs()))
    }

    proptest! {
        #[test]
        fn prop_totals_are_conserved(rows in arb_rows()) {
            let table = table_from(&rows);
            let revenue: f64 = rows.iter().map(|r| r.1).sum();
            let expense: f64 = rows.iter().map(|r| r.2).sum();

            for grouping in [WeekGrouping::WeekNumber, WeekGrouping::IsoYearWeek] {
                let options = AggregateOptions::default().with_week_grouping(grouping);
                let result = aggregate(&table, &options).unwrap();
                let (dr, de) = result.daily_totals();
                let (wr, we) = result.weekly_totals();

                prop_assert!(close(dr, revenue));
                prop_assert!(close(de, expense));
                prop_assert!(close(wr, revenue));
                prop_assert!(close(we, expense));
            }
        }

        #[test]
        fn prop_order_independent((rows, shuffled) in arb_permuted_rows()) {
            for grouping in [WeekGrouping::WeekNumber, WeekGrouping::IsoYearWeek] {
                let options = AggregateOptions::default().with_week_grouping(grouping);
                let a = aggregate(&table_from(&rows), &options).unwrap();
                let b = aggregate(&table_from(&shuffled), &options).unwrap();
                prop_assert_eq!(a, b);
            }
        }

        #[test]
        fn prop_keys_strictly_ascending(rows in arb_rows()) {
            let result = aggregate_table(&table_from(&rows)).unwrap();

            prop_assert!(result.daily.windows(2).all(|w| w[0].date < w[1].date));
            prop_assert!(result.weekly.windows(2).all(|w| w[0].week < w[1].week));
            for row in &result.weekly {
                prop_assert!((1..=53).contains(&row.week));
                prop_assert_eq!(&row.label, &format!("Semana {}", row.week));
            }
        }
    }
}
