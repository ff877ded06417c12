//! Per-category totals and presentation helpers over an expense list.
//!
//! Everything here is pure. Totals are summed over the matching amounts in
//! ascending order, so any permutation of the input gives bit-identical
//! results.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::cmp::Reverse;

use crate::expenses::{Category, Expense, DATE_FORMAT};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: Category,
    pub total: f64,
}

/// Non-finite amounts count as zero.
fn effective_amount(expense: &Expense) -> f64 {
    if expense.amount.is_finite() {
        expense.amount
    } else {
        0.0
    }
}

fn canonical_sum(mut amounts: Vec<f64>) -> f64 {
    amounts.sort_by(f64::total_cmp);
    amounts.into_iter().fold(0.0, |acc, amount| acc + amount)
}

/// One total per entry of `categories`, in that order.
///
/// An expense contributes to a category only if its category string matches
/// the category name exactly.
pub fn aggregate<'a>(
    expenses: impl IntoIterator<Item = &'a Expense>,
    categories: &[Category],
) -> Vec<CategoryTotal> {
    let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); categories.len()];
    for expense in expenses {
        if let Some(index) = categories
            .iter()
            .position(|c| c.as_str() == expense.category)
        {
            buckets[index].push(effective_amount(expense));
        }
    }

    categories
        .iter()
        .zip(buckets)
        .map(|(category, amounts)| CategoryTotal {
            category: *category,
            total: canonical_sum(amounts),
        })
        .collect()
}

/// Sum of every amount regardless of category.
pub fn grand_total<'a>(expenses: impl IntoIterator<Item = &'a Expense>) -> f64 {
    canonical_sum(expenses.into_iter().map(effective_amount).collect())
}

/// Copy of `expenses` sorted by date, newest first.
///
/// Plain dates, naive timestamps and RFC 3339 timestamps are all accepted;
/// a plain date counts as midnight and offsets are normalized to UTC.
/// Records whose date does not parse go last; ties keep their input order.
pub fn newest_first(expenses: &[Expense]) -> Vec<Expense> {
    let mut sorted = expenses.to_vec();
    sorted.sort_by_cached_key(|e| Reverse(parse_date(&e.date)));
    sorted
}

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(stamp) = DateTime::parse_from_rfc3339(text) {
        return Some(stamp.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, DATE_FORMAT)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}
