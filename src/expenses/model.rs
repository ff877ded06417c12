//! Expense records and the fixed category set.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Category {
    #[default]
    Food,
    Transport,
    Utilities,
    Shopping,
    Other,
}

impl Category {
    /// Display order used for totals and pickers.
    pub const ALL: [Category; 5] = [
        Category::Food,
        Category::Transport,
        Category::Utilities,
        Category::Shopping,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "Food",
            Category::Transport => "Transport",
            Category::Utilities => "Utilities",
            Category::Shopping => "Shopping",
            Category::Other => "Other",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category '{0}' (expected one of Food, Transport, Utilities, Shopping, Other)")]
pub struct ParseCategoryError(pub String);

impl FromStr for Category {
    type Err = ParseCategoryError;

    /// Exact, case-sensitive match.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ParseCategoryError(s.to_string()))
    }
}

/// An expense as the backend returns it.
///
/// `category` is kept verbatim so records with unexpected categories still
/// round-trip; they simply match no known category when aggregated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default = "not_a_number", deserialize_with = "lenient_amount")]
    pub amount: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub date: String,
}

impl Expense {
    pub fn category(&self) -> Option<Category> {
        self.category.parse().ok()
    }
}

fn not_a_number() -> f64 {
    f64::NAN
}

/// Numbers pass through, numeric strings are parsed, anything else is NaN.
fn lenient_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse_is_case_sensitive() {
        assert_eq!("Food".parse::<Category>(), Ok(Category::Food));
        assert_eq!("Shopping".parse::<Category>(), Ok(Category::Shopping));
        assert!("food".parse::<Category>().is_err());
        assert!("".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_serializes_as_name() {
        assert_eq!(serde_json::to_value(Category::Utilities).unwrap(), "Utilities");
        assert_eq!(Category::default(), Category::Food);
        assert_eq!(Category::ALL.len(), 5);
    }

    #[test]
    fn test_amount_decoding_is_lenient() {
        let numeric: Expense = serde_json::from_str(
            r#"{"id":"1","title":"a","amount":12.5,"category":"Food","date":"2024-01-02"}"#,
        )
        .unwrap();
        assert_eq!(numeric.amount, 12.5);

        let text: Expense =
            serde_json::from_str(r#"{"id":"2","amount":" 50 ","category":"Food"}"#).unwrap();
        assert_eq!(text.amount, 50.0);

        let junk: Expense = serde_json::from_str(r#"{"id":"3","amount":"abc"}"#).unwrap();
        assert!(junk.amount.is_nan());

        let null: Expense = serde_json::from_str(r#"{"id":"4","amount":null}"#).unwrap();
        assert!(null.amount.is_nan());

        let missing: Expense = serde_json::from_str(r#"{"id":"5"}"#).unwrap();
        assert!(missing.amount.is_nan());
    }

    #[test]
    fn test_unknown_fields_and_categories_are_tolerated() {
        let expense: Expense = serde_json::from_str(
            r#"{"id":"1","title":"x","amount":1,"category":"Travel","date":"","userId":"u-1"}"#,
        )
        .unwrap();
        assert_eq!(expense.category, "Travel");
        assert_eq!(expense.category(), None);
    }
}
