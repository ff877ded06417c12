//! Editable expense input and its validation into a request body.

use chrono::NaiveDate;
use serde::Serialize;

use super::model::{Category, Expense};
use crate::error::ValidationError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Form state as typed by the user. Amount and date stay text until validated.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExpenseForm {
    pub title: String,
    pub amount: String,
    pub category: Category,
    pub date: String,
}

/// Body for `POST /expenses` and `PUT /expenses/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewExpense {
    pub title: String,
    pub amount: f64,
    pub category: Category,
    pub date: String,
}

impl ExpenseForm {
    /// Pre-fills the form from an existing record for editing.
    ///
    /// Unknown categories fall back to the default; a non-numeric amount
    /// leaves the amount field blank.
    pub fn from_expense(expense: &Expense) -> Self {
        Self {
            title: expense.title.clone(),
            amount: if expense.amount.is_finite() {
                expense.amount.to_string()
            } else {
                String::new()
            },
            category: expense.category().unwrap_or_default(),
            date: expense.date.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn validate(&self) -> Result<NewExpense, ValidationError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ValidationError::Required("title"));
        }

        let amount_text = self.amount.trim();
        if amount_text.is_empty() {
            return Err(ValidationError::Required("amount"));
        }
        let amount: f64 = amount_text
            .parse()
            .ok()
            .filter(|a: &f64| a.is_finite())
            .ok_or_else(|| ValidationError::InvalidAmount(amount_text.to_string()))?;
        if amount < 0.0 {
            return Err(ValidationError::NegativeAmount);
        }

        let date_text = self.date.trim();
        if date_text.is_empty() {
            return Err(ValidationError::Required("date"));
        }
        let date = NaiveDate::parse_from_str(date_text, DATE_FORMAT)
            .map_err(|_| ValidationError::InvalidDate(date_text.to_string()))?;

        Ok(NewExpense {
            title: title.to_string(),
            amount,
            category: self.category,
            date: date.format(DATE_FORMAT).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled() -> ExpenseForm {
        ExpenseForm {
            title: " Lunch ".to_string(),
            amount: "12.50".to_string(),
            category: Category::Food,
            date: "2024-03-01".to_string(),
        }
    }

    #[test]
    fn test_default_form() {
        let form = ExpenseForm::default();
        assert_eq!(form.title, "");
        assert_eq!(form.amount, "");
        assert_eq!(form.category, Category::Food);
        assert_eq!(form.date, "");
    }

    #[test]
    fn test_valid_form_produces_body() {
        let body = filled().validate().unwrap();
        assert_eq!(body.title, "Lunch");
        assert_eq!(body.amount, 12.5);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"title": "Lunch", "amount": 12.5, "category": "Food", "date": "2024-03-01"})
        );
    }

    #[test]
    fn test_validation_failures() {
        let mut form = filled();
        form.title = "  ".to_string();
        assert_eq!(form.validate(), Err(ValidationError::Required("title")));

        let mut form = filled();
        form.amount = "ten".to_string();
        assert_eq!(
            form.validate(),
            Err(ValidationError::InvalidAmount("ten".to_string()))
        );

        let mut form = filled();
        form.amount = "NaN".to_string();
        assert!(matches!(form.validate(), Err(ValidationError::InvalidAmount(_))));

        let mut form = filled();
        form.amount = "-1".to_string();
        assert_eq!(form.validate(), Err(ValidationError::NegativeAmount));

        let mut form = filled();
        form.date = "01/03/2024".to_string();
        assert_eq!(
            form.validate(),
            Err(ValidationError::InvalidDate("01/03/2024".to_string()))
        );

        let mut form = filled();
        form.date = "2024-02-30".to_string();
        assert!(matches!(form.validate(), Err(ValidationError::InvalidDate(_))));
    }

    #[test]
    fn test_zero_amount_is_allowed() {
        let mut form = filled();
        form.amount = "0".to_string();
        assert_eq!(form.validate().unwrap().amount, 0.0);
    }

    #[test]
    fn test_from_expense_and_reset() {
        let expense = Expense {
            id: "e1".to_string(),
            title: "Bus".to_string(),
            amount: 2.5,
            category: "Transport".to_string(),
            date: "2024-01-05".to_string(),
        };
        let mut form = ExpenseForm::from_expense(&expense);
        assert_eq!(form.amount, "2.5");
        assert_eq!(form.category, Category::Transport);

        let odd = Expense {
            amount: f64::NAN,
            category: "Travel".to_string(),
            ..expense
        };
        let prefilled = ExpenseForm::from_expense(&odd);
        assert_eq!(prefilled.amount, "");
        assert_eq!(prefilled.category, Category::Food);

        form.reset();
        assert_eq!(form, ExpenseForm::default());
    }
}
