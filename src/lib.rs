//! Client core for a personal expense tracker backed by a REST API.
//!
//! A [`SessionStore`] holds the login, an [`ExpenseManager`] keeps the
//! per-session expense cache in sync with the backend, and [`aggregate`]
//! turns the cache into per-category totals.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod expenses;
pub mod failure;
pub mod http;
pub mod paths;
pub mod session;
pub mod storage;
pub mod structured_logger;

#[cfg(test)]
mod testing;

pub use aggregate::{aggregate, grand_total, newest_first, CategoryTotal};
pub use config::ClientConfig;
pub use error::{ClientError, ValidationError};
pub use expenses::{Category, Expense, ExpenseForm, ExpenseManager};
pub use http::ApiClient;
pub use session::{SessionPhase, SessionState, SessionStore};
