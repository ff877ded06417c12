//! Expense collection manager.
//!
//! Owns the per-session cache of expense records and performs every
//! collection call against the backend with the session's credentials.
//!
//! # Cache rules
//!
//! - `list` replaces the cache wholesale.
//! - `create` appends the server record, `update` replaces it in place,
//!   `delete` removes it locally without re-fetching.
//! - Each fetch takes a generation ticket. A response is applied only if its
//!   ticket is still the latest and the session epoch has not moved since the
//!   request went out; otherwise it is discarded as [`ClientError::Superseded`].
//! - A failed `list` goes through the [`FailurePolicy`]; under the default
//!   policy it ends the session.
//!
//! Observers get the current list over a `watch` channel.

mod form;
mod model;

pub use form::{ExpenseForm, NewExpense, DATE_FORMAT};
pub use model::{Category, Expense, ParseCategoryError};

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use crate::aggregate::{aggregate, CategoryTotal};
use crate::error::{ClientError, MutationAction};
use crate::failure::{FailureDecision, FailureKind, FailurePolicy};
use crate::http::{encode_path_segment, ApiClient, HttpResponse, Method, RequestOptions};
use crate::session::{AuthContext, SessionStore};
use crate::structured_logger::StructuredLogger;

pub const DELETE_PROMPT: &str = "Are you sure you want to delete this expense?";

/// Gate consulted before a delete is sent.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Events emitted by the manager, for logging only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum CollectionEvent {
    Listed { count: usize },
    Created { id: String },
    Updated { id: String },
    Deleted { id: String },
    Superseded { ticket: u64 },
    Cleared,
}

pub struct ExpenseManager {
    api: Arc<ApiClient>,
    session: Arc<SessionStore>,
    policy: FailurePolicy,
    cache_tx: watch::Sender<Vec<Expense>>,
    generation: AtomicU64,
    editing: Mutex<Option<Expense>>,
    logger: Option<Arc<StructuredLogger>>,
}

impl ExpenseManager {
    pub fn new(api: Arc<ApiClient>, session: Arc<SessionStore>, policy: FailurePolicy) -> Self {
        let (cache_tx, _) = watch::channel(Vec::new());
        Self {
            api,
            session,
            policy,
            cache_tx,
            generation: AtomicU64::new(0),
            editing: Mutex::new(None),
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<StructuredLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Current cache contents, in insertion order.
    pub fn expenses(&self) -> Vec<Expense> {
        self.cache_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Expense>> {
        self.cache_tx.subscribe()
    }

    /// Per-category totals over the cache, in display order.
    pub fn totals(&self) -> Vec<CategoryTotal> {
        aggregate(self.cache_tx.borrow().iter(), &Category::ALL)
    }

    /// Empties the cache and invalidates any fetch in flight.
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache_tx.send_replace(Vec::new());
        self.emit(CollectionEvent::Cleared);
    }

    /// Fetches the full list and replaces the cache.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Expense>, ClientError> {
        let context = self.session.auth_context()?;
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let url = self.api.endpoint("/expenses");

        let mut attempt = 0;
        loop {
            let outcome = self.fetch_list(&url, &context).await;
            self.ensure_current(ticket, &context)?;

            let kind = match outcome {
                Ok(expenses) => {
                    let count = expenses.len();
                    self.cache_tx.send_replace(expenses.clone());
                    self.emit(CollectionEvent::Listed { count });
                    return Ok(expenses);
                }
                Err(kind) => kind,
            };

            match self.policy.decide(&kind, attempt) {
                FailureDecision::Retry { delay } => {
                    tracing::warn!(attempt, ?delay, "expense fetch failed, retrying: {}", kind);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                FailureDecision::Invalidate => {
                    let reason = kind.to_string();
                    self.session.invalidate(&reason);
                    self.clear();
                    return Err(ClientError::SessionExpired { reason });
                }
                FailureDecision::Surface => {
                    tracing::warn!("expense fetch failed: {}", kind);
                    return Err(ClientError::BackendUnavailable(kind.to_string()));
                }
            }
        }
    }

    async fn fetch_list(
        &self,
        url: &str,
        context: &AuthContext,
    ) -> Result<Vec<Expense>, FailureKind> {
        let response = self
            .api
            .request(url, RequestOptions::get(), Some(&context.credentials))
            .await
            .map_err(|e| match e {
                ClientError::Transport(message) => FailureKind::Transport(message),
                other => FailureKind::Transport(other.to_string()),
            })?;

        if !response.is_success() {
            return Err(FailureKind::Status(response.status));
        }
        response
            .json()
            .map_err(|e| FailureKind::Malformed(e.to_string()))
    }

    /// Validates and submits a new expense.
    ///
    /// On success the record is appended to the cache, passed to `on_created`,
    /// and the form is reset. On failure the form is left as it was.
    #[tracing::instrument(skip_all)]
    pub async fn create(
        &self,
        form: &mut ExpenseForm,
        on_created: impl FnOnce(&Expense),
    ) -> Result<Expense, ClientError> {
        let context = self.session.auth_context()?;
        let body = form.validate()?;

        let options = RequestOptions::with_json(Method::Post, &body)?;
        let response = self
            .mutate(
                MutationAction::Create,
                &self.api.endpoint("/expenses"),
                options,
                &context,
            )
            .await?;
        let created: Expense = response.json()?;
        self.ensure_session(&context)?;

        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache_tx
            .send_modify(|expenses| expenses.push(created.clone()));
        self.emit(CollectionEvent::Created {
            id: created.id.clone(),
        });

        on_created(&created);
        form.reset();
        Ok(created)
    }

    /// Enters edit mode for `expense` and returns a pre-filled form.
    pub fn begin_edit(&self, expense: &Expense) -> ExpenseForm {
        *self.lock_editing() = Some(expense.clone());
        ExpenseForm::from_expense(expense)
    }

    pub fn cancel_edit(&self) {
        *self.lock_editing() = None;
    }

    /// The record currently being edited, if any.
    pub fn editing(&self) -> Option<Expense> {
        self.lock_editing().clone()
    }

    /// Submits a full replacement for `id` and returns the canonical record.
    #[tracing::instrument(skip(self, form))]
    pub async fn update(&self, id: &str, form: &ExpenseForm) -> Result<Expense, ClientError> {
        let context = self.session.auth_context()?;
        let body = form.validate()?;

        let options = RequestOptions::with_json(Method::Put, &body)?;
        let response = self
            .mutate(
                MutationAction::Update,
                &self.expense_url(id),
                options,
                &context,
            )
            .await?;
        let updated: Expense = response.json()?;
        self.ensure_session(&context)?;

        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache_tx.send_modify(|expenses| {
            match expenses.iter_mut().find(|e| e.id == updated.id) {
                Some(existing) => *existing = updated.clone(),
                None => expenses.push(updated.clone()),
            }
        });
        self.cancel_edit();
        self.emit(CollectionEvent::Updated {
            id: updated.id.clone(),
        });
        Ok(updated)
    }

    /// Deletes `id` once `confirm` agrees.
    ///
    /// Returns `Ok(false)` when the user declines; nothing is sent then.
    #[tracing::instrument(skip(self, confirm))]
    pub async fn delete(&self, id: &str, confirm: &dyn Confirm) -> Result<bool, ClientError> {
        let context = self.session.auth_context()?;
        if !confirm.confirm(DELETE_PROMPT) {
            tracing::debug!("delete declined");
            return Ok(false);
        }

        self.mutate(
            MutationAction::Delete,
            &self.expense_url(id),
            RequestOptions::delete(),
            &context,
        )
        .await?;
        self.ensure_session(&context)?;

        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache_tx
            .send_modify(|expenses| expenses.retain(|e| e.id != id));
        self.emit(CollectionEvent::Deleted { id: id.to_string() });
        Ok(true)
    }

    async fn mutate(
        &self,
        action: MutationAction,
        url: &str,
        options: RequestOptions,
        context: &AuthContext,
    ) -> Result<HttpResponse, ClientError> {
        let response = self
            .api
            .request(url, options, Some(&context.credentials))
            .await?;
        if !response.is_success() {
            tracing::warn!(status = response.status, "failed to {} expense", action);
            return Err(ClientError::Mutation {
                action,
                status: response.status,
            });
        }
        Ok(response)
    }

    fn expense_url(&self, id: &str) -> String {
        self.api
            .endpoint(&format!("/expenses/{}", encode_path_segment(id)))
    }

    fn ensure_current(&self, ticket: u64, context: &AuthContext) -> Result<(), ClientError> {
        if self.generation.load(Ordering::SeqCst) != ticket {
            tracing::debug!(ticket, "discarding superseded expense fetch");
            self.emit(CollectionEvent::Superseded { ticket });
            return Err(ClientError::Superseded);
        }
        self.ensure_session(context)
    }

    fn ensure_session(&self, context: &AuthContext) -> Result<(), ClientError> {
        if self.session.epoch() != context.epoch {
            tracing::debug!("session changed while request was in flight");
            return Err(ClientError::Superseded);
        }
        Ok(())
    }

    fn lock_editing(&self) -> MutexGuard<'_, Option<Expense>> {
        self.editing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: CollectionEvent) {
        if let Some(logger) = &self.logger {
            logger.log_collection_event(&event);
        }
    }
}
