//! Generate-then-poll workflow for prototypes.
//!
//! ```text
//! Idle ──generate──▶ Generating ──ready──▶ Ready
//!                        │ ├──failed──▶ Failed
//!                        │ └──budget──▶ TimedOut
//!                        └──cancel──▶ Idle (state kept for resume)
//! ```
//!
//! The persisted [`GenerationState`] is written before the generation
//! endpoint is called and released on every terminal transition, unless
//! another run has since taken the slot over. A cancelled poll leaves it in
//! place so [`GenerationWorkflow::resume`] can pick it up.

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::state::{GenerationState, StateStore};
use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use crate::types::PrototypeStatus;

/// Payload sent to the generation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prd_content: String,
    pub idea_id: String,
    pub prd_id: String,
}

/// Generation endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationTicket {
    pub prototype_id: String,
    pub status: PrototypeStatus,
}

/// One observation of the status store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusReport {
    pub status: PrototypeStatus,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, alias = "error_code")]
    pub code: Option<String>,
}

/// Successful outcome handed to hooks and callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyPrototype {
    pub prototype_id: String,
    pub prd_id: String,
    pub idea_id: String,
    pub url: Option<String>,
}

/// External collaborators of the workflow.
#[allow(async_fn_in_trait)]
pub trait GenerationBackend {
    /// PRD content used as the generation prompt.
    async fn load_source(&self, prd_id: &str) -> Result<String>;

    async fn start_generation(&self, request: &GenerationRequest) -> Result<GenerationTicket>;

    async fn fetch_status(&self, prototype_id: &str) -> Result<StatusReport>;

    /// Move the idea to `prototype_complete` in the system of record.
    async fn mark_prototype_complete(&self, idea_id: &str) -> Result<()>;
}

/// Local side effects of terminal transitions. Hook failures are logged and
/// never change the workflow outcome.
pub trait GenerationHooks: Send + Sync {
    /// Drop cached views derived from the pipeline.
    fn invalidate(&self) -> Result<()> {
        Ok(())
    }

    fn on_ready(&self, _prototype: &ReadyPrototype) -> Result<()> {
        Ok(())
    }

    fn on_failed(&self, _idea_id: &str, _error: &Error) {}
}

/// Hooks that do nothing.
pub struct NoHooks;

impl GenerationHooks for NoHooks {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationPhase {
    Idle,
    Generating,
    Ready,
    Failed,
    TimedOut,
}

/// Drives one idea's prototype generation at a time.
pub struct GenerationWorkflow<B> {
    backend: B,
    store: Arc<StateStore>,
    hooks: Arc<dyn GenerationHooks>,
    config: GenerationConfig,
    phase: GenerationPhase,
    last_request: Option<(String, String)>,
}

impl<B: GenerationBackend> GenerationWorkflow<B> {
    pub fn new(backend: B, store: Arc<StateStore>, config: GenerationConfig) -> Self {
        Self {
            backend,
            store,
            hooks: Arc::new(NoHooks),
            config,
            phase: GenerationPhase::Idle,
            last_request: None,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn GenerationHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn phase(&self) -> GenerationPhase {
        self.phase
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn stale_after(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.config.resume_window_secs as i64)
    }

    /// Start a generation for `idea_id` from `prd_id` and poll it to a
    /// terminal state.
    pub async fn generate(
        &mut self,
        prd_id: &str,
        idea_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ReadyPrototype> {
        self.last_request = Some((prd_id.to_string(), idea_id.to_string()));

        let state = match self
            .store
            .claim(prd_id, idea_id, Utc::now(), self.stale_after())
        {
            Ok(state) => state,
            Err(e) => {
                // the slot belongs to another run; leave it alone
                self.phase = GenerationPhase::Failed;
                return Err(e);
            }
        };

        tracing::info!(idea_id, prd_id, "Starting prototype generation");
        self.phase = GenerationPhase::Generating;

        let mut owned = state;
        let outcome = self.start_and_poll(&mut owned, cancel).await;
        self.finish(&owned, outcome).await
    }

    /// Re-run the last `generate` call. Only valid after a failure or timeout.
    pub async fn retry(&mut self, cancel: &CancellationToken) -> Result<ReadyPrototype> {
        if !matches!(
            self.phase,
            GenerationPhase::Failed | GenerationPhase::TimedOut
        ) {
            return Err(Error::Validation(
                "retry is only available after a failed or timed out generation".to_string(),
            ));
        }
        let Some((prd_id, idea_id)) = self.last_request.clone() else {
            return Err(Error::Validation("nothing to retry".to_string()));
        };
        tracing::info!(idea_id = %idea_id, "Retrying prototype generation");
        self.generate(&prd_id, &idea_id, cancel).await
    }

    /// Persisted generations, oldest first.
    pub fn pending(&self) -> Result<Vec<GenerationState>> {
        let mut states = self.store.list()?;
        states.sort_by_key(|s| s.start_time);
        Ok(states)
    }

    /// Continue polling a generation persisted by an earlier process.
    ///
    /// Returns `Ok(None)` when nothing is persisted for `idea_id`, or when
    /// another run claimed it recently and is still waiting for a prototype
    /// id. Entries older than the resume window are failed and pruned.
    pub async fn resume(
        &mut self,
        idea_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ReadyPrototype>> {
        let Some(state) = self.store.get(idea_id)? else {
            return Ok(None);
        };
        self.last_request = Some((state.prd_id.clone(), state.idea_id.clone()));

        if !state.is_generating {
            self.store.release(idea_id, state.version)?;
            return Ok(None);
        }

        let stale = state.is_stale(Utc::now(), self.stale_after());
        let outcome = match state.prototype_id.as_deref() {
            None if !stale => {
                tracing::info!(idea_id, "Generation is still being started elsewhere, skipping");
                return Ok(None);
            }
            None => Err(Error::Generation(format!(
                "generation for idea {} was interrupted before the service accepted it",
                idea_id
            ))),
            Some(_) if stale => Err(Error::Generation(format!(
                "generation for idea {} started at {} is too old to resume",
                idea_id, state.start_time
            ))),
            Some(prototype_id) => {
                tracing::info!(idea_id, prototype_id, "Resuming prototype generation");
                self.phase = GenerationPhase::Generating;
                self.poll(&state, prototype_id, cancel).await
            }
        };

        self.finish(&state, outcome).await.map(Some)
    }

    /// `owned` is kept at the entry version this run last wrote.
    async fn start_and_poll(
        &self,
        owned: &mut GenerationState,
        cancel: &CancellationToken,
    ) -> Result<ReadyPrototype> {
        let claimed = owned.clone();
        let prd_content = self.backend.load_source(&claimed.prd_id).await?;
        let request = GenerationRequest {
            prd_content,
            idea_id: claimed.idea_id.clone(),
            prd_id: claimed.prd_id.clone(),
        };

        let ticket = self.backend.start_generation(&request).await?;
        tracing::debug!(
            idea_id = %claimed.idea_id,
            prototype_id = %ticket.prototype_id,
            status = %ticket.status,
            "Generation accepted"
        );
        if ticket.status == PrototypeStatus::Failed {
            return Err(Error::Generation(format!(
                "service rejected generation for prototype {}",
                ticket.prototype_id
            )));
        }

        *owned = self.store.attach_prototype(
            &claimed.idea_id,
            claimed.version,
            &ticket.prototype_id,
        )?;
        self.poll(owned, &ticket.prototype_id, cancel).await
    }

    /// Sleep, then check, up to `max_attempts` times.
    async fn poll(
        &self,
        state: &GenerationState,
        prototype_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ReadyPrototype> {
        let max_attempts = self.config.max_attempts;
        let interval = self.config.poll_interval();

        for attempt in 1..=max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }

            match self.backend.fetch_status(prototype_id).await {
                Ok(report) => match report.status {
                    PrototypeStatus::Ready => {
                        tracing::info!(prototype_id, attempt, "Prototype ready");
                        return Ok(ReadyPrototype {
                            prototype_id: prototype_id.to_string(),
                            prd_id: state.prd_id.clone(),
                            idea_id: state.idea_id.clone(),
                            url: report.url,
                        });
                    }
                    PrototypeStatus::Failed => {
                        let code = report.code.unwrap_or_else(|| "unknown".to_string());
                        return Err(Error::Generation(format!(
                            "prototype {} failed ({})",
                            prototype_id, code
                        )));
                    }
                    PrototypeStatus::Generating => {
                        tracing::debug!(prototype_id, attempt, max_attempts, "Still generating");
                    }
                },
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        prototype_id,
                        attempt,
                        error = %e,
                        "Transient status check failure"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::Timeout {
            attempts: max_attempts,
        })
    }

    async fn finish(
        &mut self,
        state: &GenerationState,
        outcome: Result<ReadyPrototype>,
    ) -> Result<ReadyPrototype> {
        match outcome {
            Ok(ready) => {
                if let Err(e) = self.backend.mark_prototype_complete(&ready.idea_id).await {
                    tracing::warn!(
                        idea_id = %ready.idea_id,
                        error = %e,
                        "Failed to mark idea prototype_complete"
                    );
                }
                if let Err(e) = self.hooks.invalidate() {
                    tracing::warn!(error = %e, "Failed to invalidate cached views");
                }
                if let Err(e) = self.hooks.on_ready(&ready) {
                    tracing::warn!(idea_id = %ready.idea_id, error = %e, "Ready hook failed");
                }
                self.discard_state(state);
                self.phase = GenerationPhase::Ready;
                Ok(ready)
            }
            Err(Error::Cancelled) => {
                tracing::info!(
                    idea_id = %state.idea_id,
                    "Generation polling cancelled, state kept"
                );
                self.phase = GenerationPhase::Idle;
                Err(Error::Cancelled)
            }
            Err(e) => {
                self.phase = if e.is_timeout() {
                    GenerationPhase::TimedOut
                } else {
                    GenerationPhase::Failed
                };
                tracing::warn!(idea_id = %state.idea_id, error = %e, "Prototype generation failed");
                self.discard_state(state);
                self.hooks.on_failed(&state.idea_id, &e);
                Err(e)
            }
        }
    }

    /// Drop the persisted entry if it is still the one this run owns.
    fn discard_state(&self, state: &GenerationState) {
        let idea_id = state.idea_id.as_str();
        match self.store.release(idea_id, state.version) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(idea_id, "Generation state now belongs to another run, kept")
            }
            Err(e) => tracing::warn!(idea_id, error = %e, "Failed to remove generation state"),
        }
    }
}
