//! Quota-aware completion client with failover

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use quarry_config::LlmConfig;
use quarry_quota::{QuotaDispatcher, Reservation};
use quarry_telemetry::metrics;

use crate::backend::{self, CompletionBackend};
use crate::error::{FailureClass, LlmError};
use crate::types::{BackendRequest, Completion, CompletionOptions, Message, Usage};

/// Failover behaviour of a [`CompletionClient`]
#[derive(Debug, Clone, Copy)]
pub struct FailoverPolicy {
    /// How long a backend is skipped after a quota-class failure
    pub cooldown: Duration,
    /// Token estimate used when the caller gives none
    pub default_estimated_tokens: u64,
    /// Also move on to the next backend after transient failures
    pub retry_transient: bool,
}

impl From<&LlmConfig> for FailoverPolicy {
    fn from(config: &LlmConfig) -> Self {
        Self {
            cooldown: config.cooldown_duration(),
            default_estimated_tokens: config.default_estimated_tokens,
            retry_transient: config.failover.retry_transient,
        }
    }
}

/// Sends completions to whichever backend has quota left
///
/// Cheap to clone; all clones share the same dispatcher and backends.
#[derive(Clone)]
pub struct CompletionClient {
    inner: Arc<Inner>,
}

struct Inner {
    backends: HashMap<String, Arc<dyn CompletionBackend>>,
    dispatcher: Arc<QuotaDispatcher>,
    policy: FailoverPolicy,
}

impl std::fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionClient")
            .field("dispatcher", &self.inner.dispatcher)
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

impl CompletionClient {
    /// Build the configured backends and a dispatcher over them
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let backends = backend::build_backends(config)?;
        let dispatcher = Arc::new(QuotaDispatcher::from_config(config));

        Self::new(backends, dispatcher, FailoverPolicy::from(config))
    }

    /// Assemble a client from parts
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Config` if a dispatcher backend has no implementation
    pub fn new(
        backends: Vec<Arc<dyn CompletionBackend>>,
        dispatcher: Arc<QuotaDispatcher>,
        policy: FailoverPolicy,
    ) -> Result<Self, LlmError> {
        let backends: HashMap<_, _> = backends
            .into_iter()
            .map(|backend| (backend.id().to_owned(), backend))
            .collect();

        if let Some(missing) = dispatcher.backend_ids().find(|id| !backends.contains_key(*id)) {
            return Err(LlmError::Config(format!("backend '{missing}' has quota but no implementation")));
        }

        Ok(Self {
            inner: Arc::new(Inner {
                backends,
                dispatcher,
                policy,
            }),
        })
    }

    /// The dispatcher holding every backend's usage ledger
    pub fn dispatcher(&self) -> &Arc<QuotaDispatcher> {
        &self.inner.dispatcher
    }

    /// Run one completion, failing over across backends on quota exhaustion
    ///
    /// At most one attempt per configured backend. Quota-class failures put the
    /// backend under cooldown and move on; transient failures do the same
    /// only when the policy allows it. With a preferred backend exactly one
    /// attempt is made.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::QuotaExhausted` when no backend has capacity, or the
    /// failure of the last backend tried
    pub async fn complete(&self, messages: Vec<Message>, options: CompletionOptions) -> Result<Completion, LlmError> {
        let estimate = options
            .estimated_tokens
            .unwrap_or(self.inner.policy.default_estimated_tokens);

        let request = BackendRequest {
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        if let Some(backend_id) = &options.preferred_backend {
            let reservation = self.inner.dispatcher.reserve(backend_id, estimate)?;
            return self.attempt(reservation, &request).await;
        }

        let mut excluded = HashSet::new();
        let mut last_error: Option<LlmError> = None;

        for _ in 0..self.inner.dispatcher.len() {
            let reservation = match self.inner.dispatcher.select_backend(estimate, &excluded) {
                Ok(reservation) => reservation,
                Err(quota) => {
                    return Err(match last_error {
                        Some(error) if !error.is_quota_class() => error,
                        _ => quota.into(),
                    });
                }
            };

            let backend_id = reservation.backend_id().to_owned();

            match self.attempt(reservation, &request).await {
                Ok(completion) => return Ok(completion),
                Err(error) => {
                    let fail_over = match error.class() {
                        FailureClass::Quota => true,
                        FailureClass::Transient => self.inner.policy.retry_transient,
                        FailureClass::Permanent => false,
                    };

                    if !fail_over {
                        return Err(error);
                    }

                    tracing::warn!(
                        backend = %backend_id,
                        error = %error,
                        "completion backend failed, attempting failover"
                    );

                    excluded.insert(backend_id);
                    last_error = Some(error);
                }
            }
        }

        Err(match last_error {
            Some(error) if !error.is_quota_class() => error,
            _ => LlmError::QuotaExhausted {
                retry_after: self.inner.policy.cooldown.as_secs().max(1),
            },
        })
    }

    /// Call the reserved backend once and settle the reservation
    async fn attempt(&self, reservation: Reservation, request: &BackendRequest) -> Result<Completion, LlmError> {
        let backend_id = reservation.backend_id().to_owned();

        let Some(backend) = self.inner.backends.get(&backend_id) else {
            return Err(LlmError::UnknownBackend(backend_id));
        };

        let start = Instant::now();
        let result = backend.invoke(request).await;
        let elapsed = start.elapsed();

        match result {
            Ok(response) => {
                // Without reported usage the estimate stands in for the real cost
                let usage = response.usage.unwrap_or(Usage {
                    prompt_tokens: reservation.estimated_tokens(),
                    completion_tokens: 0,
                });

                self.inner
                    .dispatcher
                    .record_usage(reservation, usage.prompt_tokens, usage.completion_tokens);

                metrics::record_completion(&backend_id, "success", elapsed);
                metrics::record_tokens(&backend_id, usage.prompt_tokens, usage.completion_tokens);

                tracing::debug!(
                    backend = %backend_id,
                    model = %response.model,
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    elapsed_ms = elapsed.as_millis(),
                    "completion succeeded"
                );

                Ok(Completion {
                    text: response.text,
                    usage,
                    backend_id,
                    model: response.model,
                })
            }
            Err(error) => {
                self.inner.dispatcher.release(reservation);

                let outcome = match error.class() {
                    FailureClass::Quota => {
                        self.inner.dispatcher.mark_cooldown(&backend_id, self.inner.policy.cooldown);
                        metrics::record_cooldown(&backend_id);
                        "quota"
                    }
                    FailureClass::Transient => "transient",
                    FailureClass::Permanent => "error",
                };

                metrics::record_completion(&backend_id, outcome, elapsed);

                Err(error)
            }
        }
    }
}
