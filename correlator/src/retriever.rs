use crate::config::RetryPolicy;
use crate::metrics_defs::{RETRIEVAL_ATTEMPTS, RETRIEVAL_TIMEOUTS};
use crate::store::{CorrelationStore, Watch};
use shared::{counter, histogram};
use tokio::time::{Instant, sleep_until};

/// Terminal state of a retrieval.
#[derive(Clone, Debug, PartialEq)]
pub enum Retrieval {
    Found { value: String, attempts: u32 },
    Exhausted { attempts: u32 },
}

impl Retrieval {
    pub fn attempts(&self) -> u32 {
        match self {
            Retrieval::Found { attempts, .. } | Retrieval::Exhausted { attempts } => *attempts,
        }
    }

    pub fn into_value(self) -> Option<String> {
        match self {
            Retrieval::Found { value, .. } => Some(value),
            Retrieval::Exhausted { .. } => None,
        }
    }
}

/// Polls the store for the value delivered against a correlation id.
#[derive(Clone)]
pub struct Retriever {
    store: CorrelationStore,
    policy: RetryPolicy,
}

impl Retriever {
    pub fn new(store: CorrelationStore, policy: RetryPolicy) -> Self {
        Retriever { store, policy }
    }

    /// Takes the value for `id`, waiting between lookups until one shows up or
    /// the policy runs out of retries.
    ///
    /// A value delivered after the last lookup is never collected and stays in
    /// the store.
    pub async fn retrieve(&self, id: &str) -> Retrieval {
        // Registered before the first lookup so a delivery racing it still
        // leaves a pending signal.
        let watch = self
            .policy
            .wake_on_delivery
            .then(|| self.store.watch(id));
        let mut attempts = 0;

        loop {
            attempts += 1;
            if let Some(value) = self.store.take(id) {
                return self.found(id, value, attempts);
            }

            if attempts > self.policy.max_retries {
                tracing::warn!(
                    correlation_id = %id,
                    attempts,
                    "Cannot retrieve the callback value after {attempts} attempts"
                );
                counter!(RETRIEVAL_TIMEOUTS).increment(1);
                histogram!(RETRIEVAL_ATTEMPTS, "outcome" => "exhausted").record(attempts as f64);
                return Retrieval::Exhausted { attempts };
            }

            let next_attempt = Instant::now() + self.policy.retry_interval();
            if let Some(value) = self.wait_until(id, watch.as_ref(), next_attempt).await {
                return self.found(id, value, attempts);
            }
        }
    }

    /// Sleeps until `deadline`. With a watch, a delivery for `id` in the
    /// meantime triggers an extra lookup.
    async fn wait_until(
        &self,
        id: &str,
        watch: Option<&Watch<'_>>,
        deadline: Instant,
    ) -> Option<String> {
        let Some(watch) = watch else {
            sleep_until(deadline).await;
            return None;
        };

        loop {
            tokio::select! {
                _ = watch.delivered() => {
                    if let Some(value) = self.store.take(id) {
                        return Some(value);
                    }
                }
                _ = sleep_until(deadline) => return None,
            }
        }
    }

    fn found(&self, id: &str, value: String, attempts: u32) -> Retrieval {
        tracing::debug!(correlation_id = %id, attempts, "Retrieved callback value");
        histogram!(RETRIEVAL_ATTEMPTS, "outcome" => "found").record(attempts as f64);
        Retrieval::Found { value, attempts }
    }
}
