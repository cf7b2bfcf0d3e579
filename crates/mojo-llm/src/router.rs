//! `choose(task_tag)` routing (C2), narrowed from the teacher's
//! cross-provider failover `ProviderRouter`
//! (`skynet-agent/src/router.rs`) — see SPEC_FULL.md §4.2 for why: spec
//! §4.2 says `LLMError` "never silently degrades", which this spec reads
//! as "never silently switch providers". `choose(task_tag)` therefore
//! resolves to exactly one `(provider, model)` pair from `llm_config.json`;
//! retry/backoff only repeats calls to that one provider, bounded by a
//! configured retry count, before surfacing `LlmError` to the caller.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{LlmError, Result};
use crate::provider::{ChatMessage, CompletionParams, LlmProvider};

#[derive(Debug, Clone)]
pub struct TaskRoute {
    pub provider: String,
    pub model: String,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Maps task tags (`"chat"`, `"dreaming_chunk"`, `"dreaming_cluster"`,
/// `"repair_json"`) to a provider+model, per the JSON config named in spec
/// §4.2/§4.8.
pub struct LlmRouter {
    providers: HashMap<String, Box<dyn LlmProvider>>,
    routes: HashMap<String, TaskRoute>,
    retry_policy: RetryPolicy,
}

impl LlmRouter {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self {
            providers: HashMap::new(),
            routes: HashMap::new(),
            retry_policy,
        }
    }

    pub fn register_provider(&mut self, provider: Box<dyn LlmProvider>) {
        self.providers.insert(provider.provider_name().to_string(), provider);
    }

    pub fn set_route(&mut self, task_tag: impl Into<String>, route: TaskRoute) {
        self.routes.insert(task_tag.into(), route);
    }

    /// Resolve which `(provider, model)` a task tag maps to, without
    /// calling it. Exposed so callers (e.g. the dreaming pipeline's error
    /// reporting) can populate `LLMError.provider`/`.model` up front.
    pub fn choose(&self, task_tag: &str) -> Result<&TaskRoute> {
        self.routes
            .get(task_tag)
            .ok_or_else(|| LlmError::UnknownTaskTag(task_tag.to_string()))
    }

    /// Call the provider resolved for `task_tag`, retrying only that one
    /// provider per `retry_policy`.
    pub async fn complete_for_task(
        &self,
        task_tag: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String> {
        let route = self.choose(task_tag)?;
        let provider = self
            .providers
            .get(&route.provider)
            .ok_or_else(|| LlmError::UnknownProvider(route.provider.clone()))?;

        let params = CompletionParams {
            model: route.model.clone(),
            max_tokens,
            ..CompletionParams::default()
        };

        let mut last_err = None;
        for attempt in 0..=self.retry_policy.max_retries {
            match provider.complete(messages, &params).await {
                Ok(text) => {
                    if attempt > 0 {
                        info!(provider = %route.provider, model = %route.model, attempt, "LLM call succeeded after retry");
                    }
                    return Ok(text);
                }
                Err(e) => {
                    warn!(provider = %route.provider, model = %route.model, attempt, err = %e, "LLM call failed");
                    last_err = Some(e);
                    if attempt < self.retry_policy.max_retries {
                        tokio::time::sleep(self.retry_policy.backoff * (attempt + 1)).await;
                    }
                }
            }
        }

        Err(last_err.expect("loop runs at least once"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StubProvider;

    #[tokio::test]
    async fn resolves_one_provider_per_task_tag_and_never_falls_over() {
        let mut router = LlmRouter::new(RetryPolicy {
            max_retries: 0,
            backoff: Duration::from_millis(1),
        });
        router.register_provider(Box::new(StubProvider::always("a", "from-a".to_string())));
        router.register_provider(Box::new(StubProvider::new(
            "b",
            vec![Err(LlmError::Call {
                provider: "b".into(),
                model: "m".into(),
                reason: "down".into(),
            })],
        )));
        router.set_route(
            "chat",
            TaskRoute {
                provider: "b".to_string(),
                model: "m".to_string(),
            },
        );

        let result = router.complete_for_task("chat", &[], 16).await;
        // "b" is the only configured route for "chat"; router must not
        // silently try "a" even though it would have succeeded.
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unknown_task_tag_is_an_error() {
        let router = LlmRouter::new(RetryPolicy::default());
        let err = router.complete_for_task("nonexistent", &[], 16).await.unwrap_err();
        assert!(matches!(err, LlmError::UnknownTaskTag(_)));
    }

    #[tokio::test]
    async fn retries_the_same_provider_before_failing() {
        let mut router = LlmRouter::new(RetryPolicy {
            max_retries: 2,
            backoff: Duration::from_millis(1),
        });
        router.register_provider(Box::new(StubProvider::new(
            "flaky",
            vec![
                Err(LlmError::Call {
                    provider: "flaky".into(),
                    model: "m".into(),
                    reason: "first try fails".into(),
                }),
                Ok("recovered".to_string()),
            ],
        )));
        router.set_route(
            "chat",
            TaskRoute {
                provider: "flaky".to_string(),
                model: "m".to_string(),
            },
        );

        let result = router.complete_for_task("chat", &[], 16).await.unwrap();
        assert_eq!(result, "recovered");
    }
}
