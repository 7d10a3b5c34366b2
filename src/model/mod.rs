//! The model-call boundary.
//!
//! The core never constructs provider-specific requests; it consumes the
//! opaque [`ModelCaller`] capability and degrades individual call failures
//! to missing output, which the response classifier turns into an
//! `api_failure` classification for that source only.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

/// Successful model-call outcome.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub content: String,
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub cost_usd: f64,
    pub latency_ms: u64,
}

/// Why a model call produced nothing usable.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelFailure {
    #[error("model call timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("model endpoint unreachable: {reason}")]
    Unreachable { reason: String },

    #[error("model returned an empty response")]
    Empty,
}

/// Opaque capability for invoking one model evaluator.
#[async_trait]
pub trait ModelCaller: Send + Sync {
    async fn call(
        &self,
        model_id: &str,
        system_prompt: &str,
        content: &str,
        timeout: Duration,
    ) -> Result<ModelResponse, ModelFailure>;
}

/// One call in a review wave.
#[derive(Debug, Clone)]
pub struct WaveRequest {
    pub model_id: String,
    pub system_prompt: String,
    pub content: String,
}

/// Issue a wave of model calls concurrently, staggering starts to avoid
/// provider-side rate coordination and bounding every call with `timeout`.
///
/// A timed-out or failed call degrades to `None` in its slot without
/// aborting the others.
pub async fn call_wave(
    caller: &dyn ModelCaller,
    requests: &[WaveRequest],
    stagger: Duration,
    timeout: Duration,
) -> Vec<Option<ModelResponse>> {
    let calls = requests.iter().enumerate().map(|(index, request)| async move {
        if index > 0 {
            tokio::time::sleep(stagger * index as u32).await;
        }
        let bounded = tokio::time::timeout(
            timeout,
            caller.call(&request.model_id, &request.system_prompt, &request.content, timeout),
        );
        match bounded.await {
            Ok(Ok(response)) => {
                debug!(model = %request.model_id, latency_ms = response.latency_ms, "model call ok");
                Some(response)
            }
            Ok(Err(failure)) => {
                warn!(model = %request.model_id, %failure, "model call failed, degrading");
                None
            }
            Err(_) => {
                warn!(model = %request.model_id, timeout_secs = timeout.as_secs(), "model call overran, degrading");
                None
            }
        }
    });
    join_all(calls).await
}

/// Supplies the set of file paths in scope for a review invocation.
pub trait ChangeSetProvider: Send + Sync {
    fn changed_files(&self) -> BTreeSet<String>;
}

/// A fixed changed-file set, the common case when the diff was computed
/// up front.
#[derive(Debug, Clone, Default)]
pub struct StaticChangeSet {
    files: BTreeSet<String>,
}

impl StaticChangeSet {
    pub fn new(files: impl IntoIterator<Item = String>) -> Self {
        Self {
            files: files.into_iter().collect(),
        }
    }
}

impl ChangeSetProvider for StaticChangeSet {
    fn changed_files(&self) -> BTreeSet<String> {
        self.files.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedCaller {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModelCaller for ScriptedCaller {
        async fn call(
            &self,
            model_id: &str,
            _system_prompt: &str,
            _content: &str,
            _timeout: Duration,
        ) -> Result<ModelResponse, ModelFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match model_id {
                "down" => Err(ModelFailure::Unreachable {
                    reason: "connection refused".to_string(),
                }),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    unreachable!("outer timeout fires first")
                }
                _ => Ok(ModelResponse {
                    content: format!("{{\"findings\": []}} from {}", model_id),
                    tokens_input: 10,
                    tokens_output: 5,
                    cost_usd: 0.001,
                    latency_ms: 40,
                }),
            }
        }
    }

    fn request(model_id: &str) -> WaveRequest {
        WaveRequest {
            model_id: model_id.to_string(),
            system_prompt: "review the diff".to_string(),
            content: "diff --git a b".to_string(),
        }
    }

    #[tokio::test]
    async fn test_wave_degrades_failures_individually() {
        let caller = ScriptedCaller {
            calls: AtomicUsize::new(0),
        };
        let results = call_wave(
            &caller,
            &[request("up"), request("down"), request("up")],
            Duration::ZERO,
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_some());
        assert!(results[1].is_none());
        assert!(results[2].is_some());
        assert_eq!(caller.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wave_bounds_overrunning_call() {
        let caller = ScriptedCaller {
            calls: AtomicUsize::new(0),
        };
        let results = call_wave(
            &caller,
            &[request("slow"), request("up")],
            Duration::ZERO,
            Duration::from_millis(50),
        )
        .await;

        assert!(results[0].is_none(), "overrunning call degrades");
        assert!(results[1].is_some(), "healthy call unaffected");
    }

    #[test]
    fn test_static_change_set() {
        let set = StaticChangeSet::new(vec!["src/a.rs".to_string(), "src/b.rs".to_string()]);
        let files = set.changed_files();
        assert_eq!(files.len(), 2);
        assert!(files.contains("src/a.rs"));
    }
}
