//! Tool registry: validation, rate limiting, and retry policy around
//! tool execution.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::config::ToolPolicy;
use crate::error::ToolError;
use crate::tools::Tool;

/// Registry of available tools.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    policies: RwLock<HashMap<String, ToolPolicy>>,
    default_policy: ToolPolicy,
    /// Last accepted call per tool, for the rate-limit gate.
    last_call: Mutex<HashMap<String, Instant>>,
}

impl ToolRegistry {
    /// Create a registry with a default policy applied to unconfigured tools.
    pub fn new(default_policy: ToolPolicy) -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            policies: RwLock::new(HashMap::new()),
            default_policy,
            last_call: Mutex::new(HashMap::new()),
        }
    }

    /// Register a tool under its own name.
    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.write().await.insert(name.clone(), tool);
        tracing::debug!("Registered tool: {}", name);
    }

    /// Override the execution policy for one tool.
    pub async fn set_policy(&self, name: impl Into<String>, policy: ToolPolicy) {
        self.policies.write().await.insert(name.into(), policy);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    pub async fn has(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    async fn policy_for(&self, name: &str) -> ToolPolicy {
        self.policies
            .read()
            .await
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default_policy.clone())
    }

    /// Wait until the tool's minimum call interval has passed, then claim
    /// the slot. Callers queue rather than fail.
    async fn rate_gate(&self, name: &str, policy: &ToolPolicy) {
        if policy.min_call_interval.is_zero() {
            return;
        }
        loop {
            let wait = {
                let mut last_call = self.last_call.lock().await;
                match last_call.get(name) {
                    Some(last) if last.elapsed() < policy.min_call_interval => {
                        policy.min_call_interval - last.elapsed()
                    }
                    _ => {
                        last_call.insert(name.to_string(), Instant::now());
                        return;
                    }
                }
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Validate and execute a named tool under its policy.
    ///
    /// Validation failures abort immediately; execution failures and
    /// timeouts are retried with exponential backoff up to the policy's
    /// attempt budget.
    pub async fn run(&self, name: &str, params: Value) -> Result<Value, ToolError> {
        let tool = self.get(name).await.ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
        })?;

        tool.schema()
            .validate(&params)
            .map_err(|reason| ToolError::InvalidParameters {
                name: name.to_string(),
                reason,
            })?;

        let policy = self.policy_for(name).await;
        self.rate_gate(name, &policy).await;

        let mut last_err = ToolError::ExecutionFailed {
            name: name.to_string(),
            reason: "no attempts made".into(),
        };

        for attempt in 0..policy.max_attempts {
            let started = Instant::now();
            let result = tokio::time::timeout(policy.timeout, tool.execute(params.clone())).await;

            match result {
                Ok(Ok(value)) => {
                    tracing::debug!(
                        tool = name,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Tool call succeeded"
                    );
                    return Ok(value);
                }
                Ok(Err(e)) => {
                    tracing::debug!(
                        tool = name,
                        attempt = attempt + 1,
                        error = %e,
                        "Tool call failed"
                    );
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    last_err = e;
                }
                Err(_) => {
                    tracing::debug!(tool = name, attempt = attempt + 1, "Tool call timed out");
                    last_err = ToolError::Timeout {
                        name: name.to_string(),
                        timeout: policy.timeout,
                    };
                }
            }

            if attempt + 1 < policy.max_attempts {
                tokio::time::sleep(policy.backoff_base * 2u32.pow(attempt)).await;
            }
        }

        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::tools::{ParamKind, ParameterSchema};

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes its message parameter"
        }

        fn schema(&self) -> ParameterSchema {
            ParameterSchema::new().required("message", ParamKind::String)
        }

        async fn execute(&self, params: Value) -> Result<Value, ToolError> {
            Ok(json!({ "echo": params["message"] }))
        }
    }

    struct FlakyTool {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl Tool for FlakyTool {
        fn name(&self) -> &str {
            "flaky"
        }

        fn description(&self) -> &str {
            "Fails a few times, then succeeds"
        }

        fn schema(&self) -> ParameterSchema {
            ParameterSchema::new()
        }

        async fn execute(&self, _params: Value) -> Result<Value, ToolError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(ToolError::ExecutionFailed {
                    name: "flaky".into(),
                    reason: "transient".into(),
                })
            } else {
                Ok(json!("ok"))
            }
        }
    }

    fn fast_policy() -> ToolPolicy {
        ToolPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1),
            min_call_interval: Duration::ZERO,
            timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn run_validates_then_executes() {
        let registry = ToolRegistry::new(fast_policy());
        registry.register(Arc::new(EchoTool)).await;

        let out = registry
            .run("echo", json!({"message": "hi"}))
            .await
            .unwrap();
        assert_eq!(out, json!({"echo": "hi"}));
    }

    #[tokio::test]
    async fn invalid_params_fail_without_execution() {
        let registry = ToolRegistry::new(fast_policy());
        registry.register(Arc::new(EchoTool)).await;

        let err = registry.run("echo", json!({"message": 42})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters { .. }));

        let err = registry.run("echo", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters { .. }));
    }

    #[tokio::test]
    async fn unknown_tool_not_found() {
        let registry = ToolRegistry::new(fast_policy());
        let err = registry.run("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));
    }

    #[tokio::test]
    async fn flaky_tool_retried_to_success() {
        let registry = ToolRegistry::new(fast_policy());
        let tool = Arc::new(FlakyTool {
            calls: AtomicU32::new(0),
            fail_first: 2,
        });
        registry.register(tool.clone()).await;

        let out = registry.run("flaky", json!({})).await.unwrap();
        assert_eq!(out, json!("ok"));
        assert_eq!(tool.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_budget_exhausts() {
        let registry = ToolRegistry::new(fast_policy());
        let tool = Arc::new(FlakyTool {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
        });
        registry.register(tool.clone()).await;

        let err = registry.run("flaky", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
        assert_eq!(tool.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rate_limit_spaces_calls() {
        let mut policy = fast_policy();
        policy.min_call_interval = Duration::from_millis(30);
        let registry = ToolRegistry::new(policy);
        registry.register(Arc::new(EchoTool)).await;

        let start = Instant::now();
        for _ in 0..3 {
            registry
                .run("echo", json!({"message": "hi"}))
                .await
                .unwrap();
        }
        // Three calls, two enforced gaps.
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn list_is_sorted() {
        let registry = ToolRegistry::new(fast_policy());
        registry.register(Arc::new(EchoTool)).await;
        assert_eq!(registry.list().await, vec!["echo".to_string()]);
    }
}
