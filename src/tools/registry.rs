//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / execute），由 ToolRegistry 按名注册；
//! ToolboxExecutor 把动作名映射到同名工具，在超时内执行，并为每次调用输出一行 JSON 审计日志。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::core::plan::Action;
use crate::tools::ActionExecutor;

/// 工具 trait：名称（与动作名一致）、描述、异步执行（参数为动作的 parameters）
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn execute(&self, parameters: &Map<String, Value>) -> Result<Value, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 返回 (name, description) 列表
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        let mut list: Vec<(String, String)> = self
            .tools
            .iter()
            .map(|(name, tool)| (name.clone(), tool.description().to_string()))
            .collect();
        list.sort();
        list
    }
}

/// 基于注册表的动作执行器：未知工具与超时都转为动作错误
pub struct ToolboxExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolboxExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_timeout(registry: ToolRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

#[async_trait]
impl ActionExecutor for ToolboxExecutor {
    async fn execute(&self, action: &Action) -> Result<Value, String> {
        let tool = self
            .registry
            .get(&action.name)
            .ok_or_else(|| format!("Unknown tool: {}", action.name))?;

        let start = Instant::now();
        let result = timeout(self.timeout, tool.execute(&action.parameters)).await;

        let (ok, outcome) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": action.name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&action.parameters),
        });
        tracing::info!(audit = %audit, "tool");

        match result {
            Ok(inner) => inner,
            Err(_) => Err(format!("Tool timeout: {}", action.name)),
        }
    }
}

fn args_preview(parameters: &Map<String, Value>) -> String {
    let s = Value::Object(parameters.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// 回显参数
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "Echo"
        }

        fn description(&self) -> &str {
            "Echo parameters back"
        }

        async fn execute(&self, parameters: &Map<String, Value>) -> Result<Value, String> {
            Ok(Value::Object(parameters.clone()))
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "Slow"
        }

        fn description(&self) -> &str {
            "Never finishes in time"
        }

        async fn execute(&self, _parameters: &Map<String, Value>) -> Result<Value, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        }
    }

    fn toolbox(timeout: Duration) -> ToolboxExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(SlowTool);
        ToolboxExecutor::with_timeout(registry, timeout)
    }

    #[tokio::test]
    async fn test_dispatches_to_tool_by_action_name() {
        let executor = toolbox(Duration::from_secs(1));
        let action = Action::new("Echo", json!({"radius": 5}));
        let result = executor.execute(&action).await.unwrap();
        assert_eq!(result, json!({"radius": 5}));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_an_error() {
        let executor = toolbox(Duration::from_secs(1));
        let action = Action::new("Fillet", json!({}));
        let err = executor.execute(&action).await.unwrap_err();
        assert_eq!(err, "Unknown tool: Fillet");
    }

    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let executor = toolbox(Duration::from_millis(20));
        let action = Action::new("Slow", json!({}));
        let err = executor.execute(&action).await.unwrap_err();
        assert_eq!(err, "Tool timeout: Slow");
    }

    #[test]
    fn test_registry_lists_sorted_names() {
        let executor = toolbox(Duration::from_secs(1));
        assert_eq!(executor.registry().tool_names(), vec!["Echo", "Slow"]);
        assert_eq!(executor.registry().tool_descriptions()[0].1, "Echo parameters back");
    }
}
