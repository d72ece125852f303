//! 动作执行器
//!
//! ActionExecutor 是状态机与外部工具之间唯一的接缝：每个动作调用一次，成功返回 JSON 值，失败返回错误文本。
//! 编排器从不重试；需要重试策略的调用方自行在执行器里实现。

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::plan::Action;

/// 执行单个动作的能力
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &Action) -> Result<Value, String>;
}

/// 未提供执行器时的默认实现：等待一小段时间后返回模拟结果
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    delay: Duration,
}

impl SimulatedExecutor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

#[async_trait]
impl ActionExecutor for SimulatedExecutor {
    async fn execute(&self, action: &Action) -> Result<Value, String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(json!({
            "status": "simulated",
            "action": action.name,
            "message": format!("Simulated execution of {}", action.name),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_executor_echoes_action_name() {
        let executor = SimulatedExecutor::new(Duration::ZERO);
        let action = Action::new("DrawCircle", json!({"radius": 5}));
        let result = executor.execute(&action).await.unwrap();
        assert_eq!(result["status"], "simulated");
        assert_eq!(result["action"], "DrawCircle");
        assert_eq!(result["message"], "Simulated execution of DrawCircle");
    }
}
