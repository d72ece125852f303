//! 编排器错误类型
//!
//! 创建期错误（配置缺失 / 校验失败 / 非自主配置）同步返回给调用方；
//! 循环期错误（动作失败、循环异常、超时）被吸收进 Agent 状态与执行日志，不跨越后台任务边界。

use thiserror::Error;

use crate::core::state::AgentState;

/// 超时后写入 error_message 的固定文案
pub const TIMEOUT_MESSAGE: &str = "Execution timeout exceeded";

/// 编排器运行过程中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("Agent configuration not found: {0}")]
    ConfigNotFound(String),

    /// 携带以 `; ` 拼接的校验信息
    #[error("Invalid agent configuration: {0}")]
    InvalidConfig(String),

    #[error("Agent {0} is not configured as autonomous")]
    NotAutonomous(String),

    #[error("Agent is already running: {0}")]
    AlreadyRunning(String),

    /// 单个动作执行失败：记录在 Action 上，不终止阶段或循环
    #[error("Action execution failed: {0}")]
    ActionExecution(String),

    #[error("Illegal state transition: {from} -> {to}")]
    IllegalTransition { from: AgentState, to: AgentState },

    /// run_loop 在 start 之前被调用，或同一次 start 被重复驱动
    #[error("No goal set for agent {0}")]
    NotStarted(String),

    #[error("Planner returned an empty plan for goal: {0}")]
    EmptyPlan(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_message_carries_details() {
        let err = OrchestratorError::InvalidConfig(
            "Missing required field: name; Missing required field: description".to_string(),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("Invalid agent configuration"));
        assert!(msg.contains("name; Missing"));
    }

    #[test]
    fn test_illegal_transition_display_uses_state_names() {
        let err = OrchestratorError::IllegalTransition {
            from: AgentState::Completed,
            to: AgentState::Acting,
        };
        assert_eq!(err.to_string(), "Illegal state transition: completed -> acting");
    }
}
