//! 状态定义：AgentState 生命周期与状态快照
//!
//! 外部调用方只能拿到快照（StatusSnapshot / DetailedStatus / BasicStatus）；
//! 快照在实例锁内一次性构建，读到的可能是旧值，但绝不会是半更新的值。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::error::OrchestratorError;
use crate::core::plan::{Action, LogEntry};

/// 自主 Agent 的生命周期状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Created,
    Planning,
    Acting,
    Reporting,
    Completed,
    Error,
    Stopped,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Created => "created",
            AgentState::Planning => "planning",
            AgentState::Acting => "acting",
            AgentState::Reporting => "reporting",
            AgentState::Completed => "completed",
            AgentState::Error => "error",
            AgentState::Stopped => "stopped",
        }
    }

    /// COMPLETED / ERROR / STOPPED 为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentState::Completed | AgentState::Error | AgentState::Stopped
        )
    }

    /// 状态转移表（穷举）：
    ///
    /// - CREATED / 终态 -> PLANNING（start，终态下为复用）
    /// - PLANNING -> PLANNING（start 之后第一轮进入计划阶段）/ ACTING
    /// - ACTING -> REPORTING
    /// - REPORTING -> PLANNING（下一轮）/ COMPLETED
    /// - PLANNING / REPORTING -> COMPLETED / ERROR（循环结束后的收尾判定）
    /// - 任意非终态 -> STOPPED / ERROR
    pub fn can_transition_to(&self, next: AgentState) -> bool {
        use AgentState::*;
        match (self, next) {
            (Created | Completed | Error | Stopped, Planning) => true,
            (Planning, Planning | Acting) => true,
            (Acting, Reporting) => true,
            (Reporting, Planning) => true,
            (Planning | Reporting, Completed) => true,
            (Created | Planning | Acting | Reporting, Error | Stopped) => true,
            _ => false,
        }
    }

    /// 执行一次转移；非法转移返回 IllegalTransition 而不是静默忽略
    pub fn transition(self, next: AgentState) -> Result<AgentState, OrchestratorError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(OrchestratorError::IllegalTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 自主 Agent 的简要状态快照（传输层直接序列化）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub agent_id: String,
    pub name: String,
    pub state: AgentState,
    pub current_goal: Option<String>,
    pub iterations_completed: u32,
    pub max_iterations: u32,
    /// 秒；(end_time 或 now) - start_time，未启动时为 0
    pub elapsed_time: f64,
    pub timeout_seconds: u64,
    pub error_message: Option<String>,
    pub running: bool,
    pub execution_log_length: usize,
}

/// 详细快照：在简要快照之上附带执行日志、当前计划与启动上下文
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetailedStatus {
    #[serde(flatten)]
    pub status: StatusSnapshot,
    pub execution_log: Vec<LogEntry>,
    pub current_plan: Vec<Action>,
    pub context: Option<serde_json::Value>,
}

/// 无状态命令 Agent 的快照
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicStatus {
    pub agent_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub autonomous: bool,
}

/// 注册表中任意 Agent 的简要状态
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AgentStatus {
    Autonomous(StatusSnapshot),
    Basic(BasicStatus),
}

impl AgentStatus {
    pub fn agent_id(&self) -> &str {
        match self {
            AgentStatus::Autonomous(s) => &s.agent_id,
            AgentStatus::Basic(s) => &s.agent_id,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, AgentStatus::Autonomous(s) if s.running)
    }

    pub fn as_autonomous(&self) -> Option<&StatusSnapshot> {
        match self {
            AgentStatus::Autonomous(s) => Some(s),
            AgentStatus::Basic(_) => None,
        }
    }
}

/// 注册表中任意 Agent 的详细状态
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DetailedAgentStatus {
    Autonomous(DetailedStatus),
    Basic(BasicStatus),
}

impl DetailedAgentStatus {
    pub fn as_autonomous(&self) -> Option<&DetailedStatus> {
        match self {
            DetailedAgentStatus::Autonomous(s) => Some(s),
            DetailedAgentStatus::Basic(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [AgentState; 7] = [
        AgentState::Created,
        AgentState::Planning,
        AgentState::Acting,
        AgentState::Reporting,
        AgentState::Completed,
        AgentState::Error,
        AgentState::Stopped,
    ];

    #[test]
    fn test_terminal_states() {
        let terminal: Vec<_> = ALL.iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(
            terminal,
            vec![&AgentState::Completed, &AgentState::Error, &AgentState::Stopped]
        );
    }

    #[test]
    fn test_planning_entry_points() {
        for state in ALL {
            let expected = state != AgentState::Acting;
            assert_eq!(
                state.can_transition_to(AgentState::Planning),
                expected,
                "{state} -> planning"
            );
        }
    }

    #[test]
    fn test_terminal_states_only_restart() {
        for from in [AgentState::Completed, AgentState::Error, AgentState::Stopped] {
            for to in ALL {
                assert_eq!(from.can_transition_to(to), to == AgentState::Planning);
            }
        }
    }

    #[test]
    fn test_cycle_order_is_enforced() {
        assert!(AgentState::Planning.can_transition_to(AgentState::Acting));
        assert!(AgentState::Acting.can_transition_to(AgentState::Reporting));
        assert!(AgentState::Reporting.can_transition_to(AgentState::Planning));
        assert!(!AgentState::Planning.can_transition_to(AgentState::Reporting));
        assert!(!AgentState::Acting.can_transition_to(AgentState::Completed));
        assert!(!AgentState::Created.can_transition_to(AgentState::Acting));
    }

    #[test]
    fn test_illegal_transition_is_an_error() {
        let err = AgentState::Stopped.transition(AgentState::Acting).unwrap_err();
        assert_eq!(
            err,
            OrchestratorError::IllegalTransition {
                from: AgentState::Stopped,
                to: AgentState::Acting,
            }
        );
        assert_eq!(
            AgentState::Acting.transition(AgentState::Stopped),
            Ok(AgentState::Stopped)
        );
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&AgentState::Reporting).unwrap();
        assert_eq!(json, "\"reporting\"");
    }

    #[test]
    fn test_basic_status_serializes_type_field() {
        let status = BasicStatus {
            agent_id: "helper_1234abcd".into(),
            name: "Helper".into(),
            kind: "basic".into(),
            autonomous: false,
        };
        let value = serde_json::to_value(AgentStatus::Basic(status)).unwrap();
        assert_eq!(value["type"], "basic");
        assert_eq!(value["autonomous"], false);
    }
}
