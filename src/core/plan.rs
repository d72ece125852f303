//! 计划模型：Action / LogEntry / Report 与可插拔的目标 -> 计划策略
//!
//! 默认策略 KeywordPlanner 按目标文本的关键字挑选预置动作序列（box / cylinder），否则给出单个通用动作。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// 动作执行状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    #[default]
    Pending,
    Completed,
    Error,
}

/// 计划中的单个步骤；执行后带上状态与结果（成功为返回值，失败为错误文本）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "action")]
    pub name: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl Action {
    pub fn new(name: impl Into<String>, parameters: Value) -> Self {
        let parameters = match parameters {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.into(),
            parameters,
            status: ActionStatus::Pending,
            result: None,
        }
    }

    pub fn complete(&mut self, result: Value) {
        self.status = ActionStatus::Completed;
        self.result = Some(result);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ActionStatus::Error;
        self.result = Some(Value::String(error.into()));
    }
}

/// 一轮迭代中的阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Plan,
    Act,
    Report,
}

/// 报告阶段的评估结果（由当前计划推导，不单独存储）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub goal_completed: bool,
    pub actions_completed: usize,
    pub total_actions: usize,
    pub success_rate: f64,
}

impl Report {
    pub fn from_plan(plan: &[Action]) -> Self {
        let total_actions = plan.len();
        let actions_completed = plan
            .iter()
            .filter(|a| a.status == ActionStatus::Completed)
            .count();
        let success_rate = if total_actions > 0 {
            actions_completed as f64 / total_actions as f64
        } else {
            0.0
        };
        Self {
            goal_completed: total_actions > 0 && actions_completed == total_actions,
            actions_completed,
            total_actions,
            success_rate,
        }
    }
}

/// 各阶段的日志负载，序列化时以 "phase" 字段区分
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum PhaseRecord {
    Plan {
        plan: Vec<Action>,
    },
    Act {
        actions_executed: usize,
        actions_failed: usize,
    },
    Report {
        report: Report,
    },
}

/// 执行日志条目（只追加，按阶段完成顺序排列）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub iteration: u32,
    #[serde(flatten)]
    pub record: PhaseRecord,
}

impl LogEntry {
    pub fn new(iteration: u32, record: PhaseRecord) -> Self {
        Self {
            timestamp: Utc::now(),
            iteration,
            record,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.record {
            PhaseRecord::Plan { .. } => Phase::Plan,
            PhaseRecord::Act { .. } => Phase::Act,
            PhaseRecord::Report { .. } => Phase::Report,
        }
    }
}

/// 目标 -> 计划 策略；约定：对任意目标返回非空、有序的动作列表
pub trait PlanStrategy: Send + Sync {
    fn plan(&self, goal: &str) -> Vec<Action>;
}

/// 默认策略：关键字匹配（不区分大小写）
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordPlanner;

impl PlanStrategy for KeywordPlanner {
    fn plan(&self, goal: &str) -> Vec<Action> {
        let goal = goal.to_lowercase();

        if goal.contains("box") || goal.contains("cube") {
            vec![
                Action::new("CreateSketch", json!({"plane": "xy"})),
                Action::new("DrawRectangle", json!({"width": 10, "depth": 10})),
                Action::new("Extrude", json!({"height": 5})),
            ]
        } else if goal.contains("circle") || goal.contains("cylinder") {
            vec![
                Action::new("CreateSketch", json!({"plane": "xy"})),
                Action::new("DrawCircle", json!({"radius": 5})),
                Action::new("Extrude", json!({"height": 10})),
            ]
        } else {
            vec![Action::new("CreateSketch", json!({"plane": "xy"}))]
        }
    }
}
