//! 核心编排层：错误、状态机、计划模型、注册表、工厂与进程关闭

pub mod autonomous;
pub mod basic;
pub mod error;
pub mod factory;
pub mod handle;
pub mod plan;
pub mod registry;
pub mod shutdown;
pub mod state;

pub use autonomous::{AutonomousAgent, FinalizeOnDrop};
pub use basic::{BasicAgent, CommandResult};
pub use error::{OrchestratorError, TIMEOUT_MESSAGE};
pub use factory::{AgentFactory, LoopOutcome, RuntimeSettings};
pub use handle::AgentHandle;
pub use plan::{
    Action, ActionStatus, KeywordPlanner, LogEntry, Phase, PhaseRecord, PlanStrategy, Report,
};
pub use registry::{AgentRegistry, Supervised};
pub use shutdown::{ShutdownCleanup, ShutdownCoordinator, ShutdownManager, ShutdownReason};
pub use state::{
    AgentState, AgentStatus, BasicStatus, DetailedAgentStatus, DetailedStatus, StatusSnapshot,
};
