//! 注册表条目：两种 Agent 的统一句柄

use std::sync::Arc;

use crate::core::autonomous::AutonomousAgent;
use crate::core::basic::BasicAgent;
use crate::core::registry::Supervised;
use crate::core::state::{AgentStatus, DetailedAgentStatus};

#[derive(Clone)]
pub enum AgentHandle {
    Autonomous(Arc<AutonomousAgent>),
    Basic(Arc<BasicAgent>),
}

impl AgentHandle {
    pub fn agent_id(&self) -> &str {
        match self {
            AgentHandle::Autonomous(agent) => agent.agent_id(),
            AgentHandle::Basic(agent) => agent.agent_id(),
        }
    }

    pub fn is_autonomous(&self) -> bool {
        matches!(self, AgentHandle::Autonomous(_))
    }

    pub fn as_autonomous(&self) -> Option<&Arc<AutonomousAgent>> {
        match self {
            AgentHandle::Autonomous(agent) => Some(agent),
            AgentHandle::Basic(_) => None,
        }
    }

    pub fn as_basic(&self) -> Option<&Arc<BasicAgent>> {
        match self {
            AgentHandle::Basic(agent) => Some(agent),
            AgentHandle::Autonomous(_) => None,
        }
    }

    pub fn detailed_status(&self) -> DetailedAgentStatus {
        match self {
            AgentHandle::Autonomous(agent) => {
                DetailedAgentStatus::Autonomous(agent.detailed_status())
            }
            AgentHandle::Basic(agent) => DetailedAgentStatus::Basic(agent.status()),
        }
    }
}

impl Supervised for AgentHandle {
    type Status = AgentStatus;

    fn id(&self) -> String {
        self.agent_id().to_string()
    }

    fn status(&self) -> AgentStatus {
        match self {
            AgentHandle::Autonomous(agent) => AgentStatus::Autonomous(agent.status()),
            AgentHandle::Basic(agent) => AgentStatus::Basic(agent.status()),
        }
    }

    fn is_running(&self) -> bool {
        match self {
            AgentHandle::Autonomous(agent) => agent.is_running(),
            AgentHandle::Basic(_) => false,
        }
    }

    /// 命令 Agent 没有可停止的循环
    fn stop(&self) {
        if let AgentHandle::Autonomous(agent) = self {
            agent.stop();
        }
    }
}

impl From<AutonomousAgent> for AgentHandle {
    fn from(agent: AutonomousAgent) -> Self {
        AgentHandle::Autonomous(Arc::new(agent))
    }
}

impl From<BasicAgent> for AgentHandle {
    fn from(agent: BasicAgent) -> Self {
        AgentHandle::Basic(Arc::new(agent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AgentConfig;
    use crate::core::state::AgentState;
    use crate::tools::SimulatedExecutor;

    #[test]
    fn test_handle_dispatches_by_variant() {
        let auto: AgentHandle = AutonomousAgent::new(
            "designer",
            AgentConfig::autonomous("Designer", "Design"),
            Arc::new(SimulatedExecutor::default()),
        )
        .into();
        let basic: AgentHandle = BasicAgent::new("helper", AgentConfig::basic("Helper")).into();

        assert!(auto.is_autonomous());
        assert!(basic.as_basic().is_some());
        assert!(basic.as_autonomous().is_none());
        assert!(!basic.is_running());
        assert!(basic.status().as_autonomous().is_none());

        auto.stop();
        let status = auto.status();
        assert_eq!(status.as_autonomous().map(|s| s.state), Some(AgentState::Stopped));
        assert!(auto.detailed_status().as_autonomous().is_some());
    }
}
