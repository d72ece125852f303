//! 无状态命令 Agent：没有生命周期，每次调用独立执行一条命令

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::catalog::AgentConfig;
use crate::core::autonomous::new_agent_id;
use crate::core::state::BasicStatus;

/// 单条命令的执行结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub status: String,
    pub command: String,
    pub parameters: Map<String, Value>,
    pub message: String,
}

pub struct BasicAgent {
    agent_id: String,
    name: String,
    config: AgentConfig,
}

impl BasicAgent {
    pub fn new(key: &str, config: AgentConfig) -> Self {
        Self {
            agent_id: new_agent_id(key),
            name: config.display_name(key),
            config,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn execute_command(&self, command: &str, parameters: Map<String, Value>) -> CommandResult {
        info!(agent_id = %self.agent_id, command = %command, "Executing command");
        CommandResult {
            status: "completed".to_string(),
            command: command.to_string(),
            parameters,
            message: format!("Basic agent executed {command}"),
        }
    }

    pub fn status(&self) -> BasicStatus {
        BasicStatus {
            agent_id: self.agent_id.clone(),
            name: self.name.clone(),
            kind: "basic".to_string(),
            autonomous: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_execute_command_echoes_request() {
        let agent = BasicAgent::new("sketch_helper", AgentConfig::basic("Sketch Helper"));
        let mut parameters = Map::new();
        parameters.insert("radius".into(), json!(5));

        let result = agent.execute_command("DrawCircle", parameters.clone());
        assert_eq!(result.status, "completed");
        assert_eq!(result.command, "DrawCircle");
        assert_eq!(result.parameters, parameters);
        assert_eq!(result.message, "Basic agent executed DrawCircle");
    }

    #[test]
    fn test_status_is_not_autonomous() {
        let agent = BasicAgent::new("sketch_helper", AgentConfig::basic("Sketch Helper"));
        let status = agent.status();
        assert_eq!(status.kind, "basic");
        assert!(!status.autonomous);
        assert!(status.agent_id.starts_with("sketch_helper_"));
        assert_eq!(status.name, "Sketch Helper");
    }
}
