//! Agent 目录：agents / teams 定义的加载、查询与校验
//!
//! 目录文件放在 catalog_dir 下，按 agents.toml、agents.yaml、agents.yml、agents.json 顺序查找，命中第一个即用；
//! 找不到时返回空目录。编排器通过 ConfigProvider 取配置并在创建实例前校验。

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

const CATALOG_FILES: [&str; 4] = ["agents.toml", "agents.yaml", "agents.yml", "agents.json"];

/// 单个 Agent 的不可变配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub autonomous: bool,
    pub instructions: Option<String>,
    /// 有序去重（保留首次出现的位置）
    #[serde(default, deserialize_with = "ordered_set")]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub parameters: AgentParameters,
}

/// [agents.<key>.parameters]：迭代与超时上限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentParameters {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_max_iterations() -> u32 {
    10
}

fn default_timeout_seconds() -> u64 {
    300
}

impl Default for AgentParameters {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn ordered_set<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    let mut seen = HashSet::new();
    Ok(raw.into_iter().filter(|c| seen.insert(c.clone())).collect())
}

impl AgentConfig {
    /// 自主 Agent 配置（测试与内嵌目录用）
    pub fn autonomous(name: &str, instructions: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            description: Some(format!("{name} (autonomous)")),
            autonomous: true,
            instructions: Some(instructions.to_string()),
            ..Self::default()
        }
    }

    /// 非自主（命令式）Agent 配置
    pub fn basic(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            description: Some(format!("{name} (basic)")),
            ..Self::default()
        }
    }

    pub fn with_limits(mut self, max_iterations: u32, timeout_seconds: u64) -> Self {
        self.parameters = AgentParameters {
            max_iterations,
            timeout_seconds,
        };
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        self.capabilities = capabilities
            .into_iter()
            .map(Into::into)
            .filter(|c: &String| seen.insert(c.clone()))
            .collect();
        self
    }

    pub fn max_iterations(&self) -> u32 {
        self.parameters.max_iterations
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.parameters.timeout_seconds
    }

    /// 展示名：配置里的 name，缺省时回退到目录键
    pub fn display_name(&self, key: &str) -> String {
        self.name.clone().unwrap_or_else(|| key.to_string())
    }
}

/// 团队定义
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamConfig {
    pub name: Option<String>,
    pub description: Option<String>,
    pub members: Option<Vec<String>>,
    #[serde(default)]
    pub workflow: Vec<serde_json::Value>,
}

/// 校验单个 Agent 配置，返回错误列表（空表示合法）
pub fn validate_agent_config(config: &AgentConfig) -> Vec<String> {
    let mut errors = Vec::new();
    if config.name.is_none() {
        errors.push("Missing required field: name".to_string());
    }
    if config.description.is_none() {
        errors.push("Missing required field: description".to_string());
    }
    if config.autonomous && config.instructions.is_none() {
        errors.push("Autonomous agents require 'instructions' field".to_string());
    }
    errors
}

/// 配置提供者：编排器只依赖这两个操作
pub trait ConfigProvider: Send + Sync {
    fn agent_config(&self, name: &str) -> Option<AgentConfig>;

    fn validate_agent_config(&self, config: &AgentConfig) -> Vec<String> {
        validate_agent_config(config)
    }

    /// 供传输层展示的清单；不提供目录的实现返回空清单
    fn available(&self) -> AvailableAgents {
        AvailableAgents::default()
    }
}

/// 目录根（对应 agents.* 文件顶层）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentCatalog {
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,
    #[serde(default)]
    pub teams: BTreeMap<String, TeamConfig>,
}

/// 供传输层展示的 Agent 元数据
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentInfo {
    pub name: String,
    pub description: String,
    pub autonomous: bool,
    pub instructions: String,
    pub capabilities: Vec<String>,
    pub parameters: AgentParameters,
}

/// 供传输层展示的团队元数据
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamInfo {
    pub name: String,
    pub description: String,
    pub members: Vec<String>,
    pub workflow: Vec<serde_json::Value>,
}

/// 可用 Agent 与团队清单
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AvailableAgents {
    pub agents: BTreeMap<String, AgentInfo>,
    pub teams: BTreeMap<String, TeamInfo>,
}

impl AgentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent(mut self, key: &str, config: AgentConfig) -> Self {
        self.agents.insert(key.to_string(), config);
        self
    }

    pub fn with_team(mut self, key: &str, team: TeamConfig) -> Self {
        self.teams.insert(key.to_string(), team);
        self
    }

    /// 从 TOML 文本解析（测试与内嵌默认目录用）
    pub fn from_toml_str(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn agent(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.get(name)
    }

    pub fn team(&self, name: &str) -> Option<&TeamConfig> {
        self.teams.get(name)
    }

    pub fn autonomous_agents(&self) -> Vec<String> {
        self.agents
            .iter()
            .filter(|(_, c)| c.autonomous)
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn basic_agents(&self) -> Vec<String> {
        self.agents
            .iter()
            .filter(|(_, c)| !c.autonomous)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// 校验团队：必填字段 + 成员必须是已知 Agent
    pub fn validate_team_config(&self, team: &TeamConfig) -> Vec<String> {
        let mut errors = Vec::new();
        if team.name.is_none() {
            errors.push("Missing required field: name".to_string());
        }
        if team.description.is_none() {
            errors.push("Missing required field: description".to_string());
        }
        match &team.members {
            None => errors.push("Missing required field: members".to_string()),
            Some(members) => {
                for member in members {
                    if !self.agents.contains_key(member) {
                        errors.push(format!("Unknown agent in team members: {member}"));
                    }
                }
            }
        }
        errors
    }

    pub fn available(&self) -> AvailableAgents {
        let agents = self
            .agents
            .iter()
            .map(|(key, c)| {
                let info = AgentInfo {
                    name: c.display_name(key),
                    description: c.description.clone().unwrap_or_default(),
                    autonomous: c.autonomous,
                    instructions: c.instructions.clone().unwrap_or_default(),
                    capabilities: c.capabilities.clone(),
                    parameters: c.parameters,
                };
                (key.clone(), info)
            })
            .collect();
        let teams = self
            .teams
            .iter()
            .map(|(key, t)| {
                let info = TeamInfo {
                    name: t.name.clone().unwrap_or_else(|| key.clone()),
                    description: t.description.clone().unwrap_or_default(),
                    members: t.members.clone().unwrap_or_default(),
                    workflow: t.workflow.clone(),
                };
                (key.clone(), info)
            })
            .collect();
        AvailableAgents { agents, teams }
    }
}

impl ConfigProvider for AgentCatalog {
    fn agent_config(&self, name: &str) -> Option<AgentConfig> {
        self.agents.get(name).cloned()
    }

    fn available(&self) -> AvailableAgents {
        AgentCatalog::available(self)
    }
}

/// 从目录加载 agents.*；文件存在但解析失败时返回错误，全部缺失时返回空目录
pub fn load_catalog(dir: impl AsRef<Path>) -> Result<AgentCatalog, config::ConfigError> {
    let dir = dir.as_ref();
    for file in CATALOG_FILES {
        let path = dir.join(file);
        if !path.exists() {
            continue;
        }
        let catalog: AgentCatalog = config::Config::builder()
            .add_source(config::File::from(path.clone()))
            .build()?
            .try_deserialize()?;
        tracing::info!(
            path = %path.display(),
            agents = catalog.agents.len(),
            teams = catalog.teams.len(),
            "Agent catalog loaded"
        );
        return Ok(catalog);
    }
    tracing::warn!("No agent catalog found in {}, using empty catalog", dir.display());
    Ok(AgentCatalog::default())
}
