//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读默认 TOML，再读显式指定的文件，最后用环境变量 `SWARM__*` 覆盖
//! （双下划线表示嵌套，如 `SWARM__ORCHESTRATOR__PHASE_DELAY_MS=0`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub orchestrator: OrchestratorSection,
}

/// [app] 段：应用名与 Agent 目录位置
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// agents.{toml,yaml,yml,json} 所在目录
    #[serde(default = "default_catalog_dir")]
    pub catalog_dir: PathBuf,
}

fn default_catalog_dir() -> PathBuf {
    PathBuf::from("config")
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            catalog_dir: default_catalog_dir(),
        }
    }
}

/// [orchestrator] 段：循环节奏、工具超时、通知容量
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    /// 计划与报告阶段开始前的模拟耗时（毫秒，0 表示不等待）
    #[serde(default = "default_phase_delay_ms")]
    pub phase_delay_ms: u64,
    /// 模拟执行器每个动作的耗时
    #[serde(default = "default_action_delay_ms")]
    pub action_delay_ms: u64,
    /// ToolboxExecutor 单次调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// 循环结束通知的广播容量
    #[serde(default = "default_outcome_capacity")]
    pub outcome_capacity: usize,
    /// 命令行轮询状态的间隔
    #[serde(default = "default_status_poll_ms")]
    pub status_poll_ms: u64,
}

fn default_phase_delay_ms() -> u64 {
    100
}

fn default_action_delay_ms() -> u64 {
    50
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_outcome_capacity() -> usize {
    64
}

fn default_status_poll_ms() -> u64 {
    200
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            phase_delay_ms: default_phase_delay_ms(),
            action_delay_ms: default_action_delay_ms(),
            tool_timeout_secs: default_tool_timeout_secs(),
            outcome_capacity: default_outcome_capacity(),
            status_poll_ms: default_status_poll_ms(),
        }
    }
}

impl OrchestratorSection {
    pub fn phase_delay(&self) -> Duration {
        Duration::from_millis(self.phase_delay_ms)
    }

    pub fn action_delay(&self) -> Duration {
        Duration::from_millis(self.action_delay_ms)
    }

    pub fn status_poll(&self) -> Duration {
        Duration::from_millis(self.status_poll_ms.max(1))
    }
}

/// 加载配置：默认文件（config/ 或上级 config/ 或当前目录）-> 显式文件 -> 环境变量
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!("Config file {} not found, skipping", path.display());
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SWARM")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.app.catalog_dir, PathBuf::from("config"));
        assert_eq!(config.orchestrator.phase_delay(), Duration::from_millis(100));
        assert_eq!(config.orchestrator.action_delay(), Duration::from_millis(50));
        assert_eq!(config.orchestrator.tool_timeout_secs, 30);
        assert_eq!(config.orchestrator.outcome_capacity, 64);
    }

    #[test]
    fn test_load_explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swarm.toml");
        let body = concat!(
            "[app]\nname = \"cad\"\ncatalog_dir = \"agents\"\n\n",
            "[orchestrator]\nphase_delay_ms = 0\n",
        );
        std::fs::write(&path, body).unwrap();

        let config = load_config(Some(path)).unwrap();
        assert_eq!(config.app.name.as_deref(), Some("cad"));
        assert_eq!(config.app.catalog_dir, PathBuf::from("agents"));
        assert_eq!(config.orchestrator.phase_delay(), Duration::ZERO);
        assert_eq!(config.orchestrator.status_poll_ms, 200);
    }
}
