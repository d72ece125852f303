//! Swarm - 目标驱动的 Agent 编排内核
//!
//! 模块划分：
//! - **catalog**: Agent / 团队目录（agents.toml 等）加载与校验
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: plan -> act -> report 状态机、命令 Agent、注册表、工厂、关闭处理
//! - **observability**: tracing 初始化
//! - **tools**: 动作执行器接口、模拟执行器、工具注册表执行器

pub mod catalog;
pub mod config;
pub mod core;
pub mod observability;
pub mod tools;

pub use catalog::{AgentCatalog, AgentConfig, ConfigProvider};
pub use crate::core::{AgentFactory, AgentState, OrchestratorError, RuntimeSettings};
