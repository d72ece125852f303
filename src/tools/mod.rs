//! 工具层：动作执行器接口、模拟执行器与基于注册表的执行器

pub mod executor;
pub mod registry;

pub use executor::{ActionExecutor, SimulatedExecutor};
pub use registry::{Tool, ToolRegistry, ToolboxExecutor};
