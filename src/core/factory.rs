//! Agent 工厂：校验配置、构建实例、登记、派生后台循环任务，并负责停止与清理
//!
//! 工厂是进程级上下文对象，由启动代码显式构建后传给各传输层。
//! 每个后台任务的 JoinHandle 记录在任务表中；任务结束时（包括被 abort）通过 drop guard 从表中移除自己，
//! stop_agent / cleanup 会 abort 并 await 对应任务。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::catalog::{AvailableAgents, ConfigProvider};
use crate::config::OrchestratorSection;
use crate::core::autonomous::{AutonomousAgent, FinalizeOnDrop};
use crate::core::basic::BasicAgent;
use crate::core::error::OrchestratorError;
use crate::core::handle::AgentHandle;
use crate::core::plan::{KeywordPlanner, PlanStrategy};
use crate::core::registry::{AgentRegistry, Supervised};
use crate::core::state::{AgentState, AgentStatus, DetailedAgentStatus, StatusSnapshot};
use crate::tools::{ActionExecutor, SimulatedExecutor, ToolRegistry, ToolboxExecutor};

type TaskTable = Arc<Mutex<HashMap<String, JoinHandle<()>>>>;

/// 工厂构建 Agent 时使用的运行参数
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub phase_delay: Duration,
    pub action_delay: Duration,
    /// ToolboxExecutor 单次工具调用上限
    pub tool_timeout: Duration,
    pub outcome_capacity: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from(&OrchestratorSection::default())
    }
}

impl From<&OrchestratorSection> for RuntimeSettings {
    fn from(section: &OrchestratorSection) -> Self {
        Self {
            phase_delay: section.phase_delay(),
            action_delay: section.action_delay(),
            tool_timeout: Duration::from_secs(section.tool_timeout_secs),
            outcome_capacity: section.outcome_capacity.max(1),
        }
    }
}

impl RuntimeSettings {
    /// 无等待（测试用）
    pub fn immediate() -> Self {
        Self {
            phase_delay: Duration::ZERO,
            action_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// 后台循环结束时广播的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopOutcome {
    pub agent_id: String,
    pub state: AgentState,
    pub error_message: Option<String>,
    pub iterations_completed: u32,
}

impl From<StatusSnapshot> for LoopOutcome {
    fn from(status: StatusSnapshot) -> Self {
        Self {
            agent_id: status.agent_id,
            state: status.state,
            error_message: status.error_message,
            iterations_completed: status.iterations_completed,
        }
    }
}

/// 任务结束（正常返回或被 abort）时：先收尾 Agent，再从任务表移除自己并广播结果
struct TaskCleanup {
    finalizer: Option<FinalizeOnDrop<Arc<AutonomousAgent>>>,
    agent: Arc<AutonomousAgent>,
    tasks: TaskTable,
    outcome_tx: broadcast::Sender<LoopOutcome>,
}

impl Drop for TaskCleanup {
    fn drop(&mut self) {
        drop(self.finalizer.take());
        let agent_id = self.agent.agent_id();
        lock_tasks(&self.tasks).remove(agent_id);
        let _ = self.outcome_tx.send(LoopOutcome::from(self.agent.status()));
    }
}

fn lock_tasks(tasks: &TaskTable) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
    tasks.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct AgentFactory {
    provider: Arc<dyn ConfigProvider>,
    registry: Arc<AgentRegistry>,
    tasks: TaskTable,
    settings: RuntimeSettings,
    planner: Arc<dyn PlanStrategy>,
    outcome_tx: broadcast::Sender<LoopOutcome>,
}

impl AgentFactory {
    pub fn new(provider: Arc<dyn ConfigProvider>, settings: RuntimeSettings) -> Self {
        let (outcome_tx, _) = broadcast::channel(settings.outcome_capacity.max(1));
        Self {
            provider,
            registry: Arc::new(AgentRegistry::new()),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            settings,
            planner: Arc::new(KeywordPlanner),
            outcome_tx,
        }
    }

    pub fn with_planner(mut self, planner: Arc<dyn PlanStrategy>) -> Self {
        self.planner = planner;
        self
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// 订阅后台循环结束通知
    pub fn subscribe(&self) -> broadcast::Receiver<LoopOutcome> {
        self.outcome_tx.subscribe()
    }

    /// 用配置的超时把工具注册表包装成执行器
    pub fn toolbox_executor(&self, registry: ToolRegistry) -> Arc<dyn ActionExecutor> {
        Arc::new(ToolboxExecutor::with_timeout(registry, self.settings.tool_timeout))
    }

    pub fn available_agents(&self) -> AvailableAgents {
        self.provider.available()
    }

    /// 按配置构建实例（不登记）；未提供执行器时自主 Agent 使用模拟执行器
    pub fn create_agent(
        &self,
        name: &str,
        executor: Option<Arc<dyn ActionExecutor>>,
    ) -> Result<AgentHandle, OrchestratorError> {
        let config = self
            .provider
            .agent_config(name)
            .ok_or_else(|| OrchestratorError::ConfigNotFound(name.to_string()))?;

        let errors = self.provider.validate_agent_config(&config);
        if !errors.is_empty() {
            return Err(OrchestratorError::InvalidConfig(errors.join("; ")));
        }

        if config.autonomous {
            let executor = executor
                .unwrap_or_else(|| Arc::new(SimulatedExecutor::new(self.settings.action_delay)));
            let agent = AutonomousAgent::new(name, config, executor)
                .with_planner(Arc::clone(&self.planner))
                .with_phase_delay(self.settings.phase_delay);
            Ok(agent.into())
        } else {
            Ok(BasicAgent::new(name, config).into())
        }
    }

    /// 创建、登记并启动自主 Agent；循环在后台任务中运行，立即返回启动快照
    pub fn start_autonomous_agent(
        &self,
        name: &str,
        goal: &str,
        context: Option<Value>,
        executor: Option<Arc<dyn ActionExecutor>>,
    ) -> Result<StatusSnapshot, OrchestratorError> {
        let handle = self.create_agent(name, executor)?;
        let agent = match handle.as_autonomous() {
            Some(agent) => Arc::clone(agent),
            None => return Err(OrchestratorError::NotAutonomous(name.to_string())),
        };

        self.registry.register(handle);
        let status = match agent.start(goal, context) {
            Ok(status) => status,
            Err(err) => {
                self.registry.unregister(agent.agent_id());
                return Err(err);
            }
        };

        let cleanup = TaskCleanup {
            finalizer: Some(FinalizeOnDrop::new(Arc::clone(&agent))),
            agent: Arc::clone(&agent),
            tasks: Arc::clone(&self.tasks),
            outcome_tx: self.outcome_tx.clone(),
        };

        // 任务先等 ready 再跑循环：插入任务表之前它不会自行结束，spawn 时也不持有表锁
        let (ready_tx, ready_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let guard = cleanup;
            let agent = Arc::clone(&guard.agent);
            if ready_rx.await.is_err() {
                return;
            }
            match agent.run_loop().await {
                Ok(final_status) => {
                    if let Some(message) = &final_status.error_message {
                        error!(
                            agent_id = %final_status.agent_id,
                            error = %message,
                            "Agent loop ended with error"
                        );
                    }
                }
                Err(err) => {
                    error!(agent_id = %agent.agent_id(), error = %err, "Agent loop could not run");
                }
            }
        });
        // 运行时正在关闭时 spawn 会当场丢弃任务（drop guard 已收尾），此时不再登记
        if task.is_finished() {
            warn!(
                agent_id = %agent.agent_id(),
                "Runtime is shutting down, agent loop not scheduled"
            );
        } else {
            lock_tasks(&self.tasks).insert(agent.agent_id().to_string(), task);
            // 登记期间任务被运行时丢弃：清掉残留条目
            if ready_tx.send(()).is_err() {
                lock_tasks(&self.tasks).remove(agent.agent_id());
            }
        }

        info!(agent_id = %agent.agent_id(), name = %name, "Autonomous agent launched");
        Ok(status)
    }

    /// 停止 Agent：协作式 stop，然后强制取消并等待其后台任务。未找到时返回 None。
    pub async fn stop_agent(&self, agent_id: &str) -> Option<AgentStatus> {
        let handle = self.registry.get(agent_id)?;
        handle.stop();

        let task = lock_tasks(&self.tasks).remove(agent_id);
        if let Some(task) = task {
            task.abort();
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    warn!(agent_id = %agent_id, error = %err, "Agent task panicked");
                }
            }
        }

        info!(agent_id = %agent_id, "Agent stop requested");
        Some(handle.status())
    }

    pub fn get_agent_status(&self, agent_id: &str) -> Option<AgentStatus> {
        self.registry.get(agent_id).map(|handle| handle.status())
    }

    pub fn get_agent_detailed_status(&self, agent_id: &str) -> Option<DetailedAgentStatus> {
        self.registry
            .get(agent_id)
            .map(|handle| handle.detailed_status())
    }

    pub fn list_running_agents(&self) -> Vec<(String, AgentStatus)> {
        self.registry.list_running()
    }

    pub fn list_all_agents(&self) -> Vec<(String, AgentStatus)> {
        self.registry.list_all()
    }

    /// 停止（如仍在运行）并从注册表移除
    pub async fn remove_agent(&self, agent_id: &str) -> Option<AgentStatus> {
        let status = self.stop_agent(agent_id).await?;
        self.registry.unregister(agent_id);
        Some(status)
    }

    /// 停止全部 Agent 并取消、等待所有后台任务。可重复调用。
    pub async fn cleanup(&self) {
        let stopped = self.registry.stop_all();

        let tasks: Vec<JoinHandle<()>> = lock_tasks(&self.tasks).drain().map(|(_, t)| t).collect();
        let count = tasks.len();
        for task in &tasks {
            task.abort();
        }
        for result in futures_util::future::join_all(tasks).await {
            if let Err(err) = result {
                if !err.is_cancelled() {
                    warn!(error = %err, "Agent task panicked during cleanup");
                }
            }
        }

        info!(
            stopped = stopped.len(),
            cancelled_tasks = count,
            "Factory cleanup finished"
        );
    }

    /// 当前仍被跟踪的后台任务数
    pub fn active_tasks(&self) -> usize {
        lock_tasks(&self.tasks).len()
    }
}

#[async_trait::async_trait]
impl crate::core::shutdown::ShutdownCleanup for Arc<AgentFactory> {
    async fn cleanup(&self) -> anyhow::Result<()> {
        AgentFactory::cleanup(self).await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "AgentFactory"
    }
}
