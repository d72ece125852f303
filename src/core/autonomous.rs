//! 自主 Agent：plan -> act -> report 循环状态机
//!
//! 实例字段只由自己的循环任务写入；外部调用方只能 stop（置位停止令牌）和读取快照。
//! 所有写操作都在实例锁内先检查停止令牌，因此 STOPPED 之后循环不会再改动状态、计划或日志。
//! 收尾（running=false、end_time）集中在 finalize，一次且仅一次生效，任务被 abort 时由 FinalizeOnDrop 兜底。

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::AgentConfig;
use crate::core::error::{OrchestratorError, TIMEOUT_MESSAGE};
use crate::core::plan::{Action, KeywordPlanner, LogEntry, PhaseRecord, PlanStrategy, Report};
use crate::core::state::{AgentState, DetailedStatus, StatusSnapshot};
use crate::tools::ActionExecutor;

/// 计划与报告阶段开始前的模拟耗时
pub const DEFAULT_PHASE_DELAY: Duration = Duration::from_millis(100);

/// 生成实例 id：名称 + 8 位随机后缀
pub fn new_agent_id(name: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", name, &suffix[..8])
}

/// 实例锁保护的可变部分
struct AgentInner {
    state: AgentState,
    current_goal: Option<String>,
    context: Option<Value>,
    current_plan: Vec<Action>,
    execution_log: Vec<LogEntry>,
    error_message: Option<String>,
    iterations_completed: u32,
    start_time: Option<Instant>,
    end_time: Option<Instant>,
    /// 每次 start 换新；stop 取消它
    stop_token: CancellationToken,
    running: bool,
    /// 本次 start 的循环是否已被驱动
    loop_claimed: bool,
}

impl AgentInner {
    fn new() -> Self {
        Self {
            state: AgentState::Created,
            current_goal: None,
            context: None,
            current_plan: Vec::new(),
            execution_log: Vec::new(),
            error_message: None,
            iterations_completed: 0,
            start_time: None,
            end_time: None,
            stop_token: CancellationToken::new(),
            running: false,
            loop_claimed: false,
        }
    }
}

/// 目标驱动的自主 Agent
pub struct AutonomousAgent {
    agent_id: String,
    name: String,
    config: AgentConfig,
    executor: Arc<dyn ActionExecutor>,
    planner: Arc<dyn PlanStrategy>,
    phase_delay: Duration,
    inner: Mutex<AgentInner>,
}

impl AutonomousAgent {
    /// key 为目录键：用于生成 id；展示名取配置里的 name
    pub fn new(key: &str, config: AgentConfig, executor: Arc<dyn ActionExecutor>) -> Self {
        let display_name = config.display_name(key);
        Self::with_id(new_agent_id(key), &display_name, config, executor)
    }

    pub fn with_id(
        agent_id: String,
        name: &str,
        config: AgentConfig,
        executor: Arc<dyn ActionExecutor>,
    ) -> Self {
        Self {
            agent_id,
            name: name.to_string(),
            config,
            executor,
            planner: Arc::new(KeywordPlanner),
            phase_delay: DEFAULT_PHASE_DELAY,
            inner: Mutex::new(AgentInner::new()),
        }
    }

    pub fn with_planner(mut self, planner: Arc<dyn PlanStrategy>) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_phase_delay(mut self, delay: Duration) -> Self {
        self.phase_delay = delay;
        self
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

    pub fn state(&self) -> AgentState {
        self.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn stop_requested(&self) -> bool {
        self.lock().stop_token.is_cancelled()
    }

    fn lock(&self) -> MutexGuard<'_, AgentInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 开始新目标：重置上一轮的计划、日志和错误，进入 PLANNING。不驱动循环。
    pub fn start(
        &self,
        goal: &str,
        context: Option<Value>,
    ) -> Result<StatusSnapshot, OrchestratorError> {
        let mut inner = self.lock();
        if inner.running {
            return Err(OrchestratorError::AlreadyRunning(self.agent_id.clone()));
        }
        let next = inner.state.transition(AgentState::Planning)?;

        inner.current_goal = Some(goal.to_string());
        inner.context = context;
        inner.current_plan.clear();
        inner.execution_log.clear();
        inner.error_message = None;
        inner.iterations_completed = 0;
        inner.start_time = Some(Instant::now());
        inner.end_time = None;
        inner.stop_token = CancellationToken::new();
        inner.running = true;
        inner.loop_claimed = false;
        inner.state = next;

        info!(agent_id = %self.agent_id, goal = %goal, "Agent started");
        Ok(self.snapshot(&inner))
    }

    /// 请求停止；非终态立即置为 STOPPED。可重复调用。
    pub fn stop(&self) -> StatusSnapshot {
        let mut inner = self.lock();
        inner.stop_token.cancel();
        if !inner.state.is_terminal() {
            inner.state = AgentState::Stopped;
            inner.end_time = Some(Instant::now());
            info!(agent_id = %self.agent_id, "Agent stopped");
        }
        self.snapshot(&inner)
    }

    pub fn status(&self) -> StatusSnapshot {
        let inner = self.lock();
        self.snapshot(&inner)
    }

    pub fn detailed_status(&self) -> DetailedStatus {
        let inner = self.lock();
        DetailedStatus {
            status: self.snapshot(&inner),
            execution_log: inner.execution_log.clone(),
            current_plan: inner.current_plan.clone(),
            context: inner.context.clone(),
        }
    }

    fn snapshot(&self, inner: &AgentInner) -> StatusSnapshot {
        let elapsed_time = match inner.start_time {
            Some(start) => inner
                .end_time
                .unwrap_or_else(Instant::now)
                .saturating_duration_since(start)
                .as_secs_f64(),
            None => 0.0,
        };
        StatusSnapshot {
            agent_id: self.agent_id.clone(),
            name: self.name.clone(),
            state: inner.state,
            current_goal: inner.current_goal.clone(),
            iterations_completed: inner.iterations_completed,
            max_iterations: self.config.max_iterations(),
            elapsed_time,
            timeout_seconds: self.config.timeout_seconds(),
            error_message: inner.error_message.clone(),
            running: inner.running,
            execution_log_length: inner.execution_log.len(),
        }
    }

    /// 驱动本次 start 的循环直到终态。每次 start 只能驱动一次。
    ///
    /// 循环内部的失败不会作为 Err 返回：它们被写入 error_message 并使 Agent 进入 ERROR。
    pub async fn run_loop(&self) -> Result<StatusSnapshot, OrchestratorError> {
        let (goal, token) = {
            let mut inner = self.lock();
            let goal = match (&inner.current_goal, inner.running && !inner.loop_claimed) {
                (Some(goal), true) => goal.clone(),
                _ => return Err(OrchestratorError::NotStarted(self.agent_id.clone())),
            };
            inner.loop_claimed = true;
            (goal, inner.stop_token.clone())
        };

        let finalizer = FinalizeOnDrop::new(self);
        if let Err(err) = self.drive(&goal, &token).await {
            error!(agent_id = %self.agent_id, error = %err, "Agent loop failed");
            self.fail(err.to_string());
        }
        drop(finalizer);

        Ok(self.status())
    }

    async fn drive(&self, goal: &str, token: &CancellationToken) -> Result<(), OrchestratorError> {
        let max_iterations = self.config.max_iterations();
        let timeout = Duration::from_secs(self.config.timeout_seconds());
        let started = self.lock().start_time.unwrap_or_else(Instant::now);
        let mut timed_out = false;

        loop {
            if token.is_cancelled() {
                break;
            }
            let iteration = self.lock().iterations_completed;
            if iteration >= max_iterations {
                break;
            }
            if started.elapsed() >= timeout {
                timed_out = true;
                break;
            }

            info!(agent_id = %self.agent_id, iteration, "Starting iteration");
            if !self.plan_phase(goal, iteration, token).await? {
                break;
            }
            if !self.act_phase(iteration, token).await? {
                break;
            }
            match self.report_phase(iteration, token).await? {
                None => break,
                Some(report) if report.goal_completed => {
                    if self.advance(AgentState::Completed)? {
                        info!(agent_id = %self.agent_id, iteration, "Goal completed");
                    }
                    return Ok(());
                }
                Some(_) => {
                    if !self.record(|inner| inner.iterations_completed += 1) {
                        break;
                    }
                }
            }
        }

        self.settle(timed_out)
    }

    async fn plan_phase(
        &self,
        goal: &str,
        iteration: u32,
        token: &CancellationToken,
    ) -> Result<bool, OrchestratorError> {
        if !self.advance(AgentState::Planning)? {
            return Ok(false);
        }
        debug!(agent_id = %self.agent_id, iteration, "Plan phase");
        if !self.pause(token).await {
            return Ok(false);
        }

        let plan = self.planner.plan(goal);
        if plan.is_empty() {
            return Err(OrchestratorError::EmptyPlan(goal.to_string()));
        }
        let steps = plan.len();
        let recorded = self.record(|inner| {
            inner.current_plan = plan.clone();
            inner
                .execution_log
                .push(LogEntry::new(iteration, PhaseRecord::Plan { plan }));
        });
        if recorded {
            debug!(agent_id = %self.agent_id, iteration, steps, "Plan created");
        }
        Ok(recorded)
    }

    async fn act_phase(
        &self,
        iteration: u32,
        token: &CancellationToken,
    ) -> Result<bool, OrchestratorError> {
        if !self.advance(AgentState::Acting)? {
            return Ok(false);
        }
        debug!(agent_id = %self.agent_id, iteration, "Act phase");

        let plan = self.lock().current_plan.clone();
        let mut actions_executed = 0;
        let mut actions_failed = 0;

        for (index, action) in plan.iter().enumerate() {
            if token.is_cancelled() {
                return Ok(false);
            }
            let outcome = self.executor.execute(action).await;
            match &outcome {
                Ok(_) => actions_executed += 1,
                Err(message) => {
                    actions_failed += 1;
                    let err = OrchestratorError::ActionExecution(message.clone());
                    error!(
                        agent_id = %self.agent_id,
                        iteration,
                        action = %action.name,
                        error = %err,
                        "Action failed"
                    );
                }
            }
            let applied = self.record(|inner| {
                if let Some(slot) = inner.current_plan.get_mut(index) {
                    match outcome {
                        Ok(value) => slot.complete(value),
                        Err(message) => slot.fail(message),
                    }
                }
            });
            if !applied {
                return Ok(false);
            }
        }

        Ok(self.record(|inner| {
            inner.execution_log.push(LogEntry::new(
                iteration,
                PhaseRecord::Act {
                    actions_executed,
                    actions_failed,
                },
            ));
        }))
    }

    async fn report_phase(
        &self,
        iteration: u32,
        token: &CancellationToken,
    ) -> Result<Option<Report>, OrchestratorError> {
        if !self.advance(AgentState::Reporting)? {
            return Ok(None);
        }
        debug!(agent_id = %self.agent_id, iteration, "Report phase");
        if !self.pause(token).await {
            return Ok(None);
        }

        let report = Report::from_plan(&self.lock().current_plan);
        let entry = LogEntry::new(
            iteration,
            PhaseRecord::Report {
                report: report.clone(),
            },
        );
        if !self.record(|inner| inner.execution_log.push(entry)) {
            return Ok(None);
        }
        info!(
            agent_id = %self.agent_id,
            iteration,
            completed = report.actions_completed,
            total = report.total_actions,
            success_rate = report.success_rate,
            "Iteration report"
        );
        Ok(Some(report))
    }

    /// 循环退出后的判定：迭代耗尽 -> COMPLETED，超时 -> ERROR
    fn settle(&self, timed_out: bool) -> Result<(), OrchestratorError> {
        let mut inner = self.lock();
        if inner.stop_token.is_cancelled() || inner.state == AgentState::Completed {
            return Ok(());
        }
        if inner.iterations_completed >= self.config.max_iterations() {
            inner.state = inner.state.transition(AgentState::Completed)?;
            info!(
                agent_id = %self.agent_id,
                iterations = inner.iterations_completed,
                "Max iterations reached"
            );
        } else if timed_out {
            inner.state = inner.state.transition(AgentState::Error)?;
            inner.error_message = Some(TIMEOUT_MESSAGE.to_string());
            warn!(
                agent_id = %self.agent_id,
                timeout_seconds = self.config.timeout_seconds(),
                "Agent timed out"
            );
        }
        Ok(())
    }

    /// 状态转移；停止已请求时不做任何修改并返回 false
    fn advance(&self, next: AgentState) -> Result<bool, OrchestratorError> {
        let mut inner = self.lock();
        if inner.stop_token.is_cancelled() {
            return Ok(false);
        }
        inner.state = inner.state.transition(next)?;
        Ok(true)
    }

    /// 在锁内写入计划 / 日志 / 计数；停止已请求时丢弃写入并返回 false
    fn record<F>(&self, write: F) -> bool
    where
        F: FnOnce(&mut AgentInner),
    {
        let mut inner = self.lock();
        if inner.stop_token.is_cancelled() {
            return false;
        }
        write(&mut inner);
        true
    }

    fn fail(&self, message: String) {
        let mut inner = self.lock();
        if let Ok(next) = inner.state.transition(AgentState::Error) {
            inner.state = next;
            inner.error_message = Some(message);
        }
    }

    /// 计划与报告阶段开始前的模拟耗时；被 stop 打断时返回 false
    async fn pause(&self, token: &CancellationToken) -> bool {
        if self.phase_delay.is_zero() {
            return !token.is_cancelled();
        }
        tokio::select! {
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(self.phase_delay) => true,
        }
    }

    /// 唯一的收尾点：running=false、end_time=now；若仍处于非终态（任务被中途取消）则置为 STOPPED
    fn finalize(&self) {
        let mut inner = self.lock();
        if !inner.running {
            return;
        }
        inner.running = false;
        inner.end_time = Some(Instant::now());
        if !inner.state.is_terminal() {
            inner.stop_token.cancel();
            inner.state = AgentState::Stopped;
            warn!(agent_id = %self.agent_id, "Agent loop ended before reaching a terminal state");
        }
        info!(
            agent_id = %self.agent_id,
            state = %inner.state,
            iterations = inner.iterations_completed,
            "Agent loop finished"
        );
    }
}

/// 离开作用域时执行 finalize；可持有 `&AutonomousAgent` 或 `Arc<AutonomousAgent>`
pub struct FinalizeOnDrop<A>
where
    A: Deref<Target = AutonomousAgent>,
{
    agent: A,
}

impl<A> FinalizeOnDrop<A>
where
    A: Deref<Target = AutonomousAgent>,
{
    pub fn new(agent: A) -> Self {
        Self { agent }
    }
}

impl<A> Drop for FinalizeOnDrop<A>
where
    A: Deref<Target = AutonomousAgent>,
{
    fn drop(&mut self) {
        self.agent.finalize();
    }
}
