//! Swarm 命令行入口
//!
//! `swarm` 列出可用 Agent；`swarm <AGENT> <GOAL...>` 启动自主 Agent 并轮询到结束（或 Ctrl+C），
//! 输出详细状态。非自主 Agent 把 GOAL 当作一条命令执行。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde_json::Map;
use swarm::catalog::load_catalog;
use swarm::config::load_config;
use swarm::core::{
    AgentFactory, OrchestratorError, RuntimeSettings, ShutdownCoordinator, ShutdownManager,
    ShutdownReason,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    swarm::observability::init();

    let config_path = std::env::var_os("SWARM_CONFIG").map(PathBuf::from);
    let settings = load_config(config_path).context("Failed to load config")?;
    let catalog = load_catalog(&settings.app.catalog_dir).context("Failed to load agent catalog")?;
    let factory = Arc::new(AgentFactory::new(
        Arc::new(catalog),
        RuntimeSettings::from(&settings.orchestrator),
    ));

    let mut args = std::env::args().skip(1);
    let Some(agent_name) = args.next() else {
        println!("{}", serde_json::to_string_pretty(&factory.available_agents())?);
        return Ok(());
    };
    let goal = args.collect::<Vec<_>>().join(" ");
    anyhow::ensure!(!goal.is_empty(), "usage: swarm [AGENT] [GOAL...]");

    let started = match factory.start_autonomous_agent(&agent_name, &goal, None, None) {
        Ok(status) => status,
        Err(OrchestratorError::NotAutonomous(_)) => {
            let handle = factory.create_agent(&agent_name, None)?;
            if let Some(agent) = handle.as_basic() {
                let result = agent.execute_command(&goal, Map::new());
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            return Ok(());
        }
        Err(err) => return Err(err).context("Failed to start agent"),
    };
    tracing::info!(agent_id = %started.agent_id, "Agent running, press Ctrl+C to stop");

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();
    let mut coordinator =
        ShutdownCoordinator::new(Arc::clone(&shutdown)).with_timeout(Duration::from_secs(5));
    coordinator.register(Arc::clone(&factory));

    let poll = settings.orchestrator.status_poll();
    loop {
        tokio::select! {
            _ = shutdown.wait_for_shutdown() => break,
            _ = tokio::time::sleep(poll) => {
                let running = factory
                    .get_agent_status(&started.agent_id)
                    .is_some_and(|status| status.is_running());
                if !running {
                    shutdown.shutdown(ShutdownReason::Finished);
                    break;
                }
            }
        }
    }

    coordinator.run_cleanup().await;

    let detailed = factory
        .get_agent_detailed_status(&started.agent_id)
        .context("Agent disappeared from registry")?;
    println!("{}", serde_json::to_string_pretty(&detailed)?);
    Ok(())
}
