//! Agent 注册表：agent_id -> 实例
//!
//! 一把互斥锁只保护 map 本身，从不在持锁期间调用 Agent 的方法：
//! 批量操作先在锁内拍快照，释放锁后再逐个调用，因此 stop() 里回查注册表也不会死锁。

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::info;

use crate::core::handle::AgentHandle;

/// 可被注册表监管的实例
pub trait Supervised: Clone + Send + Sync {
    type Status;

    fn id(&self) -> String;

    fn status(&self) -> Self::Status;

    fn is_running(&self) -> bool;

    fn stop(&self);
}

pub struct AgentRegistry<A: Supervised = AgentHandle> {
    agents: Mutex<HashMap<String, A>>,
}

impl<A: Supervised> Default for AgentRegistry<A> {
    fn default() -> Self {
        Self {
            agents: Mutex::new(HashMap::new()),
        }
    }
}

impl<A: Supervised> AgentRegistry<A> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, A>> {
        self.agents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 登记实例；同 id 已存在时覆盖并返回旧条目
    pub fn register(&self, agent: A) -> Option<A> {
        let id = agent.id();
        let replaced = self.lock().insert(id.clone(), agent);
        info!(agent_id = %id, "Agent registered");
        replaced
    }

    pub fn unregister(&self, agent_id: &str) -> Option<A> {
        let removed = self.lock().remove(agent_id);
        if removed.is_some() {
            info!(agent_id = %agent_id, "Agent unregistered");
        }
        removed
    }

    pub fn get(&self, agent_id: &str) -> Option<A> {
        self.lock().get(agent_id).cloned()
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.lock().contains_key(agent_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 锁内复制条目（按 id 排序），随即释放锁
    fn entries(&self) -> Vec<(String, A)> {
        let mut entries: Vec<(String, A)> = self
            .lock()
            .iter()
            .map(|(id, agent)| (id.clone(), agent.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn list_all(&self) -> Vec<(String, A::Status)> {
        self.entries()
            .into_iter()
            .map(|(id, agent)| (id, agent.status()))
            .collect()
    }

    pub fn list_running(&self) -> Vec<(String, A::Status)> {
        self.entries()
            .into_iter()
            .filter(|(_, agent)| agent.is_running())
            .map(|(id, agent)| (id, agent.status()))
            .collect()
    }

    /// 停止所有运行中的实例，返回被停止的 id
    pub fn stop_all(&self) -> Vec<String> {
        let mut stopped = Vec::new();
        for (id, agent) in self.entries() {
            if agent.is_running() {
                agent.stop();
                stopped.push(id);
            }
        }
        if !stopped.is_empty() {
            info!(count = stopped.len(), "Stopped all running agents");
        }
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Weak};

    /// stop() 时回查注册表的测试实例
    #[derive(Clone)]
    struct StubAgent {
        id: String,
        running: Arc<AtomicBool>,
        lookups: Arc<AtomicUsize>,
        registry: Weak<AgentRegistry<StubAgent>>,
    }

    impl StubAgent {
        fn new(id: &str, running: bool, registry: &Arc<AgentRegistry<StubAgent>>) -> Self {
            Self {
                id: id.to_string(),
                running: Arc::new(AtomicBool::new(running)),
                lookups: Arc::new(AtomicUsize::new(0)),
                registry: Arc::downgrade(registry),
            }
        }
    }

    impl Supervised for StubAgent {
        type Status = bool;

        fn id(&self) -> String {
            self.id.clone()
        }

        fn status(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        fn stop(&self) {
            if let Some(registry) = self.registry.upgrade() {
                if registry.get(&self.id).is_some() {
                    self.lookups.fetch_add(1, Ordering::SeqCst);
                }
                let _ = registry.list_all();
            }
            self.running.store(false, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_register_get_unregister() {
        let registry = Arc::new(AgentRegistry::new());
        let stub = StubAgent::new("a1", true, &registry);
        assert!(registry.register(stub).is_none());
        assert!(registry.contains("a1"));
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister("a1").is_some());
        assert!(registry.get("a1").is_none());
        assert!(registry.unregister("a1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_same_id_replaces() {
        let registry = Arc::new(AgentRegistry::new());
        registry.register(StubAgent::new("dup", true, &registry));
        let replaced = registry.register(StubAgent::new("dup", false, &registry));
        assert!(replaced.is_some());
        assert_eq!(registry.len(), 1);
        assert!(!registry.get("dup").unwrap().is_running());
    }

    #[test]
    fn test_list_running_filters() {
        let registry = Arc::new(AgentRegistry::new());
        registry.register(StubAgent::new("b", true, &registry));
        registry.register(StubAgent::new("a", false, &registry));

        let all: Vec<_> = registry.list_all().into_iter().map(|(id, _)| id).collect();
        assert_eq!(all, vec!["a", "b"]);
        let running: Vec<_> = registry.list_running().into_iter().map(|(id, _)| id).collect();
        assert_eq!(running, vec!["b"]);
    }

    #[test]
    fn test_stop_all_calls_stop_outside_lock() {
        let registry = Arc::new(AgentRegistry::new());
        let first = StubAgent::new("x1", true, &registry);
        let second = StubAgent::new("x2", true, &registry);
        let idle = StubAgent::new("x3", false, &registry);
        registry.register(first.clone());
        registry.register(second.clone());
        registry.register(idle.clone());

        let stopped = registry.stop_all();
        assert_eq!(stopped, vec!["x1", "x2"]);
        assert!(!first.is_running());
        assert!(!second.is_running());
        assert_eq!(first.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(second.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(idle.lookups.load(Ordering::SeqCst), 0);

        assert!(registry.stop_all().is_empty());
        assert!(registry.list_running().is_empty());
    }
}
