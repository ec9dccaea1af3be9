use fusen_gateway_common::BoxFuture;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};
use tokio::sync::oneshot;
use tracing::debug;

use crate::{error::RegisterError, resource::InstanceRecord, Children, Register, Watcher};

/// In-process registry. Useful for fixed deployments and for tests, it keeps
/// the same one-shot watch semantics as zookeeper.
#[derive(Clone, Default)]
pub struct MemoryRegister {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    nodes: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    watchers: HashMap<String, Vec<oneshot::Sender<String>>>,
}

impl MemoryState {
    fn notify(&mut self, path: &str) {
        if let Some(watchers) = self.watchers.remove(path) {
            debug!("memory register notify {path} : {} watcher", watchers.len());
            for watcher in watchers {
                let _ = watcher.send(path.to_owned());
            }
        }
    }
}

impl MemoryRegister {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates `path` without children.
    pub fn create_path(&self, path: &str) {
        let mut state = self.state();
        if !state.nodes.contains_key(path) {
            state.nodes.insert(path.to_owned(), BTreeMap::new());
            state.notify(path);
        }
    }

    pub fn put(&self, path: &str, name: &str, data: impl Into<Vec<u8>>) {
        let mut state = self.state();
        state
            .nodes
            .entry(path.to_owned())
            .or_default()
            .insert(name.to_owned(), data.into());
        state.notify(path);
    }

    pub fn put_instance(&self, path: &str, name: &str, host: &str, weight: Option<i64>) {
        let record = InstanceRecord {
            host: host.to_owned(),
            weight,
        };
        let data = serde_json::to_vec(&record).unwrap_or_default();
        self.put(path, name, data);
    }

    pub fn remove(&self, path: &str, name: &str) {
        let mut state = self.state();
        let removed = state
            .nodes
            .get_mut(path)
            .and_then(|children| children.remove(name));
        if removed.is_some() {
            state.notify(path);
        }
    }
}

impl Register for MemoryRegister {
    fn list_children(&self, path: &str, watch: bool) -> BoxFuture<Result<Children, RegisterError>> {
        let mut guard = self.state();
        let state = &mut *guard;
        let result = match state.nodes.get(path) {
            Some(children) => {
                let names = children.keys().cloned().collect();
                let watcher = if watch {
                    let (sender, receiver) = oneshot::channel();
                    state
                        .watchers
                        .entry(path.to_owned())
                        .or_default()
                        .push(sender);
                    let watcher: Watcher = Box::pin(async move {
                        match receiver.await {
                            Ok(path) => path,
                            // register dropped, the watch never fires
                            Err(_) => std::future::pending().await,
                        }
                    });
                    Some(watcher)
                } else {
                    None
                };
                Ok(Children { names, watcher })
            }
            None => Err(RegisterError::NotFound(path.to_owned())),
        };
        Box::pin(async move { result })
    }

    fn get_data(&self, path: &str) -> BoxFuture<Result<Vec<u8>, RegisterError>> {
        let state = self.state();
        let data = path
            .rsplit_once('/')
            .and_then(|(parent, name)| {
                let parent = if parent.is_empty() { "/" } else { parent };
                state.nodes.get(parent)?.get(name).cloned()
            })
            .ok_or_else(|| RegisterError::NotFound(path.to_owned()));
        Box::pin(async move { data })
    }
}
