use fusen_gateway_common::shutdown::Shutdown;
use futures::future::try_join_all;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info};

use crate::{
    child_path,
    error::RegisterError,
    resource::{decode_instance, ServiceGroup},
    Children, Register, Watcher,
};

struct Entry {
    group: Arc<ServiceGroup>,
    // false once a reload failed and no watch is armed for the path
    watching: bool,
}

struct DirectoryInner {
    register: Arc<dyn Register>,
    cache: RwLock<HashMap<String, Entry>>,
    loading: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    notify_shutdown: std::sync::Mutex<Option<broadcast::Sender<()>>>,
}

/// Per registry path cache of service groups.
///
/// A path is loaded on its first lookup and a watch is armed at the same
/// time. Every change notification reloads the path and swaps the whole
/// group in, which also resets the rolling load balance weights. Concurrent
/// loads of one path are coalesced.
#[derive(Clone)]
pub struct ServiceDirectory {
    inner: Arc<DirectoryInner>,
}

impl ServiceDirectory {
    pub fn new(register: Arc<dyn Register>) -> Self {
        let (notify_shutdown, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(DirectoryInner {
                register,
                cache: RwLock::new(HashMap::new()),
                loading: Mutex::new(HashMap::new()),
                notify_shutdown: std::sync::Mutex::new(Some(notify_shutdown)),
            }),
        }
    }

    pub async fn resolve_group(&self, path: &str) -> Result<Arc<ServiceGroup>, RegisterError> {
        if let Some(group) = self.inner.fresh_group(path).await {
            return Ok(group);
        }
        let lock = self.inner.load_lock(path).await;
        let _guard = lock.lock().await;
        if let Some(group) = self.inner.fresh_group(path).await {
            return Ok(group);
        }
        let (group, watcher) = self.inner.load(path).await?;
        DirectoryInner::install(&self.inner, path, group.clone(), watcher).await;
        Ok(group)
    }

    /// The cached group of `path` without triggering a load.
    pub async fn cached_group(&self, path: &str) -> Option<Arc<ServiceGroup>> {
        self.inner
            .cache
            .read()
            .await
            .get(path)
            .map(|entry| entry.group.clone())
    }

    /// Stops every watch task. Cached groups keep being served as they are,
    /// paths loaded afterwards are loaded once and not watched.
    pub fn close(&self) {
        let sender = self
            .inner
            .notify_shutdown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if sender.is_some() {
            info!("service directory closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl DirectoryInner {
    fn is_closed(&self) -> bool {
        self.notify_shutdown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }

    fn shutdown(&self) -> Option<Shutdown> {
        self.notify_shutdown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|sender| Shutdown::new(sender.subscribe()))
    }

    /// The cached group while a watch keeps it current. Once closed no watch
    /// is armed any more and the cache is served as it is.
    async fn fresh_group(&self, path: &str) -> Option<Arc<ServiceGroup>> {
        let closed = self.is_closed();
        let cache = self.cache.read().await;
        let entry = cache.get(path)?;
        (entry.watching || closed).then(|| entry.group.clone())
    }

    async fn load_lock(&self, path: &str) -> Arc<Mutex<()>> {
        self.loading
            .lock()
            .await
            .entry(path.to_owned())
            .or_default()
            .clone()
    }

    async fn load(&self, path: &str) -> Result<(Arc<ServiceGroup>, Option<Watcher>), RegisterError> {
        let Children { names, watcher } = self.register.list_children(path, true).await?;
        let paths: Vec<String> = names.iter().map(|name| child_path(path, name)).collect();
        let datas = try_join_all(paths.iter().map(|path| self.register.get_data(path))).await?;
        let mut instances = Vec::with_capacity(datas.len());
        for (path, data) in paths.iter().zip(datas) {
            instances.push(decode_instance(path, &data)?);
        }
        let group = Arc::new(ServiceGroup::new(instances));
        info!(
            "load service group {path} : {} instance, total weight {}",
            group.len(),
            group.total_weight()
        );
        Ok((group, watcher))
    }

    async fn install(
        inner: &Arc<Self>,
        path: &str,
        group: Arc<ServiceGroup>,
        watcher: Option<Watcher>,
    ) {
        let watch = match (watcher, inner.shutdown()) {
            (Some(watcher), Some(shutdown)) => Some((watcher, shutdown)),
            _ => None,
        };
        inner.cache.write().await.insert(
            path.to_owned(),
            Entry {
                group,
                watching: watch.is_some(),
            },
        );
        if let Some((watcher, shutdown)) = watch {
            tokio::spawn(Self::watch(inner.clone(), path.to_owned(), watcher, shutdown));
        }
    }

    async fn watch(inner: Arc<Self>, path: String, mut watcher: Watcher, mut shutdown: Shutdown) {
        loop {
            tokio::select! {
                changed = &mut watcher => debug!("service path changed : {changed}"),
                _ = shutdown.recv() => {
                    debug!("stop watching {path}");
                    return;
                }
            }
            let lock = inner.load_lock(&path).await;
            let _guard = lock.lock().await;
            match inner.load(&path).await {
                Ok((group, next)) => {
                    let watching = next.is_some() && !shutdown.is_shutdown();
                    inner.cache.write().await.insert(
                        path.clone(),
                        Entry { group, watching },
                    );
                    match next {
                        Some(next) if watching => watcher = next,
                        _ => return,
                    }
                }
                Err(err) => {
                    error!("reload service group {path} err : {err}");
                    if let Some(entry) = inner.cache.write().await.get_mut(&path) {
                        entry.watching = false;
                    }
                    return;
                }
            }
        }
    }
}
