use fusen_gateway_common::BoxFuture;

use crate::error::RegisterError;

pub mod directory;
pub mod error;
pub mod resource;
pub mod support;

/// One-shot change notification, resolves with the path whose children changed.
pub type Watcher = BoxFuture<String>;

pub struct Children {
    pub names: Vec<String>,
    pub watcher: Option<Watcher>,
}

impl std::fmt::Debug for Children {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Children")
            .field("names", &self.names)
            .field("watch", &self.watcher.is_some())
            .finish()
    }
}

/// Read side of a hierarchical service registry.
pub trait Register: Send + Sync {
    /// Lists the child node names of `path`. With `watch` set the returned
    /// watcher fires once on the next children change and must be re-armed
    /// by listing again.
    fn list_children(&self, path: &str, watch: bool) -> BoxFuture<Result<Children, RegisterError>>;

    fn get_data(&self, path: &str) -> BoxFuture<Result<Vec<u8>, RegisterError>>;
}

pub fn child_path(path: &str, name: &str) -> String {
    if path.ends_with('/') {
        format!("{path}{name}")
    } else {
        format!("{path}/{name}")
    }
}
