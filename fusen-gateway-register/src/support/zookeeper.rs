use fusen_gateway_common::BoxFuture;
use tracing::{debug, info};
use zookeeper_client as zk;

use crate::{error::RegisterError, Children, Register, Watcher};

#[derive(Clone)]
pub struct ZookeeperRegister {
    client: zk::Client,
}

impl ZookeeperRegister {
    /// Connects once, there is no reconnect loop: a failure here is returned to the caller.
    pub async fn connect(cluster: &str) -> Result<Self, RegisterError> {
        let client = zk::Client::connect(cluster)
            .await
            .map_err(|error| RegisterError::Error(Box::new(error)))?;
        info!("zookeeper connected : {cluster}");
        Ok(Self { client })
    }
}

fn to_register_error(path: &str, error: zk::Error) -> RegisterError {
    match error {
        zk::Error::NoNode => RegisterError::NotFound(path.to_owned()),
        error => RegisterError::Error(Box::new(error)),
    }
}

impl Register for ZookeeperRegister {
    fn list_children(&self, path: &str, watch: bool) -> BoxFuture<Result<Children, RegisterError>> {
        let client = self.client.clone();
        let path = path.to_owned();
        Box::pin(async move {
            if !watch {
                let names = client
                    .list_children(&path)
                    .await
                    .map_err(|error| to_register_error(&path, error))?;
                return Ok(Children {
                    names,
                    watcher: None,
                });
            }
            let (names, _stat, watcher) = client
                .get_and_watch_children(&path)
                .await
                .map_err(|error| to_register_error(&path, error))?;
            let watch_path = path.clone();
            let watcher: Watcher = Box::pin(async move {
                let event: zk::WatchedEvent = watcher.changed().await;
                debug!(
                    "zookeeper event {:?} - {:?} : {}",
                    event.event_type, event.session_state, event.path
                );
                watch_path
            });
            Ok(Children {
                names,
                watcher: Some(watcher),
            })
        })
    }

    fn get_data(&self, path: &str) -> BoxFuture<Result<Vec<u8>, RegisterError>> {
        let client = self.client.clone();
        let path = path.to_owned();
        Box::pin(async move {
            let (data, _stat) = client
                .get_data(&path)
                .await
                .map_err(|error| to_register_error(&path, error))?;
            Ok(data)
        })
    }
}
