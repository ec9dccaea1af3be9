use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

use crate::error::RegisterError;

pub const DEFAULT_WEIGHT: i64 = 10;

/// Node data published under a registry path.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InstanceRecord {
    pub host: String,
    pub weight: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    pub host: String,
    pub weight: i64,
    pub current_weight: i64,
}

impl ServiceInstance {
    pub fn new(host: &str, weight: i64) -> Self {
        Self {
            host: host.to_owned(),
            weight,
            current_weight: 0,
        }
    }
}

impl From<InstanceRecord> for ServiceInstance {
    fn from(record: InstanceRecord) -> Self {
        Self {
            host: record.host,
            weight: record.weight.unwrap_or(DEFAULT_WEIGHT),
            current_weight: 0,
        }
    }
}

/// Instances published under one registry path. The group is immutable apart
/// from the rolling weights, which sit behind the group's own mutex.
#[derive(Debug)]
pub struct ServiceGroup {
    total_weight: i64,
    instances: Mutex<Vec<ServiceInstance>>,
}

impl ServiceGroup {
    pub fn new(instances: Vec<ServiceInstance>) -> Self {
        let instances: Vec<ServiceInstance> = instances
            .into_iter()
            .map(|mut e| {
                e.current_weight = 0;
                e
            })
            .collect();
        Self {
            total_weight: instances.iter().map(|e| e.weight).sum(),
            instances: Mutex::new(instances),
        }
    }

    pub fn total_weight(&self) -> i64 {
        self.total_weight
    }

    pub fn len(&self) -> usize {
        self.instances().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn instances(&self) -> MutexGuard<'_, Vec<ServiceInstance>> {
        self.instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> Vec<ServiceInstance> {
        self.instances().clone()
    }
}

pub fn decode_instance(path: &str, data: &[u8]) -> Result<ServiceInstance, RegisterError> {
    let record: InstanceRecord =
        serde_json::from_slice(data).map_err(|error| RegisterError::Decode {
            path: path.to_owned(),
            message: format!(
                "{error}, data : {:?}",
                String::from_utf8_lossy(data).as_ref()
            ),
        })?;
    Ok(record.into())
}

#[cfg(test)]
mod test {
    use super::{decode_instance, ServiceGroup, ServiceInstance, DEFAULT_WEIGHT};
    use crate::error::RegisterError;

    #[test]
    fn decode_with_default_weight() {
        let instance = decode_instance("/services/test/a", br#"{"host":"localhost:5007"}"#).unwrap();
        assert_eq!(instance, ServiceInstance::new("localhost:5007", DEFAULT_WEIGHT));
        let instance = decode_instance(
            "/services/test/b",
            br#"{"host":"localhost:5008","weight":3,"zone":"a"}"#,
        )
        .unwrap();
        assert_eq!(instance.weight, 3);
    }

    #[test]
    fn decode_malformed() {
        let err = decode_instance("/services/test/a", b"localhost:5007").unwrap_err();
        assert!(matches!(err, RegisterError::Decode { path, .. } if path == "/services/test/a"));
        let err = decode_instance("/services/test/a", br#"{"weight":3}"#).unwrap_err();
        assert!(matches!(err, RegisterError::Decode { .. }));
    }

    #[test]
    fn group_resets_rolling_weight() {
        let mut a = ServiceInstance::new("A", 3);
        a.current_weight = -7;
        let group = ServiceGroup::new(vec![a, ServiceInstance::new("B", 5)]);
        assert_eq!(group.total_weight(), 8);
        assert_eq!(group.len(), 2);
        assert!(group.snapshot().iter().all(|e| e.current_weight == 0));
        assert!(ServiceGroup::new(vec![]).is_empty());
    }
}
