use fusen_gateway_register::resource::ServiceGroup;
use rand::Rng;

pub trait LoadBalance: Send + Sync {
    /// Picks the host of one instance, `None` for an empty group.
    fn select(&self, group: &ServiceGroup) -> Option<String>;
}

/// Smooth weighted round robin. Every pick adds each weight to its rolling
/// weight, takes the strictly greatest (first on ties) and takes the total off
/// the winner. The rolling weights live in the group.
#[derive(Debug, Default, Clone, Copy)]
pub struct SmoothWeightedRoundRobin;

impl LoadBalance for SmoothWeightedRoundRobin {
    fn select(&self, group: &ServiceGroup) -> Option<String> {
        let mut instances = group.instances();
        if instances.len() <= 1 {
            return instances.first().map(|e| e.host.clone());
        }
        let mut selected = 0;
        for idx in 0..instances.len() {
            let instance = &mut instances[idx];
            instance.current_weight += instance.weight;
            if instances[idx].current_weight > instances[selected].current_weight {
                selected = idx;
            }
        }
        let instance = &mut instances[selected];
        instance.current_weight -= group.total_weight();
        Some(instance.host.clone())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomLoadBalance;

impl LoadBalance for RandomLoadBalance {
    fn select(&self, group: &ServiceGroup) -> Option<String> {
        let instances = group.instances();
        if instances.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..instances.len());
        Some(instances[idx].host.clone())
    }
}
