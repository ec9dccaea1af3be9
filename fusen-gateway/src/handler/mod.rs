use serde_json::{Map, Value};
use std::sync::Arc;

use crate::{
    client::{BackendError, MetaData},
    server::GatewayResponse,
};

pub mod loadbalance;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookResult {
    /// The hook wrote the response, dispatching stops here.
    Handled,
    NotHandled,
}

impl HookResult {
    pub fn is_handled(&self) -> bool {
        matches!(self, HookResult::Handled)
    }
}

/// Interception points of a dispatch. Every method defaults to `NotHandled`.
pub trait CallHook: Send + Sync {
    /// No backend host could be resolved for the route.
    fn unknown_service(
        &self,
        _route_path: &str,
        _request_url: &str,
        _response: &mut GatewayResponse,
    ) -> HookResult {
        HookResult::NotHandled
    }

    /// Runs right before the backend call. Parameters and metadata may be
    /// rewritten in place.
    fn before_call_service(
        &self,
        _host: &str,
        _params: &mut Map<String, Value>,
        _metadata: &mut MetaData,
        _response: &mut GatewayResponse,
    ) -> HookResult {
        HookResult::NotHandled
    }

    fn after_call_service(
        &self,
        _host: &str,
        _result: &Result<Value, BackendError>,
        _response: &mut GatewayResponse,
    ) -> HookResult {
        HookResult::NotHandled
    }
}

pub struct DefaultHook;

impl CallHook for DefaultHook {}

/// Runs hooks in registration order, the first `Handled` wins.
#[derive(Default, Clone)]
pub struct HookChain {
    hooks: Vec<Arc<dyn CallHook>>,
}

impl HookChain {
    pub fn new(hooks: Vec<Arc<dyn CallHook>>) -> Self {
        Self { hooks }
    }

    pub fn push(&mut self, hook: Arc<dyn CallHook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    fn first_handled(&self, mut call: impl FnMut(&dyn CallHook) -> HookResult) -> HookResult {
        for hook in &self.hooks {
            if call(hook.as_ref()).is_handled() {
                return HookResult::Handled;
            }
        }
        HookResult::NotHandled
    }
}

impl CallHook for HookChain {
    fn unknown_service(
        &self,
        route_path: &str,
        request_url: &str,
        response: &mut GatewayResponse,
    ) -> HookResult {
        self.first_handled(|hook| hook.unknown_service(route_path, request_url, response))
    }

    fn before_call_service(
        &self,
        host: &str,
        params: &mut Map<String, Value>,
        metadata: &mut MetaData,
        response: &mut GatewayResponse,
    ) -> HookResult {
        self.first_handled(|hook| hook.before_call_service(host, params, metadata, response))
    }

    fn after_call_service(
        &self,
        host: &str,
        result: &Result<Value, BackendError>,
        response: &mut GatewayResponse,
    ) -> HookResult {
        self.first_handled(|hook| hook.after_call_service(host, result, response))
    }
}
