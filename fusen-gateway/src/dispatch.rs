use fusen_gateway_register::{directory::ServiceDirectory, error::RegisterError};
use http::{HeaderMap, StatusCode};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::{
    client::{BackendConnector, Credentials, MetaData},
    handler::{loadbalance::LoadBalance, CallHook, HookResult},
    route::{
        rule::{Rule, RuleMatcher, RuleTarget},
        Route,
    },
    server::{GatewayResponse, RouteRequest},
};

pub const SERVICE_NOT_FOUND: &str = "service not found";

/// Later sources override earlier ones: path over query over body.
pub fn merge_params(
    body: Map<String, Value>,
    query: Map<String, Value>,
    params: Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = body;
    merged.extend(query);
    merged.extend(params);
    merged
}

/// Header names lower case, repeated headers joined with `, `. Values that are
/// not visible ascii are dropped.
pub fn metadata(headers: &HeaderMap) -> MetaData {
    let mut metadata = MetaData::default();
    for key in headers.keys() {
        let values: Vec<&str> = headers
            .get_all(key)
            .iter()
            .filter_map(|e| e.to_str().ok())
            .collect();
        if values.is_empty() {
            continue;
        }
        metadata
            .inner
            .insert(key.as_str().to_owned(), values.join(", "));
    }
    metadata
}

pub struct Dispatcher {
    rules: RuleMatcher,
    directory: Option<ServiceDirectory>,
    load_balance: Arc<dyn LoadBalance>,
    hook: Arc<dyn CallHook>,
    connector: Arc<dyn BackendConnector>,
    credentials: Credentials,
}

impl Dispatcher {
    pub fn new(
        rules: RuleMatcher,
        directory: Option<ServiceDirectory>,
        load_balance: Arc<dyn LoadBalance>,
        hook: Arc<dyn CallHook>,
        connector: Arc<dyn BackendConnector>,
        credentials: Credentials,
    ) -> Self {
        Self {
            rules,
            directory,
            load_balance,
            hook,
            connector,
            credentials,
        }
    }

    pub fn rules(&self) -> &RuleMatcher {
        &self.rules
    }

    /// Backend host of a rule. Registry rules go through the directory and the
    /// load balancer, they resolve nothing when no registry is configured.
    pub async fn resolve_host(&self, rule: &Rule) -> Result<Option<String>, RegisterError> {
        match &rule.target {
            RuleTarget::Host(host) => Ok(Some(host.clone())),
            RuleTarget::Registry(path) => {
                let Some(directory) = &self.directory else {
                    warn!("rule {} needs a registry, none is configured", rule.path);
                    return Ok(None);
                };
                let group = directory.resolve_group(path).await?;
                Ok(self.load_balance.select(&group))
            }
            RuleTarget::None => Ok(None),
        }
    }

    pub async fn dispatch(&self, route: &Route, request: RouteRequest) -> GatewayResponse {
        let mut response = GatewayResponse::default();
        // rules are matched against the declared template, not the request path
        let rule = match self.rules.match_rule(&route.binding.path_template) {
            Ok(rule) => rule,
            Err(err) => {
                error!("match rule of {} err : {}", route.path, err);
                response
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .json(&json!({ "error": err.to_string() }));
                return response;
            }
        };
        let host = match rule {
            Some(rule) => match self.resolve_host(rule).await {
                Ok(host) => host,
                Err(err) => {
                    error!("resolve host of rule {} err : {}", rule.path, err);
                    response
                        .status(StatusCode::INTERNAL_SERVER_ERROR)
                        .json(&json!({ "error": err.to_string() }));
                    return response;
                }
            },
            None => None,
        };
        let Some(host) = host else {
            if let HookResult::Handled =
                self.hook
                    .unknown_service(&route.path, &request.url, &mut response)
            {
                return response;
            }
            debug!("no service for {}", request.url);
            response.status(StatusCode::NOT_FOUND).text(SERVICE_NOT_FOUND);
            return response;
        };
        let mut metadata = metadata(&request.headers);
        let mut params = merge_params(request.body, request.query, request.params);
        if self
            .hook
            .before_call_service(&host, &mut params, &mut metadata, &mut response)
            .is_handled()
        {
            return response;
        }
        debug!("call {} on {}", route.descriptor.rpc_path(), host);
        let result = match self.connector.connect(&host, self.credentials) {
            Ok(client) => {
                client
                    .invoke(route.descriptor.clone(), Value::Object(params), metadata)
                    .await
            }
            Err(err) => Err(err),
        };
        if self
            .hook
            .after_call_service(&host, &result, &mut response)
            .is_handled()
        {
            return response;
        }
        match result {
            Ok(value) => {
                response.status(StatusCode::OK).json(&value);
            }
            Err(err) => {
                error!(
                    "call {} on {} err : {}",
                    route.descriptor.rpc_path(),
                    host,
                    err
                );
                response
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .json(&err.payload());
            }
        }
        response
    }
}
