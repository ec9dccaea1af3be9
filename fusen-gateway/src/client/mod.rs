use fusen_gateway_common::BoxFuture;
use opentelemetry::{propagation::TextMapPropagator, trace::TraceContextExt};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::schema::MethodDescriptor;

pub mod grpc;
pub mod http;

/// Never forwarded to a backend.
const SKIP_HEADERS: [&str; 12] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
    "host",
    "content-length",
    "content-type",
    "accept-encoding",
    "expect",
];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendProtocol {
    /// protobuf over HTTP/2 with the schema message descriptors
    #[default]
    Grpc,
    /// JSON `POST` of the merged parameters
    Http,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Credentials {
    #[default]
    Insecure,
    Tls,
}

/// Call metadata forwarded to the backend, keys are lower case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaData {
    pub inner: HashMap<String, String>,
}

impl MetaData {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(|e| e.as_str())
    }

    pub fn insert(&mut self, key: &str, value: &str) -> Option<String> {
        self.inner.insert(key.to_lowercase(), value.to_owned())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.inner.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.inner.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl MetaData {
    /// Entries worth forwarding with the current trace context injected.
    fn outbound(self, propagator: &TraceContextPropagator) -> Vec<(String, String)> {
        let mut headers = self.inner;
        let span_context = Span::current().context();
        if span_context.has_active_span() {
            propagator.inject_context(&span_context, &mut headers);
        }
        headers
            .into_iter()
            .filter(|(key, _)| !SKIP_HEADERS.contains(&key.as_str()))
            .collect()
    }
}

impl From<HashMap<String, String>> for MetaData {
    fn from(inner: HashMap<String, String>) -> Self {
        Self { inner }
    }
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend responded {status} : {body}")]
    Status { status: u16, body: Value },

    #[error("backend responded grpc status {code} : {message}")]
    Grpc { code: i32, message: String },

    #[error("Transport : {0}")]
    Transport(String),

    #[error("Decode : {0}")]
    Decode(String),
}

impl BackendError {
    /// JSON body answered to the http caller.
    pub fn payload(&self) -> Value {
        match self {
            BackendError::Status { status, body } => match body {
                Value::Null => json!({ "code": status }),
                body => body.clone(),
            },
            BackendError::Grpc { code, message } => json!({ "code": code, "details": message }),
            BackendError::Transport(message) | BackendError::Decode(message) => {
                json!({ "error": message })
            }
        }
    }
}

/// `{scheme}://{host}` where the scheme follows the credentials unless the
/// host already names one.
fn base_url(host: &str, credentials: Credentials) -> String {
    if host.contains("://") {
        return host.trim_end_matches('/').to_owned();
    }
    let scheme = match credentials {
        Credentials::Insecure => "http",
        Credentials::Tls => "https",
    };
    format!("{scheme}://{}", host.trim_end_matches('/'))
}

pub trait BackendClient: Send + Sync {
    fn invoke(
        &self,
        method: Arc<MethodDescriptor>,
        params: Value,
        metadata: MetaData,
    ) -> BoxFuture<Result<Value, BackendError>>;
}

pub trait BackendConnector: Send + Sync {
    fn connect(
        &self,
        host: &str,
        credentials: Credentials,
    ) -> Result<Box<dyn BackendClient>, BackendError>;
}
