use bytes::Bytes;
use fusen_gateway_common::BoxFuture;
use http::{
    header::{self, HeaderName, HeaderValue},
    Method, Request,
};
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use serde_json::Value;
use std::{convert::Infallible, sync::Arc, time::Duration};
use tracing::debug;

use super::{base_url, BackendClient, BackendConnector, BackendError, Credentials, MetaData};
use crate::schema::MethodDescriptor;

pub type HttpSocket = Client<HttpsConnector<HttpConnector>, BoxBody<Bytes, Infallible>>;

/// Sends unary calls as JSON `POST {scheme}://{host}/{package}.{Service}/{Method}`.
/// One pooled client is shared by every backend.
#[derive(Clone)]
pub struct HttpBackendConnector {
    client: HttpSocket,
    propagator: Arc<TraceContextPropagator>,
}

impl Default for HttpBackendConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpBackendConnector {
    pub fn new() -> Self {
        let mut connector = HttpConnector::new();
        connector.set_keepalive(Some(Duration::from_secs(1800)));
        connector.enforce_http(false);
        Self {
            client: Client::builder(hyper_util::rt::TokioExecutor::new())
                .build(HttpsConnector::new_with_connector(connector)),
            propagator: Arc::new(TraceContextPropagator::new()),
        }
    }
}

impl BackendConnector for HttpBackendConnector {
    fn connect(
        &self,
        host: &str,
        credentials: Credentials,
    ) -> Result<Box<dyn BackendClient>, BackendError> {
        let base = base_url(host, credentials);
        base.parse::<http::Uri>()
            .map_err(|error| BackendError::Transport(format!("invalid host {host} : {error}")))?;
        Ok(Box::new(HttpBackendClient {
            client: self.client.clone(),
            propagator: self.propagator.clone(),
            base,
        }))
    }
}

pub struct HttpBackendClient {
    client: HttpSocket,
    propagator: Arc<TraceContextPropagator>,
    base: String,
}

impl HttpBackendClient {
    fn build_request(
        &self,
        method: &MethodDescriptor,
        params: &Value,
        metadata: MetaData,
    ) -> Result<Request<BoxBody<Bytes, Infallible>>, BackendError> {
        let uri = format!("{}{}", self.base, method.rpc_path());
        let body =
            serde_json::to_vec(params).map_err(|error| BackendError::Decode(error.to_string()))?;
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        for (key, value) in metadata.outbound(&self.propagator) {
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(&value),
            ) else {
                debug!("skip metadata {key} that is not a valid header");
                continue;
            };
            builder = builder.header(name, value);
        }
        builder
            .body(Full::new(Bytes::from(body)).boxed())
            .map_err(|error| BackendError::Transport(error.to_string()))
    }
}

impl BackendClient for HttpBackendClient {
    fn invoke(
        &self,
        method: Arc<MethodDescriptor>,
        params: Value,
        metadata: MetaData,
    ) -> BoxFuture<Result<Value, BackendError>> {
        let request = self.build_request(&method, &params, metadata);
        let client = self.client.clone();
        Box::pin(async move {
            let response = client
                .request(request?)
                .await
                .map_err(|error| BackendError::Transport(error.to_string()))?;
            let status = response.status();
            let bytes = response
                .into_body()
                .collect()
                .await
                .map_err(|error| BackendError::Transport(error.to_string()))?
                .to_bytes();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                match serde_json::from_slice(&bytes) {
                    Ok(value) => value,
                    Err(_) if !status.is_success() => {
                        Value::String(String::from_utf8_lossy(&bytes).into_owned())
                    }
                    Err(error) => {
                        return Err(BackendError::Decode(format!(
                            "{} response : {error}",
                            method.rpc_path()
                        )))
                    }
                }
            };
            if status.is_success() {
                Ok(body)
            } else {
                Err(BackendError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        })
    }
}
