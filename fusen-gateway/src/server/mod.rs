use bytes::Bytes;
use fusen_gateway_common::BoxFuture;
use http::{header, HeaderMap, HeaderValue, Method, Response, StatusCode};
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use serde_json::{Map, Value};
use std::{convert::Infallible, sync::Arc};

pub mod path;
pub mod router;
pub mod tcp;

/// What a route handler receives from the router.
#[derive(Debug, Default, Clone)]
pub struct RouteRequest {
    /// Request path and query as received.
    pub url: String,
    pub params: Map<String, Value>,
    pub query: Map<String, Value>,
    pub body: Map<String, Value>,
    pub headers: HeaderMap,
}

#[derive(Debug, Clone)]
pub struct GatewayResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Default for GatewayResponse {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

impl GatewayResponse {
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    pub fn header(&mut self, name: header::HeaderName, value: HeaderValue) -> &mut Self {
        self.headers.insert(name, value);
        self
    }

    pub fn json(&mut self, value: &Value) -> &mut Self {
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        self.body = Bytes::from(value.to_string());
        self
    }

    pub fn text(&mut self, text: &str) -> &mut Self {
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.body = Bytes::from(text.to_owned());
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_response(self) -> Response<BoxBody<Bytes, Infallible>> {
        let mut response = Response::new(Full::new(self.body).boxed());
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

pub type RouteHandler = Arc<dyn Fn(RouteRequest) -> BoxFuture<GatewayResponse> + Send + Sync>;

/// Anything routes can be registered on.
pub trait Router {
    fn register(&mut self, verb: Method, path: &str, handler: RouteHandler);
}
