use bytes::Bytes;
use fusen_gateway_common::BoxFuture;
use http::{header, HeaderMap, Method, Request, Response, StatusCode};
use http_body::Body;
use http_body_util::{combinators::BoxBody, BodyExt, LengthLimitError, Limited};
use hyper::service::Service;
use serde_json::{Map, Value};
use std::{collections::HashMap, convert::Infallible, error::Error, sync::Arc};
use tracing::{debug, warn};

use super::{path::PathTrie, GatewayResponse, RouteHandler, RouteRequest, Router};

pub const DEFAULT_BODY_LIMIT: usize = 4 * 1024 * 1024;

/// Verb keyed segment tries of route handlers.
#[derive(Clone)]
pub struct HttpRouter {
    routes: Arc<HashMap<Method, PathTrie<RouteHandler>>>,
    body_limit: usize,
}

impl Default for HttpRouter {
    fn default() -> Self {
        Self {
            routes: Default::default(),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl Router for HttpRouter {
    fn register(&mut self, verb: Method, path: &str, handler: RouteHandler) {
        let routes = Arc::make_mut(&mut self.routes);
        if !routes.entry(verb.clone()).or_default().insert(path, handler) {
            warn!("route {} {} already registered, keep the first", verb, path);
        }
    }
}

fn decode(value: &str) -> String {
    let value = value.replace('+', " ");
    let decoded = urlencoding::decode(&value).ok().map(|e| e.into_owned());
    decoded.unwrap_or(value)
}

/// `a=1&b=2` into a map of strings, repeated keys collect into a list.
pub fn parse_urlencoded(source: &str) -> Map<String, Value> {
    let mut map = Map::new();
    for pair in source.split('&').filter(|e| !e.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode(key);
        let value = Value::String(decode(value));
        match map.get_mut(&key) {
            Some(Value::Array(values)) => values.push(value),
            Some(previous) => {
                let first = previous.take();
                *previous = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key, value);
            }
        }
    }
    map
}

fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|e| e.to_str().ok())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Body fields by content type. JSON bodies have to be objects.
pub fn parse_body(headers: &HeaderMap, bytes: &[u8]) -> Result<Map<String, Value>, String> {
    if bytes.is_empty() {
        return Ok(Map::new());
    }
    let content_type = content_type(headers);
    if content_type.starts_with("application/json") || content_type.contains("+json") {
        return match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err("json body must be an object".to_owned()),
            Err(error) => Err(format!("invalid json body : {error}")),
        };
    }
    if content_type.starts_with("application/x-www-form-urlencoded") {
        return Ok(parse_urlencoded(&String::from_utf8_lossy(bytes)));
    }
    Ok(Map::new())
}

impl HttpRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request bodies longer than `limit` bytes are answered with 413.
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub async fn handle<B>(&self, request: Request<B>) -> Response<BoxBody<Bytes, Infallible>>
    where
        B: Body,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        let (parts, body) = request.into_parts();
        let path = parts.uri.path().to_owned();
        let Some(trie) = self.routes.get(&parts.method) else {
            return not_found(&parts.method, &path);
        };
        let Some(result) = trie.search(&path) else {
            return not_found(&parts.method, &path);
        };
        let handler = result.value.clone();
        let params = result
            .params
            .into_iter()
            .map(|(key, value)| {
                let decoded = urlencoding::decode(&value).ok().map(|e| e.into_owned());
                (key, Value::String(decoded.unwrap_or(value)))
            })
            .collect();
        let query = parts.uri.query().map(parse_urlencoded).unwrap_or_default();
        let bytes = match Limited::new(body, self.body_limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(error) => {
                let status = if error.is::<LengthLimitError>() {
                    StatusCode::PAYLOAD_TOO_LARGE
                } else {
                    StatusCode::BAD_REQUEST
                };
                let mut response = GatewayResponse::default();
                response
                    .status(status)
                    .text(&format!("read body err : {error}"));
                return response.into_response();
            }
        };
        let body = match parse_body(&parts.headers, &bytes) {
            Ok(body) => body,
            Err(message) => {
                let mut response = GatewayResponse::default();
                response.status(StatusCode::BAD_REQUEST).text(&message);
                return response.into_response();
            }
        };
        let url = parts
            .uri
            .path_and_query()
            .map(|e| e.as_str().to_owned())
            .unwrap_or(path);
        let route_request = RouteRequest {
            url,
            params,
            query,
            body,
            headers: parts.headers,
        };
        handler(route_request).await.into_response()
    }
}

fn not_found(method: &Method, path: &str) -> Response<BoxBody<Bytes, Infallible>> {
    debug!("no route for {} {}", method, path);
    let mut response = GatewayResponse::default();
    response
        .status(StatusCode::NOT_FOUND)
        .text(&format!("Cannot {} {}", method, path));
    response.into_response()
}

impl Service<Request<hyper::body::Incoming>> for HttpRouter {
    type Response = Response<BoxBody<Bytes, Infallible>>;

    type Error = Infallible;

    type Future = BoxFuture<Result<Self::Response, Self::Error>>;

    fn call(&self, request: Request<hyper::body::Incoming>) -> Self::Future {
        let router = self.clone();
        Box::pin(async move { Ok(router.handle(request).await) })
    }
}
