use bytes::Bytes;
use fusen_gateway::{
    client::{BackendClient, BackendConnector, BackendError, Credentials, MetaData},
    config::{GatewayConfig, RuleConfig},
    fusen_gateway_common::BoxFuture,
    fusen_gateway_register::support::memory::MemoryRegister,
    handler::{CallHook, HookResult},
    schema::MethodDescriptor,
    server::{router::HttpRouter, GatewayResponse},
    Gateway,
};
use http::{header, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use serde_json::{json, Value};
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

#[derive(Debug, Clone)]
struct Call {
    host: String,
    method: String,
    params: Value,
    metadata: MetaData,
}

#[derive(Clone, Default)]
struct FakeConnector {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl FakeConnector {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

struct FakeClient {
    host: String,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl BackendConnector for FakeConnector {
    fn connect(
        &self,
        host: &str,
        _credentials: Credentials,
    ) -> Result<Box<dyn BackendClient>, BackendError> {
        Ok(Box::new(FakeClient {
            host: host.to_owned(),
            calls: self.calls.clone(),
        }))
    }
}

impl BackendClient for FakeClient {
    fn invoke(
        &self,
        method: Arc<MethodDescriptor>,
        params: Value,
        metadata: MetaData,
    ) -> BoxFuture<Result<Value, BackendError>> {
        self.calls.lock().unwrap().push(Call {
            host: self.host.clone(),
            method: method.rpc_path(),
            params: params.clone(),
            metadata,
        });
        let host = self.host.clone();
        Box::pin(async move {
            if host.starts_with("down") {
                return Err(BackendError::Status {
                    status: 500,
                    body: json!({ "code": 13, "message": "boom" }),
                });
            }
            Ok(json!({ "host": host, "method": method.rpc_path(), "params": params }))
        })
    }
}

struct Teapot;

impl CallHook for Teapot {
    fn unknown_service(
        &self,
        route_path: &str,
        request_url: &str,
        response: &mut GatewayResponse,
    ) -> HookResult {
        response
            .status(StatusCode::IM_A_TEAPOT)
            .json(&json!({ "route": route_path, "url": request_url }));
        HookResult::Handled
    }
}

struct Rewrap;

impl CallHook for Rewrap {
    fn after_call_service(
        &self,
        host: &str,
        result: &Result<Value, BackendError>,
        response: &mut GatewayResponse,
    ) -> HookResult {
        match result {
            Ok(value) => {
                response.json(&json!({ "data": value, "via": host }));
                HookResult::Handled
            }
            Err(_) => HookResult::NotHandled,
        }
    }
}

fn proto_dir() -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data/protos")
        .display()
        .to_string()
}

async fn gateway(
    config: GatewayConfig,
    register: Option<MemoryRegister>,
    hooks: Vec<Arc<dyn CallHook>>,
) -> (Gateway, HttpRouter, FakeConnector) {
    let connector = FakeConnector::default();
    let mut builder = Gateway::builder()
        .config(config)
        .proto_dir(&proto_dir())
        .connector(Arc::new(connector.clone()));
    if let Some(register) = register {
        builder = builder.register(Arc::new(register));
    }
    for hook in hooks {
        builder = builder.add_hook(hook);
    }
    let gateway = builder.build().await.unwrap();
    let router = gateway.router();
    (gateway, router, connector)
}

async fn send(router: &HttpRouter, request: Request<Full<Bytes>>) -> (StatusCode, Bytes) {
    let response = router.handle(request).await;
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

async fn get(router: &HttpRouter, uri: &str) -> (StatusCode, Bytes) {
    send(router, Request::get(uri).body(Full::new(Bytes::new())).unwrap()).await
}

fn json_body(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn forward_to_fixed_host() {
    let config = GatewayConfig::new(vec![RuleConfig::host("/v1/test/*", "localhost:5007")])
        .prefix("/api");
    let (gateway, router, connector) = gateway(config, None, vec![]).await;
    assert_eq!(gateway.routes().len(), 5);

    let request = Request::get("/api/v1/test/1/books/2?view=full")
        .header("X-Request-Id", "abc")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json_body(&body),
        json!({
            "host": "localhost:5007",
            "method": "/bookstore.BookService/GetBook",
            "params": { "shelf": "1", "book": "2", "view": "full" }
        })
    );
    let calls = connector.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].metadata.get("x-request-id"), Some("abc"));
}

#[tokio::test]
async fn path_beats_query_beats_body() {
    let config = GatewayConfig::new(vec![RuleConfig::host("/v1/test/*", "localhost:5007")]);
    let (_gateway, router, connector) = gateway(config, None, vec![]).await;
    let request = Request::post("/v1/test/1/books?shelf=q&title=q")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from_static(
            br#"{"shelf":"b","title":"b","author":"b"}"#,
        )))
        .unwrap();
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    let calls = connector.calls();
    assert_eq!(calls[0].method, "/bookstore.BookService/CreateBook");
    assert_eq!(
        calls[0].params,
        json!({ "shelf": "1", "title": "q", "author": "b" })
    );
}

#[tokio::test]
async fn unknown_service() {
    let config = GatewayConfig::new(vec![RuleConfig::host("/v1/test/*", "localhost:5007")]);
    let (_gateway, router, connector) = gateway(config.clone(), None, vec![]).await;
    let (status, body) = get(&router, "/v1/echo/hi").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, Bytes::from_static(b"service not found"));
    assert!(connector.calls().is_empty());

    let (_gateway, router, _) = gateway(config, None, vec![Arc::new(Teapot)]).await;
    let (status, body) = get(&router, "/v1/echo/hi?a=1").await;
    assert_eq!(status, StatusCode::IM_A_TEAPOT);
    assert_eq!(
        json_body(&body),
        json!({ "route": "/v1/echo/:message", "url": "/v1/echo/hi?a=1" })
    );
}

#[tokio::test]
async fn rules_match_declared_template() {
    // the concrete request path never takes part in rule matching
    let config = GatewayConfig::new(vec![
        RuleConfig::host("/v1/test/1/books/2", "localhost:5001"),
        RuleConfig::host("/v1/test/{shelf}/books/{book}", "localhost:5002"),
    ]);
    let (_gateway, router, connector) = gateway(config, None, vec![]).await;
    let (status, _) = get(&router, "/v1/test/1/books/2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(connector.calls()[0].host, "localhost:5002");
}

#[tokio::test]
async fn unrouted_verbs_and_streaming() {
    let config = GatewayConfig::new(vec![RuleConfig::host("*", "localhost:5007")]);
    let (gateway, router, _) = gateway(config, None, vec![]).await;
    assert!(gateway
        .routes()
        .iter()
        .all(|e| e.descriptor.method != "WatchBooks" && e.descriptor.method != "PatchBook"));
    let request = Request::patch("/v1/test/1/books/2")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let request = Request::delete("/v1/test/1/books/2")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn backend_error_payload() {
    let config = GatewayConfig::new(vec![RuleConfig::host("*", "down:5007")]);
    let (_gateway, router, _) = gateway(config, None, vec![Arc::new(Rewrap)]).await;
    let (status, body) = get(&router, "/v2/library/books").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(&body), json!({ "code": 13, "message": "boom" }));
}

#[tokio::test]
async fn after_call_hook_rewrites() {
    let config = GatewayConfig::new(vec![RuleConfig::host("*", "localhost:5007")]);
    let (_gateway, router, _) = gateway(config, None, vec![Arc::new(Rewrap)]).await;
    let (status, body) = get(&router, "/v1/echo/hi").await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["via"], json!("localhost:5007"));
    assert_eq!(body["data"]["method"], json!("/EchoService/Echo"));
}

fn registry_config() -> GatewayConfig {
    GatewayConfig::new(vec![RuleConfig::registry("/v1/test/*", "/services/test")])
}

#[tokio::test]
async fn registry_rule_balances() {
    let register = MemoryRegister::new();
    register.put_instance("/services/test", "a", "A", Some(3));
    register.put_instance("/services/test", "b", "B", Some(5));
    register.put_instance("/services/test", "c", "C", Some(2));
    let (gateway, router, connector) = gateway(registry_config(), Some(register), vec![]).await;
    for _ in 0..10 {
        let (status, _) = get(&router, "/v1/test/1/books/2").await;
        assert_eq!(status, StatusCode::OK);
    }
    let hosts: Vec<String> = connector.calls().into_iter().map(|e| e.host).collect();
    assert_eq!(
        hosts,
        vec!["B", "A", "C", "B", "A", "B", "B", "C", "A", "B"]
    );
    gateway.close();
}

#[tokio::test]
async fn registry_reload_on_change() {
    let register = MemoryRegister::new();
    register.put_instance("/services/test", "a", "A", None);
    let (gateway, router, connector) =
        gateway(registry_config(), Some(register.clone()), vec![]).await;
    let (status, _) = get(&router, "/v1/test/1/books/2").await;
    assert_eq!(status, StatusCode::OK);

    register.remove("/services/test", "a");
    register.put_instance("/services/test", "b", "B", None);
    let directory = gateway.directory().unwrap();
    let mut reloaded = false;
    for _ in 0..100 {
        if let Some(group) = directory.cached_group("/services/test").await {
            if group.snapshot().iter().any(|e| e.host == "B") {
                reloaded = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(reloaded);
    let (status, _) = get(&router, "/v1/test/1/books/2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(connector.calls().last().unwrap().host, "B");
    gateway.close();
}

#[tokio::test]
async fn registry_failures() {
    let register = MemoryRegister::new();
    let (_gateway, router, _) = gateway(registry_config(), Some(register.clone()), vec![]).await;
    let (status, body) = get(&router, "/v1/test/1/books/2").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json_body(&body)["error"].is_string());

    // an existing path without children resolves no host
    register.create_path("/services/test");
    let (status, body) = get(&router, "/v1/test/1/books/2").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, Bytes::from_static(b"service not found"));

    // a registry rule without any registry configured
    let (_gateway, router, _) = gateway(registry_config(), None, vec![]).await;
    let (status, _) = get(&router, "/v1/test/1/books/2").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
