use fusen_gateway::{
    client::{BackendError, MetaData},
    handler::{CallHook, HookResult},
    server::GatewayResponse,
};
use serde_json::{Map, Value};
use tracing::{debug, info};

pub struct LogHook;

impl CallHook for LogHook {
    fn unknown_service(
        &self,
        route_path: &str,
        request_url: &str,
        _response: &mut GatewayResponse,
    ) -> HookResult {
        info!("no service for route {} : {}", route_path, request_url);
        HookResult::NotHandled
    }

    fn before_call_service(
        &self,
        host: &str,
        params: &mut Map<String, Value>,
        metadata: &mut MetaData,
        _response: &mut GatewayResponse,
    ) -> HookResult {
        info!("开始处理 : {} {:?}", host, params);
        metadata.insert("x-forwarded-by", "fusen-gateway");
        HookResult::NotHandled
    }

    fn after_call_service(
        &self,
        host: &str,
        result: &Result<Value, BackendError>,
        _response: &mut GatewayResponse,
    ) -> HookResult {
        debug!("结束处理 : {} {:?}", host, result);
        HookResult::NotHandled
    }
}
