use fusen_gateway_common::{utils::uuid::uuid, BoxFuture};
use http::Method;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

use crate::{
    dispatch::Dispatcher,
    error::GatewayError,
    schema::{MethodBinding, MethodDescriptor, SchemaCatalog},
    server::{GatewayResponse, RouteHandler, RouteRequest, Router},
};

pub mod rule;

/// A binding compiled to a router path.
#[derive(Debug, Clone)]
pub struct Route {
    pub verb: Method,
    pub path: String,
    pub binding: MethodBinding,
    pub descriptor: Arc<MethodDescriptor>,
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|e| e.is_ascii_alphanumeric() || e == '_')
}

/// Rewrites `{name}` placeholders to `:name`. Placeholders that are not plain
/// identifiers are kept as written.
pub fn convert_url(template: &str) -> Result<String, GatewayError> {
    if template.is_empty() {
        return Err(GatewayError::EmptyUrl);
    }
    let mut url = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        url.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find('}') else {
            url.push_str(tail);
            return Ok(url);
        };
        let name = &tail[1..end];
        if is_identifier(name) {
            url.push(':');
            url.push_str(name);
        } else {
            url.push_str(&tail[..=end]);
        }
        rest = &tail[end + 1..];
    }
    url.push_str(rest);
    Ok(url)
}

/// One route per binding in declaration order. Bindings on streaming methods
/// are skipped.
pub fn compile_routes(catalog: &SchemaCatalog, prefix: &str) -> Result<Vec<Route>, GatewayError> {
    let mut routes = vec![];
    for binding in catalog.bindings() {
        let Some(descriptor) =
            catalog
                .methods
                .get(&binding.package, &binding.service, &binding.method)
        else {
            warn!(
                "method {}.{}/{} has no descriptor",
                binding.package, binding.service, binding.method
            );
            continue;
        };
        if !descriptor.is_unary() {
            warn!(
                "skip streaming method {} bound to {} {}",
                descriptor.rpc_path(),
                binding.verb,
                binding.path_template
            );
            continue;
        }
        let path = format!("{}{}", prefix, convert_url(&binding.path_template)?);
        routes.push(Route {
            verb: binding.verb.clone(),
            path,
            binding,
            descriptor,
        });
    }
    Ok(routes)
}

/// Registers one handler per route, each dispatch runs in its own span.
pub fn register_routes<R: Router + ?Sized>(
    router: &mut R,
    routes: &[Arc<Route>],
    dispatcher: Arc<Dispatcher>,
    log_routes: bool,
) {
    for route in routes {
        if log_routes {
            info!("{} {}", route.verb, route.path);
        }
        let dispatcher = dispatcher.clone();
        let handler_route = route.clone();
        let handler: RouteHandler = Arc::new(move |request: RouteRequest| -> BoxFuture<GatewayResponse> {
            let dispatcher = dispatcher.clone();
            let route = handler_route.clone();
            Box::pin(async move {
                let span = info_span!(
                    "dispatch",
                    id = %uuid(),
                    verb = %route.verb,
                    path = %route.path
                );
                dispatcher.dispatch(&route, request).instrument(span).await
            })
        });
        router.register(route.verb.clone(), &route.path, handler);
    }
}
