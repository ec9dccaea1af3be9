use client::{
    grpc::GrpcBackendConnector, http::HttpBackendConnector, BackendConnector, BackendProtocol,
};
use config::GatewayConfig;
use dispatch::Dispatcher;
use error::GatewayError;
pub use fusen_gateway_common;
use fusen_gateway_common::shutdown::Shutdown;
pub use fusen_gateway_register;
use fusen_gateway_register::{
    directory::ServiceDirectory, support::zookeeper::ZookeeperRegister, Register,
};
use handler::{loadbalance::LoadBalance, CallHook, HookChain};
use route::{compile_routes, register_routes, rule::RuleMatcher, Route};
use schema::SchemaCatalog;
use server::{router::HttpRouter, tcp::TcpServer, Router};
use std::sync::Arc;
use tokio::{signal, sync::broadcast};
use tracing::info;

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod route;
pub mod schema;
pub mod server;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Default)]
pub struct GatewayBuilder {
    config: GatewayConfig,
    register: Option<Arc<dyn Register>>,
    hooks: HookChain,
    load_balance: Option<Arc<dyn LoadBalance>>,
    connector: Option<Arc<dyn BackendConnector>>,
}

impl GatewayBuilder {
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn proto_dir(mut self, proto_dir: &str) -> Self {
        proto_dir.clone_into(&mut self.config.proto_dir);
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Registry backend used instead of connecting to `config.registry`.
    pub fn register(mut self, register: Arc<dyn Register>) -> Self {
        let _ = self.register.insert(register);
        self
    }

    pub fn add_hook(mut self, hook: Arc<dyn CallHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn load_balance(mut self, load_balance: Arc<dyn LoadBalance>) -> Self {
        let _ = self.load_balance.insert(load_balance);
        self
    }

    pub fn connector(mut self, connector: Arc<dyn BackendConnector>) -> Self {
        let _ = self.connector.insert(connector);
        self
    }

    pub async fn build(self) -> Result<Gateway> {
        let GatewayBuilder {
            config,
            register,
            hooks,
            load_balance,
            connector,
        } = self;
        let register: Option<Arc<dyn Register>> = match (register, &config.registry) {
            (Some(register), _) => Some(register),
            (None, Some(cluster)) => Some(Arc::new(ZookeeperRegister::connect(cluster).await?)),
            (None, None) => None,
        };
        let directory = register.map(ServiceDirectory::new);
        let catalog = SchemaCatalog::load(&config.proto_dir)?;
        let routes: Vec<Arc<Route>> = compile_routes(&catalog, &config.prefix)?
            .into_iter()
            .map(Arc::new)
            .collect();
        info!(
            "load {} schema from {}, {} route",
            catalog.schemas.len(),
            config.proto_dir,
            routes.len()
        );
        let connector: Arc<dyn BackendConnector> = match (connector, config.protocol) {
            (Some(connector), _) => connector,
            (None, BackendProtocol::Grpc) => Arc::new(GrpcBackendConnector::new(catalog.pool)),
            (None, BackendProtocol::Http) => Arc::new(HttpBackendConnector::new()),
        };
        let dispatcher = Dispatcher::new(
            RuleMatcher::from_config(&config.rules),
            directory.clone(),
            load_balance.unwrap_or_else(|| config.load_balance.build()),
            Arc::new(hooks),
            connector,
            config.credentials,
        );
        Ok(Gateway {
            config,
            routes,
            dispatcher: Arc::new(dispatcher),
            directory,
        })
    }
}

pub struct Gateway {
    config: GatewayConfig,
    routes: Vec<Arc<Route>>,
    dispatcher: Arc<Dispatcher>,
    directory: Option<ServiceDirectory>,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::default()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn directory(&self) -> Option<&ServiceDirectory> {
        self.directory.as_ref()
    }

    /// Registers every compiled route on `router`.
    pub fn register_routes<R: Router + ?Sized>(&self, router: &mut R) {
        register_routes(
            router,
            &self.routes,
            self.dispatcher.clone(),
            self.config.log_routes,
        );
    }

    pub fn router(&self) -> HttpRouter {
        let mut router = HttpRouter::new().body_limit(self.config.body_limit);
        self.register_routes(&mut router);
        router
    }

    /// Stops the registry watches.
    pub fn close(&self) {
        if let Some(directory) = &self.directory {
            directory.close();
        }
    }

    /// Serves on `config.port` until ctrl-c, then drains connections and
    /// closes the registry.
    pub async fn run(self) -> Result<()> {
        let router = self.router();
        let (sender, receiver) = broadcast::channel::<()>(1);
        let mut server = tokio::spawn(TcpServer::run(
            self.config.port,
            router,
            Shutdown::new(receiver),
        ));
        let result = tokio::select! {
            result = &mut server => result,
            _ = signal::ctrl_c() => {
                info!("gateway shutting down");
                drop(sender);
                server.await
            }
        };
        self.close();
        match result {
            Ok(result) => Ok(result?),
            Err(error) => Err(GatewayError::Error(Box::new(error))),
        }
    }
}
