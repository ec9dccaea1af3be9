use demos::LogHook;
use fusen_gateway::{config::GatewayConfig, error::GatewayError, Gateway};
use fusen_gateway_common::logs::init_log;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), GatewayError> {
    init_log();
    let path = std::env::args()
        .nth(1)
        .unwrap_or("demos/config/gateway.yaml".to_owned());
    let config = GatewayConfig::from_file(&path)?;
    Gateway::builder()
        .config(config)
        .add_hook(Arc::new(LogHook))
        .build()
        .await?
        .run()
        .await
}
