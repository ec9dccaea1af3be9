use fusen_gateway_common::BoxFuture;
use http::uri::PathAndQuery;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use prost::Message;
use prost_reflect::{DescriptorPool, DeserializeOptions, DynamicMessage, MessageDescriptor};
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};
use tonic::{
    client::Grpc,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
    metadata::{AsciiMetadataKey, AsciiMetadataValue},
    transport::{Channel, ClientTlsConfig, Endpoint},
    Request, Status,
};
use tracing::debug;

use super::{base_url, BackendClient, BackendConnector, BackendError, Credentials, MetaData};
use crate::schema::MethodDescriptor;

/// Transcodes between JSON shaped [`DynamicMessage`]s and protobuf bytes.
pub struct DynamicCodec {
    output: MessageDescriptor,
}

impl DynamicCodec {
    pub fn new(output: MessageDescriptor) -> Self {
        Self { output }
    }
}

impl Codec for DynamicCodec {
    type Encode = DynamicMessage;
    type Decode = DynamicMessage;
    type Encoder = DynamicEncoder;
    type Decoder = DynamicDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        DynamicEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        DynamicDecoder(self.output.clone())
    }
}

pub struct DynamicEncoder;

impl Encoder for DynamicEncoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        item.encode(dst)
            .map_err(|error| Status::internal(format!("encode request : {error}")))
    }
}

pub struct DynamicDecoder(MessageDescriptor);

impl Decoder for DynamicDecoder {
    type Item = DynamicMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        DynamicMessage::decode(self.0.clone(), src)
            .map(Some)
            .map_err(|error| Status::internal(format!("decode response : {error}")))
    }
}

/// Unary gRPC calls built from the schema descriptors. Parameters are read as
/// proto JSON into the request message, unknown fields are ignored. One lazy
/// channel is kept per backend address.
#[derive(Clone)]
pub struct GrpcBackendConnector {
    pool: DescriptorPool,
    channels: Arc<Mutex<HashMap<String, Channel>>>,
    propagator: Arc<TraceContextPropagator>,
}

impl GrpcBackendConnector {
    pub fn new(pool: DescriptorPool) -> Self {
        Self {
            pool,
            channels: Default::default(),
            propagator: Arc::new(TraceContextPropagator::new()),
        }
    }

    fn channel(&self, url: &str) -> Result<Channel, BackendError> {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(channel) = channels.get(url) {
            return Ok(channel.clone());
        }
        let mut endpoint = Endpoint::from_shared(url.to_owned())
            .map_err(|error| BackendError::Transport(format!("invalid host {url} : {error}")))?
            .tcp_keepalive(Some(Duration::from_secs(1800)));
        if url.starts_with("https://") {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new().with_native_roots())
                .map_err(|error| BackendError::Transport(error.to_string()))?;
        }
        debug!("open grpc channel {url}");
        let channel = endpoint.connect_lazy();
        channels.insert(url.to_owned(), channel.clone());
        Ok(channel)
    }
}

impl BackendConnector for GrpcBackendConnector {
    fn connect(
        &self,
        host: &str,
        credentials: Credentials,
    ) -> Result<Box<dyn BackendClient>, BackendError> {
        let channel = self.channel(&base_url(host, credentials))?;
        Ok(Box::new(GrpcBackendClient {
            channel,
            pool: self.pool.clone(),
            propagator: self.propagator.clone(),
        }))
    }
}

pub struct GrpcBackendClient {
    channel: Channel,
    pool: DescriptorPool,
    propagator: Arc<TraceContextPropagator>,
}

impl GrpcBackendClient {
    fn build_request(
        &self,
        method: &MethodDescriptor,
        params: Value,
        metadata: MetaData,
    ) -> Result<(Request<DynamicMessage>, PathAndQuery, DynamicCodec), BackendError> {
        let rpc_path = method.rpc_path();
        let descriptor = self
            .pool
            .get_service_by_name(&method.full_service_name())
            .and_then(|service| service.methods().find(|e| e.name() == method.method))
            .ok_or_else(|| BackendError::Decode(format!("{rpc_path} is not in the schema")))?;
        let message = DynamicMessage::deserialize_with_options(
            descriptor.input(),
            params,
            &DeserializeOptions::new().deny_unknown_fields(false),
        )
        .map_err(|error| BackendError::Decode(format!("{rpc_path} request : {error}")))?;
        let mut request = Request::new(message);
        for (key, value) in metadata.outbound(&self.propagator) {
            let (Ok(name), Ok(value)) = (
                AsciiMetadataKey::from_bytes(key.as_bytes()),
                AsciiMetadataValue::try_from(value.as_str()),
            ) else {
                debug!("skip metadata {key} that is not valid ascii metadata");
                continue;
            };
            request.metadata_mut().insert(name, value);
        }
        let path = PathAndQuery::try_from(rpc_path)
            .map_err(|error| BackendError::Transport(error.to_string()))?;
        Ok((request, path, DynamicCodec::new(descriptor.output())))
    }
}

impl BackendClient for GrpcBackendClient {
    fn invoke(
        &self,
        method: Arc<MethodDescriptor>,
        params: Value,
        metadata: MetaData,
    ) -> BoxFuture<Result<Value, BackendError>> {
        let prepared = self.build_request(&method, params, metadata);
        let mut grpc = Grpc::new(self.channel.clone());
        Box::pin(async move {
            let (request, path, codec) = prepared?;
            grpc.ready()
                .await
                .map_err(|error| BackendError::Transport(error.to_string()))?;
            let response = grpc
                .unary(request, path, codec)
                .await
                .map_err(|status| BackendError::Grpc {
                    code: status.code() as i32,
                    message: status.message().to_owned(),
                })?;
            serde_json::to_value(response.into_inner()).map_err(|error| {
                BackendError::Decode(format!("{} response : {error}", method.rpc_path()))
            })
        })
    }
}
