use bytes::Bytes;
use fusen_gateway_common::logs::init_log;
use http::{header, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::{body::Incoming, service::service_fn};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto::Builder,
};
use serde_json::{json, Value};
use std::convert::Infallible;
use tokio::net::TcpListener;
use tracing::{error, info};

fn reply(status: StatusCode, value: Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(value.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}

async fn call(request: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = request.uri().path().to_owned();
    let params: Value = match request.into_body().collect().await {
        Ok(body) => serde_json::from_slice(&body.to_bytes()).unwrap_or(Value::Null),
        Err(error) => {
            return Ok(reply(
                StatusCode::BAD_REQUEST,
                json!({ "message": error.to_string() }),
            ))
        }
    };
    info!("receive {} : {}", path, params);
    let response = match path.as_str() {
        "/bookstore.BookService/GetBook" => reply(
            StatusCode::OK,
            json!({ "id": params["book"], "title": format!("book {} of shelf {}", params["book"], params["shelf"]) }),
        ),
        "/bookstore.BookService/CreateBook" => reply(
            StatusCode::OK,
            json!({ "id": 1, "title": params["title"] }),
        ),
        _ => reply(
            StatusCode::NOT_IMPLEMENTED,
            json!({ "code": 12, "message": format!("method {path} not implemented") }),
        ),
    };
    Ok(response)
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_log();
    let port = std::env::args().nth(1).unwrap_or("5007".to_owned());
    let listener = TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    info!(
        "backend listen on {port}, registry node data : {}",
        json!({ "host": format!("127.0.0.1:{port}"), "weight": 10 })
    );
    loop {
        let (stream, _) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(error) = Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(stream), service_fn(call))
                .await
            {
                error!("serve connection err : {}", error);
            }
        });
    }
}
