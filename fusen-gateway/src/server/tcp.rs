use fusen_gateway_common::shutdown::Shutdown;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use std::sync::Arc;
use tokio::{
    io,
    net::{TcpListener, TcpStream},
    sync::{broadcast, mpsc},
};
use tracing::{debug, info};

use super::router::HttpRouter;

#[derive(Clone)]
pub struct TcpServer;

impl TcpServer {
    pub async fn run(port: u16, router: HttpRouter, shutdown: Shutdown) -> io::Result<()> {
        let tcp_listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
        Self::serve(tcp_listener, router, shutdown).await
    }

    /// Accepts until `shutdown` fires, then waits for open connections to end.
    pub async fn serve(
        tcp_listener: TcpListener,
        router: HttpRouter,
        mut shutdown: Shutdown,
    ) -> io::Result<()> {
        let mut builder = Builder::new(TokioExecutor::new());
        builder.http2().max_concurrent_streams(None);
        builder.http1().keep_alive(true);
        let builder = Arc::new(builder);
        info!("gateway listen on {}", tcp_listener.local_addr()?);
        let notify_shutdown: broadcast::Sender<()> = broadcast::channel(1).0;
        let (sender, mut recv) = mpsc::channel::<()>(1);
        loop {
            let (tcp_stream, socketaddr) = tokio::select! {
               stream = tcp_listener.accept() => stream?,
               _ = shutdown.recv() => {
                  drop(notify_shutdown);
                  drop(sender);
                  let _ = recv.recv().await;
                  info!("gateway server stopped");
                  return Ok(());
               }
            };
            debug!("accept connection from {}", socketaddr);
            let handler = HttpStreamHandler {
                router: router.clone(),
                builder: builder.clone(),
                stream: tcp_stream,
                shutdown: Shutdown::new(notify_shutdown.subscribe()),
                _sender: sender.clone(),
            };
            tokio::spawn(handler.run());
        }
    }
}

struct HttpStreamHandler {
    router: HttpRouter,
    builder: Arc<Builder<TokioExecutor>>,
    stream: TcpStream,
    shutdown: Shutdown,
    _sender: mpsc::Sender<()>,
}

impl HttpStreamHandler {
    async fn run(self) {
        let HttpStreamHandler {
            router,
            builder,
            stream,
            mut shutdown,
            _sender,
        } = self;
        let hyper_io = TokioIo::new(stream);
        let server = builder.serve_connection_with_upgrades(hyper_io, router);
        let result = tokio::select! {
            result = server => result,
            _ = shutdown.recv() => Ok(())
        };
        if let Err(error) = result {
            debug!("connection closed with err : {}", error);
        }
    }
}
