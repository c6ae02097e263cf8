//! # HTTP Server
//!
//! Hyper/Tokio transport in front of an [`App`]. Reads the body under a
//! size limit, hands the request to the dispatcher and writes back whatever
//! it returns.
//!
//! Shuts down gracefully on Ctrl-C (and SIGTERM on Unix), waiting up to
//! the configured timeout for in-flight connections.

use crate::config::ServerSettings;
use crate::dispatcher::{error_body, App};
use crate::error::{Error, Result};
use crate::request::Request;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tracing::{error, info, warn};

/// HTTP Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub address: SocketAddr,
    /// Enable keep-alive connections
    pub keep_alive: bool,
    /// Shutdown timeout for graceful shutdown (default: 30 seconds)
    pub shutdown_timeout: Duration,
    /// Max request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 8000).into(),
            keep_alive: true,
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Transport settings from loaded configuration
    ///
    /// # Errors
    ///
    /// `Error::Config` when host and port do not form a socket address.
    pub fn from_settings(settings: &ServerSettings) -> Result<Self> {
        Ok(Self {
            address: settings.socket_addr()?,
            keep_alive: settings.keep_alive,
            shutdown_timeout: settings.shutdown_timeout(),
            max_body_size: settings.max_body_size,
        })
    }
}

/// Serves one [`App`] over HTTP/1.1
#[derive(Debug, Clone)]
pub struct Server {
    config: ServerConfig,
    app: App,
}

impl Server {
    /// Server using the transport settings the app was built with
    ///
    /// # Errors
    ///
    /// `Error::Config` when the configured address is invalid.
    pub fn new(app: App) -> Result<Self> {
        let config = ServerConfig::from_settings(&app.config().server)?;
        Ok(Self { config, app })
    }

    /// Server with explicit transport settings
    #[must_use]
    pub const fn with_config(app: App, config: ServerConfig) -> Self {
        Self { config, app }
    }

    /// Override the bind address
    #[must_use]
    pub const fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.address = addr;
        self
    }

    /// Transport settings in use
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind and serve until Ctrl-C.
    ///
    /// # Errors
    ///
    /// `Error::BindError` when the address cannot be bound, `Error::Io` when
    /// accepting a connection fails.
    pub async fn serve(&self) -> Result<()> {
        let listener = self.listen()?;
        self.serve_on(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// `Error::Io` when accepting a connection fails.
    pub async fn serve_on(
        &self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send,
    ) -> Result<()> {
        let addr = listener.local_addr()?;
        info!(address = %addr, routes = self.app.router().len(), "Server listening");

        let active = Arc::new(AtomicUsize::new(0));
        let max_body_size = self.config.max_body_size;
        let keep_alive = self.config.keep_alive;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, remote_addr) = accept_result?;
                    let io = TokioIo::new(stream);
                    let app = self.app.clone();
                    let active = Arc::clone(&active);

                    active.fetch_add(1, Ordering::Relaxed);
                    tokio::task::spawn(async move {
                        let service = service_fn(move |req| {
                            let app = app.clone();
                            async move { handle_request(&app, req, remote_addr, max_body_size).await }
                        });

                        if let Err(err) = http1::Builder::new()
                            .keep_alive(keep_alive)
                            .serve_connection(io, service)
                            .await
                        {
                            warn!(remote = %remote_addr, error = %err, "Error serving connection");
                        }
                        active.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                () = &mut shutdown => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
            }
        }

        let drain = async {
            while active.load(Ordering::Relaxed) > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        if tokio::time::timeout(self.config.shutdown_timeout, drain).await.is_err() {
            warn!(
                remaining = active.load(Ordering::Relaxed),
                "Shutdown timeout elapsed with connections still open"
            );
        }
        Ok(())
    }

    fn listen(&self) -> Result<TcpListener> {
        let addr = self.config.address;
        let bind_error = |source: std::io::Error| Error::BindError {
            address: addr.to_string(),
            source,
        };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_error)?;
        socket.set_reuseaddr(true).map_err(bind_error)?;
        #[cfg(not(windows))]
        {
            socket.set_reuseport(true).map_err(bind_error)?;
        }
        socket.bind(addr).map_err(bind_error)?;
        socket.listen(1024).map_err(bind_error)
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

async fn handle_request(
    app: &App,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
    max_body_size: usize,
) -> std::result::Result<hyper::Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match Request::from_hyper_with_limit(req, max_body_size).await {
        Ok(mut request) => {
            request.set_header("x-client-ip", &remote_addr.ip().to_string());
            app.dispatch(request).await
        }
        Err(Error::PayloadTooLarge { limit, actual }) => {
            warn!(%method, path = %path, limit, ?actual, "Request body over limit");
            error_body(
                413,
                "Payload too large",
                json!({"limit": limit, "received": actual}),
            )
        }
        Err(e) => {
            warn!(%method, path = %path, error = %e, "Failed to read request");
            error_body(400, "Bad request", Value::Null)
        }
    };

    info!(
        remote = %remote_addr,
        %method,
        path = %path,
        status = response.status(),
        "Request served"
    );
    Ok(response.into_hyper())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::controller::RouteBuilder;
    use crate::dispatcher::AppBuilder;
    use crate::response::Response;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.address.port(), 8000);
        assert!(config.keep_alive);
    }

    #[test]
    fn test_server_config_from_settings() {
        let settings = ServerSettings {
            port: 9001,
            max_body_size: 16,
            ..ServerSettings::default()
        };
        let config = ServerConfig::from_settings(&settings).unwrap();
        assert_eq!(config.address.port(), 9001);
        assert_eq!(config.max_body_size, 16);
    }

    async fn roundtrip(addr: SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        String::from_utf8_lossy(&out).into_owned()
    }

    #[tokio::test]
    async fn test_serves_over_tcp() {
        let mut config = AppConfig::default();
        config.server.max_body_size = 8;
        let app = AppBuilder::new(config)
            .route(RouteBuilder::get("/ping").handler(|_req| async { Ok(Response::text("pong")) }))
            .route(RouteBuilder::post("/echo").handler(|req| async move {
                Ok(Response::text(req.body_str().unwrap_or_default().to_string()))
            }))
            .build()
            .unwrap();
        let server = Server::new(app).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server
                .serve_on(listener, async {
                    let _ = stopped.await;
                })
                .await
        });

        let ok = roundtrip(
            addr,
            "GET /ping HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(ok.starts_with("HTTP/1.1 200"), "{ok}");
        assert!(ok.contains("x-request-id"));
        assert!(ok.ends_with("pong"));

        let too_large = roundtrip(
            addr,
            "POST /echo HTTP/1.1\r\nHost: test\r\nConnection: close\r\nContent-Length: 12\r\n\r\nhello world!",
        )
        .await;
        assert!(too_large.starts_with("HTTP/1.1 413"), "{too_large}");

        let chunked = roundtrip(
            addr,
            "POST /echo HTTP/1.1\r\nHost: test\r\nConnection: close\r\nTransfer-Encoding: chunked\r\n\r\n6\r\nhello \r\n6\r\nworld!\r\n0\r\n\r\n",
        )
        .await;
        assert!(chunked.starts_with("HTTP/1.1 413"), "{chunked}");
        assert!(chunked.contains(r#""received":null"#), "{chunked}");

        stop.send(()).unwrap();
        task.await.unwrap().unwrap();
    }
}
