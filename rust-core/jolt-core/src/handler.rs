//! # Handlers
//!
//! One calling convention for every endpoint. Cooperative handlers are
//! polled on the runtime; blocking handlers are moved to Tokio's blocking
//! pool. Either way the dispatcher only ever sees [`Handler::invoke`].

use crate::error::HandlerError;
use crate::request::Request;
use crate::response::Response;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed `Send` future, as produced by handlers
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of a handler call
pub type HandlerResult = Result<Response, HandlerError>;

type HandlerFn = dyn Fn(Arc<Request>) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// Endpoint callable
#[derive(Clone)]
pub struct Handler {
    inner: Arc<HandlerFn>,
}

impl Handler {
    /// Wrap an async function
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<Request>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |req: Arc<Request>| -> BoxFuture<'static, HandlerResult> { Box::pin(f(req)) }),
        }
    }

    /// Wrap a blocking function; each call runs on the blocking pool
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn(&Request) -> HandlerResult + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self {
            inner: Arc::new(move |req: Arc<Request>| -> BoxFuture<'static, HandlerResult> {
                let f = Arc::clone(&f);
                Box::pin(async move {
                    tokio::task::spawn_blocking(move || f(&req))
                        .await
                        .map_err(HandlerError::unexpected)?
                })
            }),
        }
    }

    /// Call the handler
    pub fn invoke(&self, req: Arc<Request>) -> BoxFuture<'static, HandlerResult> {
        (self.inner)(req)
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Handler")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainError;
    use crate::router::Method;

    #[tokio::test]
    async fn test_async_handler() {
        let handler = Handler::from_async(|req| async move {
            Ok(Response::text(format!("hello {}", req.path())))
        });
        let res = handler
            .invoke(Arc::new(Request::new(Method::Get, "/world")))
            .await
            .unwrap();
        assert_eq!(res.body_str(), Some("hello /world"));
    }

    #[tokio::test]
    async fn test_blocking_handler() {
        let handler = Handler::blocking(|req| {
            std::thread::sleep(std::time::Duration::from_millis(5));
            Ok(Response::text(req.path().to_string()))
        });
        let res = handler
            .invoke(Arc::new(Request::new(Method::Get, "/slow")))
            .await
            .unwrap();
        assert_eq!(res.body_str(), Some("/slow"));
    }

    #[tokio::test]
    async fn test_blocking_handler_error_passes_through() {
        let handler = Handler::blocking(|_| Err(DomainError::new("conflict").into()));
        let err = handler
            .invoke(Arc::new(Request::new(Method::Post, "/x")))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Domain(e) if e.kind == "conflict"));
    }

    #[test]
    fn test_handler_is_cloneable_and_reusable() {
        let handler = Handler::from_async(|req| async move { Ok(Response::text(req.path().to_string())) });
        let copy = handler.clone();

        for (h, path) in [(handler, "/a"), (copy, "/b")] {
            let res = tokio_test::block_on(h.invoke(Arc::new(Request::new(Method::Get, path)))).unwrap();
            assert_eq!(res.body_str(), Some(path));
        }
    }

    #[tokio::test]
    async fn test_blocking_handler_panic_is_unexpected() {
        let handler = Handler::blocking(|_| panic!("boom"));
        let err = handler
            .invoke(Arc::new(Request::new(Method::Get, "/p")))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Unexpected(_)));
    }
}
