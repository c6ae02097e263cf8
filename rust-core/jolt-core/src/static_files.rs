//! # Static Files
//!
//! Optional `GET {url}/<path:path>` route that serves files from one
//! directory. Meant for development; a reverse proxy should serve assets in
//! production.
//!
//! Requested paths are checked twice: lexically, so `..` and absolute
//! segments never reach the filesystem, and after canonicalisation, so a
//! symlink cannot point outside the root.

use crate::dispatcher::error_body;
use crate::handler::HandlerResult;
use crate::request::Request;
use crate::response::Response;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Directory served under a URL prefix
#[derive(Debug, Clone)]
pub struct StaticDir {
    root: PathBuf,
}

impl StaticDir {
    /// Serve files below `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory being served
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a request-relative path to a file inside the root.
    ///
    /// `None` when the path escapes the root, names a directory, or does
    /// not exist.
    pub async fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let joined = safe_join(&self.root, relative)?;

        let root = tokio::fs::canonicalize(&self.root).await.ok()?;
        let file = tokio::fs::canonicalize(&joined).await.ok()?;
        if !file.starts_with(&root) {
            warn!(requested = relative, resolved = %file.display(), "Path traversal attempt blocked");
            return None;
        }

        let meta = tokio::fs::metadata(&file).await.ok()?;
        meta.is_file().then_some(file)
    }

    /// Handle a request routed to this directory
    pub async fn serve(&self, req: &Request) -> HandlerResult {
        let requested = req.param("path").and_then(|p| p.as_str()).unwrap_or_default();

        let Some(file) = self.resolve(requested).await else {
            debug!(path = requested, "Static asset not found");
            return Ok(not_found());
        };

        match tokio::fs::read(&file).await {
            Ok(content) => Ok(Response::bytes(content, content_type(&file))),
            Err(e) => {
                warn!(path = %file.display(), error = %e, "Failed to read static asset");
                Ok(not_found())
            }
        }
    }
}

fn not_found() -> Response {
    error_body(404, "Not found", Value::Null)
}

/// Join only plain path segments onto `root`
fn safe_join(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut joined = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (joined != root).then_some(joined)
}

/// Content type from the file extension
fn content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("txt" | "md") => "text/plain; charset=utf-8",
        Some("xml") => "application/xml",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_join_rejects_escapes() {
        let root = Path::new("/srv/assets");
        assert_eq!(
            safe_join(root, "css/site.css"),
            Some(PathBuf::from("/srv/assets/css/site.css"))
        );
        assert_eq!(
            safe_join(root, "./img/logo.png"),
            Some(PathBuf::from("/srv/assets/img/logo.png"))
        );
        assert_eq!(safe_join(root, "../etc/passwd"), None);
        assert_eq!(safe_join(root, "css/../../etc/passwd"), None);
        assert_eq!(safe_join(root, "/etc/passwd"), None);
        assert_eq!(safe_join(root, ""), None);
    }

    #[test]
    fn test_content_type_by_extension() {
        assert_eq!(content_type(Path::new("a/index.HTML")), "text/html; charset=utf-8");
        assert_eq!(content_type(Path::new("app.js")), "text/javascript; charset=utf-8");
        assert_eq!(content_type(Path::new("logo.svg")), "image/svg+xml");
        assert_eq!(content_type(Path::new("blob")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_resolve_inside_root_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("css")).unwrap();
        std::fs::write(dir.path().join("css/site.css"), "body{}").unwrap();

        let assets = StaticDir::new(dir.path());
        assert!(assets.resolve("css/site.css").await.is_some());
        assert!(assets.resolve("css").await.is_none());
        assert!(assets.resolve("css/missing.css").await.is_none());
        assert!(assets.resolve("../css/site.css").await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_out_of_root_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "top secret").unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), dir.path().join("leak.txt")).unwrap();

        let assets = StaticDir::new(dir.path());
        assert!(assets.resolve("leak.txt").await.is_none());
    }
}
