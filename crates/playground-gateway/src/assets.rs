//! Embedded static bundle and the handlers that serve it.

use std::path::PathBuf;

use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use include_dir::{Dir, File, include_dir};
use tower_http::services::ServeDir;

use crate::adapter::ServiceAdapter;
use crate::error::GatewayError;

/// Process-wide, read-only asset bundle.
pub static BUNDLE: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/static");

/// Look up a file in the bundle by its bundle-relative path.
pub fn bundled_file(path: &str) -> Option<&'static File<'static>> {
    BUNDLE.get_file(path)
}

pub fn content_type(path: &str) -> &'static str {
    let ext = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "ico" => "image/x-icon",
        "txt" => "text/plain; charset=utf-8",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

/// Serves one directory of the embedded bundle.
#[derive(Debug, Clone)]
pub struct EmbeddedAssets {
    name: &'static str,
    subdir: &'static str,
}

impl EmbeddedAssets {
    pub fn new(name: &'static str, subdir: &'static str) -> Self {
        Self { name, subdir }
    }

    /// The landing page bundle served at `/`.
    pub fn site_root() -> Self {
        Self::new("static", "root")
    }

    /// The entity-search single-page UI.
    pub fn entity_search() -> Self {
        Self::new("entity-search", "entity-search")
    }

    /// Resolve a request path to a bundled file. Directories resolve to
    /// their `index.html`.
    pub fn resolve(&self, request_path: &str) -> Option<&'static File<'static>> {
        let relative = request_path.trim_start_matches('/');
        if relative.split('/').any(|segment| segment == "..") {
            return None;
        }

        let base = if relative.is_empty() {
            self.subdir.to_string()
        } else {
            format!("{}/{}", self.subdir, relative.trim_end_matches('/'))
        };

        if !relative.ends_with('/') && !relative.is_empty() {
            if let Some(file) = BUNDLE.get_file(&base) {
                return Some(file);
            }
        }
        BUNDLE.get_file(format!("{base}/index.html"))
    }
}

impl ServiceAdapter for EmbeddedAssets {
    fn name(&self) -> &'static str {
        self.name
    }

    fn into_router(self) -> Router {
        Router::new().fallback(serve_embedded).with_state(self)
    }
}

async fn serve_embedded(State(assets): State<EmbeddedAssets>, req: Request) -> Response {
    match assets.resolve(req.uri().path()) {
        Some(file) => file_response(file),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// 200 response carrying a bundled file with a content type by extension.
pub fn file_response(file: &'static File<'static>) -> Response {
    let path = file.path().to_string_lossy();
    let mut response = Response::new(Body::from(Bytes::from_static(file.contents())));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type(&path)));
    response
}

/// Router for the `/` mount: a directory on disk when configured, the
/// embedded bundle otherwise.
pub fn root_router(static_root_dir: Option<&PathBuf>) -> Result<Router, GatewayError> {
    match static_root_dir {
        Some(dir) => {
            if !dir.is_dir() {
                return Err(GatewayError::StaticRoot { path: dir.clone() });
            }
            Ok(Router::new().fallback_service(ServeDir::new(dir)))
        }
        None => Ok(EmbeddedAssets::site_root().into_router()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_has_expected_layout() {
        assert!(bundled_file("root/index.html").is_some());
        assert!(bundled_file("templates/site/index.html").is_some());
        assert!(bundled_file("templates/openapi.json").is_some());
        assert!(bundled_file("swagger/index.html").is_some());
        assert!(bundled_file("xterm/index.html").is_some());
    }

    #[test]
    fn resolves_directories_to_index() {
        let assets = EmbeddedAssets::entity_search();
        let index = assets.resolve("/").unwrap();
        assert_eq!(index.path().to_string_lossy(), "entity-search/index.html");
        let script = assets.resolve("/app.js").unwrap();
        assert_eq!(script.path().to_string_lossy(), "entity-search/app.js");
        assert!(assets.resolve("/missing.css").is_none());
        assert!(assets.resolve("/../root/index.html").is_none());
    }

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type("a/b/index.html"), "text/html; charset=utf-8");
        assert_eq!(content_type("app.JS"), "text/javascript; charset=utf-8");
        assert_eq!(content_type("noext"), "application/octet-stream");
    }

    #[test]
    fn missing_static_dir_is_rejected() {
        let missing = PathBuf::from("/definitely/not/here");
        assert!(matches!(
            root_router(Some(&missing)),
            Err(GatewayError::StaticRoot { .. })
        ));
    }
}
