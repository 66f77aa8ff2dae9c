//! API documentation UI.
//!
//! Serves the bundled Swagger UI page and renders the OpenAPI document at
//! `swagger_spec` with the host the client used, so "try it out" calls go
//! back through this gateway.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderValue, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;

use crate::adapter::ServiceAdapter;
use crate::assets::{EmbeddedAssets, bundled_file};
use crate::dashboard::{render_template, request_host};
use crate::error::RenderError;

const SPEC_TEMPLATE: &str = "templates/openapi.json";

#[derive(Serialize)]
struct SpecView<'a> {
    request_host: &'a str,
}

/// Swagger UI plus the templated OpenAPI document.
#[derive(Debug, Clone)]
pub struct SwaggerUi {
    spec_template: Arc<String>,
}

impl SwaggerUi {
    /// `custom` replaces the bundled OpenAPI template when given.
    pub fn new(custom: Option<&str>) -> Self {
        let spec_template = match custom {
            Some(source) => source.to_string(),
            None => bundled_file(SPEC_TEMPLATE)
                .and_then(|f| f.contents_utf8())
                .unwrap_or_default()
                .to_string(),
        };
        Self {
            spec_template: Arc::new(spec_template),
        }
    }

    pub fn render_spec(&self, request_host: &str) -> Result<String, RenderError> {
        render_template("openapi.json", &self.spec_template, &SpecView { request_host })
    }
}

impl ServiceAdapter for SwaggerUi {
    fn name(&self) -> &'static str {
        "swagger-ui"
    }

    fn into_router(self) -> Router {
        Router::new()
            .route("/swagger_spec", get(spec_handler))
            .with_state(self)
            .fallback_service(EmbeddedAssets::new("swagger-ui", "swagger").into_router())
    }
}

async fn spec_handler(State(swagger): State<SwaggerUi>, req: Request) -> Result<Response, RenderError> {
    let body = swagger.render_spec(&request_host(&req))?;
    let mut response = body.into_response();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_spec_points_at_request_host() {
        let spec = SwaggerUi::new(None).render_spec("example.org:8261").unwrap();
        let doc: serde_json::Value = serde_json::from_str(&spec).unwrap();
        assert_eq!(doc["servers"][0]["url"], "http://example.org:8261/api");
    }

    #[test]
    fn custom_spec_template() {
        let swagger = SwaggerUi::new(Some(r#"{"host": "{{ request_host }}"}"#));
        assert_eq!(swagger.render_spec("h:1").unwrap(), r#"{"host": "h:1"}"#);
    }

    #[test]
    fn broken_spec_template_is_render_error() {
        let swagger = SwaggerUi::new(Some("{{ request_host"));
        assert!(matches!(
            swagger.render_spec("h"),
            Err(RenderError::Template { .. })
        ));
    }
}
