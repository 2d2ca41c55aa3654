use axum::http::header::{HeaderName, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;

/// CORS for the tenant frontend. The API surface is GET/POST only, so the
/// allow list stays that narrow; the dev `x-user-id` header is only
/// advertised when the override itself is enabled.
pub fn build_cors_layer(config: &AppConfig) -> CorsLayer {
    let mut allow_headers = vec![ACCEPT, AUTHORIZATION, CONTENT_TYPE];
    if config.auth_dev_overrides_enabled() {
        allow_headers.push(HeaderName::from_static("x-user-id"));
    }

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(allow_headers);

    if config.cors_origins.iter().any(|o| o.trim() == "*") {
        // Wildcard origins cannot carry credentials.
        layer.allow_origin(Any).allow_credentials(false)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        layer.allow_origin(origins).allow_credentials(true)
    }
}
