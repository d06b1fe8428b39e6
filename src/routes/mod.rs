pub mod health;
pub mod resolve;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .route("/ready", get(health::ready))
        .route("/live", get(health::live))
        // Resolution
        .route("/api/resolve", get(resolve::resolve_page))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::{PluginOptions, ResolveResponse};
    use crate::services::resolver::{Resolver, ResolverSettings};
    use crate::testing::{FakeFetcher, RecordingParser};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::time::Instant;
    use tower::ServiceExt;

    fn app(fetcher: FakeFetcher) -> Router {
        let config = Config {
            port: 0,
            user_agent: "test".to_string(),
            fetch_timeout_ms: 1000,
            max_retries: 0,
            selection_timeout_ms: 50,
            max_resolve_depth: 8,
            plugin_options: PluginOptions::default(),
        };
        let resolver = Resolver::new(
            Arc::new(fetcher),
            Arc::new(RecordingParser::new()),
            config.resolver_settings(),
        );
        router(Arc::new(AppState {
            config,
            resolver,
            start_time: Instant::now(),
        }))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(app(FakeFetcher::new()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["maxResolveDepth"], 8);
        assert_eq!(body["playlistMax"], 5);
    }

    #[tokio::test]
    async fn test_resolve_endpoint() {
        let fetcher = FakeFetcher::new()
            .page(
                "http://page.example.com/",
                r#"<title>Live</title><iframe src="/embed"></iframe>"#,
            )
            .page(
                "http://page.example.com/embed",
                r#"<video src="http://cdn.example.com/clip_480p.mp4">"#,
            );

        let (status, body) = get_json(
            app(fetcher),
            "/api/resolve?url=http%3A%2F%2Fpage.example.com%2F",
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let response: ResolveResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.title.as_deref(), Some("Live"));
        assert_eq!(
            response.visited,
            vec!["http://page.example.com/", "http://page.example.com/embed"]
        );
        assert_eq!(response.streams.len(), 1);
        assert_eq!(response.streams[0].name, "480p");
        assert_eq!(
            response.streams[0].stream.referer.as_deref(),
            Some("http://page.example.com/embed")
        );
    }

    #[tokio::test]
    async fn test_resolve_errors() {
        let (status, body) = get_json(
            app(FakeFetcher::new().forbidden("http://page.example.com/")),
            "/api/resolve?url=http://page.example.com/",
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["error"].as_str().unwrap().contains("Forbidden"));

        let (status, _) = get_json(
            app(FakeFetcher::new().page("http://page.example.com/", "<p>empty</p>")),
            "/api/resolve?url=http://page.example.com/",
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = get_json(
            app(FakeFetcher::new()),
            "/api/resolve?url=http://page.example.com/&playlist_max=30",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = get_json(app(FakeFetcher::new()), "/api/resolve").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing url parameter");
    }
}
