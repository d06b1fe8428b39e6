use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;

use crate::models::{comma_list, NamedStream, OptionsError, PluginOptions, ResolveResponse};
use crate::services::resolver::ResolveError;
use crate::services::selector::{IframeSelector, NonInteractive, PresetAnswer};
use crate::AppState;

type ApiError = (StatusCode, Json<serde_json::Value>);

/// Query parameters for GET /api/resolve
#[derive(Debug, Default, Deserialize)]
pub struct ResolveQuery {
    #[serde(default)]
    pub url: String,
    /// 1-based iframe number used when a page offers several players
    #[serde(default)]
    pub choice: Option<String>,
    #[serde(default)]
    pub playlist_max: Option<String>,
    #[serde(default)]
    pub playlist_referer: Option<String>,
    #[serde(default)]
    pub blacklist_netloc: Option<String>,
    #[serde(default)]
    pub blacklist_path: Option<String>,
    #[serde(default)]
    pub blacklist_filepath: Option<String>,
    #[serde(default)]
    pub whitelist_netloc: Option<String>,
    #[serde(default)]
    pub whitelist_path: Option<String>,
}

impl ResolveQuery {
    /// Server defaults overridden by whatever the query sets
    pub fn options(&self, defaults: &PluginOptions) -> Result<PluginOptions, OptionsError> {
        let mut options = defaults.clone();
        if let Some(raw) = &self.playlist_max {
            options.set_playlist_max(raw)?;
        }
        if let Some(raw) = &self.playlist_referer {
            options.set_playlist_referer(raw)?;
        }

        let lists = [
            (&self.blacklist_netloc, &mut options.blacklist_netloc),
            (&self.blacklist_path, &mut options.blacklist_path),
            (&self.blacklist_filepath, &mut options.blacklist_filepath),
            (&self.whitelist_netloc, &mut options.whitelist_netloc),
            (&self.whitelist_path, &mut options.whitelist_path),
        ];
        for (raw, list) in lists {
            if let Some(raw) = raw {
                *list = comma_list(raw);
            }
        }

        Ok(options)
    }
}

fn error_status(error: &ResolveError) -> StatusCode {
    match error {
        ResolveError::Forbidden { .. } => StatusCode::FORBIDDEN,
        ResolveError::NotFound { .. } => StatusCode::NOT_FOUND,
        ResolveError::NoCandidatesFound { .. }
        | ResolveError::NoPlayerResolved { .. }
        | ResolveError::DepthExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ResolveError::Fetch { .. } | ResolveError::Plugin { .. } => StatusCode::BAD_GATEWAY,
    }
}

fn bad_request(message: String) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
}

/// GET /api/resolve?url=<page>&choice=<n>&<options>
/// Resolves a web page with an embedded player into its playable streams.
pub async fn resolve_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ResolveQuery>,
) -> Result<Json<ResolveResponse>, ApiError> {
    if query.url.trim().is_empty() {
        return Err(bad_request("Missing url parameter".to_string()));
    }

    let options = query
        .options(&state.config.plugin_options)
        .map_err(|e| bad_request(e.to_string()))?;

    let selector: Box<dyn IframeSelector> = match &query.choice {
        Some(choice) => Box::new(PresetAnswer::new(choice.clone())),
        None => Box::new(NonInteractive),
    };

    tracing::info!("Resolving {}", query.url);
    let resolution = state
        .resolver
        .resolve(&query.url, &options, selector.as_ref())
        .await
        .map_err(|e| {
            tracing::warn!("Resolve failed for {}: {}", query.url, e);
            (
                error_status(&e),
                Json(serde_json::json!({ "error": e.user_message() })),
            )
        })?;

    let streams: Vec<NamedStream> = resolution
        .streams
        .map(|(name, stream)| NamedStream { name, stream })
        .collect()
        .await;
    tracing::info!("Resolved {} into {} streams", query.url, streams.len());

    Ok(Json(ResolveResponse {
        url: query.url,
        title: resolution.title,
        visited: resolution.visited,
        streams,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_overrides_defaults() {
        let defaults = PluginOptions {
            blacklist_netloc: vec!["ads.example.com".to_string()],
            playlist_max: 3,
            ..PluginOptions::default()
        };
        let query = ResolveQuery {
            url: "http://example.com".to_string(),
            playlist_max: Some("7".to_string()),
            whitelist_netloc: Some("player.example.com, cdn.example.com".to_string()),
            ..ResolveQuery::default()
        };

        let options = query.options(&defaults).unwrap();
        assert_eq!(options.playlist_max, 7);
        assert_eq!(options.blacklist_netloc, vec!["ads.example.com"]);
        assert_eq!(
            options.whitelist_netloc,
            vec!["player.example.com", "cdn.example.com"]
        );
    }

    #[test]
    fn test_query_rejects_bad_options() {
        let query = ResolveQuery {
            url: "http://example.com".to_string(),
            playlist_max: Some("99".to_string()),
            ..ResolveQuery::default()
        };
        assert!(query.options(&PluginOptions::default()).is_err());
    }

    #[test]
    fn test_error_status() {
        assert_eq!(
            error_status(&ResolveError::Forbidden { url: String::new() }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            error_status(&ResolveError::NoCandidatesFound { url: String::new() }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
