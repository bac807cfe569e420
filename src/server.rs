use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde_json::json;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, services::ServeDir};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::WeatherError;
use crate::templates::HtmlView;
use crate::widget::{LocationQuery, LocationStore, WeatherWidget};

pub const LOCATION_COOKIE: &str = "weather-location";

#[derive(Clone)]
pub struct AppState {
    widget: Arc<WeatherWidget>,
    config: Arc<Config>,
}

impl AppState {
    pub fn new(widget: WeatherWidget, config: Config) -> Self {
        Self {
            widget: Arc::new(widget),
            config: Arc::new(config),
        }
    }
}

/// Remembers the widget location in a browser cookie.
struct CookieLocationStore {
    jar: CookieJar,
}

impl LocationStore for CookieLocationStore {
    fn load(&self) -> Option<String> {
        self.jar.get(LOCATION_COOKIE).map(|c| c.value().to_string())
    }

    fn save(&mut self, location: &str) {
        let cookie = Cookie::build((LOCATION_COOKIE, location.to_string()))
            .path("/")
            .permanent()
            .build();
        self.jar = self.jar.clone().add(cookie);
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(widget_page))
        .route("/widget", get(widget_page))
        .route("/api/widget", get(widget_api))
        .route("/api/cache/stats", get(cache_stats))
        .nest_service("/static", ServeDir::new("static"))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("🦀 Weather widget server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn widget_page(
    Query(query): Query<LocationQuery>,
    jar: CookieJar,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let mut store = CookieLocationStore { jar };
    let mut view = HtmlView::new(state.config.refresh_interval.as_secs());

    state
        .widget
        .init_with_retry(
            &query,
            &mut store,
            &mut view,
            state.config.widget_retries,
            state.config.retry_delay,
        )
        .await;

    (store.jar, Html(view.into_html()))
}

async fn widget_api(
    Query(query): Query<LocationQuery>,
    jar: CookieJar,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let store = CookieLocationStore { jar };
    let location = state.widget.resolve_location(&query, &store);

    match state.widget.load(&location).await {
        Ok(model) => Json(model).into_response(),
        Err(e) => {
            warn!("❌ Weather API error for {}: {}", location, e);
            let status = match e {
                WeatherError::MissingApiKey => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::BAD_GATEWAY,
            };
            (
                status,
                Json(json!({
                    "error": e.to_string(),
                    "location": location,
                })),
            )
                .into_response()
        }
    }
}

async fn cache_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.widget.cache().stats().await)
}
