// Handlers for the catalog API consumed by the rendering layer

use axum::{
    extract::{RawQuery, State},
    response::Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    controller::{CompletionOutcome, Controller, ListingView, RecordingNavigator},
    error::{AppError, AppResult},
    filter_codec::{parse_query, CanonicalUrl},
    models::MappedPage,
    page_mapper::map_page,
    search_api::search_with_timeout,
    AppState,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResponse {
    #[serde(flatten)]
    listing: ListingView,
    canonical: CanonicalUrl,
}

// GET /api/catalog?<filters>&sort=
// First page of a listing, as the controller sees it after the initial load.
pub async fn get_catalog(
    State(app_state): State<AppState>,
    RawQuery(query): RawQuery,
) -> AppResult<Json<CatalogResponse>> {
    let query = query.unwrap_or_default();
    tracing::info!("[HANDLER] /api/catalog - Request received for query: {:?}", query);

    let mut controller = Controller::new(
        Arc::clone(&app_state.backend),
        RecordingNavigator::default(),
        app_state.codec.as_ref().clone(),
        app_state.settings.page_limit,
        app_state.settings.fetch_timeout(),
    );

    let ticket = controller.begin_initial(&query);
    match controller.dispatch(ticket).await {
        CompletionOutcome::Applied => {}
        CompletionOutcome::Failed(e) => {
            tracing::error!("[HANDLER] /api/catalog - Search failed: {}", e);
            return Err(AppError::Upstream(e));
        }
        CompletionOutcome::Stale => {
            return Err(AppError::InternalServerError(anyhow::anyhow!(
                "Initial catalog fetch was superseded without a newer request"
            )));
        }
    }

    let listing = controller.view();
    tracing::info!(
        "[HANDLER] /api/catalog - Returning {} vehicles (total: {:?})",
        listing.vehicles.len(),
        listing.total_docs
    );
    let canonical = app_state.codec.canonical(parse_query(&query));
    Ok(Json(CatalogResponse { listing, canonical }))
}

// GET /api/catalog/page?<filters>&cursor=N
// One mapped page for clients accumulating "load more" results themselves.
pub async fn get_catalog_page(
    State(app_state): State<AppState>,
    RawQuery(query): RawQuery,
) -> AppResult<Json<MappedPage>> {
    let pairs = parse_query(query.as_deref().unwrap_or_default());
    let filters = app_state.codec.decode(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    let cursor = pairs
        .iter()
        .find(|(key, _)| key == "cursor")
        .and_then(|(_, value)| value.trim().parse::<u32>().ok())
        .filter(|cursor| *cursor >= 1)
        .unwrap_or(filters.page);
    tracing::info!("[HANDLER] /api/catalog/page - Fetching cursor {}", cursor);

    let raw = search_with_timeout(
        app_state.backend.as_ref(),
        &filters,
        app_state.settings.page_limit,
        cursor,
        app_state.settings.fetch_timeout(),
    )
    .await?;

    Ok(Json(map_page(&raw, Some(cursor))))
}

// GET /api/canonical?<any>
pub async fn get_canonical(
    State(app_state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Json<CanonicalUrl> {
    let canonical = app_state.codec.canonical(parse_query(query.as_deref().unwrap_or_default()));
    tracing::debug!(query = %canonical.query, robots = ?canonical.robots, "Canonical URL computed");
    Json(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::error::CatalogError;
    use crate::filter_codec::{FilterCodec, FilterDefaults, Robots};
    use crate::models::RangeFilter;
    use crate::search_api::test_support::{raw_page, InMemoryBackend};
    use axum::{http::StatusCode, response::IntoResponse};

    fn state(backend: InMemoryBackend) -> AppState {
        let settings = Settings {
            server_address: "127.0.0.1:0".to_string(),
            search_api_url: "http://localhost/search".to_string(),
            page_limit: 24,
            fetch_timeout_secs: 15,
            year_default_min: 1990,
            year_default_max: 2025,
            price_default_min: 0,
            price_default_max: 100_000_000,
            km_default_min: 0,
            km_default_max: 500_000,
        };
        AppState {
            codec: Arc::new(FilterCodec::new(FilterDefaults {
                anio: RangeFilter { min: 1990, max: 2025 },
                precio: RangeFilter { min: 0, max: 100_000_000 },
                km: RangeFilter { min: 0, max: 500_000 },
            })),
            settings: Arc::new(settings),
            backend: Arc::new(backend),
        }
    }

    #[tokio::test]
    async fn catalog_returns_listing_and_canonical() {
        let backend = InMemoryBackend::default().with_page(2, raw_page(&[("a", 20.0), ("b", 10.0)], true, Some(2)));
        let query = "marca=Fiat&page=2&sort=precio_asc".to_string();

        let Json(response) = get_catalog(State(state(backend)), RawQuery(Some(query))).await.unwrap();

        let ids: Vec<&str> = response.listing.vehicles.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(response.listing.next_page_cursor, Some(3));
        assert_eq!(response.listing.query, "marca=Fiat&page=2&sort=precio_asc");
        assert_eq!(response.canonical.query, "marca=Fiat");
        assert_eq!(response.canonical.robots, Robots::NoIndex);
    }

    #[tokio::test]
    async fn catalog_backend_failure_is_a_retryable_gateway_error() {
        let backend = InMemoryBackend::default();
        backend.set_page(1, Err(CatalogError::Timeout(std::time::Duration::from_secs(15))));

        let err = get_catalog(State(state(backend)), RawQuery(None)).await.err().unwrap();
        assert_eq!(err.into_response().status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn catalog_page_uses_the_cursor_parameter() {
        let backend = InMemoryBackend::default().with_page(4, raw_page(&[("d", 1.0)], true, Some(4)));
        let query = "marca=Fiat&cursor=4".to_string();

        let Json(page) = get_catalog_page(State(state(backend)), RawQuery(Some(query))).await.unwrap();
        assert_eq!(page.vehicles.len(), 1);
        assert_eq!(page.next_page_cursor, Some(5));
    }

    #[tokio::test]
    async fn canonical_endpoint_strips_tracking_params() {
        let query = "anio=2000,2024&marca=Peugeot&utm_campaign=x".to_string();
        let Json(canonical) = get_canonical(State(state(InMemoryBackend::default())), RawQuery(Some(query))).await;
        assert_eq!(canonical.query, "anio=2000,2024&marca=Peugeot");
        assert_eq!(canonical.robots, Robots::Index);
    }
}
