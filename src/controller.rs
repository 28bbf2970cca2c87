// Listing controller, the single writer of the accumulated list.
//
// Every fetch is issued as a FetchTicket stamped with a fresh generation.
// Only the ticket of the latest generation may touch the store; anything
// older that arrives later is discarded, whatever its content. The URL is
// replaced exactly once per successful return to Idle and once per sort
// change.

use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::CatalogError;
use crate::filter_codec::{parse_query, FilterCodec, KEY_SORT};
use crate::models::{FilterSet, SortKey, VehicleRecord};
use crate::page_mapper::map_page;
use crate::search_api::{search_with_timeout, SearchBackend};
use crate::sort::project;
use crate::store::{AccumulationStore, AppendOutcome};

/// Receives the canonical query string after each settled transition.
/// Implementations must replace the current history entry, not push one.
pub trait Navigator: Send {
    fn replace(&mut self, query: &str);
}

/// Navigator that keeps every replacement in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingNavigator {
    pub replacements: Vec<String>,
}

impl RecordingNavigator {
    pub fn current(&self) -> Option<&str> {
        self.replacements.last().map(String::as_str)
    }
}

impl Navigator for RecordingNavigator {
    fn replace(&mut self, query: &str) {
        self.replacements.push(query.to_string());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControllerState {
    Idle,
    FetchingInitial,
    FetchingFiltered,
    FetchingMore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Initial,
    Filtered,
    More,
}

impl FetchKind {
    fn state(self) -> ControllerState {
        match self {
            FetchKind::Initial => ControllerState::FetchingInitial,
            FetchKind::Filtered => ControllerState::FetchingFiltered,
            FetchKind::More => ControllerState::FetchingMore,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchTicket {
    pub generation: u64,
    pub kind: FetchKind,
    pub filters: FilterSet,
    pub cursor: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    Applied,
    /// The ticket was superseded; its result was dropped.
    Stale,
    /// The fetch failed; the list is untouched and `retry` re-issues it.
    Failed(CatalogError),
}

/// Snapshot handed to the rendering layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingView {
    pub state: ControllerState,
    pub vehicles: Vec<VehicleRecord>,
    pub total_docs: Option<u64>,
    pub has_next_page: bool,
    pub next_page_cursor: Option<u32>,
    pub query: String,
    pub sort: Option<&'static str>,
    pub error: Option<String>,
}

pub struct Controller<B: SearchBackend + ?Sized, N: Navigator> {
    backend: Arc<B>,
    navigator: N,
    codec: FilterCodec,
    page_limit: u32,
    timeout: Duration,
    state: ControllerState,
    generation: u64,
    filters: FilterSet,
    sort_key: SortKey,
    store: AccumulationStore,
    last_error: Option<CatalogError>,
    failed: Option<FetchTicket>,
}

impl<B, N> Controller<B, N>
where
    B: SearchBackend + ?Sized + 'static,
    N: Navigator,
{
    pub fn new(backend: Arc<B>, navigator: N, codec: FilterCodec, page_limit: u32, timeout: Duration) -> Self {
        Self {
            backend,
            navigator,
            codec,
            page_limit,
            timeout,
            state: ControllerState::Idle,
            generation: 0,
            filters: FilterSet::default(),
            sort_key: SortKey::None,
            store: AccumulationStore::new(),
            last_error: None,
            failed: None,
        }
    }

    /// First load of a listing from its URL query. The sort parameter is
    /// adopted immediately since it needs no fetch.
    pub fn begin_initial(&mut self, query: &str) -> FetchTicket {
        let pairs = parse_query(query);
        self.sort_key = pairs
            .iter()
            .rev()
            .find(|(key, _)| key == KEY_SORT)
            .map(|(_, value)| SortKey::from_param(value))
            .unwrap_or_default();
        let filters = self.codec.decode(pairs);
        let cursor = filters.page;
        self.issue(FetchKind::Initial, filters, cursor)
    }

    /// Accepted from any state; supersedes whatever is in flight.
    pub fn apply_filters(&mut self, filters: FilterSet) -> FetchTicket {
        let filters = self.codec.normalize(filters).at_page(1);
        self.issue(FetchKind::Filtered, filters, 1)
    }

    pub fn clear_filters(&mut self) -> FetchTicket {
        self.apply_filters(FilterSet::default())
    }

    pub fn load_more(&mut self) -> Result<FetchTicket, CatalogError> {
        if self.state != ControllerState::Idle {
            tracing::debug!(state = ?self.state, "Rejecting load more while a fetch is pending");
            return Err(CatalogError::LoadMoreRejected("a fetch is already in progress"));
        }
        let cursor = match self.store.next_page_cursor() {
            Some(cursor) if self.store.has_next_page() => cursor,
            _ => return Err(CatalogError::LoadMoreRejected("no more pages")),
        };
        let filters = self.filters.clone();
        Ok(self.issue(FetchKind::More, filters, cursor))
    }

    /// Re-issues the last failed fetch under a new generation.
    pub fn retry(&mut self) -> Option<FetchTicket> {
        if self.state != ControllerState::Idle {
            return None;
        }
        let failed = self.failed.take()?;
        if failed.kind == FetchKind::More && !self.store.can_load_more() {
            return None;
        }
        Some(self.issue(failed.kind, failed.filters, failed.cursor))
    }

    /// Re-orders the loaded list and records the sort in the URL. No fetch.
    pub fn set_sort(&mut self, key: SortKey) {
        self.sort_key = key;
        let query = self.current_query();
        self.navigator.replace(&query);
    }

    /// Backend call for `ticket`, detached from the controller so that a
    /// newer ticket can be issued while it is in flight.
    pub fn request(&self, ticket: &FetchTicket) -> impl Future<Output = Result<Value, CatalogError>> + Send + use<B, N> {
        let backend = Arc::clone(&self.backend);
        let filters = ticket.filters.clone();
        let (limit, cursor, timeout) = (self.page_limit, ticket.cursor, self.timeout);
        async move { search_with_timeout(backend.as_ref(), &filters, limit, cursor, timeout).await }
    }

    /// Fetches and applies `ticket` in one step.
    pub async fn dispatch(&mut self, ticket: FetchTicket) -> CompletionOutcome {
        let result = self.request(&ticket).await;
        self.complete(ticket, result)
    }

    /// Applies the result of a fetch if its ticket is still current.
    pub fn complete(&mut self, ticket: FetchTicket, result: Result<Value, CatalogError>) -> CompletionOutcome {
        if ticket.generation != self.generation || self.state == ControllerState::Idle {
            tracing::warn!(
                ticket_generation = ticket.generation,
                current_generation = self.generation,
                kind = ?ticket.kind,
                "Discarding stale search response"
            );
            return CompletionOutcome::Stale;
        }

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(kind = ?ticket.kind, cursor = ticket.cursor, error = %e, "Search fetch failed");
                self.state = ControllerState::Idle;
                self.last_error = Some(e.clone());
                self.failed = Some(ticket);
                return CompletionOutcome::Failed(e);
            }
        };

        let page = map_page(&raw, Some(ticket.cursor));
        match ticket.kind {
            FetchKind::Initial | FetchKind::Filtered => {
                self.store.replace(page);
                self.filters = ticket.filters;
            }
            FetchKind::More => {
                if let AppendOutcome::Appended { added } = self.store.append(page) {
                    tracing::debug!(added, total = self.store.len(), "Appended load-more page");
                }
                self.filters = self.filters.at_page(ticket.cursor);
            }
        }

        self.state = ControllerState::Idle;
        self.last_error = None;
        self.failed = None;
        let query = self.current_query();
        self.navigator.replace(&query);
        CompletionOutcome::Applied
    }

    /// Query string for the current filters plus sort.
    pub fn current_query(&self) -> String {
        let mut query = self.codec.encode(&self.filters);
        if let Some(sort) = self.sort_key.as_param() {
            // `sort` sorts after every filter key
            if !query.is_empty() {
                query.push('&');
            }
            query.push_str(KEY_SORT);
            query.push('=');
            query.push_str(sort);
        }
        query
    }

    /// Loaded vehicles in display order, derived afresh on every call.
    pub fn visible(&self) -> Vec<VehicleRecord> {
        project(self.store.vehicles(), self.sort_key)
    }

    pub fn view(&self) -> ListingView {
        ListingView {
            state: self.state,
            vehicles: self.visible(),
            total_docs: self.store.total_docs(),
            has_next_page: self.store.has_next_page(),
            next_page_cursor: self.store.next_page_cursor(),
            query: self.current_query(),
            sort: self.sort_key.as_param(),
            error: self.last_error.as_ref().map(ToString::to_string),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn sort_key(&self) -> SortKey {
        self.sort_key
    }

    pub fn store(&self) -> &AccumulationStore {
        &self.store
    }

    pub fn last_error(&self) -> Option<&CatalogError> {
        self.last_error.as_ref()
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    fn issue(&mut self, kind: FetchKind, filters: FilterSet, cursor: u32) -> FetchTicket {
        self.generation += 1;
        self.state = kind.state();
        self.last_error = None;
        tracing::debug!(generation = self.generation, ?kind, cursor, "Issuing search fetch");
        FetchTicket { generation: self.generation, kind, filters, cursor }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter_codec::FilterDefaults;
    use crate::models::RangeFilter;
    use crate::search_api::test_support::{raw_page, InMemoryBackend};
    use std::collections::BTreeSet;

    type TestController = Controller<InMemoryBackend, RecordingNavigator>;

    fn codec() -> FilterCodec {
        FilterCodec::new(FilterDefaults {
            anio: RangeFilter { min: 1990, max: 2025 },
            precio: RangeFilter { min: 0, max: 100_000_000 },
            km: RangeFilter { min: 0, max: 500_000 },
        })
    }

    fn controller(backend: InMemoryBackend) -> (TestController, Arc<InMemoryBackend>) {
        let backend = Arc::new(backend);
        let controller = Controller::new(Arc::clone(&backend), RecordingNavigator::default(), codec(), 24, Duration::from_secs(15));
        (controller, backend)
    }

    fn ids(controller: &TestController) -> Vec<String> {
        controller.store().vehicles().iter().map(|v| v.id.clone()).collect()
    }

    fn fiat() -> FilterSet {
        FilterSet { marca: BTreeSet::from(["Fiat".to_string()]), ..FilterSet::default() }
    }

    #[tokio::test]
    async fn initial_load_decodes_url_and_replaces_it_once() {
        let backend = InMemoryBackend::default().with_page(1, raw_page(&[("a", 10.0), ("b", 5.0)], true, Some(2)));
        let (mut controller, backend) = controller(backend);

        let ticket = controller.begin_initial("?marca=Peugeot&anio=2000,2024&sort=precio_asc&utm_source=x");
        assert_eq!(controller.state(), ControllerState::FetchingInitial);
        assert_eq!(controller.dispatch(ticket).await, CompletionOutcome::Applied);

        assert_eq!(controller.state(), ControllerState::Idle);
        assert_eq!(ids(&controller), vec!["a", "b"]);
        assert_eq!(controller.visible().iter().map(|v| v.id.as_str()).collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(
            controller.navigator().replacements,
            vec!["anio=2000,2024&marca=Peugeot&sort=precio_asc".to_string()]
        );
        assert_eq!(backend.calls()[0].1, 1);
    }

    #[tokio::test]
    async fn load_more_appends_without_duplicates() {
        let backend = InMemoryBackend::default()
            .with_page(1, raw_page(&[("a", 1.0), ("b", 2.0)], true, Some(2)))
            .with_page(2, raw_page(&[("b", 2.0), ("c", 3.0)], false, None));
        let (mut controller, _) = controller(backend);

        let ticket = controller.begin_initial("");
        controller.dispatch(ticket).await;
        let more = controller.load_more().unwrap();
        assert_eq!(more.cursor, 2);
        assert_eq!(controller.dispatch(more).await, CompletionOutcome::Applied);

        assert_eq!(ids(&controller), vec!["a", "b", "c"]);
        assert!(!controller.store().has_next_page());
        assert_eq!(controller.navigator().current(), Some("page=2"));
        assert!(matches!(controller.load_more(), Err(CatalogError::LoadMoreRejected(_))));
    }

    #[tokio::test]
    async fn second_load_more_while_pending_is_rejected() {
        let backend = InMemoryBackend::default().with_page(1, raw_page(&[("a", 1.0)], true, Some(2)));
        let (mut controller, _) = controller(backend);
        let ticket = controller.begin_initial("");
        controller.dispatch(ticket).await;

        let first = controller.load_more().unwrap();
        assert_eq!(controller.state(), ControllerState::FetchingMore);
        assert!(matches!(controller.load_more(), Err(CatalogError::LoadMoreRejected(_))));
        assert_eq!(controller.generation(), first.generation);
    }

    #[tokio::test]
    async fn filter_change_discards_in_flight_load_more() {
        let backend = InMemoryBackend::default()
            .with_page(1, raw_page(&[("a", 1.0), ("b", 2.0)], true, Some(2)))
            .with_page(2, raw_page(&[("c", 3.0)], true, Some(3)));
        let (mut controller, backend) = controller(backend);
        let ticket = controller.begin_initial("");
        controller.dispatch(ticket).await;

        let more = controller.load_more().unwrap();
        let more_response = controller.request(&more);

        let filtered = controller.apply_filters(fiat());
        assert_eq!(controller.state(), ControllerState::FetchingFiltered);
        backend.set_page(1, Ok(raw_page(&[("x", 9.0)], false, None)));
        let filtered_response = controller.request(&filtered).await;
        assert_eq!(controller.complete(filtered, filtered_response), CompletionOutcome::Applied);

        let late = more_response.await;
        assert!(late.is_ok());
        assert_eq!(controller.complete(more, late), CompletionOutcome::Stale);

        assert_eq!(ids(&controller), vec!["x"]);
        assert_eq!(controller.filters(), &fiat());
        assert_eq!(controller.navigator().current(), Some("marca=Fiat"));
    }

    #[tokio::test]
    async fn stale_response_arriving_first_is_still_discarded() {
        let (mut controller, _) = controller(InMemoryBackend::default());
        let first = controller.apply_filters(fiat());
        let second = controller.clear_filters();

        let outcome = controller.complete(first, Ok(raw_page(&[("old", 1.0)], true, Some(2))));
        assert_eq!(outcome, CompletionOutcome::Stale);
        assert_eq!(controller.state(), ControllerState::FetchingFiltered);
        assert!(controller.navigator().replacements.is_empty());

        controller.complete(second, Ok(raw_page(&[("new", 1.0)], false, None)));
        assert_eq!(ids(&controller), vec!["new"]);
        assert_eq!(controller.navigator().replacements, vec![String::new()]);
    }

    #[tokio::test]
    async fn network_failure_keeps_the_list_and_can_be_retried() {
        let backend = InMemoryBackend::default()
            .with_page(1, raw_page(&[("a", 1.0)], true, Some(2)));
        backend.set_page(2, Err(CatalogError::Network("connection reset".into())));
        let (mut controller, backend) = controller(backend);
        let ticket = controller.begin_initial("");
        controller.dispatch(ticket).await;

        let more = controller.load_more().unwrap();
        let outcome = controller.dispatch(more).await;
        assert!(matches!(outcome, CompletionOutcome::Failed(CatalogError::Network(_))));
        assert_eq!(controller.state(), ControllerState::Idle);
        assert_eq!(ids(&controller), vec!["a"]);
        assert!(controller.last_error().is_some_and(CatalogError::is_retryable));
        assert!(controller.view().error.is_some());
        assert_eq!(controller.navigator().replacements.len(), 1);

        backend.set_page(2, Ok(raw_page(&[("b", 2.0)], false, None)));
        let retry = controller.retry().unwrap();
        assert_eq!((retry.kind, retry.cursor), (FetchKind::More, 2));
        assert_eq!(controller.dispatch(retry).await, CompletionOutcome::Applied);
        assert_eq!(ids(&controller), vec!["a", "b"]);
        assert!(controller.last_error().is_none());
        assert!(controller.retry().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn load_more_timeout_fails_and_keeps_the_list() {
        let backend = InMemoryBackend::default()
            .with_page(1, raw_page(&[("a", 1.0), ("b", 2.0)], true, Some(2)))
            .with_page(2, raw_page(&[("c", 3.0)], false, None));
        backend.set_delay(2, Duration::from_secs(60));
        let (mut controller, backend) = controller(backend);
        let ticket = controller.begin_initial("");
        controller.dispatch(ticket).await;

        let more = controller.load_more().unwrap();
        let outcome = controller.dispatch(more).await;
        assert_eq!(outcome, CompletionOutcome::Failed(CatalogError::Timeout(Duration::from_secs(15))));
        assert_eq!(controller.state(), ControllerState::Idle);
        assert_eq!(ids(&controller), vec!["a", "b"]);
        assert!(controller.store().can_load_more());
        assert_eq!(controller.navigator().replacements.len(), 1);
        assert!(controller.last_error().is_some_and(CatalogError::is_retryable));

        backend.set_delay(2, Duration::ZERO);
        let retry = controller.retry().unwrap();
        assert_eq!(controller.dispatch(retry).await, CompletionOutcome::Applied);
        assert_eq!(ids(&controller), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn malformed_page_is_absorbed_as_empty() {
        let backend = InMemoryBackend::default().with_page(1, serde_json::json!({ "unexpected": true }));
        let (mut controller, _) = controller(backend);
        let ticket = controller.apply_filters(fiat());
        assert_eq!(controller.dispatch(ticket).await, CompletionOutcome::Applied);
        assert!(controller.store().is_empty());
        assert_eq!(controller.store().total_docs(), Some(0));
        assert!(!controller.store().can_load_more());
    }

    #[tokio::test]
    async fn sort_change_only_touches_the_url() {
        let backend = InMemoryBackend::default()
            .with_page(1, raw_page(&[("a", 300.0), ("b", 100.0), ("c", 200.0)], false, None));
        let (mut controller, backend) = controller(backend);
        let ticket = controller.apply_filters(fiat());
        controller.dispatch(ticket).await;
        let generation = controller.generation();

        controller.set_sort(SortKey::PriceDesc);
        assert_eq!(controller.state(), ControllerState::Idle);
        assert_eq!(controller.generation(), generation);
        assert_eq!(backend.calls().len(), 1);
        assert_eq!(controller.navigator().current(), Some("marca=Fiat&sort=precio_desc"));
        assert_eq!(controller.visible().iter().map(|v| v.id.as_str()).collect::<Vec<_>>(), vec!["a", "c", "b"]);
        // the store keeps the fetch order
        assert_eq!(ids(&controller), vec!["a", "b", "c"]);

        controller.set_sort(SortKey::None);
        assert_eq!(controller.navigator().current(), Some("marca=Fiat"));
    }

    #[tokio::test]
    async fn backend_cursor_that_does_not_advance_is_corrected() {
        let backend = InMemoryBackend::default()
            .with_page(1, raw_page(&[("a", 1.0)], true, Some(1)))
            .with_page(2, raw_page(&[("b", 1.0)], true, Some(2)));
        let (mut controller, backend) = controller(backend);
        let ticket = controller.begin_initial("");
        controller.dispatch(ticket).await;
        let more = controller.load_more().unwrap();
        controller.dispatch(more).await;
        let more = controller.load_more().unwrap();
        assert_eq!(more.cursor, 3);
        controller.dispatch(more).await;

        let cursors: Vec<u32> = backend.calls().iter().map(|(_, cursor)| *cursor).collect();
        assert_eq!(cursors, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn initial_load_starts_at_the_url_page() {
        let (mut controller, backend) = controller(InMemoryBackend::default());
        let ticket = controller.begin_initial("page=3&marca=Fiat");
        assert_eq!(ticket.cursor, 3);
        controller.dispatch(ticket).await;
        assert_eq!(backend.calls()[0], (fiat().at_page(3), 3));
        assert_eq!(controller.navigator().current(), Some("marca=Fiat&page=3"));
    }
}
