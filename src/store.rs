// Accumulated "load more" list for the current filter configuration.

use std::collections::HashSet;

use crate::models::{MappedPage, VehicleRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Number of previously unseen vehicles added to the end of the list.
    Appended { added: usize },
    /// The list had no continuation; nothing changed.
    Exhausted,
}

/// Ordered, deduplicated vehicle list plus the continuation state of the
/// last merged page. Owned and mutated by the controller only.
#[derive(Debug, Clone, Default)]
pub struct AccumulationStore {
    vehicles: Vec<VehicleRecord>,
    seen_ids: HashSet<String>,
    total_docs: Option<u64>,
    has_next_page: bool,
    next_page_cursor: Option<u32>,
}

impl AccumulationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh list from the first page of a filter configuration.
    pub fn replace(&mut self, page: MappedPage) {
        self.seen_ids.clear();
        self.vehicles = Vec::with_capacity(page.vehicles.len());
        for vehicle in page.vehicles {
            if self.seen_ids.insert(vehicle.id.clone()) {
                self.vehicles.push(vehicle);
            }
        }
        self.total_docs = page.total_docs;
        self.has_next_page = page.has_next_page;
        self.next_page_cursor = page.next_page_cursor;
    }

    /// Merges a follow-up page after the existing items. Ids already in the
    /// list are skipped; the continuation state always comes from `page`.
    pub fn append(&mut self, page: MappedPage) -> AppendOutcome {
        if !self.can_load_more() {
            tracing::debug!("Ignoring append on an exhausted list");
            return AppendOutcome::Exhausted;
        }

        let before = self.vehicles.len();
        for vehicle in page.vehicles {
            if self.seen_ids.insert(vehicle.id.clone()) {
                self.vehicles.push(vehicle);
            }
        }

        self.has_next_page = page.has_next_page;
        self.next_page_cursor = page.next_page_cursor;
        if page.total_docs.is_some() {
            self.total_docs = page.total_docs;
        }

        AppendOutcome::Appended { added: self.vehicles.len() - before }
    }

    pub fn can_load_more(&self) -> bool {
        self.has_next_page && self.next_page_cursor.is_some()
    }

    pub fn vehicles(&self) -> &[VehicleRecord] {
        &self.vehicles
    }

    pub fn total_docs(&self) -> Option<u64> {
        self.total_docs
    }

    pub fn has_next_page(&self) -> bool {
        self.has_next_page
    }

    pub fn next_page_cursor(&self) -> Option<u32> {
        self.next_page_cursor
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}
