use std::{fmt, path::PathBuf};

use crate::{
    api::{ParcelApi, SearchResponse},
    map::{MapEvent, MapFrame},
    parcel::{lot_plan::split_inputs, region::Region},
};

use super::{
    download::DownloadSink,
    export::{build_request, ExportFormat, ExportRequest},
    feature_store::FeatureStore,
    style::{StyleConfig, StylePatch, StyleStorage, StyleStore},
};

/// Where the session is in the search/export flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Searching,
    ResultsLoaded,
    SearchFailed,
    Exporting,
    ExportComplete,
    ExportFailed,
}

/// Sequence number of a search request. Only the most recently issued ticket may apply its
/// results, older responses are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SearchTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            NoticeLevel::Info => write!(f, "{}", self.message),
            NoticeLevel::Error => write!(f, "Error: {}", self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Nothing to search for, no request was made.
    Skipped,
    Loaded { count: usize },
    Failed,
    /// A newer search was issued in the meantime, the response was discarded.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Saved(PathBuf),
    Failed,
}

/// Application state: the search results, the selection, the style and the backend they come
/// from. The single owner of all of it; maps and lists only get derived views.
pub struct Session<A: ParcelApi, S: StyleStorage> {
    api: A,
    store: FeatureStore,
    regions: Vec<Region>,
    style: StyleStore<S>,
    phase: Phase,
    issued_tickets: u64,
    pending_search: Option<SearchTicket>,
    notices: Vec<Notice>,
}

impl<A: ParcelApi, S: StyleStorage> Session<A, S> {
    pub fn new(api: A, style_storage: S) -> Self {
        Self {
            api,
            store: FeatureStore::new(),
            regions: Vec::new(),
            style: StyleStore::open(style_storage),
            phase: Phase::Idle,
            issued_tickets: 0,
            pending_search: None,
            notices: Vec::new(),
        }
    }

    fn notify(&mut self, level: NoticeLevel, message: String) {
        match level {
            NoticeLevel::Info => log::info!("{}", message),
            NoticeLevel::Error => log::error!("{}", message),
        }
        self.notices.push(Notice { level, message });
    }

    /// Parse raw multi-line input and issue a search ticket. `None` when there is nothing to
    /// search for.
    pub fn begin_search(&mut self, raw: &str) -> Option<(SearchTicket, Vec<String>)> {
        let inputs = split_inputs(raw);
        if inputs.is_empty() {
            log::debug!("Empty search input, nothing to do");
            return None;
        }
        self.issued_tickets += 1;
        let ticket = SearchTicket(self.issued_tickets);
        self.pending_search = Some(ticket);
        self.phase = Phase::Searching;
        log::info!("Searching for {} parcel identifiers", inputs.len());
        Some((ticket, inputs))
    }

    /// Apply the response of a search. A failed search keeps the previous results on screen.
    pub fn complete_search(
        &mut self,
        ticket: SearchTicket,
        result: anyhow::Result<SearchResponse>,
    ) -> SearchOutcome {
        if self.pending_search != Some(ticket) {
            log::warn!(
                "Discarding response to search {:?}, latest is {:?}",
                ticket,
                self.pending_search
            );
            return SearchOutcome::Stale;
        }
        self.pending_search = None;

        match result {
            Ok(response) => {
                let count = response.features.len();
                self.regions = response.regions;
                self.store.replace_features(response.features);
                self.phase = Phase::ResultsLoaded;
                self.notify(NoticeLevel::Info, format!("Found {} parcels", count));
                SearchOutcome::Loaded { count }
            }
            Err(err) => {
                self.phase = Phase::SearchFailed;
                self.notify(NoticeLevel::Error, format!("Search failed: {:#}", err));
                SearchOutcome::Failed
            }
        }
    }

    /// Search for the identifiers in `raw`, one per line.
    pub fn search(&mut self, raw: &str) -> SearchOutcome {
        let (ticket, inputs) = match self.begin_search(raw) {
            Some(issued) => issued,
            None => return SearchOutcome::Skipped,
        };
        let result = self.api.search(&inputs);
        self.complete_search(ticket, result)
    }

    /// Flip the selection of a result row.
    pub fn toggle(&mut self, index: usize) {
        self.store.toggle(index);
    }

    pub fn handle_map_event(&mut self, event: MapEvent) {
        match event {
            MapEvent::FeatureClicked { generation, index } => {
                self.store.toggle_in(generation, index)
            }
        }
    }

    /// Merge a style change and persist it. A failed write is reported, the change still applies
    /// to this session.
    pub fn update_style(&mut self, patch: &StylePatch) {
        if let Err(err) = self.style.update(patch) {
            self.notify(
                NoticeLevel::Error,
                format!("Could not save style: {:#}", err),
            );
        }
    }

    pub fn build_export(
        &self,
        format: ExportFormat,
        folder_name: &str,
        file_name: &str,
    ) -> ExportRequest {
        build_request(
            &self.store,
            self.style.current(),
            format,
            folder_name,
            file_name,
        )
    }

    /// Send an export request and hand a successful body to `sink`. Failures are reported and
    /// leave the results and selection untouched.
    pub fn submit(
        &mut self,
        request: &ExportRequest,
        sink: &mut dyn DownloadSink,
    ) -> ExportOutcome {
        if request.features.is_empty() {
            self.phase = Phase::ExportFailed;
            self.notify(NoticeLevel::Error, "Nothing to export".to_string());
            return ExportOutcome::Failed;
        }
        self.phase = Phase::Exporting;
        log::info!(
            "Exporting {} parcels as {}",
            request.features.len(),
            request.format
        );

        let payload = match self.api.export(request) {
            Ok(payload) => payload,
            Err(err) => {
                self.phase = Phase::ExportFailed;
                self.notify(NoticeLevel::Error, format!("Export failed: {:#}", err));
                return ExportOutcome::Failed;
            }
        };
        match sink.deliver(&request.file_name, &payload) {
            Ok(saved) => {
                self.phase = Phase::ExportComplete;
                self.notify(NoticeLevel::Info, format!("Saved {:?}", saved));
                ExportOutcome::Saved(saved)
            }
            Err(err) => {
                self.phase = Phase::ExportFailed;
                self.notify(
                    NoticeLevel::Error,
                    format!("Could not save download: {:#}", err),
                );
                ExportOutcome::Failed
            }
        }
    }

    /// Build and submit an export in one go.
    pub fn export(
        &mut self,
        format: ExportFormat,
        folder_name: &str,
        file_name: &str,
        sink: &mut dyn DownloadSink,
    ) -> ExportOutcome {
        let request = self.build_export(format, folder_name, file_name);
        self.submit(&request, sink)
    }

    /// The current state as a map would draw it.
    pub fn frame(&self) -> MapFrame {
        MapFrame::new(&self.store, self.style.current())
    }

    pub fn store(&self) -> &FeatureStore {
        &self.store
    }

    /// Region of each feature as reported by the search backend, or inferred from the schema.
    pub fn region_of(&self, index: usize) -> Option<Region> {
        let feature = self.store.features().get(index)?;
        Some(
            self.regions
                .get(index)
                .copied()
                .unwrap_or_else(|| Region::infer(std::slice::from_ref(feature))),
        )
    }

    pub fn style(&self) -> &StyleConfig {
        self.style.current()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }
}
