//! Search request handling
//!
//! Entry point for a parsed search request. Simple calendar folder queries
//! are answered from the calendar summary cache (federating folders owned
//! by other accounts); everything else runs through the query engine and
//! the hit encoder.

use std::sync::Arc;

use tracing::instrument::WithSubscriber;
use tracing::{debug, info_span, Dispatch, Instrument};

use super::calendar::{encode_summary, CalendarSummarySource};
use super::detector::FastPathDetector;
use super::element::Element;
use super::encoder::{HitEncoder, IdFormatter};
use super::engine::{QueryEngine, QueryExecutor};
use super::federation::{FolderResolver, RemoteFederator, RemoteMailbox};
use super::mailbox::MailboxStore;
use super::stream::{ResultStream, ResultsPager};
use super::types::{ItemId, ItemType, SearchRequest};
use crate::error::{Result, SearchError};

/// Collaborators a search needs
pub struct SearchServices {
    pub engine: Arc<dyn QueryEngine>,
    pub calendar: Arc<dyn CalendarSummarySource>,
    pub folders: Arc<dyn FolderResolver>,
    pub remote: Arc<dyn RemoteMailbox>,
    pub mailbox: Arc<dyn MailboxStore>,
}

/// Coordinates one mailbox's search requests
pub struct SearchOrchestrator {
    executor: QueryExecutor,
    calendar: Arc<dyn CalendarSummarySource>,
    folders: Arc<dyn FolderResolver>,
    federator: RemoteFederator,
    mailbox: Arc<dyn MailboxStore>,
    ifmt: IdFormatter,
    calendar_cache_enabled: bool,
    dispatch: Option<Dispatch>,
}

impl SearchOrchestrator {
    /// Orchestrator for `account`, searched by its own owner
    pub fn new(services: SearchServices, account: &str) -> Self {
        Self {
            executor: QueryExecutor::new(services.engine),
            calendar: services.calendar,
            folders: services.folders,
            federator: RemoteFederator::new(services.remote),
            mailbox: services.mailbox,
            ifmt: IdFormatter::same_account(account),
            calendar_cache_enabled: true,
            dispatch: None,
        }
    }

    /// Searches are made on behalf of a different (delegated) account
    pub fn with_authenticated_account(mut self, authenticated: &str) -> Self {
        self.ifmt = IdFormatter::new(self.ifmt.requested_account().to_string(), authenticated);
        self
    }

    pub fn with_calendar_cache(mut self, enabled: bool) -> Self {
        self.calendar_cache_enabled = enabled;
        self
    }

    /// Route this orchestrator's log events to `dispatch` instead of the
    /// process default
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Run a search and build the `SearchResponse` element
    pub async fn search(&self, request: &SearchRequest) -> Result<Element> {
        self.dispatched(request, false).await
    }

    /// Like [`search`](Self::search), but every encoded hit also carries its
    /// fully qualified `account:id`
    pub async fn search_with_mailbox_info(&self, request: &SearchRequest) -> Result<Element> {
        self.dispatched(request, true).await
    }

    async fn dispatched(&self, request: &SearchRequest, include_mailbox: bool) -> Result<Element> {
        match &self.dispatch {
            Some(dispatch) => {
                self.instrumented(request, include_mailbox)
                    .with_subscriber(dispatch.clone())
                    .await
            }
            None => self.instrumented(request, include_mailbox).await,
        }
    }

    async fn instrumented(&self, request: &SearchRequest, include_mailbox: bool) -> Result<Element> {
        let span = info_span!("search", account = %self.ifmt.requested_account());
        self.run(request, include_mailbox).instrument(span).await
    }

    async fn run(&self, request: &SearchRequest, include_mailbox: bool) -> Result<Element> {
        if self.calendar_cache_enabled {
            if let Some(folder_ids) = FastPathDetector::detect(request) {
                debug!("Answering from calendar cache for {} folder(s)", folder_ids.len());
                return self.run_calendar_query(request, &folder_ids).await;
            }
        }

        // Released when `results` goes out of scope, on every path
        let mut results = self.executor.execute(request).await?;

        let mut response = Element::new("SearchResponse");
        // The engine may not honour the requested order; report what it used
        response
            .add_attr("sortBy", results.stream().sort_by().as_str())
            .add_attr("offset", request.offset);

        {
            let mut pager = ResultsPager::new(results.stream_mut(), request.offset);
            let encoder = HitEncoder::new(request, &self.ifmt, self.mailbox.as_ref(), include_mailbox);
            encoder.put_hits(&mut response, &mut pager).await?;
        }

        // Some info entries are only known once hits have been read
        put_info(&mut response, request, results.stream());

        Ok(response)
    }

    async fn run_calendar_query(&self, request: &SearchRequest, folder_ids: &[String]) -> Result<Element> {
        let item_type = match request.types.as_slice() {
            [single] => *single,
            _ => ItemType::Appointment,
        };
        let (Some(start), Some(end)) = (request.expand_start, request.expand_end) else {
            return Err(SearchError::Failure(
                "calendar query without expansion range".to_string(),
            ));
        };

        let mut response = Element::new("SearchResponse");
        response
            .add_attr("sortBy", request.sort_by_str())
            .add_attr("offset", request.offset)
            .add_attr("more", false);

        let folders = folder_ids
            .iter()
            .map(|id| id.parse::<ItemId>().map_err(SearchError::Failure))
            .collect::<Result<Vec<_>>>()?;
        let group = self.folders.group_folders_by_account(&folders).await?;

        for &folder_id in group.local() {
            if let Some(summary) = self.calendar.get(folder_id, item_type, start, end).await? {
                let encoded = encode_summary(&mut response, &summary, &self.ifmt);
                debug!("Folder {}: {} calendar item(s) from cache", folder_id, encoded);
            }
        }

        for (account_id, remote_folders) in group.remote() {
            self.federator
                .federate(&mut response, account_id, remote_folders, request)
                .await?;
        }

        Ok(response)
    }
}

/// Append the `info` block: size estimate then engine info entries
fn put_info(response: &mut Element, request: &SearchRequest, stream: &dyn ResultStream) {
    let query_info = stream.result_info();
    if query_info.is_empty() && !request.estimate_size {
        return;
    }

    let mut size_estimate = Element::new("sizeEstimate");
    match stream.estimate_size() {
        Ok(size) => {
            size_estimate.add_attr("value", size);
        }
        Err(e) => debug!("Size estimate unavailable: {}", e),
    }

    let info = response.add_element("info");
    info.add_child(size_estimate);
    for entry in &query_info {
        info.add_child(entry.to_element());
    }
}
