//! Calendar summary cache access
//!
//! The fast path answers simple calendar folder queries from a per-folder
//! summary cache instead of the index. This module defines the read-only
//! accessor the orchestrator consumes, the cached summary shapes, their
//! encoding into response elements, and an in-memory cache.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::element::Element;
use super::encoder::IdFormatter;
use super::types::{CalendarItem, EmailAddress, ItemType};
use crate::error::Result;

/// One cached occurrence
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceSummary {
    pub start: DateTime<Utc>,
    pub duration_ms: i64,
}

/// Cached summary of one calendar item over a time range
#[derive(Debug, Clone)]
pub struct CalendarItemSummary {
    pub id: u32,
    pub folder_id: u32,
    pub kind: ItemType,
    pub uid: String,
    pub name: String,
    pub location: Option<String>,
    pub organizer: Option<EmailAddress>,
    /// Occurrences inside the summary's range
    pub instances: Vec<InstanceSummary>,
}

impl CalendarItemSummary {
    /// Build a summary of `item` restricted to `[start, end)`; unset bounds are open
    pub fn for_range(
        item: &CalendarItem,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: item.id,
            folder_id: item.folder_id,
            kind: item.kind,
            uid: item.uid.clone(),
            name: item.name.clone(),
            location: item.location.clone(),
            organizer: item.organizer.clone(),
            instances: item
                .instances_in(start, end)
                .into_iter()
                .map(|inst| InstanceSummary {
                    start: inst.start,
                    duration_ms: inst.duration_ms,
                })
                .collect(),
        }
    }

    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// Encode as an `appt`/`task` element with one `inst` child per occurrence
    pub fn to_element(&self, ifmt: &IdFormatter) -> Element {
        let name = match self.kind {
            ItemType::Task => "task",
            _ => "appt",
        };
        let mut elem = Element::new(name);
        elem.add_attr("id", ifmt.format(self.id))
            .add_attr("l", ifmt.format(self.folder_id))
            .add_attr("uid", self.uid.clone())
            .add_attr("name", self.name.clone());
        if let Some(location) = &self.location {
            elem.add_attr("loc", location.clone());
        }
        if let Some(organizer) = &self.organizer {
            elem.add_element("or").add_attr("a", organizer.address.clone());
        }
        for inst in &self.instances {
            elem.add_element("inst")
                .add_attr("s", inst.start.timestamp_millis())
                .add_attr("dur", inst.duration_ms);
        }
        elem
    }
}

/// Cached summaries for one (folder, type, range)
#[derive(Debug, Clone, Default)]
pub struct CalendarSummary {
    pub items: Vec<CalendarItemSummary>,
}

impl CalendarSummary {
    /// Items with at least one occurrence in range, in cache order
    pub fn visible_items(&self) -> impl Iterator<Item = &CalendarItemSummary> {
        self.items.iter().filter(|item| item.num_instances() > 0)
    }
}

/// Read-only accessor to the calendar summary cache
#[async_trait]
pub trait CalendarSummarySource: Send + Sync {
    async fn get(
        &self,
        folder_id: u32,
        item_type: ItemType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<CalendarSummary>>;
}

/// Encode every visible item of a folder's summary into `parent`
pub fn encode_summary(parent: &mut Element, summary: &CalendarSummary, ifmt: &IdFormatter) -> usize {
    let mut encoded = 0;
    for item in summary.visible_items() {
        parent.add_child(item.to_element(ifmt));
        encoded += 1;
    }
    encoded
}

/// Calendar cache kept in memory, keyed by folder and item type
pub struct InMemoryCalendarCache {
    folders: RwLock<HashMap<(u32, ItemType), Vec<CalendarItem>>>,
}

impl InMemoryCalendarCache {
    pub fn new() -> Self {
        Self {
            folders: RwLock::new(HashMap::new()),
        }
    }

    /// Add or replace an item in its folder
    pub async fn put(&self, item: CalendarItem) {
        let mut folders = self.folders.write().await;
        let items = folders.entry((item.folder_id, item.kind)).or_default();
        match items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item,
            None => items.push(item),
        }
    }

    /// Drop a folder's cached items
    pub async fn invalidate(&self, folder_id: u32) {
        let mut folders = self.folders.write().await;
        folders.retain(|(folder, _), _| *folder != folder_id);
    }
}

impl Default for InMemoryCalendarCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CalendarSummarySource for InMemoryCalendarCache {
    async fn get(
        &self,
        folder_id: u32,
        item_type: ItemType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<CalendarSummary>> {
        let folders = self.folders.read().await;
        Ok(folders.get(&(folder_id, item_type)).map(|items| CalendarSummary {
            items: items
                .iter()
                .map(|item| CalendarItemSummary::for_range(item, Some(start), Some(end)))
                .collect(),
        }))
    }
}
