//! Remote mailbox federation
//!
//! Folders named in a fast path query may live in other accounts, either
//! because the id is qualified (`acct:folder`) or because the local folder
//! is a mountpoint. Folders are grouped by owning account; each remote
//! account gets one synthetic sub-request whose result elements are spliced
//! into the local response.
//!
//! Remote calls are blocking from the caller's point of view and carry no
//! timeout of their own. Deadlines belong to the transport or the layer
//! that owns the whole request.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::element::Element;
use super::types::{ItemId, SearchRequest};
use crate::config::FederationConfig;
use crate::error::{Result, SearchError};

/// Folder ids partitioned by owning account
///
/// Local folders come first; remote accounts keep the order in which they
/// were first seen. Folder order inside each bucket follows the input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FolderGroup {
    local: Vec<u32>,
    remote: Vec<(String, Vec<u32>)>,
}

impl FolderGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_local(&mut self, folder_id: u32) {
        self.local.push(folder_id);
    }

    pub fn add_remote(&mut self, account_id: &str, folder_id: u32) {
        match self.remote.iter_mut().find(|(acct, _)| acct == account_id) {
            Some((_, folders)) => folders.push(folder_id),
            None => self.remote.push((account_id.to_string(), vec![folder_id])),
        }
    }

    pub fn local(&self) -> &[u32] {
        &self.local
    }

    pub fn remote(&self) -> &[(String, Vec<u32>)] {
        &self.remote
    }

    /// Total number of folders across all buckets
    pub fn len(&self) -> usize {
        self.local.len() + self.remote.iter().map(|(_, f)| f.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolves folder ids to the accounts that own them
#[async_trait]
pub trait FolderResolver: Send + Sync {
    async fn group_folders_by_account(&self, folders: &[ItemId]) -> Result<FolderGroup>;
}

/// Resolver backed by a static mountpoint table
pub struct MountTableResolver {
    local_account: String,
    mounts: HashMap<u32, ItemId>,
}

impl MountTableResolver {
    pub fn new(local_account: impl Into<String>) -> Self {
        Self {
            local_account: local_account.into(),
            mounts: HashMap::new(),
        }
    }

    pub fn from_config(config: &FederationConfig) -> Self {
        Self::for_account(&config.local_account, config)
    }

    /// Configured mountpoints, resolved relative to `account` instead of
    /// the configured local account
    pub fn for_account(account: &str, config: &FederationConfig) -> Self {
        let mut resolver = Self::new(account);
        for mount in &config.mountpoints {
            resolver = resolver.with_mount(
                mount.folder_id,
                ItemId::new(mount.owner_account.clone(), mount.remote_folder_id),
            );
        }
        resolver
    }

    /// Register a local folder that points at `target`
    pub fn with_mount(mut self, folder_id: u32, target: ItemId) -> Self {
        self.mounts.insert(folder_id, target);
        self
    }
}

#[async_trait]
impl FolderResolver for MountTableResolver {
    async fn group_folders_by_account(&self, folders: &[ItemId]) -> Result<FolderGroup> {
        let mut group = FolderGroup::new();
        for folder in folders {
            match folder.account.as_deref() {
                Some(account) if account != self.local_account => {
                    group.add_remote(account, folder.id);
                }
                _ => match self.mounts.get(&folder.id) {
                    Some(ItemId {
                        account: Some(owner),
                        id,
                    }) if *owner != self.local_account => group.add_remote(owner, *id),
                    Some(target) => group.add_local(target.id),
                    None => group.add_local(folder.id),
                },
            }
        }
        Ok(group)
    }
}

/// A mailbox hosted on another server
#[async_trait]
pub trait RemoteMailbox: Send + Sync {
    /// Send a `SearchRequest` element on behalf of `account_id` and return
    /// the remote `SearchResponse` element
    async fn invoke(&self, account_id: &str, request: &Element) -> Result<Element>;
}

/// Build the sub-request sent to a remote account for its folders
pub fn build_sub_request(request: &SearchRequest, folder_ids: &[u32]) -> Element {
    let query = folder_ids
        .iter()
        .map(|id| format!("inid:{}", id))
        .collect::<Vec<_>>()
        .join(" OR ");

    let mut req = Element::new("SearchRequest");
    req.add_attr("types", request.types_str())
        .add_attr("sortBy", request.sort_by_str())
        .add_attr("offset", request.offset);
    if request.limit != 0 {
        req.add_attr("limit", request.limit);
    }
    if let Some(start) = request.expand_start {
        req.add_attr("calExpandInstStart", start.timestamp_millis());
    }
    if let Some(end) = request.expand_end {
        req.add_attr("calExpandInstEnd", end.timestamp_millis());
    }
    req.add_text_element("query", query);
    req
}

/// Issues sub-requests to remote accounts and splices in their results
pub struct RemoteFederator {
    remote: Arc<dyn RemoteMailbox>,
}

impl RemoteFederator {
    pub fn new(remote: Arc<dyn RemoteMailbox>) -> Self {
        Self { remote }
    }

    /// Query `folder_ids` in `account_id` and move every top-level element
    /// of the remote response into `parent`. Returns the number moved.
    pub async fn federate(
        &self,
        parent: &mut Element,
        account_id: &str,
        folder_ids: &[u32],
        request: &SearchRequest,
    ) -> Result<usize> {
        let sub_request = build_sub_request(request, folder_ids);
        debug!(
            "Federating {} folder(s) to account {}",
            folder_ids.len(),
            account_id
        );

        let mut response = self.remote.invoke(account_id, &sub_request).await?;
        let hits = response.take_children();
        let count = hits.len();
        for hit in hits {
            parent.add_child(hit);
        }
        Ok(count)
    }
}

/// Remote mailbox reached over HTTP with JSON-encoded elements
pub struct HttpRemoteMailbox {
    endpoints: HashMap<String, String>,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl HttpRemoteMailbox {
    pub fn new(endpoints: HashMap<String, String>) -> Self {
        Self {
            endpoints,
            auth_token: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &FederationConfig) -> Self {
        let mut remote = Self::new(config.endpoints.clone());
        remote.auth_token = config.auth_token.clone();
        remote
    }

    pub fn with_auth_token(mut self, token: String) -> Self {
        self.auth_token = Some(token);
        self
    }

    fn search_url(&self, account_id: &str) -> Result<String> {
        let base = self.endpoints.get(account_id).ok_or_else(|| {
            SearchError::Remote(format!("no endpoint configured for account {}", account_id))
        })?;
        Ok(format!("{}/service/search", base.trim_end_matches('/')))
    }
}

#[async_trait]
impl RemoteMailbox for HttpRemoteMailbox {
    async fn invoke(&self, account_id: &str, request: &Element) -> Result<Element> {
        let url = self.search_url(account_id)?;
        debug!("Sending remote search to {}", url);

        let mut builder = self
            .client
            .post(&url)
            .header("X-Target-Account", account_id)
            .json(request);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!("Remote search failed with status {}: {}", status, error_text);
            return Err(SearchError::Remote(format!(
                "{} returned {}: {}",
                account_id, status, error_text
            )));
        }

        Ok(response.json::<Element>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::types::{ItemType, SortBy};
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_grouping_partitions_folders() {
        let resolver = MountTableResolver::new("acct-a")
            .with_mount(300, ItemId::new("acct-b", 10))
            .with_mount(301, ItemId::new("acct-a", 50));

        let folders = vec![
            ItemId::local(10),
            ItemId::local(300),
            ItemId::new("acct-c", 7),
            ItemId::new("acct-a", 11),
            ItemId::local(301),
            ItemId::new("acct-b", 12),
        ];
        let group = resolver.group_folders_by_account(&folders).await.unwrap();

        assert_eq!(group.local(), &[10, 11, 50]);
        assert_eq!(
            group.remote(),
            &[
                ("acct-b".to_string(), vec![10, 12]),
                ("acct-c".to_string(), vec![7]),
            ]
        );
        assert_eq!(group.len(), folders.len());
    }

    #[tokio::test]
    async fn test_resolver_for_searched_account() {
        let config = FederationConfig {
            local_account: "acct-a".to_string(),
            mountpoints: vec![crate::config::MountpointConfig {
                folder_id: 300,
                owner_account: "acct-x".to_string(),
                remote_folder_id: 9,
            }],
            ..Default::default()
        };
        let resolver = MountTableResolver::for_account("acct-x", &config);

        let folders = vec![ItemId::new("acct-x", 5), ItemId::local(300), ItemId::new("acct-a", 6)];
        let group = resolver.group_folders_by_account(&folders).await.unwrap();

        assert_eq!(group.local(), &[5, 9]);
        assert_eq!(group.remote(), &[("acct-a".to_string(), vec![6])]);
    }

    #[test]
    fn test_sub_request_shape() {
        let request = SearchRequest {
            query: "inid:300 OR inid:301".to_string(),
            types: vec![ItemType::Appointment],
            sort_by: Some(SortBy::None),
            limit: 50,
            expand_start: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            expand_end: Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()),
            ..Default::default()
        };

        let req = build_sub_request(&request, &[10, 12]);
        assert_eq!(req.name, "SearchRequest");
        assert_eq!(req.attr_str("types"), Some("appointment"));
        assert_eq!(req.attr_str("sortBy"), Some("none"));
        assert_eq!(req.attr("offset").and_then(|v| v.as_u64()), Some(0));
        assert_eq!(req.attr("limit").and_then(|v| v.as_u64()), Some(50));
        assert_eq!(
            req.attr("calExpandInstStart").and_then(|v| v.as_i64()),
            Some(1_704_067_200_000)
        );
        assert_eq!(
            req.first_child("query").and_then(|q| q.content.as_deref()),
            Some("inid:10 OR inid:12")
        );
    }

    #[test]
    fn test_sub_request_omits_unbounded_limit() {
        let request = SearchRequest::new("inid:1");
        let req = build_sub_request(&request, &[1]);
        assert!(req.attr("limit").is_none());
    }

    #[test]
    fn test_missing_endpoint_is_remote_error() {
        let remote = HttpRemoteMailbox::new(HashMap::new());
        assert!(matches!(remote.search_url("acct-x"), Err(SearchError::Remote(_))));

        let remote = HttpRemoteMailbox::new(HashMap::from([(
            "acct-b".to_string(),
            "https://mail-b.example.com/".to_string(),
        )]));
        assert_eq!(
            remote.search_url("acct-b").unwrap(),
            "https://mail-b.example.com/service/search"
        );
    }
}
