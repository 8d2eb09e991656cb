//! Mailbox write access needed by search
//!
//! Search is read-only except for marking inlined messages read.

use async_trait::async_trait;
use thiserror::Error;

use super::types::ItemId;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("no such item: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Other(String),
}

/// Mailbox item store
#[async_trait]
pub trait MailboxStore: Send + Sync {
    /// Clear the unread flag on a message
    async fn mark_read(&self, item: &ItemId) -> std::result::Result<(), StoreError>;
}
