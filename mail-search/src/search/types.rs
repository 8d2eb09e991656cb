//! Search types and data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::element::Element;

/// Mail item types a search can be restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Conversation,
    Message,
    Contact,
    Appointment,
    Task,
    Note,
    Document,
    Wiki,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Conversation => "conversation",
            ItemType::Message => "message",
            ItemType::Contact => "contact",
            ItemType::Appointment => "appointment",
            ItemType::Task => "task",
            ItemType::Note => "note",
            ItemType::Document => "document",
            ItemType::Wiki => "wiki",
        }
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conversation" => Ok(ItemType::Conversation),
            "message" => Ok(ItemType::Message),
            "contact" => Ok(ItemType::Contact),
            "appointment" => Ok(ItemType::Appointment),
            "task" => Ok(ItemType::Task),
            "note" => Ok(ItemType::Note),
            "document" => Ok(ItemType::Document),
            "wiki" => Ok(ItemType::Wiki),
            other => Err(format!("unknown item type: {}", other)),
        }
    }
}

/// Result ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortBy {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "dateDesc")]
    DateDesc,
    #[serde(rename = "dateAsc")]
    DateAsc,
    #[serde(rename = "subjAsc")]
    SubjectAsc,
    #[serde(rename = "subjDesc")]
    SubjectDesc,
    #[serde(rename = "nameAsc")]
    NameAsc,
    #[serde(rename = "nameDesc")]
    NameDesc,
    #[serde(rename = "score")]
    Score,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::None => "none",
            SortBy::DateDesc => "dateDesc",
            SortBy::DateAsc => "dateAsc",
            SortBy::SubjectAsc => "subjAsc",
            SortBy::SubjectDesc => "subjDesc",
            SortBy::NameAsc => "nameAsc",
            SortBy::NameDesc => "nameDesc",
            SortBy::Score => "score",
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(SortBy::None),
            "dateDesc" => Ok(SortBy::DateDesc),
            "dateAsc" => Ok(SortBy::DateAsc),
            "subjAsc" => Ok(SortBy::SubjectAsc),
            "subjDesc" => Ok(SortBy::SubjectDesc),
            "nameAsc" => Ok(SortBy::NameAsc),
            "nameDesc" => Ok(SortBy::NameDesc),
            "score" => Ok(SortBy::Score),
            other => Err(format!("unknown sort order: {}", other)),
        }
    }
}

/// Item identifier, optionally qualified by the owning account
///
/// String form is `"<account>:<id>"`, or just `"<id>"` for an item in the
/// requested mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId {
    pub account: Option<String>,
    pub id: u32,
}

impl ItemId {
    pub fn new(account: impl Into<String>, id: u32) -> Self {
        Self {
            account: Some(account.into()),
            id,
        }
    }

    pub fn local(id: u32) -> Self {
        Self { account: None, id }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.account {
            Some(account) => write!(f, "{}:{}", account, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

impl FromStr for ItemId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (account, id) = match s.rfind(':') {
            Some(pos) => (Some(&s[..pos]), &s[pos + 1..]),
            None => (None, s),
        };
        let id = id
            .parse::<u32>()
            .map_err(|_| format!("invalid item id: {}", s))?;
        match account {
            Some(a) if a.is_empty() => Err(format!("invalid item id: {}", s)),
            Some(a) => Ok(ItemId::new(a, id)),
            None => Ok(ItemId::local(id)),
        }
    }
}

impl TryFrom<String> for ItemId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ItemId> for String {
    fn from(value: ItemId) -> Self {
        value.to_string()
    }
}

/// Which hits get their full content inlined in the response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpandResults {
    #[default]
    None,
    First,
    All,
    /// Not meaningful for search; treated as `None`
    Hits,
    Id(ItemId),
}

impl ExpandResults {
    /// Whether an explicitly named item matches this hit
    ///
    /// An unqualified id matches any account.
    pub fn matches(&self, item: &ItemId) -> bool {
        match self {
            ExpandResults::Id(wanted) => {
                wanted.id == item.id
                    && (wanted.account.is_none() || wanted.account == item.account)
            }
            _ => false,
        }
    }
}

/// Parsed search request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    /// Query text
    pub query: String,
    /// Requested item types (empty = engine default)
    pub types: Vec<ItemType>,
    /// Requested sort order, `None` when unset
    pub sort_by: Option<SortBy>,
    /// Number of hits to skip
    pub offset: usize,
    /// Maximum hits to return (0 = unbounded)
    pub limit: usize,
    /// Calendar instance expansion start
    pub expand_start: Option<DateTime<Utc>>,
    /// Calendar instance expansion end (exclusive)
    pub expand_end: Option<DateTime<Utc>>,
    /// Inline expansion policy
    pub inline: ExpandResults,
    /// Mark inlined unread messages as read
    pub mark_read: bool,
    pub want_recipients: bool,
    pub want_html: bool,
    pub neuter_images: bool,
    /// Attach a size estimate to the response
    pub estimate_size: bool,
    /// Truncate inlined bodies to this many bytes
    pub max_inlined_length: Option<usize>,
    /// Extra headers to include on inlined messages
    pub inlined_headers: Vec<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn types_str(&self) -> String {
        self.types
            .iter()
            .map(ItemType::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn sort_by_str(&self) -> &'static str {
        self.sort_by.unwrap_or(SortBy::None).as_str()
    }
}

/// An e-mail address as it appears on a message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub address: String,
    pub display: Option<String>,
}

impl EmailAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            display: None,
        }
    }
}

/// Message as stored in the mailbox
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageItem {
    pub id: u32,
    pub folder_id: u32,
    pub conversation_id: u32,
    pub date: DateTime<Utc>,
    pub size: u64,
    pub from: EmailAddress,
    pub to: Vec<EmailAddress>,
    pub subject: String,
    pub fragment: String,
    pub body: String,
    pub html_body: Option<String>,
    pub headers: Vec<(String, String)>,
    pub unread: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationItem {
    pub id: u32,
    pub subject: String,
    pub fragment: String,
    pub date: DateTime<Utc>,
    pub message_count: u32,
    pub unread_count: u32,
    pub participants: Vec<EmailAddress>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactItem {
    pub id: u32,
    pub folder_id: u32,
    pub file_as: String,
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteItem {
    pub id: u32,
    pub folder_id: u32,
    pub content: String,
    pub color: u8,
    pub date: DateTime<Utc>,
}

/// One occurrence of a calendar item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub start: DateTime<Utc>,
    pub duration_ms: i64,
}

impl Instance {
    pub fn end(&self) -> DateTime<Utc> {
        self.start + chrono::Duration::milliseconds(self.duration_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarItem {
    pub id: u32,
    pub folder_id: u32,
    /// `Appointment` or `Task`
    pub kind: ItemType,
    pub uid: String,
    pub name: String,
    pub location: Option<String>,
    pub organizer: Option<EmailAddress>,
    pub instances: Vec<Instance>,
}

impl CalendarItem {
    /// Instances overlapping `[start, end)`; an unset bound is open
    pub fn instances_in(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Vec<&Instance> {
        self.instances
            .iter()
            .filter(|inst| {
                let after_start = start.map_or(true, |s| inst.end() > s || inst.start >= s);
                let before_end = end.map_or(true, |e| inst.start < e);
                after_start && before_end
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentItem {
    pub id: u32,
    pub folder_id: u32,
    /// `Document` or `Wiki`; anything else is a corrupt hit
    pub kind: ItemType,
    pub name: String,
    pub content_type: String,
    pub size: u64,
    pub version: u32,
    pub last_modified_by: String,
    pub modified: DateTime<Utc>,
}

/// Fields shared by every hit
#[derive(Debug, Clone, Default)]
pub struct HitInfo {
    /// Owning account
    pub account_id: String,
    pub item_id: u32,
    /// Relevance score, 0 = no score
    pub score: f32,
    /// Sort keys
    pub date: i64,
    pub subject: String,
    pub name: String,
}

impl HitInfo {
    pub fn new(account_id: impl Into<String>, item_id: u32) -> Self {
        Self {
            account_id: account_id.into(),
            item_id,
            ..Default::default()
        }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ConversationHit {
    pub info: HitInfo,
    pub conversation: ConversationItem,
    pub message_hits: Vec<MessageHit>,
}

#[derive(Debug, Clone)]
pub struct MessageHit {
    pub info: HitInfo,
    pub message: MessageItem,
    /// Names of matched MIME parts
    pub matched_parts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MessagePartHit {
    pub info: HitInfo,
    pub message: MessageItem,
    pub part: String,
    pub content_type: String,
    pub filename: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ContactHit {
    pub info: HitInfo,
    pub contact: ContactItem,
}

#[derive(Debug, Clone)]
pub struct NoteHit {
    pub info: HitInfo,
    pub note: NoteItem,
}

#[derive(Debug, Clone)]
pub struct ProxiedHit {
    pub info: HitInfo,
    /// Fragment already rendered by the remote mailbox
    pub element: Element,
}

#[derive(Debug, Clone)]
pub struct CalendarItemHit {
    pub info: HitInfo,
    pub item: CalendarItem,
}

#[derive(Debug, Clone)]
pub struct DocumentHit {
    pub info: HitInfo,
    pub document: DocumentItem,
}

/// A matched item returned by the query engine
#[derive(Debug, Clone)]
pub enum Hit {
    Conversation(ConversationHit),
    Message(MessageHit),
    MessagePart(MessagePartHit),
    Contact(ContactHit),
    Note(NoteHit),
    Proxied(ProxiedHit),
    CalendarItem(CalendarItemHit),
    Document(DocumentHit),
    /// A hit kind this layer does not know how to encode
    Unknown { kind: String, info: HitInfo },
}

impl Hit {
    pub fn info(&self) -> &HitInfo {
        match self {
            Hit::Conversation(h) => &h.info,
            Hit::Message(h) => &h.info,
            Hit::MessagePart(h) => &h.info,
            Hit::Contact(h) => &h.info,
            Hit::Note(h) => &h.info,
            Hit::Proxied(h) => &h.info,
            Hit::CalendarItem(h) => &h.info,
            Hit::Document(h) => &h.info,
            Hit::Unknown { info, .. } => info,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Hit::Conversation(_) => "conversation",
            Hit::Message(_) => "message",
            Hit::MessagePart(_) => "messagepart",
            Hit::Contact(_) => "contact",
            Hit::Note(_) => "note",
            Hit::Proxied(_) => "proxied",
            Hit::CalendarItem(_) => "calendaritem",
            Hit::Document(_) => "document",
            Hit::Unknown { kind, .. } => kind,
        }
    }

    pub fn score(&self) -> f32 {
        self.info().score
    }

    pub fn item_id(&self) -> ItemId {
        let info = self.info();
        ItemId::new(info.account_id.clone(), info.item_id)
    }

    /// The value this hit is ordered by under `sort`
    ///
    /// Unsorted results carry the date, which is the mailbox's natural order.
    pub fn sort_field(&self, sort: SortBy) -> String {
        let info = self.info();
        match sort {
            SortBy::None | SortBy::DateAsc | SortBy::DateDesc => info.date.to_string(),
            SortBy::SubjectAsc | SortBy::SubjectDesc => info.subject.clone(),
            SortBy::NameAsc | SortBy::NameDesc => info.name.clone(),
            SortBy::Score => info.score.to_string(),
        }
    }
}
