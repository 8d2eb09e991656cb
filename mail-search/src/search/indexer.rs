//! Message index using Tantivy
//!
//! Stores message summaries for one mailbox account and serves them as a
//! [`QueryEngine`]. Folder restrictions use the `inid` field, so calendar
//! style `inid:<folder>` queries also work against the index.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tantivy::{
    collector::{Count, TopDocs},
    directory::MmapDirectory,
    doc,
    query::{AllQuery, BooleanQuery, Occur, Query, QueryParser, QueryParserError, TermQuery},
    schema::{
        Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, FAST, INDEXED,
        STORED, STRING,
    },
    tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer},
    DocAddress, Index, IndexReader, IndexSettings, IndexWriter, Order, ReloadPolicy,
    TantivyDocument, Term,
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::engine::{EngineError, ParseToken, QueryEngine};
use super::mailbox::{MailboxStore, StoreError};
use super::stream::{ResultStream, VecResultStream};
use super::types::{EmailAddress, Hit, HitInfo, ItemId, ItemType, MessageHit, MessageItem, SearchRequest, SortBy};
use crate::error::{Result, SearchError};

const FRAGMENT_LEN: usize = 150;

/// Schema fields for message documents
pub struct MessageFields {
    pub key: Field,
    pub account: Field,
    pub item_id: Field,
    pub folder_id: Field,
    pub conversation_id: Field,
    pub from: Field,
    pub to: Field,
    pub subject: Field,
    pub body: Field,
    pub date: Field,
    pub size: Field,
    pub unread: Field,
}

/// A message as written to the index
#[derive(Debug, Clone)]
pub struct IndexedMessage {
    pub account: String,
    pub id: u32,
    pub folder_id: u32,
    pub conversation_id: u32,
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub date: DateTime<Utc>,
    pub size: u64,
    pub unread: bool,
}

impl IndexedMessage {
    /// Parse a raw RFC 822 message
    pub fn from_eml(account: &str, folder_id: u32, id: u32, content: &[u8]) -> Option<Self> {
        let parsed = mail_parser::MessageParser::default().parse(content)?;

        let from = parsed
            .from()
            .and_then(|f| f.first())
            .map(|a| a.address().map(|s| s.to_string()).unwrap_or_default())
            .unwrap_or_default();

        let to = parsed
            .to()
            .map(|t| {
                t.iter()
                    .filter_map(|a| a.address().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let date = parsed
            .date()
            .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
            .unwrap_or_else(Utc::now);

        Some(Self {
            account: account.to_string(),
            id,
            folder_id,
            conversation_id: id,
            from,
            to,
            subject: parsed.subject().unwrap_or("").to_string(),
            body: parsed.body_text(0).map(|b| b.to_string()).unwrap_or_default(),
            date,
            size: content.len() as u64,
            unread: true,
        })
    }

    fn key(&self) -> String {
        ItemId::new(self.account.clone(), self.id).to_string()
    }
}

/// Tantivy-backed message index for one account
pub struct MessageIndex {
    account: String,
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    fields: MessageFields,
    query_parser: QueryParser,
}

impl MessageIndex {
    /// Open or create the index at `index_path`, serving `account`
    pub fn open(index_path: &Path, account: &str) -> Result<Self> {
        std::fs::create_dir_all(index_path)?;

        let (schema, fields) = Self::build_schema();

        let index = if index_path.join("meta.json").exists() {
            Index::open_in_dir(index_path)?
        } else {
            let dir = MmapDirectory::open(index_path)
                .map_err(|e| SearchError::Failure(e.to_string()))?;
            Index::create(dir, schema, IndexSettings::default())?
        };

        let text_analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(100))
            .filter(LowerCaser)
            .build();
        index.tokenizers().register("email_tokenizer", text_analyzer);

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;

        // 50MB writer buffer
        let writer = index.writer(50_000_000)?;

        let query_parser = QueryParser::for_index(
            &index,
            vec![fields.subject, fields.body, fields.from, fields.to],
        );

        Ok(Self {
            account: account.to_string(),
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields,
            query_parser,
        })
    }

    fn build_schema() -> (Schema, MessageFields) {
        let mut schema_builder = Schema::builder();

        let text_indexing = TextFieldIndexing::default()
            .set_tokenizer("email_tokenizer")
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let text_options = TextOptions::default()
            .set_indexing_options(text_indexing)
            .set_stored();

        let key = schema_builder.add_text_field("key", STRING | STORED);
        let account = schema_builder.add_text_field("account", STRING | STORED);
        let item_id = schema_builder.add_u64_field("item_id", INDEXED | STORED);
        // Named for the query syntax: "inid:<folder>"
        let folder_id = schema_builder.add_u64_field("inid", INDEXED | STORED);
        let conversation_id = schema_builder.add_u64_field("cid", STORED);
        let from = schema_builder.add_text_field("from", text_options.clone());
        let to = schema_builder.add_text_field("to", text_options.clone());
        let subject = schema_builder.add_text_field("subject", text_options.clone());
        let body = schema_builder.add_text_field("body", text_options);
        let date = schema_builder.add_i64_field("date", FAST | STORED);
        let size = schema_builder.add_u64_field("size", STORED);
        let unread = schema_builder.add_u64_field("unread", STORED);

        let schema = schema_builder.build();

        let fields = MessageFields {
            key,
            account,
            item_id,
            folder_id,
            conversation_id,
            from,
            to,
            subject,
            body,
            date,
            size,
            unread,
        };

        (schema, fields)
    }

    /// Add or replace a message
    pub async fn index_message(&self, message: &IndexedMessage) -> Result<()> {
        let mut writer = self.writer.write().await;
        writer.delete_term(Term::from_field_text(self.fields.key, &message.key()));
        writer.add_document(doc!(
            self.fields.key => message.key(),
            self.fields.account => message.account.clone(),
            self.fields.item_id => message.id as u64,
            self.fields.folder_id => message.folder_id as u64,
            self.fields.conversation_id => message.conversation_id as u64,
            self.fields.from => message.from.clone(),
            self.fields.to => message.to.join(", "),
            self.fields.subject => message.subject.clone(),
            self.fields.body => message.body.clone(),
            self.fields.date => message.date.timestamp_millis(),
            self.fields.size => message.size,
            self.fields.unread => u64::from(message.unread),
        ))?;
        Ok(())
    }

    /// Commit pending changes and make them visible to searches
    pub async fn commit(&self) -> Result<()> {
        let mut writer = self.writer.write().await;
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    pub fn document_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    fn build_query(&self, request: &SearchRequest) -> std::result::Result<BooleanQuery, EngineError> {
        let mut subqueries: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        let owner_term = Term::from_field_text(self.fields.account, &self.account);
        subqueries.push((Occur::Must, Box::new(TermQuery::new(owner_term, IndexRecordOption::Basic))));

        if request.query.trim().is_empty() {
            subqueries.push((Occur::Must, Box::new(AllQuery)));
        } else {
            let parsed = self
                .query_parser
                .parse_query(&request.query)
                .map_err(parse_error)?;
            subqueries.push((Occur::Must, parsed));
        }

        Ok(BooleanQuery::new(subqueries))
    }

    /// Sort order the index will actually apply for `requested`
    fn effective_sort(requested: Option<SortBy>) -> SortBy {
        match requested.unwrap_or(SortBy::None) {
            SortBy::DateAsc => SortBy::DateAsc,
            SortBy::DateDesc => SortBy::DateDesc,
            SortBy::None | SortBy::Score => SortBy::Score,
            // No fast field for text sorts
            SortBy::SubjectAsc | SortBy::SubjectDesc | SortBy::NameAsc | SortBy::NameDesc => {
                SortBy::DateDesc
            }
        }
    }

    fn load_message(&self, doc: &TantivyDocument) -> MessageItem {
        let text = |field: Field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        };
        let number = |field: Field| doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0);

        let date_millis = doc
            .get_first(self.fields.date)
            .and_then(|v| v.as_i64())
            .unwrap_or(0);

        let to = text(self.fields.to);
        MessageItem {
            id: number(self.fields.item_id) as u32,
            folder_id: number(self.fields.folder_id) as u32,
            conversation_id: number(self.fields.conversation_id) as u32,
            date: DateTime::from_timestamp_millis(date_millis).unwrap_or_default(),
            size: number(self.fields.size),
            from: EmailAddress::new(text(self.fields.from)),
            to: to
                .split(", ")
                .filter(|a| !a.is_empty())
                .map(EmailAddress::new)
                .collect(),
            subject: text(self.fields.subject),
            fragment: String::new(),
            body: text(self.fields.body),
            html_body: None,
            headers: Vec::new(),
            unread: number(self.fields.unread) != 0,
        }
    }

    fn search(&self, request: &SearchRequest) -> std::result::Result<VecResultStream, EngineError> {
        let sort_by = Self::effective_sort(request.sort_by);

        if !request.types.is_empty()
            && !request
                .types
                .iter()
                .any(|t| matches!(t, ItemType::Message | ItemType::Conversation))
        {
            debug!("Index holds no items of types {}", request.types_str());
            return Ok(VecResultStream::new(Vec::new(), sort_by));
        }

        let query = self.build_query(request)?;
        let searcher = self.reader.searcher();

        let total = searcher.search(&query, &Count).map_err(index_error)?;
        let fetch = if request.limit == 0 {
            total
        } else {
            request
                .offset
                .saturating_add(request.limit)
                .saturating_add(1)
                .min(total)
        }
        .max(1);

        let docs: Vec<(f32, DocAddress)> = match sort_by {
            SortBy::DateAsc | SortBy::DateDesc => {
                let order = if sort_by == SortBy::DateAsc { Order::Asc } else { Order::Desc };
                searcher
                    .search(&query, &TopDocs::with_limit(fetch).order_by_fast_field::<i64>("date", order))
                    .map_err(index_error)?
                    .into_iter()
                    .map(|(_, addr)| (0.0, addr))
                    .collect()
            }
            _ => searcher
                .search(&query, &TopDocs::with_limit(fetch))
                .map_err(index_error)?,
        };

        let mut hits = Vec::with_capacity(docs.len());
        for (score, address) in docs {
            let retrieved: TantivyDocument = searcher.doc(address).map_err(index_error)?;
            let mut message = self.load_message(&retrieved);
            message.fragment = create_snippet(&message.body, &request.query, FRAGMENT_LEN);

            hits.push(Hit::Message(MessageHit {
                info: HitInfo {
                    account_id: self.account.clone(),
                    item_id: message.id,
                    score,
                    date: message.date.timestamp_millis(),
                    subject: message.subject.clone(),
                    name: message.from.address.clone(),
                },
                message,
                matched_parts: Vec::new(),
            }));
        }

        Ok(VecResultStream::new(hits, sort_by).with_total(total as u64))
    }

    fn find_message(&self, item: &ItemId) -> Result<Option<TantivyDocument>> {
        let key = ItemId::new(self.account.clone(), item.id).to_string();
        let query = TermQuery::new(
            Term::from_field_text(self.fields.key, &key),
            IndexRecordOption::Basic,
        );
        let searcher = self.reader.searcher();
        let top = searcher.search(&query, &TopDocs::with_limit(1))?;
        match top.first() {
            Some((_, address)) => Ok(Some(searcher.doc(*address)?)),
            None => Ok(None),
        }
    }

    async fn set_read(&self, item: &ItemId) -> Result<bool> {
        let Some(doc) = self.find_message(item)? else {
            return Ok(false);
        };
        let message = self.load_message(&doc);
        let indexed = IndexedMessage {
            account: self.account.clone(),
            id: message.id,
            folder_id: message.folder_id,
            conversation_id: message.conversation_id,
            from: message.from.address,
            to: message.to.into_iter().map(|a| a.address).collect(),
            subject: message.subject,
            body: message.body,
            date: message.date,
            size: message.size,
            unread: false,
        };
        self.index_message(&indexed).await?;
        self.commit().await?;
        Ok(true)
    }
}

fn parse_error(e: QueryParserError) -> EngineError {
    let (code, token, expected_tokens) = match &e {
        QueryParserError::SyntaxError(_) => (None, None, true),
        QueryParserError::FieldDoesNotExist(field) => (
            Some("UNKNOWN_FIELD".to_string()),
            Some(ParseToken {
                image: field.clone(),
                column: -1,
            }),
            false,
        ),
        _ => (Some("QUERY_PARSE_ERROR".to_string()), None, false),
    };
    EngineError::Parse {
        code,
        token,
        expected_tokens,
        message: e.to_string(),
    }
}

fn index_error(e: tantivy::TantivyError) -> EngineError {
    EngineError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

/// Byte offset in `haystack` where `needle` starts, ignoring case
fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return None;
    }
    haystack.char_indices().map(|(i, _)| i).find(|&i| {
        let mut candidate = haystack[i..].chars().flat_map(char::to_lowercase);
        needle.iter().all(|c| candidate.next() == Some(*c))
    })
}

/// Body excerpt around the first query term
fn create_snippet(body: &str, query: &str, max_len: usize) -> String {
    let best_pos = query
        .split_whitespace()
        .find_map(|term| find_ignore_case(body, term))
        .unwrap_or(0);

    let start = if best_pos > 50 {
        body[..best_pos]
            .rfind(' ')
            .map(|p| p + 1)
            .unwrap_or(0)
    } else {
        0
    };

    let mut end = std::cmp::min(start + max_len, body.len());
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    let end = if end < body.len() {
        body[start..end].rfind(' ').map(|p| start + p).unwrap_or(end)
    } else {
        end
    };

    let mut snippet = String::new();
    if start > 0 {
        snippet.push_str("...");
    }
    snippet.push_str(body[start..end].trim());
    if end < body.len() {
        snippet.push_str("...");
    }
    snippet
}

#[async_trait]
impl QueryEngine for MessageIndex {
    async fn execute(
        &self,
        request: &SearchRequest,
    ) -> std::result::Result<Box<dyn ResultStream>, EngineError> {
        let stream = self.search(request)?;
        Ok(Box::new(stream))
    }
}

#[async_trait]
impl MailboxStore for MessageIndex {
    async fn mark_read(&self, item: &ItemId) -> std::result::Result<(), StoreError> {
        if let Some(account) = &item.account {
            if *account != self.account {
                return Err(StoreError::PermissionDenied(item.to_string()));
            }
        }
        match self.set_read(item).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(StoreError::NotFound(item.to_string())),
            Err(e) => {
                warn!("Failed to update read state for {}: {}", item, e);
                Err(StoreError::Other(e.to_string()))
            }
        }
    }
}
