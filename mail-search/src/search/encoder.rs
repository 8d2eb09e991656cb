//! Hit encoding
//!
//! Turns engine hits into response elements. [`HitEncoder::put_hits`] drives
//! the pager, applies the limit and inline policy, and dispatches each hit
//! to the encoder for its kind.

use tracing::{debug, error, info, warn};

use super::calendar::CalendarItemSummary;
use super::element::Element;
use super::mailbox::{MailboxStore, StoreError};
use super::stream::ResultsPager;
use super::types::{
    CalendarItemHit, ContactItem, ConversationHit, ConversationItem, DocumentItem, EmailAddress, ExpandResults,
    Hit, ItemId, ItemType, MessageHit, MessageItem, MessagePartHit, NoteItem, SearchRequest,
};
use crate::error::{Result, SearchError};

/// Formats item ids relative to the authenticated account
///
/// Items in the authenticated account's own mailbox are rendered as bare
/// ids; items of any other mailbox are qualified with the owning account.
#[derive(Debug, Clone)]
pub struct IdFormatter {
    requested_account: String,
    authenticated_account: String,
}

impl IdFormatter {
    pub fn new(requested_account: impl Into<String>, authenticated_account: impl Into<String>) -> Self {
        Self {
            requested_account: requested_account.into(),
            authenticated_account: authenticated_account.into(),
        }
    }

    pub fn same_account(account: impl Into<String>) -> Self {
        let account = account.into();
        Self::new(account.clone(), account)
    }

    pub fn requested_account(&self) -> &str {
        &self.requested_account
    }

    pub fn format(&self, id: u32) -> String {
        if self.requested_account == self.authenticated_account {
            id.to_string()
        } else {
            ItemId::new(self.requested_account.clone(), id).to_string()
        }
    }
}

/// Outcome of encoding one hit
enum Encoded {
    /// Regular element; receives sort field and mailbox id
    Element(Element),
    /// Remote fragment spliced as-is
    Proxied(Element),
    /// Hit produced no output (calendar item without instances in range)
    Nothing,
    /// Hit kind not handled here
    Skipped,
}

/// Encodes a page of hits into a response
pub struct HitEncoder<'a> {
    request: &'a SearchRequest,
    ifmt: &'a IdFormatter,
    mailbox: &'a dyn MailboxStore,
    include_mailbox: bool,
}

impl<'a> HitEncoder<'a> {
    pub fn new(
        request: &'a SearchRequest,
        ifmt: &'a IdFormatter,
        mailbox: &'a dyn MailboxStore,
        include_mailbox: bool,
    ) -> Self {
        Self {
            request,
            ifmt,
            mailbox,
            include_mailbox,
        }
    }

    /// Encode hits from `pager` into `response` until the limit is reached
    /// or the pager runs dry, then set `more` on the response.
    ///
    /// Returns the number of counted hits.
    pub async fn put_hits(&self, response: &mut Element, pager: &mut ResultsPager<'_>) -> Result<usize> {
        let limit = self.request.limit;
        let expand = match &self.request.inline {
            ExpandResults::Hits => ExpandResults::None,
            other => other.clone(),
        };
        let sort_by = pager.sort_order();
        debug!("Search results beginning with offset {}", self.request.offset);

        let mut total = 0usize;
        while (limit == 0 || total < limit) && pager.has_next() {
            let Some(hit) = pager.next_hit() else {
                break;
            };

            let item_id = hit.item_id();
            let inline = (total == 0 && expand == ExpandResults::First)
                || expand == ExpandResults::All
                || expand.matches(&item_id);
            let sort_field = hit.sort_field(sort_by);

            match self.encode_hit(hit, inline).await? {
                Encoded::Element(mut elem) => {
                    elem.add_attr("sf", sort_field);
                    if self.include_mailbox {
                        elem.add_attr("id", item_id.to_string());
                    }
                    response.add_child(elem);
                    total += 1;
                }
                Encoded::Proxied(elem) => {
                    response.add_child(elem);
                    total += 1;
                }
                Encoded::Nothing | Encoded::Skipped => {}
            }

            if limit != 0 && total >= limit {
                debug!("Search results limited to {} hits", limit);
                break;
            }
        }

        response.add_attr("more", pager.has_next());
        Ok(total)
    }

    async fn encode_hit(&self, hit: Hit, inline: bool) -> Result<Encoded> {
        let encoded = match hit {
            Hit::Conversation(ch) => Encoded::Element(self.conversation_hit(&ch)),
            Hit::Message(mh) => Encoded::Element(self.message_hit(mh, inline).await),
            Hit::MessagePart(mph) => Encoded::Element(self.message_part_hit(&mph)),
            Hit::Contact(ch) => Encoded::Element(encode_contact_summary(&ch.contact, self.ifmt)),
            Hit::Note(nh) => Encoded::Element(encode_note(&nh.note, self.ifmt)),
            Hit::Proxied(ph) => Encoded::Proxied(ph.element),
            Hit::CalendarItem(ah) => match self.calendar_item_hit(&ah) {
                Some(elem) => Encoded::Element(elem),
                None => Encoded::Nothing,
            },
            Hit::Document(dh) => Encoded::Element(encode_document(&dh.document, self.ifmt)?),
            Hit::Unknown { kind, info } => {
                error!(
                    "Got an unknown hit type putting search hits: {} ({}:{})",
                    kind, info.account_id, info.item_id
                );
                Encoded::Skipped
            }
        };
        Ok(encoded)
    }

    fn conversation_hit(&self, ch: &ConversationHit) -> Element {
        let first = ch.message_hits.first().map(|mh| &mh.message);
        let mut c = encode_conversation_summary(
            &ch.conversation,
            first,
            self.ifmt,
            self.request.want_recipients,
        );
        if ch.info.score != 0.0 {
            c.add_attr("score", ch.info.score);
        }
        for mh in &ch.message_hits {
            c.add_element("m").add_attr("id", self.ifmt.format(mh.message.id));
        }
        c
    }

    async fn message_hit(&self, mh: MessageHit, inline: bool) -> Element {
        let MessageHit {
            info,
            mut message,
            matched_parts,
        } = mh;

        // Mark read before encoding so the response never shows the message unread
        if inline && message.unread && self.request.mark_read {
            let item = ItemId::new(info.account_id.clone(), message.id);
            match self.mailbox.mark_read(&item).await {
                Ok(()) => message.unread = false,
                Err(StoreError::PermissionDenied(_)) => {
                    info!("no permissions to mark message as read (ignored): {}", item);
                }
                Err(e) => {
                    warn!("problem marking message as read (ignored): {}: {}", item, e);
                }
            }
        }

        let mut m = if inline {
            encode_message_full(&message, self.ifmt, self.request)
        } else {
            encode_message_summary(&message, self.ifmt, self.request.want_recipients)
        };

        if info.score != 0.0 {
            m.add_attr("score", info.score);
        }
        m.add_attr("cm", true);

        for part in matched_parts.iter().filter(|p| !p.is_empty()) {
            m.add_element("hp").add_attr("part", part.clone());
        }
        m
    }

    fn message_part_hit(&self, mph: &MessagePartHit) -> Element {
        let msg = &mph.message;
        let mut mp = Element::new("mp");
        mp.add_attr("s", msg.size)
            .add_attr("d", msg.date.timestamp_millis())
            .add_attr("cid", self.ifmt.format(msg.conversation_id))
            .add_attr("mid", self.ifmt.format(msg.id))
            .add_attr("ct", mph.content_type.clone())
            .add_attr("name", mph.filename.clone().unwrap_or_default())
            .add_attr("part", mph.part.clone());
        if mph.info.score != 0.0 {
            mp.add_attr("score", mph.info.score);
        }

        mp.add_child(encode_email(&msg.from, "f"));
        if !msg.subject.is_empty() {
            mp.add_text_element("su", msg.subject.clone());
        }
        mp
    }

    /// `None` when the item has no instances in the request's expansion window
    fn calendar_item_hit(&self, ah: &CalendarItemHit) -> Option<Element> {
        let summary =
            CalendarItemSummary::for_range(&ah.item, self.request.expand_start, self.request.expand_end);
        if summary.num_instances() == 0 {
            return None;
        }

        let mut elem = summary.to_element(self.ifmt);
        elem.add_attr("cm", true);
        if ah.info.score != 0.0 {
            elem.add_attr("score", ah.info.score);
        }
        Some(elem)
    }
}

/// Encode an address as an `e` element of type `kind` ("f" from, "t" to)
pub fn encode_email(addr: &EmailAddress, kind: &str) -> Element {
    let mut e = Element::new("e");
    e.add_attr("a", addr.address.clone()).add_attr("t", kind);
    if let Some(display) = &addr.display {
        e.add_attr("p", display.clone());
    }
    e
}

fn message_flags(msg: &MessageItem) -> String {
    if msg.unread {
        "u".to_string()
    } else {
        String::new()
    }
}

fn add_message_header_attrs(m: &mut Element, msg: &MessageItem, ifmt: &IdFormatter) {
    m.add_attr("id", ifmt.format(msg.id))
        .add_attr("cid", ifmt.format(msg.conversation_id))
        .add_attr("l", ifmt.format(msg.folder_id))
        .add_attr("d", msg.date.timestamp_millis())
        .add_attr("s", msg.size);
    let flags = message_flags(msg);
    if !flags.is_empty() {
        m.add_attr("f", flags);
    }
}

pub fn encode_message_summary(msg: &MessageItem, ifmt: &IdFormatter, want_recipients: bool) -> Element {
    let mut m = Element::new("m");
    add_message_header_attrs(&mut m, msg, ifmt);

    m.add_child(encode_email(&msg.from, "f"));
    if want_recipients {
        for to in &msg.to {
            m.add_child(encode_email(to, "t"));
        }
    }
    if !msg.subject.is_empty() {
        m.add_text_element("su", msg.subject.clone());
    }
    if !msg.fragment.is_empty() {
        m.add_text_element("fr", msg.fragment.clone());
    }
    m
}

/// Full message rendering used for inlined hits
pub fn encode_message_full(msg: &MessageItem, ifmt: &IdFormatter, request: &SearchRequest) -> Element {
    let mut m = Element::new("m");
    add_message_header_attrs(&mut m, msg, ifmt);

    m.add_child(encode_email(&msg.from, "f"));
    for to in &msg.to {
        m.add_child(encode_email(to, "t"));
    }
    if !msg.subject.is_empty() {
        m.add_text_element("su", msg.subject.clone());
    }

    for wanted in &request.inlined_headers {
        if let Some((name, value)) = msg
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
        {
            m.add_element("header")
                .add_attr("n", name.clone())
                .content = Some(value.clone());
        }
    }

    let (content_type, body) = match (&msg.html_body, request.want_html) {
        (Some(html), true) if request.neuter_images => ("text/html", neuter_images(html)),
        (Some(html), true) => ("text/html", html.clone()),
        _ => ("text/plain", msg.body.clone()),
    };
    let (body, truncated) = match request.max_inlined_length {
        Some(max) if body.len() > max => (truncate_at_char_boundary(&body, max).to_string(), true),
        _ => (body, false),
    };

    let part = m.add_element("mp");
    part.add_attr("part", "1").add_attr("ct", content_type).add_attr("body", true);
    if truncated {
        part.add_attr("truncated", true);
    }
    part.add_text_element("content", body);
    m
}

/// Keep remote images from loading by renaming their `src` attribute
fn neuter_images(html: &str) -> String {
    html.replace(" src=", " dfsrc=").replace(" SRC=", " dfsrc=")
}

fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

pub fn encode_conversation_summary(
    conv: &ConversationItem,
    first_message: Option<&MessageItem>,
    ifmt: &IdFormatter,
    want_recipients: bool,
) -> Element {
    let mut c = Element::new("c");
    c.add_attr("id", ifmt.format(conv.id))
        .add_attr("n", conv.message_count)
        .add_attr("d", conv.date.timestamp_millis());
    if conv.unread_count > 0 {
        c.add_attr("u", conv.unread_count).add_attr("f", "u");
    }
    if !conv.subject.is_empty() {
        c.add_text_element("su", conv.subject.clone());
    }

    let fragment = first_message
        .map(|m| m.fragment.as_str())
        .filter(|f| !f.is_empty())
        .unwrap_or(conv.fragment.as_str());
    if !fragment.is_empty() {
        c.add_text_element("fr", fragment.to_string());
    }

    if want_recipients {
        for participant in &conv.participants {
            c.add_child(encode_email(participant, "f"));
        }
    }
    c
}

const CONTACT_SUMMARY_FIELDS: &[&str] = &[
    "email", "email2", "email3", "firstName", "lastName", "fullName", "company",
];

/// Contact projection with only the fields a result list shows
pub fn encode_contact_summary(contact: &ContactItem, ifmt: &IdFormatter) -> Element {
    let mut cn = Element::new("cn");
    cn.add_attr("id", ifmt.format(contact.id))
        .add_attr("l", ifmt.format(contact.folder_id));
    if !contact.file_as.is_empty() {
        cn.add_attr("fileAsStr", contact.file_as.clone());
    }
    for (name, value) in contact
        .fields
        .iter()
        .filter(|(name, _)| CONTACT_SUMMARY_FIELDS.contains(&name.as_str()))
    {
        cn.add_element("a").add_attr("n", name.clone()).content = Some(value.clone());
    }
    cn
}

pub fn encode_note(note: &NoteItem, ifmt: &IdFormatter) -> Element {
    let mut n = Element::new("note");
    n.add_attr("id", ifmt.format(note.id))
        .add_attr("l", ifmt.format(note.folder_id))
        .add_attr("d", note.date.timestamp_millis())
        .add_attr("color", note.color);
    n.add_text_element("content", note.content.clone());
    n
}

/// Encode a document or wiki page; other item kinds are a corrupt hit
pub fn encode_document(doc: &DocumentItem, ifmt: &IdFormatter) -> Result<Element> {
    let name = match doc.kind {
        ItemType::Document => "doc",
        ItemType::Wiki => "w",
        other => {
            return Err(SearchError::UnknownDocument(format!(
                "invalid document type {}",
                other.as_str()
            )))
        }
    };

    let mut d = Element::new(name);
    d.add_attr("id", ifmt.format(doc.id))
        .add_attr("l", ifmt.format(doc.folder_id))
        .add_attr("name", doc.name.clone())
        .add_attr("ct", doc.content_type.clone())
        .add_attr("s", doc.size)
        .add_attr("ver", doc.version)
        .add_attr("leb", doc.last_modified_by.clone())
        .add_attr("md", doc.modified.timestamp_millis());
    Ok(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::stream::VecResultStream;
    use crate::search::types::{
        CalendarItem, ContactHit, DocumentHit, HitInfo, Instance, ProxiedHit, SortBy,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMailbox {
        marked: Mutex<Vec<ItemId>>,
        deny: bool,
    }

    #[async_trait]
    impl MailboxStore for RecordingMailbox {
        async fn mark_read(&self, item: &ItemId) -> std::result::Result<(), StoreError> {
            if self.deny {
                return Err(StoreError::PermissionDenied(item.to_string()));
            }
            self.marked.lock().unwrap().push(item.clone());
            Ok(())
        }
    }

    fn date(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap()
    }

    fn message(id: u32, unread: bool) -> MessageItem {
        MessageItem {
            id,
            folder_id: 2,
            conversation_id: 100 + id,
            date: date(3),
            size: 2048,
            from: EmailAddress::new("alice@example.com"),
            to: vec![EmailAddress::new("bob@example.com")],
            subject: format!("Subject {}", id),
            fragment: "Hello there".to_string(),
            body: "Hello there, this is the body.".to_string(),
            html_body: Some("<p>Hello <img src=\"http://x/y.png\"></p>".to_string()),
            headers: vec![("X-Mailer".to_string(), "test".to_string())],
            unread,
        }
    }

    fn message_hit(id: u32, unread: bool, score: f32) -> Hit {
        let msg = message(id, unread);
        Hit::Message(MessageHit {
            info: HitInfo {
                account_id: "acct-a".to_string(),
                item_id: id,
                score,
                date: msg.date.timestamp_millis(),
                subject: msg.subject.clone(),
                name: String::new(),
            },
            message: msg,
            matched_parts: vec!["".to_string(), "2".to_string()],
        })
    }

    fn calendar_hit(id: u32, day: u32) -> Hit {
        Hit::CalendarItem(CalendarItemHit {
            info: HitInfo {
                date: date(day).timestamp_millis(),
                ..HitInfo::new("acct-a", id).with_score(0.5)
            },
            item: CalendarItem {
                id,
                folder_id: 10,
                kind: ItemType::Appointment,
                uid: format!("uid-{}", id),
                name: "Review".to_string(),
                location: None,
                organizer: None,
                instances: vec![Instance {
                    start: date(day),
                    duration_ms: 1_800_000,
                }],
            },
        })
    }

    fn windowed_request(limit: usize) -> SearchRequest {
        SearchRequest {
            limit,
            expand_start: Some(date(1)),
            expand_end: Some(date(10)),
            ..Default::default()
        }
    }

    async fn encode(request: &SearchRequest, mailbox: &RecordingMailbox, hits: Vec<Hit>) -> (Element, usize) {
        let ifmt = IdFormatter::same_account("acct-a");
        let encoder = HitEncoder::new(request, &ifmt, mailbox, false);
        let mut stream = VecResultStream::new(hits, SortBy::DateDesc);
        let mut pager = ResultsPager::new(&mut stream, request.offset);
        let mut response = Element::new("SearchResponse");
        let total = encoder.put_hits(&mut response, &mut pager).await.unwrap();
        (response, total)
    }

    #[tokio::test]
    async fn test_message_summary_fields() {
        let request = SearchRequest::default();
        let mailbox = RecordingMailbox::default();
        let (response, total) = encode(&request, &mailbox, vec![message_hit(7, true, 1.25)]).await;

        assert_eq!(total, 1);
        let m = &response.children[0];
        assert_eq!(m.name, "m");
        assert_eq!(m.attr_str("id"), Some("7"));
        assert_eq!(m.attr_str("f"), Some("u"));
        assert_eq!(m.attr_bool("cm"), Some(true));
        assert_eq!(m.attr("score").and_then(|v| v.as_f64()), Some(1.25));
        assert_eq!(m.attr_str("sf"), Some(date(3).timestamp_millis().to_string().as_str()));
        let parts: Vec<_> = m.children_named("hp").filter_map(|p| p.attr_str("part")).collect();
        assert_eq!(parts, vec!["2"]);
        assert!(m.first_child("mp").is_none());
        assert!(mailbox.marked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inline_first_marks_read_before_encoding() {
        let request = SearchRequest {
            inline: ExpandResults::First,
            mark_read: true,
            want_html: true,
            neuter_images: true,
            inlined_headers: vec!["x-mailer".to_string()],
            ..Default::default()
        };
        let mailbox = RecordingMailbox::default();
        let (response, _) = encode(
            &request,
            &mailbox,
            vec![message_hit(7, true, 0.0), message_hit(8, true, 0.0)],
        )
        .await;

        assert_eq!(*mailbox.marked.lock().unwrap(), vec![ItemId::new("acct-a", 7)]);

        let first = &response.children[0];
        assert!(first.attr("f").is_none());
        assert!(first.attr("score").is_none());
        let body = first.first_child("mp").unwrap();
        assert_eq!(body.attr_str("ct"), Some("text/html"));
        let content = body.first_child("content").unwrap().content.clone().unwrap();
        assert!(content.contains("dfsrc="));
        assert_eq!(
            first.first_child("header").and_then(|h| h.content.as_deref()),
            Some("test")
        );

        let second = &response.children[1];
        assert_eq!(second.attr_str("f"), Some("u"));
        assert!(second.first_child("mp").is_none());
    }

    #[tokio::test]
    async fn test_mark_read_permission_denied_is_swallowed() {
        let request = SearchRequest {
            inline: ExpandResults::All,
            mark_read: true,
            ..Default::default()
        };
        let mailbox = RecordingMailbox {
            deny: true,
            ..Default::default()
        };
        let (response, total) = encode(&request, &mailbox, vec![message_hit(7, true, 0.0)]).await;

        assert_eq!(total, 1);
        let m = &response.children[0];
        assert_eq!(m.attr_str("f"), Some("u"));
        assert!(m.first_child("mp").is_some());
    }

    #[tokio::test]
    async fn test_inline_by_id_and_truncation() {
        let request = SearchRequest {
            inline: ExpandResults::Id(ItemId::local(8)),
            max_inlined_length: Some(5),
            ..Default::default()
        };
        let mailbox = RecordingMailbox::default();
        let (response, _) = encode(
            &request,
            &mailbox,
            vec![message_hit(7, false, 0.0), message_hit(8, false, 0.0)],
        )
        .await;

        assert!(response.children[0].first_child("mp").is_none());
        let body = response.children[1].first_child("mp").unwrap();
        assert_eq!(body.attr_bool("truncated"), Some(true));
        assert_eq!(
            body.first_child("content").and_then(|c| c.content.as_deref()),
            Some("Hello")
        );
    }

    #[tokio::test]
    async fn test_hits_policy_is_treated_as_none() {
        let request = SearchRequest {
            inline: ExpandResults::Hits,
            ..Default::default()
        };
        let mailbox = RecordingMailbox::default();
        let (response, _) = encode(&request, &mailbox, vec![message_hit(7, false, 0.0)]).await;
        assert!(response.children[0].first_child("mp").is_none());
    }

    #[tokio::test]
    async fn test_calendar_hit_without_instances_is_not_counted() {
        let request = windowed_request(2);
        let mailbox = RecordingMailbox::default();
        let (response, total) = encode(
            &request,
            &mailbox,
            vec![calendar_hit(1, 2), calendar_hit(2, 25)],
        )
        .await;

        assert_eq!(total, 1);
        assert_eq!(response.children.len(), 1);
        let appt = &response.children[0];
        assert_eq!(appt.name, "appt");
        assert_eq!(appt.attr_bool("cm"), Some(true));
        assert_eq!(appt.attr("score").and_then(|v| v.as_f64()), Some(0.5));
        assert_eq!(response.attr_bool("more"), Some(false));
    }

    #[tokio::test]
    async fn test_sort_field_score_and_ids_round_trip() {
        let mut request = windowed_request(0);
        request.sort_by = Some(SortBy::Score);
        let mailbox = RecordingMailbox::default();
        let ifmt = IdFormatter::same_account("acct-a");
        let encoder = HitEncoder::new(&request, &ifmt, &mailbox, true);

        let mut appt = calendar_hit(3, 4);
        if let Hit::CalendarItem(ah) = &mut appt {
            ah.info.score = 0.1;
        }
        let mut stream = VecResultStream::new(vec![message_hit(8, false, 0.1), appt], SortBy::DateDesc);
        let mut pager = ResultsPager::new(&mut stream, 0);
        let mut response = Element::new("SearchResponse");
        encoder.put_hits(&mut response, &mut pager).await.unwrap();

        assert_eq!(response.children.len(), 2);
        for (elem, id, day) in [(&response.children[0], "acct-a:8", 3), (&response.children[1], "acct-a:3", 4)] {
            // Sort field follows the stream's order, not the requested one
            assert_eq!(elem.attr_str("sf"), Some(date(day).timestamp_millis().to_string().as_str()));
            assert_eq!(elem.attr_str("id"), Some(id));
            let score = elem.attr("score").and_then(|v| v.as_f64()).unwrap() as f32;
            assert_eq!(score, 0.1f32);
        }
        assert_eq!(response.children[1].name, "appt");
    }

    #[tokio::test]
    async fn test_proxied_hit_counts_without_sort_field() {
        let request = SearchRequest {
            limit: 1,
            ..Default::default()
        };
        let mailbox = RecordingMailbox::default();
        let remote = Element::new("m").with_attr("id", "acct-b:9");
        let (response, total) = encode(
            &request,
            &mailbox,
            vec![
                Hit::Proxied(ProxiedHit {
                    info: HitInfo::new("acct-b", 9),
                    element: remote.clone(),
                }),
                message_hit(7, false, 0.0),
            ],
        )
        .await;

        assert_eq!(total, 1);
        assert_eq!(response.children, vec![remote]);
        assert_eq!(response.attr_bool("more"), Some(true));
    }

    #[tokio::test]
    async fn test_unknown_hit_is_skipped() {
        let request = SearchRequest::default();
        let mailbox = RecordingMailbox::default();
        let (response, total) = encode(
            &request,
            &mailbox,
            vec![
                Hit::Unknown {
                    kind: "voicemail".to_string(),
                    info: HitInfo::new("acct-a", 1),
                },
                message_hit(7, false, 0.0),
            ],
        )
        .await;

        assert_eq!(total, 1);
        assert_eq!(response.children[0].name, "m");
    }

    #[tokio::test]
    async fn test_unknown_document_kind_fails() {
        let request = SearchRequest::default();
        let mailbox = RecordingMailbox::default();
        let ifmt = IdFormatter::same_account("acct-a");
        let encoder = HitEncoder::new(&request, &ifmt, &mailbox, false);
        let doc = DocumentItem {
            id: 4,
            folder_id: 16,
            kind: ItemType::Message,
            name: "broken".to_string(),
            content_type: "text/plain".to_string(),
            size: 1,
            version: 1,
            last_modified_by: "alice@example.com".to_string(),
            modified: date(2),
        };
        let mut stream = VecResultStream::new(
            vec![Hit::Document(DocumentHit {
                info: HitInfo::new("acct-a", 4),
                document: doc,
            })],
            SortBy::None,
        );
        let mut pager = ResultsPager::new(&mut stream, 0);
        let mut response = Element::new("SearchResponse");

        let result = encoder.put_hits(&mut response, &mut pager).await;
        assert!(matches!(result, Err(SearchError::UnknownDocument(_))));
    }

    #[tokio::test]
    async fn test_include_mailbox_adds_composite_id() {
        let request = SearchRequest::default();
        let mailbox = RecordingMailbox::default();
        let ifmt = IdFormatter::same_account("acct-a");
        let encoder = HitEncoder::new(&request, &ifmt, &mailbox, true);
        let mut contact = ContactItem {
            id: 30,
            folder_id: 7,
            file_as: "Doe, Jane".to_string(),
            ..Default::default()
        };
        contact.fields.insert("email".to_string(), "jane@example.com".to_string());
        contact.fields.insert("notes".to_string(), "private".to_string());
        let mut stream = VecResultStream::new(
            vec![Hit::Contact(ContactHit {
                info: HitInfo::new("acct-a", 30),
                contact,
            })],
            SortBy::NameAsc,
        );
        let mut pager = ResultsPager::new(&mut stream, 0);
        let mut response = Element::new("SearchResponse");
        encoder.put_hits(&mut response, &mut pager).await.unwrap();

        let cn = &response.children[0];
        assert_eq!(cn.attr_str("id"), Some("acct-a:30"));
        assert_eq!(cn.children_named("a").count(), 1);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_at_char_boundary("héllo", 2), "h");
        assert_eq!(truncate_at_char_boundary("hello", 10), "hello");
    }

    #[test]
    fn test_id_formatter_qualifies_foreign_mailbox() {
        assert_eq!(IdFormatter::same_account("a").format(5), "5");
        assert_eq!(IdFormatter::new("a", "b").format(5), "a:5");
    }
}
