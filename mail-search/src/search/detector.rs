//! Calendar fast path detection
//!
//! Recognizes the query shape calendar clients send when they only want
//! the appointments (or tasks) of a set of folders over a time range:
//! `inid:<folder> [OR inid:<folder>]*`. Those requests can be answered from
//! the calendar summary cache without touching the index.

use regex::Regex;
use std::sync::OnceLock;

use super::types::{ItemType, SearchRequest, SortBy};

const FOLDER_PREFIX: &str = "inid:";

fn or_separator() -> &'static Regex {
    static OR_SEPARATOR: OnceLock<Regex> = OnceLock::new();
    OR_SEPARATOR.get_or_init(|| Regex::new(r"\s+or\s+").expect("valid separator pattern"))
}

/// Classifies requests eligible for the calendar summary shortcut
pub struct FastPathDetector;

impl FastPathDetector {
    /// Folder ids of a simple calendar folder query, in query order
    ///
    /// Returns `None` when any precondition fails; the caller then runs the
    /// general query engine instead.
    pub fn detect(request: &SearchRequest) -> Option<Vec<String>> {
        match request.types.as_slice() {
            [ItemType::Appointment] | [ItemType::Task] => {}
            _ => return None,
        }

        if request.expand_start.is_none() || request.expand_end.is_none() {
            return None;
        }

        if request.offset != 0 {
            return None;
        }

        if request.sort_by.unwrap_or(SortBy::None) != SortBy::None {
            return None;
        }

        Self::folder_ids(&request.query)
    }

    /// Parse `inid:<a> OR inid:<b> ...` into folder id strings
    pub fn folder_ids(query: &str) -> Option<Vec<String>> {
        let query = query.to_lowercase();
        let query = strip_outer_parens(&query);

        // Any ANDed term disqualifies the query. This is a plain substring
        // test, so words containing "and" are rejected too.
        if query.contains("and") {
            return None;
        }

        let mut terms: Vec<&str> = or_separator().split(query).collect();
        // Trailing empty terms ("inid:5 or ") are dropped when a separator matched
        if terms.len() > 1 {
            while terms.last() == Some(&"") {
                terms.pop();
            }
        }

        let mut folder_ids = Vec::new();
        for term in terms {
            // Light clients wrap single terms, e.g. "(inid:10)"
            let term = strip_outer_parens(term.trim());
            let folder_id = term.strip_prefix(FOLDER_PREFIX)?;
            if !folder_id.is_empty() {
                folder_ids.push(folder_id.to_string());
            }
        }

        Some(folder_ids)
    }
}

fn strip_outer_parens(s: &str) -> &str {
    if s.len() > 2 && s.starts_with('(') && s.ends_with(')') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn calendar_request(query: &str) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            types: vec![ItemType::Appointment],
            sort_by: Some(SortBy::None),
            expand_start: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            expand_end: Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn test_detects_folder_list_in_order() {
        let request = calendar_request("(inid:5) OR inid:6");
        assert_eq!(
            FastPathDetector::detect(&request),
            Some(vec!["5".to_string(), "6".to_string()])
        );
    }

    #[test]
    fn test_detects_single_wrapped_term() {
        let request = calendar_request("(inid:10)");
        assert_eq!(FastPathDetector::detect(&request), Some(vec!["10".to_string()]));
    }

    #[test]
    fn test_detects_qualified_folder_ids() {
        let request = calendar_request("(inid:acct-b:10 OR inid:11)");
        assert_eq!(
            FastPathDetector::detect(&request),
            Some(vec!["acct-b:10".to_string(), "11".to_string()])
        );
    }

    #[test]
    fn test_task_type_is_eligible() {
        let mut request = calendar_request("inid:15");
        request.types = vec![ItemType::Task];
        assert!(FastPathDetector::detect(&request).is_some());
    }

    #[test]
    fn test_unset_sort_counts_as_none() {
        let mut request = calendar_request("inid:15");
        request.sort_by = None;
        assert!(FastPathDetector::detect(&request).is_some());
    }

    #[test]
    fn test_empty_folder_id_is_dropped() {
        let request = calendar_request("inid: or inid:7");
        assert_eq!(FastPathDetector::detect(&request), Some(vec!["7".to_string()]));
    }

    #[test]
    fn test_rejects_multiple_types() {
        let mut request = calendar_request("inid:5");
        request.types = vec![ItemType::Appointment, ItemType::Task];
        assert_eq!(FastPathDetector::detect(&request), None);

        request.types = vec![ItemType::Appointment, ItemType::Message];
        assert_eq!(FastPathDetector::detect(&request), None);
    }

    #[test]
    fn test_rejects_wrong_or_missing_type() {
        let mut request = calendar_request("inid:5");
        request.types = vec![ItemType::Message];
        assert_eq!(FastPathDetector::detect(&request), None);

        request.types = vec![];
        assert_eq!(FastPathDetector::detect(&request), None);
    }

    #[test]
    fn test_rejects_missing_range_bound() {
        let mut request = calendar_request("inid:5");
        request.expand_end = None;
        assert_eq!(FastPathDetector::detect(&request), None);

        let mut request = calendar_request("inid:5");
        request.expand_start = None;
        assert_eq!(FastPathDetector::detect(&request), None);
    }

    #[test]
    fn test_rejects_nonzero_offset_or_sort() {
        let mut request = calendar_request("inid:5");
        request.offset = 1;
        assert_eq!(FastPathDetector::detect(&request), None);

        let mut request = calendar_request("inid:5");
        request.sort_by = Some(SortBy::DateAsc);
        assert_eq!(FastPathDetector::detect(&request), None);
    }

    #[test]
    fn test_rejects_and_substring_anywhere() {
        assert_eq!(FastPathDetector::detect(&calendar_request("inid:5 AND inid:6")), None);
        // Substring match: "standup" contains "and"
        assert_eq!(FastPathDetector::detect(&calendar_request("inid:standup")), None);
        assert_eq!(FastPathDetector::detect(&calendar_request("inid:5 or inid:Brand")), None);
    }

    #[test]
    fn test_rejects_non_folder_terms() {
        assert_eq!(FastPathDetector::detect(&calendar_request("inid:5 or from:bob")), None);
        assert_eq!(FastPathDetector::detect(&calendar_request("meeting")), None);
        assert_eq!(FastPathDetector::detect(&calendar_request("")), None);
    }

    #[test]
    fn test_trailing_separator_is_ignored() {
        assert_eq!(
            FastPathDetector::folder_ids("inid:5 or "),
            Some(vec!["5".to_string()])
        );
        assert_eq!(
            FastPathDetector::folder_ids("inid:5 OR inid:6 OR "),
            Some(vec!["5".to_string(), "6".to_string()])
        );
        assert_eq!(FastPathDetector::folder_ids(" or inid:5"), None);
    }
}
