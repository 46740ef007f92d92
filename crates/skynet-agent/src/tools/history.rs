use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::Deserialize;

use skynet_canvas::{CanvasStore, ElementFilter};

use super::{Tool, ToolContext, ToolResult};

/// `fetch_elements` — the one history/query tool shared by `chat_summarizer`
/// and `canvas_manager`. Parses a small natural-language time grammar, then
/// post-filters in process on creator/author/content substrings.
pub struct FetchElementsTool {
    store: Arc<CanvasStore>,
}

impl FetchElementsTool {
    pub fn new(store: Arc<CanvasStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize, Default)]
struct FetchElementsArgs {
    limit: Option<usize>,
    time_range: Option<String>,
    created_by: Option<String>,
    author: Option<String>,
    contains: Option<String>,
    frame_id: Option<String>,
    #[serde(default)]
    include_details: bool,
}

#[async_trait]
impl Tool for FetchElementsTool {
    fn name(&self) -> &str {
        "fetch_elements"
    }

    fn description(&self) -> &str {
        "Fetch recent canvas elements for this chat, optionally filtered by time range, \
         creator, author, or a content substring."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "limit": { "type": "integer" },
                "time_range": { "type": "string" },
                "created_by": { "type": "string" },
                "author": { "type": "string" },
                "contains": { "type": "string" },
                "frame_id": { "type": "string" },
                "include_details": { "type": "boolean" },
            },
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult {
        let args: FetchElementsArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };

        let (since, until) = args
            .time_range
            .as_deref()
            .and_then(parse_time_range)
            .map(|r| (Some(r.since), r.until))
            .unwrap_or((None, None));
        let limit = args.limit.unwrap_or(50);

        let filter = ElementFilter {
            element_type: None,
            since,
            until,
            frame_id: args.frame_id.clone(),
        };

        // Over-fetch so post-filtering on creator/author/content still
        // leaves room to reach `limit` items.
        let fetched = match self.store.get_elements(&ctx.canvas_id, limit.max(200), 0, &filter) {
            Ok(elements) => elements,
            Err(e) => return ToolResult::error(format!("fetch failed: {e}")),
        };

        let mut filtered: Vec<_> = fetched
            .into_iter()
            .filter(|e| {
                args.created_by
                    .as_ref()
                    .is_none_or(|needle| e.created_by.eq_ignore_ascii_case(needle))
            })
            .filter(|e| {
                args.author.as_ref().is_none_or(|needle| {
                    e.attributes
                        .get("author")
                        .and_then(|v| v.as_str())
                        .map(|author| author.to_lowercase().contains(&needle.to_lowercase()))
                        .unwrap_or(false)
                })
            })
            .filter(|e| {
                args.contains
                    .as_ref()
                    .is_none_or(|needle| e.content.to_lowercase().contains(&needle.to_lowercase()))
            })
            .collect();

        // Store returns newest-first; take the newest `limit`, then
        // re-sort ascending for presentation (spec §4.1/§9 open question).
        filtered.truncate(limit);
        filtered.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let payload: Vec<_> = filtered
            .iter()
            .map(|e| {
                if args.include_details {
                    serde_json::json!({
                        "id": e.id,
                        "type": e.element_type,
                        "created_by": e.created_by,
                        "content": e.content,
                        "attributes": e.attributes,
                        "created_at": e.created_at,
                        "frame_ids": e.frame_ids,
                    })
                } else {
                    serde_json::json!({
                        "created_by": e.created_by,
                        "content": e.content,
                        "created_at": e.created_at,
                    })
                }
            })
            .collect();

        match serde_json::to_string(&payload) {
            Ok(json) => ToolResult::success(json),
            Err(e) => ToolResult::error(format!("serialization failed: {e}")),
        }
    }
}

/// A parsed `since`/`until` pair. `until` is `None` unless the grammar
/// names an explicit upper bound (`"yesterday"`, `"today"`, `"<iso> to
/// <iso>"`).
#[derive(Debug, PartialEq)]
struct TimeRange {
    since: DateTime<Utc>,
    until: Option<DateTime<Utc>>,
}

impl TimeRange {
    fn from(since: DateTime<Utc>) -> Self {
        Self { since, until: None }
    }
}

/// Parse a small grammar into a `since`/`until` pair:
/// `"today"` resolves to `[start_of_today, now]`; `"yesterday"` resolves to
/// `[start_of_yesterday, start_of_today)`; `"N hours ago"` and `"last N
/// minutes"` are open-ended lower bounds; a bare ISO-8601 instant or an
/// `"<iso> to <iso>"` range carries both bounds explicitly.
fn parse_time_range(input: &str) -> Option<TimeRange> {
    let s = input.trim().to_lowercase();
    let now = Utc::now();

    if s == "today" {
        let start_of_today = now.date_naive().and_hms_opt(0, 0, 0)?.and_utc();
        return Some(TimeRange::from(start_of_today));
    }
    if s == "yesterday" {
        let start_of_today = now.date_naive().and_hms_opt(0, 0, 0)?.and_utc();
        let start_of_yesterday = (now - Duration::days(1)).date_naive().and_hms_opt(0, 0, 0)?.and_utc();
        return Some(TimeRange { since: start_of_yesterday, until: Some(start_of_today) });
    }

    let hours_ago = Regex::new(r"^(\d+)\s*hours?\s*ago$").unwrap();
    if let Some(caps) = hours_ago.captures(&s) {
        let hours: i64 = caps[1].parse().ok()?;
        return Some(TimeRange::from(now - Duration::hours(hours)));
    }

    let last_minutes = Regex::new(r"^last\s+(\d+)\s*minutes?$").unwrap();
    if let Some(caps) = last_minutes.captures(&s) {
        let minutes: i64 = caps[1].parse().ok()?;
        return Some(TimeRange::from(now - Duration::minutes(minutes)));
    }

    if let Some((left, right)) = s.split_once(" to ") {
        let since = DateTime::parse_from_rfc3339(left.trim()).ok()?.with_timezone(&Utc);
        let until = DateTime::parse_from_rfc3339(right.trim()).ok().map(|d| d.with_timezone(&Utc));
        return Some(TimeRange { since, until });
    }

    DateTime::parse_from_rfc3339(&s).ok().map(|d| TimeRange::from(d.with_timezone(&Utc)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hours_ago() {
        let r = parse_time_range("3 hours ago").unwrap();
        assert!(r.since < Utc::now());
        assert!(r.since > Utc::now() - Duration::hours(4));
        assert!(r.until.is_none());
    }

    #[test]
    fn parses_last_minutes() {
        let r = parse_time_range("last 30 minutes").unwrap();
        assert!(r.since > Utc::now() - Duration::minutes(31));
        assert!(r.until.is_none());
    }

    #[test]
    fn parses_iso_instant() {
        let r = parse_time_range("2026-01-01T00:00:00Z").unwrap();
        assert_eq!(r.since.to_rfc3339(), "2026-01-01T00:00:00+00:00");
        assert!(r.until.is_none());
    }

    #[test]
    fn parses_range_carries_both_bounds() {
        let r = parse_time_range("2026-01-01T00:00:00Z to 2026-01-02T00:00:00Z").unwrap();
        assert_eq!(r.since.to_rfc3339(), "2026-01-01T00:00:00+00:00");
        assert_eq!(r.until.unwrap().to_rfc3339(), "2026-01-02T00:00:00+00:00");
    }

    #[test]
    fn parses_yesterday_as_half_open_range_before_today() {
        let r = parse_time_range("yesterday").unwrap();
        let now = Utc::now();
        let start_of_today = now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
        let start_of_yesterday = (now - Duration::days(1)).date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
        assert_eq!(r.since, start_of_yesterday);
        assert_eq!(r.until, Some(start_of_today));
    }

    #[test]
    fn parses_today_with_no_upper_bound() {
        let r = parse_time_range("today").unwrap();
        let start_of_today = Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
        assert_eq!(r.since, start_of_today);
        assert!(r.until.is_none());
    }

    #[test]
    fn unparseable_returns_none() {
        assert!(parse_time_range("whenever").is_none());
    }
}
