//! Primary-source extractor: turns a feed listing payload into discovered
//! entries.
//!
//! The feed is the JSON rendering of one user's comment history. Each
//! comment body is matched against the shared command pattern; every typed
//! identifier token inside a match becomes one [`DiscoveredEntry`], dedup'd
//! across the page through a bloom-gated bounded buffer.

use serde_json::Value;
use tracing::trace;

use super::{
    BloomFilter, COMMAND_REGEX, DiscoveredEntry, EntryKind, ID_TOKEN_REGEX, IS_DLC_REGEX,
    IS_PERMANENTLY_FREE_REGEX,
};

/// Hard capacity of the in-flight dedup buffer; memory stays bounded no
/// matter how large the fetched page is.
pub const DEDUP_BUFFER_CAPACITY: usize = 512;

/// Acceptable false-positive rate for the duplicate pre-check. A false
/// positive only costs a confirming scan, so the rate is generous.
const DEDUP_ERROR_RATE: f64 = 0.01;

/// Extracts discovered entries from a feed listing payload.
///
/// Expects the `{"data": {"children": [...]}}` shape; anything else yields
/// an empty collection (the fetching strategy validates the envelope before
/// calling). Entries keep feed order; duplicates merge into their first
/// occurrence, keeping the most recent timestamp.
#[must_use]
pub fn parse_feed(payload: &Value) -> Vec<DiscoveredEntry> {
    let Some(children) = payload
        .pointer("/data/children")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    let mut filter = BloomFilter::with_error_rate(DEDUP_ERROR_RATE);
    let mut buffer: Vec<DiscoveredEntry> = Vec::new();

    for comment in children {
        let Some(data) = comment.get("data") else {
            continue;
        };
        let text = data.get("body").and_then(Value::as_str).unwrap_or("");
        let Some(date) = extract_date(data) else {
            continue;
        };

        for command in COMMAND_REGEX.find_iter(text) {
            let mut kind = EntryKind::NONE;
            if IS_PERMANENTLY_FREE_REGEX.is_match(text) {
                kind = kind | EntryKind::FREE_TO_PLAY;
            }
            if IS_DLC_REGEX.is_match(text) {
                kind = kind | EntryKind::DLC;
            }

            for token in ID_TOKEN_REGEX.find_iter(command.as_str()) {
                merge_entry(
                    &mut filter,
                    &mut buffer,
                    DiscoveredEntry::new(token.as_str(), kind, date),
                );
            }
        }
    }

    trace!(entries = buffer.len(), "extracted feed entries");
    buffer
}

/// Inserts an entry, merging probable duplicates.
///
/// The filter only gates the linear scan: a probable hit is always confirmed
/// against the buffer before replacing anything.
fn merge_entry(filter: &mut BloomFilter, buffer: &mut Vec<DiscoveredEntry>, entry: DiscoveredEntry) {
    let existing = filter
        .contains(&entry.identifier)
        .then(|| {
            buffer
                .iter()
                .position(|candidate| candidate.identifier == entry.identifier)
        })
        .flatten();

    match existing {
        Some(index) => {
            if entry.date > buffer[index].date {
                buffer[index] = entry;
            }
        }
        None => {
            filter.add(&entry.identifier);
            buffer.push(entry);
            while buffer.len() >= DEDUP_BUFFER_CAPACITY {
                buffer.pop();
            }
        }
    }
}

/// Prefers the precise `created_utc` field, falls back to `created`;
/// non-finite or non-positive timestamps disqualify the comment.
fn extract_date(data: &Value) -> Option<i64> {
    for field in ["created_utc", "created"] {
        let raw = data.get(field).and_then(Value::as_f64).unwrap_or(0.0);
        if raw.is_finite() && raw > 0.0 {
            return Some(raw as i64);
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn listing(children: Vec<Value>) -> Value {
        json!({ "kind": "Listing", "data": { "children": children } })
    }

    fn comment(body: &str, created_utc: f64) -> Value {
        json!({ "data": { "body": body, "created_utc": created_utc } })
    }

    #[test]
    fn test_extracts_tokens_in_feed_order() {
        let payload = listing(vec![
            comment(".addlicense asf s/762440, a/1601550", 1_638_309_600.0),
            comment("permanently free!\n\n.addlicense asf a/1631250", 1_638_400_000.0),
        ]);
        let entries = parse_feed(&payload);
        let ids: Vec<&str> = entries.iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(ids, ["s/762440", "a/1601550", "a/1631250"]);
        assert!(!entries[0].kind.is_free_to_play());
        assert!(!entries[1].kind.is_free_to_play());
        assert!(entries[2].kind.is_free_to_play());
    }

    #[test]
    fn test_dlc_phrase_sets_dlc_flag_only() {
        let payload = listing(vec![comment(
            "free DLC for a game you own\n\n.addlicense asf s/791642, s/791643",
            1_638_309_600.0,
        )]);
        let entries = parse_feed(&payload);
        assert_eq!(entries.len(), 2);
        for entry in &entries {
            assert!(entry.kind.is_dlc());
            assert!(!entry.kind.is_free_to_play());
        }
    }

    #[test]
    fn test_duplicate_keeps_first_position_and_newest_date() {
        let payload = listing(vec![
            comment(".addlicense asf a/100", 100.0),
            comment(".addlicense asf a/200", 150.0),
            comment(".addlicense asf a/100", 300.0),
        ]);
        let entries = parse_feed(&payload);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].identifier, "a/100");
        assert_eq!(entries[0].date, 300);
        assert_eq!(entries[1].identifier, "a/200");
    }

    #[test]
    fn test_older_duplicate_does_not_replace() {
        let payload = listing(vec![
            comment(".addlicense asf a/100", 300.0),
            comment(".addlicense asf a/100", 100.0),
        ]);
        let entries = parse_feed(&payload);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].date, 300);
    }

    #[test]
    fn test_invalid_timestamps_discard_the_comment() {
        let payload = listing(vec![
            json!({ "data": { "body": ".addlicense asf a/1", "created_utc": 0.0 } }),
            json!({ "data": { "body": ".addlicense asf a/2", "created_utc": -5.0 } }),
            json!({ "data": { "body": ".addlicense asf a/3" } }),
        ]);
        assert!(parse_feed(&payload).is_empty());
    }

    #[test]
    fn test_falls_back_to_coarse_created_field() {
        let payload = listing(vec![json!({
            "data": { "body": ".addlicense asf a/7", "created_utc": 0.0, "created": 1_638_309_601.0 }
        })]);
        let entries = parse_feed(&payload);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].date, 1_638_309_601);
    }

    #[test]
    fn test_missing_children_yields_empty() {
        assert!(parse_feed(&json!({ "kind": "Listing" })).is_empty());
        assert!(parse_feed(&json!({ "data": {} })).is_empty());
        assert!(parse_feed(&json!(null)).is_empty());
    }

    #[test]
    fn test_buffer_stays_bounded() {
        let bodies: Vec<Value> = (1..=600)
            .map(|i| comment(&format!(".addlicense asf a/{i}"), 1_000.0 + i as f64))
            .collect();
        let entries = parse_feed(&listing(bodies));
        assert!(entries.len() < DEDUP_BUFFER_CAPACITY);
    }
}
