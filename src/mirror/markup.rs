//! DOM-less scanner for mirror-rendered comment markup.
//!
//! The mirror serves the announcement feed as HTML. Rather than pulling in a
//! full HTML parser, the scanner looks for the `<code>!addlicense asf `
//! command marker and walks a fixed set of landmarks around it (the
//! permalink anchor, the created-date span, the bot footer). Any structural
//! anomaly skips forward to a recorded resync index and scanning continues;
//! malformed markup can never abort the whole document.
//!
//! All index arithmetic is byte-based. The landmark needles are ASCII, so a
//! case-insensitive byte match can only land on a UTF-8 character boundary;
//! extracted ranges are still re-checked with [`str::get`] before slicing.

use std::collections::HashSet;
use std::fmt;
use std::ops::Range;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use tracing::trace;

use crate::feed::{COMMAND_REGEX, DiscoveredEntry, EntryKind, IS_DLC_REGEX,
    IS_FREE_TO_PLAY_REGEX, IS_PERMANENTLY_FREE_REGEX};
use crate::ids::GameId;

/// Hard cap on identifiers taken from one command.
pub const MAX_IDS_PER_ENTRY: usize = 32;

const CODE_MARKER: &str = "<code>!addlicense asf ";
const PRE_MARKER: &str = "<pre>!addlicense asf ";
const COMMENT_LINK_MARKER: &str = "<a class=\"comment_link\"";
const CREATED_MARKER: &str = "<span class=\"created\"";
const TITLE_ATTR: &str = "title=\"";

/// Validates that the anchor around the command is a comment permalink.
#[allow(clippy::expect_used)]
static HREF_COMMENT_LINK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*.\s*/r/[^\x00-\x1f]+?comments[^\x00-\x1f]+?.\s*/?\s*>"#)
        .expect("comment link regex is valid") // Static pattern, safe to panic
});

/// Ordered list of date formats seen in the created-span `title` attribute,
/// most common first (`May 31 2024, 12:28:53 UTC`).
const CREATED_DATE_FORMATS: &[&str] = &[
    "%b %d %Y, %H:%M:%S UTC",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S UTC",
    "%Y-%m-%d %H:%M:%S",
];

/// One announcement block extracted from mirror markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorEntry {
    /// Validated identifiers, at most [`MAX_IDS_PER_ENTRY`].
    pub ids: Vec<GameId>,
    /// Human title, recovered from the permalink slug. May be empty.
    pub title: String,
    /// Classification flags.
    pub kind: EntryKind,
    /// Created date from the block, unix seconds.
    pub date: i64,
}

impl MirrorEntry {
    /// Converts to the common discovered-entry shape; identifiers are
    /// comma-joined into the raw identifier field.
    #[must_use]
    pub fn to_discovered(&self) -> DiscoveredEntry {
        let identifier = self
            .ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        DiscoveredEntry::new(identifier, self.kind, self.date)
    }
}

impl fmt::Display for MirrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} ids) [{}]", self.title, self.ids.len(), self.kind)
    }
}

/// Landmark byte offsets for one announcement block.
struct BlockIndices {
    command_start: usize,
    command_end: usize,
    footer_info: usize,
    href_start: usize,
    href_end: usize,
    date_start: usize,
    date_end: usize,
}

enum Scan {
    Block(BlockIndices),
    Resync(usize),
    End,
}

/// Scans mirror markup for announcement blocks.
///
/// With `dedup` set, only the first block for each identifier multiset is
/// kept (order-insensitive); output preserves document order either way.
#[must_use]
pub fn parse_markup(html: &str, dedup: bool) -> Vec<MirrorEntry> {
    let mut entries = Vec::new();
    let mut seen: HashSet<Vec<(u8, i64)>> = HashSet::new();
    let mut start = 0usize;

    while start < html.len() {
        let indices = match scan_block(html, start) {
            Scan::End => break,
            Scan::Resync(next) => {
                start = next.max(start + 1);
                continue;
            }
            Scan::Block(indices) => indices,
        };

        match build_entry(html, &indices) {
            Some(entry) if !dedup || seen.insert(dedup_key(&entry.ids)) => {
                start = indices.footer_info + 1;
                entries.push(entry);
            }
            // Duplicate or invalid command: resync just past the command.
            _ => start = (indices.command_start + 1).max(start + 1),
        }
    }

    trace!(entries = entries.len(), dedup, "scanned mirror markup");
    entries
}

/// Order-insensitive multiset key over an identifier list.
fn dedup_key(ids: &[GameId]) -> Vec<(u8, i64)> {
    let mut key: Vec<(u8, i64)> = ids.iter().map(|id| (id.kind() as u8, id.id())).collect();
    key.sort_unstable();
    key
}

/// Locates the next block's landmarks starting at `start`.
fn scan_block(html: &str, start: usize) -> Scan {
    let len = html.len();

    let marker = match find_ci(html, CODE_MARKER, start..len)
        .or_else(|| find_ci(html, PRE_MARKER, start..len))
    {
        Some(index) => index,
        None => return Scan::End,
    };
    // Resync target on any anomaly: one byte into the failed marker.
    let resync = marker + 1;

    let Some(link) = rfind_ci(html, COMMENT_LINK_MARKER, start..marker) else {
        return Scan::Resync(resync);
    };
    let Some(created) = find_ci(html, CREATED_MARKER, link..marker) else {
        return Scan::Resync(resync);
    };
    let Some(title_attr) = find_ci(html, TITLE_ATTR, created..marker) else {
        return Scan::Resync(resync);
    };
    let date_start = title_attr + TITLE_ATTR.len();
    let Some(date_end) = find_ci(html, "\"", date_start..marker) else {
        return Scan::Resync(resync);
    };

    let Some(href_start) = find_ci(html, "href", link..marker) else {
        return Scan::Resync(resync);
    };
    let href_cap = (href_start + 1024).min(len);
    let Some(href_end) = find_ci(html, ">", href_start..href_cap) else {
        return Scan::Resync(resync);
    };
    match html.get(href_start..=href_end) {
        Some(anchor) if HREF_COMMENT_LINK_REGEX.is_match(anchor) => {}
        _ => return Scan::Resync(resync),
    }

    let Some(footer_bot) = find_ci(html, "bot", marker..len) else {
        return Scan::Resync(resync);
    };
    let Some(footer_info) = find_ci(html, "Info", footer_bot..len) else {
        return Scan::Resync(resync);
    };

    let Some(command_end) = find_ci(html, "</code>", marker..footer_info)
        .or_else(|| find_ci(html, "</pre>", marker..footer_info))
    else {
        return Scan::Resync(resync);
    };

    // Re-anchor on the command itself, past the enclosing tag.
    let command_start = find_ci(html, "!addlicense", marker..command_end).unwrap_or(marker);

    Scan::Block(BlockIndices {
        command_start,
        command_end,
        footer_info,
        href_start,
        href_end,
        date_start,
        date_end,
    })
}

/// Validates and extracts one block; `None` means skip-and-resync.
fn build_entry(html: &str, indices: &BlockIndices) -> Option<MirrorEntry> {
    let command = html.get(indices.command_start..indices.command_end)?.trim();
    if !COMMAND_REGEX.is_match(command) {
        return None;
    }

    let ids = command_identifiers(command);
    if ids.is_empty() {
        return None;
    }

    let kind = classify(html.get(indices.command_start..indices.footer_info)?);
    let title = extract_title(html.get(indices.href_start..indices.href_end)?);

    let date_text = if indices.date_start < indices.date_end {
        html.get(indices.date_start..indices.date_end)
            .unwrap_or("")
            .trim()
    } else {
        ""
    };
    let date = parse_created_date(date_text).unwrap_or_else(|| Utc::now().timestamp());

    Some(MirrorEntry {
        ids,
        title,
        kind,
        date,
    })
}

/// Splits a command on commas and parses each token; the first segment
/// carries the command words, so only its last space-separated token counts.
fn command_identifiers(command: &str) -> Vec<GameId> {
    let mut ids = Vec::new();
    for (index, segment) in command.split(',').enumerate() {
        if ids.len() >= MAX_IDS_PER_ENTRY {
            break;
        }
        let mut token = segment.trim();
        if index == 0 {
            token = token.rsplit(' ').next().unwrap_or(token);
        }
        if token.is_empty() {
            continue;
        }
        if let Some(id) = GameId::parse(token) {
            ids.push(id);
        }
    }
    ids
}

/// Classification over the text between the command and the bot footer;
/// all three phrase checks are independent.
fn classify(content: &str) -> EntryKind {
    let mut kind = EntryKind::NONE;
    if IS_DLC_REGEX.is_match(content) {
        kind = kind | EntryKind::DLC;
    }
    if IS_PERMANENTLY_FREE_REGEX.is_match(content) || IS_FREE_TO_PLAY_REGEX.is_match(content) {
        kind = kind | EntryKind::FREE_TO_PLAY;
    }
    kind
}

/// The permalink shape is `/r/<sub>/comments/<post>/<slug>/<comment>/#<anchor>`;
/// the human-readable slug sits third from the end.
fn extract_title(href: &str) -> String {
    let segments: Vec<&str> = href
        .split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.len() > 2 {
        segments[segments.len() - 3].to_string()
    } else {
        String::new()
    }
}

/// Tries the ordered format list, then generic RFC 3339 / RFC 2822.
fn parse_created_date(text: &str) -> Option<i64> {
    if text.is_empty() {
        return None;
    }
    for format in CREATED_DATE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc().timestamp());
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.timestamp());
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(text) {
        return Some(parsed.timestamp());
    }
    None
}

/// Case-insensitive ASCII substring search over a byte range, returning an
/// absolute offset.
fn find_ci(html: &str, needle: &str, range: Range<usize>) -> Option<usize> {
    let haystack = html.as_bytes().get(range.clone())?;
    let needle = needle.as_bytes();
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
        .map(|offset| offset + range.start)
}

/// Backward variant of [`find_ci`]: the last match inside the range.
fn rfind_ci(html: &str, needle: &str, range: Range<usize>) -> Option<usize> {
    let haystack = html.as_bytes().get(range.clone())?;
    let needle = needle.as_bytes();
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .rposition(|window| window.eq_ignore_ascii_case(needle))
        .map(|offset| offset + range.start)
}
