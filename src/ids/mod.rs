//! Game identifier value type and free-text parser.
//!
//! A [`GameId`] is a validated `(numeric id, kind)` pair denoting a
//! purchasable unit: a standalone app (`a/730`), a sub/package
//! (`s/303386`), or an untyped bare id (`570`).
//!
//! # Parsing asymmetry
//!
//! A value constructed with [`IdKind::None`] prints as bare digits, but a
//! bare-digit *input* parses as [`IdKind::Sub`]: Sub is the implicit type
//! for untyped numeric identifiers. `parse(to_string(x)) == x` therefore
//! holds for App and Sub kinds only. This asymmetry is inherited behavior
//! that downstream state (the persistent ledger) depends on; do not "fix" it.

use std::fmt;

/// Maximum recognized prefix length; longer prefixes are truncated
/// before matching (`"appxyz/1"` parses as App).
const MAX_PREFIX_LEN: usize = 3;

/// The kind of unit a [`GameId`] refers to.
///
/// The discriminants are stable: they are widened to `i64` inside the
/// persistent ledger blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum IdKind {
    /// Untyped numeric identifier.
    #[default]
    None = 0,
    /// Sub / package identifier.
    Sub = 1,
    /// App identifier.
    App = 2,
}

impl IdKind {
    /// Recovers a kind from its widened ledger representation.
    #[must_use]
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Sub),
            2 => Some(Self::App),
            _ => None,
        }
    }
}

/// A validated game identifier.
///
/// Immutable value type; created by [`GameId::parse`] or [`GameId::new`],
/// never mutated. Equal iff both fields match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GameId {
    id: i64,
    kind: IdKind,
}

impl GameId {
    /// Creates an identifier without validation; see [`GameId::valid`].
    #[must_use]
    pub fn new(id: i64, kind: IdKind) -> Self {
        Self { id, kind }
    }

    /// Numeric id component.
    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Kind component.
    #[must_use]
    pub fn kind(&self) -> IdKind {
        self.kind
    }

    /// A game identifier is valid iff its numeric id is strictly positive.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.id > 0
    }

    /// Parses a free-text token like `a/730`, `SUB/303386` or bare `570`.
    ///
    /// Accepted prefixes (case-insensitive, truncated to three characters):
    /// `a`/`app` for App, `s`/`sub` for Sub. Bare digits parse as Sub.
    /// Rejects empty input, a missing or non-positive id, and unknown
    /// prefixes.
    #[must_use]
    pub fn parse(query: &str) -> Option<Self> {
        if query.is_empty() {
            return None;
        }

        let (prefix, digits) = match query.find('/') {
            Some(index) if index > 0 && index + 1 < query.len() => {
                (&query[..index], &query[index + 1..])
            }
            // "/", "a/" and similar have no id to parse.
            Some(_) => return None,
            None => ("sub", query),
        };

        let id: i64 = digits.parse().ok()?;
        if id <= 0 {
            return None;
        }

        // Truncation may fail on a non-ASCII boundary; such a prefix cannot
        // match anything below, so keeping it whole rejects it all the same.
        let prefix = prefix.get(..MAX_PREFIX_LEN.min(prefix.len())).unwrap_or(prefix);

        let kind = if prefix.eq_ignore_ascii_case("a") || prefix.eq_ignore_ascii_case("app") {
            IdKind::App
        } else if prefix.eq_ignore_ascii_case("s") || prefix.eq_ignore_ascii_case("sub") {
            IdKind::Sub
        } else {
            return None;
        };

        Some(Self { id, kind })
    }

    /// Deterministic 64-bit hash combining both fields.
    ///
    /// The persistent ledger's bucket positions are derived from this value
    /// and stored on disk, so it must be stable across processes — `std`
    /// hashing (randomized or implementation-defined) is not suitable here.
    /// Byte-swapping the kind keeps `a/X` and `s/X` far apart before the
    /// final mix.
    #[must_use]
    pub fn bucket_hash(&self) -> u64 {
        let mut x = (self.id as u64) ^ (self.kind as u64).swap_bytes();
        x ^= x >> 33;
        x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
        x ^= x >> 33;
        x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
        x ^= x >> 33;
        x
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            IdKind::None => write!(f, "{}", self.id),
            IdKind::Sub => write!(f, "s/{}", self.id),
            IdKind::App => write!(f, "a/{}", self.id),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_typed_and_bare_tokens() {
        assert_eq!(GameId::parse("a/730"), Some(GameId::new(730, IdKind::App)));
        assert_eq!(
            GameId::parse("s/303386"),
            Some(GameId::new(303_386, IdKind::Sub))
        );
        assert_eq!(GameId::parse("570"), Some(GameId::new(570, IdKind::Sub)));
        assert_eq!(
            GameId::parse("APP/218620"),
            Some(GameId::new(218_620, IdKind::App))
        );
        assert_eq!(GameId::parse("SuB/42"), Some(GameId::new(42, IdKind::Sub)));
    }

    #[test]
    fn test_parse_rejects_malformed_tokens() {
        for input in ["", "/", "a/", "a/-1", "s/0", "x/123", "app/foo", "-5"] {
            assert_eq!(GameId::parse(input), None, "should reject {input:?}");
        }
    }

    #[test]
    fn test_parse_truncates_long_prefixes() {
        assert_eq!(
            GameId::parse("application/99"),
            Some(GameId::new(99, IdKind::App))
        );
        assert_eq!(
            GameId::parse("subscription/7"),
            Some(GameId::new(7, IdKind::Sub))
        );
    }

    #[test]
    fn test_display_canonical_forms() {
        assert_eq!(GameId::new(730, IdKind::App).to_string(), "a/730");
        assert_eq!(GameId::new(303_386, IdKind::Sub).to_string(), "s/303386");
        assert_eq!(GameId::new(570, IdKind::None).to_string(), "570");
    }

    #[test]
    fn test_round_trip_holds_for_app_and_sub() {
        for id in [
            GameId::new(730, IdKind::App),
            GameId::new(303_386, IdKind::Sub),
        ] {
            assert_eq!(GameId::parse(&id.to_string()), Some(id));
        }
    }

    #[test]
    fn test_round_trip_asymmetry_for_none_kind() {
        // Documented asymmetry: None prints bare, bare parses as Sub.
        let none = GameId::new(570, IdKind::None);
        let reparsed = GameId::parse(&none.to_string()).unwrap();
        assert_eq!(reparsed.id(), 570);
        assert_eq!(reparsed.kind(), IdKind::Sub);
        assert_ne!(reparsed, none);
    }

    #[test]
    fn test_bucket_hash_separates_kinds() {
        let app = GameId::new(730, IdKind::App);
        let sub = GameId::new(730, IdKind::Sub);
        assert_ne!(app.bucket_hash(), sub.bucket_hash());
        // Deterministic across calls.
        assert_eq!(app.bucket_hash(), app.bucket_hash());
    }

    #[test]
    fn test_valid_requires_positive_id() {
        assert!(GameId::new(1, IdKind::None).valid());
        assert!(!GameId::new(0, IdKind::App).valid());
        assert!(!GameId::new(-3, IdKind::Sub).valid());
    }

    #[test]
    fn test_kind_widening_round_trip() {
        for kind in [IdKind::None, IdKind::Sub, IdKind::App] {
            assert_eq!(IdKind::from_i64(kind as i64), Some(kind));
        }
        assert_eq!(IdKind::from_i64(3), None);
        assert_eq!(IdKind::from_i64(-1), None);
    }
}
