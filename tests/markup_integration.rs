//! Integration tests for the mirror markup scanner against a realistic
//! rendered page.

use freegames_core::{EntryKind, GameId, parse_markup};

const MIRROR_FEED: &str = include_str!("fixtures/mirror_feed.html");

fn sub(id: i64) -> GameId {
    GameId::parse(&format!("s/{id}")).unwrap()
}

fn app(id: i64) -> GameId {
    GameId::parse(&format!("a/{id}")).unwrap()
}

#[test]
fn test_fixture_block_counts() {
    let all = parse_markup(MIRROR_FEED, false);
    assert_eq!(all.len(), 25, "every qualifying block without dedup");

    let unique = parse_markup(MIRROR_FEED, true);
    assert_eq!(unique.len(), 13, "one entry per identifier set with dedup");
}

#[test]
fn test_dedup_keeps_first_occurrence_in_document_order() {
    let entries = parse_markup(MIRROR_FEED, true);
    assert_eq!(entries[0].ids, vec![sub(762_440)]);
    assert_eq!(entries[0].title, "rainswept_steam_game");
    // The repost lists the same identifiers in a different order; it must
    // still collapse into the first block.
    assert!(!entries.iter().skip(1).any(|e| e.ids.contains(&sub(762_440))));
}

#[test]
fn test_known_block_date() {
    let entries = parse_markup(MIRROR_FEED, true);
    // First block carries "May 31 2024, 12:28:53 UTC".
    assert_eq!(entries[0].date, 1_717_158_533);
}

#[test]
fn test_order_insensitive_dedup_of_multi_id_commands() {
    let entries = parse_markup(MIRROR_FEED, true);
    let orbital: Vec<_> = entries
        .iter()
        .filter(|e| e.ids.contains(&sub(1_044_520)))
        .collect();
    assert_eq!(orbital.len(), 1);
    assert_eq!(orbital[0].ids, vec![sub(1_044_520), app(1_631_250)]);
}

#[test]
fn test_classification_flags() {
    let entries = parse_markup(MIRROR_FEED, true);
    let find = |id: GameId| {
        entries
            .iter()
            .find(|e| e.ids.contains(&id))
            .unwrap_or_else(|| panic!("missing entry for {id}"))
    };

    // "free DLC for a ..." blurb.
    let dlc = find(app(1_601_550));
    assert!(dlc.kind.is_dlc());
    assert!(!dlc.kind.is_free_to_play());

    // "permanently free" blurb.
    let permafree = find(sub(881_190));
    assert!(permafree.kind.is_free_to_play());
    assert!(!permafree.kind.is_dlc());

    // "free to play" blurb.
    let f2p = find(app(570_940));
    assert!(f2p.kind.is_free_to_play());

    // Both phrases at once.
    let both = find(sub(985_690));
    assert_eq!(both.kind, EntryKind::DLC | EntryKind::FREE_TO_PLAY);

    // Neutral blurb.
    let plain = find(sub(762_440));
    assert_eq!(plain.kind, EntryKind::NONE);
}

#[test]
fn test_malformed_and_non_command_blocks_are_skipped() {
    // The fixture contains a "!status" comment and an orphaned command
    // without a permalink anchor; neither may surface.
    let all = parse_markup(MIRROR_FEED, false);
    assert!(all.iter().all(|e| !e.ids.contains(&sub(99_999))));
    assert!(all.iter().all(|e| e.title != "status_check"));
}

#[test]
fn test_every_entry_parses_a_real_date() {
    // No block in the fixture should fall back to "now".
    let all = parse_markup(MIRROR_FEED, false);
    for entry in &all {
        assert!(
            (1_700_000_000..1_750_000_000).contains(&entry.date),
            "unexpected date {} for {}",
            entry.date,
            entry.title
        );
    }
}
