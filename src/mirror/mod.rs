//! Mirror-side discovery: markup scanning and instance management.
//!
//! Mirrors render the same announcement feed as server-side HTML. This
//! module scans that markup without a DOM ([`parse_markup`]) and resolves
//! the set of mirror base URLs to fan out to ([`InstanceList`],
//! [`CachedInstanceList`]).

mod instances;
mod markup;

pub use instances::{CachedInstanceList, InstanceList, INSTANCE_CACHE_TTL};
pub use markup::{MAX_IDS_PER_ENTRY, MirrorEntry, parse_markup};
