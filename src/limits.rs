//! Hard bounds on caller-supplied data and provisioning.

pub const MAX_TITLE_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 4096;
/// Applies to both playlist and thumbnail references.
pub const MAX_URL_LEN: usize = 2048;
pub const MAX_TAGS_PER_LIVESTREAM: usize = 64;
pub const MAX_TAG_NAME_LEN: usize = 255;

/// Upper bound on the slot grid (a year of one-minute slots fits).
pub const MAX_SLOTS_PER_TERM: u64 = 1_000_000;

pub const MAX_LIST_LIMIT: usize = 10_000;
