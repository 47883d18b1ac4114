//! Fixed-width timestamp encoding for SQLite text columns.
//!
//! SQLite compares TEXT lexicographically. Every timestamp written by this
//! crate is UTC with exactly nine fractional digits, so string order is time
//! order and the first ten characters are the UTC calendar day. Values read
//! back are plain RFC 3339 and decode through sqlx as usual.

use crate::error::{MetadataError, MetadataResult};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

const DB_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z"
);

/// Encode `at` for storage or comparison in a timestamp column.
pub(crate) fn db_timestamp(at: OffsetDateTime) -> MetadataResult<String> {
    at.to_offset(UtcOffset::UTC)
        .format(DB_FORMAT)
        .map_err(|e| MetadataError::Internal(format!("unencodable timestamp {at}: {e}")))
}
