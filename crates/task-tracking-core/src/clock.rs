//! Timestamp generation (`spec.md` §3, §6): the core always writes UTC
//! ISO-8601 timestamps with a trailing `Z`; readers accept both `Z` and
//! `+00:00` forms (see [`crate::model::parse_updated_at`]).

use chrono::{SecondsFormat, Utc};

#[must_use]
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
