//! Identifier shape checking (`spec.md` §6: `^[A-Za-z0-9_-]+$`).
//!
//! `spec.md` §1 places rich input validation (tags, priorities, due dates,
//! title-derivation) out of the core's scope — it is the CLI collaborator's
//! job. But the core's own invariant maintenance depends on the identifier
//! *shape* directly: status discovery (§4.D) only retains directory names
//! that match it, and orphan-body adoption (§4.H Open Question 2) must
//! reject malformed stems. This module is that narrow, load-bearing slice.

use std::sync::LazyLock;

use regex::Regex;

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("identifier regex is valid"));

#[must_use]
pub fn is_identifier_shaped(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}
