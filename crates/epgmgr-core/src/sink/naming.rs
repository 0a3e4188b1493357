//! Entry id segment normalisation.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Prefix used when none is configured.
pub const DEFAULT_SENSOR_PREFIX: &str = "epg";

/// Reduces `raw` to a simple identifier.
///
/// Decomposes to NFKD and drops combining marks (`ö` -> `o`), maps `ß` to
/// `ss`, lowercases ASCII alphanumerics and collapses every other run of
/// characters into a single `_`. Leading and trailing separators are
/// dropped.
#[must_use]
pub fn to_simple(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;

    for c in raw.nfkd().filter(|c| !is_combining_mark(*c)) {
        if c != 'ß' && !c.is_ascii_alphanumeric() {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('_');
        }
        pending_sep = false;
        if c == 'ß' {
            out.push_str("ss");
        } else {
            out.push(c.to_ascii_lowercase());
        }
    }

    out
}
