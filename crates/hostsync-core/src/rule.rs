//! Routing-rule hostname extraction
//!
//! Rules such as ``Host(`app.example.com`) && PathPrefix(`/api`)`` are not
//! parsed as a grammar. A two-state lexer walks the string and yields the
//! first backtick-delimited literal; everything else is ignored.
//!
//! ```text
//!            '`'                 '`'
//! Outside ────────▶ Inside ─────────────▶ literal (empty ⇒ miss)
//!    ▲  other           │ other
//!    └──┘               └──┘  end of input ⇒ miss
//! ```
//!
//! A miss is not an error: the rule simply does not name a host.

use crate::hostname::Hostname;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Outside,
    Inside { start: usize },
}

/// Return the first backtick-delimited literal in `rule`
///
/// `None` when the rule has no backtick, no closing backtick, or when the
/// first literal is empty.
pub fn extract_hostname(rule: &str) -> Option<&str> {
    let mut state = LexState::Outside;

    for (idx, ch) in rule.char_indices() {
        state = match (state, ch) {
            (LexState::Outside, '`') => LexState::Inside {
                start: idx + ch.len_utf8(),
            },
            (LexState::Inside { start }, '`') => {
                let literal = &rule[start..idx];
                return (!literal.is_empty()).then_some(literal);
            }
            (state, _) => state,
        };
    }

    None
}

/// Strip `.<apex>` from a fully qualified literal
///
/// The suffix comparison is ASCII case-insensitive. Literals outside the apex
/// (or equal to it) are discarded.
pub fn strip_apex(literal: &str, apex: &str) -> Option<Hostname> {
    let suffix_len = apex.len() + 1;
    if literal.len() <= suffix_len {
        return None;
    }

    let split = literal.len() - suffix_len;
    let (head, tail) = (literal.get(..split)?, literal.get(split..)?);
    let tail_apex = tail.strip_prefix('.')?;

    if !tail_apex.eq_ignore_ascii_case(apex) {
        return None;
    }

    Hostname::new(head).ok()
}

/// Extract the bare hostname a rule routes to under `apex`
pub fn hostname_from_rule(rule: &str, apex: &str) -> Option<Hostname> {
    let literal = extract_hostname(rule)?;
    let hostname = strip_apex(literal, apex);

    if hostname.is_none() {
        tracing::debug!("Rule literal '{}' is outside apex {}, skipping", literal, apex);
    }

    hostname
}
