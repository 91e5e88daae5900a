//! Filesystem-safe user identifiers.
//!
//! User ids arrive from the outside world and become directory names under
//! the sessions root, so they must never be able to escape it.

/// Map an arbitrary user identifier to a directory-safe segment.
///
/// Every character outside `[A-Za-z0-9_-]` is replaced with `_`, character
/// for character, so `"../evil"` becomes `"___evil"`. The result never
/// contains `/`, `\` or `..`.
///
/// Distinct identifiers may collide after sanitization (`"a.b"` and
/// `"a_b"` both map to `"a_b"`); callers must not assume uniqueness beyond
/// traversal safety.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_ids_pass_through() {
        assert_eq!(sanitize("alice"), "alice");
        assert_eq!(sanitize("user_42-x"), "user_42-x");
    }

    #[test]
    fn separators_and_dots_become_underscores() {
        assert_eq!(sanitize("../evil"), "___evil");
        assert_eq!(sanitize("a/b\\c"), "a_b_c");
        assert_eq!(sanitize("user.name.123"), "user_name_123");
    }

    #[test]
    fn traversal_inputs_are_neutralized() {
        for input in ["../../etc/passwd", "..\\..\\windows", ".", "..", "/"] {
            let out = sanitize(input);
            assert!(!out.contains('/'), "{out}");
            assert!(!out.contains('\\'), "{out}");
            assert!(!out.contains(".."), "{out}");
        }
    }

    #[test]
    fn non_ascii_is_replaced() {
        assert_eq!(sanitize("ül@ms"), "_l_ms");
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn idempotent() {
        let once = sanitize("a.b/c d");
        assert_eq!(sanitize(&once), once);
    }
}
