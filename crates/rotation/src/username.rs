//! Alternating username pair
//!
//! A rotated credential lives as one of two roles, `name` and `name_clone`.
//! Each rotation writes the role that is *not* current, so the live role keeps
//! working until the new one has been proven.

use crate::error::{RotationError, RotationResult};

/// Suffix distinguishing the second member of the pair
pub const CLONE_SUFFIX: &str = "_clone";

/// PostgreSQL `NAMEDATALEN - 1`.
///
/// Counted in bytes, not characters: the server truncates identifiers at 63
/// bytes, so a multibyte name is rejected before it would be cut short.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Returns the other member of the username pair.
///
/// Strips [`CLONE_SUFFIX`] when present, appends it otherwise. Fails with
/// [`RotationError::UsernameTooLong`] when the appended form would not fit
/// into a PostgreSQL identifier.
pub fn alternate(username: &str) -> RotationResult<String> {
    if let Some(base) = username.strip_suffix(CLONE_SUFFIX) {
        return Ok(base.to_string());
    }

    let cloned = format!("{username}{CLONE_SUFFIX}");
    if cloned.len() > MAX_IDENTIFIER_LEN {
        return Err(RotationError::UsernameTooLong {
            username: username.to_string(),
            limit: MAX_IDENTIFIER_LEN,
        });
    }
    Ok(cloned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_appends_suffix() {
        assert_eq!(alternate("app").unwrap(), "app_clone");
    }

    #[test]
    fn test_strips_suffix() {
        assert_eq!(alternate("app_clone").unwrap(), "app");
    }

    #[test]
    fn test_length_boundary() {
        // 57 + 6 == 63 fits, 58 + 6 does not
        let fits = "a".repeat(MAX_IDENTIFIER_LEN - CLONE_SUFFIX.len());
        assert_eq!(alternate(&fits).unwrap().len(), MAX_IDENTIFIER_LEN);

        let too_long = "a".repeat(MAX_IDENTIFIER_LEN - CLONE_SUFFIX.len() + 1);
        assert!(matches!(
            alternate(&too_long),
            Err(RotationError::UsernameTooLong { limit: 63, .. })
        ));
    }

    #[test]
    fn test_length_counts_bytes() {
        // 29 two-byte chars: 35 chars but 64 bytes once suffixed
        let name = "é".repeat(29);
        assert!(matches!(
            alternate(&name),
            Err(RotationError::UsernameTooLong { limit: 63, .. })
        ));

        let name = "é".repeat(28);
        assert_eq!(alternate(&name).unwrap().len(), 62);
    }

    #[test]
    fn test_long_clone_name_still_strips() {
        let name = format!("{}{CLONE_SUFFIX}", "a".repeat(MAX_IDENTIFIER_LEN));
        assert_eq!(alternate(&name).unwrap(), "a".repeat(MAX_IDENTIFIER_LEN));
    }

    proptest! {
        #[test]
        fn alternate_is_involutive(name in "[a-z][a-z0-9_]{0,56}") {
            // `x_clone_clone` strips to `x_clone`, which strips again
            prop_assume!(!name.ends_with("_clone_clone"));
            let other = alternate(&name).unwrap();
            prop_assert_eq!(alternate(&other).unwrap(), name);
        }

        #[test]
        fn alternate_never_returns_input(name in "[a-z][a-z0-9_]{0,56}") {
            prop_assert_ne!(alternate(&name).unwrap(), name);
        }
    }
}
