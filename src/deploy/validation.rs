//! Stack name rules.

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest stack name CloudFormation accepts
pub const MAX_STACK_NAME_LENGTH: usize = 128;

static STACK_NAME_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9-]+$").unwrap_or_else(|e| panic!("invalid stack name pattern: {e}"))
});

/// Check `name` against the CloudFormation stack name rules.
///
/// Returns the message for the first rule that fails, checked in the order
/// character set, leading letter, length. `None` means the name is valid.
pub fn validate_stack_name(name: &str) -> Option<String> {
    if !STACK_NAME_CHARSET.is_match(name) {
        return Some(
            "A stack name may contain only alphanumeric characters (case sensitive) and hyphens"
                .to_string(),
        );
    }

    if !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return Some("A stack name must begin with an alphabetic character".to_string());
    }

    if name.len() > MAX_STACK_NAME_LENGTH {
        return Some(format!(
            "A stack name must not be longer than {MAX_STACK_NAME_LENGTH} characters"
        ));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHARSET: &str =
        "A stack name may contain only alphanumeric characters (case sensitive) and hyphens";
    const LEADING: &str = "A stack name must begin with an alphabetic character";
    const LENGTH: &str = "A stack name must not be longer than 128 characters";

    #[test]
    fn test_valid_names() {
        assert_eq!(validate_stack_name("MyStack1"), None);
        assert_eq!(validate_stack_name("a"), None);
        assert_eq!(validate_stack_name("my-stack"), None);
        assert_eq!(validate_stack_name("my-app-prod"), None);
        assert_eq!(validate_stack_name(&"a".repeat(128)), None);
    }

    #[test]
    fn test_character_set() {
        assert_eq!(validate_stack_name("My_Stack").as_deref(), Some(CHARSET));
        assert_eq!(validate_stack_name("my stack").as_deref(), Some(CHARSET));
        assert_eq!(validate_stack_name("").as_deref(), Some(CHARSET));
    }

    #[test]
    fn test_leading_letter() {
        assert_eq!(validate_stack_name("-my-stack").as_deref(), Some(LEADING));
        assert_eq!(validate_stack_name("1stack").as_deref(), Some(LEADING));
    }

    #[test]
    fn test_length() {
        assert_eq!(validate_stack_name(&"a".repeat(129)).as_deref(), Some(LENGTH));
    }

    #[test]
    fn test_earlier_rule_wins() {
        // bad character and bad leading character
        assert_eq!(validate_stack_name("_stack").as_deref(), Some(CHARSET));
        // bad leading character and too long
        let long_numeric = format!("1{}", "a".repeat(200));
        assert_eq!(validate_stack_name(&long_numeric).as_deref(), Some(LEADING));
        // bad character and too long
        let long_invalid = format!("a{}_", "b".repeat(200));
        assert_eq!(validate_stack_name(&long_invalid).as_deref(), Some(CHARSET));
    }
}
