use crate::error::BusError;

/// Single-token wildcard.
pub const WILDCARD: &str = "*";
/// Tail wildcard; matches one or more trailing tokens.
pub const FULL_WILDCARD: &str = ">";

/// Validate a subscription subject (wildcards allowed).
pub fn validate_pattern(subject: &str) -> Result<(), BusError> {
    let tokens: Vec<&str> = subject.split('.').collect();
    for (i, token) in tokens.iter().enumerate() {
        let bad_token = token.is_empty() || token.chars().any(char::is_whitespace);
        let misplaced_tail = *token == FULL_WILDCARD && i + 1 != tokens.len();
        if bad_token || misplaced_tail {
            return Err(BusError::InvalidSubject(subject.to_string()));
        }
    }
    Ok(())
}

/// Validate a publish subject (concrete, no wildcards).
pub fn validate_subject(subject: &str) -> Result<(), BusError> {
    validate_pattern(subject)?;
    if subject.split('.').any(|t| t == WILDCARD || t == FULL_WILDCARD) {
        return Err(BusError::InvalidSubject(subject.to_string()));
    }
    Ok(())
}

/// Whether a concrete `subject` is covered by a subscription `pattern`.
pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');
    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(FULL_WILDCARD), Some(_)) => return true,
            (Some(WILDCARD), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_subjects_match_exactly() {
        assert!(matches("vcap.component.discover", "vcap.component.discover"));
        assert!(!matches("vcap.component.discover", "vcap.component.announce"));
        assert!(!matches("vcap.component", "vcap.component.discover"));
    }

    #[test]
    fn single_token_wildcard() {
        assert!(matches("router.*", "router.register"));
        assert!(!matches("router.*", "router.register.extra"));
        assert!(matches("*.component.*", "vcap.component.announce"));
    }

    #[test]
    fn tail_wildcard_requires_at_least_one_token() {
        assert!(matches("vcap.>", "vcap.component.discover"));
        assert!(!matches("vcap.>", "vcap"));
    }

    #[test]
    fn validation_rejects_empty_and_misplaced_tokens() {
        assert!(validate_pattern("a..b").is_err());
        assert!(validate_pattern("a.>.b").is_err());
        assert!(validate_pattern("has space.b").is_err());
        assert!(validate_pattern("a.*.>").is_ok());
        assert!(validate_subject("a.*").is_err());
        assert!(validate_subject("_INBOX.abc123").is_ok());
    }
}
