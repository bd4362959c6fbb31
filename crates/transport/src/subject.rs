//! Subject validation and wildcard matching.

use crate::error::TransportError;

/// Prefix of the private subjects replies are delivered on
pub const INBOX_PREFIX: &str = "_INBOX";

/// Publish subjects: non-empty tokens, no wildcards
pub fn validate_subject(subject: &str) -> Result<(), TransportError> {
    let valid = !subject.is_empty()
        && subject
            .split('.')
            .all(|token| !token.is_empty() && token != "*" && token != ">");
    if valid {
        Ok(())
    } else {
        Err(TransportError::InvalidSubject(subject.to_string()))
    }
}

/// Subscription patterns: non-empty tokens, `>` only as the last token
pub fn validate_pattern(pattern: &str) -> Result<(), TransportError> {
    let tokens: Vec<&str> = pattern.split('.').collect();
    let last = tokens.len() - 1;
    let valid = !pattern.is_empty()
        && tokens
            .iter()
            .enumerate()
            .all(|(i, token)| !token.is_empty() && (*token != ">" || i == last));
    if valid {
        Ok(())
    } else {
        Err(TransportError::InvalidSubject(pattern.to_string()))
    }
}

/// True when `subject` is matched by `pattern`
pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');
    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => continue,
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
    fn test_literal_match() {
        assert!(matches("a.stream.x", "a.stream.x"));
        assert!(!matches("a.stream.x", "a.stream.y"));
        assert!(!matches("a.stream", "a.stream.x"));
        assert!(!matches("a.stream.x", "a.stream"));
    }

    #[test]
    fn test_single_token_wildcard() {
        assert!(matches("a.*.x", "a.stream.x"));
        assert!(!matches("a.*", "a.stream.x"));
    }

    #[test]
    fn test_tail_wildcard() {
        assert!(matches("a.>", "a.stream.x.AAPL"));
        assert!(matches("a.stream.>", "a.stream.x"));
        // `>` needs at least one token
        assert!(!matches("a.stream.>", "a.stream"));
    }

    #[test]
    fn test_validation() {
        assert!(validate_subject("dataprovider.command").is_ok());
        assert!(validate_subject("a..b").is_err());
        assert!(validate_subject("a.*").is_err());
        assert!(validate_subject("").is_err());

        assert!(validate_pattern("a.*.c").is_ok());
        assert!(validate_pattern("a.>").is_ok());
        assert!(validate_pattern("a.>.c").is_err());
        assert!(validate_pattern("a.").is_err());
    }
}
