//! Small parsing helpers for command-line values.

use crate::error::RedirectCheckError;

/// Split a `KEY=VALUE` argument.
///
/// The key is trimmed and must not be empty. The value is kept verbatim and
/// may itself contain `=`.
pub fn parse_key_value(input: &str) -> Result<(String, String), RedirectCheckError> {
    let (key, value) = input.split_once('=').ok_or_else(|| {
        RedirectCheckError::config(format!("Expected KEY=VALUE, got '{}'", input))
    })?;

    let key = key.trim();
    if key.is_empty() {
        return Err(RedirectCheckError::config(format!(
            "Missing key in '{}'",
            input
        )));
    }

    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("accept-language=pt-BR").unwrap(),
            ("accept-language".to_string(), "pt-BR".to_string())
        );
        assert_eq!(
            parse_key_value(" t ={{ now }}").unwrap(),
            ("t".to_string(), "{{ now }}".to_string())
        );
        assert_eq!(
            parse_key_value("sig=a=b").unwrap(),
            ("sig".to_string(), "a=b".to_string())
        );
        assert_eq!(
            parse_key_value("empty=").unwrap(),
            ("empty".to_string(), String::new())
        );
    }

    #[test]
    fn test_parse_key_value_errors() {
        assert!(parse_key_value("no-separator").is_err());
        assert!(parse_key_value("=value").is_err());
        assert!(parse_key_value("  =value").is_err());
    }
}
