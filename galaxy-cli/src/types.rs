//! Common types used across CLI modules

use anyhow::{Result, anyhow};
use uuid::Uuid;

/// Identifier that can be either a full UUID or an unambiguous prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdOrPrefix {
    /// Full UUID
    Full(Uuid),
    /// Prefix that should uniquely identify a job
    Prefix(String),
}

impl IdOrPrefix {
    /// Parse a string into an IdOrPrefix
    ///
    /// Attempts to parse as a full UUID first, otherwise treats as a prefix
    pub fn parse(input: &str) -> Self {
        match Uuid::parse_str(input) {
            Ok(uuid) => IdOrPrefix::Full(uuid),
            Err(_) => IdOrPrefix::Prefix(input.trim().to_lowercase()),
        }
    }

    /// Get the UUID if this is a full ID
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            IdOrPrefix::Full(uuid) => Some(*uuid),
            IdOrPrefix::Prefix(_) => None,
        }
    }

    /// Whether `id` is the job this identifier points at
    pub fn matches(&self, id: Uuid) -> bool {
        match self {
            IdOrPrefix::Full(uuid) => *uuid == id,
            IdOrPrefix::Prefix(prefix) => id.to_string().starts_with(prefix.as_str()),
        }
    }
}

impl std::fmt::Display for IdOrPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdOrPrefix::Full(uuid) => write!(f, "{}", uuid),
            IdOrPrefix::Prefix(prefix) => write!(f, "{}", prefix),
        }
    }
}

/// Parses a `key=value` job parameter
///
/// The value is read as JSON when it parses as JSON (numbers, lists,
/// objects, quoted strings); anything else is kept as a plain string.
pub fn parse_param(input: &str) -> Result<(String, serde_json::Value)> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| anyhow!("expected key=value, got '{}'", input))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("parameter name is empty in '{}'", input));
    }

    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));

    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_or_prefix() {
        let id = Uuid::parse_str("7f3c2a10-5b1e-4c2d-9a8f-0123456789ab").unwrap();
        assert_eq!(IdOrPrefix::parse(&id.to_string()), IdOrPrefix::Full(id));

        let prefix = IdOrPrefix::parse("7F3C2A");
        assert!(prefix.as_uuid().is_none());
        assert!(prefix.matches(id));
        assert!(!prefix.matches(Uuid::nil()));
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("command=echo hi").unwrap(),
            ("command".to_string(), serde_json::json!("echo hi"))
        );
        assert_eq!(
            parse_param("retries=3").unwrap(),
            ("retries".to_string(), serde_json::json!(3))
        );
        assert_eq!(
            parse_param(r#"transfer_job_ids=["a","b"]"#).unwrap().1,
            serde_json::json!(["a", "b"])
        );
        assert_eq!(
            parse_param("query=a=b").unwrap(),
            ("query".to_string(), serde_json::json!("a=b"))
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }
}
