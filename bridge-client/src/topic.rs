//! MQTT topic filter matching and validation.

use crate::error::{ClientError, Result};

/// Check whether a concrete topic matches a subscription filter.
///
/// Supports the MQTT wildcards: `+` matches exactly one level, `#` matches
/// the remainder of the topic (and must be the last level of the filter).
/// Topics starting with `$` are not matched by wildcards at the first level,
/// per the MQTT specification.
pub fn matches_filter(topic: &str, filter: &str) -> bool {
    if topic == filter {
        return true;
    }

    // $-prefixed topics (broker internals like $SYS) never match a filter
    // whose first level is a wildcard.
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut topic_levels = topic.split('/');
    let mut filter_levels = filter.split('/').peekable();

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(expected), Some(level)) if expected == level => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Validate a subscription filter.
///
/// Rejects empty filters, `#` anywhere but the final level, and `+`/`#`
/// embedded inside a level.
pub fn validate_filter(filter: &str) -> Result<()> {
    if filter.is_empty() {
        return Err(ClientError::InvalidFilter("filter is empty".to_string()));
    }

    let levels: Vec<&str> = filter.split('/').collect();
    for (index, level) in levels.iter().enumerate() {
        match *level {
            "#" => {
                if index != levels.len() - 1 {
                    return Err(ClientError::InvalidFilter(format!(
                        "'#' must be the final level: {filter}"
                    )));
                }
            }
            "+" => {}
            other => {
                if other.contains('#') || other.contains('+') {
                    return Err(ClientError::InvalidFilter(format!(
                        "wildcard inside level '{other}': {filter}"
                    )));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(matches_filter("sensors/kitchen", "sensors/kitchen"));
        assert!(!matches_filter("sensors/kitchen", "sensors/hall"));
    }

    #[test]
    fn single_level_wildcard() {
        assert!(matches_filter("sensors/kitchen", "sensors/+"));
        assert!(!matches_filter("sensors/kitchen/temp", "sensors/+"));
        assert!(matches_filter("sensors/kitchen/temp", "sensors/+/temp"));
        assert!(!matches_filter("sensors", "sensors/+"));
    }

    #[test]
    fn multi_level_wildcard() {
        assert!(matches_filter("sensors/kitchen", "sensors/#"));
        assert!(matches_filter("sensors/kitchen/temp", "sensors/#"));
        assert!(matches_filter("anything/at/all", "#"));
        // '#' also matches the parent level itself
        assert!(matches_filter("sensors", "sensors/#"));
    }

    #[test]
    fn dollar_topics_are_not_matched_by_wildcards() {
        assert!(!matches_filter("$SYS/broker/uptime", "#"));
        assert!(!matches_filter("$SYS/broker/uptime", "+/broker/uptime"));
        assert!(matches_filter("$SYS/broker/uptime", "$SYS/broker/uptime"));
        assert!(matches_filter("$SYS/broker/uptime", "$SYS/#"));
    }

    #[test]
    fn filter_validation() {
        assert!(validate_filter("sensors/+/temp").is_ok());
        assert!(validate_filter("sensors/#").is_ok());
        assert!(validate_filter("#").is_ok());
        assert!(validate_filter("plain/topic").is_ok());

        assert!(validate_filter("").is_err());
        assert!(validate_filter("a/#/b").is_err());
        assert!(validate_filter("a/b#").is_err());
        assert!(validate_filter("a/b+c").is_err());
    }
}
