//! Formatting helpers for CLI output

use chrono::{DateTime, Local, Utc};
use uuid::Uuid;

/// Safely truncate a string to a maximum number of characters (not bytes).
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}...")
    } else {
        s.to_string()
    }
}

/// First eight hex digits, enough to pass back as a prefix
pub fn short_id(id: Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

pub fn format_minutes(minutes: u32) -> String {
    if minutes >= 60 {
        format!("{}h {:02}m", minutes / 60, minutes % 60)
    } else {
        format!("{minutes}m")
    }
}

pub fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(
        || "-".to_string(),
        |at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 5), "hello...");
        assert_eq!(truncate_str("\u{96c6}\u{4e2d}\u{529b}", 2), "\u{96c6}\u{4e2d}...");
    }

    #[test]
    fn test_short_id_is_prefix() {
        let id = Uuid::new_v4();
        assert!(id.to_string().starts_with(&short_id(id)));
        assert_eq!(short_id(id).len(), 8);
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(25), "25m");
        assert_eq!(format_minutes(60), "1h 00m");
        assert_eq!(format_minutes(135), "2h 15m");
    }

    #[test]
    fn test_format_time_missing() {
        assert_eq!(format_time(None), "-");
    }
}
