use crate::types::raw::Direction;
use chrono::NaiveDateTime;
use regex::Regex;
use std::collections::VecDeque;

/// Ring buffer over the bytes scanned past before a message start.
/// Newline bytes are never stored, so the snapshot reads as the flattened
/// log text immediately preceding `8=FIX`.
#[derive(Debug)]
pub struct ContextRing {
    buf: VecDeque<u8>,
    capacity: usize,
}

impl ContextRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, byte: u8) {
        if byte == b'\n' || byte == b'\r' {
            return;
        }
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(byte);
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.push(b);
        }
    }

    /// ISO-Latin-1 decode of the current window.
    pub fn snapshot(&self) -> String {
        self.buf.iter().map(|&b| b as char).collect()
    }
}

/// Extracts the optional timestamp and IN/OUT direction from the context
/// preceding a message. When a pattern matches more than once, the last
/// occurrence wins.
#[derive(Debug)]
pub struct ContextParser {
    timestamp: Regex,
    direction: Regex,
}

impl ContextParser {
    pub fn new() -> Self {
        Self {
            // ISO-8601-like: date, space or T, time, optional fractional
            // seconds and timezone tail.
            timestamp: Regex::new(
                r"\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?",
            )
            .expect("timestamp regex"),
            direction: Regex::new(r"\b(?i)(IN|OUT)\b").expect("direction regex"),
        }
    }

    pub fn timestamp(&self, context: &str) -> Option<String> {
        self.timestamp
            .find_iter(context)
            .filter(|m| is_calendar_valid(m.as_str()))
            .last()
            .map(|m| m.as_str().to_string())
    }

    pub fn direction(&self, context: &str) -> Option<Direction> {
        self.direction
            .find_iter(context)
            .last()
            .and_then(|m| Direction::from_token(m.as_str()))
    }
}

impl Default for ContextParser {
    fn default() -> Self {
        Self::new()
    }
}

/// The regex only checks shape; reject impossible dates like month 13.
fn is_calendar_valid(candidate: &str) -> bool {
    if candidate.len() < 19 {
        return false;
    }
    let head = &candidate[..19];
    NaiveDateTime::parse_from_str(head, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(head, "%Y-%m-%dT%H:%M:%S"))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_skips_newlines_and_bounds() {
        let mut ring = ContextRing::new(4);
        ring.extend(b"ab\ncdef");
        assert_eq!(ring.snapshot(), "cdef");
    }

    #[test]
    fn test_timestamp_variants() {
        let parser = ContextParser::new();
        assert_eq!(
            parser.timestamp("2026-01-10 10:15:30.100 INFO"),
            Some("2026-01-10 10:15:30.100".to_string())
        );
        assert_eq!(
            parser.timestamp("at 2026-01-10T10:15:30Z done"),
            Some("2026-01-10T10:15:30Z".to_string())
        );
        assert_eq!(parser.timestamp("20260110-10:15:30"), None);
    }

    #[test]
    fn test_last_match_wins() {
        let parser = ContextParser::new();
        let context = "2026-01-10 10:15:30 IN retry 2026-01-10 10:15:31 OUT ";
        assert_eq!(
            parser.timestamp(context),
            Some("2026-01-10 10:15:31".to_string())
        );
        assert_eq!(parser.direction(context), Some(Direction::Out));
    }

    #[test]
    fn test_impossible_date_rejected() {
        let parser = ContextParser::new();
        assert_eq!(parser.timestamp("2026-13-45 99:00:00 IN"), None);
        assert!(parser.timestamp("2026-02-28 10:00:00 IN").is_some());
    }

    #[test]
    fn test_direction_word_bounded() {
        let parser = ContextParser::new();
        assert_eq!(parser.direction("INBOUND gateway"), None);
        assert_eq!(parser.direction("msg in "), Some(Direction::In));
    }
}
