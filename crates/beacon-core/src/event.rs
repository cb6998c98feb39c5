//! # Local Events
//!
//! The two things the room tells the agent about: a prompt was shown on the
//! room device, and the occupancy status changed.
//!
//! ## Line Format
//! ```text
//! prompt <free text shown on the room device>
//! room-in-use True|False
//! ```

use crate::error::{CoreError, CoreResult};

/// Phrase that marks a prompt as a hold announcement.
pub const DEFAULT_HOLD_PHRASE: &str = "Someone has put this room";

/// An event observed on the local room device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalEvent {
    /// Text displayed on the room device.
    PromptDisplayed { text: String },
    /// Room occupancy status changed.
    OccupancyChanged { occupied: bool },
}

impl LocalEvent {
    /// Parses one line of the local event protocol.
    pub fn parse_line(line: &str) -> CoreResult<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Err(CoreError::EmptyEvent);
        }

        let (kind, rest) = match line.split_once(char::is_whitespace) {
            Some((kind, rest)) => (kind, rest.trim()),
            None => (line, ""),
        };

        match kind {
            "prompt" => Ok(LocalEvent::PromptDisplayed {
                text: rest.to_string(),
            }),
            "room-in-use" => Ok(LocalEvent::OccupancyChanged {
                occupied: parse_occupancy(rest)?,
            }),
            other => Err(CoreError::UnknownEvent(other.to_string())),
        }
    }

    /// True when this is a prompt announcing that the room was put on hold.
    pub fn is_hold(&self, phrase: &str) -> bool {
        match self {
            LocalEvent::PromptDisplayed { text } => !phrase.is_empty() && text.contains(phrase),
            LocalEvent::OccupancyChanged { .. } => false,
        }
    }
}

/// Parses the device's `True`/`False` occupancy strings.
pub fn parse_occupancy(value: &str) -> CoreResult<bool> {
    match value.trim() {
        v if v.eq_ignore_ascii_case("true") => Ok(true),
        v if v.eq_ignore_ascii_case("false") => Ok(false),
        other => Err(CoreError::InvalidOccupancy(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prompt() {
        let event =
            LocalEvent::parse_line("prompt Someone has put this room on hold.").unwrap();
        assert_eq!(
            event,
            LocalEvent::PromptDisplayed {
                text: "Someone has put this room on hold.".to_string()
            }
        );
        assert!(event.is_hold(DEFAULT_HOLD_PHRASE));
    }

    #[test]
    fn test_unrelated_prompt_is_not_hold() {
        let event = LocalEvent::parse_line("prompt Meeting starts in 5 minutes").unwrap();
        assert!(!event.is_hold(DEFAULT_HOLD_PHRASE));
        assert!(!event.is_hold(""));
    }

    #[test]
    fn test_parse_occupancy() {
        assert_eq!(
            LocalEvent::parse_line("room-in-use True").unwrap(),
            LocalEvent::OccupancyChanged { occupied: true }
        );
        assert_eq!(
            LocalEvent::parse_line("  room-in-use   False ").unwrap(),
            LocalEvent::OccupancyChanged { occupied: false }
        );
        assert!(!LocalEvent::OccupancyChanged { occupied: true }.is_hold(DEFAULT_HOLD_PHRASE));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(LocalEvent::parse_line("   "), Err(CoreError::EmptyEvent));
        assert_eq!(
            LocalEvent::parse_line("volume 30"),
            Err(CoreError::UnknownEvent("volume".to_string()))
        );
        assert_eq!(
            LocalEvent::parse_line("room-in-use maybe"),
            Err(CoreError::InvalidOccupancy("maybe".to_string()))
        );
        assert_eq!(
            LocalEvent::parse_line("room-in-use"),
            Err(CoreError::InvalidOccupancy(String::new()))
        );
    }
}
