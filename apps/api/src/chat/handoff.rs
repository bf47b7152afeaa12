//! Handoff lifecycle of a chat conversation.
//!
//! `none -> pending -> in_progress -> resolved`, forward only. Every event maps
//! a status to the same or a later status; `resolved` is terminal.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    None,
    Pending,
    InProgress,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffEvent {
    /// Visitor asked for a person from the widget.
    Requested,
    /// An operator posted a reply from the console.
    AgentReplied,
    /// An operator closed the conversation.
    Resolve,
}

#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("conversation is already resolved")]
    AlreadyResolved,

    #[error("conversation changed from {expected} while updating; refresh and retry")]
    Stale { expected: &'static str },
}

impl HandoffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandoffStatus::None => "none",
            HandoffStatus::Pending => "pending",
            HandoffStatus::InProgress => "in_progress",
            HandoffStatus::Resolved => "resolved",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "none" => Some(HandoffStatus::None),
            "pending" => Some(HandoffStatus::Pending),
            "in_progress" => Some(HandoffStatus::InProgress),
            "resolved" => Some(HandoffStatus::Resolved),
            _ => None,
        }
    }

    /// A human owns the conversation: the bot stays quiet.
    pub fn is_human_handled(&self) -> bool {
        matches!(self, HandoffStatus::Pending | HandoffStatus::InProgress)
    }

    /// Applies an event. Repeating an event that already took effect is a no-op.
    pub fn apply(self, event: HandoffEvent) -> Result<HandoffStatus, TransitionError> {
        use HandoffEvent::*;
        use HandoffStatus::*;

        match (self, event) {
            (Resolved, _) => Err(TransitionError::AlreadyResolved),
            (None, Requested) => Ok(Pending),
            (Pending | InProgress, Requested) => Ok(self),
            (None | Pending | InProgress, AgentReplied) => Ok(InProgress),
            (None | Pending | InProgress, Resolve) => Ok(Resolved),
        }
    }
}

impl std::fmt::Display for HandoffStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [HandoffStatus; 4] = [
        HandoffStatus::None,
        HandoffStatus::Pending,
        HandoffStatus::InProgress,
        HandoffStatus::Resolved,
    ];
    const EVENTS: [HandoffEvent; 3] = [
        HandoffEvent::Requested,
        HandoffEvent::AgentReplied,
        HandoffEvent::Resolve,
    ];

    #[test]
    fn test_happy_path() {
        let s = HandoffStatus::None;
        let s = s.apply(HandoffEvent::Requested).unwrap();
        assert_eq!(s, HandoffStatus::Pending);
        let s = s.apply(HandoffEvent::AgentReplied).unwrap();
        assert_eq!(s, HandoffStatus::InProgress);
        let s = s.apply(HandoffEvent::Resolve).unwrap();
        assert_eq!(s, HandoffStatus::Resolved);
    }

    #[test]
    fn test_status_never_moves_backwards() {
        for from in ALL {
            for event in EVENTS {
                if let Ok(to) = from.apply(event) {
                    assert!(to >= from, "{from} --{event:?}--> {to} moved backwards");
                }
            }
        }
    }

    #[test]
    fn test_resolved_is_terminal() {
        for event in EVENTS {
            assert_eq!(
                HandoffStatus::Resolved.apply(event),
                Err(TransitionError::AlreadyResolved)
            );
        }
    }

    #[test]
    fn test_repeat_request_is_idempotent() {
        assert_eq!(
            HandoffStatus::InProgress.apply(HandoffEvent::Requested),
            Ok(HandoffStatus::InProgress)
        );
        assert_eq!(
            HandoffStatus::Pending.apply(HandoffEvent::Requested),
            Ok(HandoffStatus::Pending)
        );
    }

    #[test]
    fn test_agent_can_take_over_without_request() {
        assert_eq!(
            HandoffStatus::None.apply(HandoffEvent::AgentReplied),
            Ok(HandoffStatus::InProgress)
        );
    }

    #[test]
    fn test_parse_roundtrips_names() {
        for status in ALL {
            assert_eq!(HandoffStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(HandoffStatus::parse("handoff"), None);
    }

    #[test]
    fn test_human_handled() {
        assert!(!HandoffStatus::None.is_human_handled());
        assert!(HandoffStatus::Pending.is_human_handled());
        assert!(HandoffStatus::InProgress.is_human_handled());
        assert!(!HandoffStatus::Resolved.is_human_handled());
    }
}
