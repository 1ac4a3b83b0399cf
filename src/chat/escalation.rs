//! Escalation rules for AI-handled conversations.
//!
//! A single deterministic pass over a conversation snapshot decides whether
//! the assistant should hand off to staff. First matching rule wins; the
//! returned reason is stored on the conversation and shown in the inbox.

/// Hand off after this many consecutive gateway failures.
pub const MAX_AI_FAILURES: i64 = 2;

/// Hand off when the customer's previous message sat unanswered this long.
pub const CUSTOMER_WAIT_MINUTES: i64 = 10;

/// Hand off when a conversation runs this long without contact details.
pub const LONG_CONVERSATION_TURNS: i64 = 12;

/// Phrases that read as an explicit request for a person.
const HUMAN_PHRASES: &[&str] = &[
    "human",
    "real person",
    "actual person",
    "speak to someone",
    "talk to someone",
    "speak with someone",
    "an agent",
    "a representative",
    "the owner",
];

const URGENT_PHRASES: &[&str] = &[
    "urgent",
    "asap",
    "emergency",
    "right away",
    "immediately",
];

/// Snapshot of the conversation state after the current turn.
#[derive(Debug)]
pub struct EscalationInput<'a> {
    /// The customer message that triggered this evaluation.
    pub message: &'a str,
    /// Consecutive AI failures, including any failure on this turn.
    pub ai_failures: i64,
    /// Total messages in the conversation, including this turn.
    pub message_count: i64,
    /// Whether a contact is linked to the conversation.
    pub has_contact: bool,
    /// Minutes the customer's previous message went unanswered, if it did.
    pub minutes_unanswered: Option<i64>,
}

pub fn wants_human(message: &str) -> bool {
    let lower = message.to_lowercase();
    HUMAN_PHRASES.iter().any(|p| lower.contains(p))
}

pub fn is_urgent(message: &str) -> bool {
    let lower = message.to_lowercase();
    URGENT_PHRASES.iter().any(|p| lower.contains(p))
}

/// Returns the escalation reason, or `None` to keep the AI on the line.
pub fn evaluate(input: &EscalationInput<'_>) -> Option<&'static str> {
    if wants_human(input.message) {
        return Some("customer asked for a human");
    }
    if is_urgent(input.message) {
        return Some("urgent request");
    }
    if input.ai_failures >= MAX_AI_FAILURES {
        return Some("assistant failed repeatedly");
    }
    if input
        .minutes_unanswered
        .is_some_and(|m| m >= CUSTOMER_WAIT_MINUTES)
    {
        return Some("customer left waiting");
    }
    if input.message_count >= LONG_CONVERSATION_TURNS && !input.has_contact {
        return Some("long conversation with no contact details");
    }
    None
}
