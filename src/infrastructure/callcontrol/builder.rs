//! Terminal-outcome document builders
//!
//! One pure function per terminal outcome, each testable against literal
//! expected output. No branch here consults a store or makes a network
//! call; all inputs are already-resolved values.

use super::document::{DialNumber, Document, Verb};
use crate::domain::forwarding::{ForwardTarget, RingStrategy};

/// Maximum voicemail recording length.
pub const MAX_VOICEMAIL_SECONDS: u32 = 120;
/// Digits collected for a callback number (country code + subscriber).
pub const CALLBACK_MAX_DIGITS: u32 = 15;
/// How long the gather waits for the first digit.
pub const CALLBACK_TIMEOUT_SECONDS: u32 = 10;

const VOICEMAIL_PROMPT: &str =
    "We're sorry, no one is available to take your call right now. \
     Please leave a message after the tone.";

const CALLBACK_PROMPT: &str =
    "We're sorry, no one is available right now. To receive a call back, \
     enter your phone number followed by the pound key.";

/// Apology, then record a message with silence trimming.
pub fn voicemail(action_url: &str) -> Document {
    Document::new().say(VOICEMAIL_PROMPT).push(Verb::Record {
        action: action_url.to_string(),
        max_length_seconds: MAX_VOICEMAIL_SECONDS,
        play_beep: true,
        trim_silence: true,
    })
}

/// Collect a DTMF callback number; hangs up politely if nothing is entered.
pub fn ai_callback_capture(action_url: &str) -> Document {
    Document::new()
        .push(Verb::Gather {
            action: action_url.to_string(),
            num_digits: CALLBACK_MAX_DIGITS,
            timeout_seconds: CALLBACK_TIMEOUT_SECONDS,
            prompt: Some(CALLBACK_PROMPT.to_string()),
        })
        // Reached only when the gather times out with no input
        .say("We didn't receive a number. Goodbye.")
        .hangup()
}

/// Speak a message, then end the call.
pub fn hangup(message: &str) -> Document {
    Document::new().say(message).hangup()
}

/// Dial instruction for the current step of a forwarding cycle: one leg if
/// sequential, every leg if simultaneous. Each leg carries the whisper URL
/// played to the human before bridging; the action URL is invoked by the
/// provider once dialing concludes.
pub fn dial(
    targets: &[ForwardTarget],
    current_index: usize,
    ring_strategy: RingStrategy,
    timeout_seconds: u32,
    whisper_url: &str,
    action_url: &str,
) -> Document {
    let legs: Vec<DialNumber> = match ring_strategy {
        RingStrategy::Sequential => targets
            .get(current_index)
            .map(|t| DialNumber {
                number: t.to.clone(),
                url: Some(whisper_url.to_string()),
            })
            .into_iter()
            .collect(),
        RingStrategy::Simultaneous => targets
            .iter()
            .map(|t| DialNumber {
                number: t.to.clone(),
                url: Some(whisper_url.to_string()),
            })
            .collect(),
    };
    Document::new().push(Verb::Dial {
        action: action_url.to_string(),
        timeout_seconds,
        numbers: legs,
    })
}

/// Point the call's media at a voice-agent session.
pub fn agent_connect(session_join_handle: &str) -> Document {
    Document::new().push(Verb::Connect {
        stream_url: session_join_handle.to_string(),
    })
}

/// Empty "continue" document: the bridged call proceeds with no further
/// instruction.
pub fn proceed() -> Document {
    Document::proceed()
}
