//! Telephony provider and voice-agent integrations

pub mod provider;
pub mod signature;
pub mod voice_agent;

pub use provider::{HttpTelephonyClient, TelephonyClient};
pub use voice_agent::{AgentSession, HttpVoiceAgentClient, VoiceAgentClient};
