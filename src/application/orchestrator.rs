//! Forwarding state machine
//!
//! Drives a call through dial attempts, fallback resolution, and warm
//! transfer across independent stateless webhooks. All continuity lives in
//! the transfer log; every transition is computed from the persisted state
//! read at the start of the invocation, so concurrent or duplicate webhook
//! delivery cannot advance the machine twice.
//!
//! Webhook-facing methods never return an error: any internal failure
//! degrades to the next-safest terminal document so the caller is never
//! left in dead air.

use crate::application::resolver::TenantResolution;
use crate::domain::call::{Call, CallPatch, CallStatus, CallStore};
use crate::domain::forwarding::{FallbackPolicy, ForwardStore, ForwardTarget, RingStrategy};
use crate::domain::phone::normalize_e164;
use crate::domain::routing::{RoutingStore, RuleAction};
use crate::domain::shared::{DomainError, Result};
use crate::domain::transfer::{TransferLog, TransferLogPatch, TransferLogStore, TransferStatus};
use crate::infrastructure::callcontrol::{builder, Document};
use crate::infrastructure::telephony::{TelephonyClient, VoiceAgentClient};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const NO_TARGETS_MESSAGE: &str =
    "We're sorry, no forwarding destination is configured for this number. Goodbye.";
const AGENT_UNAVAILABLE_MESSAGE: &str =
    "We're sorry, we are unable to connect you right now. Please try again later. Goodbye.";
const GOODBYE_MESSAGE: &str = "Thank you for calling. Goodbye.";
const CALLBACK_CONFIRM_MESSAGE: &str =
    "Thank you. We will call you back shortly. Goodbye.";
const CALLBACK_INVALID_MESSAGE: &str =
    "We didn't receive a valid number. Goodbye.";
const RECORDING_THANKS_MESSAGE: &str = "Thank you for your message. Goodbye.";
const WHISPER_DEFAULT_MESSAGE: &str =
    "Incoming forwarded call. Connecting you to the caller now.";

/// Builds the callback URLs the provider invokes as a call progresses.
///
/// The dial action URL embeds the attempt index it was rendered for, which
/// is what makes duplicate webhook delivery detectable: a replayed callback
/// carries the index of the cycle that produced it.
#[derive(Debug, Clone)]
pub struct CallbackUrls {
    base: String,
}

impl CallbackUrls {
    pub fn new(public_base_url: &str) -> Self {
        Self {
            base: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn dial_action(&self, attempt: u32) -> String {
        format!("{}/webhooks/dial?attempt={}", self.base, attempt)
    }

    pub fn whisper(&self, parent_call_id: &str) -> String {
        format!("{}/webhooks/whisper?parent={}", self.base, parent_call_id)
    }

    pub fn voicemail_action(&self) -> String {
        format!("{}/webhooks/voicemail", self.base)
    }

    pub fn callback_action(&self) -> String {
        format!("{}/webhooks/callback", self.base)
    }
}

/// Outcome of a dial attempt as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialOutcome {
    Answered,
    /// No-answer, busy, failed, and anything unrecognized
    NoAnswer,
}

impl DialOutcome {
    /// Lenient parse; unknown values are treated as not answered so the
    /// machine keeps making progress toward a terminal state.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "completed" | "answered" => DialOutcome::Answered,
            _ => DialOutcome::NoAnswer,
        }
    }
}

/// Context carried into a forwarding cycle, spoken to the human (whisper)
/// and kept on the transfer log for audit.
#[derive(Debug, Clone, Default)]
pub struct TransferContext {
    pub summary: Option<String>,
    pub reason: Option<String>,
    pub agent_key: Option<String>,
}

/// Accepted warm-transfer request.
#[derive(Debug, Clone)]
pub struct WarmTransferAccepted {
    pub call_id: String,
    pub status: TransferStatus,
}

pub struct TransferOrchestrator {
    transfers: Arc<dyn TransferLogStore>,
    calls: Arc<dyn CallStore>,
    forwards: Arc<dyn ForwardStore>,
    routing: Arc<dyn RoutingStore>,
    telephony: Arc<dyn TelephonyClient>,
    voice_agent: Arc<dyn VoiceAgentClient>,
    urls: CallbackUrls,
    default_country: String,
}

impl TransferOrchestrator {
    pub fn new(
        transfers: Arc<dyn TransferLogStore>,
        calls: Arc<dyn CallStore>,
        forwards: Arc<dyn ForwardStore>,
        routing: Arc<dyn RoutingStore>,
        telephony: Arc<dyn TelephonyClient>,
        voice_agent: Arc<dyn VoiceAgentClient>,
        urls: CallbackUrls,
        default_country: &str,
    ) -> Self {
        Self {
            transfers,
            calls,
            forwards,
            routing,
            telephony,
            voice_agent,
            urls,
            default_country: default_country.to_string(),
        }
    }

    /// First webhook of an inbound call: record the call and render the
    /// opening document for the action the tenant's rules decided.
    pub async fn handle_inbound(
        &self,
        resolution: &TenantResolution,
        call_id: &str,
        caller: &str,
        action: RuleAction,
    ) -> Document {
        let call = Call::inbound(
            &resolution.tenant_id,
            call_id,
            caller,
            &resolution.phone_number,
        );
        if let Err(e) = self.calls.upsert(&call).await {
            error!("Failed to record inbound call {}: {}", call_id, e);
        }

        match action {
            RuleAction::Agent { agent_key } => {
                let key = agent_key.unwrap_or_else(|| "default".to_string());
                match self.connect_agent(resolution, call_id, caller, &key).await {
                    Ok(doc) => doc,
                    Err(e) => {
                        // A dead agent service must not strand the caller;
                        // ring the humans instead
                        warn!(
                            "Agent session for call {} failed ({}); degrading to forwarding",
                            call_id, e
                        );
                        self.begin_forwarding(resolution, call_id, None, TransferContext::default())
                            .await
                    }
                }
            }
            RuleAction::Forward { forward_mode } => {
                self.begin_forwarding(resolution, call_id, forward_mode, TransferContext::default())
                    .await
            }
            RuleAction::Voicemail => {
                let log = TransferLog::new(
                    &resolution.tenant_id,
                    call_id,
                    TransferStatus::Fallback,
                    Vec::new(),
                    resolution.plan.ring_strategy,
                    resolution.plan.timeout_seconds,
                    Some(FallbackPolicy::Voicemail),
                );
                if let Err(e) = self.transfers.put(&log).await {
                    error!("Failed to record voicemail transfer log: {}", e);
                }
                builder::voicemail(&self.urls.voicemail_action())
            }
        }
    }

    /// Start (or restart) a forwarding cycle for a call.
    pub async fn begin_forwarding(
        &self,
        resolution: &TenantResolution,
        call_id: &str,
        strategy_override: Option<RingStrategy>,
        context: TransferContext,
    ) -> Document {
        let targets = resolution.plan.dial_order(&resolution.config.country);
        if targets.is_empty() {
            info!("No usable forwarding targets for call {}", call_id);
            return builder::hangup(NO_TARGETS_MESSAGE);
        }

        let ring_strategy = strategy_override.unwrap_or(resolution.plan.ring_strategy);
        let log = TransferLog::new(
            &resolution.tenant_id,
            call_id,
            TransferStatus::Dialing,
            targets.clone(),
            ring_strategy,
            resolution.plan.timeout_seconds,
            resolution.plan.fallback,
        )
        .with_context(context.summary, context.reason, context.agent_key);

        if let Err(e) = self.transfers.put(&log).await {
            // The first leg still rings; later cycles depend on this row
            error!("Failed to persist transfer log for call {}: {}", call_id, e);
        }
        if let Err(e) = self
            .calls
            .update(
                &resolution.tenant_id,
                call_id,
                CallPatch {
                    status: Some(CallStatus::Forwarding),
                    ..Default::default()
                },
            )
            .await
        {
            error!("Failed to mark call {} forwarding: {}", call_id, e);
        }

        builder::dial(
            &targets,
            0,
            ring_strategy,
            log.timeout_seconds,
            &self.urls.whisper(call_id),
            &self.urls.dial_action(0),
        )
    }

    /// Dial-outcome webhook. `attempt` is the index embedded in the action
    /// URL of the dial document that produced this callback.
    pub async fn handle_dial_outcome(
        &self,
        call_id: &str,
        outcome: DialOutcome,
        attempt: u32,
    ) -> Document {
        let log = match self.transfers.find_by_call_id(call_id).await {
            Ok(Some(log)) => log,
            Ok(None) => {
                warn!("Dial outcome for unknown call {}", call_id);
                return match outcome {
                    DialOutcome::Answered => builder::proceed(),
                    DialOutcome::NoAnswer => builder::hangup(GOODBYE_MESSAGE),
                };
            }
            Err(e) => {
                error!("Failed to load transfer log for call {}: {}", call_id, e);
                return builder::hangup(AGENT_UNAVAILABLE_MESSAGE);
            }
        };

        if log.status.is_terminal() {
            debug!("Dial outcome for call {} after terminal state", call_id);
            return builder::proceed();
        }

        // A replayed webhook carries the attempt index of the cycle that
        // produced it; a mismatch means this outcome was already applied.
        // Re-render the current state without advancing.
        if attempt != log.current_index {
            debug!(
                "Stale dial outcome for call {} (attempt {}, current {})",
                call_id, attempt, log.current_index
            );
            return self.rerender(&log).await;
        }

        match outcome {
            DialOutcome::Answered => {
                self.apply(
                    &log,
                    TransferLogPatch {
                        status: Some(TransferStatus::Connected),
                        ..Default::default()
                    },
                )
                .await;
                self.patch_call(
                    &log.tenant_id,
                    call_id,
                    CallPatch {
                        status: Some(CallStatus::InProgress),
                        ..Default::default()
                    },
                )
                .await;
                builder::proceed()
            }
            DialOutcome::NoAnswer => {
                let sequential = log.ring_strategy == RingStrategy::Sequential;
                if sequential && log.has_next_target() {
                    let next = log.current_index + 1;
                    self.apply(
                        &log,
                        TransferLogPatch {
                            current_index: Some(next),
                            ..Default::default()
                        },
                    )
                    .await;
                    builder::dial(
                        &log.targets,
                        next as usize,
                        log.ring_strategy,
                        log.timeout_seconds,
                        &self.urls.whisper(call_id),
                        &self.urls.dial_action(next),
                    )
                } else {
                    self.apply(
                        &log,
                        TransferLogPatch {
                            status: Some(TransferStatus::Fallback),
                            ..Default::default()
                        },
                    )
                    .await;
                    self.resolve_fallback(&log).await
                }
            }
        }
    }

    /// Whisper callback: short context spoken to the human before bridging.
    pub async fn handle_whisper(&self, parent_call_id: &str) -> Document {
        let summary = match self.transfers.find_by_call_id(parent_call_id).await {
            Ok(Some(log)) => log.summary,
            _ => None,
        };
        let message = summary
            .map(|s| format!("Incoming forwarded call. {}", s))
            .unwrap_or_else(|| WHISPER_DEFAULT_MESSAGE.to_string());
        Document::new().say(&message)
    }

    /// Gather callback from the ai_callback fallback.
    pub async fn handle_callback_digits(&self, call_id: &str, digits: &str) -> Document {
        let number = match normalize_e164(digits, &self.default_country) {
            Some(n) => n,
            None => {
                info!("Unusable callback digits for call {}", call_id);
                return builder::hangup(CALLBACK_INVALID_MESSAGE);
            }
        };

        match self.transfers.find_by_call_id(call_id).await {
            Ok(Some(log)) => {
                self.apply(
                    &log,
                    TransferLogPatch {
                        status: Some(TransferStatus::CallbackCaptured),
                        callback_number: Some(number),
                        ..Default::default()
                    },
                )
                .await;
                self.patch_call(
                    &log.tenant_id,
                    call_id,
                    CallPatch {
                        status: Some(CallStatus::Completed),
                        ended_at: Some(Utc::now()),
                        ..Default::default()
                    },
                )
                .await;
            }
            Ok(None) => warn!("Callback digits for unknown call {}", call_id),
            Err(e) => error!("Failed to load transfer log for call {}: {}", call_id, e),
        }

        builder::hangup(CALLBACK_CONFIRM_MESSAGE)
    }

    /// Recording-complete callback from the voicemail fallback.
    pub async fn handle_recording_complete(
        &self,
        call_id: &str,
        recording_url: Option<String>,
    ) -> Document {
        match self.transfers.find_by_call_id(call_id).await {
            Ok(Some(log)) => {
                self.apply(
                    &log,
                    TransferLogPatch {
                        recording_url,
                        ..Default::default()
                    },
                )
                .await;
                self.patch_call(
                    &log.tenant_id,
                    call_id,
                    CallPatch {
                        status: Some(CallStatus::Completed),
                        ended_at: Some(Utc::now()),
                        ..Default::default()
                    },
                )
                .await;
            }
            Ok(None) => warn!("Recording completion for unknown call {}", call_id),
            Err(e) => error!("Failed to load transfer log for call {}: {}", call_id, e),
        }

        builder::hangup(RECORDING_THANKS_MESSAGE)
    }

    /// Out-of-band warm transfer: start a fresh forwarding cycle for a live
    /// call and redirect its control document to the produced dial.
    ///
    /// The only orchestrator entry point allowed to fail outward; its caller
    /// is an authenticated JSON API, not the telephony provider.
    pub async fn warm_transfer(
        &self,
        call_id: &str,
        preferred_target: Option<&str>,
        summary: Option<String>,
        reason: Option<String>,
    ) -> Result<WarmTransferAccepted> {
        let call = self
            .calls
            .find_by_call_id(call_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("call {}", call_id)))?;
        let phone_number = call.ai_phone_number.clone().ok_or_else(|| {
            DomainError::Validation(format!("call {} has no inbound number on record", call_id))
        })?;

        let plan = self
            .forwards
            .get(&call.tenant_id, &phone_number)
            .await?
            .ok_or_else(|| {
                DomainError::NotFound(format!("forward plan for {}", phone_number))
            })?;

        // National-format numbers resolve against the tenant's country, the
        // same way the inbound path dials them
        let country = match self.routing.get(&call.tenant_id, &phone_number).await {
            Ok(Some(config)) => config.country,
            Ok(None) => self.default_country.clone(),
            Err(e) => {
                warn!(
                    "Failed to load routing config for call {} ({}); using default country",
                    call_id, e
                );
                self.default_country.clone()
            }
        };

        let mut targets = plan.dial_order(&country);
        if let Some(preferred) = preferred_target {
            if let Some(to) = normalize_e164(preferred, &country) {
                // The preferred target rings first regardless of its
                // configured priority
                match targets.iter().position(|t| t.to == to) {
                    Some(pos) => {
                        let target = targets.remove(pos);
                        targets.insert(0, target);
                    }
                    None => targets.insert(
                        0,
                        ForwardTarget {
                            to,
                            label: Some("warm transfer".to_string()),
                            priority: 0,
                        },
                    ),
                }
            } else {
                warn!(
                    "Ignoring unusable preferred target {:?} for call {}",
                    preferred, call_id
                );
            }
        }
        if targets.is_empty() {
            return Err(DomainError::Validation(
                "no forwarding targets configured".to_string(),
            ));
        }

        let log = TransferLog::new(
            &call.tenant_id,
            call_id,
            TransferStatus::WarmTransferRequested,
            targets.clone(),
            plan.ring_strategy,
            plan.timeout_seconds,
            plan.fallback,
        )
        .with_context(summary, reason, call.selected_agent_key.clone());
        self.transfers.put(&log).await?;

        let document = builder::dial(
            &targets,
            0,
            plan.ring_strategy,
            plan.timeout_seconds,
            &self.urls.whisper(call_id),
            &self.urls.dial_action(0),
        );
        self.telephony
            .redirect_call(call_id, &document.render())
            .await?;

        let updated = self
            .transfers
            .update(
                &call.tenant_id,
                call_id,
                TransferLogPatch {
                    status: Some(TransferStatus::Dialing),
                    ..Default::default()
                },
            )
            .await?;
        self.patch_call(
            &call.tenant_id,
            call_id,
            CallPatch {
                status: Some(CallStatus::Forwarding),
                ..Default::default()
            },
        )
        .await;

        info!("Warm transfer accepted for call {}", call_id);
        Ok(WarmTransferAccepted {
            call_id: call_id.to_string(),
            status: updated.status,
        })
    }

    async fn connect_agent(
        &self,
        resolution: &TenantResolution,
        call_id: &str,
        caller: &str,
        agent_key: &str,
    ) -> Result<Document> {
        let session = self
            .voice_agent
            .start_session(
                agent_key,
                caller,
                serde_json::json!({
                    "tenant_id": resolution.tenant_id,
                    "call_id": call_id,
                    "dialed_number": resolution.phone_number,
                }),
            )
            .await?;

        self.patch_call(
            &resolution.tenant_id,
            call_id,
            CallPatch {
                voice_agent_session_id: Some(session.session_id.clone()),
                selected_agent_key: Some(agent_key.to_string()),
                status: Some(CallStatus::InProgress),
                ..Default::default()
            },
        )
        .await;

        Ok(builder::agent_connect(&session.join_handle))
    }

    /// Resolve the configured fallback once dialing is exhausted. Any
    /// failure here, including an unknown or missing policy, lands on a
    /// plain hangup.
    async fn resolve_fallback(&self, log: &TransferLog) -> Document {
        match log.fallback {
            Some(FallbackPolicy::Voicemail) => {
                builder::voicemail(&self.urls.voicemail_action())
            }
            Some(FallbackPolicy::AiCallback) => {
                builder::ai_callback_capture(&self.urls.callback_action())
            }
            Some(FallbackPolicy::Agent) => {
                let agent_key = log
                    .agent_key
                    .clone()
                    .unwrap_or_else(|| "default".to_string());
                let caller = match self.calls.get(&log.tenant_id, &log.call_id).await {
                    Ok(Some(call)) => call.caller_number.unwrap_or_default(),
                    _ => String::new(),
                };
                let session = self
                    .voice_agent
                    .start_session(
                        &agent_key,
                        &caller,
                        serde_json::json!({
                            "tenant_id": log.tenant_id,
                            "call_id": log.call_id,
                            "fallback": true,
                        }),
                    )
                    .await;
                match session {
                    Ok(session) => {
                        self.apply(
                            log,
                            TransferLogPatch {
                                status: Some(TransferStatus::FallbackAgent),
                                agent_key: Some(agent_key.clone()),
                                ..Default::default()
                            },
                        )
                        .await;
                        // Same call id, merged into the existing row, so
                        // the fallback never double-counts the call
                        self.patch_call(
                            &log.tenant_id,
                            &log.call_id,
                            CallPatch {
                                voice_agent_session_id: Some(session.session_id.clone()),
                                selected_agent_key: Some(agent_key),
                                status: Some(CallStatus::InProgress),
                                ..Default::default()
                            },
                        )
                        .await;
                        builder::agent_connect(&session.join_handle)
                    }
                    Err(e) => {
                        warn!(
                            "Agent fallback failed for call {} ({}); hanging up",
                            log.call_id, e
                        );
                        builder::hangup(AGENT_UNAVAILABLE_MESSAGE)
                    }
                }
            }
            None => builder::hangup(GOODBYE_MESSAGE),
        }
    }

    /// Re-render the document for the log's current state, used when a
    /// duplicate webhook must not advance the machine.
    async fn rerender(&self, log: &TransferLog) -> Document {
        match log.status {
            TransferStatus::Dialing | TransferStatus::WarmTransferRequested => builder::dial(
                &log.targets,
                log.current_index as usize,
                log.ring_strategy,
                log.timeout_seconds,
                &self.urls.whisper(&log.call_id),
                &self.urls.dial_action(log.current_index),
            ),
            TransferStatus::Fallback => self.resolve_fallback(log).await,
            _ => builder::proceed(),
        }
    }

    async fn apply(&self, log: &TransferLog, patch: TransferLogPatch) {
        if let Err(e) = self
            .transfers
            .update(&log.tenant_id, &log.call_id, patch)
            .await
        {
            error!(
                "Failed to update transfer log for call {}: {}",
                log.call_id, e
            );
        }
    }

    async fn patch_call(&self, tenant_id: &str, call_id: &str, patch: CallPatch) {
        if let Err(e) = self.calls.update(tenant_id, call_id, patch).await {
            error!("Failed to update call {}: {}", call_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::forwarding::{ForwardPlan, ForwardPlanPatch};
    use crate::domain::routing::{RoutingConfig, RoutingConfigPatch};
    use crate::infrastructure::persistence::memory::{
        MemoryCallStore, MemoryForwardStore, MemoryRoutingStore, MemoryTransferLogStore,
    };
    use crate::infrastructure::telephony::provider::MockTelephonyClient;
    use crate::infrastructure::telephony::voice_agent::{AgentSession, MockVoiceAgentClient};

    struct Fixture {
        orchestrator: TransferOrchestrator,
        transfers: Arc<MemoryTransferLogStore>,
        calls: Arc<MemoryCallStore>,
        forwards: Arc<MemoryForwardStore>,
        routing: Arc<MemoryRoutingStore>,
    }

    fn fixture_with(
        telephony: MockTelephonyClient,
        voice_agent: MockVoiceAgentClient,
    ) -> Fixture {
        let transfers = Arc::new(MemoryTransferLogStore::new());
        let calls = Arc::new(MemoryCallStore::new());
        let forwards = Arc::new(MemoryForwardStore::new());
        let routing = Arc::new(MemoryRoutingStore::new());
        let orchestrator = TransferOrchestrator::new(
            transfers.clone(),
            calls.clone(),
            forwards.clone(),
            routing.clone(),
            Arc::new(telephony),
            Arc::new(voice_agent),
            CallbackUrls::new("https://ringline.example.com/"),
            "US",
        );
        Fixture {
            orchestrator,
            transfers,
            calls,
            forwards,
            routing,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MockTelephonyClient::new(), MockVoiceAgentClient::new())
    }

    fn target(to: &str, priority: u32) -> ForwardTarget {
        ForwardTarget {
            to: to.to_string(),
            label: None,
            priority,
        }
    }

    fn resolution(targets: Vec<ForwardTarget>, strategy: RingStrategy) -> TenantResolution {
        let mut plan = ForwardPlan::new("t1", "+14155550000");
        plan.targets = targets;
        plan.ring_strategy = strategy;
        TenantResolution {
            tenant_id: "t1".to_string(),
            phone_number: "+14155550000".to_string(),
            config: RoutingConfig::business_hours_default("t1", "+14155550000", "US", "UTC"),
            plan,
        }
    }

    async fn seed_dialing(fx: &Fixture, strategy: RingStrategy, targets: Vec<ForwardTarget>) {
        let resolution = resolution(targets, strategy);
        fx.orchestrator
            .begin_forwarding(&resolution, "CA100", None, TransferContext::default())
            .await;
    }

    #[tokio::test]
    async fn test_begin_forwarding_dials_lowest_priority_first() {
        let fx = fixture();
        let resolution = resolution(
            vec![target("+14155550100", 2), target("+14155550199", 1)],
            RingStrategy::Sequential,
        );
        let xml = fx
            .orchestrator
            .begin_forwarding(&resolution, "CA100", None, TransferContext::default())
            .await
            .render();

        assert!(xml.contains("+14155550199"));
        assert!(!xml.contains("+14155550100"));
        assert!(xml.contains("attempt=0"));

        let log = fx.transfers.get("t1", "CA100").await.unwrap().unwrap();
        assert_eq!(log.status, TransferStatus::Dialing);
        assert_eq!(log.current_index, 0);
    }

    #[tokio::test]
    async fn test_no_targets_goes_straight_to_hangup() {
        let fx = fixture();
        let resolution = resolution(vec![], RingStrategy::Sequential);
        let xml = fx
            .orchestrator
            .begin_forwarding(&resolution, "CA100", None, TransferContext::default())
            .await
            .render();
        assert!(xml.contains("<Hangup/>"));
        assert!(fx.transfers.get("t1", "CA100").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_answered_outcome_is_terminal() {
        let fx = fixture();
        seed_dialing(
            &fx,
            RingStrategy::Sequential,
            vec![target("+14155550100", 1)],
        )
        .await;

        let xml = fx
            .orchestrator
            .handle_dial_outcome("CA100", DialOutcome::Answered, 0)
            .await
            .render();
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response></Response>"
        );

        let log = fx.transfers.get("t1", "CA100").await.unwrap().unwrap();
        assert_eq!(log.status, TransferStatus::Connected);
    }

    #[tokio::test]
    async fn test_sequential_exhaustion_takes_n_cycles() {
        let fx = fixture();
        let targets = vec![
            target("+14155550101", 1),
            target("+14155550102", 2),
            target("+14155550103", 3),
        ];
        seed_dialing(&fx, RingStrategy::Sequential, targets).await;

        // Cycle 1 and 2 advance to the next target
        for attempt in 0..2u32 {
            let xml = fx
                .orchestrator
                .handle_dial_outcome("CA100", DialOutcome::NoAnswer, attempt)
                .await
                .render();
            assert!(xml.contains("<Dial"), "cycle {} should keep dialing", attempt);
            let log = fx.transfers.get("t1", "CA100").await.unwrap().unwrap();
            assert_eq!(log.current_index, attempt + 1);
            assert_eq!(log.status, TransferStatus::Dialing);
        }

        // Cycle 3 exhausts the list: fallback, index never exceeds N-1
        let xml = fx
            .orchestrator
            .handle_dial_outcome("CA100", DialOutcome::NoAnswer, 2)
            .await
            .render();
        assert!(xml.contains("<Record"));
        let log = fx.transfers.get("t1", "CA100").await.unwrap().unwrap();
        assert_eq!(log.status, TransferStatus::Fallback);
        assert_eq!(log.current_index, 2);
    }

    #[tokio::test]
    async fn test_simultaneous_fails_over_on_first_no_answer() {
        let fx = fixture();
        seed_dialing(
            &fx,
            RingStrategy::Simultaneous,
            vec![
                target("+14155550101", 1),
                target("+14155550102", 2),
                target("+14155550103", 3),
            ],
        )
        .await;

        let xml = fx
            .orchestrator
            .handle_dial_outcome("CA100", DialOutcome::NoAnswer, 0)
            .await
            .render();
        assert!(xml.contains("<Record"));
        let log = fx.transfers.get("t1", "CA100").await.unwrap().unwrap();
        assert_eq!(log.status, TransferStatus::Fallback);
    }

    #[tokio::test]
    async fn test_duplicate_no_answer_does_not_advance_twice() {
        let fx = fixture();
        seed_dialing(
            &fx,
            RingStrategy::Sequential,
            vec![
                target("+14155550101", 1),
                target("+14155550102", 2),
                target("+14155550103", 3),
                target("+14155550104", 4),
            ],
        )
        .await;

        // Advance to index 2
        for attempt in 0..2u32 {
            fx.orchestrator
                .handle_dial_outcome("CA100", DialOutcome::NoAnswer, attempt)
                .await;
        }

        // First delivery of the index-2 outcome advances to 3
        fx.orchestrator
            .handle_dial_outcome("CA100", DialOutcome::NoAnswer, 2)
            .await;
        let log = fx.transfers.get("t1", "CA100").await.unwrap().unwrap();
        assert_eq!(log.current_index, 3);

        // Replaying it must not advance past 3
        let xml = fx
            .orchestrator
            .handle_dial_outcome("CA100", DialOutcome::NoAnswer, 2)
            .await
            .render();
        assert!(xml.contains("+14155550104"));
        let log = fx.transfers.get("t1", "CA100").await.unwrap().unwrap();
        assert_eq!(log.current_index, 3);
        assert_eq!(log.status, TransferStatus::Dialing);
    }

    #[tokio::test]
    async fn test_unknown_fallback_renders_hangup() {
        let fx = fixture();
        let mut resolution = resolution(vec![target("+14155550101", 1)], RingStrategy::Sequential);
        resolution.plan.fallback = None;
        fx.orchestrator
            .begin_forwarding(&resolution, "CA100", None, TransferContext::default())
            .await;

        let xml = fx
            .orchestrator
            .handle_dial_outcome("CA100", DialOutcome::NoAnswer, 0)
            .await
            .render();
        assert!(xml.contains("<Hangup/>"));
        assert!(!xml.contains("<Record"));
    }

    #[tokio::test]
    async fn test_ai_callback_fallback_gathers_digits() {
        let fx = fixture();
        let mut resolution = resolution(vec![target("+14155550101", 1)], RingStrategy::Sequential);
        resolution.plan.fallback = Some(FallbackPolicy::AiCallback);
        fx.orchestrator
            .begin_forwarding(&resolution, "CA100", None, TransferContext::default())
            .await;

        let xml = fx
            .orchestrator
            .handle_dial_outcome("CA100", DialOutcome::NoAnswer, 0)
            .await
            .render();
        assert!(xml.contains("<Gather"));

        // The caller enters a number; the log captures it and terminates
        fx.orchestrator
            .handle_callback_digits("CA100", "4155550123")
            .await;
        let log = fx.transfers.get("t1", "CA100").await.unwrap().unwrap();
        assert_eq!(log.status, TransferStatus::CallbackCaptured);
        assert_eq!(log.callback_number.as_deref(), Some("+14155550123"));
    }

    #[tokio::test]
    async fn test_agent_fallback_failure_degrades_to_hangup() {
        let mut voice_agent = MockVoiceAgentClient::new();
        voice_agent.expect_start_session().returning(|_, _, _| {
            Err(DomainError::ProviderUnavailable("timeout".to_string()))
        });
        let fx = fixture_with(MockTelephonyClient::new(), voice_agent);

        let mut resolution = resolution(vec![target("+14155550101", 1)], RingStrategy::Sequential);
        resolution.plan.fallback = Some(FallbackPolicy::Agent);
        fx.orchestrator
            .begin_forwarding(&resolution, "CA100", None, TransferContext::default())
            .await;

        let xml = fx
            .orchestrator
            .handle_dial_outcome("CA100", DialOutcome::NoAnswer, 0)
            .await
            .render();
        assert!(xml.contains("<Hangup/>"));
    }

    #[tokio::test]
    async fn test_agent_fallback_reuses_call_row() {
        let mut voice_agent = MockVoiceAgentClient::new();
        voice_agent.expect_start_session().returning(|_, _, _| {
            Ok(AgentSession {
                session_id: "sess-9".to_string(),
                join_handle: "wss://agent.example.com/join/9".to_string(),
            })
        });
        let fx = fixture_with(MockTelephonyClient::new(), voice_agent);

        fx.calls
            .upsert(&Call::inbound("t1", "CA100", "+14155550111", "+14155550000"))
            .await
            .unwrap();
        let mut resolution = resolution(vec![target("+14155550101", 1)], RingStrategy::Sequential);
        resolution.plan.fallback = Some(FallbackPolicy::Agent);
        fx.orchestrator
            .begin_forwarding(&resolution, "CA100", None, TransferContext::default())
            .await;

        let xml = fx
            .orchestrator
            .handle_dial_outcome("CA100", DialOutcome::NoAnswer, 0)
            .await
            .render();
        assert!(xml.contains("<Connect>"));

        // The existing row was merged, not duplicated
        let call = fx.calls.get("t1", "CA100").await.unwrap().unwrap();
        assert_eq!(call.voice_agent_session_id.as_deref(), Some("sess-9"));
        assert_eq!(call.caller_number.as_deref(), Some("+14155550111"));
        let log = fx.transfers.get("t1", "CA100").await.unwrap().unwrap();
        assert_eq!(log.status, TransferStatus::FallbackAgent);
    }

    #[tokio::test]
    async fn test_warm_transfer_reorders_preferred_target_first() {
        let mut telephony = MockTelephonyClient::new();
        telephony
            .expect_redirect_call()
            .withf(|call_id, xml| {
                // The preferred target must be the first (only) dialed leg
                call_id == "CA100"
                    && xml.contains("+14155550103")
                    && xml.find("+14155550103").unwrap() < xml.find("+14155550101").unwrap()
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let fx = fixture_with(telephony, MockVoiceAgentClient::new());

        fx.calls
            .upsert(&Call::inbound("t1", "CA100", "+14155550111", "+14155550000"))
            .await
            .unwrap();
        fx.forwards
            .upsert(
                "t1",
                "+14155550000",
                ForwardPlanPatch {
                    targets: Some(vec![
                        target("+14155550101", 1),
                        target("+14155550103", 9),
                    ]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let accepted = fx
            .orchestrator
            .warm_transfer("CA100", Some("+14155550103"), Some("billing question".to_string()), None)
            .await
            .unwrap();
        assert_eq!(accepted.status, TransferStatus::Dialing);

        let log = fx.transfers.get("t1", "CA100").await.unwrap().unwrap();
        assert_eq!(log.targets[0].to, "+14155550103");
        assert_eq!(log.summary.as_deref(), Some("billing question"));
    }

    #[tokio::test]
    async fn test_warm_transfer_resolves_preferred_target_in_tenant_country() {
        let mut telephony = MockTelephonyClient::new();
        telephony
            .expect_redirect_call()
            .times(1)
            .returning(|_, _| Ok(()));
        let fx = fixture_with(telephony, MockVoiceAgentClient::new());

        fx.routing
            .upsert(
                "t1",
                "+447700900000",
                RoutingConfigPatch {
                    country: Some("GB".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        fx.calls
            .upsert(&Call::inbound("t1", "CA100", "+447700900111", "+447700900000"))
            .await
            .unwrap();
        fx.forwards
            .upsert(
                "t1",
                "+447700900000",
                ForwardPlanPatch {
                    targets: Some(vec![target("+447700900123", 1)]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        fx.orchestrator
            .warm_transfer("CA100", Some("07911123456"), None, None)
            .await
            .unwrap();

        // National format resolves against the tenant's country, not the
        // service default
        let log = fx.transfers.get("t1", "CA100").await.unwrap().unwrap();
        assert_eq!(log.targets[0].to, "+447911123456");
    }

    #[tokio::test]
    async fn test_warm_transfer_unknown_call_is_not_found() {
        let fx = fixture();
        let err = fx
            .orchestrator
            .warm_transfer("CA404", None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_dial_outcome_parse_is_lenient() {
        assert_eq!(DialOutcome::parse("completed"), DialOutcome::Answered);
        assert_eq!(DialOutcome::parse("Answered"), DialOutcome::Answered);
        assert_eq!(DialOutcome::parse("no-answer"), DialOutcome::NoAnswer);
        assert_eq!(DialOutcome::parse("busy"), DialOutcome::NoAnswer);
        assert_eq!(DialOutcome::parse("failed"), DialOutcome::NoAnswer);
        assert_eq!(DialOutcome::parse("???"), DialOutcome::NoAnswer);
    }

    #[tokio::test]
    async fn test_outcome_after_terminal_state_is_ignored() {
        let fx = fixture();
        seed_dialing(
            &fx,
            RingStrategy::Sequential,
            vec![target("+14155550101", 1)],
        )
        .await;
        fx.orchestrator
            .handle_dial_outcome("CA100", DialOutcome::Answered, 0)
            .await;

        // A late no-answer retry must not reopen the machine
        fx.orchestrator
            .handle_dial_outcome("CA100", DialOutcome::NoAnswer, 0)
            .await;
        let log = fx.transfers.get("t1", "CA100").await.unwrap().unwrap();
        assert_eq!(log.status, TransferStatus::Connected);
    }

    #[tokio::test]
    async fn test_whisper_includes_summary() {
        let fx = fixture();
        let resolution = resolution(vec![target("+14155550101", 1)], RingStrategy::Sequential);
        fx.orchestrator
            .begin_forwarding(
                &resolution,
                "CA100",
                None,
                TransferContext {
                    summary: Some("Caller needs a quote.".to_string()),
                    ..Default::default()
                },
            )
            .await;

        let xml = fx.orchestrator.handle_whisper("CA100").await.render();
        assert!(xml.contains("Caller needs a quote."));
    }
}
