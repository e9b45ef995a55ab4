//! Inbound number resolution
//!
//! Turns the dialed number into everything a webhook needs to act: the
//! owning tenant, the effective routing config, and the effective forward
//! plan. Missing configuration is synthesized from tenant defaults rather
//! than surfaced as an error; an unrecognized number resolves to a value
//! the handler turns into a polite hangup.

use crate::domain::forwarding::{ForwardPlan, ForwardStore};
use crate::domain::phone::normalize_e164;
use crate::domain::routing::{
    match_rule, NumberStore, RoutingConfig, RoutingStore, RuleAction,
};
use crate::domain::shared::Result;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything resolved for a recognized inbound number.
#[derive(Debug, Clone)]
pub struct TenantResolution {
    pub tenant_id: String,
    /// Normalized dialed number
    pub phone_number: String,
    pub config: RoutingConfig,
    pub plan: ForwardPlan,
}

/// Outcome of resolving a dialed number.
#[derive(Debug, Clone)]
pub enum Resolution {
    Tenant(Box<TenantResolution>),
    /// No tenant owns this number (or it did not normalize)
    Unrecognized,
}

pub struct RoutingResolver {
    numbers: Arc<dyn NumberStore>,
    routing: Arc<dyn RoutingStore>,
    forwards: Arc<dyn ForwardStore>,
    default_country: String,
    default_timezone: String,
}

impl RoutingResolver {
    pub fn new(
        numbers: Arc<dyn NumberStore>,
        routing: Arc<dyn RoutingStore>,
        forwards: Arc<dyn ForwardStore>,
        default_country: &str,
        default_timezone: &str,
    ) -> Self {
        Self {
            numbers,
            routing,
            forwards,
            default_country: default_country.to_string(),
            default_timezone: default_timezone.to_string(),
        }
    }

    /// Resolve a dialed number to its tenant context.
    ///
    /// Store lookups may fail; configuration absence never does. A tenant
    /// with a number but no saved config gets the business-hours default,
    /// and a missing forward plan is seeded from the on-file contact number.
    pub async fn resolve(&self, dialed: &str) -> Result<Resolution> {
        let phone_number = match normalize_e164(dialed, &self.default_country) {
            Some(n) => n,
            None => {
                warn!("Dialed number {:?} did not normalize", dialed);
                return Ok(Resolution::Unrecognized);
            }
        };

        let assignment = match self.numbers.get(&phone_number).await? {
            Some(a) => a,
            None => {
                info!("No tenant assignment for {}", phone_number);
                return Ok(Resolution::Unrecognized);
            }
        };

        let config = match self.routing.get(&assignment.tenant_id, &phone_number).await? {
            Some(config) => config,
            None => {
                debug!(
                    "No routing config for {}/{}; synthesizing defaults",
                    assignment.tenant_id, phone_number
                );
                RoutingConfig::business_hours_default(
                    &assignment.tenant_id,
                    &phone_number,
                    &assignment.country,
                    &self.default_timezone,
                )
            }
        };

        let plan = match self.forwards.get(&assignment.tenant_id, &phone_number).await? {
            Some(plan) if !plan.targets.is_empty() => plan,
            _ => ForwardPlan::default_for_contact(
                &assignment.tenant_id,
                &phone_number,
                assignment.contact_number.as_deref(),
                &assignment.country,
            ),
        };

        Ok(Resolution::Tenant(Box::new(TenantResolution {
            tenant_id: assignment.tenant_id,
            phone_number,
            config,
            plan,
        })))
    }
}

/// Decide what a matched (or defaulted) rule does with the caller right now.
///
/// The instant is converted to the tenant's wall clock before matching; an
/// unparseable timezone name falls back to UTC. A disabled config or an
/// empty rule match resolves to the documented forwarding default.
pub fn decide_action(config: &RoutingConfig, now: DateTime<Utc>) -> RuleAction {
    if !config.enabled {
        return RuleAction::default_forward();
    }
    let tz = chrono_tz::Tz::from_str(&config.timezone).unwrap_or(chrono_tz::UTC);
    let local_now = now.with_timezone(&tz).naive_local();
    match match_rule(&config.rules, local_now) {
        Some(rule) => {
            debug!("Matched rule {:?} for {}", rule.name, config.phone_number);
            rule.action.clone()
        }
        None => RuleAction::default_forward(),
    }
}
