//! Call routing configuration and rule matching
//!
//! Each (tenant, inbound number) pair carries an ordered list of time-based
//! rules. Rule matching is a pure function over the tenant-local wall clock:
//! no store access, no ambient clock, fully deterministic given its inputs.

use crate::domain::forwarding::RingStrategy;
use crate::domain::shared::{DomainError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// What a matched rule does with the caller.
///
/// Parsed once at the store boundary; the rest of the pipeline only ever
/// sees this closed set of variants, never raw JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    /// Connect the caller to an AI voice agent
    Agent {
        #[serde(default)]
        agent_key: Option<String>,
    },
    /// Ring the tenant's forwarding targets
    Forward {
        #[serde(default)]
        forward_mode: Option<RingStrategy>,
    },
    /// Send the caller straight to voicemail
    Voicemail,
}

impl RuleAction {
    /// Default applied when no rule matches.
    pub fn default_forward() -> Self {
        RuleAction::Forward { forward_mode: None }
    }

    /// Variant name, matching the wire tag. Used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            RuleAction::Agent { .. } => "agent",
            RuleAction::Forward { .. } => "forward",
            RuleAction::Voicemail => "voicemail",
        }
    }
}

/// Local time-of-day range, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parse from `"HH:MM"`/`"HH:MM"` pair.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let parse_one = |s: &str| {
            NaiveTime::parse_from_str(s, "%H:%M")
                .map_err(|_| DomainError::Validation(format!("invalid time of day: {}", s)))
        };
        Ok(Self {
            start: parse_one(start)?,
            end: parse_one(end)?,
        })
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time <= self.end
    }

    /// Midnight-crossing ranges are refused at the management boundary:
    /// the operator must split them into two explicit rules.
    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(DomainError::Validation(format!(
                "time range {}-{} crosses midnight; split it into two rules \
                 (e.g. 22:00-23:59 and 00:00-02:00)",
                self.start.format("%H:%M"),
                self.end.format("%H:%M"),
            )));
        }
        Ok(())
    }
}

/// A single routing rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    /// Weekdays this rule applies to. A rule with no days never matches.
    pub days: Vec<Weekday>,
    /// Local time-of-day windows. A rule with no ranges never matches.
    pub time_ranges: Vec<TimeRange>,
    pub action: RuleAction,
    /// Lower value wins among simultaneous candidates.
    #[serde(default = "default_priority")]
    pub priority: u32,
}

fn default_priority() -> u32 {
    100
}

impl Rule {
    pub fn matches(&self, weekday: Weekday, time: NaiveTime) -> bool {
        self.days.contains(&weekday) && self.time_ranges.iter().any(|r| r.contains(time))
    }

    pub fn validate(&self) -> Result<()> {
        for range in &self.time_ranges {
            range.validate()?;
        }
        Ok(())
    }
}

/// Match the active rule for a tenant-local instant.
///
/// Candidates are rules whose weekday set contains `local_now`'s weekday and
/// that have at least one containing time range. The candidate with the
/// lowest `priority` wins; ties go to the first-listed rule. Returns `None`
/// when nothing matches, in which case the caller applies
/// [`RuleAction::default_forward`].
pub fn match_rule(rules: &[Rule], local_now: NaiveDateTime) -> Option<&Rule> {
    let weekday = local_now.weekday();
    let time = local_now.time();
    rules
        .iter()
        .filter(|r| r.matches(weekday, time))
        .min_by_key(|r| r.priority)
}

/// Routing configuration for one (tenant, inbound number).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub tenant_id: String,
    /// E.164 inbound number this config applies to
    pub phone_number: String,
    pub country: String,
    /// IANA timezone name, e.g. "Europe/London"
    pub timezone: String,
    pub enabled: bool,
    pub rules: Vec<Rule>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoutingConfig {
    /// Empty config skeleton, the base row a first upsert merges into.
    pub fn new(tenant_id: &str, phone_number: &str) -> Self {
        let now = Utc::now();
        Self {
            tenant_id: tenant_id.to_string(),
            phone_number: phone_number.to_string(),
            country: "US".to_string(),
            timezone: "UTC".to_string(),
            enabled: true,
            rules: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a patch into this config: unset fields keep their value.
    pub fn apply(&mut self, patch: RoutingConfigPatch) {
        if let Some(country) = patch.country {
            self.country = country;
        }
        if let Some(timezone) = patch.timezone {
            self.timezone = timezone;
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(rules) = patch.rules {
            self.rules = rules;
        }
        self.updated_at = Utc::now();
    }

    /// Synthesized when a tenant has a number but never saved a config:
    /// business hours go to the agent, everything else forwards to a human.
    pub fn business_hours_default(
        tenant_id: &str,
        phone_number: &str,
        country: &str,
        timezone: &str,
    ) -> Self {
        let now = Utc::now();
        let weekdays = vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ];
        let all_days = vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ];
        Self {
            tenant_id: tenant_id.to_string(),
            phone_number: phone_number.to_string(),
            country: country.to_string(),
            timezone: timezone.to_string(),
            enabled: true,
            rules: vec![
                Rule {
                    name: "business-hours".to_string(),
                    days: weekdays,
                    time_ranges: vec![TimeRange::new(
                        NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                        NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
                    )],
                    action: RuleAction::Agent { agent_key: None },
                    priority: 10,
                },
                Rule {
                    name: "after-hours".to_string(),
                    days: all_days,
                    time_ranges: vec![TimeRange::new(
                        NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
                        NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
                    )],
                    action: RuleAction::default_forward(),
                    priority: 50,
                },
            ],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for rule in &self.rules {
            rule.validate()?;
        }
        Ok(())
    }
}

/// Partial update for a routing config; unset fields are preserved.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutingConfigPatch {
    pub country: Option<String>,
    pub timezone: Option<String>,
    pub enabled: Option<bool>,
    pub rules: Option<Vec<Rule>>,
}

/// Routing config store, tenant-partitioned.
#[async_trait]
pub trait RoutingStore: Send + Sync {
    async fn get(&self, tenant_id: &str, phone_number: &str) -> Result<Option<RoutingConfig>>;

    /// Merge-on-existing upsert: unset patch fields keep their stored value.
    async fn upsert(
        &self,
        tenant_id: &str,
        phone_number: &str,
        patch: RoutingConfigPatch,
    ) -> Result<RoutingConfig>;
}

/// Durable number-to-tenant mapping, maintained by number provisioning.
/// Read-only from the routing path's perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumberAssignment {
    /// E.164 inbound number
    pub phone_number: String,
    pub tenant_id: String,
    /// Tenant's on-file contact number, seed for the default forward target
    pub contact_number: Option<String>,
    pub country: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait NumberStore: Send + Sync {
    async fn get(&self, phone_number: &str) -> Result<Option<NumberAssignment>>;

    async fn assign(&self, assignment: &NumberAssignment) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(weekday_date: (i32, u32, u32), h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(weekday_date.0, weekday_date.1, weekday_date.2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn rule(name: &str, days: Vec<Weekday>, start: &str, end: &str, priority: u32) -> Rule {
        Rule {
            name: name.to_string(),
            days,
            time_ranges: vec![TimeRange::parse(start, end).unwrap()],
            action: RuleAction::Voicemail,
            priority,
        }
    }

    fn weekdays() -> Vec<Weekday> {
        vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ]
    }

    fn all_days() -> Vec<Weekday> {
        vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ]
    }

    #[test]
    fn test_lowest_priority_wins() {
        let rules = vec![
            rule("low", all_days(), "00:00", "23:59", 100),
            rule("high", all_days(), "00:00", "23:59", 5),
        ];
        // 2025-06-04 is a Wednesday
        let matched = match_rule(&rules, at((2025, 6, 4), 12, 0)).unwrap();
        assert_eq!(matched.name, "high");
    }

    #[test]
    fn test_equal_priority_first_listed_wins() {
        let rules = vec![
            rule("first", all_days(), "00:00", "23:59", 20),
            rule("second", all_days(), "00:00", "23:59", 20),
        ];
        let matched = match_rule(&rules, at((2025, 6, 4), 12, 0)).unwrap();
        assert_eq!(matched.name, "first");
    }

    #[test]
    fn test_weekday_excludes_candidate() {
        let rules = vec![rule("weekdays-only", weekdays(), "00:00", "23:59", 10)];
        // Saturday
        assert!(match_rule(&rules, at((2025, 6, 7), 12, 0)).is_none());
        // Wednesday
        assert!(match_rule(&rules, at((2025, 6, 4), 12, 0)).is_some());
    }

    #[test]
    fn test_business_hours_then_catch_all() {
        let mut agent = rule("business", weekdays(), "09:00", "17:00", 10);
        agent.action = RuleAction::Agent { agent_key: None };
        let mut forward = rule("catch-all", all_days(), "00:00", "23:59", 50);
        forward.action = RuleAction::default_forward();
        let rules = vec![agent, forward];

        // Wednesday 10:00 matches the agent rule
        let matched = match_rule(&rules, at((2025, 6, 4), 10, 0)).unwrap();
        assert!(matches!(matched.action, RuleAction::Agent { .. }));

        // Wednesday 18:00 falls through to the catch-all forward
        let matched = match_rule(&rules, at((2025, 6, 4), 18, 0)).unwrap();
        assert!(matches!(matched.action, RuleAction::Forward { .. }));
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let rules = vec![rule("window", all_days(), "09:00", "17:00", 10)];
        assert!(match_rule(&rules, at((2025, 6, 4), 9, 0)).is_some());
        assert!(match_rule(&rules, at((2025, 6, 4), 17, 0)).is_some());
        assert!(match_rule(&rules, at((2025, 6, 4), 8, 59)).is_none());
    }

    #[test]
    fn test_empty_rules_match_nothing() {
        assert!(match_rule(&[], at((2025, 6, 4), 12, 0)).is_none());
    }

    #[test]
    fn test_rule_without_days_or_ranges_never_matches() {
        let no_days = Rule {
            name: "no-days".to_string(),
            days: vec![],
            time_ranges: vec![TimeRange::parse("00:00", "23:59").unwrap()],
            action: RuleAction::Voicemail,
            priority: 1,
        };
        let no_ranges = Rule {
            name: "no-ranges".to_string(),
            days: all_days(),
            time_ranges: vec![],
            action: RuleAction::Voicemail,
            priority: 1,
        };
        assert!(match_rule(&[no_days, no_ranges], at((2025, 6, 4), 12, 0)).is_none());
    }

    #[test]
    fn test_midnight_crossing_range_rejected() {
        let range = TimeRange::parse("22:00", "02:00").unwrap();
        let err = range.validate().unwrap_err();
        assert!(err.to_string().contains("split"));
    }

    #[test]
    fn test_action_json_round_trip() {
        let json = r#"{"type":"agent","agent_key":"reception"}"#;
        let action: RuleAction = serde_json::from_str(json).unwrap();
        assert_eq!(
            action,
            RuleAction::Agent {
                agent_key: Some("reception".to_string())
            }
        );

        let json = r#"{"type":"forward"}"#;
        let action: RuleAction = serde_json::from_str(json).unwrap();
        assert_eq!(action, RuleAction::Forward { forward_mode: None });

        let json = r#"{"type":"voicemail"}"#;
        assert_eq!(
            serde_json::from_str::<RuleAction>(json).unwrap(),
            RuleAction::Voicemail
        );
    }

    #[test]
    fn test_default_config_validates() {
        let config =
            RoutingConfig::business_hours_default("t1", "+14155550100", "US", "America/New_York");
        config.validate().unwrap();
        assert_eq!(config.rules.len(), 2);
    }
}
