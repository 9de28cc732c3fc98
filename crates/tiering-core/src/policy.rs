//! Policy matching and tier eligibility
//!
//! Policies are matched first-match-wins in the order they were supplied.
//! Tier evaluation finds the most advanced tier whose age threshold has
//! elapsed and only ever moves a resource forward.

use crate::models::{Policy, ResourceMetric, Tier};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,

    #[error("invalid duration {0:?}")]
    Invalid(String),

    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),

    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },

    #[error("duration {0:?} out of range")]
    Overflow(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("policy {policy}: tier {tier} has an invalid duration: {source}")]
    InvalidDuration {
        policy: String,
        tier: String,
        #[source]
        source: DurationError,
    },
}

const NANOS_PER_DAY: i128 = 24 * 3_600 * 1_000_000_000;

/// Parse a tier duration.
///
/// Accepts a day shorthand (`"30d"`) and the usual unit syntax with optional
/// fractions and concatenated components (`"1h"`, `"1.5h"`, `"2h45m"`,
/// `"300ms"`). Units: `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`. A bare `"0"` is
/// zero; any other number must carry a unit.
///
/// The day shorthand takes unsigned whole days only: `"-5d"` and `"+5d"` are
/// rejected, while signs are accepted on the unit syntax (`"-1m"`).
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    if input.is_empty() {
        return Err(DurationError::Empty);
    }

    if let Some(days) = input.strip_suffix('d') {
        if !days.is_empty() && days.bytes().all(|b| b.is_ascii_digit()) {
            let days: i128 = days
                .parse()
                .map_err(|_| DurationError::Overflow(input.to_string()))?;
            return nanos_to_duration(days * NANOS_PER_DAY, input);
        }
    }

    let (negative, mut rest) = match input.as_bytes()[0] {
        b'-' => (true, &input[1..]),
        b'+' => (false, &input[1..]),
        _ => (false, input),
    };

    if rest == "0" {
        return Ok(Duration::zero());
    }
    if rest.is_empty() {
        return Err(DurationError::Invalid(input.to_string()));
    }

    let mut total: i128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_part, after_int) = rest.split_at(int_len);

        let (frac_part, after_num) = match after_int.strip_prefix('.') {
            Some(tail) => {
                let frac_len = tail.bytes().take_while(u8::is_ascii_digit).count();
                tail.split_at(frac_len)
            }
            None => ("", after_int),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DurationError::Invalid(input.to_string()));
        }

        let unit_len = after_num
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() || *c == '.')
            .map(|(i, _)| i)
            .unwrap_or(after_num.len());
        let (unit, tail) = after_num.split_at(unit_len);
        if unit.is_empty() {
            return Err(DurationError::MissingUnit(input.to_string()));
        }

        let unit_nanos = unit_nanos(unit).ok_or_else(|| DurationError::UnknownUnit {
            unit: unit.to_string(),
            input: input.to_string(),
        })?;

        let whole: i128 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| DurationError::Overflow(input.to_string()))?
        };

        let mut component = whole
            .checked_mul(unit_nanos)
            .ok_or_else(|| DurationError::Overflow(input.to_string()))?;
        if !frac_part.is_empty() {
            let digits: f64 = format!("0.{}", frac_part)
                .parse()
                .map_err(|_| DurationError::Invalid(input.to_string()))?;
            component += (digits * unit_nanos as f64) as i128;
        }

        total = total
            .checked_add(component)
            .ok_or_else(|| DurationError::Overflow(input.to_string()))?;
        rest = tail;
    }

    if negative {
        total = -total;
    }
    nanos_to_duration(total, input)
}

fn unit_nanos(unit: &str) -> Option<i128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(1_000_000_000),
        "m" => Some(60 * 1_000_000_000),
        "h" => Some(3_600 * 1_000_000_000),
        _ => None,
    }
}

fn nanos_to_duration(nanos: i128, input: &str) -> Result<Duration, DurationError> {
    i64::try_from(nanos)
        .map(Duration::nanoseconds)
        .map_err(|_| DurationError::Overflow(input.to_string()))
}

/// Holds an ordered policy set
#[derive(Debug, Clone, Default)]
pub struct PolicyEngine {
    policies: Vec<Policy>,
}

impl PolicyEngine {
    pub fn new(policies: Vec<Policy>) -> Self {
        Self { policies }
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// First policy whose selector matches
    pub fn match_policy(&self, resource: &ResourceMetric) -> Option<&Policy> {
        self.policies.iter().find(|p| p.selector.matches(resource))
    }

    /// Parse every tier duration, returning the first failure
    pub fn validate(&self) -> Result<(), PolicyError> {
        for policy in &self.policies {
            for tier in &policy.tiers {
                tier_threshold(policy, tier)?;
            }
        }
        Ok(())
    }

    pub fn evaluate<'p>(
        &self,
        resource: &ResourceMetric,
        policy: &'p Policy,
    ) -> Result<Option<&'p Tier>, PolicyError> {
        self.evaluate_at(resource, policy, Utc::now())
    }

    /// Most advanced tier the resource is old enough for, if it is ahead of
    /// the tier the resource is on now.
    ///
    /// The current tier is the first whose class equals the resource's class,
    /// or none. Resources with an unknown creation time are never eligible.
    pub fn evaluate_at<'p>(
        &self,
        resource: &ResourceMetric,
        policy: &'p Policy,
        now: DateTime<Utc>,
    ) -> Result<Option<&'p Tier>, PolicyError> {
        let Some(age) = resource.age_at(now) else {
            return Ok(None);
        };

        let current = policy
            .tiers
            .iter()
            .position(|t| t.storage_class == resource.storage_class);

        for (idx, tier) in policy.tiers.iter().enumerate().rev() {
            if age > tier_threshold(policy, tier)? {
                return Ok(match current {
                    Some(cur) if idx <= cur => None,
                    _ => Some(tier),
                });
            }
        }

        Ok(None)
    }
}

fn tier_threshold(policy: &Policy, tier: &Tier) -> Result<Duration, PolicyError> {
    parse_duration(&tier.duration).map_err(|source| PolicyError::InvalidDuration {
        policy: policy.name.clone(),
        tier: tier.name.clone(),
        source,
    })
}
