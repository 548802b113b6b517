//! Centralized per-minute pricing for call billing.
//!
//! A billed call pays for two things by the minute: the voice-AI service and
//! the carrier. Default rates live in the tables below and can be overridden
//! through configuration.
//!
//! # Usage
//!
//! ```rust,ignore
//! use callrelay_gateway::config::pricing::CallRates;
//!
//! let rates = CallRates::new(0.05, 0.013);
//! let cost = rates.cost_for(90);
//! assert_eq!(cost.total, 0.0945);
//! ```
//!
//! # Updates
//!
//! When provider pricing changes, update the constants in this file.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::Serialize;

// =============================================================================
// Pricing Types
// =============================================================================

/// Pricing unit for a rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PricingUnit {
    /// Price per minute of call time
    PerMinute,
    /// Price per second of call time
    PerSecond,
    /// Price per hour of call time
    PerHour,
}

/// Pricing information for a billable service.
#[derive(Debug, Clone)]
pub struct ModelPricing {
    /// Price amount in USD
    pub price: f64,
    /// Unit for the price
    pub unit: PricingUnit,
    /// Optional notes about pricing
    pub notes: Option<&'static str>,
}

impl ModelPricing {
    pub const fn new(price: f64, unit: PricingUnit) -> Self {
        Self {
            price,
            unit,
            notes: None,
        }
    }

    pub const fn with_notes(price: f64, unit: PricingUnit, notes: &'static str) -> Self {
        Self {
            price,
            unit,
            notes: Some(notes),
        }
    }

    /// Convert to a per-minute rate.
    pub fn to_per_minute(&self) -> f64 {
        match self.unit {
            PricingUnit::PerMinute => self.price,
            PricingUnit::PerSecond => self.price * 60.0,
            PricingUnit::PerHour => self.price / 60.0,
        }
    }
}

// =============================================================================
// Rate tables
// =============================================================================

/// Voice-AI pricing. Key format: "provider:model" (lowercase)
static VOICE_AI_PRICING: LazyLock<HashMap<&'static str, ModelPricing>> = LazyLock::new(|| {
    let mut m = HashMap::new();
    m.insert(
        "grok:grok-voice-agent",
        ModelPricing::with_notes(0.05, PricingUnit::PerMinute, "Billed per connected minute"),
    );
    m
});

/// Carrier pricing. Key format: "carrier:product" (lowercase)
static CARRIER_PRICING: LazyLock<HashMap<&'static str, ModelPricing>> = LazyLock::new(|| {
    let mut m = HashMap::new();
    m.insert(
        "twilio:voice",
        ModelPricing::with_notes(0.013, PricingUnit::PerMinute, "US local inbound/outbound"),
    );
    m
});

/// Default voice-AI rate per minute when no table entry matches.
pub const DEFAULT_VOICE_AI_RATE_PER_MINUTE: f64 = 0.05;

/// Default carrier rate per minute when no table entry matches.
pub const DEFAULT_CARRIER_RATE_PER_MINUTE: f64 = 0.013;

pub fn get_voice_ai_pricing(provider: &str, model: &str) -> Option<&'static ModelPricing> {
    let key = format!("{}:{}", provider.to_lowercase(), model.to_lowercase());
    VOICE_AI_PRICING.get(key.as_str())
}

pub fn get_carrier_pricing(carrier: &str, product: &str) -> Option<&'static ModelPricing> {
    let key = format!("{}:{}", carrier.to_lowercase(), product.to_lowercase());
    CARRIER_PRICING.get(key.as_str())
}

// =============================================================================
// Call cost
// =============================================================================

/// Round a USD amount to 4 decimal places.
pub fn round_usd(amount: f64) -> f64 {
    (amount * 10_000.0).round() / 10_000.0
}

/// Per-minute rates applied to every billed call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallRates {
    pub voice_ai_per_minute: f64,
    pub carrier_per_minute: f64,
}

impl Default for CallRates {
    fn default() -> Self {
        Self {
            voice_ai_per_minute: get_voice_ai_pricing("grok", "grok-voice-agent")
                .map(ModelPricing::to_per_minute)
                .unwrap_or(DEFAULT_VOICE_AI_RATE_PER_MINUTE),
            carrier_per_minute: get_carrier_pricing("twilio", "voice")
                .map(ModelPricing::to_per_minute)
                .unwrap_or(DEFAULT_CARRIER_RATE_PER_MINUTE),
        }
    }
}

/// Cost breakdown for one call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CallCost {
    pub duration_seconds: u64,
    pub voice_ai: f64,
    pub carrier: f64,
    pub total: f64,
}

impl CallRates {
    pub fn new(voice_ai_per_minute: f64, carrier_per_minute: f64) -> Self {
        Self {
            voice_ai_per_minute,
            carrier_per_minute,
        }
    }

    /// `duration / 60 * (voice_ai + carrier)`, each figure rounded to 4 decimals.
    pub fn cost_for(&self, duration_seconds: u64) -> CallCost {
        let minutes = duration_seconds as f64 / 60.0;
        let voice_ai = minutes * self.voice_ai_per_minute;
        let carrier = minutes * self.carrier_per_minute;
        CallCost {
            duration_seconds,
            voice_ai: round_usd(voice_ai),
            carrier: round_usd(carrier),
            total: round_usd(voice_ai + carrier),
        }
    }
}
