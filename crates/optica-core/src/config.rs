//! # Engine Configuration
//!
//! Business policies the engines consult. Loaded once at startup and then
//! read-only, so no locking is needed.
//!
//! ## Configuration Sources (Priority Order)
//! 1. Environment variables (`OPTICA_*`)
//! 2. Defaults (this file)

use serde::{Deserialize, Serialize};

use crate::DEFAULT_DISCOUNT_PERMISSION;

/// What to do when a payment would take the balance below zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverpaymentPolicy {
    /// Refuse the payment with a validation error.
    #[default]
    Reject,
    /// Accept it; the negative balance is a credit owed to the customer.
    AllowCredit,
}

impl OverpaymentPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reject" => Some(OverpaymentPolicy::Reject),
            "allow_credit" | "credit" => Some(OverpaymentPolicy::AllowCredit),
            _ => None,
        }
    }
}

/// Policy knobs for the order, payment and discount rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Discounts strictly above this amount need `discount_permission`.
    pub discount_threshold_cents: i64,

    /// Permission name that authorizes large discounts.
    pub discount_permission: String,

    /// Overpayment handling.
    pub overpayment: OverpaymentPolicy,

    /// Allow adding/removing lines on `Confirmed` orders.
    pub allow_item_edits_after_pending: bool,
}

impl Default for EngineConfig {
    /// Conservative defaults: any discount needs authority, overpayment is
    /// rejected and composition freezes once an order leaves `Pending`.
    fn default() -> Self {
        EngineConfig {
            discount_threshold_cents: 0,
            discount_permission: DEFAULT_DISCOUNT_PERMISSION.to_string(),
            overpayment: OverpaymentPolicy::Reject,
            allow_item_edits_after_pending: false,
        }
    }
}

impl EngineConfig {
    /// Creates a config from environment variables and defaults.
    ///
    /// ## Environment Variables
    /// - `OPTICA_DISCOUNT_THRESHOLD_CENTS`: e.g. "2000"
    /// - `OPTICA_DISCOUNT_PERMISSION`: e.g. "manager_discount"
    /// - `OPTICA_OVERPAYMENT`: "reject" or "allow_credit"
    /// - `OPTICA_POST_PENDING_ITEM_EDITS`: "true" / "false"
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = EngineConfig::default();

        if let Some(threshold) = lookup("OPTICA_DISCOUNT_THRESHOLD_CENTS") {
            if let Ok(cents) = threshold.trim().parse::<i64>() {
                config.discount_threshold_cents = cents.max(0);
            }
        }

        if let Some(permission) = lookup("OPTICA_DISCOUNT_PERMISSION") {
            if !permission.trim().is_empty() {
                config.discount_permission = permission.trim().to_string();
            }
        }

        if let Some(policy) = lookup("OPTICA_OVERPAYMENT").and_then(|v| OverpaymentPolicy::parse(&v)) {
            config.overpayment = policy;
        }

        if let Some(flag) = lookup("OPTICA_POST_PENDING_ITEM_EDITS") {
            if let Ok(enabled) = flag.trim().parse::<bool>() {
                config.allow_item_edits_after_pending = enabled;
            }
        }

        config
    }

    pub fn with_discount_threshold(mut self, cents: i64) -> Self {
        self.discount_threshold_cents = cents;
        self
    }

    pub fn with_overpayment(mut self, policy: OverpaymentPolicy) -> Self {
        self.overpayment = policy;
        self
    }

    pub fn with_item_edits_after_pending(mut self, enabled: bool) -> Self {
        self.allow_item_edits_after_pending = enabled;
        self
    }
}
