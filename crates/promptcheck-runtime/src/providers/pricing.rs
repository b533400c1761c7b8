//! Per-token pricing for cost reporting.
//!
//! Backends report token counts, not money. A gateway configured with
//! ```yaml
//! pricing: { input_per_mtok: 3.0, output_per_mtok: 15.0 }
//! ```
//! reports `cost_usd` from those counts; without it cost stays unreported.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::ProviderError;

/// USD per million tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pricing {
    #[serde(default)]
    pub input_per_mtok: f64,
    #[serde(default)]
    pub output_per_mtok: f64,
}

impl Pricing {
    /// Read the optional `pricing` key of a gateway config.
    pub fn from_config(config: &JsonValue) -> Result<Option<Self>, ProviderError> {
        let Some(raw) = config.get("pricing").filter(|v| !v.is_null()) else {
            return Ok(None);
        };
        let pricing: Pricing = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::InvalidConfig(format!("pricing: {}", e)))?;

        for (name, rate) in [
            ("input_per_mtok", pricing.input_per_mtok),
            ("output_per_mtok", pricing.output_per_mtok),
        ] {
            if !rate.is_finite() || rate < 0.0 {
                return Err(ProviderError::InvalidConfig(format!(
                    "pricing: {} must be a non-negative number",
                    name
                )));
            }
        }
        Ok(Some(pricing))
    }

    /// Cost of one call; `None` when the backend reported no token counts.
    pub fn cost(&self, prompt_tokens: Option<u32>, completion_tokens: Option<u32>) -> Option<f64> {
        if prompt_tokens.is_none() && completion_tokens.is_none() {
            return None;
        }
        let input = f64::from(prompt_tokens.unwrap_or(0)) * self.input_per_mtok;
        let output = f64::from(completion_tokens.unwrap_or(0)) * self.output_per_mtok;
        Some((input + output) / 1_000_000.0)
    }
}

/// Cost under optional pricing.
pub fn cost_of(
    pricing: Option<&Pricing>,
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
) -> Option<f64> {
    pricing.and_then(|p| p.cost(prompt_tokens, completion_tokens))
}
