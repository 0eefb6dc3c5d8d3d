//! Settlement Settings Types
//!
//! The tri-state settlement mode consumed by the outcome resolver. A per-user
//! mode, when set to a non-auto value, takes precedence over the global mode,
//! which takes precedence over price-based computation.

use serde::{Deserialize, Serialize};

/// Settlement override mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementMode {
    /// Resolve from price movement
    Auto,
    /// Every close resolves to win
    ForceWin,
    /// Every close resolves to loss
    ForceLoss,
}

impl Default for SettlementMode {
    fn default() -> Self {
        SettlementMode::Auto
    }
}

impl std::fmt::Display for SettlementMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettlementMode::Auto => write!(f, "auto"),
            SettlementMode::ForceWin => write!(f, "force_win"),
            SettlementMode::ForceLoss => write!(f, "force_loss"),
        }
    }
}

impl std::str::FromStr for SettlementMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(SettlementMode::Auto),
            "force_win" => Ok(SettlementMode::ForceWin),
            "force_loss" => Ok(SettlementMode::ForceLoss),
            other => Err(format!("unknown settlement mode: {}", other)),
        }
    }
}

/// Request body for updating a settlement mode.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetModeRequest {
    pub mode: SettlementMode,
}

/// Settlement mode view returned by the admin API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeView {
    pub scope: String,
    pub mode: SettlementMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_auto() {
        assert_eq!(SettlementMode::default(), SettlementMode::Auto);
    }

    #[test]
    fn test_mode_round_trip() {
        for mode in [
            SettlementMode::Auto,
            SettlementMode::ForceWin,
            SettlementMode::ForceLoss,
        ] {
            let parsed: SettlementMode = mode.to_string().parse().unwrap();
            assert_eq!(parsed, mode);
        }
        assert!("rigged".parse::<SettlementMode>().is_err());
    }

    #[test]
    fn test_mode_serialization() {
        assert_eq!(
            serde_json::to_string(&SettlementMode::ForceWin).unwrap(),
            "\"force_win\""
        );
    }
}
