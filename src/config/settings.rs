use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PanelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RiskLevel {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

impl RiskLevel {
    pub fn name(&self) -> &'static str {
        match self {
            RiskLevel::Conservative => "Conservative",
            RiskLevel::Balanced => "Balanced",
            RiskLevel::Aggressive => "Aggressive",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RiskLevel::Conservative => "Emphasis on stability, trades only on strong moves",
            RiskLevel::Balanced => "Balanced investment",
            RiskLevel::Aggressive => "High risk / high return, trades on small moves",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "conservative" => Some(RiskLevel::Conservative),
            "balanced" | "neutral" => Some(RiskLevel::Balanced),
            "aggressive" => Some(RiskLevel::Aggressive),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Operator-configurable parameters an agent is constructed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub interval_minutes: u32,
    pub max_investment: u64,
    pub max_trading_count: u32,
    pub target_coins: Vec<String>,
    pub risk_level: RiskLevel,
    pub model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
            max_investment: 100_000,
            max_trading_count: 3,
            target_coins: ["BTC", "ETH", "XRP", "SOL", "ADA"]
                .iter()
                .map(|coin| coin.to_string())
                .collect(),
            risk_level: RiskLevel::Balanced,
            model: "gpt-4o-mini".to_string(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.interval_minutes == 0 {
            errors.push("interval_minutes must be > 0".to_string());
        }
        if self.max_investment == 0 {
            errors.push("max_investment must be > 0".to_string());
        }
        if self.max_trading_count == 0 {
            errors.push("max_trading_count must be > 0".to_string());
        }
        if self.target_coins.iter().any(|coin| coin.trim().is_empty()) {
            errors.push("target_coins must not contain empty tickers".to_string());
        }
        if self.model.trim().is_empty() {
            errors.push("model must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn apply_operation(&mut self, operation: OperationSettings) {
        self.interval_minutes = operation.interval_minutes;
        self.max_investment = operation.max_investment;
        self.max_trading_count = operation.max_trading_count;
    }

    /// The broader update pushed to a live agent: operational bounds plus
    /// risk level and model id.
    pub fn to_update(&self) -> SettingsUpdate {
        SettingsUpdate {
            interval_minutes: Some(self.interval_minutes),
            max_investment: Some(self.max_investment),
            max_trading_count: Some(self.max_trading_count),
            target_coins: None,
            risk_level: Some(self.risk_level),
            model: Some(self.model.clone()),
        }
    }
}

/// Partial settings; absent fields leave the receiver untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    pub interval_minutes: Option<u32>,
    pub max_investment: Option<u64>,
    pub max_trading_count: Option<u32>,
    pub target_coins: Option<Vec<String>>,
    pub risk_level: Option<RiskLevel>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSettings {
    pub interval_minutes: u32,
    pub max_investment: u64,
    pub max_trading_count: u32,
}

/// Raw text exactly as the operator typed it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsForm {
    pub interval_minutes: String,
    pub max_trading_count: String,
    pub max_investment: String,
}

impl SettingsForm {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            interval_minutes: settings.interval_minutes.to_string(),
            max_trading_count: settings.max_trading_count.to_string(),
            max_investment: settings.max_investment.to_string(),
        }
    }

    pub fn parse(&self) -> Result<OperationSettings, PanelError> {
        Ok(OperationSettings {
            interval_minutes: parse_positive("interval_minutes", &self.interval_minutes)?,
            max_investment: parse_positive("max_investment", &self.max_investment)?,
            max_trading_count: parse_positive("max_trading_count", &self.max_trading_count)?,
        })
    }
}

fn parse_positive<T>(field: &'static str, raw: &str) -> Result<T, PanelError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(PanelError::InvalidInput {
            field,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(interval: &str, count: &str, investment: &str) -> SettingsForm {
        SettingsForm {
            interval_minutes: interval.to_string(),
            max_trading_count: count.to_string(),
            max_investment: investment.to_string(),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.target_coins.len(), 5);
        assert_eq!(settings.risk_level, RiskLevel::Balanced);
    }

    #[test]
    fn test_form_parses_numbers() {
        let parsed = form("5", "3", "100000").parse().unwrap();
        assert_eq!(parsed.interval_minutes, 5);
        assert_eq!(parsed.max_trading_count, 3);
        assert_eq!(parsed.max_investment, 100_000);

        let padded = form(" 10 ", "1", "5000").parse().unwrap();
        assert_eq!(padded.interval_minutes, 10);
    }

    #[test]
    fn test_form_rejects_bad_input() {
        match form("abc", "3", "100000").parse() {
            Err(PanelError::InvalidInput { field, .. }) => assert_eq!(field, "interval_minutes"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(form("5", "0", "100000").parse().is_err());
        assert!(form("5", "3", "-100").parse().is_err());
        assert!(form("5", "3", "1.5").parse().is_err());
        assert!(form("", "3", "100000").parse().is_err());
    }

    #[test]
    fn test_validate_collects_errors() {
        let settings = Settings {
            interval_minutes: 0,
            max_trading_count: 0,
            model: " ".to_string(),
            ..Settings::default()
        };
        let errors = settings.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_risk_level_names() {
        assert_eq!(RiskLevel::from_str("aggressive"), Some(RiskLevel::Aggressive));
        assert_eq!(RiskLevel::from_str("neutral"), Some(RiskLevel::Balanced));
        assert_eq!(RiskLevel::from_str("yolo"), None);
        assert_eq!(RiskLevel::Conservative.to_string(), "Conservative");
    }
}
