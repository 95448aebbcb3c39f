//! Validator — rule-driven data-quality checks over market-data records
//! (`spec.md` §4.9).

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market_data::MarketType;

/// Severity of a validation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational note; does not affect whether the record is usable.
    Info,
    /// The record is suspicious but usable.
    Warning,
    /// The record violates a hard rule and should be excluded downstream.
    Error,
}

/// A field-level rule a record is checked against.
#[derive(Debug, Clone)]
pub enum ValidationRule {
    /// Field must be present and non-empty.
    Required,
    /// Numeric field must fall within `[min, max]` (inclusive).
    Range {
        /// Inclusive lower bound.
        min: Decimal,
        /// Inclusive upper bound.
        max: Decimal,
    },
    /// Field must match the given regular expression in full.
    Regex(Regex),
    /// Field must be one of a fixed set of allowed string values.
    Enum(Vec<String>),
    /// Cross-field invariant, e.g. OHLC ordering; evaluated against the
    /// whole record rather than a single field.
    CrossField(CrossFieldRule),
}

/// Field-agnostic invariants that read more than one field on a record.
#[derive(Debug, Clone, Copy)]
pub enum CrossFieldRule {
    /// `low ≤ open, close ≤ high`.
    OhlcOrdering,
    /// Day-over-day change percent within `±band_percent`.
    ChangePercentBand {
        /// Half-width of the allowed band, as a percent (e.g. `10.0`).
        band_percent: Decimal,
    },
}

/// One field's raw value as seen by the validator. Kept as a small closed
/// set rather than a dynamic/dict-shaped payload (`spec.md` §9 design
/// note).
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// A decimal-precision numeric value (prices, change percent).
    Number(Decimal),
    /// A string value (stock code, market label).
    Text(String),
    /// Field absent from the record.
    Missing,
}

/// The record shape the validator checks: a stock-code record's OHLCV plus
/// a previous close for change-percent validation.
#[derive(Debug, Clone)]
pub struct MarketDataRecord {
    /// Market this record belongs to, for market-specific defaults.
    pub market: MarketType,
    /// Stock/instrument code.
    pub code: String,
    /// Opening price.
    pub open: Decimal,
    /// Highest price.
    pub high: Decimal,
    /// Lowest price.
    pub low: Decimal,
    /// Closing price.
    pub close: Decimal,
    /// Previous close, used for change-percent validation.
    pub previous_close: Option<Decimal>,
}

impl MarketDataRecord {
    fn field(&self, name: &str) -> FieldValue {
        match name {
            "code" => FieldValue::Text(self.code.clone()),
            "open" => FieldValue::Number(self.open),
            "high" => FieldValue::Number(self.high),
            "low" => FieldValue::Number(self.low),
            "close" => FieldValue::Number(self.close),
            _ => FieldValue::Missing,
        }
    }

    fn change_percent(&self) -> Option<Decimal> {
        let previous = self.previous_close?;
        if previous.is_zero() {
            return None;
        }
        Some((self.close - previous) / previous * Decimal::from(100))
    }
}

/// One rule's verdict against a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Field or cross-field check this outcome came from.
    pub rule: String,
    /// Error or warning.
    pub severity: Severity,
    /// Human-readable description of the violation.
    pub message: String,
}

/// The full result of validating one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Every rule violation found, in evaluation order.
    pub outcomes: Vec<ValidationOutcome>,
    /// Whether any outcome was an error (as opposed to only warnings).
    pub has_errors: bool,
    /// `1 − (α·errors + β·warnings)`, clamped to `[0, 1]`.
    pub quality_score: f64,
}

/// Weights for the quality-score formula (`spec.md` §4.9).
#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    /// Penalty per error outcome.
    pub alpha: f64,
    /// Penalty per warning outcome.
    pub beta: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            alpha: 0.2,
            beta: 0.05,
        }
    }
}

/// A set of field/cross-field rules to evaluate a record against.
pub struct ValidationRuleSet {
    field_rules: Vec<(String, ValidationRule)>,
    weights: ScoreWeights,
}

impl ValidationRuleSet {
    /// Market-specific default rule set: OHLC ordering, a change-percent
    /// band, and a stock-code format rule (`spec.md` §3 [EXPANSION]).
    #[must_use]
    pub fn for_market(market: MarketType) -> Self {
        let code_pattern = match market {
            MarketType::AShare => r"^\d{6}$",
            MarketType::HongKong => r"^\d{1,5}$",
            MarketType::Us => r"^[A-Z.]{1,6}$",
        };
        let band = match market {
            MarketType::AShare => Decimal::from(10),
            MarketType::HongKong | MarketType::Us => Decimal::from(20),
        };

        Self {
            field_rules: vec![
                (
                    "code".to_string(),
                    ValidationRule::Regex(Regex::new(code_pattern).expect("static pattern")),
                ),
                (
                    "ohlc".to_string(),
                    ValidationRule::CrossField(CrossFieldRule::OhlcOrdering),
                ),
                (
                    "change_percent".to_string(),
                    ValidationRule::CrossField(CrossFieldRule::ChangePercentBand {
                        band_percent: band,
                    }),
                ),
            ],
            weights: ScoreWeights::default(),
        }
    }

    /// Append a field-level rule to this rule set.
    pub fn push_rule(&mut self, field: impl Into<String>, rule: ValidationRule) {
        self.field_rules.push((field.into(), rule));
    }

    /// Evaluate every rule against `record`, producing a full report.
    #[must_use]
    pub fn validate(&self, record: &MarketDataRecord) -> ValidationReport {
        let mut outcomes = Vec::new();

        for (field, rule) in &self.field_rules {
            if let Some(outcome) = evaluate_rule(field, rule, record) {
                outcomes.push(outcome);
            }
        }

        for price_field in ["open", "high", "low", "close"] {
            let value = match price_field {
                "open" => record.open,
                "high" => record.high,
                "low" => record.low,
                _ => record.close,
            };
            if !value.is_sign_positive() || value.is_zero() {
                outcomes.push(ValidationOutcome {
                    rule: format!("{price_field}_positive"),
                    severity: Severity::Error,
                    message: format!("{price_field} must be a positive, finite price"),
                });
            }
        }

        let has_errors = outcomes.iter().any(|o| o.severity == Severity::Error);
        let errors = outcomes
            .iter()
            .filter(|o| o.severity == Severity::Error)
            .count() as f64;
        let warnings = outcomes
            .iter()
            .filter(|o| o.severity == Severity::Warning)
            .count() as f64;
        let score = (1.0 - (self.weights.alpha * errors + self.weights.beta * warnings))
            .clamp(0.0, 1.0);

        ValidationReport {
            outcomes,
            has_errors,
            quality_score: score,
        }
    }
}

fn evaluate_rule(
    field: &str,
    rule: &ValidationRule,
    record: &MarketDataRecord,
) -> Option<ValidationOutcome> {
    match rule {
        ValidationRule::Required => match record.field(field) {
            FieldValue::Missing => Some(ValidationOutcome {
                rule: field.to_string(),
                severity: Severity::Error,
                message: format!("{field} is required"),
            }),
            _ => None,
        },
        ValidationRule::Range { min, max } => match record.field(field) {
            FieldValue::Number(value) if value < *min || value > *max => {
                Some(ValidationOutcome {
                    rule: field.to_string(),
                    severity: Severity::Error,
                    message: format!("{field} {value} outside range [{min}, {max}]"),
                })
            }
            _ => None,
        },
        ValidationRule::Regex(pattern) => match record.field(field) {
            FieldValue::Text(text) if !pattern.is_match(&text) => Some(ValidationOutcome {
                rule: field.to_string(),
                severity: Severity::Error,
                message: format!("{field} '{text}' does not match expected format"),
            }),
            _ => None,
        },
        ValidationRule::Enum(allowed) => match record.field(field) {
            FieldValue::Text(text) if !allowed.contains(&text) => Some(ValidationOutcome {
                rule: field.to_string(),
                severity: Severity::Error,
                message: format!("{field} '{text}' is not one of {allowed:?}"),
            }),
            _ => None,
        },
        ValidationRule::CrossField(CrossFieldRule::OhlcOrdering) => {
            let ordered = record.low <= record.open
                && record.open <= record.high
                && record.low <= record.close
                && record.close <= record.high;
            if ordered {
                None
            } else {
                Some(ValidationOutcome {
                    rule: field.to_string(),
                    severity: Severity::Error,
                    message: "low must be <= open, close <= high".to_string(),
                })
            }
        }
        ValidationRule::CrossField(CrossFieldRule::ChangePercentBand { band_percent }) => {
            match record.change_percent() {
                Some(change) if change.abs() > *band_percent => Some(ValidationOutcome {
                    rule: field.to_string(),
                    severity: Severity::Warning,
                    message: format!("change percent {change}% exceeds ±{band_percent}% band"),
                }),
                None if record.previous_close.is_none() => Some(ValidationOutcome {
                    rule: field.to_string(),
                    severity: Severity::Info,
                    message: "no previous close available, change percent not checked".to_string(),
                }),
                _ => None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(market: MarketType, code: &str) -> MarketDataRecord {
        MarketDataRecord {
            market,
            code: code.to_string(),
            open: dec!(10.0),
            high: dec!(10.5),
            low: dec!(9.8),
            close: dec!(10.2),
            previous_close: Some(dec!(10.0)),
        }
    }

    #[test]
    fn valid_record_scores_one() {
        let rules = ValidationRuleSet::for_market(MarketType::AShare);
        let report = rules.validate(&record(MarketType::AShare, "600000"));
        assert!(!report.has_errors);
        assert_eq!(report.quality_score, 1.0);
    }

    #[test]
    fn bad_code_format_is_an_error() {
        let rules = ValidationRuleSet::for_market(MarketType::AShare);
        let report = rules.validate(&record(MarketType::AShare, "AAPL"));
        assert!(report.has_errors);
        assert!(report.quality_score < 1.0);
    }

    #[test]
    fn ohlc_violation_is_an_error() {
        let rules = ValidationRuleSet::for_market(MarketType::AShare);
        let mut rec = record(MarketType::AShare, "600000");
        rec.high = dec!(5.0);
        let report = rules.validate(&rec);
        assert!(report.has_errors);
    }

    #[test]
    fn change_percent_outside_band_is_a_warning_not_an_error() {
        let rules = ValidationRuleSet::for_market(MarketType::AShare);
        let mut rec = record(MarketType::AShare, "600000");
        rec.close = dec!(15.0);
        rec.high = dec!(15.5);
        rec.previous_close = Some(dec!(10.0));
        let report = rules.validate(&rec);
        assert!(!report.has_errors);
        assert!(report.quality_score < 1.0);
    }

    #[test]
    fn non_positive_price_is_an_error() {
        let rules = ValidationRuleSet::for_market(MarketType::Us);
        let mut rec = record(MarketType::Us, "AAPL");
        rec.low = dec!(-1.0);
        let report = rules.validate(&rec);
        assert!(report.has_errors);
    }
}
