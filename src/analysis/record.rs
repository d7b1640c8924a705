use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::capability::CapabilityClass;

/// A value read off the page: models return either numbers or display
/// strings such as `"12,345"`, `"+1.25%"` or `"N/A"`. Any other JSON shape
/// is kept as its text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Numeric reading with every character other than digits, `.` and `-`
    /// removed. `None` for `"N/A"` and unparseable text.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) if s.trim() == "N/A" => None,
            Self::Text(s) => {
                let digits: String = s
                    .chars()
                    .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                    .collect();
                digits.parse().ok()
            }
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n
                .as_f64()
                .map_or_else(|| Self::Text(n.to_string()), Self::Number),
            Value::String(s) => Self::Text(s),
            other => Self::Text(other.to_string()),
        })
    }
}

/// Nested object the model may replace with `"N/A"`, `null` or a bare
/// string. A shape that does not fit reads as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvestorTrend {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub individual: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<FieldValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ma5: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ma20: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ma60: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resistance: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ma_alignment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
}

/// Fields extracted from a detail-page screenshot. Fields the model adds
/// beyond these are kept in `extra` and written back out unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedData {
    pub current_price: Option<FieldValue>,
    pub price_change: Option<FieldValue>,
    pub change_percent: Option<FieldValue>,
    pub prev_close: Option<FieldValue>,
    pub open_price: Option<FieldValue>,
    pub high_price: Option<FieldValue>,
    pub low_price: Option<FieldValue>,
    pub volume: Option<FieldValue>,
    pub trading_value: Option<FieldValue>,
    #[serde(rename = "high52week")]
    pub high_52_week: Option<FieldValue>,
    #[serde(rename = "low52week")]
    pub low_52_week: Option<FieldValue>,
    pub inav: Option<FieldValue>,
    pub nav: Option<FieldValue>,
    pub premium_discount: Option<FieldValue>,
    pub market_cap: Option<FieldValue>,
    pub aum: Option<FieldValue>,
    pub expense_ratio: Option<FieldValue>,
    pub dividend_yield: Option<FieldValue>,
    pub return1m: Option<FieldValue>,
    pub return3m: Option<FieldValue>,
    pub return1y: Option<FieldValue>,
    #[serde(default, deserialize_with = "lenient")]
    pub investor_trend: Option<InvestorTrend>,
    #[serde(default, deserialize_with = "lenient")]
    pub chart_analysis: Option<ChartAnalysis>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Anything other than a bullish or bearish label, `null` included, reads as
/// `Neutral`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Prediction {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl Prediction {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "bullish" => Self::Bullish,
            "bearish" => Self::Bearish,
            _ => Self::Neutral,
        }
    }
}

impl<'de> Deserialize<'de> for Prediction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(value.as_str().map(Self::from_label).unwrap_or_default())
    }
}

/// Answer of the reasoning phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionOutcome {
    #[serde(default)]
    pub prediction: Prediction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_term: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_term: Option<String>,
}

/// Answer of the single combined vision call.
#[derive(Debug, Clone, Deserialize)]
pub struct CombinedAnswer {
    #[serde(default, deserialize_with = "or_default")]
    pub extracted_data: ExtractedData,
    #[serde(default, deserialize_with = "or_default")]
    pub ai_report: String,
    #[serde(default)]
    pub prediction: Prediction,
}

/// One stock's entry in the results document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAnalysis {
    pub code: String,
    pub name: String,
    pub extracted_data: ExtractedData,
    pub ai_report: String,
    pub prediction: Prediction,
    #[serde(
        rename = "predictionDetail",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub prediction_detail: Option<PredictionOutcome>,
    /// Provider key that served each phase.
    #[serde(default)]
    pub providers: BTreeMap<CapabilityClass, String>,
    #[serde(
        rename = "dataValidationWarnings",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub data_validation_warnings: Vec<String>,
}

/// Logical consistency checks on extracted prices. Returns one message per
/// violated relation; empty when the readings are consistent or missing.
pub fn validate_extracted_data(data: &ExtractedData) -> Vec<String> {
    let num = |v: &Option<FieldValue>| v.as_ref().and_then(FieldValue::as_number);
    let current = num(&data.current_price);
    let prev_close = num(&data.prev_close);
    let open = num(&data.open_price);
    let high = num(&data.high_price);
    let low = num(&data.low_price);

    let mut warnings = Vec::new();
    if let (Some(open), Some(prev)) = (open, prev_close) {
        if open == prev {
            warnings.push(format!(
                "open ({open}) equals previous close ({prev}); verify the reading"
            ));
        }
    }

    let relations: [(Option<f64>, Option<f64>, fn(f64, f64) -> bool, &str); 5] = [
        (high, open, |h, o| h < o, "high below open"),
        (low, open, |l, o| l > o, "low above open"),
        (high, low, |h, l| h < l, "high below low"),
        (current, high, |c, h| c > h, "current above high"),
        (current, low, |c, l| c < l, "current below low"),
    ];
    for (a, b, violated, what) in relations {
        match (a, b) {
            (Some(a), Some(b)) if violated(a, b) => {
                warnings.push(format!("{what} ({a} vs {b}); abnormal reading"));
            }
            _ => {}
        }
    }
    warnings
}
