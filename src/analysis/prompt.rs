//! Prompt text for each task. The JSON shapes requested here are the ones
//! the record types in [`super::record`] deserialize.

use crate::batch::Stock;

const EXTRACTION_RULES: &str = r#"Reading rules for the price table:
1. Each value is the number directly next to (or below) its label:
   "Prev close" -> prevClose, "Open" -> openPrice, "High" -> highPrice, "Low" -> lowPrice.
2. Read digits one by one, keep thousands separators where they appear and never drop the leading digit.
3. Sanity-check before answering: low <= open <= high and low <= current <= high.
   Previous close and open are often different values.

Fields to extract:
- Prices: currentPrice (largest number at the top), priceChange, changePercent, prevClose, openPrice, highPrice, lowPrice
- Trading: volume, tradingValue
- 52-week range: high52week, low52week
- ETF metrics: inav, nav, premiumDiscount, marketCap, aum, expenseRatio, dividendYield
- Returns: return1m, return3m, return1y
- investorTrend: individual, foreign, institution net buying/selling
- chartAnalysis from the daily chart: trend (up/down/sideways), ma5, ma20, ma60 (null when unreadable),
  support, resistance, pattern, maAlignment (aligned/inverse/converging), signal (buy/sell/hold)
Use "N/A" for values that are not on the page."#;

const EXTRACTED_SHAPE: &str = r#"{
    "currentPrice": "", "priceChange": "", "changePercent": "",
    "prevClose": "", "openPrice": "", "highPrice": "", "lowPrice": "",
    "volume": "", "tradingValue": "", "high52week": "", "low52week": "",
    "inav": "", "nav": "", "premiumDiscount": "", "marketCap": "", "aum": "",
    "expenseRatio": "", "dividendYield": "",
    "return1m": "", "return3m": "", "return1y": "",
    "investorTrend": { "individual": "", "foreign": "", "institution": "" },
    "chartAnalysis": {
      "trend": "", "ma5": null, "ma20": null, "ma60": null,
      "support": "", "resistance": "", "pattern": "", "maAlignment": "", "signal": ""
    }
  }"#;

const REPORT_SECTIONS: &str = "## Technical analysis\n\
## Fundamental analysis\n\
## Returns\n\
## Supply and demand\n\
## Short-term outlook (1 week)\n\
## Long-term outlook (1 month+)\n\
## Positive factors\n\
## Negative factors\n\
## Cautions";

/// One vision call that extracts, reports and predicts at once.
pub fn combined(stock: &Stock) -> String {
    format!(
        r#"[Role] You are an ETF/stock analyst and data-extraction specialist.

[Task] This image is the detail page of "{name}" (code {code}).

{EXTRACTION_RULES}

Then write a markdown report grounded only in the extracted data, with these sections:
{REPORT_SECTIONS}

Answer with JSON only, no other text:
{{
  "code": "{code}",
  "name": "{name}",
  "extracted_data": {EXTRACTED_SHAPE},
  "ai_report": "markdown report",
  "prediction": "Bullish | Bearish | Neutral"
}}"#,
        name = stock.name,
        code = stock.code,
    )
}

/// Vision phase: structured extraction only.
pub fn extraction(stock: &Stock) -> String {
    format!(
        r#"[Role] You are a data-extraction specialist reading a stock detail page.

[Task] This image is the detail page of "{name}" (code {code}).

{EXTRACTION_RULES}

Answer with this JSON object only, no other text:
{EXTRACTED_SHAPE}"#,
        name = stock.name,
        code = stock.code,
    )
}

/// Text phase: narrative report from already extracted data.
pub fn report(stock: &Stock, extracted_json: &str) -> String {
    format!(
        r#"[Role] You are an ETF/stock analyst.

[Task] Write a markdown analysis report for "{name}" (code {code}) using only this data:
{extracted_json}

Use exactly these sections:
{REPORT_SECTIONS}

Answer with the markdown report only."#,
        name = stock.name,
        code = stock.code,
    )
}

/// Reasoning phase: forward-looking call from data and report.
pub fn prediction(stock: &Stock, extracted_json: &str, report: &str) -> String {
    format!(
        r#"[Role] You are a cautious market strategist.

[Task] Decide the one-week direction for "{name}" (code {code}).

Extracted data:
{extracted_json}

Analyst report:
{report}

Think it through, then answer with JSON only, no other text:
{{
  "prediction": "Bullish | Bearish | Neutral",
  "confidence": 0-100,
  "summary": "one sentence",
  "shortTerm": "expected price range and reason for the next week",
  "longTerm": "trend view for the next month"
}}"#,
        name = stock.name,
        code = stock.code,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stock() -> Stock {
        Stock {
            code: "069500".to_owned(),
            name: "KODEX 200".to_owned(),
        }
    }

    #[test]
    fn combined_names_stock_and_shape() {
        let prompt = combined(&stock());
        assert!(prompt.contains("\"KODEX 200\" (code 069500)"));
        assert!(prompt.contains("\"extracted_data\""));
        assert!(prompt.contains("\"high52week\""));
        assert!(prompt.contains("## Cautions"));
    }

    #[test]
    fn phased_prompts_carry_previous_outputs() {
        let report_prompt = report(&stock(), "{\"currentPrice\":\"35,120\"}");
        assert!(report_prompt.contains("35,120"));

        let prediction_prompt = prediction(&stock(), "{}", "## Technical analysis\nuptrend");
        assert!(prediction_prompt.contains("uptrend"));
        assert!(prediction_prompt.contains("\"shortTerm\""));
    }

    #[test]
    fn extraction_asks_for_json_only() {
        let prompt = extraction(&stock());
        assert!(prompt.contains("JSON object only"));
        assert!(!prompt.contains("ai_report"));
    }
}
