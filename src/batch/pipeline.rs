use std::collections::BTreeMap;

use tracing::{info, warn};

use super::Stock;
use crate::analysis::parse::text_body;
use crate::analysis::{
    CombinedAnswer, ExtractedData, Prediction, PredictionOutcome, StockAnalysis, parse_json_response,
    prompt, validate_extracted_data,
};
use crate::capability::CapabilityClass;
use crate::error::{Result, StocklensError};
use crate::orchestrator::Orchestrator;
use crate::providers::{Image, TaskRequest};

/// One vision call returning extraction, report and prediction together.
pub async fn analyze_combined(
    orchestrator: &mut Orchestrator,
    stock: &Stock,
    image: Image,
) -> Result<StockAnalysis> {
    let context = stock.label();
    let request = TaskRequest::new(prompt::combined(stock)).with_image(image);
    let served = orchestrator
        .execute(CapabilityClass::Vision, &context, &request)
        .await?;
    let answer: CombinedAnswer = parse_json_response(&served.text, &context)?;

    let providers = BTreeMap::from([(CapabilityClass::Vision, served.provider)]);
    Ok(assemble(
        stock,
        answer.extracted_data,
        answer.ai_report,
        answer.prediction,
        None,
        providers,
    ))
}

/// Vision extraction, then a text report, then a reasoning prediction.
pub async fn analyze_phased(
    orchestrator: &mut Orchestrator,
    stock: &Stock,
    image: Image,
) -> Result<StockAnalysis> {
    let context = stock.label();
    let mut providers = BTreeMap::new();

    let request = TaskRequest::new(prompt::extraction(stock)).with_image(image);
    let served = orchestrator
        .execute(CapabilityClass::Vision, &context, &request)
        .await?;
    let extracted: ExtractedData = parse_json_response(&served.text, &context)?;
    providers.insert(CapabilityClass::Vision, served.provider);
    let extracted_json = serde_json::to_string_pretty(&extracted)?;

    let request = TaskRequest::new(prompt::report(stock, &extracted_json));
    let served = orchestrator
        .execute(CapabilityClass::Text, &context, &request)
        .await?;
    let report = text_body(&served.text);
    if report.is_empty() {
        return Err(StocklensError::MalformedResponse {
            context,
            reason: "empty report".to_owned(),
        });
    }
    providers.insert(CapabilityClass::Text, served.provider);

    let request = TaskRequest::new(prompt::prediction(stock, &extracted_json, &report));
    let served = orchestrator
        .execute(CapabilityClass::Reasoning, &context, &request)
        .await?;
    let outcome: PredictionOutcome = parse_json_response(&served.text, &context)?;
    providers.insert(CapabilityClass::Reasoning, served.provider);

    Ok(assemble(
        stock,
        extracted,
        report,
        outcome.prediction,
        Some(outcome),
        providers,
    ))
}

fn assemble(
    stock: &Stock,
    extracted_data: ExtractedData,
    ai_report: String,
    prediction: Prediction,
    prediction_detail: Option<PredictionOutcome>,
    providers: BTreeMap<CapabilityClass, String>,
) -> StockAnalysis {
    let data_validation_warnings = validate_extracted_data(&extracted_data);
    for warning in &data_validation_warnings {
        warn!(stock = %stock.label(), "data validation: {warning}");
    }
    info!(
        stock = %stock.label(),
        current_price = %extracted_data
            .current_price
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "N/A".to_owned()),
        ?prediction,
        "analysis done"
    );
    StockAnalysis {
        code: stock.code.clone(),
        name: stock.name.clone(),
        extracted_data,
        ai_report,
        prediction,
        prediction_detail,
        providers,
        data_validation_warnings,
    }
}
