//! Batch driver: one stock at a time through the orchestrator.

pub mod pipeline;
pub mod results;
pub mod store;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analysis::StockAnalysis;
use crate::config::Pipeline;
use crate::error::{Result, StocklensError};
use crate::orchestrator::Orchestrator;
use store::ArtifactStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stock {
    pub code: String,
    pub name: String,
}

impl Stock {
    /// `"<name> (<code>)"`, used as the task context in logs and errors.
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.code)
    }
}

#[derive(Deserialize)]
struct StockList {
    stocks: Vec<Stock>,
}

/// Read `{"stocks": [{"code": ..., "name": ...}]}`.
pub fn load_stocks(path: &Path) -> Result<Vec<Stock>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| StocklensError::StockList(format!("cannot read {}: {e}", path.display())))?;
    let list: StockList = serde_json::from_str(&content)
        .map_err(|e| StocklensError::StockList(format!("{}: {e}", path.display())))?;
    Ok(list.stocks)
}

/// Single-stock mode, selected with `TARGET_STOCK_CODE` and optionally
/// `TARGET_STOCK_NAME`.
pub fn target_stock(lookup: impl Fn(&str) -> Option<String>) -> Option<Stock> {
    let code = lookup("TARGET_STOCK_CODE")
        .map(|c| c.trim().to_owned())
        .filter(|c| !c.is_empty())?;
    let name = lookup("TARGET_STOCK_NAME")
        .map(|n| n.trim().to_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| code.clone());
    Some(Stock { code, name })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub code: String,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub records: Vec<StockAnalysis>,
    pub skipped: Vec<Skipped>,
}

impl BatchReport {
    pub fn attempted(&self) -> usize {
        self.records.len() + self.skipped.len()
    }
}

pub struct BatchRunner<'a, S: ArtifactStore> {
    orchestrator: &'a mut Orchestrator,
    store: &'a S,
    pipeline: Pipeline,
    delay: Duration,
}

impl<'a, S: ArtifactStore> BatchRunner<'a, S> {
    pub fn new(
        orchestrator: &'a mut Orchestrator,
        store: &'a S,
        pipeline: Pipeline,
        delay: Duration,
    ) -> Self {
        Self {
            orchestrator,
            store,
            pipeline,
            delay,
        }
    }

    /// Process every stock in order. Failures skip the stock, never the
    /// batch; only fully analyzed stocks reach the report's records.
    pub async fn run(&mut self, stocks: &[Stock]) -> BatchReport {
        info!(count = stocks.len(), pipeline = ?self.pipeline, "analyzing stocks");
        let mut report = BatchReport::default();
        for (idx, stock) in stocks.iter().enumerate() {
            if idx > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.analyze(stock).await {
                Ok(record) => report.records.push(record),
                Err(reason) => {
                    warn!(stock = %stock.label(), "skipped: {reason}");
                    report.skipped.push(Skipped {
                        code: stock.code.clone(),
                        name: stock.name.clone(),
                        reason,
                    });
                }
            }
        }
        info!(
            succeeded = report.records.len(),
            skipped = report.skipped.len(),
            "batch complete"
        );
        report
    }

    async fn analyze(&mut self, stock: &Stock) -> std::result::Result<StockAnalysis, String> {
        let image = match self.store.load(&stock.code) {
            Ok(Some(image)) => image,
            Ok(None) => return Err("screenshot not found".to_owned()),
            Err(e) => return Err(format!("screenshot unreadable: {e}")),
        };
        info!(stock = %stock.label(), "analyzing");
        let result = match self.pipeline {
            Pipeline::Combined => pipeline::analyze_combined(self.orchestrator, stock, image).await,
            Pipeline::Phased => pipeline::analyze_phased(self.orchestrator, stock, image).await,
        };
        result.map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn target_stock_from_lookup() {
        let env = HashMap::from([("TARGET_STOCK_CODE", " 069500 "), ("TARGET_STOCK_NAME", "KODEX 200")]);
        let stock = target_stock(|k| env.get(k).map(|v| (*v).to_owned())).unwrap();
        assert_eq!(stock.code, "069500");
        assert_eq!(stock.name, "KODEX 200");
        assert_eq!(stock.label(), "KODEX 200 (069500)");
    }

    #[test]
    fn target_name_defaults_to_code() {
        let stock = target_stock(|k| (k == "TARGET_STOCK_CODE").then(|| "069500".to_owned())).unwrap();
        assert_eq!(stock.name, "069500");
    }

    #[test]
    fn no_target_means_full_list() {
        assert!(target_stock(|_| None).is_none());
        assert!(target_stock(|_| Some(String::new())).is_none());
    }

    #[test]
    fn load_stock_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stocks.json");
        std::fs::write(
            &path,
            r#"{"stocks":[{"code":"069500","name":"KODEX 200"},{"code":"360750","name":"TIGER S&P500"}]}"#,
        )
        .unwrap();
        let stocks = load_stocks(&path).unwrap();
        assert_eq!(stocks.len(), 2);
        assert_eq!(stocks[1].code, "360750");
    }

    #[test]
    fn malformed_stock_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stocks.json");
        std::fs::write(&path, "[]").unwrap();
        assert!(matches!(load_stocks(&path), Err(StocklensError::StockList(_))));
        assert!(matches!(
            load_stocks(&dir.path().join("missing.json")),
            Err(StocklensError::StockList(_))
        ));
    }
}
