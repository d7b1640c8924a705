use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::StockAnalysis;
use crate::capability::CapabilityClass;
use crate::error::Result;
use crate::orchestrator::Orchestrator;

/// The JSON document the dashboard reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsDocument {
    pub last_updated: DateTime<Utc>,
    pub run_id: Uuid,
    /// Vision provider in use at the end of the run, `"unknown"` if none
    /// succeeded.
    pub provider: String,
    pub providers: BTreeMap<CapabilityClass, String>,
    pub stocks: Vec<StockAnalysis>,
}

impl ResultsDocument {
    pub fn new(stocks: Vec<StockAnalysis>, orchestrator: &Orchestrator) -> Self {
        Self {
            last_updated: Utc::now(),
            run_id: Uuid::now_v7(),
            provider: orchestrator
                .current_provider(CapabilityClass::Vision)
                .unwrap_or("unknown")
                .to_owned(),
            providers: orchestrator.current_providers(),
            stocks,
        }
    }

    /// Pretty-printed, creating parent directories as needed.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::registry::ProviderRegistry;

    #[test]
    fn empty_run_reports_unknown_provider() {
        let orchestrator = Orchestrator::new(ProviderRegistry::new());
        let doc = ResultsDocument::new(Vec::new(), &orchestrator);
        assert_eq!(doc.provider, "unknown");
        assert!(doc.providers.is_empty());

        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("lastUpdated").is_some());
        assert!(json.get("runId").is_some());
        assert_eq!(json["stocks"], serde_json::json!([]));
    }

    #[test]
    fn write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("public/data/analysis_results.json");
        let orchestrator = Orchestrator::new(ProviderRegistry::new());
        let doc = ResultsDocument::new(Vec::new(), &orchestrator);

        doc.write(&path).unwrap();
        let back: ResultsDocument =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.run_id, doc.run_id);
    }
}
