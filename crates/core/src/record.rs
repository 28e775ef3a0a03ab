use serde::{Deserialize, Serialize};

use crate::store::{get_as, put_as, KvStore, StoreError};

/// What an analysis run leaves behind for later retrieval and reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub analysis_id: String,
    /// Original upload name
    pub source_filename: String,
    /// Analysis workbook file name
    pub download_filename: String,
    /// Serialized basic statistics
    pub basic_stats: serde_json::Value,
    /// Split-oriented preview of the first rows
    pub preview: serde_json::Value,
    pub report: String,
    /// Image file names under the analysis image directory, in order
    pub images: Vec<String>,
    pub visualization_success: bool,
    /// RFC 3339 timestamp
    pub created_at: String,
}

impl AnalysisRecord {
    pub fn key(analysis_id: &str) -> String {
        format!("analysis-{}", analysis_id)
    }

    pub fn save(&self, store: &dyn KvStore) -> Result<(), StoreError> {
        put_as(store, &Self::key(&self.analysis_id), self)
    }

    pub fn load(store: &dyn KvStore, analysis_id: &str) -> Result<Option<Self>, StoreError> {
        get_as(store, &Self::key(analysis_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_save_and_load() {
        let store = MemoryStore::new();
        let record = AnalysisRecord {
            analysis_id: "abc".into(),
            source_filename: "sales.xlsx".into(),
            download_filename: "analysis_abc.xlsx".into(),
            basic_stats: serde_json::json!({"rows": 2}),
            preview: serde_json::json!({"columns": [], "index": [], "data": []}),
            report: "fine".into(),
            images: vec!["plot_1.png".into()],
            visualization_success: true,
            created_at: "2025-01-01T00:00:00Z".into(),
        };
        record.save(&store).unwrap();

        let loaded = AnalysisRecord::load(&store, "abc").unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(AnalysisRecord::load(&store, "missing").unwrap().is_none());
        assert!(store.get("analysis-abc").unwrap().unwrap()["downloadFilename"].is_string());
    }
}
