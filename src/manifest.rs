// Defect manifest — the reproducible record of intentionally injected
// data-quality issues. This is the only artifact downstream tooling may use
// to learn what is wrong on purpose; anything broken outside it fails the run.
//
// Each candidate row is decided exactly once at generation time:
//   {not-yet-decided} → {clean} | {defect kind, row ref}
// and the decision is never re-evaluated, so replaying the same (seed, config)
// reproduces the manifest byte for byte.

use crate::config::DefectConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DefectKind {
    MissingPostcode,
    OrphanAccount,
    ZeroAmountTransaction,
    ImbalancedJournal,
    StaleStagingBatch,
}

impl DefectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefectKind::MissingPostcode => "missing_postcode",
            DefectKind::OrphanAccount => "orphan_account",
            DefectKind::ZeroAmountTransaction => "zero_amount_transaction",
            DefectKind::ImbalancedJournal => "imbalanced_journal",
            DefectKind::StaleStagingBatch => "stale_staging_batch",
        }
    }
}

/// One injected defect: the table it lives in and the row it affects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefectRecord {
    pub table: String,
    pub row_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefectManifest {
    pub seed: u64,
    pub defect_config: DefectConfig,
    /// kind → affected rows, keyed by canonical kind string so the JSON
    /// serialization is byte-stable.
    entries: BTreeMap<String, Vec<DefectRecord>>,
}

impl DefectManifest {
    pub fn new(seed: u64, defect_config: DefectConfig) -> Self {
        DefectManifest {
            seed,
            defect_config,
            entries: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, kind: DefectKind, table: &str, row_ref: impl Into<String>) {
        self.entries
            .entry(kind.as_str().to_string())
            .or_default()
            .push(DefectRecord {
                table: table.to_string(),
                row_ref: row_ref.into(),
            });
    }

    pub fn count(&self, kind: DefectKind) -> usize {
        self.entries.get(kind.as_str()).map_or(0, |v| v.len())
    }

    pub fn rows(&self, kind: DefectKind) -> &[DefectRecord] {
        self.entries.get(kind.as_str()).map_or(&[], |v| v.as_slice())
    }

    pub fn contains(&self, kind: DefectKind, row_ref: &str) -> bool {
        self.rows(kind).iter().any(|r| r.row_ref == row_ref)
    }

    pub fn total_defects(&self) -> usize {
        self.entries.values().map(|v| v.len()).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|(kind, rows)| format!("{kind}: {}", rows.len()))
            .collect();
        format!("{} defects ({})", self.total_defects(), parts.join(", "))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> DefectManifest {
        DefectManifest::new(42, DefectConfig::default())
    }

    #[test]
    fn test_record_and_count() {
        let mut m = manifest();
        m.record(DefectKind::OrphanAccount, "core_accounts", "85001");
        m.record(DefectKind::OrphanAccount, "core_accounts", "85002");
        m.record(DefectKind::ImbalancedJournal, "gl_entries", "JNL-00000001");

        assert_eq!(m.count(DefectKind::OrphanAccount), 2);
        assert_eq!(m.count(DefectKind::ImbalancedJournal), 1);
        assert_eq!(m.count(DefectKind::MissingPostcode), 0);
        assert_eq!(m.total_defects(), 3);
        assert!(m.contains(DefectKind::OrphanAccount, "85001"));
        assert!(!m.contains(DefectKind::OrphanAccount, "85003"));
    }

    #[test]
    fn test_json_roundtrip_is_stable() {
        let mut m = manifest();
        m.record(DefectKind::ZeroAmountTransaction, "core_transactions", "17");
        m.record(DefectKind::MissingPostcode, "core_addresses", "4");

        let json1 = m.to_json().unwrap();
        let back = DefectManifest::from_json(&json1).unwrap();
        let json2 = back.to_json().unwrap();

        assert_eq!(json1, json2, "manifest JSON must be byte-stable");
        assert_eq!(back.count(DefectKind::ZeroAmountTransaction), 1);
        assert_eq!(back.seed, 42);
    }

    #[test]
    fn test_summary_mentions_each_kind() {
        let mut m = manifest();
        m.record(DefectKind::StaleStagingBatch, "stg_customers", "stg_customers");

        let summary = m.summary();
        assert!(summary.contains("stale_staging_batch: 1"));
    }
}
