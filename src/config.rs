// Generation configuration for the Pennine Community Bank dataset.
// One config + one seed fully determines every generated row.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

// ============================================================================
// CLOSED ENUMERATIONS
// ============================================================================
// Every CHECK-constrained column in the schema has a closed variant type here;
// the canonical string written to the database comes from as_str().

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductCategory {
    CurrentAccount,
    Savings,
    PersonalLoan,
    Mortgage,
    CreditCard,
    BusinessCurrent,
    BusinessLoan,
    BusinessSavings,
}

impl ProductCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCategory::CurrentAccount => "current_account",
            ProductCategory::Savings => "savings",
            ProductCategory::PersonalLoan => "personal_loan",
            ProductCategory::Mortgage => "mortgage",
            ProductCategory::CreditCard => "credit_card",
            ProductCategory::BusinessCurrent => "business_current",
            ProductCategory::BusinessLoan => "business_loan",
            ProductCategory::BusinessSavings => "business_savings",
        }
    }

    pub fn is_lending(&self) -> bool {
        matches!(
            self,
            ProductCategory::PersonalLoan
                | ProductCategory::Mortgage
                | ProductCategory::BusinessLoan
                | ProductCategory::CreditCard
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlAccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl GlAccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlAccountType::Asset => "asset",
            GlAccountType::Liability => "liability",
            GlAccountType::Equity => "equity",
            GlAccountType::Revenue => "revenue",
            GlAccountType::Expense => "expense",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemeType {
    RealTime,
    Batch,
    HighValue,
    International,
}

impl SchemeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemeType::RealTime => "real_time",
            SchemeType::Batch => "batch",
            SchemeType::HighValue => "high_value",
            SchemeType::International => "international",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchType {
    FullService,
    DigitalHub,
    HeadOffice,
}

impl BranchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BranchType::FullService => "full_service",
            BranchType::DigitalHub => "digital_hub",
            BranchType::HeadOffice => "head_office",
        }
    }
}

// ============================================================================
// STATIC CATALOGUES
// ============================================================================
// The reference rowset is fixed configuration, not random data: same catalogue
// in, same rows out. Tuple layout mirrors the DDL column order.

/// (code, name, category, annual rate, min balance pence, launched)
pub const PRODUCTS: &[(&str, &str, ProductCategory, f64, i64, &str)] = &[
    ("CA-STD-001", "Pennine Current Account", ProductCategory::CurrentAccount, 0.0, 0, "2015-01-01"),
    ("CA-PRM-001", "Pennine Premium Current", ProductCategory::CurrentAccount, 0.005, 500_000, "2018-03-01"),
    ("CA-STU-001", "Student Current Account", ProductCategory::CurrentAccount, 0.0, 0, "2016-09-01"),
    ("SA-ISA-001", "Pennine Cash ISA", ProductCategory::Savings, 0.042, 100, "2015-01-01"),
    ("SA-EAS-001", "Easy Saver", ProductCategory::Savings, 0.031, 100, "2015-01-01"),
    ("SA-FIX-001", "Fixed Rate Saver 1yr", ProductCategory::Savings, 0.048, 100_000, "2020-01-01"),
    ("SA-FIX-002", "Fixed Rate Saver 2yr", ProductCategory::Savings, 0.051, 100_000, "2020-01-01"),
    ("SA-NOT-001", "Notice Saver 90 Day", ProductCategory::Savings, 0.044, 50_000, "2019-06-01"),
    ("PL-UNS-001", "Personal Loan", ProductCategory::PersonalLoan, 0.069, 0, "2015-01-01"),
    ("PL-UNS-002", "Personal Loan Plus", ProductCategory::PersonalLoan, 0.049, 0, "2020-01-01"),
    ("MG-RES-001", "Residential Mortgage 2yr Fix", ProductCategory::Mortgage, 0.0449, 0, "2015-01-01"),
    ("MG-RES-002", "Residential Mortgage 5yr Fix", ProductCategory::Mortgage, 0.0479, 0, "2015-01-01"),
    ("MG-BTL-001", "Buy to Let Mortgage", ProductCategory::Mortgage, 0.0549, 0, "2017-01-01"),
    ("MG-RES-003", "Tracker Mortgage", ProductCategory::Mortgage, 0.0429, 0, "2015-01-01"),
    ("CC-STD-001", "Pennine Credit Card", ProductCategory::CreditCard, 0.199, 0, "2016-01-01"),
    ("CC-RWD-001", "Rewards Credit Card", ProductCategory::CreditCard, 0.229, 0, "2019-01-01"),
    ("BC-STD-001", "Business Current Account", ProductCategory::BusinessCurrent, 0.0, 0, "2015-01-01"),
    ("BC-PRM-001", "Business Premium Account", ProductCategory::BusinessCurrent, 0.005, 1_000_000, "2018-01-01"),
    ("BL-SME-001", "SME Business Loan", ProductCategory::BusinessLoan, 0.079, 0, "2015-01-01"),
    ("BL-GRO-001", "Growth Finance Loan", ProductCategory::BusinessLoan, 0.065, 0, "2021-01-01"),
    ("BS-SME-001", "Business Savings Account", ProductCategory::BusinessSavings, 0.035, 100, "2015-01-01"),
];

/// (code, name, type, subtype, parent, level)
pub const CHART_OF_ACCOUNTS: &[(&str, &str, GlAccountType, Option<&str>, Option<&str>, u8)] = &[
    // Level 0
    ("1000", "Assets", GlAccountType::Asset, None, None, 0),
    ("2000", "Liabilities", GlAccountType::Liability, None, None, 0),
    ("3000", "Equity", GlAccountType::Equity, None, None, 0),
    ("4000", "Revenue", GlAccountType::Revenue, None, None, 0),
    ("5000", "Expenses", GlAccountType::Expense, None, None, 0),
    // Level 1 — assets
    ("1100", "Cash and Balances", GlAccountType::Asset, Some("cash"), Some("1000"), 1),
    ("1200", "Loans and Advances", GlAccountType::Asset, Some("loans"), Some("1000"), 1),
    ("1300", "Investment Securities", GlAccountType::Asset, Some("investments"), Some("1000"), 1),
    // Level 2 — cash
    ("1110", "Cash at Bank of England", GlAccountType::Asset, Some("cash"), Some("1100"), 2),
    ("1120", "Nostro Accounts", GlAccountType::Asset, Some("cash"), Some("1100"), 2),
    ("1130", "ATM Holdings", GlAccountType::Asset, Some("cash"), Some("1100"), 2),
    // Level 2 — loans
    ("1210", "Personal Loans", GlAccountType::Asset, Some("loans"), Some("1200"), 2),
    ("1220", "Mortgages", GlAccountType::Asset, Some("loans"), Some("1200"), 2),
    ("1230", "Business Loans", GlAccountType::Asset, Some("loans"), Some("1200"), 2),
    ("1240", "Credit Card Receivables", GlAccountType::Asset, Some("loans"), Some("1200"), 2),
    ("1250", "Overdrafts", GlAccountType::Asset, Some("loans"), Some("1200"), 2),
    // Level 2 — investments
    ("1310", "Government Bonds", GlAccountType::Asset, Some("investments"), Some("1300"), 2),
    ("1320", "Corporate Bonds", GlAccountType::Asset, Some("investments"), Some("1300"), 2),
    // Level 1 — liabilities
    ("2100", "Customer Deposits", GlAccountType::Liability, Some("deposits"), Some("2000"), 1),
    ("2200", "Wholesale Funding", GlAccountType::Liability, Some("funding"), Some("2000"), 1),
    // Level 2 — deposits
    ("2110", "Current Account Deposits", GlAccountType::Liability, Some("deposits"), Some("2100"), 2),
    ("2120", "Savings Deposits", GlAccountType::Liability, Some("deposits"), Some("2100"), 2),
    ("2130", "Fixed Term Deposits", GlAccountType::Liability, Some("deposits"), Some("2100"), 2),
    ("2140", "Business Deposits", GlAccountType::Liability, Some("deposits"), Some("2100"), 2),
    // Level 2 — funding
    ("2210", "Interbank Borrowings", GlAccountType::Liability, Some("funding"), Some("2200"), 2),
    ("2220", "Repo Agreements", GlAccountType::Liability, Some("funding"), Some("2200"), 2),
    // Level 1 — equity
    ("3100", "Share Capital", GlAccountType::Equity, None, Some("3000"), 1),
    ("3200", "Retained Earnings", GlAccountType::Equity, None, Some("3000"), 1),
    // Level 1 — revenue
    ("4100", "Interest Income", GlAccountType::Revenue, Some("interest"), Some("4000"), 1),
    ("4200", "Fee and Commission Income", GlAccountType::Revenue, Some("fees"), Some("4000"), 1),
    // Level 2 — interest income
    ("4110", "Interest on Loans", GlAccountType::Revenue, Some("interest"), Some("4100"), 2),
    ("4120", "Interest on Mortgages", GlAccountType::Revenue, Some("interest"), Some("4100"), 2),
    ("4130", "Interest on Investments", GlAccountType::Revenue, Some("interest"), Some("4100"), 2),
    // Level 2 — fee income
    ("4210", "Account Fees", GlAccountType::Revenue, Some("fees"), Some("4200"), 2),
    ("4220", "Card Interchange Fees", GlAccountType::Revenue, Some("fees"), Some("4200"), 2),
    ("4230", "Payment Fees", GlAccountType::Revenue, Some("fees"), Some("4200"), 2),
    // Level 1 — expenses
    ("5100", "Interest Expense", GlAccountType::Expense, Some("interest"), Some("5000"), 1),
    ("5200", "Staff Costs", GlAccountType::Expense, Some("staff"), Some("5000"), 1),
    ("5300", "Premises and Equipment", GlAccountType::Expense, Some("premises"), Some("5000"), 1),
    ("5400", "Technology Costs", GlAccountType::Expense, Some("technology"), Some("5000"), 1),
    ("5500", "Regulatory and Compliance", GlAccountType::Expense, Some("regulatory"), Some("5000"), 1),
    // Level 2 — interest expense
    ("5110", "Interest on Deposits", GlAccountType::Expense, Some("interest"), Some("5100"), 2),
    ("5120", "Interest on Wholesale Funding", GlAccountType::Expense, Some("interest"), Some("5100"), 2),
];

/// (code, name, department, manager)
pub const COST_CENTRES: &[(&str, &str, &str, &str)] = &[
    ("CC-EXC", "Executive Office", "Executive", "CEO"),
    ("CC-RET", "Retail Banking", "Retail", "Head of Retail"),
    ("CC-BUS", "Business Banking", "Business", "Head of Business"),
    ("CC-TRE", "Treasury", "Treasury", "Head of Treasury"),
    ("CC-RIS", "Risk Management", "Risk", "CRO"),
    ("CC-COM", "Compliance", "Compliance", "Head of Compliance"),
    ("CC-FIN", "Finance", "Finance", "CFO"),
    ("CC-TEC", "Technology", "IT", "CTO"),
    ("CC-OPS", "Operations", "Operations", "COO"),
    ("CC-PAY", "Payments", "Payments", "Head of Payments"),
    ("CC-CRD", "Credit Operations", "Credit", "Head of Credit"),
    ("CC-BR1", "Leeds Branch", "Branch", "Branch Manager Leeds"),
    ("CC-BR2", "Manchester Branch", "Branch", "Branch Manager Manchester"),
    ("CC-BR3", "Sheffield Branch", "Branch", "Branch Manager Sheffield"),
    ("CC-BR4", "York Branch", "Branch", "Branch Manager York"),
    ("CC-BR5", "Bradford Branch", "Branch", "Branch Manager Bradford"),
    ("CC-BR6", "Newcastle Branch", "Branch", "Branch Manager Newcastle"),
    ("CC-BR7", "Carlisle Branch", "Branch", "Branch Manager Carlisle"),
    ("CC-MKT", "Marketing", "Marketing", "Head of Marketing"),
    ("CC-AUD", "Internal Audit", "Audit", "Head of Audit"),
];

/// (code, name, type, max amount pence, settlement cycle, operating hours)
pub const PAYMENT_SCHEMES: &[(&str, &str, SchemeType, Option<i64>, &str, &str)] = &[
    ("FPS", "Faster Payments", SchemeType::RealTime, Some(25_000_000), "Near instant", "24/7"),
    ("BACS", "BACS Direct Credit", SchemeType::Batch, None, "3 working days", "Working days"),
    ("DD", "Direct Debit", SchemeType::Batch, None, "3 working days", "Working days"),
    ("CHAPS", "CHAPS", SchemeType::HighValue, None, "Same day", "06:00-18:00"),
    ("SWIFT", "SWIFT International", SchemeType::International, None, "1-5 working days", "Working days"),
    ("MC", "Mastercard", SchemeType::RealTime, None, "Real-time auth", "24/7"),
    ("VISA", "Visa", SchemeType::RealTime, None, "Real-time auth", "24/7"),
    ("SO", "Standing Order", SchemeType::Batch, None, "Scheduled", "As scheduled"),
    ("LINK", "LINK ATM Network", SchemeType::RealTime, Some(50_000), "Instant", "24/7"),
    ("SEPA", "SEPA Credit Transfer", SchemeType::Batch, None, "1-2 working days", "Working days"),
];

/// (code, name, region, city, postcode, type)
pub const BRANCHES: &[(&str, &str, &str, &str, &str, BranchType)] = &[
    ("BR-LEE-01", "Leeds City Square", "Yorkshire and the Humber", "Leeds", "LS1 5AB", BranchType::FullService),
    ("BR-LEE-02", "Leeds Headrow", "Yorkshire and the Humber", "Leeds", "LS1 8EQ", BranchType::FullService),
    ("BR-MAN-01", "Manchester Deansgate", "North West", "Manchester", "M3 4LQ", BranchType::FullService),
    ("BR-SHE-01", "Sheffield Fargate", "Yorkshire and the Humber", "Sheffield", "S1 2HE", BranchType::FullService),
    ("BR-YRK-01", "York Parliament St", "Yorkshire and the Humber", "York", "YO1 8RS", BranchType::FullService),
    ("BR-BRA-01", "Bradford Broadway", "Yorkshire and the Humber", "Bradford", "BD1 1US", BranchType::FullService),
    ("BR-NEW-01", "Newcastle Grey St", "North East", "Newcastle", "NE1 6EE", BranchType::FullService),
    ("BR-CAR-01", "Carlisle English St", "North West", "Carlisle", "CA3 8JH", BranchType::FullService),
    ("BR-DIG-01", "Digital Hub", "Yorkshire and the Humber", "Leeds", "LS2 7EY", BranchType::DigitalHub),
    ("BR-HQ-01", "Head Office", "Yorkshire and the Humber", "Leeds", "LS1 4AP", BranchType::HeadOffice),
];

pub const SORT_CODES: &[&str] = &[
    "770100", "770101", "770102", // Leeds
    "770200", "770201", // Manchester
    "770300", // Sheffield
    "770400", // York
    "770500", // Bradford
    "770600", // Newcastle
    "770700", // Carlisle
    "770800", // Digital
];

// ============================================================================
// DEFECT CONFIGURATION
// ============================================================================

/// Intentional data-quality defects. Every quantity here is exact, not
/// approximate: the Consistency Enforcer treats any deviation as a failed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefectConfig {
    /// Addresses generated with a NULL postcode.
    pub missing_postcodes: usize,
    /// Completed transactions carrying amount zero.
    pub zero_amount_transactions: usize,
    /// Accounts whose customer_id resolves to no customer.
    pub orphaned_accounts: usize,
    /// Batch id of the single deliberately imbalanced GL journal batch.
    pub imbalanced_journal_batch: String,
    /// Size of the imbalance on the credit leg, in pence.
    pub journal_imbalance_pence: i64,
    /// Staging tables loaded under a stale batch id / ingestion timestamp.
    pub stale_staging_tables: usize,
}

impl Default for DefectConfig {
    fn default() -> Self {
        DefectConfig {
            missing_postcodes: 2500,
            zero_amount_transactions: 300,
            orphaned_accounts: 15,
            imbalanced_journal_batch: "BATCH-20241115-MAN".to_string(),
            journal_imbalance_pence: 50_000,
            stale_staging_tables: 1,
        }
    }
}

// ============================================================================
// GENERATION CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub seed: u64,
    pub customer_count: usize,
    /// Fraction of customers that are personal (rest are business).
    pub personal_ratio: f64,
    pub txn_date_start: NaiveDate,
    pub txn_date_end: NaiveDate,
    pub avg_txn_per_account_month: f64,
    pub calendar_start: NaiveDate,
    pub calendar_end: NaiveDate,
    pub warehouse_batch_date: NaiveDate,
    pub active_account_ratio: f64,
    pub arrears_ratio: f64,
    /// Fraction of customers receiving post-onboarding amendment snapshots.
    pub amendment_ratio: f64,
    pub complaint_ratio: f64,
    pub aml_alert_ratio: f64,
    pub batch_size: usize,
    pub defects: DefectConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            seed: 42,
            customer_count: 50_000,
            personal_ratio: 0.85,
            txn_date_start: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            txn_date_end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            avg_txn_per_account_month: 8.0,
            calendar_start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            calendar_end: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
            warehouse_batch_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            active_account_ratio: 0.88,
            arrears_ratio: 0.04,
            amendment_ratio: 0.10,
            complaint_ratio: 0.03,
            aml_alert_ratio: 0.02,
            batch_size: 5000,
            defects: DefectConfig::default(),
        }
    }
}

impl GenerationConfig {
    /// Load a config from a JSON file, falling back to defaults for a missing path.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: GenerationConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the config and the static catalogues together. Runs before any
    /// row is written; every failure here is a fatal configuration error.
    pub fn validate(&self) -> Result<()> {
        if self.customer_count == 0 {
            bail!("config: customer_count must be positive");
        }
        if !(0.0..=1.0).contains(&self.personal_ratio) {
            bail!("config: personal_ratio must be within [0, 1]");
        }
        if self.txn_date_start > self.txn_date_end {
            bail!(
                "config: txn_date_start {} is after txn_date_end {}",
                self.txn_date_start,
                self.txn_date_end
            );
        }
        if self.calendar_start > self.calendar_end {
            bail!("config: calendar range is inverted");
        }
        if self.txn_date_start < self.calendar_start || self.txn_date_end > self.calendar_end {
            bail!("config: transaction window falls outside the calendar dimension");
        }
        if self.batch_size == 0 {
            bail!("config: batch_size must be positive");
        }
        if self.defects.orphaned_accounts >= self.customer_count {
            bail!("config: orphaned_accounts must be smaller than customer_count");
        }
        if self.defects.missing_postcodes > self.customer_count {
            bail!("config: missing_postcodes cannot exceed customer_count");
        }
        if self.defects.journal_imbalance_pence <= 0 {
            bail!("config: journal_imbalance_pence must be positive");
        }

        validate_catalogues()
    }
}

/// Check the static catalogues for internal consistency: unique codes and a
/// chart-of-accounts hierarchy whose parents all exist at a shallower level.
fn validate_catalogues() -> Result<()> {
    let mut product_codes = HashSet::new();
    for (code, ..) in PRODUCTS {
        if !product_codes.insert(*code) {
            bail!("config: duplicate product code {code}");
        }
    }

    let mut coa_codes = HashSet::new();
    for (code, ..) in CHART_OF_ACCOUNTS {
        if !coa_codes.insert(*code) {
            bail!("config: duplicate chart-of-accounts code {code}");
        }
    }
    for (code, _, _, _, parent, level) in CHART_OF_ACCOUNTS {
        if let Some(parent) = parent {
            if !coa_codes.contains(parent) {
                bail!("config: chart-of-accounts code {code} references undefined parent {parent}");
            }
            if *level == 0 {
                bail!("config: top-level chart-of-accounts code {code} must not have a parent");
            }
        } else if *level != 0 {
            bail!("config: chart-of-accounts code {code} at level {level} is missing a parent");
        }
    }

    let mut scheme_codes = HashSet::new();
    for (code, ..) in PAYMENT_SCHEMES {
        if !scheme_codes.insert(*code) {
            bail!("config: duplicate payment scheme code {code}");
        }
    }

    let mut branch_codes = HashSet::new();
    for (code, ..) in BRANCHES {
        if !branch_codes.insert(*code) {
            bail!("config: duplicate branch code {code}");
        }
    }

    let mut cc_codes = HashSet::new();
    for (code, ..) in COST_CENTRES {
        if !cc_codes.insert(*code) {
            bail!("config: duplicate cost centre code {code}");
        }
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GenerationConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inverted_txn_window_rejected() {
        let mut config = GenerationConfig::default();
        config.txn_date_start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        config.txn_date_end = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("txn_date_start"));
    }

    #[test]
    fn test_orphan_count_bounded_by_customers() {
        let mut config = GenerationConfig::default();
        config.customer_count = 10;
        config.defects.orphaned_accounts = 10;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chart_of_accounts_parents_resolve() {
        // Every non-root node's parent must be a defined code.
        let codes: HashSet<&str> = CHART_OF_ACCOUNTS.iter().map(|c| c.0).collect();
        for (code, _, _, _, parent, _) in CHART_OF_ACCOUNTS {
            if let Some(parent) = parent {
                assert!(codes.contains(parent), "{code} has undefined parent {parent}");
            }
        }
    }

    #[test]
    fn test_config_roundtrips_through_json() {
        let config = GenerationConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: GenerationConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(back.seed, config.seed);
        assert_eq!(back.customer_count, config.customer_count);
        assert_eq!(back.defects.orphaned_accounts, config.defects.orphaned_accounts);
    }

    #[test]
    fn test_category_strings_are_canonical() {
        assert_eq!(ProductCategory::CurrentAccount.as_str(), "current_account");
        assert_eq!(ProductCategory::BusinessSavings.as_str(), "business_savings");
        assert!(ProductCategory::CreditCard.is_lending());
        assert!(!ProductCategory::Savings.is_lending());
    }
}
