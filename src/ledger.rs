// General ledger source system. Every journal is a balanced debit/credit pair
// posted to leaf chart-of-accounts codes — except the single deliberately
// imbalanced journal batch, which is recorded in the defect manifest.

use crate::context::{pick, AmountSampler, GenContext, Pence};
use crate::manifest::{DefectKind, DefectManifest};
use crate::reference::ReferenceData;
use anyhow::Result;
use chrono::{Datelike, Duration, NaiveDate};
use rand::Rng;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct GlEntry {
    pub entry_id: i64,
    pub journal_id: String,
    pub batch_id: String,
    pub entry_date: NaiveDate,
    pub posting_date: NaiveDate,
    pub account_code: String,
    pub cost_centre_code: String,
    pub debit_pence: Pence,
    pub credit_pence: Pence,
    pub description: String,
    pub source_system: String,
    pub source_reference: String,
    pub is_manual: bool,
    pub posted_by: String,
}

#[derive(Debug, Clone)]
pub struct GlBalance {
    pub balance_id: i64,
    pub period_end_date: NaiveDate,
    pub account_code: String,
    pub cost_centre_code: String,
    pub opening_pence: Pence,
    pub period_debits_pence: Pence,
    pub period_credits_pence: Pence,
    pub closing_pence: Pence,
}

#[derive(Debug, Clone)]
pub struct LedgerSet {
    pub entries: Vec<GlEntry>,
    pub balances: Vec<GlBalance>,
}

/// Posting pairs per banking activity: (label, debit code, credit code).
const POSTING_RULES: &[(&str, &str, &str)] = &[
    ("Salary posting", "2110", "4210"),
    ("Direct debit posting", "2110", "1120"),
    ("Standing order posting", "2110", "1120"),
    ("Faster payment posting", "2110", "1120"),
    ("Card payment posting", "2110", "4220"),
    ("Interest posting", "5110", "2120"),
    ("Fee posting", "4210", "2110"),
    ("Loan repayment posting", "1210", "2110"),
    ("Mortgage payment posting", "1220", "2110"),
    ("Transfer posting", "2110", "1120"),
    ("BACS posting", "2110", "1120"),
    ("CHAPS posting", "2110", "1120"),
    ("ATM withdrawal posting", "2110", "1130"),
];

pub fn generate(
    ctx: &GenContext,
    reference: &ReferenceData,
    defects: &mut DefectManifest,
) -> Result<LedgerSet> {
    let config = &ctx.config;
    let amount_sampler = AmountSampler::new(5.0, 1.2, 100_000_00)?;
    let cost_centres: Vec<&str> = reference.cost_centres.iter().map(|c| c.code.as_str()).collect();

    let mut entries = Vec::new();
    let mut entry_ids = 0i64;
    let mut journal_counter = 0u64;

    let n_days = (config.txn_date_end - config.txn_date_start).num_days() + 1;
    for day_offset in 0..n_days {
        let entry_date = config.txn_date_start + Duration::days(day_offset);
        let batch_id = format!("BATCH-{}", entry_date.format("%Y%m%d"));
        let mut rng = ctx.stream("gl", day_offset as u64);

        // Journal volume tracks the size of the bank being generated.
        let base = rng.gen_range(150..=250usize);
        let n_journals = (base * config.customer_count / 50_000).max(3);

        for _ in 0..n_journals {
            journal_counter += 1;
            let journal_id = format!("JNL-{journal_counter:08}");
            let (label, debit_code, credit_code) = *pick(&mut rng, POSTING_RULES);
            let cost_centre = *pick(&mut rng, &cost_centres);
            let amount = amount_sampler.sample(&mut rng);
            let source_reference = format!("TXN-{}", rng.gen_range(100_000..1_000_000));

            entry_ids += 1;
            entries.push(GlEntry {
                entry_id: entry_ids,
                journal_id: journal_id.clone(),
                batch_id: batch_id.clone(),
                entry_date,
                posting_date: entry_date,
                account_code: debit_code.to_string(),
                cost_centre_code: cost_centre.to_string(),
                debit_pence: amount,
                credit_pence: 0,
                description: label.to_string(),
                source_system: "core_banking".to_string(),
                source_reference: source_reference.clone(),
                is_manual: false,
                posted_by: "SYSTEM".to_string(),
            });
            entry_ids += 1;
            entries.push(GlEntry {
                entry_id: entry_ids,
                journal_id,
                batch_id: batch_id.clone(),
                entry_date,
                posting_date: entry_date,
                account_code: credit_code.to_string(),
                cost_centre_code: cost_centre.to_string(),
                debit_pence: 0,
                credit_pence: amount,
                description: label.to_string(),
                source_system: "core_banking".to_string(),
                source_reference,
                is_manual: false,
                posted_by: "SYSTEM".to_string(),
            });
        }
    }

    // The one journal that does not balance: a manual fee adjustment whose
    // credit leg is short by the configured imbalance.
    journal_counter += 1;
    let journal_id = format!("JNL-{journal_counter:08}");
    let defect_date = config.txn_date_start + Duration::days(n_days / 2);
    let credit = 14_500_00;
    let debit = credit + config.defects.journal_imbalance_pence;
    defects.record(DefectKind::ImbalancedJournal, "gl_entries", journal_id.clone());

    for (account_code, debit_pence, credit_pence) in
        [("4210", debit, 0), ("2110", 0, credit)]
    {
        entry_ids += 1;
        entries.push(GlEntry {
            entry_id: entry_ids,
            journal_id: journal_id.clone(),
            batch_id: config.defects.imbalanced_journal_batch.clone(),
            entry_date: defect_date,
            posting_date: defect_date,
            account_code: account_code.to_string(),
            cost_centre_code: "CC-FIN".to_string(),
            debit_pence,
            credit_pence,
            description: "Manual fee adjustment".to_string(),
            source_system: "manual".to_string(),
            source_reference: "MANUAL-ERR-001".to_string(),
            is_manual: true,
            posted_by: "FIN-003".to_string(),
        });
    }

    let balances = period_balances(&entries);

    Ok(LedgerSet { entries, balances })
}

/// Fold entries into month-end balance snapshots per (account, cost centre),
/// carrying the running balance across periods.
fn period_balances(entries: &[GlEntry]) -> Vec<GlBalance> {
    let mut period_sums: BTreeMap<(String, String, NaiveDate), (Pence, Pence)> = BTreeMap::new();
    for entry in entries {
        let key = (
            entry.account_code.clone(),
            entry.cost_centre_code.clone(),
            month_end(entry.entry_date),
        );
        let sums = period_sums.entry(key).or_insert((0, 0));
        sums.0 += entry.debit_pence;
        sums.1 += entry.credit_pence;
    }

    let mut running: BTreeMap<(String, String), Pence> = BTreeMap::new();
    let mut balances = Vec::with_capacity(period_sums.len());
    for ((account_code, cost_centre_code, period_end_date), (debits, credits)) in period_sums {
        let opening = running
            .get(&(account_code.clone(), cost_centre_code.clone()))
            .copied()
            .unwrap_or(0);
        let closing = opening + debits - credits;
        running.insert((account_code.clone(), cost_centre_code.clone()), closing);

        balances.push(GlBalance {
            balance_id: balances.len() as i64 + 1,
            period_end_date,
            account_code,
            cost_centre_code,
            opening_pence: opening,
            period_debits_pence: debits,
            period_credits_pence: credits,
            closing_pence: closing,
        });
    }
    balances
}

fn month_end(d: NaiveDate) -> NaiveDate {
    let (year, month) = if d.month() == 12 {
        (d.year() + 1, 1)
    } else {
        (d.year(), d.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).map_or(d, |first| first - Duration::days(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use std::collections::HashMap;

    fn build() -> (GenContext, LedgerSet, DefectManifest) {
        let config = GenerationConfig {
            customer_count: 500,
            ..GenerationConfig::default()
        };
        let ctx = GenContext::new(config).unwrap();
        let reference = ReferenceData::load(&ctx).unwrap();
        let mut manifest = DefectManifest::new(ctx.config.seed, ctx.config.defects.clone());
        let ledger = generate(&ctx, &reference, &mut manifest).unwrap();
        (ctx, ledger, manifest)
    }

    fn journal_sums(entries: &[GlEntry]) -> HashMap<&str, (Pence, Pence)> {
        let mut sums: HashMap<&str, (Pence, Pence)> = HashMap::new();
        for entry in entries {
            let sum = sums.entry(entry.journal_id.as_str()).or_default();
            sum.0 += entry.debit_pence;
            sum.1 += entry.credit_pence;
        }
        sums
    }

    #[test]
    fn test_exactly_one_imbalanced_journal() {
        let (ctx, ledger, manifest) = build();

        let mut imbalanced = Vec::new();
        for (journal_id, (debits, credits)) in journal_sums(&ledger.entries) {
            if debits != credits {
                imbalanced.push(journal_id.to_string());
            }
        }

        assert_eq!(imbalanced.len(), 1);
        assert_eq!(manifest.count(DefectKind::ImbalancedJournal), 1);
        assert!(manifest.contains(DefectKind::ImbalancedJournal, &imbalanced[0]));

        let defect_entries: Vec<&GlEntry> = ledger
            .entries
            .iter()
            .filter(|e| e.journal_id == imbalanced[0])
            .collect();
        let debits: Pence = defect_entries.iter().map(|e| e.debit_pence).sum();
        let credits: Pence = defect_entries.iter().map(|e| e.credit_pence).sum();
        assert_eq!(debits - credits, ctx.config.defects.journal_imbalance_pence);
        assert!(defect_entries
            .iter()
            .all(|e| e.batch_id == ctx.config.defects.imbalanced_journal_batch));
    }

    #[test]
    fn test_every_entry_posts_one_side_only() {
        let (_, ledger, _) = build();

        for entry in &ledger.entries {
            assert!(
                (entry.debit_pence > 0) ^ (entry.credit_pence > 0),
                "entry {} posts both sides",
                entry.entry_id
            );
        }
    }

    #[test]
    fn test_entries_post_to_leaf_codes() {
        let (ctx, ledger, _) = build();
        let reference = ReferenceData::load(&ctx).unwrap();
        let posting: Vec<&str> = reference.posting_codes();

        for entry in &ledger.entries {
            assert!(posting.contains(&entry.account_code.as_str()), "{}", entry.account_code);
        }
    }

    #[test]
    fn test_period_balances_roll_forward() {
        let (_, ledger, _) = build();

        let mut previous_closing: HashMap<(String, String), Pence> = HashMap::new();
        for balance in &ledger.balances {
            let key = (balance.account_code.clone(), balance.cost_centre_code.clone());
            let expected_opening = previous_closing.get(&key).copied().unwrap_or(0);
            assert_eq!(balance.opening_pence, expected_opening);
            assert_eq!(
                balance.closing_pence,
                balance.opening_pence + balance.period_debits_pence - balance.period_credits_pence
            );
            previous_closing.insert(key, balance.closing_pence);
        }
    }

    #[test]
    fn test_month_end_helper() {
        let d = NaiveDate::from_ymd_opt(2024, 11, 15).unwrap();
        assert_eq!(month_end(d), NaiveDate::from_ymd_opt(2024, 11, 30).unwrap());
        let dec = NaiveDate::from_ymd_opt(2024, 12, 3).unwrap();
        assert_eq!(month_end(dec), NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        let feb = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert_eq!(month_end(feb), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }
}
