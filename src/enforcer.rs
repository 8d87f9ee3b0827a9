// Consistency Enforcer — the gate between generation and everything
// downstream. Invariants hold exactly, except where the defect manifest says
// otherwise; a violation outside the manifest fails the run with a diagnostic
// naming the table, row, and invariant. Nothing is repaired silently.
//
// Two passes: verify_sources runs after event generation, verify_warehouse
// after the transform (SCD2 and fact↔dimension invariants only exist then).

use crate::accounts::AccountSet;
use crate::context::{format_gbp, GenContext, Pence};
use crate::customers::CustomerSet;
use crate::ledger::LedgerSet;
use crate::manifest::{DefectKind, DefectManifest};
use crate::transactions::{TransactionSet, TxnStatus};
use crate::warehouse::{DimAccountRow, DimCustomerRow, WarehouseSet};
use anyhow::{bail, Result};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

// ============================================================================
// REPORTS
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct SourceCheckReport {
    pub accounts_checked: usize,
    pub transactions_replayed: usize,
    pub daily_snapshots_checked: usize,
    pub journals_checked: usize,
    pub defects_confirmed: usize,
}

impl SourceCheckReport {
    pub fn summary(&self) -> String {
        format!(
            "{} accounts, {} transactions replayed, {} daily snapshots, {} journals, {} manifested defects confirmed",
            self.accounts_checked,
            self.transactions_replayed,
            self.daily_snapshots_checked,
            self.journals_checked,
            self.defects_confirmed
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct WarehouseCheckReport {
    pub customer_keys_checked: usize,
    pub account_keys_checked: usize,
    pub facts_checked: usize,
}

impl WarehouseCheckReport {
    pub fn summary(&self) -> String {
        format!(
            "{} customer keys, {} account keys, {} facts checked",
            self.customer_keys_checked, self.account_keys_checked, self.facts_checked
        )
    }
}

// ============================================================================
// SOURCE-LAYER PASS
// ============================================================================

pub fn verify_sources(
    ctx: &GenContext,
    customers: &CustomerSet,
    accounts: &AccountSet,
    txns: &TransactionSet,
    ledger: &LedgerSet,
    manifest: &DefectManifest,
) -> Result<SourceCheckReport> {
    let mut report = SourceCheckReport::default();

    check_manifest_totals(ctx, manifest)?;
    check_orphans(customers, accounts, manifest, &mut report)?;
    check_balance_replay(accounts, txns, &mut report)?;
    check_daily_snapshots(txns, &mut report)?;
    check_zero_amounts(txns, manifest, &mut report)?;
    check_journal_balance(ledger, manifest, &mut report)?;
    check_missing_postcodes(customers, manifest, &mut report)?;

    Ok(report)
}

/// Defect quantities are exact: the manifest must carry precisely what the
/// config asked for, or the injection itself misfired.
fn check_manifest_totals(ctx: &GenContext, manifest: &DefectManifest) -> Result<()> {
    let defects = &ctx.config.defects;
    let expectations = [
        (DefectKind::OrphanAccount, defects.orphaned_accounts),
        (DefectKind::ZeroAmountTransaction, defects.zero_amount_transactions),
        (DefectKind::MissingPostcode, defects.missing_postcodes.min(ctx.config.customer_count)),
        (DefectKind::ImbalancedJournal, 1),
    ];
    for (kind, expected) in expectations {
        let actual = manifest.count(kind);
        if actual != expected {
            bail!(
                "defect manifest mismatch: {} has {actual} entries, config demands {expected}",
                kind.as_str()
            );
        }
    }
    Ok(())
}

fn check_orphans(
    customers: &CustomerSet,
    accounts: &AccountSet,
    manifest: &DefectManifest,
    report: &mut SourceCheckReport,
) -> Result<()> {
    let mut unresolved = 0usize;
    for account in &accounts.accounts {
        report.accounts_checked += 1;
        let resolves = customers.customer(account.customer_id).is_some();
        let manifested = manifest.contains(DefectKind::OrphanAccount, &account.account_id.to_string());

        if !resolves && !manifested {
            bail!(
                "invariant violation: core_accounts row {}: customer_id {} does not resolve and is not in the orphan manifest",
                account.account_id,
                account.customer_id
            );
        }
        if resolves && manifested {
            bail!(
                "invariant violation: core_accounts row {}: manifested as orphan but customer_id {} resolves",
                account.account_id,
                account.customer_id
            );
        }
        if !resolves {
            unresolved += 1;
        }
    }

    report.defects_confirmed += unresolved;
    Ok(())
}

/// Replaying each account's timeline from the opening balance must reproduce
/// every stored balance_after; non-completed rows move nothing.
fn check_balance_replay(
    accounts: &AccountSet,
    txns: &TransactionSet,
    report: &mut SourceCheckReport,
) -> Result<()> {
    let mut balances: HashMap<i64, Pence> = HashMap::new();
    let mut last_ts: HashMap<i64, chrono::NaiveDateTime> = HashMap::new();

    for txn in &txns.transactions {
        let account = match accounts.account(txn.account_id) {
            Some(a) => a,
            None => bail!(
                "invariant violation: core_transactions row {}: unknown account {}",
                txn.txn_id,
                txn.account_id
            ),
        };

        if let Some(previous) = last_ts.get(&txn.account_id) {
            if txn.txn_timestamp < *previous {
                bail!(
                    "invariant violation: core_transactions row {}: timeline for account {} is not time-ordered",
                    txn.txn_id,
                    txn.account_id
                );
            }
        }
        last_ts.insert(txn.account_id, txn.txn_timestamp);

        let balance = balances
            .entry(txn.account_id)
            .or_insert(account.opening_balance_pence);
        *balance += txn.applied_amount();
        if txn.balance_after_pence != *balance {
            bail!(
                "invariant violation: core_transactions row {}: balance_after is {} but replay gives {}",
                txn.txn_id,
                format_gbp(txn.balance_after_pence),
                format_gbp(*balance)
            );
        }
        report.transactions_replayed += 1;
    }
    Ok(())
}

/// Daily snapshot = last completed balance of that account's day, exactly.
fn check_daily_snapshots(txns: &TransactionSet, report: &mut SourceCheckReport) -> Result<()> {
    let mut expected: HashMap<(i64, NaiveDate), Pence> = HashMap::new();
    for txn in &txns.transactions {
        if txn.status == TxnStatus::Completed {
            expected.insert((txn.account_id, txn.txn_date), txn.balance_after_pence);
        }
    }

    if expected.len() != txns.daily_balances.len() {
        bail!(
            "invariant violation: core_daily_balances: {} snapshots stored, {} active account-days observed",
            txns.daily_balances.len(),
            expected.len()
        );
    }
    for snapshot in &txns.daily_balances {
        match expected.get(&(snapshot.account_id, snapshot.balance_date)) {
            Some(balance) if *balance == snapshot.balance_pence => {
                report.daily_snapshots_checked += 1;
            }
            Some(balance) => bail!(
                "invariant violation: core_daily_balances ({}, {}): snapshot {} != last completed balance {}",
                snapshot.account_id,
                snapshot.balance_date,
                format_gbp(snapshot.balance_pence),
                format_gbp(*balance)
            ),
            None => bail!(
                "invariant violation: core_daily_balances ({}, {}): no completed transaction that day",
                snapshot.account_id,
                snapshot.balance_date
            ),
        }
    }
    Ok(())
}

fn check_zero_amounts(
    txns: &TransactionSet,
    manifest: &DefectManifest,
    report: &mut SourceCheckReport,
) -> Result<()> {
    let manifested: HashSet<&str> = manifest
        .rows(DefectKind::ZeroAmountTransaction)
        .iter()
        .map(|r| r.row_ref.as_str())
        .collect();

    let mut seen = 0usize;
    for txn in &txns.transactions {
        if txn.status == TxnStatus::Completed && txn.amount_pence == 0 {
            if !manifested.contains(txn.txn_id.to_string().as_str()) {
                bail!(
                    "invariant violation: core_transactions row {}: zero amount outside the manifest",
                    txn.txn_id
                );
            }
            seen += 1;
        }
    }
    if seen != manifested.len() {
        bail!(
            "invariant violation: core_transactions: {seen} zero-amount rows found, manifest lists {}",
            manifested.len()
        );
    }
    report.defects_confirmed += seen;
    Ok(())
}

/// Per-journal double entry: sum(debit) == sum(credit), to the penny, except
/// for journals named by the manifest.
fn check_journal_balance(
    ledger: &LedgerSet,
    manifest: &DefectManifest,
    report: &mut SourceCheckReport,
) -> Result<()> {
    let mut sums: HashMap<&str, (Pence, Pence)> = HashMap::new();
    for entry in &ledger.entries {
        let sum = sums.entry(entry.journal_id.as_str()).or_default();
        sum.0 += entry.debit_pence;
        sum.1 += entry.credit_pence;
    }

    let mut imbalanced = 0usize;
    for (journal_id, (debits, credits)) in &sums {
        report.journals_checked += 1;
        let manifested = manifest.contains(DefectKind::ImbalancedJournal, journal_id);
        if debits != credits && !manifested {
            bail!(
                "invariant violation: gl_entries journal {journal_id}: debits {} != credits {}",
                format_gbp(*debits),
                format_gbp(*credits)
            );
        }
        if debits == credits && manifested {
            bail!(
                "invariant violation: gl_entries journal {journal_id}: manifested as imbalanced but balances"
            );
        }
        if debits != credits {
            imbalanced += 1;
        }
    }

    report.defects_confirmed += imbalanced;
    Ok(())
}

fn check_missing_postcodes(
    customers: &CustomerSet,
    manifest: &DefectManifest,
    report: &mut SourceCheckReport,
) -> Result<()> {
    let manifested: HashSet<&str> = manifest
        .rows(DefectKind::MissingPostcode)
        .iter()
        .map(|r| r.row_ref.as_str())
        .collect();

    let mut seen = 0usize;
    for address in &customers.addresses {
        if address.postcode.is_none() {
            if !manifested.contains(address.address_id.to_string().as_str()) {
                bail!(
                    "invariant violation: core_addresses row {}: missing postcode outside the manifest",
                    address.address_id
                );
            }
            seen += 1;
        }
    }
    if seen != manifested.len() {
        bail!(
            "invariant violation: core_addresses: {seen} missing postcodes found, manifest lists {}",
            manifested.len()
        );
    }
    report.defects_confirmed += seen;
    Ok(())
}

// ============================================================================
// WAREHOUSE PASS
// ============================================================================

pub fn verify_warehouse(warehouse: &WarehouseSet) -> Result<WarehouseCheckReport> {
    let mut report = WarehouseCheckReport::default();

    check_scd2(
        "dim_customer",
        &warehouse.dim_customers,
        |v: &DimCustomerRow| (v.customer_id, v.effective_from, v.effective_to, v.is_current),
        &mut report.customer_keys_checked,
    )?;
    check_scd2(
        "dim_account",
        &warehouse.dim_accounts,
        |v: &DimAccountRow| (v.account_id, v.effective_from, v.effective_to, v.is_current),
        &mut report.account_keys_checked,
    )?;
    check_fact_as_of(warehouse, &mut report)?;

    Ok(report)
}

/// SCD2 invariants per natural key: intervals [from, to) pairwise disjoint
/// and contiguous, at most one current version, current version open-ended.
fn check_scd2<T>(
    table: &str,
    rows: &[T],
    fields: impl Fn(&T) -> (i64, NaiveDate, Option<NaiveDate>, bool),
    keys_checked: &mut usize,
) -> Result<()> {
    let mut by_key: HashMap<i64, Vec<(NaiveDate, Option<NaiveDate>, bool)>> = HashMap::new();
    for row in rows {
        let (key, from, to, current) = fields(row);
        by_key.entry(key).or_default().push((from, to, current));
    }

    for (key, mut versions) in by_key {
        *keys_checked += 1;
        versions.sort_by_key(|v| v.0);

        let current_count = versions.iter().filter(|v| v.2).count();
        if current_count > 1 {
            bail!("invariant violation: {table} key {key}: {current_count} current versions");
        }

        for (from, to, current) in &versions {
            if let Some(to) = to {
                if to <= from {
                    bail!("invariant violation: {table} key {key}: empty interval {from}..{to}");
                }
            } else if !current {
                bail!("invariant violation: {table} key {key}: open interval on non-current version");
            }
        }

        for pair in versions.windows(2) {
            match pair[0].1 {
                Some(to) if to == pair[1].0 => {}
                Some(to) => bail!(
                    "invariant violation: {table} key {key}: interval ending {to} not contiguous with next starting {}",
                    pair[1].0
                ),
                None => bail!(
                    "invariant violation: {table} key {key}: open interval is not the latest version"
                ),
            }
        }
    }
    Ok(())
}

/// Every fact must reference the dimension version whose validity interval
/// contains the fact's event timestamp.
fn check_fact_as_of(warehouse: &WarehouseSet, report: &mut WarehouseCheckReport) -> Result<()> {
    let customer_versions: HashMap<i64, &DimCustomerRow> = warehouse
        .dim_customers
        .iter()
        .map(|v| (v.customer_key, v))
        .collect();
    let account_versions: HashMap<i64, &DimAccountRow> = warehouse
        .dim_accounts
        .iter()
        .map(|v| (v.account_key, v))
        .collect();

    for fact in &warehouse.fact_transactions {
        let event_date = fact.txn_timestamp.date();

        let account_version = match account_versions.get(&fact.account_key) {
            Some(v) => v,
            None => bail!(
                "invariant violation: fact_transactions row {}: dangling account_key {}",
                fact.txn_id,
                fact.account_key
            ),
        };
        if !interval_contains(account_version.effective_from, account_version.effective_to, event_date) {
            bail!(
                "invariant violation: fact_transactions row {}: account_key {} was not valid on {}",
                fact.txn_id,
                fact.account_key,
                event_date
            );
        }

        if let Some(customer_key) = fact.customer_key {
            let customer_version = match customer_versions.get(&customer_key) {
                Some(v) => v,
                None => bail!(
                    "invariant violation: fact_transactions row {}: dangling customer_key {customer_key}",
                    fact.txn_id
                ),
            };
            if !interval_contains(
                customer_version.effective_from,
                customer_version.effective_to,
                event_date,
            ) {
                bail!(
                    "invariant violation: fact_transactions row {}: customer_key {customer_key} was not valid on {}",
                    fact.txn_id,
                    event_date
                );
            }
        }
        report.facts_checked += 1;
    }
    Ok(())
}

fn interval_contains(from: NaiveDate, to: Option<NaiveDate>, date: NaiveDate) -> bool {
    from <= date && to.map_or(true, |to| date < to)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DefectConfig, GenerationConfig};
    use crate::{accounts, crm, customers, ledger, reference::ReferenceData, risk, transactions, warehouse};

    struct Fixture {
        ctx: GenContext,
        customers: CustomerSet,
        accounts: AccountSet,
        txns: TransactionSet,
        ledger: LedgerSet,
        warehouse: WarehouseSet,
        manifest: DefectManifest,
    }

    fn build() -> Fixture {
        let config = GenerationConfig {
            customer_count: 150,
            amendment_ratio: 0.5,
            defects: DefectConfig {
                missing_postcodes: 6,
                zero_amount_transactions: 5,
                orphaned_accounts: 3,
                ..DefectConfig::default()
            },
            ..GenerationConfig::default()
        };
        let ctx = GenContext::new(config).unwrap();
        let reference = ReferenceData::load(&ctx).unwrap();
        let mut manifest = DefectManifest::new(ctx.config.seed, ctx.config.defects.clone());
        let customer_set = customers::generate(&ctx, &mut manifest).unwrap();
        let account_set = accounts::generate(&ctx, &reference, &customer_set, &mut manifest).unwrap();
        let txn_set = transactions::generate(&ctx, &account_set, &mut manifest).unwrap();
        let ledger_set = ledger::generate(&ctx, &reference, &mut manifest).unwrap();
        let crm_set = crm::generate(&ctx, &customer_set).unwrap();
        let risk_set = risk::generate(&ctx, &customer_set).unwrap();
        let warehouse_set = warehouse::transform(
            &ctx,
            &reference,
            &customer_set,
            &account_set,
            &txn_set,
            &ledger_set,
            &crm_set,
            &risk_set,
            &mut manifest,
        )
        .unwrap();

        Fixture {
            ctx,
            customers: customer_set,
            accounts: account_set,
            txns: txn_set,
            ledger: ledger_set,
            warehouse: warehouse_set,
            manifest,
        }
    }

    #[test]
    fn test_clean_run_passes_both_passes() {
        let fixture = build();

        let source_report = verify_sources(
            &fixture.ctx,
            &fixture.customers,
            &fixture.accounts,
            &fixture.txns,
            &fixture.ledger,
            &fixture.manifest,
        )
        .unwrap();
        assert!(source_report.transactions_replayed > 0);
        assert_eq!(
            source_report.defects_confirmed,
            3 + 5 + 6 + 1,
            "orphans + zero-amounts + postcodes + imbalanced journal"
        );

        let warehouse_report = verify_warehouse(&fixture.warehouse).unwrap();
        assert_eq!(warehouse_report.facts_checked, fixture.txns.transactions.len());
    }

    #[test]
    fn test_tampered_balance_fails_replay() {
        let mut fixture = build();
        fixture.txns.transactions[10].balance_after_pence += 1;

        let err = verify_sources(
            &fixture.ctx,
            &fixture.customers,
            &fixture.accounts,
            &fixture.txns,
            &fixture.ledger,
            &fixture.manifest,
        )
        .unwrap_err()
        .to_string();
        assert!(err.contains("core_transactions"), "{err}");
        assert!(err.contains("replay"), "{err}");
    }

    #[test]
    fn test_unmanifested_orphan_is_fatal() {
        let mut fixture = build();
        // Point a legitimate account at a customer that does not exist.
        let victim = fixture
            .accounts
            .accounts
            .iter_mut()
            .find(|a| !a.is_orphan)
            .unwrap();
        victim.customer_id = 9_999_999;

        let err = verify_sources(
            &fixture.ctx,
            &fixture.customers,
            &fixture.accounts,
            &fixture.txns,
            &fixture.ledger,
            &fixture.manifest,
        )
        .unwrap_err()
        .to_string();
        assert!(err.contains("orphan manifest"), "{err}");
    }

    #[test]
    fn test_unmanifested_imbalance_is_fatal() {
        let mut fixture = build();
        // Break one leg of a balanced journal.
        let victim = fixture
            .ledger
            .entries
            .iter_mut()
            .find(|e| !e.is_manual && e.debit_pence > 0)
            .unwrap();
        victim.debit_pence += 1;

        let err = verify_sources(
            &fixture.ctx,
            &fixture.customers,
            &fixture.accounts,
            &fixture.txns,
            &fixture.ledger,
            &fixture.manifest,
        )
        .unwrap_err()
        .to_string();
        assert!(err.contains("gl_entries journal"), "{err}");
    }

    #[test]
    fn test_manifest_count_mismatch_is_fatal() {
        let fixture = build();
        // A manifest that claims an extra orphan the generator never made.
        let mut forged = fixture.manifest.clone();
        forged.record(DefectKind::OrphanAccount, "core_accounts", "424242");

        let err = verify_sources(
            &fixture.ctx,
            &fixture.customers,
            &fixture.accounts,
            &fixture.txns,
            &fixture.ledger,
            &forged,
        )
        .unwrap_err()
        .to_string();
        assert!(err.contains("manifest mismatch"), "{err}");
    }

    #[test]
    fn test_overlapping_scd2_interval_is_fatal() {
        let mut fixture = build();
        // Stretch a superseded version over its successor.
        let victim_index = fixture
            .warehouse
            .dim_customers
            .windows(2)
            .position(|pair| pair[0].customer_id == pair[1].customer_id)
            .expect("fixture has a multi-version customer");
        let victim = &mut fixture.warehouse.dim_customers[victim_index];
        victim.effective_to = victim.effective_to.map(|d| d + chrono::Duration::days(30));

        let err = verify_warehouse(&fixture.warehouse).unwrap_err().to_string();
        assert!(err.contains("dim_customer"), "{err}");
    }

    #[test]
    fn test_fact_outside_version_window_is_fatal() {
        let mut fixture = build();
        // Rewind a fact far before any dimension version existed.
        let victim = &mut fixture.warehouse.fact_transactions[0];
        victim.txn_timestamp = chrono::NaiveDate::from_ymd_opt(2001, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();

        let err = verify_warehouse(&fixture.warehouse).unwrap_err().to_string();
        assert!(err.contains("fact_transactions"), "{err}");
    }
}
