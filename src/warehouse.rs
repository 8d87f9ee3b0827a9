// Warehouse Transformer: staging copies of source rows, SCD2 conformed
// dimensions, facts, and reporting marts.
//
// The central correctness property lives in resolve_version(): a fact row's
// dimension keys reference the dimension version whose validity interval
// contains the fact's event timestamp — never the version that happens to be
// current at transform time.

use crate::accounts::{AccountSet, AccountStatus};
use crate::config::GlAccountType;
use crate::context::{GenContext, Pence};
use crate::crm::CrmSet;
use crate::customers::CustomerSet;
use crate::ledger::LedgerSet;
use crate::manifest::{DefectKind, DefectManifest};
use crate::reference::{date_key, ReferenceData};
use crate::risk::RiskSet;
use crate::transactions::TransactionSet;
use anyhow::{anyhow, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// STAGING ROWS
// ============================================================================

#[derive(Debug, Clone)]
pub struct StagingMeta {
    pub batch_id: String,
    pub source_system: String,
    pub ingested_at: NaiveDateTime,
    pub record_hash: String,
}

#[derive(Debug, Clone)]
pub struct StgCustomer {
    pub customer_id: i64,
    pub customer_ref: String,
    pub customer_type: String,
    pub full_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub kyc_status: String,
    pub risk_rating: String,
    pub customer_segment: String,
    pub is_active: bool,
    pub onboarded_date: NaiveDate,
    pub closed_date: Option<NaiveDate>,
    pub meta: StagingMeta,
}

#[derive(Debug, Clone)]
pub struct StgAccount {
    pub account_id: i64,
    pub customer_id: i64,
    pub product_id: i64,
    pub account_number: String,
    pub sort_code: String,
    pub status: String,
    pub currency: String,
    pub opened_date: NaiveDate,
    pub closed_date: Option<NaiveDate>,
    pub meta: StagingMeta,
}

#[derive(Debug, Clone)]
pub struct StgTransaction {
    pub txn_id: i64,
    pub account_id: i64,
    pub txn_date: NaiveDate,
    pub txn_timestamp: NaiveDateTime,
    pub amount_pence: Pence,
    pub currency: String,
    pub txn_type: String,
    pub channel: String,
    pub status: String,
    pub balance_after_pence: Pence,
    pub meta: StagingMeta,
}

#[derive(Debug, Clone)]
pub struct StgGlEntry {
    pub entry_id: i64,
    pub journal_id: String,
    pub batch_id: String,
    pub entry_date: NaiveDate,
    pub account_code: String,
    pub cost_centre_code: String,
    pub debit_pence: Pence,
    pub credit_pence: Pence,
    pub source_system: String,
    pub meta: StagingMeta,
}

// ============================================================================
// DIMENSION / FACT ROWS
// ============================================================================

#[derive(Debug, Clone)]
pub struct DimProductRow {
    pub product_key: i64,
    pub product_id: i64,
    pub product_code: String,
    pub product_name: String,
    pub product_category: String,
    pub interest_rate: f64,
    pub currency: String,
    pub is_active: bool,
    pub launched_date: NaiveDate,
}

/// One SCD2 version. The validity interval is [effective_from, effective_to);
/// an open interval (None) marks the current version.
#[derive(Debug, Clone)]
pub struct DimCustomerRow {
    pub customer_key: i64,
    pub customer_id: i64,
    pub customer_ref: String,
    pub customer_type: String,
    pub full_name: String,
    pub customer_segment: String,
    pub risk_rating: String,
    pub kyc_status: String,
    pub postcode: Option<String>,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub is_current: bool,
}

#[derive(Debug, Clone)]
pub struct DimAccountRow {
    pub account_key: i64,
    pub account_id: i64,
    pub customer_id: i64,
    pub account_number: String,
    pub sort_code: String,
    pub product_code: String,
    pub product_category: String,
    pub account_status: String,
    pub currency: String,
    pub opened_date: NaiveDate,
    pub closed_date: Option<NaiveDate>,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub is_current: bool,
}

#[derive(Debug, Clone)]
pub struct FactTransactionRow {
    pub txn_id: i64,
    pub date_key: i32,
    pub customer_key: Option<i64>,
    pub account_key: i64,
    pub product_key: Option<i64>,
    pub txn_timestamp: NaiveDateTime,
    pub amount_pence: Pence,
    pub amount_abs_pence: Pence,
    pub is_credit: bool,
    pub currency: String,
    pub txn_type: String,
    pub channel: String,
    pub status: String,
    pub balance_after_pence: Pence,
}

#[derive(Debug, Clone)]
pub struct FactGlEntryRow {
    pub entry_id: i64,
    pub date_key: i32,
    pub account_code: String,
    pub cost_centre_code: String,
    pub journal_id: String,
    pub batch_id: String,
    pub debit_pence: Pence,
    pub credit_pence: Pence,
    pub net_pence: Pence,
    pub source_system: String,
}

#[derive(Debug, Clone)]
pub struct BridgeRow {
    pub customer_key: i64,
    pub account_key: i64,
    pub relationship_type: String,
    pub effective_from: NaiveDate,
    pub is_current: bool,
}

#[derive(Debug, Clone)]
pub struct Customer360Row {
    pub customer_key: i64,
    pub customer_id: i64,
    pub customer_ref: String,
    pub full_name: String,
    pub customer_type: String,
    pub postcode: Option<String>,
    pub onboarded_date: NaiveDate,
    pub num_accounts: i64,
    pub num_active_accounts: i64,
    pub txn_count: i64,
    pub txn_total_credit_pence: Pence,
    pub txn_total_debit_pence: Pence,
    pub last_txn_date: Option<NaiveDate>,
    pub risk_rating: String,
    pub kyc_status: String,
    pub aml_alert_count: i64,
    pub complaint_count: i64,
    pub segment: String,
    pub report_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct DailyPnlRow {
    pub report_date: NaiveDate,
    pub category: String,
    pub subcategory: Option<String>,
    pub gl_account_code: String,
    pub cost_centre_code: String,
    pub amount_pence: Pence,
}

#[derive(Debug, Clone)]
pub struct ArrearsAgeingRow {
    pub report_date: NaiveDate,
    pub product_category: String,
    pub ageing_bucket: String,
    pub account_count: i64,
    pub total_arrears_pence: Pence,
}

#[derive(Debug, Clone)]
pub struct WarehouseSet {
    pub stg_customers: Vec<StgCustomer>,
    pub stg_accounts: Vec<StgAccount>,
    pub stg_transactions: Vec<StgTransaction>,
    pub stg_gl_entries: Vec<StgGlEntry>,
    pub dim_products: Vec<DimProductRow>,
    pub dim_customers: Vec<DimCustomerRow>,
    pub dim_accounts: Vec<DimAccountRow>,
    pub fact_transactions: Vec<FactTransactionRow>,
    pub fact_gl_entries: Vec<FactGlEntryRow>,
    pub bridge: Vec<BridgeRow>,
    pub customer_360: Vec<Customer360Row>,
    pub daily_pnl: Vec<DailyPnlRow>,
    pub arrears_ageing: Vec<ArrearsAgeingRow>,
}

/// Find the dimension version valid at the event date: from <= date < to.
pub fn resolve_version<'a, T>(
    versions: &'a [T],
    date: NaiveDate,
    interval: impl Fn(&T) -> (NaiveDate, Option<NaiveDate>),
) -> Option<&'a T> {
    versions.iter().find(|v| {
        let (from, to) = interval(v);
        from <= date && to.map_or(true, |to| date < to)
    })
}

// ============================================================================
// TRANSFORM
// ============================================================================

const STAGING_TABLES: &[&str] = &["stg_customers", "stg_accounts", "stg_transactions", "stg_gl_entries"];

#[allow(clippy::too_many_arguments)]
pub fn transform(
    ctx: &GenContext,
    reference: &ReferenceData,
    customers: &CustomerSet,
    accounts: &AccountSet,
    txns: &TransactionSet,
    ledger: &LedgerSet,
    crm: &CrmSet,
    risk: &RiskSet,
    defects: &mut DefectManifest,
) -> Result<WarehouseSet> {
    let config = &ctx.config;
    let batch_date = config.warehouse_batch_date;
    let fresh_batch = format!("BATCH-{}-001", batch_date.format("%Y%m%d"));
    let stale_date = batch_date - Duration::days(12);
    let stale_batch = format!("BATCH-{}-001", stale_date.format("%Y%m%d"));

    // Staleness is decided per staging table, from the end of the fixed list.
    let n_stale = config.defects.stale_staging_tables.min(STAGING_TABLES.len());
    let stale_from = STAGING_TABLES.len() - n_stale;
    let mut meta_for = |table: &str| -> StagingMeta {
        let table_index = STAGING_TABLES.iter().position(|t| *t == table).unwrap_or(0);
        let is_stale = table_index >= stale_from;
        if is_stale {
            defects.record(DefectKind::StaleStagingBatch, table, table);
        }
        StagingMeta {
            batch_id: if is_stale { stale_batch.clone() } else { fresh_batch.clone() },
            source_system: String::new(),
            ingested_at: (if is_stale { stale_date } else { batch_date })
                .and_hms_opt(2, 0, 0)
                .unwrap_or_default(),
            record_hash: String::new(),
        }
    };

    // ── Staging: 1:1 source copies plus ingestion metadata ────────────────
    let customer_meta = meta_for("stg_customers");
    let stg_customers: Vec<StgCustomer> = customers
        .customers
        .iter()
        .map(|c| StgCustomer {
            customer_id: c.customer_id,
            customer_ref: c.customer_ref.clone(),
            customer_type: c.customer_type.as_str().to_string(),
            full_name: c.full_name.clone(),
            date_of_birth: c.date_of_birth,
            kyc_status: c.kyc_status.as_str().to_string(),
            risk_rating: c.risk_rating.as_str().to_string(),
            customer_segment: c.segment.as_str().to_string(),
            is_active: c.is_active,
            onboarded_date: c.onboarded_date,
            closed_date: c.closed_date,
            meta: StagingMeta {
                source_system: "core_banking".to_string(),
                record_hash: record_hash(&[
                    &c.customer_id.to_string(),
                    &c.full_name,
                    c.kyc_status.as_str(),
                    c.risk_rating.as_str(),
                ]),
                ..customer_meta.clone()
            },
        })
        .collect();

    let account_meta = meta_for("stg_accounts");
    let stg_accounts: Vec<StgAccount> = accounts
        .accounts
        .iter()
        .map(|a| StgAccount {
            account_id: a.account_id,
            customer_id: a.customer_id,
            product_id: a.product_id,
            account_number: a.account_number.clone(),
            sort_code: a.sort_code.clone(),
            status: a.status.as_str().to_string(),
            currency: a.currency.clone(),
            opened_date: a.opened_date,
            closed_date: a.closed_date,
            meta: StagingMeta {
                source_system: "core_banking".to_string(),
                record_hash: record_hash(&[&a.account_id.to_string(), a.status.as_str()]),
                ..account_meta.clone()
            },
        })
        .collect();

    let txn_meta = meta_for("stg_transactions");
    let stg_transactions: Vec<StgTransaction> = txns
        .transactions
        .iter()
        .map(|t| StgTransaction {
            txn_id: t.txn_id,
            account_id: t.account_id,
            txn_date: t.txn_date,
            txn_timestamp: t.txn_timestamp,
            amount_pence: t.amount_pence,
            currency: t.currency.clone(),
            txn_type: t.txn_type.as_str().to_string(),
            channel: t.channel.as_str().to_string(),
            status: t.status.as_str().to_string(),
            balance_after_pence: t.balance_after_pence,
            meta: StagingMeta {
                source_system: "core_banking".to_string(),
                record_hash: record_hash(&[
                    &t.txn_id.to_string(),
                    &t.amount_pence.to_string(),
                    t.status.as_str(),
                ]),
                ..txn_meta.clone()
            },
        })
        .collect();

    let gl_meta = meta_for("stg_gl_entries");
    let stg_gl_entries: Vec<StgGlEntry> = ledger
        .entries
        .iter()
        .map(|e| StgGlEntry {
            entry_id: e.entry_id,
            journal_id: e.journal_id.clone(),
            batch_id: e.batch_id.clone(),
            entry_date: e.entry_date,
            account_code: e.account_code.clone(),
            cost_centre_code: e.cost_centre_code.clone(),
            debit_pence: e.debit_pence,
            credit_pence: e.credit_pence,
            source_system: e.source_system.clone(),
            meta: StagingMeta {
                source_system: "gl".to_string(),
                record_hash: record_hash(&[
                    &e.entry_id.to_string(),
                    &e.debit_pence.to_string(),
                    &e.credit_pence.to_string(),
                ]),
                ..gl_meta.clone()
            },
        })
        .collect();

    // ── Conformed dimensions ──────────────────────────────────────────────
    let dim_products: Vec<DimProductRow> = reference
        .products
        .iter()
        .map(|p| DimProductRow {
            product_key: p.product_id,
            product_id: p.product_id,
            product_code: p.code.clone(),
            product_name: p.name.clone(),
            product_category: p.category.as_str().to_string(),
            interest_rate: p.interest_rate,
            currency: p.currency.clone(),
            is_active: p.is_active,
            launched_date: p.launched,
        })
        .collect();

    let dim_customers = fold_customer_dimension(customers);
    let dim_accounts = fold_account_dimension(reference, accounts)?;

    // Version lookup tables, keyed by natural key, ordered by effective_from.
    let customer_versions = group_versions(&dim_customers, |v| v.customer_id);
    let account_versions = group_versions(&dim_accounts, |v| v.account_id);

    // ── Facts: dimension keys resolved as of the event timestamp ──────────
    let mut fact_transactions = Vec::with_capacity(stg_transactions.len());
    for txn in &stg_transactions {
        let account = accounts
            .account(txn.account_id)
            .ok_or_else(|| anyhow!("fact references unknown account {}", txn.account_id))?;

        let account_version = account_versions
            .get(&txn.account_id)
            .and_then(|versions| {
                resolve_version(versions, txn.txn_date, |v| (v.effective_from, v.effective_to))
            })
            .ok_or_else(|| {
                anyhow!(
                    "no dim_account version for account {} as of {}",
                    txn.account_id,
                    txn.txn_date
                )
            })?;

        // Orphan accounts have no customer dimension version; the fact's
        // customer key stays NULL rather than borrowing the current version.
        let customer_version = customer_versions.get(&account.customer_id).and_then(|versions| {
            resolve_version(versions, txn.txn_date, |v| (v.effective_from, v.effective_to))
        });

        fact_transactions.push(FactTransactionRow {
            txn_id: txn.txn_id,
            date_key: date_key(txn.txn_date),
            customer_key: customer_version.map(|v| v.customer_key),
            account_key: account_version.account_key,
            product_key: Some(account.product_id),
            txn_timestamp: txn.txn_timestamp,
            amount_pence: txn.amount_pence,
            amount_abs_pence: txn.amount_pence.abs(),
            is_credit: txn.amount_pence > 0,
            currency: txn.currency.clone(),
            txn_type: txn.txn_type.clone(),
            channel: txn.channel.clone(),
            status: txn.status.clone(),
            balance_after_pence: txn.balance_after_pence,
        });
    }

    let fact_gl_entries: Vec<FactGlEntryRow> = stg_gl_entries
        .iter()
        .map(|e| FactGlEntryRow {
            entry_id: e.entry_id,
            date_key: date_key(e.entry_date),
            account_code: e.account_code.clone(),
            cost_centre_code: e.cost_centre_code.clone(),
            journal_id: e.journal_id.clone(),
            batch_id: e.batch_id.clone(),
            debit_pence: e.debit_pence,
            credit_pence: e.credit_pence,
            net_pence: e.debit_pence - e.credit_pence,
            source_system: e.source_system.clone(),
        })
        .collect();

    // ── Bridge: current customer ↔ current account ────────────────────────
    let mut bridge = Vec::new();
    for account_trail in account_versions.values() {
        let Some(current_account) = account_trail.iter().find(|v| v.is_current) else {
            continue;
        };
        let Some(current_customer) = customer_versions
            .get(&current_account.customer_id)
            .and_then(|versions| versions.iter().find(|v| v.is_current))
        else {
            continue;
        };
        bridge.push(BridgeRow {
            customer_key: current_customer.customer_key,
            account_key: current_account.account_key,
            relationship_type: "primary".to_string(),
            effective_from: current_account.opened_date,
            is_current: true,
        });
    }
    bridge.sort_by_key(|b| (b.customer_key, b.account_key));

    // ── Reporting marts ───────────────────────────────────────────────────
    let customer_360 = build_customer_360(
        config.warehouse_batch_date,
        &dim_customers,
        customers,
        accounts,
        txns,
        crm,
        risk,
    );
    let daily_pnl = build_daily_pnl(reference, ledger);
    let arrears_ageing = build_arrears_ageing(config.txn_date_end, accounts);

    Ok(WarehouseSet {
        stg_customers,
        stg_accounts,
        stg_transactions,
        stg_gl_entries,
        dim_products,
        dim_customers,
        dim_accounts,
        fact_transactions,
        fact_gl_entries,
        bridge,
        customer_360,
        daily_pnl,
        arrears_ageing,
    })
}

fn record_hash(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update(field.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

fn group_versions<T, F: Fn(&T) -> i64>(rows: &[T], key: F) -> HashMap<i64, Vec<&T>> {
    let mut grouped: HashMap<i64, Vec<&T>> = HashMap::new();
    for row in rows {
        grouped.entry(key(row)).or_default().push(row);
    }
    grouped
}

/// Fold customer snapshots into SCD2 versions. Change detection compares the
/// attribute hash of successive snapshots; a snapshot that changes nothing
/// does not open a new version.
fn fold_customer_dimension(customers: &CustomerSet) -> Vec<DimCustomerRow> {
    let mut snapshots_by_customer: BTreeMap<i64, Vec<&crate::customers::CustomerSnapshot>> =
        BTreeMap::new();
    for snapshot in &customers.snapshots {
        snapshots_by_customer
            .entry(snapshot.customer_id)
            .or_default()
            .push(snapshot);
    }

    let mut rows = Vec::new();
    let mut customer_key = 0i64;
    for (customer_id, snapshots) in snapshots_by_customer {
        let Some(customer) = customers.customer(customer_id) else {
            continue;
        };

        // Drop no-change snapshots.
        let mut versions: Vec<&crate::customers::CustomerSnapshot> = Vec::new();
        let mut last_hash = String::new();
        for snapshot in snapshots {
            let hash = record_hash(&[
                snapshot.segment.as_str(),
                snapshot.risk_rating.as_str(),
                snapshot.kyc_status.as_str(),
                snapshot.postcode.as_deref().unwrap_or(""),
            ]);
            if hash != last_hash {
                versions.push(snapshot);
                last_hash = hash;
            }
        }

        let n_versions = versions.len();
        for (i, snapshot) in versions.iter().enumerate() {
            customer_key += 1;
            let is_last = i == n_versions - 1;
            let effective_to = if !is_last {
                Some(versions[i + 1].as_of_date)
            } else {
                // Closed customers end their final version the day after
                // closure so closing-day events still resolve; zero versions
                // stay current.
                customer.closed_date.map(|closed| {
                    closed.max(snapshot.as_of_date) + Duration::days(1)
                })
            };

            rows.push(DimCustomerRow {
                customer_key,
                customer_id,
                customer_ref: customer.customer_ref.clone(),
                customer_type: customer.customer_type.as_str().to_string(),
                full_name: customer.full_name.clone(),
                customer_segment: snapshot.segment.as_str().to_string(),
                risk_rating: snapshot.risk_rating.as_str().to_string(),
                kyc_status: snapshot.kyc_status.as_str().to_string(),
                postcode: snapshot.postcode.clone(),
                effective_from: snapshot.as_of_date,
                effective_to,
                is_current: is_last && customer.closed_date.is_none(),
            });
        }
    }
    rows
}

/// Fold account status history into SCD2 versions, one per status change.
fn fold_account_dimension(
    reference: &ReferenceData,
    accounts: &AccountSet,
) -> Result<Vec<DimAccountRow>> {
    let mut events_by_account: BTreeMap<i64, Vec<&crate::accounts::AccountStatusEvent>> =
        BTreeMap::new();
    for event in &accounts.status_history {
        events_by_account.entry(event.account_id).or_default().push(event);
    }

    let mut rows = Vec::new();
    let mut account_key = 0i64;
    for (account_id, mut events) in events_by_account {
        let Some(account) = accounts.account(account_id) else {
            continue;
        };
        let product = reference.product(account.product_id)?;

        // Status events are strictly dated at generation time; the dedup
        // guards against a same-day pair opening an empty interval.
        events.sort_by_key(|e| (e.effective_date, e.event_id));
        events.dedup_by_key(|e| e.effective_date);

        let n_versions = events.len();
        for (i, event) in events.iter().enumerate() {
            account_key += 1;
            let is_last = i == n_versions - 1;
            let closed = event.status == AccountStatus::Closed;
            let effective_to = if !is_last {
                Some(events[i + 1].effective_date)
            } else if closed {
                Some(event.effective_date.max(account.opened_date) + Duration::days(1))
            } else {
                None
            };

            rows.push(DimAccountRow {
                account_key,
                account_id,
                customer_id: account.customer_id,
                account_number: account.account_number.clone(),
                sort_code: account.sort_code.clone(),
                product_code: product.code.clone(),
                product_category: product.category.as_str().to_string(),
                account_status: event.status.as_str().to_string(),
                currency: account.currency.clone(),
                opened_date: account.opened_date,
                closed_date: account.closed_date,
                effective_from: event.effective_date,
                effective_to,
                is_current: is_last && !closed,
            });
        }
    }
    Ok(rows)
}

#[allow(clippy::too_many_arguments)]
fn build_customer_360(
    report_date: NaiveDate,
    dim_customers: &[DimCustomerRow],
    customers: &CustomerSet,
    accounts: &AccountSet,
    txns: &TransactionSet,
    crm: &CrmSet,
    risk: &RiskSet,
) -> Vec<Customer360Row> {
    let mut accounts_by_customer: HashMap<i64, (i64, i64)> = HashMap::new();
    let mut account_owner: HashMap<i64, i64> = HashMap::new();
    for account in &accounts.accounts {
        let entry = accounts_by_customer.entry(account.customer_id).or_default();
        entry.0 += 1;
        if account.status == AccountStatus::Active {
            entry.1 += 1;
        }
        account_owner.insert(account.account_id, account.customer_id);
    }

    #[derive(Default)]
    struct TxnAgg {
        count: i64,
        credit: Pence,
        debit: Pence,
        last: Option<NaiveDate>,
    }
    let mut txn_aggregates: HashMap<i64, TxnAgg> = HashMap::new();
    for txn in &txns.transactions {
        if let Some(&customer_id) = account_owner.get(&txn.account_id) {
            let agg = txn_aggregates.entry(customer_id).or_default();
            agg.count += 1;
            if txn.amount_pence > 0 {
                agg.credit += txn.amount_pence;
            } else {
                agg.debit += txn.amount_pence.abs();
            }
            agg.last = Some(agg.last.map_or(txn.txn_date, |d| d.max(txn.txn_date)));
        }
    }

    let mut aml_counts: HashMap<i64, i64> = HashMap::new();
    for alert in &risk.aml_alerts {
        *aml_counts.entry(alert.customer_id).or_default() += 1;
    }
    let mut complaint_counts: HashMap<i64, i64> = HashMap::new();
    for complaint in &crm.complaints {
        *complaint_counts.entry(complaint.customer_id).or_default() += 1;
    }

    dim_customers
        .iter()
        .filter(|v| v.is_current)
        .map(|v| {
            let (num_accounts, num_active) =
                accounts_by_customer.get(&v.customer_id).copied().unwrap_or((0, 0));
            let agg = txn_aggregates.get(&v.customer_id);
            let onboarded_date = customers
                .customer(v.customer_id)
                .map_or(v.effective_from, |c| c.onboarded_date);
            Customer360Row {
                customer_key: v.customer_key,
                customer_id: v.customer_id,
                customer_ref: v.customer_ref.clone(),
                full_name: v.full_name.clone(),
                customer_type: v.customer_type.clone(),
                postcode: v.postcode.clone(),
                onboarded_date,
                num_accounts,
                num_active_accounts: num_active,
                txn_count: agg.map_or(0, |a| a.count),
                txn_total_credit_pence: agg.map_or(0, |a| a.credit),
                txn_total_debit_pence: agg.map_or(0, |a| a.debit),
                last_txn_date: agg.and_then(|a| a.last),
                risk_rating: v.risk_rating.clone(),
                kyc_status: v.kyc_status.clone(),
                aml_alert_count: aml_counts.get(&v.customer_id).copied().unwrap_or(0),
                complaint_count: complaint_counts.get(&v.customer_id).copied().unwrap_or(0),
                segment: v.customer_segment.clone(),
                report_date,
            }
        })
        .collect()
}

fn build_daily_pnl(reference: &ReferenceData, ledger: &LedgerSet) -> Vec<DailyPnlRow> {
    let coa: HashMap<&str, (&GlAccountType, Option<&str>)> = reference
        .chart_of_accounts
        .iter()
        .map(|a| (a.code.as_str(), (&a.account_type, a.subtype.as_deref())))
        .collect();

    let mut sums: BTreeMap<(NaiveDate, String, String), Pence> = BTreeMap::new();
    for entry in &ledger.entries {
        let Some((account_type, _)) = coa.get(entry.account_code.as_str()) else {
            continue;
        };
        if !matches!(account_type, GlAccountType::Revenue | GlAccountType::Expense) {
            continue;
        }
        *sums
            .entry((entry.entry_date, entry.account_code.clone(), entry.cost_centre_code.clone()))
            .or_default() += entry.debit_pence - entry.credit_pence;
    }

    sums.into_iter()
        .map(|((report_date, gl_account_code, cost_centre_code), amount_pence)| {
            let (account_type, subtype) = coa[gl_account_code.as_str()];
            DailyPnlRow {
                report_date,
                category: account_type.as_str().to_string(),
                subcategory: subtype.map(str::to_string),
                gl_account_code,
                cost_centre_code,
                amount_pence,
            }
        })
        .collect()
}

const AGEING_BUCKETS: &[(&str, i64, i64)] = &[
    ("1-30_days", 1, 30),
    ("31-60_days", 31, 60),
    ("61-90_days", 61, 90),
    ("91-180_days", 91, 180),
    ("181-365_days", 181, 365),
    ("over_365_days", 366, i64::MAX),
];

fn build_arrears_ageing(report_date: NaiveDate, accounts: &AccountSet) -> Vec<ArrearsAgeingRow> {
    // Days in arrears counts from the first in_arrears/default status event.
    let mut arrears_start: HashMap<i64, NaiveDate> = HashMap::new();
    for event in &accounts.status_history {
        if matches!(event.status, AccountStatus::InArrears | AccountStatus::Default) {
            arrears_start
                .entry(event.account_id)
                .and_modify(|d| *d = (*d).min(event.effective_date))
                .or_insert(event.effective_date);
        }
    }

    let mut sums: BTreeMap<(String, String), (i64, Pence)> = BTreeMap::new();
    for account in &accounts.accounts {
        if !matches!(account.status, AccountStatus::InArrears | AccountStatus::Default) {
            continue;
        }
        let Some(&since) = arrears_start.get(&account.account_id) else {
            continue;
        };
        let days = (report_date - since).num_days().max(1);
        let Some((bucket, ..)) = AGEING_BUCKETS.iter().find(|(_, lo, hi)| days >= *lo && days <= *hi)
        else {
            continue;
        };
        let entry = sums
            .entry((account.category.as_str().to_string(), bucket.to_string()))
            .or_default();
        entry.0 += 1;
        entry.1 += account.opening_balance_pence.abs();
    }

    sums.into_iter()
        .map(|((product_category, ageing_bucket), (account_count, total_arrears_pence))| {
            ArrearsAgeingRow {
                report_date,
                product_category,
                ageing_bucket,
                account_count,
                total_arrears_pence,
            }
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DefectConfig, GenerationConfig};
    use crate::{accounts, crm, customers, ledger, risk, transactions};

    fn build() -> (GenContext, CustomerSet, AccountSet, TransactionSet, WarehouseSet) {
        let config = GenerationConfig {
            customer_count: 150,
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
        let warehouse = transform(
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
        (ctx, customer_set, account_set, txn_set, warehouse)
    }

    #[test]
    fn test_staging_is_one_to_one_with_source() {
        let (_, customer_set, account_set, txn_set, warehouse) = build();

        assert_eq!(warehouse.stg_customers.len(), customer_set.customers.len());
        assert_eq!(warehouse.stg_accounts.len(), account_set.accounts.len());
        assert_eq!(warehouse.stg_transactions.len(), txn_set.transactions.len());
        for row in &warehouse.stg_customers {
            assert_eq!(row.meta.record_hash.len(), 64);
            assert_eq!(row.meta.source_system, "core_banking");
        }
    }

    #[test]
    fn test_scd2_intervals_disjoint_and_single_current() {
        let (_, customer_set, _, _, warehouse) = build();

        let versions = group_versions(&warehouse.dim_customers, |v| v.customer_id);
        for (customer_id, trail) in versions {
            let customer = customer_set.customer(customer_id).unwrap();

            for pair in trail.windows(2) {
                let to = pair[0].effective_to.expect("non-final version must be closed");
                assert_eq!(to, pair[1].effective_from, "intervals must be contiguous");
                assert!(pair[0].effective_from < to);
            }

            let current: Vec<_> = trail.iter().filter(|v| v.is_current).collect();
            if customer.closed_date.is_some() {
                assert!(current.is_empty(), "closed customers have zero current versions");
            } else {
                assert_eq!(current.len(), 1);
                assert!(current[0].effective_to.is_none());
            }
        }
    }

    #[test]
    fn test_facts_reference_version_valid_at_event_time() {
        let (_, _, _, _, warehouse) = build();

        let by_customer_key: HashMap<i64, &DimCustomerRow> = warehouse
            .dim_customers
            .iter()
            .map(|v| (v.customer_key, v))
            .collect();
        let by_account_key: HashMap<i64, &DimAccountRow> = warehouse
            .dim_accounts
            .iter()
            .map(|v| (v.account_key, v))
            .collect();

        for fact in &warehouse.fact_transactions {
            let event_date = fact.txn_timestamp.date();

            let account_version = by_account_key[&fact.account_key];
            assert!(account_version.effective_from <= event_date);
            if let Some(to) = account_version.effective_to {
                assert!(event_date < to, "fact {} outside account version window", fact.txn_id);
            }

            if let Some(customer_key) = fact.customer_key {
                let customer_version = by_customer_key[&customer_key];
                assert!(customer_version.effective_from <= event_date);
                if let Some(to) = customer_version.effective_to {
                    assert!(event_date < to, "fact {} outside customer version window", fact.txn_id);
                }
            }
        }
    }

    #[test]
    fn test_facts_resolve_customer_keys_and_orphans_stay_out() {
        let (_, _, account_set, _, warehouse) = build();

        // Orphan accounts never transact, so every fact resolves a customer
        // version; orphans still appear in the account dimension.
        let orphan_accounts: Vec<i64> = account_set
            .accounts
            .iter()
            .filter(|a| a.is_orphan)
            .map(|a| a.account_id)
            .collect();
        let by_account_key: HashMap<i64, &DimAccountRow> = warehouse
            .dim_accounts
            .iter()
            .map(|v| (v.account_key, v))
            .collect();

        for fact in &warehouse.fact_transactions {
            let account_id = by_account_key[&fact.account_key].account_id;
            assert!(!orphan_accounts.contains(&account_id));
            assert!(fact.customer_key.is_some());
        }
        for orphan_id in orphan_accounts {
            assert!(warehouse.dim_accounts.iter().any(|v| v.account_id == orphan_id));
        }
    }

    #[test]
    fn test_bridge_links_only_current_versions() {
        let (_, _, _, _, warehouse) = build();

        let current_customers: Vec<i64> = warehouse
            .dim_customers
            .iter()
            .filter(|v| v.is_current)
            .map(|v| v.customer_key)
            .collect();
        let current_accounts: Vec<i64> = warehouse
            .dim_accounts
            .iter()
            .filter(|v| v.is_current)
            .map(|v| v.account_key)
            .collect();

        assert!(!warehouse.bridge.is_empty());
        for row in &warehouse.bridge {
            assert!(current_customers.contains(&row.customer_key));
            assert!(current_accounts.contains(&row.account_key));
        }
    }

    #[test]
    fn test_customer_360_aggregates_transactions() {
        let (_, _, account_set, txn_set, warehouse) = build();

        let row = warehouse
            .customer_360
            .iter()
            .find(|r| r.txn_count > 0)
            .expect("some customer has transactions");

        let customer_accounts: Vec<i64> = account_set
            .accounts
            .iter()
            .filter(|a| a.customer_id == row.customer_id)
            .map(|a| a.account_id)
            .collect();
        let expected: i64 = txn_set
            .transactions
            .iter()
            .filter(|t| customer_accounts.contains(&t.account_id))
            .count() as i64;
        assert_eq!(row.txn_count, expected);
    }

    #[test]
    fn test_daily_pnl_covers_revenue_and_expense_only() {
        let (_, _, _, _, warehouse) = build();

        assert!(!warehouse.daily_pnl.is_empty());
        for row in &warehouse.daily_pnl {
            assert!(matches!(row.category.as_str(), "revenue" | "expense"));
        }
    }
}
