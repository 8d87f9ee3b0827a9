// Batch pipeline: Reference Data → Entities → Events → Consistency Enforcer
// → Warehouse Transformer → Dump Exporter.
//
// Each stage completes before the next starts (later stages read full
// rowsets), and nothing is written to the store until both enforcement
// passes hold. There is no resume: a failed run is discarded and restarted.

use crate::context::GenContext;
use crate::enforcer::{self, SourceCheckReport, WarehouseCheckReport};
use crate::export::{self, ExportSummary};
use crate::manifest::DefectManifest;
use crate::reference::ReferenceData;
use crate::store;
use crate::warehouse::{self, WarehouseSet};
use crate::{accounts, crm, customers, ledger, payments, risk, transactions, treasury};
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Every source-system rowset of one generation run, held in memory between
/// the stage barriers.
pub struct Dataset {
    pub reference: ReferenceData,
    pub customers: customers::CustomerSet,
    pub accounts: accounts::AccountSet,
    pub transactions: transactions::TransactionSet,
    pub payments: payments::PaymentSet,
    pub crm: crm::CrmSet,
    pub risk: risk::RiskSet,
    pub treasury: treasury::TreasurySet,
    pub ledger: ledger::LedgerSet,
}

pub struct RunOutcome {
    pub source_report: SourceCheckReport,
    pub warehouse_report: WarehouseCheckReport,
    pub export_summary: Option<ExportSummary>,
    pub manifest: DefectManifest,
}

/// Stages 1–3: reference data, entities, events.
pub fn generate_dataset(ctx: &GenContext) -> Result<(Dataset, DefectManifest)> {
    let mut manifest = DefectManifest::new(ctx.config.seed, ctx.config.defects.clone());

    println!("📋 Loading reference data...");
    let reference = ReferenceData::load(ctx).context("reference data stage failed")?;
    println!("  ✓ {} products, {} GL accounts, {} calendar days",
        reference.products.len(),
        reference.chart_of_accounts.len(),
        reference.calendar.len());

    println!("👥 Generating customers...");
    let customer_set = customers::generate(ctx, &mut manifest).context("customer stage failed")?;
    println!("  ✓ {} customers, {} addresses, {} snapshots",
        customer_set.customers.len(),
        customer_set.addresses.len(),
        customer_set.snapshots.len());

    println!("🏦 Generating accounts...");
    let account_set = accounts::generate(ctx, &reference, &customer_set, &mut manifest)
        .context("account stage failed")?;
    println!("  ✓ {} accounts ({} status events)",
        account_set.accounts.len(),
        account_set.status_history.len());

    println!("💳 Generating transactions...");
    let txn_set = transactions::generate(ctx, &account_set, &mut manifest)
        .context("transaction stage failed")?;
    println!("  ✓ {} transactions, {} daily balances",
        txn_set.transactions.len(),
        txn_set.daily_balances.len());

    println!("💸 Generating payments...");
    let payment_set = payments::generate(ctx, &reference, &account_set)
        .context("payments stage failed")?;
    println!("  ✓ {} standing orders, {} mandates, {} instructions ({} failed)",
        payment_set.standing_orders.len(),
        payment_set.direct_debits.len(),
        payment_set.instructions.len(),
        payment_set.failed_payments.len());

    println!("📞 Generating CRM data...");
    let crm_set = crm::generate(ctx, &customer_set).context("crm stage failed")?;
    println!("  ✓ {} interactions, {} complaints",
        crm_set.interactions.len(),
        crm_set.complaints.len());

    println!("⚠️  Generating risk data...");
    let risk_set = risk::generate(ctx, &customer_set).context("risk stage failed")?;
    println!("  ✓ {} credit scores, {} AML alerts",
        risk_set.credit_scores.len(),
        risk_set.aml_alerts.len());

    println!("🏛️  Generating treasury data...");
    let treasury_set = treasury::generate(ctx, &reference).context("treasury stage failed")?;
    println!("  ✓ {} FX rates, {} liquidity positions",
        treasury_set.fx_rates.len(),
        treasury_set.liquidity_positions.len());

    println!("📒 Generating general ledger...");
    let ledger_set = ledger::generate(ctx, &reference, &mut manifest).context("ledger stage failed")?;
    println!("  ✓ {} GL entries, {} period balances",
        ledger_set.entries.len(),
        ledger_set.balances.len());

    Ok((
        Dataset {
            reference,
            customers: customer_set,
            accounts: account_set,
            transactions: txn_set,
            payments: payment_set,
            crm: crm_set,
            risk: risk_set,
            treasury: treasury_set,
            ledger: ledger_set,
        },
        manifest,
    ))
}

/// Stage 5 on an already-verified dataset.
pub fn transform_warehouse(
    ctx: &GenContext,
    dataset: &Dataset,
    manifest: &mut DefectManifest,
) -> Result<WarehouseSet> {
    warehouse::transform(
        ctx,
        &dataset.reference,
        &dataset.customers,
        &dataset.accounts,
        &dataset.transactions,
        &dataset.ledger,
        &dataset.crm,
        &dataset.risk,
        manifest,
    )
    .context("warehouse stage failed")
}

pub fn load_store(
    conn: &mut Connection,
    dataset: &Dataset,
    warehouse: &WarehouseSet,
    batch_size: usize,
) -> Result<()> {
    store::setup_schema(conn)?;
    store::insert_reference(conn, &dataset.reference, batch_size)?;
    store::insert_customers(conn, &dataset.customers, batch_size)?;
    store::insert_accounts(conn, &dataset.accounts, batch_size)?;
    store::insert_transactions(conn, &dataset.transactions, batch_size)?;
    store::insert_payments(conn, &dataset.payments, batch_size)?;
    store::insert_crm(conn, &dataset.crm, batch_size)?;
    store::insert_risk(conn, &dataset.risk, batch_size)?;
    store::insert_treasury(conn, &dataset.treasury, batch_size)?;
    store::insert_ledger(conn, &dataset.ledger, batch_size)?;
    store::insert_warehouse(conn, warehouse, batch_size)?;
    Ok(())
}

/// The complete run: generate, enforce, transform, enforce, load, export.
pub fn run(ctx: &GenContext, conn: &mut Connection, archive_dir: Option<&Path>) -> Result<RunOutcome> {
    let (dataset, mut manifest) = generate_dataset(ctx)?;

    println!("🔍 Verifying source invariants...");
    let source_report = enforcer::verify_sources(
        ctx,
        &dataset.customers,
        &dataset.accounts,
        &dataset.transactions,
        &dataset.ledger,
        &manifest,
    )?;
    println!("  ✓ {}", source_report.summary());

    println!("🏗️  Building warehouse layers...");
    let warehouse_set = transform_warehouse(ctx, &dataset, &mut manifest)?;
    println!("  ✓ {} staging rows, {} dim versions, {} facts",
        warehouse_set.stg_customers.len()
            + warehouse_set.stg_accounts.len()
            + warehouse_set.stg_transactions.len()
            + warehouse_set.stg_gl_entries.len(),
        warehouse_set.dim_customers.len() + warehouse_set.dim_accounts.len(),
        warehouse_set.fact_transactions.len() + warehouse_set.fact_gl_entries.len());

    println!("🔍 Verifying warehouse invariants...");
    let warehouse_report = enforcer::verify_warehouse(&warehouse_set)?;
    println!("  ✓ {}", warehouse_report.summary());

    println!("💾 Loading store...");
    load_store(conn, &dataset, &warehouse_set, ctx.config.batch_size)?;
    println!("  ✓ store loaded");

    let export_summary = match archive_dir {
        Some(dir) => {
            println!("📦 Exporting archive...");
            let summary = export::export(conn, &manifest, dir)?;
            println!("  ✓ {}", summary.summary());
            Some(summary)
        }
        None => None,
    };

    println!("✅ Run complete: {}", manifest.summary());

    Ok(RunOutcome {
        source_report,
        warehouse_report,
        export_summary,
        manifest,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DefectConfig, GenerationConfig};
    use crate::manifest::DefectKind;

    fn scenario_config() -> GenerationConfig {
        // Fixed seed, exact defect quantities, scaled-down volumes.
        GenerationConfig {
            seed: 42,
            customer_count: 400,
            defects: DefectConfig {
                missing_postcodes: 20,
                zero_amount_transactions: 12,
                orphaned_accounts: 15,
                ..DefectConfig::default()
            },
            ..GenerationConfig::default()
        }
    }

    #[test]
    fn test_full_run_against_in_memory_store() {
        let ctx = GenContext::new(scenario_config()).unwrap();
        let mut conn = store::open_in_memory().unwrap();

        let outcome = run(&ctx, &mut conn, None).unwrap();

        assert_eq!(outcome.manifest.count(DefectKind::OrphanAccount), 15);
        assert_eq!(outcome.manifest.count(DefectKind::ZeroAmountTransaction), 12);
        assert!(outcome.source_report.transactions_replayed > 0);
        assert!(outcome.warehouse_report.facts_checked > 0);

        // The store agrees with the manifest on orphan counts.
        let orphans: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM core_accounts a
                 WHERE NOT EXISTS (SELECT 1 FROM core_customers c
                                   WHERE c.customer_id = a.customer_id)",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(orphans, 15, "exactly the manifested orphans, nothing accidental");

        let zero_amounts: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM core_transactions
                 WHERE amount_pence = 0 AND status = 'completed'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(zero_amounts, 12);
    }

    #[test]
    fn test_same_seed_and_config_is_idempotent() {
        let run_once = || {
            let ctx = GenContext::new(scenario_config()).unwrap();
            let mut conn = store::open_in_memory().unwrap();
            let outcome = run(&ctx, &mut conn, None).unwrap();
            let counts = store::table_counts(&conn).unwrap();
            (counts, outcome.manifest.to_json().unwrap())
        };

        let (counts_a, manifest_a) = run_once();
        let (counts_b, manifest_b) = run_once();

        assert_eq!(counts_a, counts_b, "per-table row counts must be identical");
        assert_eq!(manifest_a, manifest_b, "defect manifest must be byte-identical");
    }

    #[test]
    fn test_different_seed_changes_rows_not_defect_counts() {
        let mut config = scenario_config();
        config.seed = 1337;
        let ctx = GenContext::new(config).unwrap();
        let mut conn = store::open_in_memory().unwrap();

        let outcome = run(&ctx, &mut conn, None).unwrap();

        // Different data, same contracted defect quantities.
        assert_eq!(outcome.manifest.count(DefectKind::OrphanAccount), 15);
        assert_eq!(outcome.manifest.count(DefectKind::ZeroAmountTransaction), 12);
        assert_eq!(outcome.manifest.count(DefectKind::MissingPostcode), 20);
        assert_eq!(outcome.manifest.count(DefectKind::ImbalancedJournal), 1);
    }

    #[test]
    fn test_gl_imbalance_reported_exactly_once() {
        let ctx = GenContext::new(scenario_config()).unwrap();
        let mut conn = store::open_in_memory().unwrap();

        let outcome = run(&ctx, &mut conn, None).unwrap();

        let imbalanced = outcome.manifest.rows(DefectKind::ImbalancedJournal);
        assert_eq!(imbalanced.len(), 1);
        let stored_imbalance =
            store::journal_imbalance(&conn, &imbalanced[0].row_ref).unwrap();
        assert_eq!(stored_imbalance, ctx.config.defects.journal_imbalance_pence);

        // And no other journal is off, straight from the stored rows.
        let other_imbalanced: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM (
                     SELECT journal_id FROM gl_entries
                     GROUP BY journal_id
                     HAVING SUM(debit_pence) != SUM(credit_pence)
                 )",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(other_imbalanced, 1);
    }

    #[test]
    fn test_export_roundtrip_from_full_run() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = GenContext::new(scenario_config()).unwrap();
        let mut conn = store::open(&dir.path().join("bank.sqlite")).unwrap();

        let outcome = run(&ctx, &mut conn, Some(&dir.path().join("archive"))).unwrap();
        let summary = outcome.export_summary.expect("archive requested");

        let restored = crate::export::verify_restore(&summary.dump_path).unwrap();
        let original = store::table_counts(&conn).unwrap();
        assert_eq!(restored, original, "archive must restore with identical counts");
    }
}
