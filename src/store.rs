// Destination store: SQLite via rusqlite.
//
// The DDL here is the fixed schema contract the generator populates. The nine
// logical schemas of the serving database map onto table-name prefixes
// (core_, crm_, risk_, pay_, try_, gl_, stg_, dim_/fact_/bridge_, rpt_).
// Enumerated columns carry CHECK constraints and identifying columns carry
// UNIQUE constraints; a generated row violating either is a generation bug.
//
// Writes go through bulk_insert: prepared statement, one transaction per
// batch, bounded retry with backoff on transient SQLite errors.

use crate::accounts::AccountSet;
use crate::context::Pence;
use crate::crm::CrmSet;
use crate::customers::CustomerSet;
use crate::ledger::LedgerSet;
use crate::payments::PaymentSet;
use crate::reference::ReferenceData;
use crate::risk::RiskSet;
use crate::transactions::TransactionSet;
use crate::treasury::TreasurySet;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, Statement};
use std::path::Path;
use std::thread;
use std::time::Duration;

const RETRY_ATTEMPTS: usize = 3;
const RETRY_BASE_DELAY_MS: u64 = 50;

pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    Ok(Connection::open_in_memory()?)
}

// ============================================================================
// SCHEMA CONTRACT
// ============================================================================

pub fn setup_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- ====================================================================
        -- Source: core banking
        -- ====================================================================
        CREATE TABLE IF NOT EXISTS core_products (
            product_id INTEGER PRIMARY KEY,
            product_code TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            category TEXT NOT NULL CHECK (category IN (
                'current_account','savings','personal_loan','mortgage','credit_card',
                'business_current','business_loan','business_savings')),
            interest_rate REAL NOT NULL,
            currency TEXT NOT NULL,
            min_balance_pence INTEGER NOT NULL,
            is_active INTEGER NOT NULL,
            launched_date TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS core_customers (
            customer_id INTEGER PRIMARY KEY,
            customer_ref TEXT UNIQUE NOT NULL,
            customer_type TEXT NOT NULL CHECK (customer_type IN ('personal','business')),
            title TEXT,
            first_name TEXT,
            last_name TEXT,
            full_name TEXT NOT NULL,
            date_of_birth TEXT,
            nationality TEXT,
            ni_number TEXT,
            email TEXT NOT NULL,
            phone_mobile TEXT NOT NULL,
            phone_home TEXT,
            company_name TEXT,
            company_reg_number TEXT,
            sic_code TEXT,
            kyc_status TEXT NOT NULL CHECK (kyc_status IN (
                'verified','enhanced_due_diligence','pending','expired')),
            kyc_verified_date TEXT,
            risk_rating TEXT NOT NULL CHECK (risk_rating IN (
                'low','standard','medium','high','pep','sanctioned')),
            customer_segment TEXT NOT NULL CHECK (customer_segment IN (
                'mass_market','mass_affluent','high_net_worth','young_professional',
                'student','retired','small_business','growing_business')),
            is_active INTEGER NOT NULL,
            onboarded_date TEXT NOT NULL,
            closed_date TEXT
        );

        CREATE TABLE IF NOT EXISTS core_addresses (
            address_id INTEGER PRIMARY KEY,
            customer_id INTEGER NOT NULL,
            address_type TEXT NOT NULL CHECK (address_type IN ('home','correspondence','registered')),
            line1 TEXT NOT NULL,
            line2 TEXT,
            city TEXT NOT NULL,
            county TEXT,
            postcode TEXT,
            country TEXT NOT NULL,
            is_primary INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS core_customer_snapshots (
            snapshot_id INTEGER PRIMARY KEY,
            customer_id INTEGER NOT NULL,
            as_of_date TEXT NOT NULL,
            customer_segment TEXT NOT NULL,
            risk_rating TEXT NOT NULL,
            kyc_status TEXT NOT NULL,
            postcode TEXT
        );

        CREATE TABLE IF NOT EXISTS core_accounts (
            account_id INTEGER PRIMARY KEY,
            customer_id INTEGER NOT NULL,
            product_id INTEGER NOT NULL REFERENCES core_products(product_id),
            account_number TEXT NOT NULL,
            sort_code TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN (
                'active','dormant','frozen','in_arrears','default','closed')),
            currency TEXT NOT NULL,
            credit_limit_pence INTEGER,
            overdraft_limit_pence INTEGER,
            opened_date TEXT NOT NULL,
            closed_date TEXT,
            opening_balance_pence INTEGER NOT NULL,
            UNIQUE (account_number, sort_code)
        );

        CREATE TABLE IF NOT EXISTS core_account_status_history (
            event_id INTEGER PRIMARY KEY,
            account_id INTEGER NOT NULL REFERENCES core_accounts(account_id),
            status TEXT NOT NULL CHECK (status IN (
                'active','dormant','frozen','in_arrears','default','closed')),
            effective_date TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS core_transactions (
            txn_id INTEGER PRIMARY KEY,
            account_id INTEGER NOT NULL REFERENCES core_accounts(account_id),
            txn_date TEXT NOT NULL,
            txn_timestamp TEXT NOT NULL,
            value_date TEXT NOT NULL,
            amount_pence INTEGER NOT NULL,
            currency TEXT NOT NULL,
            txn_type TEXT NOT NULL CHECK (txn_type IN (
                'direct_debit','standing_order','faster_payment','card_payment',
                'atm_withdrawal','salary','transfer_out','transfer_in','bacs','chaps',
                'interest','fee','loan_repayment','mortgage_payment')),
            description TEXT NOT NULL,
            counterparty_name TEXT NOT NULL,
            counterparty_account TEXT,
            counterparty_sort_code TEXT,
            channel TEXT NOT NULL CHECK (channel IN (
                'online','mobile','branch','atm','phone','api','batch')),
            reference TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('completed','failed','returned','disputed')),
            reason_code TEXT CHECK (reason_code IN (
                'insufficient_funds','invalid_account','invalid_sort_code',
                'account_closed','amount_limit_exceeded','technical_error')),
            balance_after_pence INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS core_daily_balances (
            account_id INTEGER NOT NULL,
            balance_date TEXT NOT NULL,
            balance_pence INTEGER NOT NULL,
            PRIMARY KEY (account_id, balance_date)
        );

        CREATE TABLE IF NOT EXISTS core_standing_orders (
            so_id INTEGER PRIMARY KEY,
            account_id INTEGER NOT NULL,
            payee_name TEXT NOT NULL,
            payee_account TEXT NOT NULL,
            payee_sort_code TEXT NOT NULL,
            amount_pence INTEGER NOT NULL,
            frequency TEXT NOT NULL CHECK (frequency IN ('monthly','weekly','quarterly')),
            start_date TEXT NOT NULL,
            end_date TEXT,
            reference TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('active','cancelled','suspended'))
        );

        CREATE TABLE IF NOT EXISTS core_direct_debits (
            dd_id INTEGER PRIMARY KEY,
            account_id INTEGER NOT NULL,
            originator_name TEXT NOT NULL,
            originator_id TEXT NOT NULL,
            reference TEXT NOT NULL,
            mandate_date TEXT NOT NULL,
            first_collection TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('active','cancelled','suspended'))
        );

        -- ====================================================================
        -- Source: CRM
        -- ====================================================================
        CREATE TABLE IF NOT EXISTS crm_contacts (
            contact_id INTEGER PRIMARY KEY,
            customer_id INTEGER NOT NULL,
            contact_name TEXT NOT NULL,
            email_primary TEXT NOT NULL,
            email_secondary TEXT,
            phone_primary TEXT NOT NULL,
            phone_secondary TEXT,
            preferred_channel TEXT NOT NULL CHECK (preferred_channel IN (
                'email','phone','sms','post','app')),
            relationship_manager TEXT NOT NULL,
            assigned_branch TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS crm_interactions (
            interaction_id INTEGER PRIMARY KEY,
            contact_id INTEGER NOT NULL,
            customer_id INTEGER NOT NULL,
            interaction_ts TEXT NOT NULL,
            channel TEXT NOT NULL CHECK (channel IN (
                'phone_inbound','phone_outbound','email_inbound','email_outbound',
                'branch_visit','webchat','app_message','letter')),
            category TEXT NOT NULL CHECK (category IN (
                'enquiry','service_request','product_enquiry','account_maintenance',
                'complaint','feedback','outbound_campaign')),
            subject TEXT NOT NULL,
            resolved INTEGER NOT NULL,
            handled_by TEXT NOT NULL,
            duration_seconds INTEGER,
            sentiment_score REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS crm_complaints (
            complaint_id INTEGER PRIMARY KEY,
            customer_id INTEGER NOT NULL,
            complaint_date TEXT NOT NULL,
            category TEXT NOT NULL CHECK (category IN (
                'charges_fees','service_quality','product_mis_sell','fraud',
                'payment_issue','lending_decision','other')),
            severity TEXT NOT NULL CHECK (severity IN ('low','medium','high','critical')),
            description TEXT NOT NULL,
            root_cause TEXT CHECK (root_cause IN (
                'process_failure','system_error','staff_error','policy_gap')),
            status TEXT NOT NULL CHECK (status IN (
                'open','investigating','resolved','closed','referred_to_fos')),
            resolution_date TEXT,
            compensation_pence INTEGER NOT NULL,
            fos_referral INTEGER NOT NULL,
            assigned_to TEXT NOT NULL
        );

        -- ====================================================================
        -- Source: risk engine
        -- ====================================================================
        CREATE TABLE IF NOT EXISTS risk_credit_scores (
            score_id INTEGER PRIMARY KEY,
            customer_id INTEGER NOT NULL,
            score_date TEXT NOT NULL,
            score_value INTEGER NOT NULL CHECK (score_value BETWEEN 0 AND 999),
            score_band TEXT NOT NULL CHECK (score_band IN (
                'very_poor','poor','fair','good','excellent')),
            model_name TEXT NOT NULL,
            model_version TEXT NOT NULL,
            is_current INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS risk_aml_alerts (
            alert_id INTEGER PRIMARY KEY,
            customer_id INTEGER NOT NULL,
            alert_date TEXT NOT NULL,
            alert_type TEXT NOT NULL CHECK (alert_type IN (
                'unusual_volume','rapid_movement','high_risk_country',
                'structuring_pattern','dormant_activation','cash_intensive')),
            rule_id TEXT NOT NULL,
            risk_score INTEGER NOT NULL CHECK (risk_score BETWEEN 0 AND 100),
            trigger_amount_pence INTEGER NOT NULL,
            status TEXT NOT NULL CHECK (status IN (
                'open','investigating','closed','escalated','sar_filed','false_positive')),
            resolution_date TEXT
        );

        -- ====================================================================
        -- Source: payments
        -- ====================================================================
        CREATE TABLE IF NOT EXISTS pay_schemes (
            scheme_id INTEGER PRIMARY KEY,
            scheme_code TEXT UNIQUE NOT NULL,
            scheme_name TEXT NOT NULL,
            scheme_type TEXT NOT NULL CHECK (scheme_type IN (
                'real_time','batch','high_value','international')),
            max_amount_pence INTEGER,
            settlement_cycle TEXT NOT NULL,
            operating_hours TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pay_instructions (
            instruction_id INTEGER PRIMARY KEY,
            account_id INTEGER NOT NULL,
            scheme_id INTEGER NOT NULL REFERENCES pay_schemes(scheme_id),
            instruction_ts TEXT NOT NULL,
            amount_pence INTEGER NOT NULL,
            beneficiary_name TEXT NOT NULL,
            beneficiary_account TEXT NOT NULL,
            beneficiary_sort_code TEXT NOT NULL,
            reference TEXT NOT NULL,
            priority TEXT NOT NULL CHECK (priority IN ('normal','urgent')),
            status TEXT NOT NULL CHECK (status IN ('settled','sent','rejected')),
            settlement_date TEXT
        );

        CREATE TABLE IF NOT EXISTS pay_failed_payments (
            failed_id INTEGER PRIMARY KEY,
            instruction_id INTEGER NOT NULL REFERENCES pay_instructions(instruction_id),
            failure_ts TEXT NOT NULL,
            failure_reason TEXT NOT NULL CHECK (failure_reason IN (
                'insufficient_funds','invalid_account','invalid_sort_code',
                'account_closed','amount_limit_exceeded','technical_error')),
            original_amount_pence INTEGER NOT NULL,
            resolution_status TEXT NOT NULL CHECK (resolution_status IN (
                'unresolved','retried','reversed'))
        );

        -- ====================================================================
        -- Source: treasury
        -- ====================================================================
        CREATE TABLE IF NOT EXISTS try_fx_rates (
            rate_id INTEGER PRIMARY KEY,
            rate_date TEXT NOT NULL,
            base_currency TEXT NOT NULL,
            quote_currency TEXT NOT NULL,
            mid_rate REAL NOT NULL,
            bid_rate REAL NOT NULL,
            ask_rate REAL NOT NULL,
            UNIQUE (rate_date, quote_currency)
        );

        CREATE TABLE IF NOT EXISTS try_liquidity_positions (
            position_id INTEGER PRIMARY KEY,
            report_date TEXT NOT NULL,
            asset_class TEXT NOT NULL CHECK (asset_class IN (
                'cash_central_bank','level_1_hqla','level_2a_hqla','level_2b_hqla')),
            market_value_pence INTEGER NOT NULL,
            adjusted_value_pence INTEGER NOT NULL
        );

        -- ====================================================================
        -- Source: general ledger
        -- ====================================================================
        CREATE TABLE IF NOT EXISTS gl_chart_of_accounts (
            account_code TEXT PRIMARY KEY,
            account_name TEXT NOT NULL,
            account_type TEXT NOT NULL CHECK (account_type IN (
                'asset','liability','equity','revenue','expense')),
            account_subtype TEXT,
            parent_code TEXT,
            hierarchy_level INTEGER NOT NULL,
            is_posting_account INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS gl_cost_centres (
            cost_centre_code TEXT PRIMARY KEY,
            cost_centre_name TEXT NOT NULL,
            department TEXT NOT NULL,
            manager TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS gl_entries (
            entry_id INTEGER PRIMARY KEY,
            journal_id TEXT NOT NULL,
            batch_id TEXT NOT NULL,
            entry_date TEXT NOT NULL,
            posting_date TEXT NOT NULL,
            account_code TEXT NOT NULL REFERENCES gl_chart_of_accounts(account_code),
            cost_centre_code TEXT NOT NULL REFERENCES gl_cost_centres(cost_centre_code),
            debit_pence INTEGER NOT NULL CHECK (debit_pence >= 0),
            credit_pence INTEGER NOT NULL CHECK (credit_pence >= 0),
            description TEXT NOT NULL,
            source_system TEXT NOT NULL,
            source_reference TEXT NOT NULL,
            is_manual INTEGER NOT NULL,
            posted_by TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS gl_balances (
            balance_id INTEGER PRIMARY KEY,
            period_end_date TEXT NOT NULL,
            account_code TEXT NOT NULL,
            cost_centre_code TEXT NOT NULL,
            opening_pence INTEGER NOT NULL,
            period_debits_pence INTEGER NOT NULL,
            period_credits_pence INTEGER NOT NULL,
            closing_pence INTEGER NOT NULL,
            UNIQUE (period_end_date, account_code, cost_centre_code)
        );

        -- ====================================================================
        -- Warehouse: staging
        -- ====================================================================
        CREATE TABLE IF NOT EXISTS stg_customers (
            customer_id INTEGER NOT NULL,
            customer_ref TEXT NOT NULL,
            customer_type TEXT NOT NULL,
            full_name TEXT NOT NULL,
            date_of_birth TEXT,
            kyc_status TEXT NOT NULL,
            risk_rating TEXT NOT NULL,
            customer_segment TEXT NOT NULL,
            is_active INTEGER NOT NULL,
            onboarded_date TEXT NOT NULL,
            closed_date TEXT,
            _batch_id TEXT NOT NULL,
            _source_system TEXT NOT NULL,
            _ingested_at TEXT NOT NULL,
            _record_hash TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS stg_accounts (
            account_id INTEGER NOT NULL,
            customer_id INTEGER NOT NULL,
            product_id INTEGER NOT NULL,
            account_number TEXT NOT NULL,
            sort_code TEXT NOT NULL,
            status TEXT NOT NULL,
            currency TEXT NOT NULL,
            opened_date TEXT NOT NULL,
            closed_date TEXT,
            _batch_id TEXT NOT NULL,
            _source_system TEXT NOT NULL,
            _ingested_at TEXT NOT NULL,
            _record_hash TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS stg_transactions (
            txn_id INTEGER NOT NULL,
            account_id INTEGER NOT NULL,
            txn_date TEXT NOT NULL,
            txn_timestamp TEXT NOT NULL,
            amount_pence INTEGER NOT NULL,
            currency TEXT NOT NULL,
            txn_type TEXT NOT NULL,
            channel TEXT NOT NULL,
            status TEXT NOT NULL,
            balance_after_pence INTEGER NOT NULL,
            _batch_id TEXT NOT NULL,
            _source_system TEXT NOT NULL,
            _ingested_at TEXT NOT NULL,
            _record_hash TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS stg_gl_entries (
            entry_id INTEGER NOT NULL,
            journal_id TEXT NOT NULL,
            batch_id TEXT NOT NULL,
            entry_date TEXT NOT NULL,
            account_code TEXT NOT NULL,
            cost_centre_code TEXT NOT NULL,
            debit_pence INTEGER NOT NULL,
            credit_pence INTEGER NOT NULL,
            source_system TEXT NOT NULL,
            _batch_id TEXT NOT NULL,
            _source_system TEXT NOT NULL,
            _ingested_at TEXT NOT NULL,
            _record_hash TEXT NOT NULL
        );

        -- ====================================================================
        -- Warehouse: core (star schema)
        -- ====================================================================
        CREATE TABLE IF NOT EXISTS dim_date (
            date_key INTEGER PRIMARY KEY,
            full_date TEXT NOT NULL,
            day_of_week INTEGER NOT NULL,
            day_name TEXT NOT NULL,
            day_of_month INTEGER NOT NULL,
            day_of_year INTEGER NOT NULL,
            week_of_year INTEGER NOT NULL,
            month_number INTEGER NOT NULL,
            month_name TEXT NOT NULL,
            quarter INTEGER NOT NULL,
            year INTEGER NOT NULL,
            fiscal_year INTEGER NOT NULL,
            fiscal_quarter INTEGER NOT NULL,
            is_weekend INTEGER NOT NULL,
            is_bank_holiday INTEGER NOT NULL,
            is_month_end INTEGER NOT NULL,
            is_quarter_end INTEGER NOT NULL,
            is_year_end INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS dim_branch (
            branch_code TEXT PRIMARY KEY,
            branch_name TEXT NOT NULL,
            region TEXT NOT NULL,
            city TEXT NOT NULL,
            postcode TEXT NOT NULL,
            branch_type TEXT NOT NULL CHECK (branch_type IN (
                'full_service','digital_hub','head_office'))
        );

        CREATE TABLE IF NOT EXISTS dim_product (
            product_key INTEGER PRIMARY KEY,
            product_id INTEGER NOT NULL,
            product_code TEXT UNIQUE NOT NULL,
            product_name TEXT NOT NULL,
            product_category TEXT NOT NULL,
            interest_rate REAL NOT NULL,
            currency TEXT NOT NULL,
            is_active INTEGER NOT NULL,
            launched_date TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS dim_customer (
            customer_key INTEGER PRIMARY KEY,
            customer_id INTEGER NOT NULL,
            customer_ref TEXT NOT NULL,
            customer_type TEXT NOT NULL,
            full_name TEXT NOT NULL,
            customer_segment TEXT NOT NULL,
            risk_rating TEXT NOT NULL,
            kyc_status TEXT NOT NULL,
            postcode TEXT,
            effective_from TEXT NOT NULL,
            effective_to TEXT,
            is_current INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS dim_account (
            account_key INTEGER PRIMARY KEY,
            account_id INTEGER NOT NULL,
            customer_id INTEGER NOT NULL,
            account_number TEXT NOT NULL,
            sort_code TEXT NOT NULL,
            product_code TEXT NOT NULL,
            product_category TEXT NOT NULL,
            account_status TEXT NOT NULL,
            currency TEXT NOT NULL,
            opened_date TEXT NOT NULL,
            closed_date TEXT,
            effective_from TEXT NOT NULL,
            effective_to TEXT,
            is_current INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS fact_transactions (
            txn_id INTEGER PRIMARY KEY,
            date_key INTEGER NOT NULL REFERENCES dim_date(date_key),
            customer_key INTEGER REFERENCES dim_customer(customer_key),
            account_key INTEGER NOT NULL REFERENCES dim_account(account_key),
            product_key INTEGER REFERENCES dim_product(product_key),
            txn_timestamp TEXT NOT NULL,
            amount_pence INTEGER NOT NULL,
            amount_abs_pence INTEGER NOT NULL,
            is_credit INTEGER NOT NULL,
            currency TEXT NOT NULL,
            txn_type TEXT NOT NULL,
            channel TEXT NOT NULL,
            status TEXT NOT NULL,
            balance_after_pence INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS fact_gl_entries (
            entry_id INTEGER PRIMARY KEY,
            date_key INTEGER NOT NULL REFERENCES dim_date(date_key),
            account_code TEXT NOT NULL,
            cost_centre_code TEXT NOT NULL,
            journal_id TEXT NOT NULL,
            batch_id TEXT NOT NULL,
            debit_pence INTEGER NOT NULL,
            credit_pence INTEGER NOT NULL,
            net_pence INTEGER NOT NULL,
            source_system TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS bridge_customer_account (
            customer_key INTEGER NOT NULL,
            account_key INTEGER NOT NULL,
            relationship_type TEXT NOT NULL,
            effective_from TEXT NOT NULL,
            is_current INTEGER NOT NULL,
            PRIMARY KEY (customer_key, account_key)
        );

        -- ====================================================================
        -- Warehouse: reporting
        -- ====================================================================
        CREATE TABLE IF NOT EXISTS rpt_customer_360 (
            customer_key INTEGER PRIMARY KEY,
            customer_id INTEGER NOT NULL,
            customer_ref TEXT NOT NULL,
            full_name TEXT NOT NULL,
            customer_type TEXT NOT NULL,
            postcode TEXT,
            onboarded_date TEXT NOT NULL,
            num_accounts INTEGER NOT NULL,
            num_active_accounts INTEGER NOT NULL,
            txn_count INTEGER NOT NULL,
            txn_total_credit_pence INTEGER NOT NULL,
            txn_total_debit_pence INTEGER NOT NULL,
            last_txn_date TEXT,
            risk_rating TEXT NOT NULL,
            kyc_status TEXT NOT NULL,
            aml_alert_count INTEGER NOT NULL,
            complaint_count INTEGER NOT NULL,
            segment TEXT NOT NULL,
            report_date TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS rpt_daily_pnl (
            report_date TEXT NOT NULL,
            category TEXT NOT NULL,
            subcategory TEXT,
            gl_account_code TEXT NOT NULL,
            cost_centre_code TEXT NOT NULL,
            amount_pence INTEGER NOT NULL,
            PRIMARY KEY (report_date, gl_account_code, cost_centre_code)
        );

        CREATE TABLE IF NOT EXISTS rpt_arrears_ageing (
            report_date TEXT NOT NULL,
            product_category TEXT NOT NULL,
            ageing_bucket TEXT NOT NULL CHECK (ageing_bucket IN (
                '1-30_days','31-60_days','61-90_days','91-180_days',
                '181-365_days','over_365_days')),
            account_count INTEGER NOT NULL,
            total_arrears_pence INTEGER NOT NULL,
            PRIMARY KEY (report_date, product_category, ageing_bucket)
        );

        -- ====================================================================
        -- Indexes
        -- ====================================================================
        CREATE INDEX IF NOT EXISTS idx_accounts_customer ON core_accounts(customer_id);
        CREATE INDEX IF NOT EXISTS idx_txn_account ON core_transactions(account_id);
        CREATE INDEX IF NOT EXISTS idx_txn_date ON core_transactions(txn_date);
        CREATE INDEX IF NOT EXISTS idx_gl_journal ON gl_entries(journal_id);
        CREATE INDEX IF NOT EXISTS idx_gl_batch ON gl_entries(batch_id);
        CREATE INDEX IF NOT EXISTS idx_snapshots_customer ON core_customer_snapshots(customer_id);
        CREATE INDEX IF NOT EXISTS idx_dim_customer_id ON dim_customer(customer_id);
        CREATE INDEX IF NOT EXISTS idx_dim_account_id ON dim_account(account_id);
        CREATE INDEX IF NOT EXISTS idx_fact_txn_date ON fact_transactions(date_key);
        ",
    )
    .context("Failed to create schema")?;

    Ok(())
}

// ============================================================================
// BULK LOADING
// ============================================================================

fn is_transient(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}

/// Run one batch write with bounded retry and exponential backoff. Retries
/// only transient SQLite failures; constraint violations surface immediately
/// because they are generation bugs, not resource errors.
fn with_retry<T>(mut op: impl FnMut() -> rusqlite::Result<T>) -> Result<T> {
    let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < RETRY_ATTEMPTS && is_transient(&err) => {
                thread::sleep(delay);
                delay *= 2;
                attempt += 1;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("batch write failed after {attempt} attempt(s)"))
            }
        }
    }
}

/// Prepared-statement bulk insert: one transaction per chunk, never
/// row-by-row autocommit.
pub fn bulk_insert<T>(
    conn: &mut Connection,
    sql: &str,
    rows: &[T],
    batch_size: usize,
    bind: impl Fn(&mut Statement<'_>, &T) -> rusqlite::Result<usize>,
) -> Result<usize> {
    let mut inserted = 0;
    for chunk in rows.chunks(batch_size.max(1)) {
        inserted += with_retry(|| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(sql)?;
                for row in chunk {
                    bind(&mut stmt, row)?;
                }
            }
            tx.commit()?;
            Ok(chunk.len())
        })?;
    }
    Ok(inserted)
}

fn opt_date(d: &Option<chrono::NaiveDate>) -> Option<String> {
    d.map(|d| d.to_string())
}

// ============================================================================
// SOURCE-SYSTEM LOADS
// ============================================================================

pub fn insert_reference(conn: &mut Connection, reference: &ReferenceData, batch_size: usize) -> Result<()> {
    bulk_insert(
        conn,
        "INSERT INTO core_products (product_id, product_code, name, category, interest_rate,
            currency, min_balance_pence, is_active, launched_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        &reference.products,
        batch_size,
        |stmt, p| {
            stmt.execute(params![
                p.product_id,
                p.code,
                p.name,
                p.category.as_str(),
                p.interest_rate,
                p.currency,
                p.min_balance_pence,
                p.is_active,
                p.launched.to_string(),
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO gl_chart_of_accounts (account_code, account_name, account_type,
            account_subtype, parent_code, hierarchy_level, is_posting_account)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        &reference.chart_of_accounts,
        batch_size,
        |stmt, a| {
            stmt.execute(params![
                a.code,
                a.name,
                a.account_type.as_str(),
                a.subtype,
                a.parent_code,
                a.hierarchy_level,
                a.is_posting_account,
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO gl_cost_centres (cost_centre_code, cost_centre_name, department, manager)
         VALUES (?1, ?2, ?3, ?4)",
        &reference.cost_centres,
        batch_size,
        |stmt, c| stmt.execute(params![c.code, c.name, c.department, c.manager]),
    )?;

    bulk_insert(
        conn,
        "INSERT INTO pay_schemes (scheme_id, scheme_code, scheme_name, scheme_type,
            max_amount_pence, settlement_cycle, operating_hours)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        &reference.schemes,
        batch_size,
        |stmt, s| {
            stmt.execute(params![
                s.scheme_id,
                s.code,
                s.name,
                s.scheme_type.as_str(),
                s.max_amount_pence,
                s.settlement_cycle,
                s.operating_hours,
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO dim_branch (branch_code, branch_name, region, city, postcode, branch_type)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        &reference.branches,
        batch_size,
        |stmt, b| {
            stmt.execute(params![
                b.code,
                b.name,
                b.region,
                b.city,
                b.postcode,
                b.branch_type.as_str(),
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO dim_date (date_key, full_date, day_of_week, day_name, day_of_month,
            day_of_year, week_of_year, month_number, month_name, quarter, year,
            fiscal_year, fiscal_quarter, is_weekend, is_bank_holiday, is_month_end,
            is_quarter_end, is_year_end)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        &reference.calendar,
        batch_size,
        |stmt, d| {
            stmt.execute(params![
                d.date_key,
                d.date.to_string(),
                d.day_of_week,
                d.day_name,
                d.day_of_month,
                d.day_of_year,
                d.week_of_year,
                d.month_number,
                d.month_name,
                d.quarter,
                d.year,
                d.fiscal_year,
                d.fiscal_quarter,
                d.is_weekend,
                d.is_bank_holiday,
                d.is_month_end,
                d.is_quarter_end,
                d.is_year_end,
            ])
        },
    )?;

    Ok(())
}

pub fn insert_customers(conn: &mut Connection, customers: &CustomerSet, batch_size: usize) -> Result<()> {
    bulk_insert(
        conn,
        "INSERT INTO core_customers (customer_id, customer_ref, customer_type, title,
            first_name, last_name, full_name, date_of_birth, nationality, ni_number,
            email, phone_mobile, phone_home, company_name, company_reg_number, sic_code,
            kyc_status, kyc_verified_date, risk_rating, customer_segment, is_active,
            onboarded_date, closed_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
            ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
        &customers.customers,
        batch_size,
        |stmt, c| {
            stmt.execute(params![
                c.customer_id,
                c.customer_ref,
                c.customer_type.as_str(),
                c.title,
                c.first_name,
                c.last_name,
                c.full_name,
                opt_date(&c.date_of_birth),
                c.nationality,
                c.ni_number,
                c.email,
                c.phone_mobile,
                c.phone_home,
                c.company_name,
                c.company_reg_number,
                c.sic_code,
                c.kyc_status.as_str(),
                opt_date(&c.kyc_verified_date),
                c.risk_rating.as_str(),
                c.segment.as_str(),
                c.is_active,
                c.onboarded_date.to_string(),
                opt_date(&c.closed_date),
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO core_addresses (address_id, customer_id, address_type, line1, line2,
            city, county, postcode, country, is_primary)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        &customers.addresses,
        batch_size,
        |stmt, a| {
            stmt.execute(params![
                a.address_id,
                a.customer_id,
                a.address_type,
                a.line1,
                a.line2,
                a.city,
                a.county,
                a.postcode,
                a.country,
                a.is_primary,
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO core_customer_snapshots (snapshot_id, customer_id, as_of_date,
            customer_segment, risk_rating, kyc_status, postcode)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        &customers.snapshots,
        batch_size,
        |stmt, s| {
            stmt.execute(params![
                s.snapshot_id,
                s.customer_id,
                s.as_of_date.to_string(),
                s.segment.as_str(),
                s.risk_rating.as_str(),
                s.kyc_status.as_str(),
                s.postcode,
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO crm_contacts (contact_id, customer_id, contact_name, email_primary,
            email_secondary, phone_primary, phone_secondary, preferred_channel,
            relationship_manager, assigned_branch)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        &customers.contacts,
        batch_size,
        |stmt, c| {
            stmt.execute(params![
                c.contact_id,
                c.customer_id,
                c.contact_name,
                c.email_primary,
                c.email_secondary,
                c.phone_primary,
                c.phone_secondary,
                c.preferred_channel.as_str(),
                c.relationship_manager,
                c.assigned_branch,
            ])
        },
    )?;

    Ok(())
}

pub fn insert_accounts(conn: &mut Connection, accounts: &AccountSet, batch_size: usize) -> Result<()> {
    bulk_insert(
        conn,
        "INSERT INTO core_accounts (account_id, customer_id, product_id, account_number,
            sort_code, status, currency, credit_limit_pence, overdraft_limit_pence,
            opened_date, closed_date, opening_balance_pence)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        &accounts.accounts,
        batch_size,
        |stmt, a| {
            stmt.execute(params![
                a.account_id,
                a.customer_id,
                a.product_id,
                a.account_number,
                a.sort_code,
                a.status.as_str(),
                a.currency,
                a.credit_limit_pence,
                a.overdraft_limit_pence,
                a.opened_date.to_string(),
                opt_date(&a.closed_date),
                a.opening_balance_pence,
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO core_account_status_history (event_id, account_id, status, effective_date)
         VALUES (?1, ?2, ?3, ?4)",
        &accounts.status_history,
        batch_size,
        |stmt, e| {
            stmt.execute(params![
                e.event_id,
                e.account_id,
                e.status.as_str(),
                e.effective_date.to_string(),
            ])
        },
    )?;

    Ok(())
}

pub fn insert_transactions(conn: &mut Connection, txns: &TransactionSet, batch_size: usize) -> Result<usize> {
    let inserted = bulk_insert(
        conn,
        "INSERT INTO core_transactions (txn_id, account_id, txn_date, txn_timestamp,
            value_date, amount_pence, currency, txn_type, description, counterparty_name,
            counterparty_account, counterparty_sort_code, channel, reference, status,
            reason_code, balance_after_pence)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        &txns.transactions,
        batch_size,
        |stmt, t| {
            stmt.execute(params![
                t.txn_id,
                t.account_id,
                t.txn_date.to_string(),
                t.txn_timestamp.to_string(),
                t.value_date.to_string(),
                t.amount_pence,
                t.currency,
                t.txn_type.as_str(),
                t.description,
                t.counterparty_name,
                t.counterparty_account,
                t.counterparty_sort_code,
                t.channel.as_str(),
                t.reference,
                t.status.as_str(),
                t.reason_code.map(|r| r.as_str()),
                t.balance_after_pence,
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO core_daily_balances (account_id, balance_date, balance_pence)
         VALUES (?1, ?2, ?3)",
        &txns.daily_balances,
        batch_size,
        |stmt, b| {
            stmt.execute(params![b.account_id, b.balance_date.to_string(), b.balance_pence])
        },
    )?;

    Ok(inserted)
}

pub fn insert_payments(conn: &mut Connection, payments: &PaymentSet, batch_size: usize) -> Result<()> {
    bulk_insert(
        conn,
        "INSERT INTO core_standing_orders (so_id, account_id, payee_name, payee_account,
            payee_sort_code, amount_pence, frequency, start_date, end_date, reference, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        &payments.standing_orders,
        batch_size,
        |stmt, s| {
            stmt.execute(params![
                s.so_id,
                s.account_id,
                s.payee_name,
                s.payee_account,
                s.payee_sort_code,
                s.amount_pence,
                s.frequency.as_str(),
                s.start_date.to_string(),
                opt_date(&s.end_date),
                s.reference,
                s.status.as_str(),
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO core_direct_debits (dd_id, account_id, originator_name, originator_id,
            reference, mandate_date, first_collection, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        &payments.direct_debits,
        batch_size,
        |stmt, d| {
            stmt.execute(params![
                d.dd_id,
                d.account_id,
                d.originator_name,
                d.originator_id,
                d.reference,
                d.mandate_date.to_string(),
                d.first_collection.to_string(),
                d.status.as_str(),
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO pay_instructions (instruction_id, account_id, scheme_id, instruction_ts,
            amount_pence, beneficiary_name, beneficiary_account, beneficiary_sort_code,
            reference, priority, status, settlement_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        &payments.instructions,
        batch_size,
        |stmt, i| {
            stmt.execute(params![
                i.instruction_id,
                i.account_id,
                i.scheme_id,
                i.instruction_ts.to_string(),
                i.amount_pence,
                i.beneficiary_name,
                i.beneficiary_account,
                i.beneficiary_sort_code,
                i.reference,
                i.priority,
                i.status.as_str(),
                opt_date(&i.settlement_date),
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO pay_failed_payments (failed_id, instruction_id, failure_ts,
            failure_reason, original_amount_pence, resolution_status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        &payments.failed_payments,
        batch_size,
        |stmt, f| {
            stmt.execute(params![
                f.failed_id,
                f.instruction_id,
                f.failure_ts.to_string(),
                f.failure_reason.as_str(),
                f.original_amount_pence,
                f.resolution_status.as_str(),
            ])
        },
    )?;

    Ok(())
}

pub fn insert_crm(conn: &mut Connection, crm: &CrmSet, batch_size: usize) -> Result<()> {
    bulk_insert(
        conn,
        "INSERT INTO crm_interactions (interaction_id, contact_id, customer_id,
            interaction_ts, channel, category, subject, resolved, handled_by,
            duration_seconds, sentiment_score)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        &crm.interactions,
        batch_size,
        |stmt, i| {
            stmt.execute(params![
                i.interaction_id,
                i.contact_id,
                i.customer_id,
                i.interaction_ts.to_string(),
                i.channel.as_str(),
                i.category.as_str(),
                i.subject,
                i.resolved,
                i.handled_by,
                i.duration_seconds,
                i.sentiment_score,
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO crm_complaints (complaint_id, customer_id, complaint_date, category,
            severity, description, root_cause, status, resolution_date,
            compensation_pence, fos_referral, assigned_to)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        &crm.complaints,
        batch_size,
        |stmt, c| {
            stmt.execute(params![
                c.complaint_id,
                c.customer_id,
                c.complaint_date.to_string(),
                c.category.as_str(),
                c.severity,
                c.description,
                c.root_cause,
                c.status.as_str(),
                opt_date(&c.resolution_date),
                c.compensation_pence,
                c.fos_referral,
                c.assigned_to,
            ])
        },
    )?;

    Ok(())
}

pub fn insert_risk(conn: &mut Connection, risk: &RiskSet, batch_size: usize) -> Result<()> {
    bulk_insert(
        conn,
        "INSERT INTO risk_credit_scores (score_id, customer_id, score_date, score_value,
            score_band, model_name, model_version, is_current)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        &risk.credit_scores,
        batch_size,
        |stmt, s| {
            stmt.execute(params![
                s.score_id,
                s.customer_id,
                s.score_date.to_string(),
                s.score_value,
                s.score_band.as_str(),
                s.model_name,
                s.model_version,
                s.is_current,
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO risk_aml_alerts (alert_id, customer_id, alert_date, alert_type,
            rule_id, risk_score, trigger_amount_pence, status, resolution_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        &risk.aml_alerts,
        batch_size,
        |stmt, a| {
            stmt.execute(params![
                a.alert_id,
                a.customer_id,
                a.alert_date.to_string(),
                a.alert_type.as_str(),
                a.rule_id,
                a.risk_score,
                a.trigger_amount_pence,
                a.status.as_str(),
                opt_date(&a.resolution_date),
            ])
        },
    )?;

    Ok(())
}

pub fn insert_treasury(conn: &mut Connection, treasury: &TreasurySet, batch_size: usize) -> Result<()> {
    bulk_insert(
        conn,
        "INSERT INTO try_fx_rates (rate_id, rate_date, base_currency, quote_currency,
            mid_rate, bid_rate, ask_rate)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        &treasury.fx_rates,
        batch_size,
        |stmt, r| {
            stmt.execute(params![
                r.rate_id,
                r.rate_date.to_string(),
                r.base_currency,
                r.quote_currency,
                r.mid_rate,
                r.bid_rate,
                r.ask_rate,
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO try_liquidity_positions (position_id, report_date, asset_class,
            market_value_pence, adjusted_value_pence)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        &treasury.liquidity_positions,
        batch_size,
        |stmt, p| {
            stmt.execute(params![
                p.position_id,
                p.report_date.to_string(),
                p.asset_class.as_str(),
                p.market_value_pence,
                p.adjusted_value_pence,
            ])
        },
    )?;

    Ok(())
}

pub fn insert_ledger(conn: &mut Connection, ledger: &LedgerSet, batch_size: usize) -> Result<()> {
    bulk_insert(
        conn,
        "INSERT INTO gl_entries (entry_id, journal_id, batch_id, entry_date, posting_date,
            account_code, cost_centre_code, debit_pence, credit_pence, description,
            source_system, source_reference, is_manual, posted_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        &ledger.entries,
        batch_size,
        |stmt, e| {
            stmt.execute(params![
                e.entry_id,
                e.journal_id,
                e.batch_id,
                e.entry_date.to_string(),
                e.posting_date.to_string(),
                e.account_code,
                e.cost_centre_code,
                e.debit_pence,
                e.credit_pence,
                e.description,
                e.source_system,
                e.source_reference,
                e.is_manual,
                e.posted_by,
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO gl_balances (balance_id, period_end_date, account_code,
            cost_centre_code, opening_pence, period_debits_pence, period_credits_pence,
            closing_pence)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        &ledger.balances,
        batch_size,
        |stmt, b| {
            stmt.execute(params![
                b.balance_id,
                b.period_end_date.to_string(),
                b.account_code,
                b.cost_centre_code,
                b.opening_pence,
                b.period_debits_pence,
                b.period_credits_pence,
                b.closing_pence,
            ])
        },
    )?;

    Ok(())
}

// ============================================================================
// WAREHOUSE LOADS
// ============================================================================

pub fn insert_warehouse(
    conn: &mut Connection,
    warehouse: &crate::warehouse::WarehouseSet,
    batch_size: usize,
) -> Result<()> {
    bulk_insert(
        conn,
        "INSERT INTO stg_customers (customer_id, customer_ref, customer_type, full_name,
            date_of_birth, kyc_status, risk_rating, customer_segment, is_active,
            onboarded_date, closed_date, _batch_id, _source_system, _ingested_at, _record_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        &warehouse.stg_customers,
        batch_size,
        |stmt, c| {
            stmt.execute(params![
                c.customer_id,
                c.customer_ref,
                c.customer_type,
                c.full_name,
                opt_date(&c.date_of_birth),
                c.kyc_status,
                c.risk_rating,
                c.customer_segment,
                c.is_active,
                c.onboarded_date.to_string(),
                opt_date(&c.closed_date),
                c.meta.batch_id,
                c.meta.source_system,
                c.meta.ingested_at.to_string(),
                c.meta.record_hash,
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO stg_accounts (account_id, customer_id, product_id, account_number,
            sort_code, status, currency, opened_date, closed_date,
            _batch_id, _source_system, _ingested_at, _record_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        &warehouse.stg_accounts,
        batch_size,
        |stmt, a| {
            stmt.execute(params![
                a.account_id,
                a.customer_id,
                a.product_id,
                a.account_number,
                a.sort_code,
                a.status,
                a.currency,
                a.opened_date.to_string(),
                opt_date(&a.closed_date),
                a.meta.batch_id,
                a.meta.source_system,
                a.meta.ingested_at.to_string(),
                a.meta.record_hash,
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO stg_transactions (txn_id, account_id, txn_date, txn_timestamp,
            amount_pence, currency, txn_type, channel, status, balance_after_pence,
            _batch_id, _source_system, _ingested_at, _record_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        &warehouse.stg_transactions,
        batch_size,
        |stmt, t| {
            stmt.execute(params![
                t.txn_id,
                t.account_id,
                t.txn_date.to_string(),
                t.txn_timestamp.to_string(),
                t.amount_pence,
                t.currency,
                t.txn_type,
                t.channel,
                t.status,
                t.balance_after_pence,
                t.meta.batch_id,
                t.meta.source_system,
                t.meta.ingested_at.to_string(),
                t.meta.record_hash,
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO stg_gl_entries (entry_id, journal_id, batch_id, entry_date,
            account_code, cost_centre_code, debit_pence, credit_pence, source_system,
            _batch_id, _source_system, _ingested_at, _record_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        &warehouse.stg_gl_entries,
        batch_size,
        |stmt, e| {
            stmt.execute(params![
                e.entry_id,
                e.journal_id,
                e.batch_id,
                e.entry_date.to_string(),
                e.account_code,
                e.cost_centre_code,
                e.debit_pence,
                e.credit_pence,
                e.source_system,
                e.meta.batch_id,
                e.meta.source_system,
                e.meta.ingested_at.to_string(),
                e.meta.record_hash,
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO dim_product (product_key, product_id, product_code, product_name,
            product_category, interest_rate, currency, is_active, launched_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        &warehouse.dim_products,
        batch_size,
        |stmt, p| {
            stmt.execute(params![
                p.product_key,
                p.product_id,
                p.product_code,
                p.product_name,
                p.product_category,
                p.interest_rate,
                p.currency,
                p.is_active,
                p.launched_date.to_string(),
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO dim_customer (customer_key, customer_id, customer_ref, customer_type,
            full_name, customer_segment, risk_rating, kyc_status, postcode,
            effective_from, effective_to, is_current)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        &warehouse.dim_customers,
        batch_size,
        |stmt, v| {
            stmt.execute(params![
                v.customer_key,
                v.customer_id,
                v.customer_ref,
                v.customer_type,
                v.full_name,
                v.customer_segment,
                v.risk_rating,
                v.kyc_status,
                v.postcode,
                v.effective_from.to_string(),
                opt_date(&v.effective_to),
                v.is_current,
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO dim_account (account_key, account_id, customer_id, account_number,
            sort_code, product_code, product_category, account_status, currency,
            opened_date, closed_date, effective_from, effective_to, is_current)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        &warehouse.dim_accounts,
        batch_size,
        |stmt, v| {
            stmt.execute(params![
                v.account_key,
                v.account_id,
                v.customer_id,
                v.account_number,
                v.sort_code,
                v.product_code,
                v.product_category,
                v.account_status,
                v.currency,
                v.opened_date.to_string(),
                opt_date(&v.closed_date),
                v.effective_from.to_string(),
                opt_date(&v.effective_to),
                v.is_current,
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO fact_transactions (txn_id, date_key, customer_key, account_key,
            product_key, txn_timestamp, amount_pence, amount_abs_pence, is_credit,
            currency, txn_type, channel, status, balance_after_pence)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        &warehouse.fact_transactions,
        batch_size,
        |stmt, f| {
            stmt.execute(params![
                f.txn_id,
                f.date_key,
                f.customer_key,
                f.account_key,
                f.product_key,
                f.txn_timestamp.to_string(),
                f.amount_pence,
                f.amount_abs_pence,
                f.is_credit,
                f.currency,
                f.txn_type,
                f.channel,
                f.status,
                f.balance_after_pence,
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO fact_gl_entries (entry_id, date_key, account_code, cost_centre_code,
            journal_id, batch_id, debit_pence, credit_pence, net_pence, source_system)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        &warehouse.fact_gl_entries,
        batch_size,
        |stmt, e| {
            stmt.execute(params![
                e.entry_id,
                e.date_key,
                e.account_code,
                e.cost_centre_code,
                e.journal_id,
                e.batch_id,
                e.debit_pence,
                e.credit_pence,
                e.net_pence,
                e.source_system,
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO bridge_customer_account (customer_key, account_key, relationship_type,
            effective_from, is_current)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        &warehouse.bridge,
        batch_size,
        |stmt, b| {
            stmt.execute(params![
                b.customer_key,
                b.account_key,
                b.relationship_type,
                b.effective_from.to_string(),
                b.is_current,
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO rpt_customer_360 (customer_key, customer_id, customer_ref, full_name,
            customer_type, postcode, onboarded_date, num_accounts, num_active_accounts,
            txn_count, txn_total_credit_pence, txn_total_debit_pence, last_txn_date,
            risk_rating, kyc_status, aml_alert_count, complaint_count, segment, report_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        &warehouse.customer_360,
        batch_size,
        |stmt, r| {
            stmt.execute(params![
                r.customer_key,
                r.customer_id,
                r.customer_ref,
                r.full_name,
                r.customer_type,
                r.postcode,
                r.onboarded_date.to_string(),
                r.num_accounts,
                r.num_active_accounts,
                r.txn_count,
                r.txn_total_credit_pence,
                r.txn_total_debit_pence,
                opt_date(&r.last_txn_date),
                r.risk_rating,
                r.kyc_status,
                r.aml_alert_count,
                r.complaint_count,
                r.segment,
                r.report_date.to_string(),
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO rpt_daily_pnl (report_date, category, subcategory, gl_account_code,
            cost_centre_code, amount_pence)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        &warehouse.daily_pnl,
        batch_size,
        |stmt, r| {
            stmt.execute(params![
                r.report_date.to_string(),
                r.category,
                r.subcategory,
                r.gl_account_code,
                r.cost_centre_code,
                r.amount_pence,
            ])
        },
    )?;

    bulk_insert(
        conn,
        "INSERT INTO rpt_arrears_ageing (report_date, product_category, ageing_bucket,
            account_count, total_arrears_pence)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        &warehouse.arrears_ageing,
        batch_size,
        |stmt, r| {
            stmt.execute(params![
                r.report_date.to_string(),
                r.product_category,
                r.ageing_bucket,
                r.account_count,
                r.total_arrears_pence,
            ])
        },
    )?;

    Ok(())
}

// ============================================================================
// INTROSPECTION
// ============================================================================

/// Row counts per user table, alphabetically — the shape downstream tooling
/// compares across runs.
pub fn table_counts(conn: &Connection) -> Result<Vec<(String, i64)>> {
    let mut names: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };
    names.sort();

    let mut counts = Vec::with_capacity(names.len());
    for name in names {
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM \"{name}\""), [], |row| row.get(0))?;
        counts.push((name, count));
    }
    Ok(counts)
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    let count: i64 =
        conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| row.get(0))?;
    Ok(count)
}

/// Total pence imbalance of one GL journal, straight off the stored rows.
pub fn journal_imbalance(conn: &Connection, journal_id: &str) -> Result<Pence> {
    let imbalance: Pence = conn.query_row(
        "SELECT COALESCE(SUM(debit_pence) - SUM(credit_pence), 0)
         FROM gl_entries WHERE journal_id = ?1",
        params![journal_id],
        |row| row.get(0),
    )?;
    Ok(imbalance)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::context::GenContext;

    #[test]
    fn test_schema_creates_cleanly_twice() {
        let conn = open_in_memory().unwrap();
        setup_schema(&conn).unwrap();
        setup_schema(&conn).unwrap();

        let counts = table_counts(&conn).unwrap();
        assert!(counts.iter().any(|(name, _)| name == "core_customers"));
        assert!(counts.iter().any(|(name, _)| name == "fact_transactions"));
        assert!(counts.iter().all(|(_, count)| *count == 0));
    }

    #[test]
    fn test_check_constraint_rejects_unknown_enum() {
        let conn = open_in_memory().unwrap();
        setup_schema(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO core_accounts (account_id, customer_id, product_id, account_number,
                sort_code, status, currency, opened_date, opening_balance_pence)
             VALUES (1, 1, 1, '12345678', '770100', 'resurrected', 'GBP', '2024-01-01', 0)",
            [],
        );
        assert!(result.is_err(), "CHECK constraint must reject invalid status");
    }

    #[test]
    fn test_unique_constraint_on_account_number() {
        let conn = open_in_memory().unwrap();
        setup_schema(&conn).unwrap();

        let insert = "INSERT INTO core_accounts (account_id, customer_id, product_id,
            account_number, sort_code, status, currency, opened_date, opening_balance_pence)
            VALUES (?1, 1, 1, '12345678', '770100', 'active', 'GBP', '2024-01-01', 0)";
        conn.execute(insert, params![1]).unwrap();
        assert!(conn.execute(insert, params![2]).is_err());
    }

    #[test]
    fn test_reference_load_roundtrip() {
        let ctx = GenContext::new(GenerationConfig::default()).unwrap();
        let reference = crate::reference::ReferenceData::load(&ctx).unwrap();

        let mut conn = open_in_memory().unwrap();
        setup_schema(&conn).unwrap();
        insert_reference(&mut conn, &reference, ctx.config.batch_size).unwrap();

        assert_eq!(count_rows(&conn, "core_products").unwrap(), 21);
        assert_eq!(count_rows(&conn, "pay_schemes").unwrap(), 10);
        assert_eq!(count_rows(&conn, "dim_branch").unwrap(), 10);
        assert_eq!(
            count_rows(&conn, "dim_date").unwrap(),
            reference.calendar.len() as i64
        );
    }

    #[test]
    fn test_bulk_insert_reports_row_count() {
        let mut conn = open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();

        let rows: Vec<i64> = (0..257).collect();
        let inserted = bulk_insert(&mut conn, "INSERT INTO t (x) VALUES (?1)", &rows, 100, |stmt, x| {
            stmt.execute(params![x])
        })
        .unwrap();

        assert_eq!(inserted, 257);
        assert_eq!(count_rows(&conn, "t").unwrap(), 257);
    }
}
