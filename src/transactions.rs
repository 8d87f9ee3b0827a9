// Account transaction timelines — the largest event family.
//
// Each transacting account gets a time-ordered sequence inside its activity
// window, generated from its own derived RNG stream. Accounts fan out across
// rayon workers (single writer per timeline); the merge order is fixed by
// account id, so the rowset is deterministic. The running-balance invariant:
//
//   balance_after = previous balance_after (or opening balance) + amount
//
// holds for completed rows; failed/returned/disputed rows leave the balance
// untouched — the money never moved.

use crate::accounts::{Account, AccountSet};
use crate::config::ProductCategory;
use crate::context::{daytime_timestamp, pick, pick_weighted, AmountSampler, CountSampler, GenContext, Pence};
use crate::manifest::{DefectKind, DefectManifest};
use crate::ukdata;
use anyhow::{bail, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::seq::index::sample;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::collections::HashMap;

// ============================================================================
// ENUMERATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnType {
    DirectDebit,
    StandingOrder,
    FasterPayment,
    CardPayment,
    AtmWithdrawal,
    Salary,
    TransferOut,
    TransferIn,
    Bacs,
    Chaps,
    Interest,
    Fee,
    LoanRepayment,
    MortgagePayment,
}

impl TxnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnType::DirectDebit => "direct_debit",
            TxnType::StandingOrder => "standing_order",
            TxnType::FasterPayment => "faster_payment",
            TxnType::CardPayment => "card_payment",
            TxnType::AtmWithdrawal => "atm_withdrawal",
            TxnType::Salary => "salary",
            TxnType::TransferOut => "transfer_out",
            TxnType::TransferIn => "transfer_in",
            TxnType::Bacs => "bacs",
            TxnType::Chaps => "chaps",
            TxnType::Interest => "interest",
            TxnType::Fee => "fee",
            TxnType::LoanRepayment => "loan_repayment",
            TxnType::MortgagePayment => "mortgage_payment",
        }
    }

    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            TxnType::Salary | TxnType::TransferIn | TxnType::Interest | TxnType::LoanRepayment
                | TxnType::MortgagePayment
        )
    }

    pub fn display_name(&self) -> String {
        let mut out = String::new();
        for (i, part) in self.as_str().split('_').enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let mut chars = part.chars();
            if let Some(first) = chars.next() {
                out.push(first.to_ascii_uppercase());
                out.extend(chars);
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    Completed,
    Failed,
    Returned,
    Disputed,
}

impl TxnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnStatus::Completed => "completed",
            TxnStatus::Failed => "failed",
            TxnStatus::Returned => "returned",
            TxnStatus::Disputed => "disputed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Online,
    Mobile,
    Branch,
    Atm,
    Phone,
    Api,
    Batch,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Online => "online",
            Channel::Mobile => "mobile",
            Channel::Branch => "branch",
            Channel::Atm => "atm",
            Channel::Phone => "phone",
            Channel::Api => "api",
            Channel::Batch => "batch",
        }
    }
}

/// Fixed failure taxonomy for non-completed payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    InsufficientFunds,
    InvalidAccount,
    InvalidSortCode,
    AccountClosed,
    AmountLimitExceeded,
    TechnicalError,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::InsufficientFunds => "insufficient_funds",
            FailureReason::InvalidAccount => "invalid_account",
            FailureReason::InvalidSortCode => "invalid_sort_code",
            FailureReason::AccountClosed => "account_closed",
            FailureReason::AmountLimitExceeded => "amount_limit_exceeded",
            FailureReason::TechnicalError => "technical_error",
        }
    }
}

pub const FAILURE_REASONS: &[FailureReason] = &[
    FailureReason::InsufficientFunds,
    FailureReason::InvalidAccount,
    FailureReason::InvalidSortCode,
    FailureReason::AccountClosed,
    FailureReason::AmountLimitExceeded,
    FailureReason::TechnicalError,
];
const FAILURE_REASON_WEIGHTS: &[f64] = &[0.40, 0.15, 0.10, 0.10, 0.10, 0.15];

// ============================================================================
// ROW TYPES
// ============================================================================

#[derive(Debug, Clone)]
pub struct Transaction {
    pub txn_id: i64,
    pub account_id: i64,
    pub txn_date: NaiveDate,
    pub txn_timestamp: NaiveDateTime,
    pub value_date: NaiveDate,
    pub amount_pence: Pence,
    pub currency: String,
    pub txn_type: TxnType,
    pub description: String,
    pub counterparty_name: String,
    pub counterparty_account: Option<String>,
    pub counterparty_sort_code: Option<String>,
    pub channel: Channel,
    pub reference: String,
    pub status: TxnStatus,
    pub reason_code: Option<FailureReason>,
    pub balance_after_pence: Pence,
}

impl Transaction {
    /// Signed movement this row applies to the running balance.
    pub fn applied_amount(&self) -> Pence {
        if self.status == TxnStatus::Completed {
            self.amount_pence
        } else {
            0
        }
    }
}

#[derive(Debug, Clone)]
pub struct DailyBalance {
    pub account_id: i64,
    pub balance_date: NaiveDate,
    pub balance_pence: Pence,
}

/// Transactions sorted by (account_id, timestamp, draft order); daily balances
/// sorted by (account_id, date).
#[derive(Debug, Clone)]
pub struct TransactionSet {
    pub transactions: Vec<Transaction>,
    pub daily_balances: Vec<DailyBalance>,
}

// ============================================================================
// TYPE MIX / AMOUNT PROFILES
// ============================================================================

fn mix_for(category: ProductCategory) -> (&'static [TxnType], &'static [f64]) {
    use TxnType::*;
    match category {
        ProductCategory::CurrentAccount => (
            &[DirectDebit, StandingOrder, FasterPayment, CardPayment, AtmWithdrawal, Salary, TransferOut, TransferIn, Bacs, Fee],
            &[0.15, 0.08, 0.20, 0.25, 0.05, 0.08, 0.05, 0.05, 0.07, 0.02],
        ),
        ProductCategory::Savings | ProductCategory::BusinessSavings => (
            &[TransferIn, TransferOut, Interest, FasterPayment],
            &[0.40, 0.35, 0.15, 0.10],
        ),
        ProductCategory::PersonalLoan | ProductCategory::BusinessLoan => (
            &[LoanRepayment, Interest, Fee],
            &[0.70, 0.20, 0.10],
        ),
        ProductCategory::Mortgage => (
            &[MortgagePayment, Interest, Fee],
            &[0.70, 0.20, 0.10],
        ),
        ProductCategory::CreditCard => (
            &[CardPayment, FasterPayment, Interest, Fee, TransferIn],
            &[0.55, 0.10, 0.15, 0.05, 0.15],
        ),
        ProductCategory::BusinessCurrent => (
            &[DirectDebit, FasterPayment, Bacs, Chaps, CardPayment, Salary, TransferOut, TransferIn, Fee],
            &[0.12, 0.20, 0.15, 0.05, 0.15, 0.10, 0.08, 0.10, 0.05],
        ),
    }
}

fn monthly_rate(category: ProductCategory, configured: f64) -> f64 {
    match category {
        ProductCategory::Savings | ProductCategory::BusinessSavings => 3.0,
        ProductCategory::PersonalLoan | ProductCategory::Mortgage | ProductCategory::BusinessLoan => 2.0,
        ProductCategory::CreditCard => 15.0,
        _ => configured,
    }
}

/// Log-normal (mu, sigma) of the pound amount, per type, with a pence cap.
fn amount_profiles() -> Result<HashMap<TxnType, AmountSampler>> {
    use TxnType::*;
    let profiles: &[(TxnType, f64, f64, Pence)] = &[
        (DirectDebit, 4.0, 0.8, 50_000_00),
        (StandingOrder, 5.0, 0.5, 50_000_00),
        (FasterPayment, 4.5, 1.0, 500_000_00),
        (CardPayment, 3.0, 0.9, 50_000_00),
        (AtmWithdrawal, 3.3, 0.3, 500_00),
        (Salary, 7.5, 0.4, 500_000_00),
        (TransferOut, 5.0, 1.2, 500_000_00),
        (TransferIn, 5.0, 1.2, 500_000_00),
        (Bacs, 5.5, 1.0, 500_000_00),
        (Chaps, 9.0, 1.5, 500_000_00),
        (Interest, 2.0, 1.0, 10_000_00),
        (Fee, 1.5, 0.5, 1_000_00),
        (LoanRepayment, 5.8, 0.3, 50_000_00),
        (MortgagePayment, 6.7, 0.3, 50_000_00),
    ];

    let mut map = HashMap::new();
    for (txn_type, mu, sigma, cap) in profiles {
        map.insert(*txn_type, AmountSampler::new(*mu, *sigma, *cap)?);
    }
    Ok(map)
}

// ============================================================================
// GENERATION
// ============================================================================

pub fn generate(
    ctx: &GenContext,
    accounts: &AccountSet,
    defects: &mut DefectManifest,
) -> Result<TransactionSet> {
    let config = &ctx.config;
    let profiles = amount_profiles()?;
    let transacting: Vec<&Account> = accounts.transacting_accounts().collect();

    // Per-account timelines in parallel; each account owns its RNG stream and
    // its ordering, so the merge below is independent of scheduling.
    let timelines: Vec<Vec<Transaction>> = transacting
        .par_iter()
        .map(|account| account_timeline(ctx, account, &profiles))
        .collect::<Result<Vec<_>>>()?;

    let mut transactions: Vec<Transaction> = timelines.into_iter().flatten().collect();

    // Zero-amount defects: decided once over the completed rows, then the
    // affected balance chains are rebuilt below.
    let completed: Vec<usize> = transactions
        .iter()
        .enumerate()
        .filter(|(_, t)| t.status == TxnStatus::Completed && t.amount_pence != 0)
        .map(|(i, _)| i)
        .collect();
    let wanted_zero = config.defects.zero_amount_transactions;
    if completed.len() < wanted_zero {
        bail!(
            "cannot place {wanted_zero} zero-amount defects across {} completed transactions",
            completed.len()
        );
    }
    let mut rng = ctx.stream("defects/zero_amount", 0);
    let mut zero_targets: Vec<usize> = sample(&mut rng, completed.len(), wanted_zero)
        .into_iter()
        .map(|i| completed[i])
        .collect();
    zero_targets.sort_unstable();
    for &target in &zero_targets {
        transactions[target].amount_pence = 0;
    }

    // Assign ids in merge order and replay every balance chain from the
    // opening balance (the defect pass above invalidated the drafts).
    let mut daily_balances: Vec<DailyBalance> = Vec::new();
    let mut chain_start = 0usize;
    let mut next_txn_id: i64 = 0;
    while chain_start < transactions.len() {
        let account_id = transactions[chain_start].account_id;
        let chain_end = transactions[chain_start..]
            .iter()
            .position(|t| t.account_id != account_id)
            .map_or(transactions.len(), |offset| chain_start + offset);

        let account = accounts
            .account(account_id)
            .ok_or_else(|| anyhow::anyhow!("transaction references unknown account {account_id}"))?;

        let mut balance = account.opening_balance_pence;
        let mut last_date: Option<NaiveDate> = None;
        for txn in &mut transactions[chain_start..chain_end] {
            next_txn_id += 1;
            txn.txn_id = next_txn_id;
            balance += txn.applied_amount();
            txn.balance_after_pence = balance;

            if txn.status == TxnStatus::Completed {
                match last_date {
                    Some(date) if date == txn.txn_date => {
                        if let Some(last) = daily_balances.last_mut() {
                            last.balance_pence = balance;
                        }
                    }
                    _ => {
                        daily_balances.push(DailyBalance {
                            account_id,
                            balance_date: txn.txn_date,
                            balance_pence: balance,
                        });
                        last_date = Some(txn.txn_date);
                    }
                }
            }
        }
        chain_start = chain_end;
    }

    for &target in &zero_targets {
        defects.record(
            DefectKind::ZeroAmountTransaction,
            "core_transactions",
            transactions[target].txn_id.to_string(),
        );
    }

    Ok(TransactionSet {
        transactions,
        daily_balances,
    })
}

fn account_timeline(
    ctx: &GenContext,
    account: &Account,
    profiles: &HashMap<TxnType, AmountSampler>,
) -> Result<Vec<Transaction>> {
    let config = &ctx.config;
    let mut rng = ctx.stream("transactions", account.account_id as u64);

    let (window_start, window_end) = account.activity_window(config.txn_date_start, config.txn_date_end);
    if window_start > window_end {
        return Ok(Vec::new());
    }
    let window_months = ((window_end - window_start).num_days() + 1) as f64 / 30.44;

    let rate = monthly_rate(account.category, config.avg_txn_per_account_month) * window_months;
    if rate <= 0.0 {
        return Ok(Vec::new());
    }
    let n_txns = CountSampler::new(rate)?.sample(&mut rng).max(1);

    let (types, weights) = mix_for(account.category);
    let is_business = matches!(
        account.category,
        ProductCategory::BusinessCurrent | ProductCategory::BusinessLoan | ProductCategory::BusinessSavings
    );

    let span_days = (window_end - window_start).num_days();
    let mut timestamps: Vec<NaiveDateTime> = (0..n_txns)
        .map(|_| {
            let date = window_start + Duration::days(rng.gen_range(0..=span_days));
            daytime_timestamp(&mut rng, date)
        })
        .collect();
    timestamps.sort();

    let mut timeline = Vec::with_capacity(n_txns);
    for txn_timestamp in timestamps {
        let txn_type = *pick_weighted(&mut rng, types, weights)?;
        let txn_date = txn_timestamp.date();

        let sampler = profiles
            .get(&txn_type)
            .ok_or_else(|| anyhow::anyhow!("no amount profile for {}", txn_type.as_str()))?;
        let mut magnitude = sampler.sample(&mut rng);
        if txn_type == TxnType::AtmWithdrawal {
            magnitude = ((magnitude + 500) / 1000 * 1000).clamp(1000, 50_000);
        }
        // Loan-side credits reduce the (negative) outstanding balance.
        let amount_pence = if txn_type.is_credit() { magnitude } else { -magnitude };

        let status = if rng.gen_bool(0.005) {
            *pick_weighted(
                &mut rng,
                &[TxnStatus::Failed, TxnStatus::Returned, TxnStatus::Disputed],
                &[0.5, 0.3, 0.2],
            )?
        } else {
            TxnStatus::Completed
        };
        let reason_code = matches!(status, TxnStatus::Failed | TxnStatus::Returned)
            .then(|| pick_weighted(&mut rng, FAILURE_REASONS, FAILURE_REASON_WEIGHTS).copied())
            .transpose()?;

        let counterparty_name = counterparty(&mut rng, txn_type, is_business).to_string();
        let channel = channel_for(&mut rng, txn_type)?;
        let value_date = match txn_type {
            TxnType::Bacs | TxnType::StandingOrder => txn_date + Duration::days(2),
            _ => txn_date,
        };

        timeline.push(Transaction {
            txn_id: 0, // assigned after the deterministic merge
            account_id: account.account_id,
            txn_date,
            txn_timestamp,
            value_date,
            amount_pence,
            currency: "GBP".to_string(),
            txn_type,
            description: format!("{} - {}", txn_type.display_name(), counterparty_name),
            counterparty_name,
            counterparty_account: rng.gen_bool(0.7).then(|| ukdata::account_number(&mut rng)),
            counterparty_sort_code: rng.gen_bool(0.7).then(|| ukdata::sort_code(&mut rng)),
            channel,
            reference: format!("REF{}", rng.gen_range(100_000..1_000_000)),
            status,
            reason_code,
            balance_after_pence: 0, // computed after the defect pass
        });
    }

    Ok(timeline)
}

fn counterparty(rng: &mut ChaCha8Rng, txn_type: TxnType, is_business: bool) -> &'static str {
    match txn_type {
        TxnType::Salary => *pick(rng, ukdata::SALARY_PAYERS),
        TxnType::Interest | TxnType::Fee => "Pennine Community Bank",
        _ if is_business => {
            if rng.gen_bool(0.7) {
                *pick(rng, ukdata::BUSINESS_COUNTERPARTIES)
            } else {
                *pick(rng, ukdata::RETAIL_COUNTERPARTIES)
            }
        }
        _ => *pick(rng, ukdata::RETAIL_COUNTERPARTIES),
    }
}

fn channel_for(rng: &mut ChaCha8Rng, txn_type: TxnType) -> Result<Channel> {
    Ok(match txn_type {
        TxnType::DirectDebit | TxnType::StandingOrder | TxnType::Bacs | TxnType::Interest | TxnType::Fee => {
            Channel::Batch
        }
        TxnType::AtmWithdrawal => Channel::Atm,
        TxnType::CardPayment => *pick_weighted(
            rng,
            &[Channel::Mobile, Channel::Online, Channel::Branch],
            &[0.4, 0.3, 0.3],
        )?,
        TxnType::Salary => {
            if rng.gen_bool(0.5) {
                Channel::Api
            } else {
                Channel::Batch
            }
        }
        TxnType::Chaps => Channel::Api,
        _ => *pick_weighted(
            rng,
            &[Channel::Online, Channel::Mobile, Channel::Branch, Channel::Phone, Channel::Api],
            &[0.30, 0.35, 0.05, 0.05, 0.25],
        )?,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DefectConfig, GenerationConfig};
    use crate::manifest::DefectManifest;
    use crate::reference::ReferenceData;
    use crate::{accounts, customers};

    fn build() -> (GenContext, AccountSet, TransactionSet, DefectManifest) {
        let config = GenerationConfig {
            customer_count: 120,
            defects: DefectConfig {
                missing_postcodes: 5,
                zero_amount_transactions: 9,
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
        let txn_set = generate(&ctx, &account_set, &mut manifest).unwrap();
        (ctx, account_set, txn_set, manifest)
    }

    #[test]
    fn test_balance_replay_from_opening_balance() {
        let (_, account_set, txn_set, _) = build();

        let mut balances: HashMap<i64, Pence> = HashMap::new();
        for txn in &txn_set.transactions {
            let account = account_set.account(txn.account_id).unwrap();
            let balance = balances
                .entry(txn.account_id)
                .or_insert(account.opening_balance_pence);
            *balance += txn.applied_amount();
            assert_eq!(
                txn.balance_after_pence, *balance,
                "balance chain broken at txn {}",
                txn.txn_id
            );
        }
    }

    #[test]
    fn test_timelines_are_time_ordered_per_account() {
        let (_, _, txn_set, _) = build();

        for pair in txn_set.transactions.windows(2) {
            if pair[0].account_id == pair[1].account_id {
                assert!(pair[0].txn_timestamp <= pair[1].txn_timestamp);
            }
        }
    }

    #[test]
    fn test_transactions_fall_inside_activity_window() {
        let (ctx, account_set, txn_set, _) = build();

        for txn in &txn_set.transactions {
            let account = account_set.account(txn.account_id).unwrap();
            let (start, end) =
                account.activity_window(ctx.config.txn_date_start, ctx.config.txn_date_end);
            assert!(txn.txn_date >= start && txn.txn_date <= end);
            assert!(txn.txn_date >= account.opened_date);
        }
    }

    #[test]
    fn test_zero_amount_defects_exact_and_manifested() {
        let (_, _, txn_set, manifest) = build();

        let zeros: Vec<&Transaction> = txn_set
            .transactions
            .iter()
            .filter(|t| t.amount_pence == 0)
            .collect();
        assert_eq!(zeros.len(), 9);
        assert_eq!(manifest.count(DefectKind::ZeroAmountTransaction), 9);
        for txn in zeros {
            assert_eq!(txn.status, TxnStatus::Completed);
            assert!(manifest.contains(DefectKind::ZeroAmountTransaction, &txn.txn_id.to_string()));
        }
    }

    #[test]
    fn test_failed_payments_carry_reason_codes() {
        let (_, _, txn_set, _) = build();

        let mut failed_seen = 0;
        for txn in &txn_set.transactions {
            match txn.status {
                TxnStatus::Failed | TxnStatus::Returned => {
                    failed_seen += 1;
                    assert!(txn.reason_code.is_some(), "txn {} missing reason", txn.txn_id);
                }
                TxnStatus::Completed => assert!(txn.reason_code.is_none()),
                TxnStatus::Disputed => {}
            }
        }
        assert!(failed_seen > 0, "expected some failed/returned payments");
    }

    #[test]
    fn test_daily_balances_match_last_completed_of_day() {
        let (_, _, txn_set, _) = build();

        let mut last_of_day: HashMap<(i64, NaiveDate), Pence> = HashMap::new();
        for txn in &txn_set.transactions {
            if txn.status == TxnStatus::Completed {
                last_of_day.insert((txn.account_id, txn.txn_date), txn.balance_after_pence);
            }
        }

        assert_eq!(txn_set.daily_balances.len(), last_of_day.len());
        for snapshot in &txn_set.daily_balances {
            assert_eq!(
                last_of_day[&(snapshot.account_id, snapshot.balance_date)],
                snapshot.balance_pence
            );
        }
    }

    #[test]
    fn test_atm_withdrawals_round_to_ten_pounds() {
        let (_, _, txn_set, _) = build();

        for txn in &txn_set.transactions {
            if txn.txn_type == TxnType::AtmWithdrawal && txn.amount_pence != 0 {
                assert_eq!(txn.amount_pence % 1000, 0, "ATM amount {}", txn.amount_pence);
            }
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let (_, _, a, manifest_a) = build();
        let (_, _, b, manifest_b) = build();

        assert_eq!(a.transactions.len(), b.transactions.len());
        for (x, y) in a.transactions.iter().zip(&b.transactions) {
            assert_eq!(x.txn_id, y.txn_id);
            assert_eq!(x.amount_pence, y.amount_pence);
            assert_eq!(x.txn_timestamp, y.txn_timestamp);
            assert_eq!(x.balance_after_pence, y.balance_after_pence);
        }
        assert_eq!(manifest_a.to_json().unwrap(), manifest_b.to_json().unwrap());
    }
}
