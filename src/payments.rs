// Payments source system: standing orders, direct-debit mandates, outbound
// payment instructions, and the failed-payment records behind rejections.

use crate::accounts::AccountSet;
use crate::config::ProductCategory;
use crate::context::{date_between, daytime_timestamp, pick, pick_weighted, AmountSampler, CountSampler, GenContext, Pence};
use crate::reference::ReferenceData;
use crate::transactions::{FailureReason, FAILURE_REASONS};
use crate::ukdata;
use anyhow::Result;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoFrequency {
    Monthly,
    Weekly,
    Quarterly,
}

impl SoFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            SoFrequency::Monthly => "monthly",
            SoFrequency::Weekly => "weekly",
            SoFrequency::Quarterly => "quarterly",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MandateStatus {
    Active,
    Cancelled,
    Suspended,
}

impl MandateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MandateStatus::Active => "active",
            MandateStatus::Cancelled => "cancelled",
            MandateStatus::Suspended => "suspended",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionStatus {
    Settled,
    Sent,
    Rejected,
}

impl InstructionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstructionStatus::Settled => "settled",
            InstructionStatus::Sent => "sent",
            InstructionStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStatus {
    Unresolved,
    Retried,
    Reversed,
}

impl ResolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStatus::Unresolved => "unresolved",
            ResolutionStatus::Retried => "retried",
            ResolutionStatus::Reversed => "reversed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StandingOrder {
    pub so_id: i64,
    pub account_id: i64,
    pub payee_name: String,
    pub payee_account: String,
    pub payee_sort_code: String,
    pub amount_pence: Pence,
    pub frequency: SoFrequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub reference: String,
    pub status: MandateStatus,
}

#[derive(Debug, Clone)]
pub struct DirectDebit {
    pub dd_id: i64,
    pub account_id: i64,
    pub originator_name: String,
    pub originator_id: String,
    pub reference: String,
    pub mandate_date: NaiveDate,
    pub first_collection: NaiveDate,
    pub status: MandateStatus,
}

#[derive(Debug, Clone)]
pub struct PaymentInstruction {
    pub instruction_id: i64,
    pub account_id: i64,
    pub scheme_id: i64,
    pub instruction_ts: NaiveDateTime,
    pub amount_pence: Pence,
    pub beneficiary_name: String,
    pub beneficiary_account: String,
    pub beneficiary_sort_code: String,
    pub reference: String,
    pub priority: String,
    pub status: InstructionStatus,
    pub settlement_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct FailedPayment {
    pub failed_id: i64,
    pub instruction_id: i64,
    pub failure_ts: NaiveDateTime,
    pub failure_reason: FailureReason,
    pub original_amount_pence: Pence,
    pub resolution_status: ResolutionStatus,
}

#[derive(Debug, Clone)]
pub struct PaymentSet {
    pub standing_orders: Vec<StandingOrder>,
    pub direct_debits: Vec<DirectDebit>,
    pub instructions: Vec<PaymentInstruction>,
    pub failed_payments: Vec<FailedPayment>,
}

const SO_PAYEES: &[&str] = &[
    "Landlord", "Savings Transfer", "Charity Donation", "Gym Membership", "Insurance Premium",
    "Child Maintenance", "Parent Support",
];
const SO_AMOUNTS: &[Pence] = &[2_500, 5_000, 10_000, 15_000, 20_000, 30_000, 50_000, 75_000, 100_000];
const FAILURE_REASON_WEIGHTS: &[f64] = &[0.40, 0.15, 0.10, 0.10, 0.10, 0.15];

pub fn generate(
    ctx: &GenContext,
    reference: &ReferenceData,
    accounts: &AccountSet,
) -> Result<PaymentSet> {
    let config = &ctx.config;
    let mut standing_orders = Vec::new();
    let mut direct_debits = Vec::new();
    let mut instructions = Vec::new();
    let mut failed_payments = Vec::new();

    let so_count = CountSampler::new(1.5)?;
    let dd_count = CountSampler::new(3.0)?;
    let instruction_amount = AmountSampler::new(5.0, 1.2, 500_000_00)?;
    let scheme_weights: Vec<f64> = vec![0.30, 0.12, 0.15, 0.02, 0.02, 0.12, 0.12, 0.08, 0.05, 0.02];

    for account in accounts.transacting_accounts() {
        if !matches!(
            account.category,
            ProductCategory::CurrentAccount | ProductCategory::BusinessCurrent
        ) {
            continue;
        }
        let mut rng = ctx.stream("payments", account.account_id as u64);
        let (window_start, window_end) =
            account.activity_window(config.txn_date_start, config.txn_date_end);
        if window_start > window_end {
            continue;
        }

        // Standing orders.
        for _ in 0..so_count.sample(&mut rng) {
            let start_date = date_between(&mut rng, account.opened_date, window_end);
            standing_orders.push(StandingOrder {
                so_id: standing_orders.len() as i64 + 1,
                account_id: account.account_id,
                payee_name: pick(&mut rng, SO_PAYEES).to_string(),
                payee_account: ukdata::account_number(&mut rng),
                payee_sort_code: ukdata::sort_code(&mut rng),
                amount_pence: *pick(&mut rng, SO_AMOUNTS),
                frequency: *pick_weighted(
                    &mut rng,
                    &[SoFrequency::Monthly, SoFrequency::Weekly, SoFrequency::Quarterly],
                    &[0.70, 0.15, 0.15],
                )?,
                start_date,
                end_date: rng
                    .gen_bool(0.2)
                    .then(|| start_date + Duration::days(rng.gen_range(180..730))),
                reference: format!("SO-{}", rng.gen_range(10_000..100_000)),
                status: *pick_weighted(
                    &mut rng,
                    &[MandateStatus::Active, MandateStatus::Cancelled],
                    &[0.75, 0.25],
                )?,
            });
        }

        // Direct-debit mandates, distinct originators per account.
        let n_mandates = dd_count.sample(&mut rng).min(ukdata::DD_ORIGINATORS.len());
        let originator_picks =
            rand::seq::index::sample(&mut rng, ukdata::DD_ORIGINATORS.len(), n_mandates);
        for idx in originator_picks {
            let (name, sun) = ukdata::DD_ORIGINATORS[idx];
            let mandate_date = date_between(&mut rng, account.opened_date, window_end);
            direct_debits.push(DirectDebit {
                dd_id: direct_debits.len() as i64 + 1,
                account_id: account.account_id,
                originator_name: name.to_string(),
                originator_id: sun.to_string(),
                reference: format!("DD-{}", rng.gen_range(100_000..1_000_000)),
                mandate_date,
                first_collection: mandate_date + Duration::days(rng.gen_range(14..45)),
                status: *pick_weighted(
                    &mut rng,
                    &[MandateStatus::Active, MandateStatus::Cancelled, MandateStatus::Suspended],
                    &[0.85, 0.10, 0.05],
                )?,
            });
        }

        // Outbound payment instructions through the scheme rails.
        let window_months = ((window_end - window_start).num_days() + 1) as f64 / 30.44;
        let n_instructions = CountSampler::new(window_months.max(0.1) * 1.0)?.sample(&mut rng);
        for _ in 0..n_instructions {
            let scheme = pick_weighted(&mut rng, &reference.schemes, &scheme_weights)?;
            let inst_date = date_between(&mut rng, window_start, window_end);
            let mut amount = instruction_amount.sample(&mut rng);
            if let Some(max) = scheme.max_amount_pence {
                amount = amount.min(max);
            }

            let status = *pick_weighted(
                &mut rng,
                &[InstructionStatus::Settled, InstructionStatus::Sent, InstructionStatus::Rejected],
                &[0.93, 0.05, 0.02],
            )?;
            let instruction_id = instructions.len() as i64 + 1;
            let instruction_ts = daytime_timestamp(&mut rng, inst_date);

            if status == InstructionStatus::Rejected {
                failed_payments.push(FailedPayment {
                    failed_id: failed_payments.len() as i64 + 1,
                    instruction_id,
                    failure_ts: instruction_ts + Duration::minutes(rng.gen_range(1..120)),
                    failure_reason: *pick_weighted(&mut rng, FAILURE_REASONS, FAILURE_REASON_WEIGHTS)?,
                    original_amount_pence: amount,
                    resolution_status: *pick_weighted(
                        &mut rng,
                        &[ResolutionStatus::Unresolved, ResolutionStatus::Retried, ResolutionStatus::Reversed],
                        &[0.30, 0.40, 0.30],
                    )?,
                });
            }

            instructions.push(PaymentInstruction {
                instruction_id,
                account_id: account.account_id,
                scheme_id: scheme.scheme_id,
                instruction_ts,
                amount_pence: amount,
                beneficiary_name: pick(&mut rng, ukdata::RETAIL_COUNTERPARTIES).to_string(),
                beneficiary_account: ukdata::account_number(&mut rng),
                beneficiary_sort_code: ukdata::sort_code(&mut rng),
                reference: format!("PAY-{}", rng.gen_range(100_000..1_000_000)),
                priority: if rng.gen_bool(0.08) { "urgent" } else { "normal" }.to_string(),
                status,
                settlement_date: (status == InstructionStatus::Settled)
                    .then(|| inst_date + Duration::days(rng.gen_range(0..3))),
            });
        }
    }

    Ok(PaymentSet {
        standing_orders,
        direct_debits,
        instructions,
        failed_payments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::manifest::DefectManifest;
    use crate::{accounts, customers};

    fn build() -> (GenContext, AccountSet, PaymentSet) {
        let config = GenerationConfig {
            customer_count: 150,
            ..GenerationConfig::default()
        };
        let ctx = GenContext::new(config).unwrap();
        let reference = ReferenceData::load(&ctx).unwrap();
        let mut manifest = DefectManifest::new(ctx.config.seed, ctx.config.defects.clone());
        let customer_set = customers::generate(&ctx, &mut manifest).unwrap();
        let account_set = accounts::generate(&ctx, &reference, &customer_set, &mut manifest).unwrap();
        let payment_set = generate(&ctx, &reference, &account_set).unwrap();
        (ctx, account_set, payment_set)
    }

    #[test]
    fn test_mandates_only_on_current_accounts() {
        let (_, account_set, payment_set) = build();

        for so in &payment_set.standing_orders {
            let account = account_set.account(so.account_id).unwrap();
            assert!(matches!(
                account.category,
                ProductCategory::CurrentAccount | ProductCategory::BusinessCurrent
            ));
            assert!(so.start_date >= account.opened_date);
        }
        for dd in &payment_set.direct_debits {
            assert!(dd.first_collection > dd.mandate_date);
        }
    }

    #[test]
    fn test_every_rejection_has_a_failure_record() {
        let (_, _, payment_set) = build();

        let rejected: Vec<i64> = payment_set
            .instructions
            .iter()
            .filter(|i| i.status == InstructionStatus::Rejected)
            .map(|i| i.instruction_id)
            .collect();
        assert_eq!(rejected.len(), payment_set.failed_payments.len());
        for failed in &payment_set.failed_payments {
            assert!(rejected.contains(&failed.instruction_id));
        }
    }

    #[test]
    fn test_instruction_amounts_respect_scheme_caps() {
        let (ctx, _, payment_set) = build();
        let reference = ReferenceData::load(&ctx).unwrap();

        for instruction in &payment_set.instructions {
            let scheme = reference
                .schemes
                .iter()
                .find(|s| s.scheme_id == instruction.scheme_id)
                .unwrap();
            if let Some(max) = scheme.max_amount_pence {
                assert!(instruction.amount_pence <= max);
            }
            assert!(instruction.settlement_date.is_some() == (instruction.status == InstructionStatus::Settled));
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let (_, _, a) = build();
        let (_, _, b) = build();

        assert_eq!(a.instructions.len(), b.instructions.len());
        for (x, y) in a.instructions.iter().zip(&b.instructions) {
            assert_eq!(x.amount_pence, y.amount_pence);
            assert_eq!(x.reference, y.reference);
        }
    }
}
