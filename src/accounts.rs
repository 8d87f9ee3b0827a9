// Account entities. Each account belongs to exactly one customer (bar the
// manifested orphan set), references one product, and carries a monotonic
// status lifecycle recorded as history rows:
//
//   active → {dormant, frozen, in_arrears, default} → closed
//
// A closed account never resurrects.

use crate::config::ProductCategory;
use crate::context::{pick, pick_weighted, GenContext, IdCounter, Pence};
use crate::customers::{CustomerSet, CustomerType};
use crate::manifest::{DefectKind, DefectManifest};
use crate::reference::ReferenceData;
use crate::ukdata;
use anyhow::Result;
use chrono::{Duration, NaiveDate};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;

// ============================================================================
// STATUS LIFECYCLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    Dormant,
    Frozen,
    InArrears,
    Default,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Dormant => "dormant",
            AccountStatus::Frozen => "frozen",
            AccountStatus::InArrears => "in_arrears",
            AccountStatus::Default => "default",
            AccountStatus::Closed => "closed",
        }
    }

    /// Accounts in these states still transact.
    pub fn is_transacting(&self) -> bool {
        matches!(self, AccountStatus::Active | AccountStatus::InArrears)
    }
}

// ============================================================================
// ROW TYPES
// ============================================================================

#[derive(Debug, Clone)]
pub struct Account {
    pub account_id: i64,
    pub customer_id: i64,
    pub product_id: i64,
    pub category: ProductCategory,
    pub account_number: String,
    pub sort_code: String,
    pub status: AccountStatus,
    pub currency: String,
    pub credit_limit_pence: Option<Pence>,
    pub overdraft_limit_pence: Option<Pence>,
    pub opened_date: NaiveDate,
    pub closed_date: Option<NaiveDate>,
    pub opening_balance_pence: Pence,
    /// Marked at creation when this account was injected with a dangling
    /// customer_id. Downstream stages count these from the manifest, never
    /// by discovering them.
    pub is_orphan: bool,
}

impl Account {
    /// Window in which this account may produce events.
    pub fn activity_window(&self, window_start: NaiveDate, window_end: NaiveDate) -> (NaiveDate, NaiveDate) {
        let start = self.opened_date.max(window_start);
        let end = self.closed_date.map_or(window_end, |d| d.min(window_end));
        (start, end)
    }
}

#[derive(Debug, Clone)]
pub struct AccountStatusEvent {
    pub event_id: i64,
    pub account_id: i64,
    pub status: AccountStatus,
    pub effective_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct AccountSet {
    pub accounts: Vec<Account>,
    pub status_history: Vec<AccountStatusEvent>,
}

impl AccountSet {
    pub fn account(&self, account_id: i64) -> Option<&Account> {
        // account_id is a dense 1-based sequence.
        self.accounts.get(account_id as usize - 1)
    }

    pub fn transacting_accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter().filter(|a| a.status.is_transacting() && !a.is_orphan)
    }
}

// ============================================================================
// GENERATION
// ============================================================================

const CREDIT_LIMITS: &[Pence] = &[100_000, 200_000, 300_000, 500_000, 750_000, 1_000_000, 1_500_000];
const OVERDRAFT_LIMITS: &[Pence] = &[25_000, 50_000, 100_000, 150_000, 200_000, 300_000];

pub fn generate(
    ctx: &GenContext,
    reference: &ReferenceData,
    customers: &CustomerSet,
    defects: &mut DefectManifest,
) -> Result<AccountSet> {
    let config = &ctx.config;
    let mut accounts = Vec::new();
    let mut status_history = Vec::new();
    let mut status_event_ids = IdCounter::new();
    let mut used_numbers: HashSet<(String, String)> = HashSet::new();

    for customer in &customers.customers {
        let mut rng = ctx.stream("accounts", customer.customer_id as u64);
        let activity_end = customer.activity_end(config.txn_date_end);

        // Product mix per customer type.
        let mut wanted: Vec<ProductCategory> = Vec::new();
        match customer.customer_type {
            CustomerType::Personal => {
                wanted.push(ProductCategory::CurrentAccount);
                if rng.gen_bool(0.60) {
                    wanted.push(ProductCategory::Savings);
                }
                if rng.gen_bool(0.20) {
                    wanted.push(*pick_weighted(
                        &mut rng,
                        &[ProductCategory::PersonalLoan, ProductCategory::Mortgage],
                        &[0.6, 0.4],
                    )?);
                }
                if rng.gen_bool(0.30) {
                    wanted.push(ProductCategory::CreditCard);
                }
            }
            CustomerType::Business => {
                wanted.push(ProductCategory::BusinessCurrent);
                if rng.gen_bool(0.50) {
                    wanted.push(ProductCategory::BusinessSavings);
                }
                if rng.gen_bool(0.30) {
                    wanted.push(ProductCategory::BusinessLoan);
                }
            }
        }

        for category in wanted {
            let account_id = (accounts.len() + 1) as i64;
            let product_id = *pick(&mut rng, reference.products_in(category)?);

            let lifetime = (activity_end - customer.onboarded_date).num_days().max(0);
            let opened_date =
                customer.onboarded_date + Duration::days(rng.gen_range(0..=lifetime.min(730)));

            let account = build_account(
                &mut rng,
                customer,
                account_id,
                product_id,
                category,
                opened_date,
                activity_end,
                config.active_account_ratio,
                config.arrears_ratio,
                &mut used_numbers,
            )?;

            push_status_history(&mut rng, &account, &mut status_history, &mut status_event_ids);
            accounts.push(account);
        }
    }

    // Orphaned accounts — the one place a dangling customer_id is allowed,
    // injected in an exact, manifest-recorded quantity.
    let max_customer_id = customers.customers.len() as i64;
    let mut rng = ctx.stream("defects/orphan_accounts", 0);
    let orphan_opened = NaiveDate::from_ymd_opt(2023, 6, 15).unwrap_or(config.txn_date_start);
    for i in 0..config.defects.orphaned_accounts {
        let account_id = (accounts.len() + 1) as i64;
        let (account_number, sort_code) = unique_account_number(&mut rng, &mut used_numbers);
        defects.record(DefectKind::OrphanAccount, "core_accounts", account_id.to_string());

        let account = Account {
            account_id,
            customer_id: max_customer_id + 1000 + i as i64,
            product_id: *pick(&mut rng, reference.products_in(ProductCategory::CurrentAccount)?),
            category: ProductCategory::CurrentAccount,
            account_number,
            sort_code,
            status: AccountStatus::Active,
            currency: "GBP".to_string(),
            credit_limit_pence: None,
            overdraft_limit_pence: None,
            opened_date: orphan_opened,
            closed_date: None,
            opening_balance_pence: rng.gen_range(0..500_000),
            is_orphan: true,
        };
        push_status_history(&mut rng, &account, &mut status_history, &mut status_event_ids);
        accounts.push(account);
    }

    Ok(AccountSet {
        accounts,
        status_history,
    })
}

#[allow(clippy::too_many_arguments)]
fn build_account(
    rng: &mut ChaCha8Rng,
    customer: &crate::customers::Customer,
    account_id: i64,
    product_id: i64,
    category: ProductCategory,
    opened_date: NaiveDate,
    activity_end: NaiveDate,
    active_ratio: f64,
    arrears_ratio: f64,
    used_numbers: &mut HashSet<(String, String)>,
) -> Result<Account> {
    let (account_number, sort_code) = unique_account_number(rng, used_numbers);

    // Status: closed customers close their accounts; otherwise mostly active,
    // with arrears confined to lending products.
    let status = if !customer.is_active {
        AccountStatus::Closed
    } else if category.is_lending() && rng.gen_bool(arrears_ratio) {
        *pick_weighted(
            rng,
            &[AccountStatus::InArrears, AccountStatus::Default],
            &[0.8, 0.2],
        )?
    } else if !rng.gen_bool(active_ratio) {
        *pick_weighted(
            rng,
            &[AccountStatus::Dormant, AccountStatus::Frozen, AccountStatus::Closed],
            &[0.6, 0.1, 0.3],
        )?
    } else {
        AccountStatus::Active
    };

    let closed_date = (status == AccountStatus::Closed).then(|| {
        let span = (activity_end - opened_date).num_days().max(1);
        opened_date + Duration::days(rng.gen_range(1..=span))
    });

    let opening_balance_pence = match category {
        ProductCategory::CurrentAccount | ProductCategory::BusinessCurrent => {
            rng.gen_range(0..800_000)
        }
        ProductCategory::Savings | ProductCategory::BusinessSavings => rng.gen_range(10_000..5_000_000),
        ProductCategory::PersonalLoan => -rng.gen_range(100_000..2_500_000),
        ProductCategory::BusinessLoan => -rng.gen_range(500_000..10_000_000),
        ProductCategory::Mortgage => -rng.gen_range(8_000_000..40_000_000),
        ProductCategory::CreditCard => -rng.gen_range(0..150_000),
    };

    Ok(Account {
        account_id,
        customer_id: customer.customer_id,
        product_id,
        category,
        account_number,
        sort_code,
        status,
        currency: "GBP".to_string(),
        credit_limit_pence: (category == ProductCategory::CreditCard)
            .then(|| *pick(rng, CREDIT_LIMITS)),
        overdraft_limit_pence: (matches!(
            category,
            ProductCategory::CurrentAccount | ProductCategory::BusinessCurrent
        ) && rng.gen_bool(0.3))
        .then(|| *pick(rng, OVERDRAFT_LIMITS)),
        opened_date,
        closed_date,
        opening_balance_pence,
        is_orphan: false,
    })
}

fn unique_account_number(
    rng: &mut ChaCha8Rng,
    used: &mut HashSet<(String, String)>,
) -> (String, String) {
    loop {
        let number = ukdata::account_number(rng);
        let sort = ukdata::sort_code(rng);
        if used.insert((number.clone(), sort.clone())) {
            return (number, sort);
        }
    }
}

/// Record the monotonic status trail: every account starts active at opening;
/// terminal states get the intermediate steps the lifecycle implies.
fn push_status_history(
    rng: &mut ChaCha8Rng,
    account: &Account,
    history: &mut Vec<AccountStatusEvent>,
    ids: &mut IdCounter,
) {
    let mut push = |account_id, status, effective_date| {
        history.push(AccountStatusEvent {
            event_id: ids.next_id(),
            account_id,
            status,
            effective_date,
        });
    };

    push(account.account_id, AccountStatus::Active, account.opened_date);

    let end = account.closed_date.unwrap_or(account.opened_date + Duration::days(365));
    let span = (end - account.opened_date).num_days().max(2);
    let mid = account.opened_date + Duration::days(rng.gen_range(1..span));

    match account.status {
        AccountStatus::Active => {}
        AccountStatus::Dormant => push(account.account_id, AccountStatus::Dormant, mid),
        AccountStatus::Frozen => push(account.account_id, AccountStatus::Frozen, mid),
        AccountStatus::InArrears => push(account.account_id, AccountStatus::InArrears, mid),
        AccountStatus::Default => {
            push(account.account_id, AccountStatus::InArrears, mid);
            let late = mid + Duration::days(((end - mid).num_days() / 2).max(1));
            push(account.account_id, AccountStatus::Default, late);
        }
        AccountStatus::Closed => {
            if let Some(closed) = account.closed_date {
                if rng.gen_bool(0.3) && mid < closed {
                    push(account.account_id, AccountStatus::Dormant, mid);
                }
                push(account.account_id, AccountStatus::Closed, closed);
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DefectConfig, GenerationConfig};
    use crate::customers;

    fn build() -> (GenContext, CustomerSet, AccountSet, DefectManifest) {
        let config = GenerationConfig {
            customer_count: 300,
            defects: DefectConfig {
                missing_postcodes: 10,
                orphaned_accounts: 5,
                ..DefectConfig::default()
            },
            ..GenerationConfig::default()
        };
        let ctx = GenContext::new(config).unwrap();
        let reference = ReferenceData::load(&ctx).unwrap();
        let mut manifest = DefectManifest::new(ctx.config.seed, ctx.config.defects.clone());
        let customer_set = customers::generate(&ctx, &mut manifest).unwrap();
        let account_set = generate(&ctx, &reference, &customer_set, &mut manifest).unwrap();
        (ctx, customer_set, account_set, manifest)
    }

    #[test]
    fn test_every_customer_has_a_current_account() {
        let (_, customer_set, account_set, _) = build();

        for customer in &customer_set.customers {
            let has_current = account_set.accounts.iter().any(|a| {
                a.customer_id == customer.customer_id
                    && matches!(
                        a.category,
                        ProductCategory::CurrentAccount | ProductCategory::BusinessCurrent
                    )
            });
            assert!(has_current, "{} has no current account", customer.customer_ref);
        }
    }

    #[test]
    fn test_orphans_are_exact_and_manifested() {
        let (_, customer_set, account_set, manifest) = build();

        let orphans: Vec<&Account> = account_set.accounts.iter().filter(|a| a.is_orphan).collect();
        assert_eq!(orphans.len(), 5);
        assert_eq!(manifest.count(DefectKind::OrphanAccount), 5);

        let max_customer = customer_set.customers.len() as i64;
        for orphan in orphans {
            assert!(orphan.customer_id > max_customer);
            assert!(manifest.contains(DefectKind::OrphanAccount, &orphan.account_id.to_string()));
        }

        // And no accidental orphans outside the manifest.
        for account in account_set.accounts.iter().filter(|a| !a.is_orphan) {
            assert!(customer_set.customer(account.customer_id).is_some());
        }
    }

    #[test]
    fn test_account_numbers_unique_within_run() {
        let (_, _, account_set, _) = build();

        let mut seen = HashSet::new();
        for account in &account_set.accounts {
            assert!(
                seen.insert((account.account_number.clone(), account.sort_code.clone())),
                "duplicate account number {}-{}",
                account.account_number,
                account.sort_code
            );
        }
    }

    #[test]
    fn test_opened_within_customer_lifecycle() {
        let (ctx, customer_set, account_set, _) = build();

        for account in account_set.accounts.iter().filter(|a| !a.is_orphan) {
            let customer = customer_set.customer(account.customer_id).unwrap();
            assert!(account.opened_date >= customer.onboarded_date);
            assert!(account.opened_date <= customer.activity_end(ctx.config.txn_date_end));
        }
    }

    #[test]
    fn test_status_history_is_monotonic() {
        let (_, _, account_set, _) = build();

        for account in &account_set.accounts {
            let trail: Vec<&AccountStatusEvent> = account_set
                .status_history
                .iter()
                .filter(|e| e.account_id == account.account_id)
                .collect();

            assert_eq!(trail[0].status, AccountStatus::Active);
            assert_eq!(trail[0].effective_date, account.opened_date);
            for pair in trail.windows(2) {
                assert!(pair[0].effective_date <= pair[1].effective_date);
                assert_ne!(pair[1].status, AccountStatus::Active, "no resurrection");
            }
            assert_eq!(trail.last().unwrap().status, account.status);

            if account.status == AccountStatus::Closed {
                assert!(account.closed_date.is_some());
            }
        }
    }

    #[test]
    fn test_closed_customers_close_their_accounts() {
        let (_, customer_set, account_set, _) = build();

        for account in account_set.accounts.iter().filter(|a| !a.is_orphan) {
            let customer = customer_set.customer(account.customer_id).unwrap();
            if !customer.is_active {
                assert_eq!(account.status, AccountStatus::Closed);
            }
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let (_, _, a, _) = build();
        let (_, _, b, _) = build();

        assert_eq!(a.accounts.len(), b.accounts.len());
        for (x, y) in a.accounts.iter().zip(&b.accounts) {
            assert_eq!(x.account_number, y.account_number);
            assert_eq!(x.status.as_str(), y.status.as_str());
            assert_eq!(x.opening_balance_pence, y.opening_balance_pence);
        }
    }
}
