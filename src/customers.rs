// Subject entities: customers, their addresses, CRM contact records, and the
// attribute snapshots that later drive warehouse SCD2 versioning.
//
// Every customer is generated from its own derived RNG stream, so the rowset
// is identical for a given (seed, config) regardless of iteration order.

use crate::config::{BRANCHES, GenerationConfig};
use crate::context::{date_between, pick, pick_weighted, GenContext, IdCounter};
use crate::manifest::{DefectKind, DefectManifest};
use crate::ukdata;
use anyhow::Result;
use chrono::{Duration, NaiveDate};
use rand::seq::index::sample;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;

// ============================================================================
// ENUMERATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomerType {
    Personal,
    Business,
}

impl CustomerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerType::Personal => "personal",
            CustomerType::Business => "business",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KycStatus {
    Verified,
    EnhancedDueDiligence,
    Pending,
    Expired,
}

impl KycStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KycStatus::Verified => "verified",
            KycStatus::EnhancedDueDiligence => "enhanced_due_diligence",
            KycStatus::Pending => "pending",
            KycStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskRating {
    Low,
    Standard,
    Medium,
    High,
    Pep,
    Sanctioned,
}

impl RiskRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskRating::Low => "low",
            RiskRating::Standard => "standard",
            RiskRating::Medium => "medium",
            RiskRating::High => "high",
            RiskRating::Pep => "pep",
            RiskRating::Sanctioned => "sanctioned",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    MassMarket,
    MassAffluent,
    HighNetWorth,
    YoungProfessional,
    Student,
    Retired,
    SmallBusiness,
    GrowingBusiness,
}

impl Segment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::MassMarket => "mass_market",
            Segment::MassAffluent => "mass_affluent",
            Segment::HighNetWorth => "high_net_worth",
            Segment::YoungProfessional => "young_professional",
            Segment::Student => "student",
            Segment::Retired => "retired",
            Segment::SmallBusiness => "small_business",
            Segment::GrowingBusiness => "growing_business",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferredChannel {
    Email,
    Phone,
    Sms,
    Post,
    App,
}

impl PreferredChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreferredChannel::Email => "email",
            PreferredChannel::Phone => "phone",
            PreferredChannel::Sms => "sms",
            PreferredChannel::Post => "post",
            PreferredChannel::App => "app",
        }
    }
}

// ============================================================================
// ROW TYPES
// ============================================================================

#[derive(Debug, Clone)]
pub struct Customer {
    pub customer_id: i64,
    pub customer_ref: String,
    pub customer_type: CustomerType,
    pub title: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub ni_number: Option<String>,
    pub email: String,
    pub phone_mobile: String,
    pub phone_home: Option<String>,
    pub company_name: Option<String>,
    pub company_reg_number: Option<String>,
    pub sic_code: Option<String>,
    pub kyc_status: KycStatus,
    pub kyc_verified_date: Option<NaiveDate>,
    pub risk_rating: RiskRating,
    pub segment: Segment,
    pub is_active: bool,
    pub onboarded_date: NaiveDate,
    pub closed_date: Option<NaiveDate>,
}

impl Customer {
    /// Last date on which this customer may have activity.
    pub fn activity_end(&self, window_end: NaiveDate) -> NaiveDate {
        self.closed_date.map_or(window_end, |d| d.min(window_end))
    }
}

#[derive(Debug, Clone)]
pub struct Address {
    pub address_id: i64,
    pub customer_id: i64,
    pub address_type: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub county: Option<String>,
    pub postcode: Option<String>,
    pub country: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone)]
pub struct Contact {
    pub contact_id: i64,
    pub customer_id: i64,
    pub contact_name: String,
    pub email_primary: String,
    pub email_secondary: Option<String>,
    pub phone_primary: String,
    pub phone_secondary: Option<String>,
    pub preferred_channel: PreferredChannel,
    pub relationship_manager: String,
    pub assigned_branch: String,
}

/// One observation of the SCD2-tracked customer attributes at a point in time.
/// The first snapshot is taken at onboarding; later ones record amendments.
#[derive(Debug, Clone)]
pub struct CustomerSnapshot {
    pub snapshot_id: i64,
    pub customer_id: i64,
    pub as_of_date: NaiveDate,
    pub segment: Segment,
    pub risk_rating: RiskRating,
    pub kyc_status: KycStatus,
    pub postcode: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CustomerSet {
    pub customers: Vec<Customer>,
    pub addresses: Vec<Address>,
    pub contacts: Vec<Contact>,
    pub snapshots: Vec<CustomerSnapshot>,
}

impl CustomerSet {
    pub fn customer(&self, customer_id: i64) -> Option<&Customer> {
        // customer_id is a dense 1-based sequence.
        self.customers.get(customer_id as usize - 1)
    }

    pub fn active_customer_ids(&self) -> Vec<i64> {
        self.customers
            .iter()
            .filter(|c| c.is_active)
            .map(|c| c.customer_id)
            .collect()
    }
}

// ============================================================================
// GENERATION
// ============================================================================

const ONBOARDING_START: &str = "2015-01-01";
const NATIONALITIES: &[&str] = &[
    "Irish", "Polish", "Indian", "Pakistani", "Nigerian", "Romanian", "Italian", "Portuguese",
    "French", "German",
];
const SIC_CODES: &[&str] = &[
    "62020", "47110", "56101", "41201", "69201", "86210", "96020", "55100", "49410", "01110",
];
const EMAIL_DOMAINS: &[&str] = &[
    "gmail.com", "hotmail.co.uk", "outlook.com", "yahoo.co.uk", "btinternet.com",
];

const PERSONAL_SEGMENTS: &[Segment] = &[
    Segment::MassMarket,
    Segment::MassAffluent,
    Segment::HighNetWorth,
    Segment::YoungProfessional,
    Segment::Student,
    Segment::Retired,
];
const PERSONAL_SEGMENT_WEIGHTS: &[f64] = &[0.45, 0.25, 0.05, 0.12, 0.05, 0.08];

const BUSINESS_SEGMENTS: &[Segment] = &[Segment::SmallBusiness, Segment::GrowingBusiness];
const BUSINESS_SEGMENT_WEIGHTS: &[f64] = &[0.70, 0.30];

const RISK_RATINGS: &[RiskRating] = &[
    RiskRating::Low,
    RiskRating::Standard,
    RiskRating::Medium,
    RiskRating::High,
    RiskRating::Pep,
    RiskRating::Sanctioned,
];
const PERSONAL_RISK_WEIGHTS: &[f64] = &[0.25, 0.55, 0.12, 0.05, 0.02, 0.01];
const BUSINESS_RISK_WEIGHTS: &[f64] = &[0.20, 0.50, 0.20, 0.10, 0.0, 0.0];

const KYC_STATUSES: &[KycStatus] = &[
    KycStatus::Verified,
    KycStatus::EnhancedDueDiligence,
    KycStatus::Pending,
    KycStatus::Expired,
];
const KYC_WEIGHTS: &[f64] = &[0.70, 0.10, 0.10, 0.10];

const CHANNELS: &[PreferredChannel] = &[
    PreferredChannel::Email,
    PreferredChannel::Phone,
    PreferredChannel::Sms,
    PreferredChannel::Post,
    PreferredChannel::App,
];
const CHANNEL_WEIGHTS: &[f64] = &[0.35, 0.20, 0.15, 0.05, 0.25];

// Age brackets with UK-plausible weights.
const AGE_RANGES: &[(i64, i64)] = &[(18, 25), (26, 35), (36, 50), (51, 65), (66, 85)];
const AGE_WEIGHTS: &[f64] = &[0.15, 0.25, 0.30, 0.20, 0.10];

pub fn generate(ctx: &GenContext, defects: &mut DefectManifest) -> Result<CustomerSet> {
    let config = &ctx.config;
    let n_personal = (config.customer_count as f64 * config.personal_ratio) as usize;
    let n_total = config.customer_count;

    // Decided once, up front: which customers get a NULL postcode on their
    // primary address. The manifest rows are recorded as the addresses are cut.
    let missing_postcode_customers: HashSet<usize> = {
        let mut rng = ctx.stream("defects/missing_postcode", 0);
        let n = config.defects.missing_postcodes.min(n_total);
        sample(&mut rng, n_total, n).into_iter().collect()
    };

    let mut customers = Vec::with_capacity(n_total);
    let mut addresses = Vec::new();
    let mut contacts = Vec::with_capacity(n_total);
    let mut snapshots = Vec::new();
    let mut address_ids = IdCounter::new();
    let mut snapshot_ids = IdCounter::new();

    let onboarding_start = NaiveDate::parse_from_str(ONBOARDING_START, "%Y-%m-%d")?;
    let rm_names: Vec<String> = (1..30).map(|i| format!("RM-{i:03}")).collect();

    for index in 0..n_total {
        let mut rng = ctx.stream("customers", index as u64);
        let customer_id = (index + 1) as i64;
        let customer_type = if index < n_personal {
            CustomerType::Personal
        } else {
            CustomerType::Business
        };

        let customer = match customer_type {
            CustomerType::Personal => {
                personal_customer(&mut rng, config, customer_id, onboarding_start)?
            }
            CustomerType::Business => {
                business_customer(&mut rng, config, customer_id, onboarding_start)?
            }
        };

        // Primary address, with the pre-decided postcode defect applied here.
        let postcode = if missing_postcode_customers.contains(&index) {
            None
        } else {
            Some(ukdata::postcode(&mut rng))
        };
        let address_id = address_ids.next_id();
        if postcode.is_none() {
            defects.record(DefectKind::MissingPostcode, "core_addresses", address_id.to_string());
        }
        addresses.push(Address {
            address_id,
            customer_id,
            address_type: match customer_type {
                CustomerType::Personal => "home".to_string(),
                CustomerType::Business => "registered".to_string(),
            },
            line1: ukdata::street_address(&mut rng),
            line2: rng.gen_bool(0.4).then(|| format!("Flat {}", rng.gen_range(1..40))),
            city: pick(&mut rng, ukdata::CITIES).to_string(),
            county: rng.gen_bool(0.7).then(|| pick(&mut rng, ukdata::COUNTIES).to_string()),
            postcode: postcode.clone(),
            country: "United Kingdom".to_string(),
            is_primary: true,
        });

        // ~30% carry a correspondence address as well.
        if rng.gen_bool(0.3) {
            addresses.push(Address {
                address_id: address_ids.next_id(),
                customer_id,
                address_type: "correspondence".to_string(),
                line1: ukdata::street_address(&mut rng),
                line2: None,
                city: pick(&mut rng, ukdata::CITIES).to_string(),
                county: None,
                postcode: Some(ukdata::postcode(&mut rng)),
                country: "United Kingdom".to_string(),
                is_primary: false,
            });
        }

        contacts.push(Contact {
            contact_id: customer_id,
            customer_id,
            contact_name: customer.full_name.clone(),
            email_primary: customer.email.clone(),
            email_secondary: rng.gen_bool(0.2).then(|| {
                format!("alt.{}@{}", customer_id, pick(&mut rng, EMAIL_DOMAINS))
            }),
            phone_primary: customer.phone_mobile.clone(),
            phone_secondary: rng.gen_bool(0.3).then(|| ukdata::phone(&mut rng)),
            preferred_channel: *pick_weighted(&mut rng, CHANNELS, CHANNEL_WEIGHTS)?,
            relationship_manager: pick(&mut rng, &rm_names).clone(),
            assigned_branch: pick(&mut rng, BRANCHES).1.to_string(),
        });

        // Onboarding snapshot plus any amendment snapshots.
        let customer_snapshots =
            snapshot_history(&mut rng, config, &customer, postcode, &mut snapshot_ids)?;
        snapshots.extend(customer_snapshots);

        customers.push(customer);
    }

    Ok(CustomerSet {
        customers,
        addresses,
        contacts,
        snapshots,
    })
}

fn personal_customer(
    rng: &mut ChaCha8Rng,
    config: &GenerationConfig,
    customer_id: i64,
    onboarding_start: NaiveDate,
) -> Result<Customer> {
    let (age_lo, age_hi) = *pick_weighted(rng, AGE_RANGES, AGE_WEIGHTS)?;
    let age_days = rng.gen_range(age_lo * 365..=age_hi * 365 + 364);
    let date_of_birth = config.txn_date_end - Duration::days(age_days);

    let onboarded = date_between(rng, onboarding_start, config.txn_date_end);

    let (title, first_name) = if rng.gen_bool(0.5) {
        let title = *pick_weighted(rng, &["Mr", "Dr"], &[0.9, 0.1])?;
        (title, *pick(rng, ukdata::FIRST_NAMES_MALE))
    } else {
        let title = *pick_weighted(rng, &["Ms", "Mrs", "Miss", "Dr"], &[0.3, 0.3, 0.3, 0.1])?;
        (title, *pick(rng, ukdata::FIRST_NAMES_FEMALE))
    };
    let last_name = *pick(rng, ukdata::LAST_NAMES);

    let kyc_status = *pick_weighted(rng, KYC_STATUSES, KYC_WEIGHTS)?;
    let is_active = !rng.gen_bool(0.08);
    let closed_date = (!is_active).then(|| {
        (onboarded + Duration::days(rng.gen_range(180..3000))).min(config.txn_date_end)
    });

    Ok(Customer {
        customer_id,
        customer_ref: format!("PCB-{}", 10_000_000 + customer_id),
        customer_type: CustomerType::Personal,
        title: Some(title.to_string()),
        first_name: Some(first_name.to_string()),
        last_name: Some(last_name.to_string()),
        full_name: format!("{title} {first_name} {last_name}"),
        date_of_birth: Some(date_of_birth),
        nationality: Some(if rng.gen_bool(0.85) {
            "British".to_string()
        } else {
            pick(rng, NATIONALITIES).to_string()
        }),
        ni_number: Some(ukdata::ni_number(rng)),
        email: format!(
            "{}.{}{}@{}",
            first_name.to_lowercase(),
            last_name.to_lowercase().replace('\'', ""),
            rng.gen_range(1..999),
            pick(rng, EMAIL_DOMAINS)
        ),
        phone_mobile: ukdata::phone(rng),
        phone_home: rng.gen_bool(0.4).then(|| ukdata::phone(rng)),
        company_name: None,
        company_reg_number: None,
        sic_code: None,
        kyc_status,
        kyc_verified_date: (kyc_status == KycStatus::Verified)
            .then(|| onboarded + Duration::days(rng.gen_range(1..30))),
        risk_rating: *pick_weighted(rng, RISK_RATINGS, PERSONAL_RISK_WEIGHTS)?,
        segment: *pick_weighted(rng, PERSONAL_SEGMENTS, PERSONAL_SEGMENT_WEIGHTS)?,
        is_active,
        onboarded_date: onboarded,
        closed_date,
    })
}

fn business_customer(
    rng: &mut ChaCha8Rng,
    config: &GenerationConfig,
    customer_id: i64,
    onboarding_start: NaiveDate,
) -> Result<Customer> {
    let company = ukdata::company_name(rng);
    let onboarded = date_between(rng, onboarding_start, config.txn_date_end);
    let is_active = !rng.gen_bool(0.10);

    Ok(Customer {
        customer_id,
        customer_ref: format!("PCB-{}", 10_000_000 + customer_id),
        customer_type: CustomerType::Business,
        title: None,
        first_name: None,
        last_name: None,
        full_name: company.clone(),
        date_of_birth: None,
        nationality: None,
        ni_number: None,
        email: format!(
            "info@{}.co.uk",
            company
                .to_lowercase()
                .replace([' ', '&', ','], "")
                .chars()
                .take(20)
                .collect::<String>()
        ),
        phone_mobile: ukdata::phone(rng),
        phone_home: rng.gen_bool(0.6).then(|| ukdata::phone(rng)),
        company_name: Some(company),
        company_reg_number: Some(format!("{:08}", rng.gen_range(1_000_000..99_999_999))),
        sic_code: Some(pick(rng, SIC_CODES).to_string()),
        kyc_status: *pick_weighted(
            rng,
            &[KycStatus::Verified, KycStatus::EnhancedDueDiligence],
            &[0.75, 0.25],
        )?,
        kyc_verified_date: Some(onboarded + Duration::days(rng.gen_range(1..30))),
        risk_rating: *pick_weighted(rng, RISK_RATINGS, BUSINESS_RISK_WEIGHTS)?,
        segment: *pick_weighted(rng, BUSINESS_SEGMENTS, BUSINESS_SEGMENT_WEIGHTS)?,
        is_active,
        onboarded_date: onboarded,
        closed_date: (!is_active).then(|| {
            (onboarded + Duration::days(rng.gen_range(180..2000))).min(config.txn_date_end)
        }),
    })
}

/// Build the snapshot trail for one customer: the onboarding observation,
/// then amendment observations for a configured fraction of customers.
fn snapshot_history(
    rng: &mut ChaCha8Rng,
    config: &GenerationConfig,
    customer: &Customer,
    initial_postcode: Option<String>,
    snapshot_ids: &mut IdCounter,
) -> Result<Vec<CustomerSnapshot>> {
    let mut snapshots = vec![CustomerSnapshot {
        snapshot_id: snapshot_ids.next_id(),
        customer_id: customer.customer_id,
        as_of_date: customer.onboarded_date,
        segment: customer.segment,
        risk_rating: customer.risk_rating,
        kyc_status: customer.kyc_status,
        postcode: initial_postcode,
    }];

    let activity_end = customer.activity_end(config.txn_date_end);
    let lifetime = (activity_end - customer.onboarded_date).num_days();
    if lifetime < 180 || !rng.gen_bool(config.amendment_ratio) {
        return Ok(snapshots);
    }

    let n_amendments = rng.gen_range(1..=3usize);
    let mut amendment_dates: Vec<NaiveDate> = (0..n_amendments)
        .map(|_| customer.onboarded_date + Duration::days(rng.gen_range(90..=lifetime)))
        .collect();
    amendment_dates.sort();
    amendment_dates.dedup();

    for as_of_date in amendment_dates {
        let mut next = snapshots[snapshots.len() - 1].clone();
        next.snapshot_id = snapshot_ids.next_id();
        next.as_of_date = as_of_date;

        let segment_pool: &[Segment] = match customer.customer_type {
            CustomerType::Personal => PERSONAL_SEGMENTS,
            CustomerType::Business => BUSINESS_SEGMENTS,
        };
        match rng.gen_range(0..3u8) {
            0 => {
                // Segment migration.
                let mut segment = *pick(rng, segment_pool);
                if segment == next.segment {
                    segment = segment_pool[(segment_pool
                        .iter()
                        .position(|s| *s == segment)
                        .unwrap_or(0)
                        + 1)
                        % segment_pool.len()];
                }
                next.segment = segment;
            }
            1 => {
                // Risk re-rating, one notch either way.
                next.risk_rating = match next.risk_rating {
                    RiskRating::Low => RiskRating::Standard,
                    RiskRating::Standard => {
                        if rng.gen_bool(0.5) {
                            RiskRating::Low
                        } else {
                            RiskRating::Medium
                        }
                    }
                    RiskRating::Medium => RiskRating::High,
                    RiskRating::High => RiskRating::Medium,
                    other => other,
                };
            }
            _ => {
                // House move; customers with a manifested missing postcode stay missing.
                if next.postcode.is_some() {
                    next.postcode = Some(ukdata::postcode(rng));
                }
            }
        }
        snapshots.push(next);
    }

    Ok(snapshots)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefectConfig;

    fn small_config() -> GenerationConfig {
        GenerationConfig {
            customer_count: 400,
            defects: DefectConfig {
                missing_postcodes: 20,
                orphaned_accounts: 5,
                ..DefectConfig::default()
            },
            ..GenerationConfig::default()
        }
    }

    fn generate_set() -> (CustomerSet, DefectManifest) {
        let ctx = GenContext::new(small_config()).unwrap();
        let mut manifest = DefectManifest::new(ctx.config.seed, ctx.config.defects.clone());
        let set = generate(&ctx, &mut manifest).unwrap();
        (set, manifest)
    }

    #[test]
    fn test_counts_and_type_split() {
        let (set, _) = generate_set();

        assert_eq!(set.customers.len(), 400);
        let personal = set
            .customers
            .iter()
            .filter(|c| c.customer_type == CustomerType::Personal)
            .count();
        assert_eq!(personal, 340, "85% personal split");
        assert_eq!(set.contacts.len(), 400);
    }

    #[test]
    fn test_missing_postcodes_exactly_match_manifest() {
        let (set, manifest) = generate_set();

        let missing: Vec<&Address> = set
            .addresses
            .iter()
            .filter(|a| a.postcode.is_none())
            .collect();
        assert_eq!(missing.len(), 20);
        assert_eq!(manifest.count(DefectKind::MissingPostcode), 20);
        for address in missing {
            assert!(address.is_primary, "only primary addresses carry the defect");
            assert!(manifest.contains(DefectKind::MissingPostcode, &address.address_id.to_string()));
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let (a, manifest_a) = generate_set();
        let (b, manifest_b) = generate_set();

        assert_eq!(a.customers.len(), b.customers.len());
        for (x, y) in a.customers.iter().zip(&b.customers) {
            assert_eq!(x.customer_ref, y.customer_ref);
            assert_eq!(x.full_name, y.full_name);
            assert_eq!(x.onboarded_date, y.onboarded_date);
        }
        assert_eq!(manifest_a.to_json().unwrap(), manifest_b.to_json().unwrap());
    }

    #[test]
    fn test_lifecycle_dates_are_ordered() {
        let (set, _) = generate_set();

        for customer in &set.customers {
            if let Some(closed) = customer.closed_date {
                assert!(closed >= customer.onboarded_date, "{}", customer.customer_ref);
            }
            if let Some(kyc_date) = customer.kyc_verified_date {
                assert!(kyc_date >= customer.onboarded_date);
            }
        }
    }

    #[test]
    fn test_business_customers_have_company_fields() {
        let (set, _) = generate_set();

        for customer in set.customers.iter().filter(|c| c.customer_type == CustomerType::Business) {
            assert!(customer.company_name.is_some());
            assert!(customer.company_reg_number.is_some());
            assert!(customer.ni_number.is_none());
            assert!(customer.date_of_birth.is_none());
        }
    }

    #[test]
    fn test_snapshot_trail_starts_at_onboarding() {
        let (set, _) = generate_set();

        for customer in &set.customers {
            let trail: Vec<&CustomerSnapshot> = set
                .snapshots
                .iter()
                .filter(|s| s.customer_id == customer.customer_id)
                .collect();
            assert!(!trail.is_empty());
            assert_eq!(trail[0].as_of_date, customer.onboarded_date);
            for pair in trail.windows(2) {
                assert!(pair[0].as_of_date < pair[1].as_of_date, "snapshots must be ordered");
            }
        }
    }

    #[test]
    fn test_some_customers_have_amendments() {
        let (set, _) = generate_set();

        let amended = set
            .customers
            .iter()
            .filter(|c| {
                set.snapshots
                    .iter()
                    .filter(|s| s.customer_id == c.customer_id)
                    .count()
                    > 1
            })
            .count();
        assert!(amended > 0, "amendment_ratio should produce some multi-snapshot customers");
    }
}
