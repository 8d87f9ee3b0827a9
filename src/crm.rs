// CRM source system: interaction history and formal complaints.
// Complaint status is the one mutable field family an event row carries;
// transitions are baked in at generation time as a terminal status plus
// resolution fields.

use crate::context::{date_between, daytime_timestamp, pick, pick_weighted, CountSampler, GenContext, Pence};
use crate::customers::CustomerSet;
use anyhow::Result;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionChannel {
    PhoneInbound,
    PhoneOutbound,
    EmailInbound,
    EmailOutbound,
    BranchVisit,
    Webchat,
    AppMessage,
    Letter,
}

impl InteractionChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionChannel::PhoneInbound => "phone_inbound",
            InteractionChannel::PhoneOutbound => "phone_outbound",
            InteractionChannel::EmailInbound => "email_inbound",
            InteractionChannel::EmailOutbound => "email_outbound",
            InteractionChannel::BranchVisit => "branch_visit",
            InteractionChannel::Webchat => "webchat",
            InteractionChannel::AppMessage => "app_message",
            InteractionChannel::Letter => "letter",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionCategory {
    Enquiry,
    ServiceRequest,
    ProductEnquiry,
    AccountMaintenance,
    Complaint,
    Feedback,
    OutboundCampaign,
}

impl InteractionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionCategory::Enquiry => "enquiry",
            InteractionCategory::ServiceRequest => "service_request",
            InteractionCategory::ProductEnquiry => "product_enquiry",
            InteractionCategory::AccountMaintenance => "account_maintenance",
            InteractionCategory::Complaint => "complaint",
            InteractionCategory::Feedback => "feedback",
            InteractionCategory::OutboundCampaign => "outbound_campaign",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplaintStatus {
    Open,
    Investigating,
    Resolved,
    Closed,
    ReferredToFos,
}

impl ComplaintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintStatus::Open => "open",
            ComplaintStatus::Investigating => "investigating",
            ComplaintStatus::Resolved => "resolved",
            ComplaintStatus::Closed => "closed",
            ComplaintStatus::ReferredToFos => "referred_to_fos",
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            ComplaintStatus::Resolved | ComplaintStatus::Closed | ComplaintStatus::ReferredToFos
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplaintCategory {
    ChargesFees,
    ServiceQuality,
    ProductMisSell,
    Fraud,
    PaymentIssue,
    LendingDecision,
    Other,
}

impl ComplaintCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintCategory::ChargesFees => "charges_fees",
            ComplaintCategory::ServiceQuality => "service_quality",
            ComplaintCategory::ProductMisSell => "product_mis_sell",
            ComplaintCategory::Fraud => "fraud",
            ComplaintCategory::PaymentIssue => "payment_issue",
            ComplaintCategory::LendingDecision => "lending_decision",
            ComplaintCategory::Other => "other",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Interaction {
    pub interaction_id: i64,
    pub contact_id: i64,
    pub customer_id: i64,
    pub interaction_ts: NaiveDateTime,
    pub channel: InteractionChannel,
    pub category: InteractionCategory,
    pub subject: String,
    pub resolved: bool,
    pub handled_by: String,
    pub duration_seconds: Option<i64>,
    pub sentiment_score: f64,
}

#[derive(Debug, Clone)]
pub struct Complaint {
    pub complaint_id: i64,
    pub customer_id: i64,
    pub complaint_date: NaiveDate,
    pub category: ComplaintCategory,
    pub severity: String,
    pub description: String,
    pub root_cause: Option<String>,
    pub status: ComplaintStatus,
    pub resolution_date: Option<NaiveDate>,
    pub compensation_pence: Pence,
    pub fos_referral: bool,
    pub assigned_to: String,
}

#[derive(Debug, Clone)]
pub struct CrmSet {
    pub interactions: Vec<Interaction>,
    pub complaints: Vec<Complaint>,
}

const CHANNELS: &[InteractionChannel] = &[
    InteractionChannel::PhoneInbound,
    InteractionChannel::PhoneOutbound,
    InteractionChannel::EmailInbound,
    InteractionChannel::EmailOutbound,
    InteractionChannel::BranchVisit,
    InteractionChannel::Webchat,
    InteractionChannel::AppMessage,
    InteractionChannel::Letter,
];
const CHANNEL_WEIGHTS: &[f64] = &[0.20, 0.10, 0.15, 0.10, 0.08, 0.15, 0.17, 0.05];

const CATEGORIES: &[InteractionCategory] = &[
    InteractionCategory::Enquiry,
    InteractionCategory::ServiceRequest,
    InteractionCategory::ProductEnquiry,
    InteractionCategory::AccountMaintenance,
    InteractionCategory::Complaint,
    InteractionCategory::Feedback,
    InteractionCategory::OutboundCampaign,
];
const CATEGORY_WEIGHTS: &[f64] = &[0.30, 0.20, 0.15, 0.15, 0.05, 0.05, 0.10];

const SUBJECTS: &[&str] = &[
    "Query about account charges",
    "Card not working abroad",
    "Request to update contact details",
    "Mortgage overpayment question",
    "Mobile app login problem",
    "Savings rate enquiry",
    "Disputed card transaction",
    "Standing order amendment",
    "Statement copy request",
    "Overdraft limit increase",
    "New product information",
    "Branch opening hours",
];

const COMPLAINT_DESCRIPTIONS: &[&str] = &[
    "Customer unhappy with unexpected account fees applied last month.",
    "Payment delayed beyond advertised settlement window.",
    "Customer disputes the outcome of a lending decision.",
    "Branch service fell short of expected standards.",
    "Suspected fraudulent card activity handled poorly.",
    "Mis-sold product concern raised following annual review.",
];

const ROOT_CAUSES: &[&str] = &["process_failure", "system_error", "staff_error", "policy_gap"];

pub fn generate(ctx: &GenContext, customers: &CustomerSet) -> Result<CrmSet> {
    let config = &ctx.config;
    let mut interactions = Vec::new();
    let interaction_count = CountSampler::new(4.0)?;

    for contact in &customers.contacts {
        let customer = match customers.customer(contact.customer_id) {
            Some(c) => c,
            None => continue,
        };
        let mut rng = ctx.stream("crm/interactions", contact.contact_id as u64);

        let window_start = customer.onboarded_date.max(config.txn_date_start);
        let window_end = customer.activity_end(config.txn_date_end);
        if window_start > window_end {
            continue;
        }

        for _ in 0..interaction_count.sample(&mut rng) {
            let date = date_between(&mut rng, window_start, window_end);
            interactions.push(Interaction {
                interaction_id: interactions.len() as i64 + 1,
                contact_id: contact.contact_id,
                customer_id: contact.customer_id,
                interaction_ts: daytime_timestamp(&mut rng, date),
                channel: *pick_weighted(&mut rng, CHANNELS, CHANNEL_WEIGHTS)?,
                category: *pick_weighted(&mut rng, CATEGORIES, CATEGORY_WEIGHTS)?,
                subject: pick(&mut rng, SUBJECTS).to_string(),
                resolved: rng.gen_bool(0.85),
                handled_by: format!("AGENT-{:03}", rng.gen_range(1..50)),
                duration_seconds: rng
                    .gen_bool(0.7)
                    .then(|| rng.gen_range(30..1800)),
                sentiment_score: (rng.gen_range(-50..=100) as f64) / 100.0,
            });
        }
    }

    // Formal complaints for a configured slice of active customers.
    let active_ids = customers.active_customer_ids();
    let n_complaints = (active_ids.len() as f64 * config.complaint_ratio) as usize;
    let mut complaints = Vec::with_capacity(n_complaints);
    let mut rng = ctx.stream("crm/complaints", 0);

    for i in 0..n_complaints {
        let customer_id = *pick(&mut rng, &active_ids);
        let customer = match customers.customer(customer_id) {
            Some(c) => c,
            None => continue,
        };
        let window_start = customer.onboarded_date.max(config.txn_date_start);
        let complaint_date = date_between(&mut rng, window_start, config.txn_date_end);

        let status = *pick_weighted(
            &mut rng,
            &[
                ComplaintStatus::Open,
                ComplaintStatus::Investigating,
                ComplaintStatus::Resolved,
                ComplaintStatus::Closed,
                ComplaintStatus::ReferredToFos,
            ],
            &[0.10, 0.15, 0.40, 0.30, 0.05],
        )?;

        complaints.push(Complaint {
            complaint_id: i as i64 + 1,
            customer_id,
            complaint_date,
            category: *pick_weighted(
                &mut rng,
                &[
                    ComplaintCategory::ChargesFees,
                    ComplaintCategory::ServiceQuality,
                    ComplaintCategory::ProductMisSell,
                    ComplaintCategory::Fraud,
                    ComplaintCategory::PaymentIssue,
                    ComplaintCategory::LendingDecision,
                    ComplaintCategory::Other,
                ],
                &[0.25, 0.20, 0.10, 0.10, 0.15, 0.10, 0.10],
            )?,
            severity: pick_weighted(&mut rng, &["low", "medium", "high", "critical"], &[0.30, 0.40, 0.25, 0.05])?
                .to_string(),
            description: pick(&mut rng, COMPLAINT_DESCRIPTIONS).to_string(),
            root_cause: rng.gen_bool(0.8).then(|| pick(&mut rng, ROOT_CAUSES).to_string()),
            status,
            resolution_date: status
                .is_resolved()
                .then(|| complaint_date + Duration::days(rng.gen_range(1..60))),
            compensation_pence: if status.is_resolved() && rng.gen_bool(0.4) {
                rng.gen_range(1_000..50_000)
            } else {
                0
            },
            fos_referral: status == ComplaintStatus::ReferredToFos,
            assigned_to: format!("COMP-{:03}", rng.gen_range(1..15)),
        });
    }

    Ok(CrmSet {
        interactions,
        complaints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::manifest::DefectManifest;
    use crate::customers;

    fn build() -> (GenContext, CustomerSet, CrmSet) {
        let config = GenerationConfig {
            customer_count: 200,
            ..GenerationConfig::default()
        };
        let ctx = GenContext::new(config).unwrap();
        let mut manifest = DefectManifest::new(ctx.config.seed, ctx.config.defects.clone());
        let customer_set = customers::generate(&ctx, &mut manifest).unwrap();
        let crm_set = generate(&ctx, &customer_set).unwrap();
        (ctx, customer_set, crm_set)
    }

    #[test]
    fn test_interactions_respect_customer_lifecycle() {
        let (ctx, customer_set, crm_set) = build();

        for interaction in &crm_set.interactions {
            let customer = customer_set.customer(interaction.customer_id).unwrap();
            let date = interaction.interaction_ts.date();
            assert!(date >= customer.onboarded_date);
            assert!(date <= customer.activity_end(ctx.config.txn_date_end));
        }
    }

    #[test]
    fn test_complaint_count_follows_ratio() {
        let (ctx, customer_set, crm_set) = build();

        let expected =
            (customer_set.active_customer_ids().len() as f64 * ctx.config.complaint_ratio) as usize;
        assert_eq!(crm_set.complaints.len(), expected);
    }

    #[test]
    fn test_resolved_complaints_have_resolution_fields() {
        let (_, _, crm_set) = build();

        for complaint in &crm_set.complaints {
            assert_eq!(complaint.status.is_resolved(), complaint.resolution_date.is_some());
            if complaint.compensation_pence > 0 {
                assert!(complaint.status.is_resolved());
            }
            if let Some(resolved) = complaint.resolution_date {
                assert!(resolved > complaint.complaint_date);
            }
            assert_eq!(
                complaint.fos_referral,
                complaint.status == ComplaintStatus::ReferredToFos
            );
        }
    }

    #[test]
    fn test_sentiment_scores_in_range() {
        let (_, _, crm_set) = build();

        for interaction in &crm_set.interactions {
            assert!((-0.5..=1.0).contains(&interaction.sentiment_score));
        }
    }
}
