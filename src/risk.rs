// Risk engine source system: credit score history and AML monitoring alerts.

use crate::context::{date_between, pick, pick_weighted, GenContext, Pence};
use crate::customers::CustomerSet;
use anyhow::Result;
use chrono::{Duration, NaiveDate};
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBand {
    VeryPoor,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl ScoreBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreBand::VeryPoor => "very_poor",
            ScoreBand::Poor => "poor",
            ScoreBand::Fair => "fair",
            ScoreBand::Good => "good",
            ScoreBand::Excellent => "excellent",
        }
    }

    pub fn from_score(score: i32) -> Self {
        match score {
            ..=299 => ScoreBand::VeryPoor,
            300..=499 => ScoreBand::Poor,
            500..=649 => ScoreBand::Fair,
            650..=799 => ScoreBand::Good,
            _ => ScoreBand::Excellent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertType {
    UnusualVolume,
    RapidMovement,
    HighRiskCountry,
    StructuringPattern,
    DormantActivation,
    CashIntensive,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::UnusualVolume => "unusual_volume",
            AlertType::RapidMovement => "rapid_movement",
            AlertType::HighRiskCountry => "high_risk_country",
            AlertType::StructuringPattern => "structuring_pattern",
            AlertType::DormantActivation => "dormant_activation",
            AlertType::CashIntensive => "cash_intensive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    Open,
    Investigating,
    Closed,
    Escalated,
    SarFiled,
    FalsePositive,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "open",
            AlertStatus::Investigating => "investigating",
            AlertStatus::Closed => "closed",
            AlertStatus::Escalated => "escalated",
            AlertStatus::SarFiled => "sar_filed",
            AlertStatus::FalsePositive => "false_positive",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AlertStatus::Closed | AlertStatus::SarFiled | AlertStatus::FalsePositive
        )
    }
}

#[derive(Debug, Clone)]
pub struct CreditScore {
    pub score_id: i64,
    pub customer_id: i64,
    pub score_date: NaiveDate,
    pub score_value: i32,
    pub score_band: ScoreBand,
    pub model_name: String,
    pub model_version: String,
    pub is_current: bool,
}

#[derive(Debug, Clone)]
pub struct AmlAlert {
    pub alert_id: i64,
    pub customer_id: i64,
    pub alert_date: NaiveDate,
    pub alert_type: AlertType,
    pub rule_id: String,
    pub risk_score: i32,
    pub trigger_amount_pence: Pence,
    pub status: AlertStatus,
    pub resolution_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct RiskSet {
    pub credit_scores: Vec<CreditScore>,
    pub aml_alerts: Vec<AmlAlert>,
}

const ALERT_TYPES: &[AlertType] = &[
    AlertType::UnusualVolume,
    AlertType::RapidMovement,
    AlertType::HighRiskCountry,
    AlertType::StructuringPattern,
    AlertType::DormantActivation,
    AlertType::CashIntensive,
];

const ALERT_STATUSES: &[AlertStatus] = &[
    AlertStatus::Open,
    AlertStatus::Investigating,
    AlertStatus::Closed,
    AlertStatus::Escalated,
    AlertStatus::SarFiled,
    AlertStatus::FalsePositive,
];
const ALERT_STATUS_WEIGHTS: &[f64] = &[0.15, 0.10, 0.35, 0.05, 0.05, 0.30];

pub fn generate(ctx: &GenContext, customers: &CustomerSet) -> Result<RiskSet> {
    let config = &ctx.config;
    let mut credit_scores = Vec::new();
    let mut score_ids = 0i64;

    // Score history per active customer: one to three quarterly observations,
    // only the latest flagged current. Review dates never precede onboarding.
    for &customer_id in &customers.active_customer_ids() {
        let customer = match customers.customer(customer_id) {
            Some(c) => c,
            None => continue,
        };
        let mut rng = ctx.stream("risk/scores", customer_id as u64);
        let n_scores = rng.gen_range(1..=3usize);
        let mut score = 650 + rng.gen_range(-150..150);

        let mut review_dates: Vec<NaiveDate> = (0..n_scores)
            .map(|i| {
                let months_back = ((n_scores - 1 - i) * 3) as i64;
                (config.txn_date_end - Duration::days(months_back * 30 + 30))
                    .max(customer.onboarded_date)
            })
            .collect();
        review_dates.dedup();

        let n_kept = review_dates.len();
        for (i, score_date) in review_dates.into_iter().enumerate() {
            score_ids += 1;
            score = (score + rng.gen_range(-40..=40)).clamp(0, 999);

            credit_scores.push(CreditScore {
                score_id: score_ids,
                customer_id,
                score_date,
                score_value: score,
                score_band: ScoreBand::from_score(score),
                model_name: "PCB_SCORE_V3".to_string(),
                model_version: "3.2.1".to_string(),
                is_current: i == n_kept - 1,
            });
        }
    }

    // AML alerts for a configured slice of active customers.
    let active_ids = customers.active_customer_ids();
    let n_alerts = (active_ids.len() as f64 * config.aml_alert_ratio) as usize;
    let mut aml_alerts = Vec::with_capacity(n_alerts);
    let mut rng = ctx.stream("risk/aml", 0);

    for i in 0..n_alerts {
        let customer_id = *pick(&mut rng, &active_ids);
        let customer = match customers.customer(customer_id) {
            Some(c) => c,
            None => continue,
        };
        let window_start = customer.onboarded_date.max(config.txn_date_start);
        let alert_date = date_between(&mut rng, window_start, config.txn_date_end);
        let status = *pick_weighted(&mut rng, ALERT_STATUSES, ALERT_STATUS_WEIGHTS)?;

        aml_alerts.push(AmlAlert {
            alert_id: i as i64 + 1,
            customer_id,
            alert_date,
            alert_type: *pick(&mut rng, ALERT_TYPES),
            rule_id: format!("TM-R{:03}", rng.gen_range(1..40)),
            risk_score: rng.gen_range(10..=100),
            trigger_amount_pence: rng.gen_range(50_000..5_000_000),
            status,
            resolution_date: status
                .is_terminal()
                .then(|| alert_date + Duration::days(rng.gen_range(1..45))),
        });
    }

    Ok(RiskSet {
        credit_scores,
        aml_alerts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::manifest::DefectManifest;
    use crate::customers;
    use std::collections::HashMap;

    fn build() -> (GenContext, CustomerSet, RiskSet) {
        let config = GenerationConfig {
            customer_count: 200,
            ..GenerationConfig::default()
        };
        let ctx = GenContext::new(config).unwrap();
        let mut manifest = DefectManifest::new(ctx.config.seed, ctx.config.defects.clone());
        let customer_set = customers::generate(&ctx, &mut manifest).unwrap();
        let risk_set = generate(&ctx, &customer_set).unwrap();
        (ctx, customer_set, risk_set)
    }

    #[test]
    fn test_exactly_one_current_score_per_customer() {
        let (_, customer_set, risk_set) = build();

        let mut current_counts: HashMap<i64, usize> = HashMap::new();
        for score in &risk_set.credit_scores {
            if score.is_current {
                *current_counts.entry(score.customer_id).or_default() += 1;
            }
        }

        for customer_id in customer_set.active_customer_ids() {
            assert_eq!(current_counts.get(&customer_id), Some(&1));
        }
    }

    #[test]
    fn test_score_bands_match_values() {
        let (_, _, risk_set) = build();

        for score in &risk_set.credit_scores {
            assert!((0..=999).contains(&score.score_value));
            assert_eq!(score.score_band.as_str(), ScoreBand::from_score(score.score_value).as_str());
        }
    }

    #[test]
    fn test_score_history_is_date_ordered() {
        let (_, _, risk_set) = build();

        let mut by_customer: HashMap<i64, Vec<&CreditScore>> = HashMap::new();
        for score in &risk_set.credit_scores {
            by_customer.entry(score.customer_id).or_default().push(score);
        }
        for trail in by_customer.values() {
            for pair in trail.windows(2) {
                assert!(pair[0].score_date < pair[1].score_date);
            }
            assert!(trail.last().unwrap().is_current);
        }
    }

    #[test]
    fn test_terminal_alerts_have_resolution_dates() {
        let (_, _, risk_set) = build();

        assert!(!risk_set.aml_alerts.is_empty());
        for alert in &risk_set.aml_alerts {
            assert_eq!(alert.status.is_terminal(), alert.resolution_date.is_some());
            assert!((10..=100).contains(&alert.risk_score));
        }
    }
}
