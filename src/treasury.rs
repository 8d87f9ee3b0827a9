// Treasury source system: daily FX fixes and month-end liquidity positions.
// Rates follow a seeded random walk around fixed anchors, one stream per
// currency pair, so the series replays exactly.

use crate::context::{GenContext, Pence};
use crate::reference::ReferenceData;
use anyhow::Result;
use chrono::NaiveDate;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetClass {
    CashCentralBank,
    Level1Hqla,
    Level2aHqla,
    Level2bHqla,
}

impl AssetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::CashCentralBank => "cash_central_bank",
            AssetClass::Level1Hqla => "level_1_hqla",
            AssetClass::Level2aHqla => "level_2a_hqla",
            AssetClass::Level2bHqla => "level_2b_hqla",
        }
    }

    pub fn haircut(&self) -> f64 {
        match self {
            AssetClass::CashCentralBank | AssetClass::Level1Hqla => 0.0,
            AssetClass::Level2aHqla => 0.15,
            AssetClass::Level2bHqla => 0.50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FxRate {
    pub rate_id: i64,
    pub rate_date: NaiveDate,
    pub base_currency: String,
    pub quote_currency: String,
    pub mid_rate: f64,
    pub bid_rate: f64,
    pub ask_rate: f64,
}

#[derive(Debug, Clone)]
pub struct LiquidityPosition {
    pub position_id: i64,
    pub report_date: NaiveDate,
    pub asset_class: AssetClass,
    pub market_value_pence: Pence,
    pub adjusted_value_pence: Pence,
}

#[derive(Debug, Clone)]
pub struct TreasurySet {
    pub fx_rates: Vec<FxRate>,
    pub liquidity_positions: Vec<LiquidityPosition>,
}

/// (pair, anchor rate, daily volatility)
const CURRENCIES: &[(&str, f64, f64)] = &[
    ("USD", 1.27, 0.004),
    ("EUR", 1.17, 0.003),
    ("JPY", 198.0, 0.006),
    ("CHF", 1.12, 0.003),
    ("AUD", 1.95, 0.005),
];

const ASSET_CLASSES: &[AssetClass] = &[
    AssetClass::CashCentralBank,
    AssetClass::Level1Hqla,
    AssetClass::Level2aHqla,
    AssetClass::Level2bHqla,
];

pub fn generate(ctx: &GenContext, reference: &ReferenceData) -> Result<TreasurySet> {
    let config = &ctx.config;
    let window_days: Vec<NaiveDate> = reference
        .calendar
        .iter()
        .filter(|d| d.date >= config.txn_date_start && d.date <= config.txn_date_end)
        .map(|d| d.date)
        .collect();

    let mut fx_rates = Vec::with_capacity(window_days.len() * CURRENCIES.len());
    let mut rate_ids = 0i64;
    for (pair_index, (quote, anchor, volatility)) in CURRENCIES.iter().enumerate() {
        let mut rng = ctx.stream("treasury/fx", pair_index as u64);
        let mut rate = *anchor;
        for &date in &window_days {
            let drift = 1.0 + (rng.gen_range(-1000..=1000) as f64 / 1000.0) * volatility;
            rate = (rate * drift).max(anchor * 0.8).min(anchor * 1.2);
            let spread = rate * 0.001;
            rate_ids += 1;
            fx_rates.push(FxRate {
                rate_id: rate_ids,
                rate_date: date,
                base_currency: "GBP".to_string(),
                quote_currency: quote.to_string(),
                mid_rate: rate,
                bid_rate: rate - spread,
                ask_rate: rate + spread,
            });
        }
    }

    // Month-end liquidity snapshots over the transaction window.
    let mut liquidity_positions = Vec::new();
    let mut rng = ctx.stream("treasury/liquidity", 0);
    let mut position_ids = 0i64;
    for day in reference.calendar.iter().filter(|d| {
        d.is_month_end && d.date >= config.txn_date_start && d.date <= config.txn_date_end
    }) {
        for asset_class in ASSET_CLASSES {
            let market_value: Pence = rng.gen_range(5_000_000_00..50_000_000_00);
            let adjusted = (market_value as f64 * (1.0 - asset_class.haircut())).round() as Pence;
            position_ids += 1;
            liquidity_positions.push(LiquidityPosition {
                position_id: position_ids,
                report_date: day.date,
                asset_class: *asset_class,
                market_value_pence: market_value,
                adjusted_value_pence: adjusted,
            });
        }
    }

    Ok(TreasurySet {
        fx_rates,
        liquidity_positions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;

    fn build() -> TreasurySet {
        let ctx = GenContext::new(GenerationConfig::default()).unwrap();
        let reference = ReferenceData::load(&ctx).unwrap();
        generate(&ctx, &reference).unwrap()
    }

    #[test]
    fn test_one_rate_per_currency_per_day() {
        let set = build();
        // 184 days (Jul-Dec 2024) x 5 pairs.
        assert_eq!(set.fx_rates.len(), 184 * 5);

        for rate in &set.fx_rates {
            assert!(rate.bid_rate < rate.mid_rate && rate.mid_rate < rate.ask_rate);
        }
    }

    #[test]
    fn test_rates_stay_near_anchor() {
        let set = build();

        for (quote, anchor, _) in CURRENCIES {
            for rate in set.fx_rates.iter().filter(|r| r.quote_currency == *quote) {
                assert!(rate.mid_rate >= anchor * 0.8 && rate.mid_rate <= anchor * 1.2);
            }
        }
    }

    #[test]
    fn test_liquidity_haircuts_applied() {
        let set = build();
        // 6 month-ends x 4 asset classes.
        assert_eq!(set.liquidity_positions.len(), 24);

        for position in &set.liquidity_positions {
            let expected =
                (position.market_value_pence as f64 * (1.0 - position.asset_class.haircut())).round()
                    as Pence;
            assert_eq!(position.adjusted_value_pence, expected);
            assert!(position.adjusted_value_pence <= position.market_value_pence);
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = build();
        let b = build();

        for (x, y) in a.fx_rates.iter().zip(&b.fx_rates) {
            assert_eq!(x.mid_rate, y.mid_rate);
        }
    }
}
