// Generation context — the one object threaded through every pipeline stage.
//
// Holds the validated config and derives all randomness from it. There is no
// process-wide RNG: every stream is keyed by (seed, stage tag, entity index),
// so output is identical regardless of iteration or thread order.

use crate::config::GenerationConfig;
use anyhow::{anyhow, Result};
use chrono::{NaiveDate, NaiveDateTime};
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use statrs::distribution::{LogNormal, Poisson};

/// Monetary amounts are integer minor units (pence). Ledger and balance
/// invariants must hold exactly, which rules out floating point.
pub type Pence = i64;

pub struct GenContext {
    pub config: GenerationConfig,
}

impl GenContext {
    pub fn new(config: GenerationConfig) -> Result<Self> {
        config.validate()?;
        Ok(GenContext { config })
    }

    /// Derive an independent RNG stream for one entity within one stage.
    /// The seed bytes come from SHA-256 over (seed, tag, index), so streams
    /// never collide across stages and never depend on generation order.
    pub fn stream(&self, tag: &str, index: u64) -> ChaCha8Rng {
        let mut hasher = Sha256::new();
        hasher.update(self.config.seed.to_le_bytes());
        hasher.update(tag.as_bytes());
        hasher.update(index.to_le_bytes());
        let digest = hasher.finalize();

        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest);
        ChaCha8Rng::from_seed(seed)
    }
}

/// Sequential id allocator for a single table, owned by the stage that
/// creates the rows. Ids start at 1 to match SQLite rowid conventions.
#[derive(Debug, Default)]
pub struct IdCounter {
    next: i64,
}

impl IdCounter {
    pub fn new() -> Self {
        IdCounter { next: 0 }
    }

    pub fn next_id(&mut self) -> i64 {
        self.next += 1;
        self.next
    }
}

// ============================================================================
// SAMPLING HELPERS
// ============================================================================

/// Log-normal amount sampler in pence, capped. Parameters are in pound-space
/// (mu/sigma of ln(amount in pounds)), matching the per-type amount profiles.
pub struct AmountSampler {
    dist: LogNormal,
    cap: Pence,
}

impl AmountSampler {
    pub fn new(mu: f64, sigma: f64, cap: Pence) -> Result<Self> {
        let dist = LogNormal::new(mu, sigma)
            .map_err(|e| anyhow!("invalid log-normal parameters ({mu}, {sigma}): {e}"))?;
        Ok(AmountSampler { dist, cap })
    }

    pub fn sample(&self, rng: &mut ChaCha8Rng) -> Pence {
        let pounds = self.dist.sample(rng);
        let pence = (pounds * 100.0).round() as Pence;
        pence.clamp(1, self.cap)
    }
}

/// Poisson event-count sampler.
pub struct CountSampler {
    dist: Poisson,
}

impl CountSampler {
    pub fn new(lambda: f64) -> Result<Self> {
        let dist = Poisson::new(lambda)
            .map_err(|e| anyhow!("invalid Poisson rate {lambda}: {e}"))?;
        Ok(CountSampler { dist })
    }

    pub fn sample(&self, rng: &mut ChaCha8Rng) -> usize {
        self.dist.sample(rng) as usize
    }
}

/// Weighted choice over a slice. Weights need not sum to 1.
pub fn pick_weighted<'a, T>(rng: &mut ChaCha8Rng, items: &'a [T], weights: &[f64]) -> Result<&'a T> {
    let index = WeightedIndex::new(weights)
        .map_err(|e| anyhow!("invalid choice weights: {e}"))?;
    Ok(&items[index.sample(rng)])
}

/// Uniform pick from a slice.
pub fn pick<'a, T>(rng: &mut ChaCha8Rng, items: &'a [T]) -> &'a T {
    &items[rng.gen_range(0..items.len())]
}

/// Logical intra-day timestamp: hours cluster around early afternoon.
/// Explicit caller-supplied time — generation never reads the wall clock.
pub fn daytime_timestamp(rng: &mut ChaCha8Rng, date: NaiveDate) -> NaiveDateTime {
    let hour: i32 = 13 + rng.gen_range(-5..=5) + rng.gen_range(-3..=3);
    let hour = hour.clamp(0, 23) as u32;
    let minute = rng.gen_range(0..60u32);
    let second = rng.gen_range(0..60u32);
    // Components are clamped above, so this is always Some.
    date.and_hms_opt(hour, minute, second).unwrap_or_default()
}

/// Uniform date within an inclusive range.
pub fn date_between(rng: &mut ChaCha8Rng, start: NaiveDate, end: NaiveDate) -> NaiveDate {
    let span = (end - start).num_days().max(0);
    start + chrono::Duration::days(rng.gen_range(0..=span))
}

pub fn format_gbp(pence: Pence) -> String {
    let sign = if pence < 0 { "-" } else { "" };
    let abs = pence.abs();
    format!("{}£{}.{:02}", sign, abs / 100, abs % 100)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;

    fn test_ctx() -> GenContext {
        GenContext::new(GenerationConfig::default()).unwrap()
    }

    #[test]
    fn test_streams_are_deterministic() {
        let ctx = test_ctx();

        let a: Vec<u64> = {
            let mut rng = ctx.stream("customers", 7);
            (0..8).map(|_| rng.gen()).collect()
        };
        let b: Vec<u64> = {
            let mut rng = ctx.stream("customers", 7);
            (0..8).map(|_| rng.gen()).collect()
        };

        assert_eq!(a, b, "same (seed, tag, index) must replay identically");
    }

    #[test]
    fn test_streams_are_independent_per_tag_and_index() {
        let ctx = test_ctx();

        let mut by_tag = ctx.stream("customers", 7);
        let mut by_other_tag = ctx.stream("accounts", 7);
        let mut by_other_index = ctx.stream("customers", 8);

        let first: u64 = by_tag.gen();
        assert_ne!(first, by_other_tag.gen::<u64>());
        assert_ne!(first, by_other_index.gen::<u64>());
    }

    #[test]
    fn test_amount_sampler_bounds() {
        let ctx = test_ctx();
        let mut rng = ctx.stream("amounts", 0);
        let sampler = AmountSampler::new(4.0, 0.8, 50_000_00).unwrap();

        for _ in 0..1000 {
            let pence = sampler.sample(&mut rng);
            assert!(pence >= 1 && pence <= 50_000_00);
        }
    }

    #[test]
    fn test_count_sampler_mean_is_plausible() {
        let ctx = test_ctx();
        let mut rng = ctx.stream("counts", 0);
        let sampler = CountSampler::new(12.0).unwrap();

        let total: usize = (0..2000).map(|_| sampler.sample(&mut rng)).sum();
        let mean = total as f64 / 2000.0;
        assert!((mean - 12.0).abs() < 1.0, "Poisson mean drifted: {mean}");
    }

    #[test]
    fn test_date_between_stays_in_range() {
        let ctx = test_ctx();
        let mut rng = ctx.stream("dates", 0);
        let start = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();

        for _ in 0..500 {
            let d = date_between(&mut rng, start, end);
            assert!(d >= start && d <= end);
        }
    }

    #[test]
    fn test_format_gbp() {
        assert_eq!(format_gbp(123_45), "£123.45");
        assert_eq!(format_gbp(-50), "-£0.50");
        assert_eq!(format_gbp(0), "£0.00");
    }

    #[test]
    fn test_id_counter_is_sequential_from_one() {
        let mut counter = IdCounter::new();
        assert_eq!(counter.next_id(), 1);
        assert_eq!(counter.next_id(), 2);
        assert_eq!(counter.next_id(), 3);
    }
}
