// Reference Data Loader — static lookups every other stage reads.
// Deterministic: the catalogues in config plus the calendar range fully
// determine the rowset. Inconsistent configuration fails here, before any
// entity or event is generated.

use crate::config::{
    BranchType, GlAccountType, ProductCategory, SchemeType, BRANCHES, CHART_OF_ACCOUNTS,
    COST_CENTRES, PAYMENT_SCHEMES, PRODUCTS,
};
use crate::context::{GenContext, Pence};
use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::{BTreeSet, HashMap};

// ============================================================================
// REFERENCE ROW TYPES
// ============================================================================

#[derive(Debug, Clone)]
pub struct ProductRow {
    pub product_id: i64,
    pub code: String,
    pub name: String,
    pub category: ProductCategory,
    pub interest_rate: f64,
    pub currency: String,
    pub min_balance_pence: Pence,
    pub is_active: bool,
    pub launched: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct GlAccountRow {
    pub code: String,
    pub name: String,
    pub account_type: GlAccountType,
    pub subtype: Option<String>,
    pub parent_code: Option<String>,
    pub hierarchy_level: u8,
    pub is_posting_account: bool,
}

#[derive(Debug, Clone)]
pub struct CostCentreRow {
    pub code: String,
    pub name: String,
    pub department: String,
    pub manager: String,
}

#[derive(Debug, Clone)]
pub struct SchemeRow {
    pub scheme_id: i64,
    pub code: String,
    pub name: String,
    pub scheme_type: SchemeType,
    pub max_amount_pence: Option<Pence>,
    pub settlement_cycle: String,
    pub operating_hours: String,
}

#[derive(Debug, Clone)]
pub struct BranchRow {
    pub code: String,
    pub name: String,
    pub region: String,
    pub city: String,
    pub postcode: String,
    pub branch_type: BranchType,
}

#[derive(Debug, Clone)]
pub struct CalendarDay {
    pub date_key: i32,
    pub date: NaiveDate,
    pub day_of_week: u32,
    pub day_name: String,
    pub day_of_month: u32,
    pub day_of_year: u32,
    pub week_of_year: u32,
    pub month_number: u32,
    pub month_name: String,
    pub quarter: u32,
    pub year: i32,
    pub fiscal_year: i32,
    pub fiscal_quarter: u32,
    pub is_weekend: bool,
    pub is_bank_holiday: bool,
    pub is_month_end: bool,
    pub is_quarter_end: bool,
    pub is_year_end: bool,
}

// ============================================================================
// REFERENCE DATA
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub products: Vec<ProductRow>,
    pub chart_of_accounts: Vec<GlAccountRow>,
    pub cost_centres: Vec<CostCentreRow>,
    pub schemes: Vec<SchemeRow>,
    pub branches: Vec<BranchRow>,
    pub calendar: Vec<CalendarDay>,
    products_by_category: HashMap<ProductCategory, Vec<i64>>,
}

impl ReferenceData {
    pub fn load(ctx: &GenContext) -> Result<Self> {
        let mut products = Vec::with_capacity(PRODUCTS.len());
        let mut products_by_category: HashMap<ProductCategory, Vec<i64>> = HashMap::new();

        for (i, (code, name, category, rate, min_balance, launched)) in PRODUCTS.iter().enumerate() {
            let product_id = (i + 1) as i64;
            let launched = NaiveDate::parse_from_str(launched, "%Y-%m-%d")
                .with_context(|| format!("product {code}: bad launch date {launched}"))?;
            products_by_category.entry(*category).or_default().push(product_id);
            products.push(ProductRow {
                product_id,
                code: code.to_string(),
                name: name.to_string(),
                category: *category,
                interest_rate: *rate,
                currency: "GBP".to_string(),
                min_balance_pence: *min_balance,
                is_active: true,
                launched,
            });
        }

        let chart_of_accounts = CHART_OF_ACCOUNTS
            .iter()
            .map(|(code, name, atype, subtype, parent, level)| GlAccountRow {
                code: code.to_string(),
                name: name.to_string(),
                account_type: *atype,
                subtype: subtype.map(str::to_string),
                parent_code: parent.map(str::to_string),
                hierarchy_level: *level,
                is_posting_account: *level >= 2,
            })
            .collect();

        let cost_centres = COST_CENTRES
            .iter()
            .map(|(code, name, dept, mgr)| CostCentreRow {
                code: code.to_string(),
                name: name.to_string(),
                department: dept.to_string(),
                manager: mgr.to_string(),
            })
            .collect();

        let schemes = PAYMENT_SCHEMES
            .iter()
            .enumerate()
            .map(|(i, (code, name, stype, max, settle, hours))| SchemeRow {
                scheme_id: (i + 1) as i64,
                code: code.to_string(),
                name: name.to_string(),
                scheme_type: *stype,
                max_amount_pence: *max,
                settlement_cycle: settle.to_string(),
                operating_hours: hours.to_string(),
            })
            .collect();

        let branches = BRANCHES
            .iter()
            .map(|(code, name, region, city, postcode, btype)| BranchRow {
                code: code.to_string(),
                name: name.to_string(),
                region: region.to_string(),
                city: city.to_string(),
                postcode: postcode.to_string(),
                branch_type: *btype,
            })
            .collect();

        let calendar = build_calendar(ctx.config.calendar_start, ctx.config.calendar_end)?;

        Ok(ReferenceData {
            products,
            chart_of_accounts,
            cost_centres,
            schemes,
            branches,
            calendar,
            products_by_category,
        })
    }

    pub fn products_in(&self, category: ProductCategory) -> Result<&[i64]> {
        self.products_by_category
            .get(&category)
            .map(Vec::as_slice)
            .ok_or_else(|| anyhow!("no products defined for category {}", category.as_str()))
    }

    pub fn product(&self, product_id: i64) -> Result<&ProductRow> {
        self.products
            .iter()
            .find(|p| p.product_id == product_id)
            .ok_or_else(|| anyhow!("unknown product id {product_id}"))
    }

    /// GL codes that journals may post to (leaf level of the hierarchy).
    pub fn posting_codes(&self) -> Vec<&str> {
        self.chart_of_accounts
            .iter()
            .filter(|a| a.is_posting_account)
            .map(|a| a.code.as_str())
            .collect()
    }
}

// ============================================================================
// CALENDAR / UK BANK HOLIDAYS
// ============================================================================

fn build_calendar(start: NaiveDate, end: NaiveDate) -> Result<Vec<CalendarDay>> {
    let mut holidays = BTreeSet::new();
    for year in start.year()..=end.year() {
        holidays.extend(uk_bank_holidays(year)?);
    }

    let mut days = Vec::new();
    let mut d = start;
    while d <= end {
        let is_month_end = (d + Duration::days(1)).month() != d.month();
        let quarter = (d.month() - 1) / 3 + 1;
        days.push(CalendarDay {
            date_key: date_key(d),
            date: d,
            day_of_week: d.weekday().number_from_monday(),
            day_name: d.format("%A").to_string(),
            day_of_month: d.day(),
            day_of_year: d.ordinal(),
            week_of_year: d.iso_week().week(),
            month_number: d.month(),
            month_name: d.format("%B").to_string(),
            quarter,
            year: d.year(),
            fiscal_year: if d.month() >= 4 { d.year() } else { d.year() - 1 },
            fiscal_quarter: ((d.month() as i32 - 4).rem_euclid(12) as u32) / 3 + 1,
            is_weekend: matches!(d.weekday(), Weekday::Sat | Weekday::Sun),
            is_bank_holiday: holidays.contains(&d),
            is_month_end,
            is_quarter_end: is_month_end && matches!(d.month(), 3 | 6 | 9 | 12),
            is_year_end: d.month() == 12 && d.day() == 31,
        });
        d += Duration::days(1);
    }
    Ok(days)
}

pub fn date_key(d: NaiveDate) -> i32 {
    d.year() * 10_000 + d.month() as i32 * 100 + d.day() as i32
}

/// England & Wales bank holidays for one year, computed from the public rule
/// set rather than a hard-coded list. One-off proclaimed holidays (royal
/// events, moved VE days) are out of rule and not modelled.
pub fn uk_bank_holidays(year: i32) -> Result<BTreeSet<NaiveDate>> {
    let mut holidays = BTreeSet::new();

    // New Year's Day, substituted to Monday when it falls on a weekend.
    let new_year = ymd(year, 1, 1)?;
    holidays.insert(roll_forward_to_weekday(new_year, &holidays));

    // Good Friday and Easter Monday from the Easter computus.
    let easter = easter_sunday(year)?;
    holidays.insert(easter - Duration::days(2));
    holidays.insert(easter + Duration::days(1));

    // Early May (first Monday), Spring (last Monday of May),
    // Summer (last Monday of August).
    holidays.insert(first_monday(year, 5)?);
    holidays.insert(last_monday(year, 5)?);
    holidays.insert(last_monday(year, 8)?);

    // Christmas Day and Boxing Day, each substituted forward past weekends
    // and past each other's substitute day.
    let christmas = roll_forward_to_weekday(ymd(year, 12, 25)?, &holidays);
    holidays.insert(christmas);
    let boxing = roll_forward_to_weekday(ymd(year, 12, 26)?, &holidays);
    holidays.insert(boxing);

    Ok(holidays)
}

/// Gregorian Easter Sunday (Meeus/Jones/Butcher algorithm).
fn easter_sunday(year: i32) -> Result<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    ymd(year, month as u32, day as u32)
}

fn first_monday(year: i32, month: u32) -> Result<NaiveDate> {
    let mut d = ymd(year, month, 1)?;
    while d.weekday() != Weekday::Mon {
        d += Duration::days(1);
    }
    Ok(d)
}

fn last_monday(year: i32, month: u32) -> Result<NaiveDate> {
    let first_of_next = if month == 12 {
        ymd(year + 1, 1, 1)?
    } else {
        ymd(year, month + 1, 1)?
    };
    let mut d = first_of_next - Duration::days(1);
    while d.weekday() != Weekday::Mon {
        d -= Duration::days(1);
    }
    Ok(d)
}

/// Substitute-day rule: a holiday falling on a weekend (or on a day already
/// taken by another holiday's substitute) moves to the next free weekday.
fn roll_forward_to_weekday(mut d: NaiveDate, taken: &BTreeSet<NaiveDate>) -> NaiveDate {
    while matches!(d.weekday(), Weekday::Sat | Weekday::Sun) || taken.contains(&d) {
        d += Duration::days(1);
    }
    d
}

fn ymd(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| anyhow!("invalid date {year}-{month:02}-{day:02}"))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;

    fn reference() -> ReferenceData {
        let ctx = GenContext::new(GenerationConfig::default()).unwrap();
        ReferenceData::load(&ctx).unwrap()
    }

    #[test]
    fn test_load_is_deterministic() {
        let a = reference();
        let b = reference();

        assert_eq!(a.products.len(), b.products.len());
        assert_eq!(a.calendar.len(), b.calendar.len());
        for (x, y) in a.products.iter().zip(&b.products) {
            assert_eq!(x.product_id, y.product_id);
            assert_eq!(x.code, y.code);
        }
    }

    #[test]
    fn test_products_grouped_by_category() {
        let reference = reference();

        let currents = reference.products_in(ProductCategory::CurrentAccount).unwrap();
        assert_eq!(currents.len(), 3);
        for pid in currents {
            let product = reference.product(*pid).unwrap();
            assert_eq!(product.category, ProductCategory::CurrentAccount);
        }
    }

    #[test]
    fn test_posting_codes_are_leaf_level() {
        let reference = reference();
        let posting = reference.posting_codes();

        assert!(posting.contains(&"2110"));
        assert!(!posting.contains(&"1000"), "top-level codes must not post");
        assert!(!posting.contains(&"2100"), "level-1 codes must not post");
    }

    #[test]
    fn test_easter_computus_known_dates() {
        assert_eq!(easter_sunday(2024).unwrap(), ymd(2024, 3, 31).unwrap());
        assert_eq!(easter_sunday(2025).unwrap(), ymd(2025, 4, 20).unwrap());
        assert_eq!(easter_sunday(2021).unwrap(), ymd(2021, 4, 4).unwrap());
    }

    #[test]
    fn test_bank_holidays_2024() {
        let holidays = uk_bank_holidays(2024).unwrap();

        assert!(holidays.contains(&ymd(2024, 1, 1).unwrap()));
        assert!(holidays.contains(&ymd(2024, 3, 29).unwrap()), "Good Friday");
        assert!(holidays.contains(&ymd(2024, 4, 1).unwrap()), "Easter Monday");
        assert!(holidays.contains(&ymd(2024, 5, 6).unwrap()), "early May");
        assert!(holidays.contains(&ymd(2024, 5, 27).unwrap()), "spring");
        assert!(holidays.contains(&ymd(2024, 8, 26).unwrap()), "summer");
        assert!(holidays.contains(&ymd(2024, 12, 25).unwrap()));
        assert!(holidays.contains(&ymd(2024, 12, 26).unwrap()));
        assert_eq!(holidays.len(), 8);
    }

    #[test]
    fn test_christmas_substitution_when_weekend() {
        // 2021: 25th Sat, 26th Sun → substitutes Mon 27 and Tue 28.
        let h2021 = uk_bank_holidays(2021).unwrap();
        assert!(h2021.contains(&ymd(2021, 12, 27).unwrap()));
        assert!(h2021.contains(&ymd(2021, 12, 28).unwrap()));
        assert!(!h2021.contains(&ymd(2021, 12, 25).unwrap()));

        // 2022: 25th Sun → Boxing Day Mon 26, Christmas substitute Tue 27.
        let h2022 = uk_bank_holidays(2022).unwrap();
        assert!(h2022.contains(&ymd(2022, 12, 26).unwrap()));
        assert!(h2022.contains(&ymd(2022, 12, 27).unwrap()));
    }

    #[test]
    fn test_calendar_flags() {
        let reference = reference();
        let by_key: std::collections::HashMap<i32, &CalendarDay> =
            reference.calendar.iter().map(|d| (d.date_key, d)).collect();

        let year_end = by_key[&20241231];
        assert!(year_end.is_year_end && year_end.is_quarter_end && year_end.is_month_end);

        let mid_month = by_key[&20240715];
        assert!(!mid_month.is_month_end);
        assert_eq!(mid_month.fiscal_year, 2024);

        let january = by_key[&20250115];
        assert_eq!(january.fiscal_year, 2024, "UK fiscal year starts in April");
        assert_eq!(january.fiscal_quarter, 4);
    }

    #[test]
    fn test_calendar_covers_full_range() {
        let reference = reference();
        // 2020-01-01..2026-12-31 inclusive, with 2020 and 2024 leap years.
        assert_eq!(reference.calendar.len(), 2557);
    }
}
