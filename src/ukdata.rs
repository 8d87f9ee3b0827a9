// UK-flavoured synthetic value pools and format generators: sort codes,
// account numbers, NI numbers, postcodes, names, counterparties.

use crate::config::SORT_CODES;
use crate::context::pick;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

pub const FIRST_NAMES_MALE: &[&str] = &[
    "James", "Oliver", "George", "Harry", "Jack", "Thomas", "Charlie", "Oscar", "William",
    "Mohammed", "Leo", "Alfie", "Henry", "Joshua", "Daniel", "Samuel", "Edward", "Alexander",
    "David", "Michael", "Robert", "Paul", "Mark", "Andrew", "Stephen", "Ian", "Colin", "Derek",
];

pub const FIRST_NAMES_FEMALE: &[&str] = &[
    "Olivia", "Amelia", "Isla", "Emily", "Ava", "Sophia", "Grace", "Lily", "Freya", "Evie",
    "Charlotte", "Daisy", "Alice", "Florence", "Eleanor", "Hannah", "Lucy", "Sarah", "Emma",
    "Claire", "Karen", "Susan", "Margaret", "Patricia", "Janet", "Helen", "Linda", "Joan",
];

pub const LAST_NAMES: &[&str] = &[
    "Smith", "Jones", "Taylor", "Brown", "Williams", "Wilson", "Johnson", "Davies", "Robinson",
    "Wright", "Thompson", "Evans", "Walker", "White", "Roberts", "Green", "Hall", "Wood",
    "Jackson", "Clarke", "Patel", "Khan", "Lewis", "James", "Phillips", "Mason", "Mitchell",
    "Rose", "Hughes", "Edwards", "Turner", "Murphy", "O'Brien", "Shah", "Begum", "Ali",
];

pub const COMPANY_STEMS: &[&str] = &[
    "Aire Valley", "Calder", "Wharfedale", "Kirkstall", "Roundhay", "Holbeck", "Headingley",
    "Ilkley", "Otley", "Skipton", "Hebden", "Saltaire", "Ribble", "Pendle", "Malham",
    "Swaledale", "Wensley", "Nidd", "Washburn", "Bramhope",
];

pub const COMPANY_SUFFIXES: &[&str] = &[
    "Engineering Ltd", "Consulting Ltd", "Joinery Ltd", "Logistics Ltd", "Foods Ltd",
    "Digital Ltd", "Print Ltd", "Motors Ltd", "Properties Ltd", "Landscapes Ltd",
    "Plumbing & Heating Ltd", "Catering Ltd", "Textiles Ltd", "Builders Ltd",
];

pub const STREETS: &[&str] = &[
    "High Street", "Church Lane", "Station Road", "Victoria Road", "Mill Lane", "The Green",
    "Manor Road", "Park Avenue", "Queens Road", "Albert Street", "Chapel Street", "School Lane",
    "York Road", "New Road", "West Street", "Springfield Road", "Richmond Terrace", "Moor Lane",
];

pub const CITIES: &[&str] = &[
    "Leeds", "Manchester", "Sheffield", "York", "Bradford", "Newcastle", "Carlisle",
    "Harrogate", "Wakefield", "Huddersfield", "Hull", "Durham", "Preston", "Lancaster",
];

pub const COUNTIES: &[&str] = &[
    "West Yorkshire", "North Yorkshire", "South Yorkshire", "Greater Manchester",
    "Tyne and Wear", "Cumbria", "Lancashire", "East Riding of Yorkshire", "County Durham",
];

/// Outward-code letters for generated postcodes, loosely matching the
/// northern footprint of the branch network.
const POSTCODE_AREAS: &[&str] = &["LS", "BD", "S", "YO", "M", "NE", "CA", "HG", "WF", "HD", "HU", "DH", "PR", "LA"];

pub const RETAIL_COUNTERPARTIES: &[&str] = &[
    "Tesco Stores", "Sainsbury's", "ASDA", "Morrisons", "Aldi", "Lidl", "Marks & Spencer",
    "Co-op Food", "Amazon.co.uk", "John Lewis", "Argos", "Currys", "Shell", "BP", "Esso",
    "Costa Coffee", "Greggs", "Pret A Manger", "Nandos", "Deliveroo", "Just Eat", "Uber Eats",
    "Netflix", "Spotify", "Apple", "Sky", "BT", "Virgin Media", "EE", "Vodafone",
    "British Gas", "EDF Energy", "Octopus Energy", "Yorkshire Water", "United Utilities",
    "Council Tax", "HMRC", "DVLA", "Aviva", "Direct Line", "Admiral", "PureGym",
    "Trainline", "National Rail", "Boots Pharmacy",
];

pub const BUSINESS_COUNTERPARTIES: &[&str] = &[
    "HMRC VAT", "HMRC Corporation Tax", "HMRC PAYE", "Companies House", "Business Rates",
    "AWS", "Microsoft Azure", "Google Cloud", "Royal Mail", "DHL", "FedEx",
    "Sage Accounting", "Xero", "QuickBooks", "Worldpay", "Stripe",
];

pub const SALARY_PAYERS: &[&str] = &[
    "Pennine Bank Payroll", "Tesco PLC Payroll", "NHS Trust Payroll", "BT Group Payroll",
    "Unilever Payroll", "Rolls Royce Payroll", "BAE Systems Payroll", "JCB Payroll",
    "Royal Mail Payroll", "Network Rail Payroll", "First Group Payroll", "Asda Stores Payroll",
];

pub const DD_ORIGINATORS: &[(&str, &str)] = &[
    ("British Gas", "SUN-001"),
    ("EDF Energy", "SUN-002"),
    ("Yorkshire Water", "SUN-003"),
    ("Sky TV", "SUN-004"),
    ("BT", "SUN-005"),
    ("Council Tax", "SUN-006"),
    ("HMRC", "SUN-007"),
    ("Netflix", "SUN-008"),
    ("Spotify", "SUN-009"),
    ("Virgin Media", "SUN-010"),
    ("Admiral Insurance", "SUN-011"),
    ("Aviva", "SUN-012"),
    ("PureGym", "SUN-013"),
];

pub fn sort_code(rng: &mut ChaCha8Rng) -> String {
    pick(rng, SORT_CODES).to_string()
}

/// 8-digit UK account number.
pub fn account_number(rng: &mut ChaCha8Rng) -> String {
    format!("{}", rng.gen_range(10_000_000u32..100_000_000))
}

/// National Insurance number, format AB123456C.
pub fn ni_number(rng: &mut ChaCha8Rng) -> String {
    const PREFIX: &[u8] = b"ABCEGHJKLMNPRSTWXYZ";
    const SUFFIX: &[u8] = b"ABCD";
    let p1 = PREFIX[rng.gen_range(0..PREFIX.len())] as char;
    let p2 = PREFIX[rng.gen_range(0..PREFIX.len())] as char;
    let digits = rng.gen_range(100_000u32..1_000_000);
    let suffix = SUFFIX[rng.gen_range(0..SUFFIX.len())] as char;
    format!("{p1}{p2}{digits}{suffix}")
}

/// Outward + inward UK postcode, e.g. "LS12 4QT".
pub fn postcode(rng: &mut ChaCha8Rng) -> String {
    const LETTERS: &[u8] = b"ABDEFGHJLNPQRSTUWXYZ";
    let area = pick(rng, POSTCODE_AREAS);
    let district = rng.gen_range(1..22u8);
    let unit1 = LETTERS[rng.gen_range(0..LETTERS.len())] as char;
    let unit2 = LETTERS[rng.gen_range(0..LETTERS.len())] as char;
    format!("{area}{district} {}{unit1}{unit2}", rng.gen_range(1..10u8))
}

/// UK mobile number.
pub fn phone(rng: &mut ChaCha8Rng) -> String {
    format!("07{:03} {:06}", rng.gen_range(400..1000u32), rng.gen_range(0..1_000_000u32))
}

pub fn street_address(rng: &mut ChaCha8Rng) -> String {
    format!("{} {}", rng.gen_range(1..250u32), pick(rng, STREETS))
}

pub fn company_name(rng: &mut ChaCha8Rng) -> String {
    format!("{} {}", pick(rng, COMPANY_STEMS), pick(rng, COMPANY_SUFFIXES))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    #[test]
    fn test_ni_number_format() {
        let mut rng = rng();
        for _ in 0..100 {
            let ni = ni_number(&mut rng);
            assert_eq!(ni.len(), 9);
            assert!(ni[2..8].chars().all(|c| c.is_ascii_digit()), "bad NI: {ni}");
            assert!(ni.chars().next().unwrap().is_ascii_uppercase());
        }
    }

    #[test]
    fn test_account_number_is_eight_digits() {
        let mut rng = rng();
        for _ in 0..100 {
            let an = account_number(&mut rng);
            assert_eq!(an.len(), 8);
            assert!(an.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_postcode_has_outward_and_inward() {
        let mut rng = rng();
        for _ in 0..100 {
            let pc = postcode(&mut rng);
            let parts: Vec<&str> = pc.split(' ').collect();
            assert_eq!(parts.len(), 2, "bad postcode: {pc}");
            assert_eq!(parts[1].len(), 3);
        }
    }

    #[test]
    fn test_sort_code_comes_from_catalogue() {
        let mut rng = rng();
        for _ in 0..50 {
            let sc = sort_code(&mut rng);
            assert!(SORT_CODES.contains(&sc.as_str()));
        }
    }
}
