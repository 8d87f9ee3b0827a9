use anyhow::{bail, Result};
use std::env;
use std::path::{Path, PathBuf};

use pennine_datagen::{store, GenContext, GenerationConfig, VERSION};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("generate") => run_generate(&args[2..]),
        Some("counts") => run_counts(&args[2..]),
        Some("--version") => {
            println!("pennine-datagen {VERSION}");
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("pennine-datagen {VERSION} — Pennine Community Bank synthetic data environment");
    println!();
    println!("Usage:");
    println!("  pennine-datagen generate [config.json] [db_path] [archive_dir]");
    println!("  pennine-datagen counts <db_path>");
    println!();
    println!("  generate   Build the full dataset (default: pennine_bank.sqlite + ./archive)");
    println!("  counts     Print per-table row counts for an existing database");
}

fn run_generate(args: &[String]) -> Result<()> {
    println!("🏦 PENNINE COMMUNITY BANK — Data Environment Generator");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Configuration errors must surface before any row is written.
    let config = match args.first() {
        Some(path) => GenerationConfig::from_json_file(Path::new(path))?,
        None => {
            let config = GenerationConfig::default();
            config.validate()?;
            config
        }
    };
    println!("\n⚙️  Config: seed={}, {} customers, window {}..{}",
        config.seed, config.customer_count, config.txn_date_start, config.txn_date_end);

    let db_path = args
        .get(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("pennine_bank.sqlite"));
    let archive_dir = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("archive"));

    if db_path.exists() {
        // Partial or stale runs are discarded, never resumed.
        std::fs::remove_file(&db_path)?;
    }

    let ctx = GenContext::new(config)?;
    let mut conn = store::open(&db_path)?;

    println!();
    let outcome = pennine_datagen::run(&ctx, &mut conn, Some(&archive_dir))?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("📋 GENERATION SUMMARY");
    print_counts(&conn)?;
    println!("\n  Defect manifest: {}", outcome.manifest.summary());
    if let Some(summary) = &outcome.export_summary {
        println!("  Archive: {} ({})", summary.archive_dir.display(), summary.summary());
    }
    println!("\n✅ Pennine Community Bank test data environment is ready");

    Ok(())
}

fn run_counts(args: &[String]) -> Result<()> {
    let Some(db_path) = args.first() else {
        bail!("usage: pennine-datagen counts <db_path>");
    };
    let path = Path::new(db_path);
    if !path.exists() {
        bail!("database not found: {db_path}");
    }

    let conn = store::open(path)?;
    print_counts(&conn)?;
    Ok(())
}

fn print_counts(conn: &rusqlite::Connection) -> Result<()> {
    let counts = store::table_counts(conn)?;
    let total: i64 = counts.iter().map(|(_, n)| n).sum();

    for (table, count) in &counts {
        println!("    {table:.<40} {count:>12}");
    }
    println!("    {:.<40} {total:>12}", "TOTAL");
    Ok(())
}
