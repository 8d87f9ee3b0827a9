// Dump Exporter — serializes the populated database to a portable archive
// directory:
//
//   dump.sqlite       clean copy via VACUUM INTO, restores into an empty instance
//   manifest.json     the defect manifest (the only advertised defect record)
//   table_counts.csv  per-table row counts for quick restore verification
//   checksums.txt     SHA-256 of the dump

use crate::manifest::DefectManifest;
use crate::store;
use anyhow::{Context, Result};
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

const DUMP_FILE: &str = "dump.sqlite";
const MANIFEST_FILE: &str = "manifest.json";
const COUNTS_FILE: &str = "table_counts.csv";
const CHECKSUM_FILE: &str = "checksums.txt";
const IO_RETRY_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub archive_dir: PathBuf,
    pub dump_path: PathBuf,
    pub table_count: usize,
    pub total_rows: i64,
    pub checksum: String,
}

impl ExportSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} tables, {} rows, sha256 {}…",
            self.table_count,
            self.total_rows,
            &self.checksum[..12.min(self.checksum.len())]
        )
    }
}

pub fn export(conn: &Connection, manifest: &DefectManifest, out_dir: &Path) -> Result<ExportSummary> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create archive directory {}", out_dir.display()))?;

    // VACUUM INTO refuses to overwrite, so stale or partial dumps (an aborted
    // earlier run, a failed first attempt) are removed before each attempt.
    let dump_path = out_dir.join(DUMP_FILE);
    with_io_retry(|| {
        if dump_path.exists() {
            fs::remove_file(&dump_path).with_context(|| {
                format!("Failed to remove stale dump {}", dump_path.display())
            })?;
        }
        conn.execute("VACUUM INTO ?1", [dump_path.to_string_lossy()])
            .map_err(anyhow::Error::from)
    })
    .context("VACUUM INTO failed")?;

    let manifest_json = manifest.to_json().context("Failed to serialize defect manifest")?;
    with_io_retry(|| {
        fs::write(out_dir.join(MANIFEST_FILE), &manifest_json).map_err(anyhow::Error::from)
    })?;

    let counts = store::table_counts(conn)?;
    write_counts_csv(&out_dir.join(COUNTS_FILE), &counts)?;

    let checksum = sha256_file(&dump_path)?;
    with_io_retry(|| {
        fs::write(
            out_dir.join(CHECKSUM_FILE),
            format!("{checksum}  {DUMP_FILE}\n"),
        )
        .map_err(anyhow::Error::from)
    })?;

    Ok(ExportSummary {
        archive_dir: out_dir.to_path_buf(),
        dump_path,
        table_count: counts.len(),
        total_rows: counts.iter().map(|(_, n)| n).sum(),
        checksum,
    })
}

/// Open an exported dump and return its per-table counts — the check a
/// restore target runs before serving the dataset.
pub fn verify_restore(dump_path: &Path) -> Result<Vec<(String, i64)>> {
    let conn = Connection::open(dump_path)
        .with_context(|| format!("Failed to open dump {}", dump_path.display()))?;
    store::table_counts(&conn)
}

fn write_counts_csv(path: &Path, counts: &[(String, i64)]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(["table", "row_count"])?;
    for (table, count) in counts {
        writer.write_record([table.as_str(), &count.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)
        .with_context(|| format!("Failed to open {} for checksumming", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Bounded retry with backoff for archive I/O; exhausted retries are fatal.
fn with_io_retry<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut delay = Duration::from_millis(100);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < IO_RETRY_ATTEMPTS => {
                eprintln!("  archive write failed (attempt {attempt}): {err:#}");
                thread::sleep(delay);
                delay *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::context::GenContext;
    use crate::manifest::DefectKind;
    use crate::reference::ReferenceData;

    fn populated_db(dir: &Path) -> (Connection, DefectManifest) {
        let ctx = GenContext::new(GenerationConfig::default()).unwrap();
        let reference = ReferenceData::load(&ctx).unwrap();

        let mut conn = store::open(&dir.join("source.sqlite")).unwrap();
        store::setup_schema(&conn).unwrap();
        store::insert_reference(&mut conn, &reference, ctx.config.batch_size).unwrap();

        let mut manifest = DefectManifest::new(ctx.config.seed, ctx.config.defects.clone());
        manifest.record(DefectKind::OrphanAccount, "core_accounts", "1");
        (conn, manifest)
    }

    #[test]
    fn test_export_writes_all_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (conn, manifest) = populated_db(dir.path());

        let archive = dir.path().join("archive");
        let summary = export(&conn, &manifest, &archive).unwrap();

        assert!(archive.join(DUMP_FILE).exists());
        assert!(archive.join(MANIFEST_FILE).exists());
        assert!(archive.join(COUNTS_FILE).exists());
        assert!(archive.join(CHECKSUM_FILE).exists());
        assert_eq!(summary.checksum.len(), 64);
        assert!(summary.total_rows > 0);
    }

    #[test]
    fn test_dump_restores_with_identical_counts() {
        let dir = tempfile::tempdir().unwrap();
        let (conn, manifest) = populated_db(dir.path());

        let archive = dir.path().join("archive");
        let summary = export(&conn, &manifest, &archive).unwrap();

        let restored = verify_restore(&summary.dump_path).unwrap();
        let original = store::table_counts(&conn).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_manifest_roundtrips_through_archive() {
        let dir = tempfile::tempdir().unwrap();
        let (conn, manifest) = populated_db(dir.path());

        let archive = dir.path().join("archive");
        export(&conn, &manifest, &archive).unwrap();

        let raw = fs::read_to_string(archive.join(MANIFEST_FILE)).unwrap();
        let restored = DefectManifest::from_json(&raw).unwrap();
        assert_eq!(restored.to_json().unwrap(), manifest.to_json().unwrap());
    }

    #[test]
    fn test_export_overwrites_stale_dump() {
        let dir = tempfile::tempdir().unwrap();
        let (conn, manifest) = populated_db(dir.path());

        let archive = dir.path().join("archive");
        fs::create_dir_all(&archive).unwrap();
        fs::write(archive.join(DUMP_FILE), b"stale garbage").unwrap();

        let summary = export(&conn, &manifest, &archive).unwrap();
        assert!(summary.total_rows > 0);
        verify_restore(&summary.dump_path).unwrap();
    }
}
