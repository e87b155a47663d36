pub mod config;
pub mod error;
pub mod record;
pub mod trial;

pub use config::{ContrastThresholds, HarnessConfig, TrialFileNames};
pub use error::VislabError;
pub use record::{ExecutionRecord, Finding, ImageSize, Rule, Status, TIMEOUT_RETURNCODE};
pub use trial::{resolve_trial_dir, TrialFacets, TrialPaths};

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

pub fn sha256_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// None when nothing is at `path`; read errors on an existing entry still propagate.
pub fn sha256_file_if_exists(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    sha256_file(path).map(Some)
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(".{}.tmp.{}.{}", name, pid, ts));
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn atomic_write_json_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "vislab_core_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        ensure_dir(&dir).expect("scratch dir");
        dir
    }

    #[test]
    fn sha256_bytes_matches_known_vector() {
        assert_eq!(
            sha256_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sha256_file_is_deterministic_and_byte_sensitive() {
        let dir = scratch_dir("digest");
        let path = dir.join("code.py");
        fs::write(&path, b"import matplotlib\n").expect("write");
        let first = sha256_file(&path).expect("hash");
        let second = sha256_file(&path).expect("hash again");
        assert_eq!(first, second);
        assert_eq!(first, sha256_bytes(b"import matplotlib\n"));

        fs::write(&path, b"import matplotlih\n").expect("rewrite");
        let changed = sha256_file(&path).expect("hash changed");
        assert_ne!(first, changed);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn sha256_file_streams_past_buffer_boundary() {
        let dir = scratch_dir("digest_large");
        let path = dir.join("big.bin");
        let bytes: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &bytes).expect("write");
        assert_eq!(sha256_file(&path).expect("hash"), sha256_bytes(&bytes));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn sha256_file_if_exists_returns_none_for_missing_file() {
        let dir = scratch_dir("digest_missing");
        assert_eq!(
            sha256_file_if_exists(&dir.join("chart.png")).expect("no error"),
            None
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn sha256_file_if_exists_propagates_read_errors() {
        let dir = scratch_dir("digest_dir");
        assert!(sha256_file_if_exists(&dir).is_err());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn remove_if_exists_reports_whether_a_file_was_deleted() {
        let dir = scratch_dir("remove");
        let path = dir.join("stdout.txt");
        fs::write(&path, b"x").expect("write");
        assert!(remove_if_exists(&path).expect("remove"));
        assert!(!path.exists());
        assert!(!remove_if_exists(&path).expect("second remove"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn atomic_write_replaces_existing_content() {
        let dir = scratch_dir("atomic");
        let path = dir.join("run.json");
        atomic_write_bytes(&path, b"old").expect("first write");
        atomic_write_json_pretty(&path, &serde_json::json!({"k": 1})).expect("second write");
        let text = fs::read_to_string(&path).expect("read");
        assert!(text.contains("\"k\": 1"));
        let leftovers: Vec<_> = fs::read_dir(&dir)
            .expect("list")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
        let _ = fs::remove_dir_all(dir);
    }
}
