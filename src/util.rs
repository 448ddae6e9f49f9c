use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub const HASH_PREFIX: &str = "sha256:";

pub fn now_utc_string() -> String {
    utc_iso_string(Utc::now())
}

pub fn utc_iso_string(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];

    loop {
        let count = file
            .read(&mut buf)
            .with_context(|| format!("failed to read file for hashing: {}", path.display()))?;
        if count == 0 {
            break;
        }
        hasher.update(&buf[..count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub fn content_hash_file(path: &Path) -> Result<String> {
    Ok(format!("{HASH_PREFIX}{}", sha256_file(path)?))
}

pub fn content_hash_text(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    format!("{HASH_PREFIX}{digest:x}")
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let data = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;

    let mut file = File::create(path)
        .with_context(|| format!("failed to create json file: {}", path.display()))?;
    file.write_all(&data)
        .with_context(|| format!("failed to write json file: {}", path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("failed to finalize json file: {}", path.display()))?;

    Ok(())
}

pub fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

pub fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn content_hash_text_matches_known_digest() {
        assert_eq!(
            content_hash_text("abc"),
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn content_hash_file_hashes_bytes_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.csv");
        fs::write(&path, "abc").expect("write");
        assert_eq!(content_hash_file(&path).expect("hash"), content_hash_text("abc"));
    }

    #[test]
    fn timestamps_use_second_precision_with_z_suffix() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(utc_iso_string(ts), "2024-03-05T07:08:09Z");
    }

    #[test]
    fn display_relative_strips_root_only_when_nested() {
        let root = Path::new("/repo");
        assert_eq!(display_relative(Path::new("/repo/artifacts/run.json"), root), "artifacts/run.json");
        assert_eq!(display_relative(Path::new("/elsewhere/x.csv"), root), "/elsewhere/x.csv");
    }
}
