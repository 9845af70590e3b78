#![allow(dead_code)]

use async_compression::tokio::write::GzipEncoder;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub const DB: &str = "NPIDB";
pub const COLL: &str = "NPIDATA";

/// Quoted CSV body with a header row, NPPES style.
pub fn csv_body(header: &[&str], rows: &[Vec<String>]) -> String {
    let quote = |s: &str| format!("\"{}\"", s.replace('"', "\"\""));
    let mut out = header.iter().map(|h| quote(h)).collect::<Vec<_>>().join(",");
    out.push('\n');
    for row in rows {
        out.push_str(&row.iter().map(|v| quote(v)).collect::<Vec<_>>().join(","));
        out.push('\n');
    }
    out
}

pub fn write_csv(dir: &Path, name: &str, header: &[&str], rows: &[Vec<String>]) -> std::io::Result<PathBuf> {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path)?;
    f.write_all(csv_body(header, rows).as_bytes())?;
    Ok(path)
}

pub async fn write_csv_gz(
    dir: &Path,
    name: &str,
    header: &[&str],
    rows: &[Vec<String>],
) -> std::io::Result<PathBuf> {
    let path = dir.join(name);
    let file = tokio::fs::File::create(&path).await?;
    let mut enc = GzipEncoder::new(file);
    enc.write_all(csv_body(header, rows).as_bytes()).await?;
    enc.shutdown().await?;
    Ok(path)
}

/// Rows of (NPI, first name, last name).
pub fn providers(keys: &[&str]) -> Vec<Vec<String>> {
    keys.iter()
        .enumerate()
        .map(|(i, k)| vec![k.to_string(), format!("FIRST{i}"), format!("LAST{i}")])
        .collect()
}

pub const PROVIDER_HEADER: &[&str] = &[
    "NPI",
    "Provider First Name",
    "Provider Last Name (Legal Name)",
];
