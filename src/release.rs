//! Layout of an unpacked NPPES monthly release.

use crate::{SyncError, SyncResult};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

const DATA_FILE_PREFIX: &str = "npidata_pfile_";

/// `NPPES_Data_Dissemination_<Month>_<Year>` for the release covering `date`.
pub fn release_dir_name(date: NaiveDate) -> String {
    date.format("NPPES_Data_Dissemination_%B_%Y").to_string()
}

/// Find the main provider file (`npidata_pfile_<from>-<to>.csv`) in an
/// unpacked release, skipping the `_fileheader` companion. If several match,
/// the lexicographically last (most recent range) wins.
pub async fn locate_data_file(dir: &Path) -> SyncResult<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut best: Option<PathBuf> = None;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(DATA_FILE_PREFIX)
            || !name.ends_with(".csv")
            || name.contains("fileheader")
        {
            continue;
        }
        let path = entry.path();
        if best.as_ref().map_or(true, |b| path > *b) {
            best = Some(path);
        }
    }

    best.ok_or_else(|| SyncError::DataFileNotFound(dir.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_dir_uses_full_month_name() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 12).unwrap();
        assert_eq!(release_dir_name(date), "NPPES_Data_Dissemination_January_2025");
    }

    #[tokio::test]
    async fn picks_data_file_over_header_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        for name in [
            "npidata_pfile_20050523-20250112.csv",
            "npidata_pfile_20050523-20250112_fileheader.csv",
            "othername_pfile_20050523-20250112.csv",
            "Readme.pdf",
        ] {
            std::fs::write(dir.path().join(name), "NPI\n")?;
        }
        let found = locate_data_file(dir.path()).await?;
        assert_eq!(
            found.file_name().and_then(|s| s.to_str()),
            Some("npidata_pfile_20050523-20250112.csv")
        );
        Ok(())
    }

    #[tokio::test]
    async fn empty_release_is_an_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let err = locate_data_file(dir.path()).await.unwrap_err();
        assert!(matches!(err, SyncError::DataFileNotFound(_)));
        Ok(())
    }
}
