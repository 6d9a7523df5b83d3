use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::error::{Error, Result};

/// One line of a split manifest.
///
/// Rows are header-less: `subject, t1, dwi, b0, cond...`. The `t1` and `b0`
/// columns may be empty when that modality is unused; each image column may
/// list several files separated by `;`, one per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestRow {
    pub subject: String,
    pub t1: Vec<PathBuf>,
    pub dwi: Vec<PathBuf>,
    pub b0: Vec<PathBuf>,
    /// b-value and gradient direction, already scaled.
    pub cond: Vec<f64>,
}

const FIXED_COLUMNS: usize = 4;

/// Reads every row of a manifest file.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestRow>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        rows.push(parse_row(&record).map_err(|reason| Error::Manifest {
            path: path.to_path_buf(),
            reason: format!("row {}: {reason}", line + 1),
        })?);
    }
    Ok(rows)
}

fn parse_row(record: &StringRecord) -> std::result::Result<ManifestRow, String> {
    if record.len() <= FIXED_COLUMNS {
        return Err(format!(
            "expected at least {} columns, found {}",
            FIXED_COLUMNS + 1,
            record.len()
        ));
    }
    let cond = record.iter()
        .skip(FIXED_COLUMNS)
        .map(|v| v.parse::<f64>().map_err(|_| format!("condition value '{v}' is not a number")))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let dwi = split_paths(&record[2]);
    if dwi.is_empty() {
        return Err("dwi column is empty".into());
    }
    Ok(ManifestRow {
        subject: record[0].to_string(),
        t1: split_paths(&record[1]),
        dwi,
        b0: split_paths(&record[3]),
        cond,
    })
}

fn split_paths(field: &str) -> Vec<PathBuf> {
    field.split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn manifest(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn reads_rows_with_optional_modalities() {
        let file = manifest(
            "sub-01, t1/01.png, dwi/01_a.png;dwi/01_b.png, , 1.0, 0.0, 0.7, 0.7\n\
             sub-02, t1/02.png, dwi/02.png, b0/02.png, 0.5, 1.0, 0.0, 0.0\n",
        );
        let rows = read_manifest(file.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].subject, "sub-01");
        assert_eq!(rows[0].dwi.len(), 2);
        assert!(rows[0].b0.is_empty());
        assert_eq!(rows[1].b0, vec![PathBuf::from("b0/02.png")]);
        assert_eq!(rows[1].cond, vec![0.5, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn rejects_rows_without_conditions() {
        let file = manifest("sub-01, t1.png, dwi.png, \n");
        assert!(matches!(read_manifest(file.path()), Err(Error::Manifest { .. })));
    }

    #[test]
    fn rejects_non_numeric_conditions() {
        let file = manifest("sub-01, t1.png, dwi.png, , high\n");
        let err = read_manifest(file.path()).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }
}
