use crate::error::{Result, ServiceError};
use crate::table::{Row, Table};
use csv::{ReaderBuilder, WriterBuilder};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Reads a CSV document: the first record is the header row, every following
/// record is mapped onto it by position.
///
/// An empty document yields an empty table. Records whose length differs from
/// the header row and repeated header names are errors.
pub fn read_table<R: Read>(reader: R, label: &str) -> Result<Table> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();

    let mut seen = HashSet::new();
    for header in &headers {
        if !seen.insert(header.as_str()) {
            return Err(ServiceError::DuplicateColumn {
                dataset: label.to_string(),
                column: header.clone(),
            });
        }
    }

    let mut table = Table::new(headers);
    for record in csv_reader.records() {
        let record = record?;
        let row: Row = table
            .headers()
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.as_str(), v))
            .collect();
        table.push(row);
    }

    debug!(dataset = label, rows = table.len(), "loaded table");
    Ok(table)
}

/// Opens `path` and reads it with [`read_table`].
pub fn load_table(path: &Path) -> Result<Table> {
    let label = path.display().to_string();
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ServiceError::DatasetNotFound(label.clone()),
        _ => ServiceError::Io(e),
    })?;
    read_table(file, &label)
}

/// Replaces `path` with `table`: header row first, then every row in header
/// order. The content goes to a sibling temp file which is renamed over the
/// target once fully written, so readers never observe a partial file.
pub fn write_table_atomic(path: &Path, table: &Table) -> Result<()> {
    let tmp_path = temp_sibling(path)?;
    match write_table(&tmp_path, table)
        .and_then(|_| keep_permissions(path, &tmp_path))
        .and_then(|_| {
            fs::rename(&tmp_path, path).map_err(|e| {
                ServiceError::Io(io::Error::new(
                    e.kind(),
                    format!("renaming {:?} -> {:?}: {}", tmp_path, path, e),
                ))
            })
        }) {
        Ok(()) => {
            debug!(path = %path.display(), rows = table.len(), "replaced table");
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}

fn write_table(path: &Path, table: &Table) -> Result<()> {
    let file = File::create(path).map_err(|e| {
        ServiceError::Io(io::Error::new(
            e.kind(),
            format!("creating {:?}: {}", path, e),
        ))
    })?;
    let mut writer = WriterBuilder::new().from_writer(file);

    if !table.headers().is_empty() {
        writer.write_record(table.headers())?;
    }
    for row in table.rows() {
        writer.write_record(table.record_for(row))?;
    }

    let file = writer.into_inner().map_err(|e| ServiceError::Io(e.into_error()))?;
    file.sync_all()?;
    Ok(())
}

/// Carries the mode of an existing target over to its replacement.
fn keep_permissions(target: &Path, replacement: &Path) -> Result<()> {
    match fs::metadata(target) {
        Ok(meta) => Ok(fs::set_permissions(replacement, meta.permissions())?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ServiceError::Io(e)),
    }
}

fn temp_sibling(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            ServiceError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a file path: {:?}", path),
            ))
        })?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join(format!(".{}.tmp-{}", file_name, Uuid::new_v4())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_single_record() {
        let table = read_table("a,b\n1,2\n".as_bytes(), "inline").unwrap();
        assert_eq!(table.len(), 1);
        let json = serde_json::to_value(&table.rows()[0]).unwrap();
        assert_eq!(json, serde_json::json!({"a": "1", "b": "2"}));
    }

    #[test]
    fn header_only_yields_no_rows() {
        let table = read_table("a,b\n".as_bytes(), "inline").unwrap();
        assert!(table.is_empty());
        assert_eq!(table.headers(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn empty_document_yields_empty_table() {
        let table = read_table("".as_bytes(), "inline").unwrap();
        assert!(table.is_empty());
        assert!(table.headers().is_empty());
    }

    #[test]
    fn short_record_is_rejected() {
        let err = read_table("a,b\n1\n".as_bytes(), "inline").unwrap_err();
        assert!(matches!(err, ServiceError::Csv(_)));
    }

    #[test]
    fn duplicate_header_is_rejected() {
        let err = read_table("a,a\n1,2\n".as_bytes(), "inline").unwrap_err();
        match err {
            ServiceError::DuplicateColumn { column, .. } => assert_eq!(column, "a"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn quoted_cells_keep_commas() {
        let table = read_table("name,city\n\"Doe, Jane\",Oslo\n".as_bytes(), "inline").unwrap();
        assert_eq!(table.rows()[0].get("name"), Some("Doe, Jane"));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let err = load_table(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, ServiceError::DatasetNotFound(_)));
    }

    #[test]
    fn atomic_write_round_trips_and_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "postalCode,neighborhood\n1000,\n").unwrap();

        let mut table = load_table(&path).unwrap();
        table.rows_mut()[0].set("neighborhood", "Centre, North");
        write_table_atomic(&path, &table).unwrap();

        let reloaded = load_table(&path).unwrap();
        assert_eq!(reloaded, table);
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn atomic_write_keeps_header_of_empty_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let table = Table::new(vec!["postalCode".into(), "neighborhood".into()]);
        write_table_atomic(&path, &table).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "postalCode,neighborhood\n");
    }

    #[cfg(unix)]
    #[test]
    fn atomic_write_preserves_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "a\n1\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        let table = load_table(&path).unwrap();
        write_table_atomic(&path, &table).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn path_without_file_name_is_an_io_error() {
        let table = Table::new(vec!["a".into()]);
        match write_table_atomic(Path::new("/"), &table) {
            Err(ServiceError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::InvalidInput),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
