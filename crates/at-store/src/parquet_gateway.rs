//! Append-only table storage on Parquet files.
//!
//! Each table is a directory holding a `schema.json` header and one Parquet
//! file per inserted batch. Files are written to a temporary path and renamed
//! into place, so readers never observe a partial batch. Columns added after a
//! file was written read as their type default from that file.
//!
//! A table directory must only be written by one process at a time.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::{WriterProperties, WriterVersion};
use tracing::{debug, trace};

use crate::column::{ColumnHeader, TableHeader};
use crate::error::StoreError;
use crate::gateway::{merge_columns, prepare_batch, StorageGateway};
use crate::query::{execute, Filter, Query};
use crate::row::Row;
use crate::schema::{arrow_schema, batch_to_rows, rows_to_batch};
use crate::SCHEMA_FILENAME;

const PART_PREFIX: &str = "part-";
const PART_EXTENSION: &str = "parquet";

/// Write options for Parquet part files.
#[derive(Debug, Clone)]
pub struct ParquetOptions {
    /// Compression codec.
    pub compression: Compression,

    /// Maximum rows per row group.
    pub row_group_size: usize,
}

impl Default for ParquetOptions {
    fn default() -> Self {
        ParquetOptions {
            compression: Compression::ZSTD(ZstdLevel::try_new(3).unwrap_or_default()),
            row_group_size: 64 * 1024,
        }
    }
}

impl ParquetOptions {
    /// Use snappy compression instead of zstd.
    pub fn with_snappy(mut self) -> Self {
        self.compression = Compression::SNAPPY;
        self
    }

    /// Set custom row group size.
    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }

    fn writer_properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_writer_version(WriterVersion::PARQUET_2_0)
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .set_dictionary_enabled(true)
            .build()
    }
}

/// Column store persisted as Parquet files under a base directory.
#[derive(Debug)]
pub struct ParquetGateway {
    base_dir: PathBuf,
    options: ParquetOptions,
    headers: RwLock<HashMap<String, TableHeader>>,
    next_part: AtomicU64,
}

impl ParquetGateway {
    /// Open a store rooted at `base_dir`, creating the directory if needed.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::with_options(base_dir, ParquetOptions::default())
    }

    pub fn with_options(
        base_dir: impl Into<PathBuf>,
        options: ParquetOptions,
    ) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        let next_part = highest_part_number(&base_dir)?.map_or(0, |n| n + 1);
        debug!(path = %base_dir.display(), next_part, "opened parquet store");
        Ok(ParquetGateway {
            base_dir,
            options,
            headers: RwLock::new(HashMap::new()),
            next_part: AtomicU64::new(next_part),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn table_dir(&self, table: &str) -> PathBuf {
        self.base_dir.join(table)
    }

    fn schema_path(&self, table: &str) -> PathBuf {
        self.table_dir(table).join(SCHEMA_FILENAME)
    }

    fn load_header(&self, table: &str) -> Result<Option<TableHeader>, StoreError> {
        let path = self.schema_path(table);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save_header(&self, header: &TableHeader) -> Result<(), StoreError> {
        let dir = self.table_dir(&header.name);
        fs::create_dir_all(&dir)?;
        let path = dir.join(SCHEMA_FILENAME);
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, serde_json::to_vec_pretty(header)?)?;
        atomic_rename(&temp_path, &path)
    }

    /// Part files of a table in write order.
    pub fn part_files(&self, table: &str) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.table_dir(table);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut parts: Vec<(u64, PathBuf)> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                part_number(&path).map(|n| (n, path))
            })
            .collect();
        parts.sort_by_key(|(n, _)| *n);
        Ok(parts.into_iter().map(|(_, path)| path).collect())
    }

    fn read_rows(&self, header: &TableHeader) -> Result<Vec<Row>, StoreError> {
        let mut rows = Vec::new();
        for path in self.part_files(&header.name)? {
            let file = File::open(&path)?;
            let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
            for batch in reader {
                rows.extend(batch_to_rows(header, &batch?)?);
            }
        }
        trace!(table = %header.name, rows = rows.len(), "read table rows");
        Ok(rows)
    }

    fn write_part(&self, header: &TableHeader, rows: &[Row]) -> Result<PathBuf, StoreError> {
        let number = self.next_part.fetch_add(1, Ordering::SeqCst);
        let dir = self.table_dir(&header.name);
        fs::create_dir_all(&dir)?;

        let output_path = dir.join(format!("{PART_PREFIX}{number:012}.{PART_EXTENSION}"));
        let temp_path = output_path.with_extension("parquet.tmp");

        let batch = rows_to_batch(header, rows)?;
        let file = File::create(&temp_path)?;
        let mut writer = ArrowWriter::try_new(
            file,
            Arc::new(arrow_schema(header)),
            Some(self.options.writer_properties()),
        )?;
        writer.write(&batch)?;
        writer.close()?;

        atomic_rename(&temp_path, &output_path)?;
        Ok(output_path)
    }
}

impl StorageGateway for ParquetGateway {
    fn create_or_sync_table(&self, header: &TableHeader) -> Result<(), StoreError> {
        let mut headers = self.headers.write().map_err(|_| StoreError::LockPoisoned)?;
        let current = match headers.get(&header.name) {
            Some(h) => Some(h.clone()),
            None => self.load_header(&header.name)?,
        };

        let synced = match current {
            Some(mut existing) => {
                let added = merge_columns(&mut existing, &header.columns)?;
                if !added.is_empty() {
                    self.save_header(&existing)?;
                    debug!(table = %header.name, added = added.len(), "synchronized table columns");
                }
                existing
            }
            None => {
                self.save_header(header)?;
                debug!(table = %header.name, columns = header.columns.len(), "created table");
                header.clone()
            }
        };
        headers.insert(header.name.clone(), synced);
        Ok(())
    }

    fn add_column(&self, table: &str, column: &ColumnHeader) -> Result<(), StoreError> {
        let mut headers = self.headers.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut existing = match headers.get(table) {
            Some(h) => h.clone(),
            None => self
                .load_header(table)?
                .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?,
        };
        let added = merge_columns(&mut existing, std::slice::from_ref(column))?;
        if !added.is_empty() {
            self.save_header(&existing)?;
            debug!(table = %table, column = %column.name, "added column");
        }
        headers.insert(table.to_string(), existing);
        Ok(())
    }

    fn insert_batch(
        &self,
        table: &str,
        columns: &[ColumnHeader],
        rows: &[Row],
    ) -> Result<(), StoreError> {
        let header = self.table_header(table)?;
        let prepared = prepare_batch(&header, columns, rows)?;
        if prepared.is_empty() {
            return Ok(());
        }
        let path = self.write_part(&header, &prepared)?;
        trace!(table = %table, rows = prepared.len(), path = %path.display(), "wrote part file");
        Ok(())
    }

    fn select(
        &self,
        table: &str,
        columns: &[ColumnHeader],
        query: &Query,
    ) -> Result<Vec<Row>, StoreError> {
        let header = self.table_header(table)?;
        let rows = self.read_rows(&header)?;
        execute(&header, &rows, columns, query)
    }

    fn count(&self, table: &str, filter: &Filter) -> Result<u64, StoreError> {
        let header = self.table_header(table)?;
        let rows = self.read_rows(&header)?;
        let matched = execute(&header, &rows, &[], &Query::new(filter.clone()))?;
        Ok(matched.len() as u64)
    }

    fn table_header(&self, table: &str) -> Result<TableHeader, StoreError> {
        {
            let headers = self.headers.read().map_err(|_| StoreError::LockPoisoned)?;
            if let Some(header) = headers.get(table) {
                return Ok(header.clone());
            }
        }
        let header = self
            .load_header(table)?
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        let mut headers = self.headers.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(headers
            .entry(table.to_string())
            .or_insert(header)
            .clone())
    }

    fn drop_table(&self, table: &str) -> Result<(), StoreError> {
        let mut headers = self.headers.write().map_err(|_| StoreError::LockPoisoned)?;
        headers.remove(table);
        let dir = self.table_dir(table);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
            debug!(table = %table, "dropped table");
        }
        Ok(())
    }
}

fn part_number(path: &Path) -> Option<u64> {
    if path.extension()?.to_str()? != PART_EXTENSION {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .strip_prefix(PART_PREFIX)?
        .parse()
        .ok()
}

fn highest_part_number(base_dir: &Path) -> Result<Option<u64>, StoreError> {
    let mut highest = None;
    for table_dir in fs::read_dir(base_dir)? {
        let table_dir = table_dir?.path();
        if !table_dir.is_dir() {
            continue;
        }
        for entry in fs::read_dir(&table_dir)? {
            if let Some(n) = part_number(&entry?.path()) {
                highest = highest.max(Some(n));
            }
        }
    }
    Ok(highest)
}

/// Rename a temp file to its final path.
fn atomic_rename(temp_path: &Path, final_path: &Path) -> Result<(), StoreError> {
    fs::rename(temp_path, final_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnType;
    use at_common::{InnerType, Value};
    use tempfile::TempDir;

    fn id_column() -> ColumnHeader {
        ColumnHeader::new("id", ColumnType::scalar(InnerType::Long))
    }

    #[test]
    fn test_options_default_to_zstd() {
        assert!(matches!(
            ParquetOptions::default().compression,
            Compression::ZSTD(_)
        ));
        assert!(matches!(
            ParquetOptions::default().with_snappy().compression,
            Compression::SNAPPY
        ));
    }

    #[test]
    fn test_part_number_parsing() {
        assert_eq!(part_number(Path::new("/x/part-000000000042.parquet")), Some(42));
        assert_eq!(part_number(Path::new("/x/part-000000000042.parquet.tmp")), None);
        assert_eq!(part_number(Path::new("/x/schema.json")), None);
    }

    #[test]
    fn test_each_batch_is_one_file() {
        let dir = TempDir::new().unwrap();
        let gw = ParquetGateway::open(dir.path()).unwrap();
        gw.create_or_sync_table(&TableHeader::new("audit", vec![id_column()]))
            .unwrap();

        let rows: Vec<Row> = (0..3).map(|i| Row::new().with("id", Value::Long(i))).collect();
        gw.insert_batch("audit", &[id_column()], &rows).unwrap();
        gw.insert("audit", &Row::new().with("id", Value::Long(3)))
            .unwrap();
        gw.insert_batch("audit", &[id_column()], &[]).unwrap();

        assert_eq!(gw.part_files("audit").unwrap().len(), 2);
        let ids: Vec<_> = gw
            .select("audit", &[id_column()], &Query::all())
            .unwrap()
            .iter()
            .map(|r| r.scalar("id").cloned())
            .collect();
        assert_eq!(
            ids,
            (0..4).map(|i| Some(Value::Long(i))).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_header_is_persisted() {
        let dir = TempDir::new().unwrap();
        {
            let gw = ParquetGateway::open(dir.path()).unwrap();
            gw.create_or_sync_table(&TableHeader::new("audit", vec![id_column()]))
                .unwrap();
        }
        assert!(dir.path().join("audit").join(SCHEMA_FILENAME).exists());

        let reopened = ParquetGateway::open(dir.path()).unwrap();
        assert_eq!(reopened.table_header("audit").unwrap().columns.len(), 1);
    }
}
