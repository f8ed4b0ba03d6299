use crate::core::Storage;
use crate::domain::table::{AgeStructureSet, AgeStructureTable, LabeledTable, MigrationTable};
use crate::utils::error::{EtlError, Result};
use serde::Serialize;
use std::io::Write;
use zip::write::{SimpleFileOptions, ZipWriter};

pub const MIGRATION_TABLE_FILE: &str = "mig_table.csv";
pub const AGE_STRUCTURE_DIR: &str = "age_str_tables";
const MIGRATION_CORNER: &str = "destination";
const AGE_STRUCTURE_CORNER: &str = "age_group";

/// "United Kingdom" -> "united_kingdom"
fn file_slug(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

pub fn age_structure_file_name(destination: &str, feature: &str) -> String {
    format!(
        "{}/{}_{}_str_table.csv",
        AGE_STRUCTURE_DIR,
        file_slug(destination),
        file_slug(feature)
    )
}

fn labeled_table_to_csv(corner: &str, table: &LabeledTable) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec![corner.to_string()];
    header.extend(table.columns().iter().cloned());
    writer.write_record(&header)?;

    for (index, label) in table.rows().iter().enumerate() {
        let mut record = vec![label.clone()];
        record.extend(
            table
                .row_values(index)
                .iter()
                .map(|value| value.map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }

    writer
        .into_inner()
        .map_err(|e| EtlError::IoError(e.into_error()))
}

pub fn migration_table_to_csv(table: &MigrationTable) -> Result<Vec<u8>> {
    labeled_table_to_csv(MIGRATION_CORNER, table.table())
}

pub fn age_structure_table_to_csv(table: &AgeStructureTable) -> Result<Vec<u8>> {
    labeled_table_to_csv(AGE_STRUCTURE_CORNER, table.table())
}

/// 讀回匯出的 CSV；空白欄位代表尚未取得的估計值
pub fn read_labeled_table(data: &[u8]) -> Result<LabeledTable> {
    let mut reader = csv::Reader::from_reader(data);
    let columns: Vec<String> = reader.headers()?.iter().skip(1).map(str::to_string).collect();

    let mut rows = Vec::new();
    let mut values = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut fields = record.iter();
        let label = fields.next().ok_or_else(|| EtlError::ValidationError {
            message: "Empty CSV record".to_string(),
        })?;
        rows.push(label.to_string());

        let row = fields
            .map(|field| {
                if field.trim().is_empty() {
                    Ok(None)
                } else {
                    field
                        .trim()
                        .parse::<u64>()
                        .map(Some)
                        .map_err(|e| EtlError::ValidationError {
                            message: format!("Invalid estimate '{}' in row {}: {}", field, label, e),
                        })
                }
            })
            .collect::<Result<Vec<_>>>()?;
        values.push(row);
    }

    LabeledTable::from_values(rows, columns, values)
}

pub fn read_migration_table(data: &[u8]) -> Result<MigrationTable> {
    read_labeled_table(data).map(MigrationTable::from_table)
}

pub fn read_age_structure_table(data: &[u8]) -> Result<AgeStructureTable> {
    read_labeled_table(data).map(AgeStructureTable::from_table)
}

/// Writes tables through a [`Storage`] backend, relative to its base path.
pub struct TableExporter<S: Storage> {
    storage: S,
}

impl<S: Storage> TableExporter<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// 讀回輸出目錄中既有的移民表；檔案不存在時回傳 None
    pub async fn read_previous_migration_table(&self) -> Result<Option<MigrationTable>> {
        match self.storage.read_file(MIGRATION_TABLE_FILE).await {
            Ok(data) => read_migration_table(&data).map(Some),
            Err(EtlError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 寫出移民表。輸出目錄已有移民表時先合併，
    /// 不在這次執行中的目的地與來源國會保留下來
    pub async fn export_migration_table(&self, table: &MigrationTable) -> Result<String> {
        let data = match self.read_previous_migration_table().await? {
            Some(previous) => {
                tracing::info!(
                    "🔀 Merging into existing {} ({} destinations)",
                    MIGRATION_TABLE_FILE,
                    previous.destinations().len()
                );
                migration_table_to_csv(&table.merged_with(&previous))?
            }
            None => migration_table_to_csv(table)?,
        };
        self.storage.write_file(MIGRATION_TABLE_FILE, &data).await?;
        tracing::info!("💾 Migration table written to {}", MIGRATION_TABLE_FILE);
        Ok(MIGRATION_TABLE_FILE.to_string())
    }

    /// One file per (destination, feature) pair.
    pub async fn export_age_structures(&self, set: &AgeStructureSet) -> Result<Vec<String>> {
        let mut written = Vec::with_capacity(set.len());
        for entry in set.entries() {
            let path = age_structure_file_name(&entry.destination, &entry.feature);
            let data = age_structure_table_to_csv(&entry.table)?;
            self.storage.write_file(&path, &data).await?;
            tracing::debug!("Wrote {}", path);
            written.push(path);
        }
        tracing::info!(
            "💾 {} age structure tables written to {}/",
            written.len(),
            AGE_STRUCTURE_DIR
        );
        Ok(written)
    }

    pub async fn write_json<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> Result<String> {
        let data = serde_json::to_vec_pretty(value)?;
        self.storage.write_file(path, &data).await?;
        Ok(path.to_string())
    }

    /// 把已寫出的檔案打包成 ZIP
    pub async fn bundle(&self, files: &[String], archive_name: &str) -> Result<String> {
        tracing::debug!("Creating ZIP file with {} files", files.len());

        let mut contents = Vec::with_capacity(files.len());
        for file in files {
            contents.push((file.as_str(), self.storage.read_file(file).await?));
        }

        let zip_data = {
            let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
            for (name, data) in &contents {
                zip.start_file(*name, SimpleFileOptions::default())?;
                zip.write_all(data)?;
            }
            zip.finish()?.into_inner()
        };

        tracing::debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
        self.storage.write_file(archive_name, &zip_data).await?;
        Ok(archive_name.to_string())
    }
}
