use crate::domain::model::{AgeBucket, Gender, OriginCategory, ReachEstimate};
use crate::utils::error::{EtlError, Result};
use serde::{Deserialize, Serialize};

pub const TOTAL_POPULATION: &str = "Total Population";

/// 一個目的地底下要估計的族群：某個來源國的 expats，或整個目的地人口
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Segment {
    Origin(OriginCategory),
    Total,
}

impl Segment {
    pub fn origin(&self) -> Option<&OriginCategory> {
        match self {
            Segment::Origin(origin) => Some(origin),
            Segment::Total => None,
        }
    }

    /// Column label in the migration table.
    pub fn column_label(&self) -> &str {
        match self {
            Segment::Origin(origin) => &origin.country,
            Segment::Total => TOTAL_POPULATION,
        }
    }
}

/// One estimate cell inside a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellKey {
    pub bucket: AgeBucket,
    pub gender: Option<Gender>,
}

/// Receives every successful estimate from the batch loop.
pub trait EstimateSink {
    fn record(
        &mut self,
        destination: &str,
        segment: &Segment,
        cell: &CellKey,
        estimate: ReachEstimate,
    ) -> Result<()>;
}

/// 二維表：列、欄皆有標籤，尚未取得的格子為 None
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledTable {
    rows: Vec<String>,
    columns: Vec<String>,
    values: Vec<Vec<Option<u64>>>,
}

impl LabeledTable {
    pub fn new(rows: Vec<String>, columns: Vec<String>) -> Self {
        let values = vec![vec![None; columns.len()]; rows.len()];
        Self {
            rows,
            columns,
            values,
        }
    }

    /// Rebuild a table from parsed rows. Every row must have one value per column.
    pub fn from_values(
        rows: Vec<String>,
        columns: Vec<String>,
        values: Vec<Vec<Option<u64>>>,
    ) -> Result<Self> {
        if values.len() != rows.len() || values.iter().any(|row| row.len() != columns.len()) {
            return Err(EtlError::ValidationError {
                message: format!(
                    "Table shape mismatch: {} row labels, {} columns",
                    rows.len(),
                    columns.len()
                ),
            });
        }
        Ok(Self {
            rows,
            columns,
            values,
        })
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn position(&self, row: &str, column: &str) -> Option<(usize, usize)> {
        let r = self.rows.iter().position(|label| label == row)?;
        let c = self.columns.iter().position(|label| label == column)?;
        Some((r, c))
    }

    pub fn get(&self, row: &str, column: &str) -> Option<ReachEstimate> {
        let (r, c) = self.position(row, column)?;
        self.values[r][c].map(ReachEstimate)
    }

    pub fn set(&mut self, row: &str, column: &str, estimate: ReachEstimate) -> Result<()> {
        let (r, c) = self
            .position(row, column)
            .ok_or_else(|| EtlError::ProcessingError {
                message: format!("No cell ({}, {}) in table", row, column),
            })?;
        self.values[r][c] = Some(estimate.users());
        Ok(())
    }

    pub fn row_values(&self, row: usize) -> &[Option<u64>] {
        &self.values[row]
    }

    pub fn filled_cells(&self) -> usize {
        self.values.iter().flatten().filter(|v| v.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.filled_cells() == self.rows.len() * self.columns.len()
    }

    /// 用先前的表格補上本表空白的格子，回傳補上的格數
    pub fn fill_missing_from(&mut self, previous: &LabeledTable) -> usize {
        let mut filled = 0;
        for (r, row) in self.rows.iter().enumerate() {
            for (c, column) in self.columns.iter().enumerate() {
                if self.values[r][c].is_none() {
                    if let Some(estimate) = previous.get(row, column) {
                        self.values[r][c] = Some(estimate.users());
                        filled += 1;
                    }
                }
            }
        }
        filled
    }

    /// Union of both tables on the given labels; cells from `self` win.
    fn merged_on(
        &self,
        previous: &LabeledTable,
        rows: Vec<String>,
        columns: Vec<String>,
    ) -> LabeledTable {
        let values = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|column| {
                        self.get(row, column)
                            .or_else(|| previous.get(row, column))
                            .map(|estimate| estimate.users())
                    })
                    .collect()
            })
            .collect();
        LabeledTable {
            rows,
            columns,
            values,
        }
    }
}

/// 先保留 `first` 的順序，再接上 `second` 中新出現的標籤
fn union_labels(first: &[String], second: &[String]) -> Vec<String> {
    let mut labels = first.to_vec();
    labels.extend(second.iter().filter(|label| !first.contains(label)).cloned());
    labels
}

/// Destinations x (origins + "Total Population").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationTable {
    table: LabeledTable,
}

impl MigrationTable {
    pub fn new(destinations: Vec<String>, origins: Vec<String>) -> Self {
        let mut columns = origins;
        columns.push(TOTAL_POPULATION.to_string());
        Self {
            table: LabeledTable::new(destinations, columns),
        }
    }

    pub fn from_table(table: LabeledTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &LabeledTable {
        &self.table
    }

    pub fn destinations(&self) -> &[String] {
        self.table.rows()
    }

    pub fn get(&self, destination: &str, column: &str) -> Option<ReachEstimate> {
        self.table.get(destination, column)
    }

    pub fn total_population(&self, destination: &str) -> Option<ReachEstimate> {
        self.table.get(destination, TOTAL_POPULATION)
    }

    pub fn is_complete(&self) -> bool {
        self.table.is_complete()
    }

    pub fn fill_missing_from(&mut self, previous: &MigrationTable) -> usize {
        self.table.fill_missing_from(&previous.table)
    }

    /// 與先前匯出的表格合併：對方獨有的目的地與來源國都保留，
    /// 同一格兩邊都有值時以本表為準。"Total Population" 固定在最後一欄。
    pub fn merged_with(&self, previous: &MigrationTable) -> MigrationTable {
        let rows = union_labels(previous.table.rows(), self.table.rows());
        let mut columns: Vec<String> =
            union_labels(previous.table.columns(), self.table.columns())
                .into_iter()
                .filter(|column| column != TOTAL_POPULATION)
                .collect();
        columns.push(TOTAL_POPULATION.to_string());
        Self {
            table: self.table.merged_on(&previous.table, rows, columns),
        }
    }
}

impl EstimateSink for MigrationTable {
    fn record(
        &mut self,
        destination: &str,
        segment: &Segment,
        _cell: &CellKey,
        estimate: ReachEstimate,
    ) -> Result<()> {
        self.table
            .set(destination, segment.column_label(), estimate)
    }
}

/// Age buckets x genders for one population.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgeStructureTable {
    table: LabeledTable,
}

impl AgeStructureTable {
    pub fn new(buckets: &[AgeBucket]) -> Self {
        let rows = buckets.iter().map(AgeBucket::label).collect();
        let columns = Gender::ALL.iter().map(|g| g.label().to_string()).collect();
        Self {
            table: LabeledTable::new(rows, columns),
        }
    }

    pub fn from_table(table: LabeledTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &LabeledTable {
        &self.table
    }

    pub fn get(&self, bucket: &str, gender: Gender) -> Option<ReachEstimate> {
        self.table.get(bucket, gender.label())
    }

    pub fn is_complete(&self) -> bool {
        self.table.is_complete()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgeStructureEntry {
    pub destination: String,
    /// 來源國名稱；目的地本身的人口表則為目的地名稱
    pub feature: String,
    pub table: AgeStructureTable,
}

/// (destination, feature) -> age structure table, kept in fetch order.
#[derive(Debug, Clone, Default)]
pub struct AgeStructureSet {
    buckets: Vec<AgeBucket>,
    entries: Vec<AgeStructureEntry>,
}

impl AgeStructureSet {
    pub fn new(buckets: Vec<AgeBucket>) -> Self {
        Self {
            buckets,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[AgeStructureEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, destination: &str, feature: &str) -> Option<&AgeStructureTable> {
        self.entries
            .iter()
            .find(|e| e.destination == destination && e.feature == feature)
            .map(|e| &e.table)
    }

    fn entry_mut(&mut self, destination: &str, feature: &str) -> &mut AgeStructureTable {
        let index = match self
            .entries
            .iter()
            .position(|e| e.destination == destination && e.feature == feature)
        {
            Some(index) => index,
            None => {
                self.entries.push(AgeStructureEntry {
                    destination: destination.to_string(),
                    feature: feature.to_string(),
                    table: AgeStructureTable::new(&self.buckets),
                });
                self.entries.len() - 1
            }
        };
        &mut self.entries[index].table
    }
}

impl EstimateSink for AgeStructureSet {
    fn record(
        &mut self,
        destination: &str,
        segment: &Segment,
        cell: &CellKey,
        estimate: ReachEstimate,
    ) -> Result<()> {
        let gender = cell.gender.ok_or_else(|| EtlError::ProcessingError {
            message: format!(
                "Age structure cell for {} is missing a gender",
                destination
            ),
        })?;
        let feature = match segment {
            Segment::Origin(origin) => origin.country.clone(),
            Segment::Total => destination.to_string(),
        };
        self.entry_mut(destination, &feature)
            .table
            .set(&cell.bucket.label(), gender.label(), estimate)
    }
}
