use crate::domain::model::{AgeBucket, CountryCode, Gender, OriginCategory};
use crate::domain::table::{CellKey, Segment};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One (destination, segment) pair and the cells still to fetch for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub destination: String,
    pub country: CountryCode,
    pub segment: Segment,
    pub cells: Vec<CellKey>,
}

impl WorkItem {
    /// 失敗時用剩下的格子建立新的工作項目，原本的項目不修改
    pub fn remainder(&self, done: usize) -> Option<WorkItem> {
        if done >= self.cells.len() {
            return None;
        }
        Some(WorkItem {
            destination: self.destination.clone(),
            country: self.country.clone(),
            segment: self.segment.clone(),
            cells: self.cells[done..].to_vec(),
        })
    }

    pub fn label(&self) -> String {
        format!("{} <- {}", self.destination, self.segment.column_label())
    }
}

/// 依序處理的工作佇列；批次迴圈只從前端取出，不在走訪中修改
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkQueue {
    items: VecDeque<WorkItem>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = WorkItem>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }

    /// Migration table work: one cell per origin plus the "Total Population" call,
    /// destination by destination.
    pub fn migration(
        destinations: &[(String, CountryCode)],
        origins: &[OriginCategory],
        ages: AgeBucket,
    ) -> Self {
        let cell = CellKey {
            bucket: ages,
            gender: None,
        };
        let items = destinations.iter().flat_map(|(name, code)| {
            origins
                .iter()
                .map(|origin| Segment::Origin(origin.clone()))
                .chain(std::iter::once(Segment::Total))
                .map(move |segment| WorkItem {
                    destination: name.clone(),
                    country: code.clone(),
                    segment,
                    cells: vec![cell],
                })
        });
        Self::from_items(items)
    }

    /// Age structure work: every bucket x gender per (destination, origin).
    /// With no origins the destination's own population is queued instead.
    pub fn age_structure(
        destinations: &[(String, CountryCode)],
        origins: &[OriginCategory],
        buckets: &[AgeBucket],
    ) -> Self {
        let cells: Vec<CellKey> = Gender::ALL
            .iter()
            .flat_map(|&gender| {
                buckets.iter().map(move |&bucket| CellKey {
                    bucket,
                    gender: Some(gender),
                })
            })
            .collect();

        let segments: Vec<Segment> = if origins.is_empty() {
            vec![Segment::Total]
        } else {
            origins.iter().cloned().map(Segment::Origin).collect()
        };

        let items = destinations.iter().flat_map(|(name, code)| {
            let cells = &cells;
            segments.iter().map(move |segment| WorkItem {
                destination: name.clone(),
                country: code.clone(),
                segment: segment.clone(),
                cells: cells.clone(),
            })
        });
        Self::from_items(items)
    }

    /// 只保留 `keep` 為 true 的格子；格子全被移除的項目一併丟棄
    pub fn retain_cells(&mut self, mut keep: impl FnMut(&WorkItem, &CellKey) -> bool) {
        let items = std::mem::take(&mut self.items);
        self.items = items
            .into_iter()
            .filter_map(|item| {
                let cells: Vec<CellKey> = item
                    .cells
                    .iter()
                    .filter(|cell| keep(&item, *cell))
                    .copied()
                    .collect();
                (!cells.is_empty()).then(|| WorkItem { cells, ..item })
            })
            .collect();
    }

    pub fn pop_front(&mut self) -> Option<WorkItem> {
        self.items.pop_front()
    }

    pub fn push_front(&mut self, item: WorkItem) {
        self.items.push_front(item);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> impl Iterator<Item = &WorkItem> {
        self.items.iter()
    }

    pub fn remaining_calls(&self) -> usize {
        self.items.iter().map(|item| item.cells.len()).sum()
    }

    /// 尚未完成的目的地，依佇列順序、不重複
    pub fn remaining_destinations(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for item in &self.items {
            if !names.contains(&item.destination) {
                names.push(item.destination.clone());
            }
        }
        names
    }

    /// Column labels still pending for `destination` (origins and/or "Total Population").
    pub fn remaining_segments(&self, destination: &str) -> Vec<String> {
        self.items
            .iter()
            .filter(|item| item.destination == destination)
            .map(|item| item.segment.column_label().to_string())
            .collect()
    }
}
