//! The PREWHERE -> WHERE two-phase scan (§4.4.5): read the PREWHERE
//! columns for a mark-range group first, evaluate the PREWHERE
//! expression, and only then read the remaining WHERE/SELECT columns —
//! skipping the read entirely for ranges the PREWHERE filter rejects
//! outright.
//!
//! Blocks are sized by [`AdaptiveBlockSizePredictor`] rather than reading
//! a whole mark-range group as one Block, so memory use for wide tables
//! stays close to a fixed budget.
//!
//! Simplification from the reference engine: a genuine per-row skip
//! (`number_of_rows_to_skip`) seeks within a column file to avoid ever
//! materializing rows already rejected by PREWHERE. That requires a
//! storage backend that can seek to an arbitrary row, not just a mark
//! boundary; the `PartStorage` trait here only grants mark-range
//! granularity. WHERE/SELECT columns are therefore read for the whole
//! mark-range group once PREWHERE has decided the group is worth
//! reading at all, then both column sets are chunked and filtered
//! together. This keeps the adaptive block-size behavior and the
//! constant-false/constant-true/per-row-mask PREWHERE outcomes faithful
//! while dropping only the finest-grained column-skip optimization (see
//! DESIGN.md).

use crucible_block::{Block, Type};
use crucible_errors::Result;
use crucible_types::PartId;

use crate::predictor::AdaptiveBlockSizePredictor;
use crate::storage::PartStorage;
use crate::types::MarkRange;

/// What a filter expression (PREWHERE or WHERE) decided about a Block.
#[derive(Debug, Clone)]
pub enum FilterOutcome {
    /// No row in the Block can match; skip it without reading further
    /// columns.
    AllFalse,
    /// Every row matches; no mask needs to be applied.
    AllTrue,
    /// A boolean mask, one byte per row (`Column::filter`'s convention:
    /// nonzero keeps the row).
    Mask(Vec<u8>),
}

pub trait RowFilter: Send + Sync {
    fn evaluate(&self, block: &Block) -> Result<FilterOutcome>;
}

/// Drives one worker stream's mark-range groups through the two-phase
/// scan, producing filtered Blocks.
pub struct TwoPhaseScan<'a> {
    storage: &'a dyn PartStorage,
    prewhere_columns: Vec<String>,
    where_only_columns: Vec<String>,
    prewhere: Option<&'a dyn RowFilter>,
    where_filter: Option<&'a dyn RowFilter>,
    predictor: AdaptiveBlockSizePredictor,
    pub rows_skipped_by_prewhere: usize,
}

impl<'a> TwoPhaseScan<'a> {
    pub fn new(
        storage: &'a dyn PartStorage,
        prewhere_columns: Vec<String>,
        where_only_columns: Vec<String>,
        prewhere: Option<&'a dyn RowFilter>,
        where_filter: Option<&'a dyn RowFilter>,
        predictor: AdaptiveBlockSizePredictor,
    ) -> Self {
        Self {
            storage,
            prewhere_columns,
            where_only_columns,
            prewhere,
            where_filter,
            predictor,
            rows_skipped_by_prewhere: 0,
        }
    }

    /// Scans one part's mark-range group, returning the Blocks that
    /// survive both filters.
    pub fn scan_group(&mut self, part: &PartId, ranges: &[MarkRange]) -> Result<Vec<Block>> {
        let mut full = Block::new();
        for name in &self.prewhere_columns {
            let ty = self.storage.column_type(part, name)?;
            let column = self.storage.read_column(part, name, ranges)?;
            full.push(name.clone(), ty, column);
        }
        let total_rows = full.num_rows();
        if total_rows == 0 {
            return Ok(Vec::new());
        }

        let outcome = match self.prewhere {
            Some(filter) => filter.evaluate(&full)?,
            None => FilterOutcome::AllTrue,
        };
        if matches!(outcome, FilterOutcome::AllFalse) {
            self.rows_skipped_by_prewhere += total_rows;
            return Ok(Vec::new());
        }

        for name in &self.where_only_columns {
            let ty = self.storage.column_type(part, name)?;
            let column = self.storage.read_column(part, name, ranges)?;
            full.push(name.clone(), ty, column);
        }

        let mut out = Vec::new();
        let mut offset = 0;
        while offset < total_rows {
            let chunk_rows = self.predictor.rows_to_read().min(total_rows - offset);
            let chunk = full.cut(offset, chunk_rows)?;
            let bytes_before = chunk.columns().iter().filter_map(|c| c.column.as_ref()).map(|c| c.byte_size()).sum::<usize>() as u64;

            let chunk_outcome = match &outcome {
                FilterOutcome::Mask(mask) => FilterOutcome::Mask(mask[offset..offset + chunk_rows].to_vec()),
                other => other.clone(),
            };
            let filtered = apply_outcome(&chunk, &chunk_outcome)?;

            let filtered = match self.where_filter {
                Some(filter) => {
                    let where_outcome = filter.evaluate(&filtered)?;
                    apply_outcome(&filtered, &where_outcome)?
                }
                None => filtered,
            };

            self.predictor.update(chunk_rows, bytes_before);
            if filtered.num_rows() > 0 {
                out.push(filtered);
            }
            offset += chunk_rows;
        }
        Ok(out)
    }
}

fn apply_outcome(block: &Block, outcome: &FilterOutcome) -> Result<Block> {
    match outcome {
        FilterOutcome::AllTrue => Ok(block.clone()),
        FilterOutcome::AllFalse => block.filter(&vec![0u8; block.num_rows()], 0),
        FilterOutcome::Mask(mask) => block.filter(mask, -1),
    }
}

pub fn column_types_for<'a>(
    names: impl IntoIterator<Item = &'a str>,
    storage: &dyn PartStorage,
    part: &PartId,
) -> Result<Vec<(String, Type)>> {
    names
        .into_iter()
        .map(|name| Ok((name.to_owned(), storage.column_type(part, name)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryPartStorage;
    use crucible_block::{Column, NumberKind, VectorColumn};

    struct EvenFilter;
    impl RowFilter for EvenFilter {
        fn evaluate(&self, block: &Block) -> Result<FilterOutcome> {
            let column = block.column_at(0)?;
            let mask: Vec<u8> = (0..column.size())
                .map(|row| u8::from(column.get(row).unwrap().as_u64().unwrap() % 2 == 0))
                .collect();
            Ok(FilterOutcome::Mask(mask))
        }
    }

    fn part_storage() -> (InMemoryPartStorage, PartId) {
        let mut storage = InMemoryPartStorage::new();
        let part = PartId("p0".into());
        storage.add_column(
            &part,
            "x",
            Type::Number(NumberKind::UInt32),
            Column::Vector(VectorColumn::UInt32((0..40).collect())),
            10,
        );
        storage.add_column(
            &part,
            "y",
            Type::Number(NumberKind::UInt32),
            Column::Vector(VectorColumn::UInt32((100..140).collect())),
            10,
        );
        (storage, part)
    }

    #[test]
    fn prewhere_mask_filters_rows_before_where_columns_are_used() {
        let (storage, part) = part_storage();
        let filter = EvenFilter;
        let predictor = AdaptiveBlockSizePredictor::new(1 << 20, 1, 1000);
        let mut scan = TwoPhaseScan::new(
            &storage,
            vec!["x".to_owned()],
            vec!["y".to_owned()],
            Some(&filter),
            None,
            predictor,
        );
        let blocks = scan.scan_group(&part, &[MarkRange::new(0, 4)]).unwrap();
        let total_rows: usize = blocks.iter().map(Block::num_rows).sum();
        assert_eq!(total_rows, 20); // half of 40 rows are even
        for block in &blocks {
            for row in 0..block.num_rows() {
                let x = block.column_at(0).unwrap().get(row).unwrap().as_u64().unwrap();
                assert_eq!(x % 2, 0);
            }
        }
    }

    #[test]
    fn all_false_prewhere_skips_the_group_without_reading_where_columns() {
        struct NeverFilter;
        impl RowFilter for NeverFilter {
            fn evaluate(&self, _: &Block) -> Result<FilterOutcome> {
                Ok(FilterOutcome::AllFalse)
            }
        }
        let (storage, part) = part_storage();
        let filter = NeverFilter;
        let predictor = AdaptiveBlockSizePredictor::new(1 << 20, 1, 1000);
        let mut scan = TwoPhaseScan::new(
            &storage,
            vec!["x".to_owned()],
            vec!["y".to_owned()],
            Some(&filter),
            None,
            predictor,
        );
        let blocks = scan.scan_group(&part, &[MarkRange::new(0, 4)]).unwrap();
        assert!(blocks.is_empty());
        assert_eq!(scan.rows_skipped_by_prewhere, 40);
    }

    #[test]
    fn no_prewhere_reads_everything_as_one_pass() {
        let (storage, part) = part_storage();
        let predictor = AdaptiveBlockSizePredictor::new(1 << 20, 1, 1000);
        let mut scan = TwoPhaseScan::new(&storage, vec!["x".to_owned()], vec!["y".to_owned()], None, None, predictor);
        let blocks = scan.scan_group(&part, &[MarkRange::new(0, 4)]).unwrap();
        let total_rows: usize = blocks.iter().map(Block::num_rows).sum();
        assert_eq!(total_rows, 40);
    }
}
