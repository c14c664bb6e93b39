//! Part selection (§4.4.1): which parts a query needs to touch at all,
//! before any mark-range narrowing happens within a part.
//!
//! A part is excluded outright when the query's condition on the
//! partitioning date column proves no row in `[min_date, max_date]` can
//! match (the `_part` virtual column — letting a query filter by literal
//! part name — is exposed as an ordinary equality check against
//! `PartInfo::name` by the caller building the condition, not modeled
//! separately here).

use crucible_types::PartId;

use crate::mark_ranges::narrow_mark_ranges;
use crate::pk_condition::{part_excluded_by_date, PKCondition};
use crate::types::{PartInfo, PartRanges};

/// Selects the parts that might contain a matching row and narrows each
/// to its candidate mark ranges.
///
/// `date_condition` is consulted against each part's `[min_date,
/// max_date]` span; `None` means the query has no predicate over the
/// date column and every part's dates pass. `pk_condition` narrows marks
/// within each surviving part via its sparse primary-key index.
pub fn select_parts(
    parts: &[PartInfo],
    date_condition: Option<(Option<u16>, Option<u16>)>,
    pk_condition: &PKCondition,
    coarse_index_granularity: usize,
    min_marks_for_seek: usize,
) -> Vec<PartRanges> {
    parts
        .iter()
        .filter(|part| {
            let Some((cond_min, cond_max)) = date_condition else {
                return true;
            };
            !part_excluded_by_date(part.min_date, part.max_date, cond_min, cond_max)
        })
        .filter_map(|part| {
            let ranges = narrow_mark_ranges(
                pk_condition,
                &part.pk_index,
                part.mark_count,
                coarse_index_granularity,
                min_marks_for_seek,
            );
            if ranges.is_empty() {
                None
            } else {
                Some(PartRanges {
                    part: part_id(part),
                    ranges,
                })
            }
        })
        .collect()
}

fn part_id(part: &PartInfo) -> PartId {
    part.name.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_block::Field;

    fn part(name: &str, min_date: u16, max_date: u16, keys: &[u64]) -> PartInfo {
        PartInfo {
            name: PartId(name.to_owned()),
            min_date,
            max_date,
            mark_count: keys.len(),
            pk_index: keys.iter().map(|k| Field::UInt64(*k)).collect(),
        }
    }

    #[test]
    fn parts_entirely_outside_the_date_range_are_excluded() {
        let parts = vec![
            part("old", 1, 10, &[0, 10, 20]),
            part("new", 100, 110, &[0, 10, 20]),
        ];
        let selected = select_parts(&parts, Some((Some(90), None)), &PKCondition::AlwaysTrue, 8, 0);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].part.0, "new");
    }

    #[test]
    fn no_date_condition_keeps_every_part() {
        let parts = vec![part("a", 1, 10, &[0, 10]), part("b", 20, 30, &[0, 10])];
        let selected = select_parts(&parts, None, &PKCondition::AlwaysTrue, 8, 0);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn pk_condition_can_exclude_an_entire_part_by_its_index() {
        let parts = vec![part("a", 1, 10, &[0, 10, 20, 30])];
        let cond = PKCondition::Range {
            min: Some(Field::UInt64(1000)),
            max: Some(Field::UInt64(2000)),
        };
        let selected = select_parts(&parts, None, &cond, 8, 0);
        assert!(selected.is_empty());
    }
}
