//! The primary-key condition consulted while narrowing mark ranges
//! (§4.4.1/§4.4.2).
//!
//! The reference implementation's `KeyCondition` builds an RPN over the
//! whole primary key and can refine a hyperrectangle of several leading
//! columns at once. This is scoped to range predicates over the table's
//! leading primary-key column only, combined with `And`/`Or`; that is the
//! case that actually drives mark-range pruning for the workloads in scope
//! (see DESIGN.md).

use std::cmp::Ordering;

use crucible_block::Field;

#[derive(Debug, Clone)]
pub enum PKCondition {
    /// No constraint: every range may contain matching rows.
    AlwaysTrue,
    /// `min <= key <= max`, either bound optionally absent.
    Range {
        min: Option<Field>,
        max: Option<Field>,
    },
    And(Vec<PKCondition>),
    Or(Vec<PKCondition>),
}

impl PKCondition {
    pub fn always_true(&self) -> bool {
        matches!(self, PKCondition::AlwaysTrue)
    }

    pub fn equals(value: Field) -> Self {
        PKCondition::Range {
            min: Some(value.clone()),
            max: Some(value),
        }
    }

    pub fn at_least(value: Field) -> Self {
        PKCondition::Range {
            min: Some(value),
            max: None,
        }
    }

    pub fn at_most(value: Field) -> Self {
        PKCondition::Range {
            min: None,
            max: Some(value),
        }
    }

    /// Whether some row with a primary key in `[left_key, right_key]`
    /// could satisfy this condition. Used when both ends of a mark range
    /// are known (§4.4.2).
    pub fn may_be_true_in_range(&self, left_key: &Field, right_key: &Field) -> bool {
        match self {
            PKCondition::AlwaysTrue => true,
            PKCondition::Range { min, max } => {
                let entirely_above = max
                    .as_ref()
                    .is_some_and(|m| compare(left_key, m) == Ordering::Greater);
                let entirely_below = min
                    .as_ref()
                    .is_some_and(|m| compare(right_key, m) == Ordering::Less);
                !(entirely_above || entirely_below)
            }
            PKCondition::And(parts) => parts
                .iter()
                .all(|p| p.may_be_true_in_range(left_key, right_key)),
            PKCondition::Or(parts) => parts
                .iter()
                .any(|p| p.may_be_true_in_range(left_key, right_key)),
        }
    }

    /// Whether some row with a primary key `>= left_key` could satisfy
    /// this condition. Used for the trailing mark range, where there is
    /// no known upper bound (§4.4.2).
    pub fn may_be_true_after(&self, left_key: &Field) -> bool {
        match self {
            PKCondition::AlwaysTrue => true,
            PKCondition::Range { max, .. } => match max {
                Some(m) => compare(left_key, m) != Ordering::Greater,
                None => true,
            },
            PKCondition::And(parts) => parts.iter().all(|p| p.may_be_true_after(left_key)),
            PKCondition::Or(parts) => parts.iter().any(|p| p.may_be_true_after(left_key)),
        }
    }

    /// Whether a part whose partition date span is `[min_date, max_date]`
    /// can be skipped outright, for a condition over the partitioning
    /// date column (§4.4.1). `None` when this condition says nothing
    /// about dates.
    pub fn date_range(&self) -> Option<(Option<u16>, Option<u16>)> {
        match self {
            PKCondition::Range { min, max } => {
                let as_date = |f: &Field| match f {
                    Field::UInt64(v) => Some(*v as u16),
                    Field::Int64(v) => Some(*v as u16),
                    _ => None,
                };
                Some((min.as_ref().and_then(as_date), max.as_ref().and_then(as_date)))
            }
            _ => None,
        }
    }
}

fn compare(a: &Field, b: &Field) -> Ordering {
    match (a, b) {
        (Field::String(x), Field::String(y)) => x.as_ref().cmp(y.as_ref()),
        _ => as_f64(a).partial_cmp(&as_f64(b)).unwrap_or(Ordering::Equal),
    }
}

fn as_f64(field: &Field) -> f64 {
    match *field {
        Field::UInt64(v) => v as f64,
        Field::Int64(v) => v as f64,
        Field::Float64(v) => v,
        _ => 0.0,
    }
}

/// Whether a part covering `[part_min, part_max]` can be skipped for a
/// date condition over `[cond_min, cond_max]` (either bound optional).
pub fn part_excluded_by_date(
    part_min: u16,
    part_max: u16,
    cond_min: Option<u16>,
    cond_max: Option<u16>,
) -> bool {
    let above = cond_max.is_some_and(|m| part_min > m);
    let below = cond_min.is_some_and(|m| part_max < m);
    above || below
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_true_matches_any_range() {
        let cond = PKCondition::AlwaysTrue;
        assert!(cond.may_be_true_in_range(&Field::UInt64(0), &Field::UInt64(1000)));
    }

    #[test]
    fn range_excludes_marks_entirely_above_or_below() {
        let cond = PKCondition::Range {
            min: Some(Field::UInt64(10)),
            max: Some(Field::UInt64(20)),
        };
        assert!(!cond.may_be_true_in_range(&Field::UInt64(21), &Field::UInt64(30)));
        assert!(!cond.may_be_true_in_range(&Field::UInt64(0), &Field::UInt64(9)));
        assert!(cond.may_be_true_in_range(&Field::UInt64(15), &Field::UInt64(25)));
    }

    #[test]
    fn may_be_true_after_only_checks_the_upper_bound() {
        let cond = PKCondition::at_most(Field::UInt64(10));
        assert!(cond.may_be_true_after(&Field::UInt64(5)));
        assert!(!cond.may_be_true_after(&Field::UInt64(11)));
    }

    #[test]
    fn and_requires_every_branch_to_allow_the_range() {
        let cond = PKCondition::And(vec![
            PKCondition::at_least(Field::UInt64(5)),
            PKCondition::at_most(Field::UInt64(15)),
        ]);
        assert!(cond.may_be_true_in_range(&Field::UInt64(10), &Field::UInt64(12)));
        assert!(!cond.may_be_true_in_range(&Field::UInt64(16), &Field::UInt64(20)));
    }

    #[test]
    fn date_excluded_parts_are_skipped() {
        assert!(part_excluded_by_date(100, 110, Some(111), None));
        assert!(part_excluded_by_date(100, 110, None, Some(99)));
        assert!(!part_excluded_by_date(100, 110, Some(100), Some(110)));
    }
}
