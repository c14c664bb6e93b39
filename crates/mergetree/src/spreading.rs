//! Worker-stream spreading (§4.4.4): divides the mark ranges selected for
//! this replica across a fixed number of worker streams, each one
//! eventually becoming a `Send` iterator of Blocks.
//!
//! Streams are filled from a LIFO work stack (largest ranges first is not
//! required; insertion order from part selection is preserved) so that a
//! single huge part doesn't starve every other stream: once a stream has
//! accumulated `min_marks_per_thread` marks it stops pulling more work,
//! leaving the remainder for the next stream. Parts and ranges below
//! `min_marks_for_concurrent_read` marks are read by a single stream
//! instead of being split further.

use crate::types::{MarkRange, PartRanges};

pub const DEFAULT_MIN_MARKS_FOR_CONCURRENT_READ: usize = 24;

/// One worker stream's share of the work: a sequence of `(part index,
/// mark ranges)` groups to read, in the order they should be read. A
/// group holds more than one range only when the part was small enough
/// to be kept atomic (never split across streams).
pub type StreamPlan = Vec<(usize, Vec<MarkRange>)>;

/// Splits `parts` (indexed 0..N as referenced by `StreamPlan`) across
/// `thread_count` streams.
///
/// `min_marks_for_concurrent_read` below which a part is never split
/// across more than one stream (reading it concurrently isn't worth the
/// seek overhead).
pub fn spread_across_threads(
    parts: &[PartRanges],
    thread_count: usize,
    min_marks_for_concurrent_read: usize,
) -> Vec<StreamPlan> {
    let thread_count = thread_count.max(1);
    let total_marks: usize = parts.iter().map(PartRanges::total_marks).sum();
    if total_marks == 0 {
        return vec![Vec::new(); thread_count];
    }

    let min_marks_per_thread = (total_marks + thread_count - 1) / thread_count;

    // LIFO stack of work items, pushed part-by-part. A part whose total
    // mark count is below the concurrency floor is kept as one atomic
    // group so it can't be split across streams; otherwise each range is
    // its own item.
    let mut stack: Vec<(usize, Vec<MarkRange>)> = Vec::new();
    for (part_index, part) in parts.iter().enumerate() {
        if part.total_marks() < min_marks_for_concurrent_read {
            if !part.ranges.is_empty() {
                stack.push((part_index, part.ranges.clone()));
            }
            continue;
        }
        for range in &part.ranges {
            stack.push((part_index, vec![*range]));
        }
    }
    stack.reverse(); // pop() takes from the end; read parts in their original order first.

    let mut streams: Vec<StreamPlan> = vec![Vec::new(); thread_count];
    let mut stream_marks: Vec<usize> = vec![0; thread_count];
    let mut current = 0;

    while let Some((part_index, ranges)) = stack.pop() {
        // Advance past streams that have already met their floor, unless
        // this is the last stream (it absorbs whatever remains).
        while current + 1 < thread_count && stream_marks[current] >= min_marks_per_thread {
            current += 1;
        }
        stream_marks[current] += ranges.iter().map(MarkRange::mark_count).sum::<usize>();
        streams[current].push((part_index, ranges));
    }

    streams
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_types::PartId;

    fn part(name: &str, ranges: Vec<MarkRange>) -> PartRanges {
        PartRanges {
            part: PartId(name.into()),
            ranges,
        }
    }

    #[test]
    fn single_thread_gets_everything() {
        let parts = vec![part("p0", vec![MarkRange::new(0, 100)])];
        let streams = spread_across_threads(&parts, 1, 24);
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].len(), 1);
    }

    #[test]
    fn work_is_spread_roughly_evenly_across_streams() {
        let parts = vec![
            part("p0", vec![MarkRange::new(0, 40)]),
            part("p1", vec![MarkRange::new(0, 40)]),
            part("p2", vec![MarkRange::new(0, 40)]),
            part("p3", vec![MarkRange::new(0, 40)]),
        ];
        let streams = spread_across_threads(&parts, 4, 24);
        let marks_per_stream: Vec<usize> = streams
            .iter()
            .map(|s| {
                s.iter()
                    .flat_map(|(_, ranges)| ranges.iter().map(MarkRange::mark_count))
                    .sum()
            })
            .collect();
        assert_eq!(marks_per_stream.iter().sum::<usize>(), 160);
        for marks in &marks_per_stream {
            assert!(*marks > 0);
        }
    }

    #[test]
    fn small_parts_are_never_split_across_streams() {
        let parts = vec![part(
            "p0",
            vec![MarkRange::new(0, 5), MarkRange::new(10, 15)],
        )];
        let streams = spread_across_threads(&parts, 4, 24);
        let nonempty = streams.iter().filter(|s| !s.is_empty()).count();
        assert_eq!(nonempty, 1);
    }

    #[test]
    fn no_marks_produces_empty_streams_without_panicking() {
        let streams = spread_across_threads(&[], 4, 24);
        assert_eq!(streams.len(), 4);
        assert!(streams.iter().all(Vec::is_empty));
    }
}
