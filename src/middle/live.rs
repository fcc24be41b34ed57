//! Liveness utilities over the instruction stream.
//!
//! Every routine treats the `op1`, `op2`, and destination positions
//! uniformly: there is no distinction between read and write occurrences,
//! and `r0` is tracked like any other name.  The allocators compensate
//! where the distinction matters.
//!
//! Results use insertion-ordered maps.  Key order is first-occurrence order,
//! which the linear-scan allocator depends on when it walks intervals.

use std::cmp::Ordering;

use indexmap::IndexMap;

use crate::common::Id;
use crate::front::Inst;

/// The interval during which a virtual register holds a meaningful value.
///
/// `start` is the index of the first instruction referencing the register;
/// `end` is one *less* than the index of the last reference, so a register
/// referenced exactly once gets `end == start - 1`.  The max-live sweep and
/// the top-down free check (`pos > end`) rely on this convention.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LiveRange {
    pub start: isize,
    pub end: isize,
}

/// Register references of one instruction, in field order (op1, op2, dst).
fn references(inst: Inst) -> impl Iterator<Item = Id> {
    let [op1, op2] = inst.operands();
    [op1, op2, inst.dst()]
        .into_iter()
        .flatten()
        .filter_map(|op| op.reg())
}

/// Number of occurrences of every register reference, keyed in
/// first-occurrence order.  `r0` is counted; callers that need it excluded
/// skip it themselves.
pub fn occurrence_counts(insts: &[Inst]) -> IndexMap<Id, usize> {
    let mut counts = IndexMap::new();
    for &inst in insts {
        for reg in references(inst) {
            *counts.entry(reg).or_insert(0) += 1;
        }
    }
    counts
}

/// Registers ranked by descending occurrence count; ties keep
/// first-occurrence order.
pub fn ranked_by_count(counts: &IndexMap<Id, usize>) -> Vec<(Id, usize)> {
    let mut ranked: Vec<_> = counts.iter().map(|(&reg, &n)| (reg, n)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}

/// The live range of every register reference, keyed in first-occurrence
/// order.
pub fn live_ranges(insts: &[Inst]) -> IndexMap<Id, LiveRange> {
    let mut seen: IndexMap<Id, (isize, isize)> = IndexMap::new();
    for (j, &inst) in insts.iter().enumerate() {
        for reg in references(inst) {
            let j = j as isize;
            seen.entry(reg).and_modify(|(_, last)| *last = j).or_insert((j, j));
        }
    }
    seen.into_iter()
        .map(|(reg, (first, last))| (reg, LiveRange { start: first, end: last - 1 }))
        .collect()
}

/// For each register, the stack of instruction indices that reference it,
/// pushed in reverse program order so that `pop()` yields the earliest
/// remaining occurrence.  One entry per referencing *position*: a register
/// named twice by one instruction is pushed twice.
pub fn future_uses(insts: &[Inst]) -> IndexMap<Id, Vec<usize>> {
    let mut uses: IndexMap<Id, Vec<usize>> = IndexMap::new();
    for (j, &inst) in insts.iter().enumerate().rev() {
        for reg in references(inst) {
            uses.entry(reg).or_default().push(j);
        }
    }
    uses
}

/// The maximum number of simultaneously live ranges.
///
/// Classic sweep over the merged start and end sequences: tick up on a
/// start while `start[i] < end[j]`, otherwise tick down.  Starts arrive
/// already sorted because ranges are built in first-occurrence order; ends
/// are sorted here.  Returns `isize::MIN` when no range ever opens.
pub fn max_live<'a>(ranges: impl IntoIterator<Item = &'a LiveRange>) -> isize {
    let (starts, mut ends): (Vec<_>, Vec<_>) =
        ranges.into_iter().map(|r| (r.start, r.end)).unzip();
    ends.sort();

    let mut max = isize::MIN;
    let mut live = 0;
    let (mut i, mut j) = (0, 0);
    while i < starts.len() && j < ends.len() {
        if starts[i] < ends[j] {
            live += 1;
            i += 1;
            max = max.max(live);
        } else {
            live -= 1;
            j += 1;
        }
    }
    max
}

/// Spill-victim ordering for the top-down allocator: ascending occurrence
/// count; on equal counts the longer live range is considered smaller and
/// is therefore picked first by a sort.
pub fn range_order(a: (usize, LiveRange), b: (usize, LiveRange)) -> Ordering {
    let len = |r: LiveRange| r.end - r.start;
    a.0.cmp(&b.0).then(len(b.1).cmp(&len(a.1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::parse;
    use indoc::indoc;

    // every register is referenced at least twice, so each range ends one
    // short of its actual last reference
    const BLOCK: &str = indoc! {"
        loadI   1024    => r0
        loadAI  r0, 0   => r1
        loadAI  r0, 4   => r2
        add     r2, r2  => r3
        add     r2, r3  => r4
        add     r4, r4  => r5
        add     r5, r5  => r6
        add     r6, r3  => r7
        add     r7, r5  => r8
        add     r8, r4  => r9
        add     r9, r1  => r10
        storeAI r10     => r0, 8
        outputAI r0, 8
    "};

    fn ranges() -> Vec<(String, LiveRange)> {
        let insts = parse(BLOCK).unwrap();
        live_ranges(&insts)
            .into_iter()
            .map(|(reg, range)| (reg.to_string(), range))
            .collect()
    }

    #[test]
    fn live_ranges_end_one_short_of_the_last_reference() {
        let expected: Vec<(String, LiveRange)> = [
            ("r0", 0, 11),
            ("r1", 1, 9),
            ("r2", 2, 3),
            ("r3", 3, 6),
            ("r4", 4, 8),
            ("r5", 5, 7),
            ("r6", 6, 6),
            ("r7", 7, 7),
            ("r8", 8, 8),
            ("r9", 9, 9),
            ("r10", 10, 10),
        ]
        .into_iter()
        .map(|(reg, start, end)| (reg.to_string(), LiveRange { start, end }))
        .collect();
        assert_eq!(ranges(), expected);
    }

    #[test]
    fn max_live_counts_overlapping_ranges() {
        let insts = parse(BLOCK).unwrap();
        assert_eq!(max_live(live_ranges(&insts).values()), 5);
    }

    #[test]
    fn liveness_is_deterministic() {
        let insts = parse(BLOCK).unwrap();
        assert_eq!(live_ranges(&insts), live_ranges(&insts));
        assert_eq!(
            max_live(live_ranges(&insts).values()),
            max_live(live_ranges(&insts).values())
        );
    }

    #[test]
    fn range_order_prefers_low_counts_then_long_ranges() {
        let range = |start, end| LiveRange { start, end };
        let mut input = vec![
            (4, range(0, 11)),
            (4, range(1, 9)),
            (2, range(2, 3)),
            (2, range(3, 6)),
            (8, range(4, 8)),
        ];
        input.sort_by(|&a, &b| range_order(a, b));
        let expected = vec![
            (2, range(3, 6)),
            (2, range(2, 3)),
            (4, range(0, 11)),
            (4, range(1, 9)),
            (8, range(4, 8)),
        ];
        assert_eq!(input, expected);
    }

    #[test]
    fn occurrence_counts_include_every_position() {
        let insts = parse("add r1, r1 => r1").unwrap();
        let counts = occurrence_counts(&insts);
        assert_eq!(counts[&crate::front::phys(1)], 3);
    }

    #[test]
    fn future_uses_pop_in_program_order() {
        let insts = parse(indoc! {"
            loadI 1 => r1
            add r1, r1 => r2
            output 1024
            store r2 => r1
        "})
        .unwrap();
        let mut uses = future_uses(&insts);
        let r1 = crate::front::phys(1);
        let stack = uses.get_mut(&r1).unwrap();
        assert_eq!(stack.pop(), Some(0));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), None);
    }
}
