//! The linear-scan allocator: live intervals are walked in first-occurrence
//! order against a min-heap of active intervals; when the pool is full the
//! active interval ending last is spilled in favor of a shorter one.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use indexmap::IndexMap;
use tracing::debug;

use super::NUM_FEASIBLE;
use crate::common::{Id, Map};
use crate::front::{base_pointer, phys, Inst, Operand};
use crate::middle::{live_ranges, LiveRange};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Interval {
    name: Id,
    start: isize,
    end: isize,
}

// intervals compete on their end point; the rest of the key only makes the
// ordering total
impl Ord for Interval {
    fn cmp(&self, other: &Self) -> Ordering {
        self.end
            .cmp(&other.end)
            .then(self.start.cmp(&other.start))
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for Interval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct LinearScanAlloc<'a> {
    insts: &'a [Inst],
    bp: Id,
    ranges: IndexMap<Id, LiveRange>,
    active: BinaryHeap<Reverse<Interval>>,
    free: Vec<Id>,
    reg_map: Map<Id, Id>,
    location: Map<Id, i64>,
    sp: i64,
}

impl<'a> LinearScanAlloc<'a> {
    pub fn new(insts: &'a [Inst]) -> Self {
        let mut ranges = live_ranges(insts);
        let bp = base_pointer();
        ranges.shift_remove(&bp);
        LinearScanAlloc {
            insts,
            bp,
            ranges,
            active: BinaryHeap::new(),
            free: Vec::new(),
            reg_map: Map::new(),
            location: Map::new(),
            sp: -4,
        }
    }

    pub fn allocate(mut self, k: usize) -> Vec<Inst> {
        let (mut lo, hi) = (1, k);
        let mut pool = k;
        if self.ranges.len() > k {
            // reserve the feasible registers for spill traffic
            lo = NUM_FEASIBLE + 1;
            pool = k - NUM_FEASIBLE;
        }
        if pool < 2 {
            // too few registers to scan with: spill every virtual register
            // and let the rewrite pass plumb values through the feasibles
            let mut pos = 0;
            for &vr in self.ranges.keys() {
                pos -= 4;
                self.location.insert(vr, pos);
            }
            debug!(spilled = self.location.len(), "spilling everything");
            return self.rewrite();
        }

        self.free = (lo..=hi).map(phys).collect();
        let intervals: Vec<Interval> = self
            .ranges
            .iter()
            .map(|(&name, &range)| Interval { name, start: range.start, end: range.end })
            .collect();
        for interval in intervals {
            self.expire_old(interval);
            if self.active.len() == pool {
                self.spill_at_interval(interval);
            } else {
                let reg = self.free.pop().expect("free pool is non-empty");
                self.reg_map.insert(interval.name, reg);
                self.active.push(Reverse(interval));
            }
        }
        self.rewrite()
    }

    /// Return the registers of every active interval ending before
    /// `interval` starts to the free pool.
    fn expire_old(&mut self, interval: Interval) {
        while let Some(&Reverse(oldest)) = self.active.peek() {
            if oldest.end >= interval.start {
                return;
            }
            self.active.pop();
            self.free.push(self.reg_map[&oldest.name]);
        }
    }

    /// The pool is full: between `interval` and the active interval ending
    /// last, the one reaching farther goes to memory.
    fn spill_at_interval(&mut self, interval: Interval) {
        let victim = self
            .active
            .iter()
            .map(|&Reverse(j)| j)
            .max()
            .expect("active set is full");
        if victim.end > interval.end {
            let reg = self.reg_map[&victim.name];
            self.reg_map.insert(interval.name, reg);
            self.active.retain(|&Reverse(j)| j != victim);
            self.location.insert(victim.name, self.sp);
            self.reg_map.remove(&victim.name);
            self.active.push(Reverse(interval));
            debug!(victim = %victim.name, kept = %interval.name, "spill at interval");
        } else {
            self.location.insert(interval.name, self.sp);
            debug!(victim = %interval.name, "spill at interval");
        }
        self.sp -= 4;
    }

    /// A single forward pass substituting allocated registers and plumbing
    /// memory-resident values through the feasible registers.
    fn rewrite(self) -> Vec<Inst> {
        let fregs = [phys(1), phys(2)];
        // alternating index keeps two memory-resident operands of one
        // instruction in distinct feasible registers
        let mut flag = true;
        let mut result = Vec::new();

        for &inst in self.insts {
            let mut ops = inst.operands();
            for slot in ops.iter_mut() {
                let Some(Operand::Reg(vr)) = *slot else { continue };
                if let Some(&pos) = self.location.get(&vr) {
                    let reg = fregs[flag as usize];
                    flag = !flag;
                    result.push(Inst::load_ai(self.bp, pos, reg));
                    *slot = Some(Operand::Reg(reg));
                } else if let Some(&reg) = self.reg_map.get(&vr) {
                    *slot = Some(Operand::Reg(reg));
                }
            }

            let mut dst = inst.dst();
            let mut spill = None;
            if let Some(Operand::Reg(vr)) = dst {
                if let Some(&pos) = self.location.get(&vr) {
                    let reg = fregs[flag as usize];
                    flag = !flag;
                    spill = Some(Inst::store_ai(reg, self.bp, pos));
                    dst = Some(Operand::Reg(reg));
                } else if let Some(&reg) = self.reg_map.get(&vr) {
                    dst = Some(Operand::Reg(reg));
                }
            }

            result.push(inst.with_operands(ops, dst));
            if let Some(store) = spill {
                result.push(store);
            }
        }
        result
    }
}
