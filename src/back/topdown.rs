//! The top-down allocator with live ranges: registers are ranked by
//! occurrence count and range length, pruned against max-live, and spilled
//! lazily through the feasible registers during the rewrite.

use indexmap::IndexMap;
use tracing::debug;

use super::NUM_FEASIBLE;
use crate::common::{Id, Map};
use crate::front::{base_pointer, phys, Inst, Operand};
use crate::middle::{live_ranges, max_live, occurrence_counts, range_order, LiveRange};

pub struct TopDownAlloc<'a> {
    insts: &'a [Inst],
    bp: Id,
    counts: IndexMap<Id, usize>,
    ranges: IndexMap<Id, LiveRange>,
    feasible: [Id; 2],
    /// alternates which feasible register serves the next reload
    r1_free: bool,
    free: Vec<Id>,
    loc: Map<Id, Id>,
    mem: Map<Id, i64>,
    pos: i64,
    result: Vec<Inst>,
}

impl<'a> TopDownAlloc<'a> {
    pub fn new(insts: &'a [Inst]) -> Self {
        TopDownAlloc {
            insts,
            bp: base_pointer(),
            counts: occurrence_counts(insts),
            ranges: live_ranges(insts),
            feasible: [phys(1), phys(2)],
            r1_free: true,
            free: Vec::new(),
            loc: Map::new(),
            mem: Map::new(),
            pos: -4,
            result: Vec::new(),
        }
    }

    fn next_feasible(&mut self) -> Id {
        let reg = self.feasible[if self.r1_free { 0 } else { 1 }];
        self.r1_free = !self.r1_free;
        reg
    }

    fn alloc(&mut self, vr: Id) -> Id {
        if let Some(reg) = self.free.pop() {
            self.loc.insert(vr, reg);
            return reg;
        }
        // no register left: give this value a memory slot and hand back a
        // feasible register as scratch
        if !self.mem.contains_key(&vr) {
            self.mem.insert(vr, self.pos);
            self.pos -= 4;
        }
        self.next_feasible()
    }

    fn ensure(&mut self, vr: Id) -> Id {
        if let Some(&reg) = self.loc.get(&vr) {
            reg
        } else if let Some(&pos) = self.mem.get(&vr) {
            let reg = self.next_feasible();
            self.result.push(Inst::load_ai(self.bp, pos, reg));
            reg
        } else {
            unreachable!("virtual register {vr} is neither allocated nor spilled")
        }
    }

    fn rewrite(&mut self, inst: Inst, pos: isize) -> (Inst, Option<Inst>) {
        let mut ops = inst.operands();
        let mut src_regs = Vec::new();
        for slot in ops.iter_mut() {
            let Some(Operand::Reg(vr)) = *slot else { continue };
            if vr == self.bp {
                continue;
            }
            let reg = self.ensure(vr);
            *slot = Some(Operand::Reg(reg));
            src_regs.push(vr);
        }

        // release the registers of sources whose last use has passed
        for vr in src_regs {
            if pos > self.ranges[&vr].end {
                if let Some(reg) = self.loc.remove(&vr) {
                    self.free.push(reg);
                }
            }
        }

        let mut dst = inst.dst();
        let mut spill = None;
        if let Some(Operand::Reg(vr)) = dst {
            if vr != self.bp {
                // use r1 as the destination if vr was spilled in the pre-pass
                let reg = if self.mem.contains_key(&vr) {
                    self.feasible[0]
                } else {
                    self.alloc(vr)
                };
                if self.feasible.contains(&reg) {
                    spill = Some(Inst::store_ai(reg, self.bp, self.mem[&vr]));
                }
                dst = Some(Operand::Reg(reg));
            }
        }
        (inst.with_operands(ops, dst), spill)
    }

    pub fn allocate(mut self, k: usize) -> Vec<Inst> {
        self.free = (NUM_FEASIBLE + 1..=k).map(phys).collect();

        let mut max = max_live(self.ranges.values());
        let mut ranked: Vec<(Id, usize, LiveRange)> = self
            .ranges
            .iter()
            .map(|(&vr, &range)| (vr, self.counts[&vr], range))
            .collect();
        ranked.sort_by(|a, b| range_order((a.1, a.2), (b.1, b.2)));

        let budget = (k - NUM_FEASIBLE) as isize;
        for (vr, _, _) in ranked {
            if max <= budget {
                break;
            }
            self.mem.insert(vr, self.pos);
            self.pos -= 4;
            max -= 1;
        }
        debug!(evicted = self.mem.len(), "pre-pass done");

        let insts = self.insts;
        for (j, &inst) in insts.iter().enumerate() {
            let (rewritten, spill) = self.rewrite(inst, j as isize);
            self.result.push(rewritten);
            if let Some(store) = spill {
                self.result.push(store);
            }
        }
        self.result
    }
}
