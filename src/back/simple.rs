//! The simple top-down allocator: global assignment ranked by occurrence
//! count, with per-instruction spill through the feasible registers.  No
//! liveness information is consulted.

use tracing::debug;

use super::NUM_FEASIBLE;
use crate::common::{Id, Map};
use crate::front::{base_pointer, phys, Inst, Operand};
use crate::middle::{occurrence_counts, ranked_by_count};

pub struct SimpleAlloc<'a> {
    insts: &'a [Inst],
    bp: Id,
    /// which feasible registers the current instruction has claimed
    used: Vec<bool>,
    /// per-instruction bindings of spilled names to feasible registers
    loc: Map<Id, Id>,
    result: Vec<Inst>,
}

impl<'a> SimpleAlloc<'a> {
    pub fn new(insts: &'a [Inst]) -> Self {
        SimpleAlloc {
            insts,
            bp: base_pointer(),
            used: vec![false; NUM_FEASIBLE],
            loc: Map::new(),
            result: Vec::new(),
        }
    }

    /// Assign the most used virtual registers to physical registers and the
    /// rest to memory slots.  The feasible registers are reserved for spill
    /// traffic only when the block's registers do not all fit in `k`.
    fn assign(&self, k: usize) -> (Map<Id, Id>, Map<Id, i64>) {
        let counts = occurrence_counts(self.insts);
        let total_vars = counts.len() - counts.contains_key(&self.bp) as usize;

        let mut allocd = Map::new();
        allocd.insert(self.bp, self.bp);
        let mut memory = Map::new();
        let mut offset = -4;
        let mut j = if total_vars > k { NUM_FEASIBLE + 1 } else { 1 };
        for (vr, _) in ranked_by_count(&counts) {
            if vr == self.bp {
                continue;
            }
            if j <= k {
                allocd.insert(vr, phys(j));
                j += 1;
            } else {
                memory.insert(vr, offset);
                offset -= 4;
            }
        }
        (allocd, memory)
    }

    /// Bind `vr` to a feasible register for the current instruction and
    /// emit the matching spill code: a load before the instruction for
    /// sources, a store after it for the destination.
    fn spill(&mut self, vr: Id, offset: i64, is_dst: bool) -> (Id, Option<Inst>) {
        let i = self.used.iter().position(|&u| !u).unwrap_or(0);
        self.used[i] = true;
        let feasible = phys(i + 1);
        self.loc.insert(vr, feasible);
        debug!(%vr, offset, %feasible, "spill");
        if is_dst {
            (feasible, Some(Inst::store_ai(feasible, self.bp, offset)))
        } else {
            self.result.push(Inst::load_ai(self.bp, offset, feasible));
            (feasible, None)
        }
    }

    pub fn allocate(mut self, k: usize) -> Vec<Inst> {
        let (allocd, memory) = self.assign(k);
        debug!(in_registers = allocd.len() - 1, in_memory = memory.len(), "pre-pass done");

        let insts = self.insts;
        for &inst in insts {
            let mut ops = inst.operands();
            let mut dst = inst.dst();
            let mut store = None;

            for idx in 0..3 {
                let (slot, is_dst) = if idx < 2 {
                    (&mut ops[idx], false)
                } else {
                    (&mut dst, true)
                };
                let Some(Operand::Reg(vr)) = *slot else { continue };

                if let Some(&feasible) = self.loc.get(&vr) {
                    // reuse the feasible register bound earlier in this
                    // instruction
                    *slot = Some(Operand::Reg(feasible));
                } else if let Some(&offset) = memory.get(&vr) {
                    let (feasible, st) = self.spill(vr, offset, is_dst);
                    *slot = Some(Operand::Reg(feasible));
                    store = st;
                } else if let Some(&reg) = allocd.get(&vr) {
                    *slot = Some(Operand::Reg(reg));
                }
            }

            self.result.push(inst.with_operands(ops, dst));
            if let Some(st) = store {
                self.result.push(st);
            }
            self.loc.clear();
            self.used.fill(false);
        }
        self.result
    }
}
