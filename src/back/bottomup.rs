//! The bottom-up allocator: a linear scan through the instructions that,
//! when it runs out of registers, evicts the one whose next use is farthest
//! in the future (Belady's rule).

use indexmap::IndexMap;
use tracing::debug;

use crate::common::{Id, Map};
use crate::front::{base_pointer, phys, Inst, Operand};
use crate::middle::future_uses;

/// Sentinel for "not currently bound to a live value".
const NO_NEXT_USE: i64 = i64::MAX;

/// Index of the pinned base-pointer descriptor.
const BP: usize = 0;

/// Physical register descriptor.  Other maps refer to descriptors by their
/// index in the arena.
struct Desc {
    phy: Id,
    vr: Option<Id>,
    next: i64,
}

pub struct BottomUpAlloc<'a> {
    insts: &'a [Inst],
    bp: Id,
    /// descriptor arena; `descs[0]` is `r0` and is never evicted or freed
    descs: Vec<Desc>,
    available: Vec<usize>,
    location: Map<Id, usize>,
    spilled: Map<Id, i64>,
    offset: i64,
    usage: IndexMap<Id, Vec<usize>>,
    result: Vec<Inst>,
}

impl<'a> BottomUpAlloc<'a> {
    pub fn new(insts: &'a [Inst]) -> Self {
        BottomUpAlloc {
            insts,
            bp: base_pointer(),
            descs: Vec::new(),
            available: Vec::new(),
            location: Map::new(),
            spilled: Map::new(),
            offset: -4,
            usage: IndexMap::new(),
            result: Vec::new(),
        }
    }

    /// Map `vr` to a free physical register, spilling the one that is not
    /// needed for the longest time when none is free.
    fn alloc(&mut self, vr: Id) -> usize {
        if vr == self.bp {
            return BP;
        }
        let idx = match self.available.pop() {
            Some(idx) => idx,
            None => {
                let idx = self
                    .descs
                    .iter()
                    .enumerate()
                    .skip(1)
                    .max_by_key(|(_, desc)| desc.next)
                    .map(|(idx, _)| idx)
                    .expect("descriptor arena is non-empty");
                self.spill(idx);
                idx
            }
        };
        self.location.insert(vr, idx);
        let desc = &mut self.descs[idx];
        desc.vr = Some(vr);
        desc.next = -1; // not an eviction candidate again within this instruction
        idx
    }

    /// Make sure `vr` is held in a physical register, reloading it from its
    /// spill slot if it was spilled earlier.
    fn ensure(&mut self, vr: Id) -> usize {
        if self.location.contains_key(&vr) && !self.spilled.contains_key(&vr) {
            self.location[&vr]
        } else if let Some(&pos) = self.spilled.get(&vr) {
            let idx = self.alloc(vr);
            self.result.push(Inst::load_ai(self.bp, pos, self.descs[idx].phy));
            self.spilled.remove(&vr);
            idx
        } else {
            self.alloc(vr)
        }
    }

    /// Record the spill slot for the descriptor's value and emit the store.
    fn spill(&mut self, idx: usize) {
        let vr = self.descs[idx].vr.take().expect("eviction target must be bound");
        let phy = self.descs[idx].phy;
        debug!(%vr, offset = self.offset, "evict");
        self.spilled.insert(vr, self.offset);
        self.result.push(Inst::store_ai(phy, self.bp, self.offset));
        self.descs[idx].next = NO_NEXT_USE;
        self.offset -= 4;
    }

    fn free(&mut self, idx: usize) {
        if idx == BP {
            return;
        }
        if let Some(vr) = self.descs[idx].vr.take() {
            self.location.remove(&vr);
        }
        self.descs[idx].next = NO_NEXT_USE;
        self.available.push(idx);
    }

    pub fn allocate(mut self, k: usize) -> Vec<Inst> {
        self.descs = (0..=k)
            .map(|j| Desc { phy: phys(j), vr: None, next: NO_NEXT_USE })
            .collect();
        self.available = (1..=k).collect();
        self.location.insert(self.bp, BP);
        self.usage = future_uses(self.insts);

        let insts = self.insts;
        for &inst in insts {
            // ensure both operands are in physical registers
            let mut ops = inst.operands();
            for slot in ops.iter_mut() {
                if let Some(Operand::Reg(vr)) = *slot {
                    let idx = self.ensure(vr);
                    *slot = Some(Operand::Reg(self.descs[idx].phy));
                }
            }

            // pop each operand's occurrence; registers with no remaining
            // use go back to the free list
            for op in inst.operands().into_iter().flatten() {
                let Some(vr) = op.reg() else { continue };
                let idx = self.location[&vr];
                let uses = self.usage.get_mut(&vr).expect("referenced register has a use list");
                match uses.pop() {
                    None => self.free(idx),
                    Some(next) => self.descs[idx].next = next as i64,
                }
            }

            // allocate a register for the destination and consume this
            // definition site from its use list
            let mut dst = inst.dst();
            if let Some(Operand::Reg(vr)) = dst {
                let idx = self.alloc(vr);
                dst = Some(Operand::Reg(self.descs[idx].phy));
                let uses = self.usage.get_mut(&vr).expect("referenced register has a use list");
                uses.pop();
                match uses.pop() {
                    Some(next) => self.descs[idx].next = next as i64,
                    None => self.free(idx),
                }
            }

            self.result.push(inst.with_operands(ops, dst));
        }
        self.result
    }
}
