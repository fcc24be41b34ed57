//! The ILOC instruction model.

use derive_more::Display;
use std::fmt;
use std::str::FromStr;

use crate::common::Id;

/// The name of physical register `j`.
pub fn phys(j: usize) -> Id {
    Id::new(format!("r{j}"))
}

/// The reserved base-pointer register.  It is passed through every
/// allocator unchanged: never rebound, never spilled, never freed.
pub fn base_pointer() -> Id {
    phys(0)
}

/// The ILOC opcodes understood by the allocator.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
pub enum Opcode {
    #[display("load")]
    Load,
    #[display("loadI")]
    LoadI,
    #[display("loadAI")]
    LoadAI,
    #[display("store")]
    Store,
    #[display("storeAI")]
    StoreAI,
    #[display("add")]
    Add,
    #[display("sub")]
    Sub,
    #[display("mult")]
    Mult,
    #[display("div")]
    Div,
    #[display("lshift")]
    LShift,
    #[display("rshift")]
    RShift,
    #[display("addI")]
    AddI,
    #[display("subI")]
    SubI,
    #[display("i2i")]
    I2I,
    #[display("output")]
    Output,
    #[display("outputAI")]
    OutputAI,
}

pub struct UnknownOpcode(pub String);

impl fmt::Display for UnknownOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown ILOC opcode '{}'", self.0)
    }
}

impl fmt::Debug for UnknownOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl FromStr for Opcode {
    type Err = UnknownOpcode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Opcode::*;
        Ok(match s {
            "load" => Load,
            "loadI" => LoadI,
            "loadAI" => LoadAI,
            "store" => Store,
            "storeAI" => StoreAI,
            "add" => Add,
            "sub" => Sub,
            "mult" => Mult,
            "div" => Div,
            "lshift" => LShift,
            "rshift" => RShift,
            "addI" => AddI,
            "subI" => SubI,
            "i2i" => I2I,
            "output" => Output,
            "outputAI" => OutputAI,
            _ => return Err(UnknownOpcode(s.to_string())),
        })
    }
}

/// One operand: a register reference or an integer literal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
pub enum Operand {
    #[display("{_0}")]
    Reg(Id),
    #[display("{_0}")]
    Lit(i64),
}

impl Operand {
    /// The register name, if this operand is a register reference.
    pub fn reg(&self) -> Option<Id> {
        match *self {
            Operand::Reg(name) => Some(name),
            Operand::Lit(_) => None,
        }
    }
}

/// One ILOC instruction.  The shape (how many operand tokens there are and
/// whether the last one is a destination) is resolved at parse time, so the
/// allocators never inspect opcode strings to find out what they hold.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Inst {
    /// `output 1028`
    OneOp { op: Opcode, src: Operand },
    /// `loadI 1024 => r0`, `outputAI r0, 8`
    TwoOpDst { op: Opcode, src: Operand, dst: Operand },
    /// `add r1, r2 => r3`, `loadAI r0, 4 => r1`, `storeAI r1 => r0, -4`
    ThreeOpDst {
        op: Opcode,
        src1: Operand,
        src2: Operand,
        dst: Operand,
    },
    /// `store r1 => r2`; both tokens are sources
    StoreTwo { op: Opcode, src: Operand, addr: Operand },
}

impl Inst {
    pub fn opcode(&self) -> Opcode {
        match *self {
            Inst::OneOp { op, .. }
            | Inst::TwoOpDst { op, .. }
            | Inst::ThreeOpDst { op, .. }
            | Inst::StoreTwo { op, .. } => op,
        }
    }

    /// The operand view `(op1, op2)`.
    pub fn operands(&self) -> [Option<Operand>; 2] {
        match *self {
            Inst::OneOp { src, .. } => [Some(src), None],
            Inst::TwoOpDst { src, .. } => [Some(src), None],
            Inst::ThreeOpDst { src1, src2, .. } => [Some(src1), Some(src2)],
            Inst::StoreTwo { src, addr, .. } => [Some(src), Some(addr)],
        }
    }

    pub fn dst(&self) -> Option<Operand> {
        match *self {
            Inst::TwoOpDst { dst, .. } | Inst::ThreeOpDst { dst, .. } => Some(dst),
            Inst::OneOp { .. } | Inst::StoreTwo { .. } => None,
        }
    }

    /// Rebuild the same shape with substituted operands.  Callers must keep
    /// every slot's presence intact; a shape mismatch is a bug.
    pub fn with_operands(&self, ops: [Option<Operand>; 2], dst: Option<Operand>) -> Inst {
        let filled = |slot: Option<Operand>| slot.expect("operand slot must keep its shape");
        match *self {
            Inst::OneOp { op, .. } => Inst::OneOp { op, src: filled(ops[0]) },
            Inst::TwoOpDst { op, .. } => Inst::TwoOpDst {
                op,
                src: filled(ops[0]),
                dst: filled(dst),
            },
            Inst::ThreeOpDst { op, .. } => Inst::ThreeOpDst {
                op,
                src1: filled(ops[0]),
                src2: filled(ops[1]),
                dst: filled(dst),
            },
            Inst::StoreTwo { op, .. } => Inst::StoreTwo {
                op,
                src: filled(ops[0]),
                addr: filled(ops[1]),
            },
        }
    }

    /// `loadAI base, offset => dst` — reload a spilled value.
    pub fn load_ai(base: Id, offset: i64, dst: Id) -> Inst {
        Inst::ThreeOpDst {
            op: Opcode::LoadAI,
            src1: Operand::Reg(base),
            src2: Operand::Lit(offset),
            dst: Operand::Reg(dst),
        }
    }

    /// `storeAI src => base, offset` — spill a register to memory.
    pub fn store_ai(src: Id, base: Id, offset: i64) -> Inst {
        Inst::ThreeOpDst {
            op: Opcode::StoreAI,
            src1: Operand::Reg(src),
            src2: Operand::Reg(base),
            dst: Operand::Lit(offset),
        }
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            // storeAI and outputAI spell their operands differently from the
            // other instructions of the same shape
            Inst::ThreeOpDst {
                op: op @ Opcode::StoreAI,
                src1,
                src2,
                dst,
            } => write!(f, "{op}\t{src1}\t=> {src2}, {dst}"),
            Inst::TwoOpDst {
                op: op @ Opcode::OutputAI,
                src,
                dst,
            } => write!(f, "{op} {src}, {dst}"),
            Inst::OneOp { op, src } => write!(f, "{op}\t{src}"),
            Inst::TwoOpDst { op, src, dst } => write!(f, "{op}\t{src}\t=> {dst}"),
            Inst::ThreeOpDst { op, src1, src2, dst } => {
                write!(f, "{op}\t{src1}, {src2}\t=> {dst}")
            }
            Inst::StoreTwo { op, src, addr } => write!(f, "{op}\t{src}\t=> {addr}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(name: &str) -> Operand {
        Operand::Reg(Id::new(name.to_string()))
    }

    #[test]
    fn printer_matches_the_iloc_grammar() {
        let store_ai = Inst::store_ai(phys(1), base_pointer(), -4);
        assert_eq!(store_ai.to_string(), "storeAI\tr1\t=> r0, -4");

        let load_ai = Inst::load_ai(base_pointer(), -8, phys(2));
        assert_eq!(load_ai.to_string(), "loadAI\tr0, -8\t=> r2");

        let store = Inst::StoreTwo {
            op: Opcode::Store,
            src: r("r3"),
            addr: r("r4"),
        };
        assert_eq!(store.to_string(), "store\tr3\t=> r4");

        let output = Inst::OneOp {
            op: Opcode::Output,
            src: Operand::Lit(1032),
        };
        assert_eq!(output.to_string(), "output\t1032");

        let output_ai = Inst::TwoOpDst {
            op: Opcode::OutputAI,
            src: r("r0"),
            dst: Operand::Lit(8),
        };
        assert_eq!(output_ai.to_string(), "outputAI r0, 8");

        let add = Inst::ThreeOpDst {
            op: Opcode::Add,
            src1: r("r1"),
            src2: r("r2"),
            dst: r("r3"),
        };
        assert_eq!(add.to_string(), "add\tr1, r2\t=> r3");

        let load_i = Inst::TwoOpDst {
            op: Opcode::LoadI,
            src: Operand::Lit(1024),
            dst: r("r0"),
        };
        assert_eq!(load_i.to_string(), "loadI\t1024\t=> r0");
    }

    #[test]
    fn substitution_preserves_shape() {
        let add = Inst::ThreeOpDst {
            op: Opcode::Add,
            src1: r("a"),
            src2: r("b"),
            dst: r("c"),
        };
        let rewritten = add.with_operands([Some(r("r1")), Some(r("r2"))], Some(r("r3")));
        assert_eq!(rewritten.to_string(), "add\tr1, r2\t=> r3");
        assert_eq!(rewritten.opcode(), Opcode::Add);
    }
}
