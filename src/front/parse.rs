//! The ILOC parser.
//!
//! One instruction per line; `//` starts an end-of-line comment.  Tokens are
//! maximal runs of word characters (with an optional leading `-` so emitted
//! spill offsets survive a round-trip); `=>` and `,` are delimiters and are
//! discarded.

use std::fmt::Debug;

use derive_more::derive::Display;
use regex::Regex;

use super::inst::{Inst, Opcode, Operand};
use crate::common::Id;

#[derive(Display)]
pub enum ParseError {
    #[display("'{_0}' is not a valid ILOC instruction: too many operands")]
    TooManyOperands(String),
    #[display("'{_0}' is not a valid ILOC instruction: missing operands")]
    MissingOperands(String),
    #[display("unknown ILOC opcode '{_0}'")]
    UnknownOpcode(String),
}

impl Debug for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

pub struct Parser {
    comments: Regex,
    tokens: Regex,
}

impl Parser {
    pub fn new() -> Self {
        Parser {
            comments: Regex::new(r"//.*").unwrap(),
            tokens: Regex::new(r"-?\w+").unwrap(),
        }
    }

    /// Parse a whole ILOC block.  Blank and comment-only lines are skipped.
    pub fn parse(&self, input: &str) -> Result<Vec<Inst>, ParseError> {
        let mut insts = Vec::new();
        for line in input.lines() {
            if let Some(inst) = self.parse_line(line)? {
                insts.push(inst);
            }
        }
        Ok(insts)
    }

    fn parse_line(&self, line: &str) -> Result<Option<Inst>, ParseError> {
        let code = self.comments.replace(line, "");
        let mut tokens = self.tokens.find_iter(&code).map(|m| m.as_str());
        let Some(opcode) = tokens.next() else {
            return Ok(None);
        };
        let op: Opcode = opcode
            .parse()
            .map_err(|_| ParseError::UnknownOpcode(opcode.to_string()))?;
        let args: Vec<Operand> = tokens.map(operand).collect();

        let inst = match args[..] {
            [] => return Err(ParseError::MissingOperands(line.trim().to_string())),
            [src] => Inst::OneOp { op, src },
            // the last token of a store works as an operand, not a destination
            [src, addr] if op == Opcode::Store => Inst::StoreTwo { op, src, addr },
            [src, dst] => Inst::TwoOpDst { op, src, dst },
            [src1, src2, dst] => Inst::ThreeOpDst { op, src1, src2, dst },
            _ => return Err(ParseError::TooManyOperands(line.trim().to_string())),
        };
        Ok(Some(inst))
    }
}

impl Default for Parser {
    fn default() -> Self {
        Parser::new()
    }
}

/// A token is a register reference unless it is an (optionally negative)
/// decimal integer.
fn operand(token: &str) -> Operand {
    match token.parse::<i64>() {
        Ok(n) => Operand::Lit(n),
        Err(_) => Operand::Reg(Id::new(token.to_string())),
    }
}

/// Parse an ILOC block from text.
pub fn parse(input: &str) -> Result<Vec<Inst>, ParseError> {
    Parser::new().parse(input)
}
