//! Bit widths, field masks and offsets for the 32-bit R/I/J instruction
//! encodings, plus the handful of structural sizing constants the pipeline
//! and FP sub-pipeline are built around.

use std::mem;

pub const BYTE_BYTES: u32 = mem::size_of::<u8>() as u32;
pub const BYTE_WIDTH: u32 = 8;

pub const HALF_BYTES: u32 = mem::size_of::<u16>() as u32;
pub const HALF_WIDTH: u32 = HALF_BYTES * BYTE_WIDTH;

pub const WORD_BYTES: u32 = mem::size_of::<u32>() as u32;
pub const WORD_WIDTH: u32 = WORD_BYTES * BYTE_WIDTH;

pub const DOUBLEWORD_BYTES: u32 = mem::size_of::<u64>() as u32;
pub const DOUBLEWORD_WIDTH: u32 = DOUBLEWORD_BYTES * BYTE_WIDTH;

/// Instructions are always 32 bits wide, independent of the 64-bit data path.
pub const INSTRUCTION_BYTES: u32 = 4;

pub const OPCODE_WIDTH: u32 = 6;
pub const REG_ID_WIDTH: u32 = 5;
pub const SHAMT_WIDTH: u32 = 5;
pub const FUNCT_WIDTH: u32 = 6;
pub const IMMEDIATE_WIDTH: u32 = 16;
pub const TARGET_WIDTH: u32 = 26;

// R-format: opcode(6) rs(5) rt(5) rd(5) shamt(5) funct(6)
pub const R_OPCODE_OFFSET: u32 = 26;
pub const R_RS_OFFSET: u32 = 21;
pub const R_RT_OFFSET: u32 = 16;
pub const R_RD_OFFSET: u32 = 11;
pub const R_SHAMT_OFFSET: u32 = 6;
pub const R_FUNCT_OFFSET: u32 = 0;

// I-format: opcode(6) rs(5) rt(5) immediate(16)
pub const I_OPCODE_OFFSET: u32 = 26;
pub const I_RS_OFFSET: u32 = 21;
pub const I_RT_OFFSET: u32 = 16;
pub const I_IMMEDIATE_OFFSET: u32 = 0;

// J-format: opcode(6) target(26)
pub const J_OPCODE_OFFSET: u32 = 26;
pub const J_TARGET_OFFSET: u32 = 0;

pub const GPR_COUNT: usize = 32;
pub const FPR_COUNT: usize = 32;

/// Depth of the integer pipeline, used to size the observer's per-cycle
/// snapshot buffer. IF, ID, EX, MEM, WB.
pub const INTEGER_STAGE_COUNT: usize = 5;

/// Latency (in cycles spent occupying the functional unit) of each FP
/// sub-pipeline, not counting the shared final "complete" cycle.
pub const FP_ADDER_STAGES: usize = 4;
pub const FP_MULTIPLIER_STAGES: usize = 7;
/// The divider is iterative rather than pipelined: one operand occupies it
/// for its whole latency before the next can begin.
pub const FP_DIVIDER_LATENCY: u32 = 24;

pub const REGISTER_ZERO: usize = 0;
