//! The error taxonomy: parse errors, runtime signals, synchronous
//! exceptions, control signals and invariant violations. Runtime signals
//! and control signals are not really "errors" in the usual sense — they
//! are the normal vocabulary the cycle loop uses to talk about stalls,
//! jumps and halts — but they share a `thiserror` enum with the rest so
//! every fallible path in the crate returns the same `Result` type.

use thiserror::Error;

/// A data hazard or structural conflict detected during `ID`, causing the
/// instruction to remain in place for (at least) one more cycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum StallKind {
    Raw,
    Waw,
    StructuralDivider,
    StructuralFpUnit,
    StructuralEx,
    StructuralMemory,
}

/// A synchronous exception raised by a stage's execute behavior.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ExceptionKind {
    IntegerOverflow,
    TwosComplementSum,
    DivByZero,
    AddressError,
    NotAlign,
    Trap,
    FpInvalidOperation,
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum ParseError {
    #[error("unrecognized token {token:?} on line {line}")]
    BadToken { line: u32, token: String },
    #[error("unknown mnemonic {0:?}")]
    UnknownMnemonic(String),
    #[error("operand {index} of {mnemonic:?} has the wrong kind or arity")]
    OperandMismatch { mnemonic: String, index: usize },
    #[error("label {0:?} is already defined")]
    SameLabels(String),
    #[error("address {address:#x} is out of range for the {segment} segment")]
    AddressOutOfRange { segment: &'static str, address: u64 },
    #[error("failed to pack instruction {0:?} into its encoding")]
    PackFailure(String),
}

/// A collection of `ParseError`s gathered over the whole source file,
/// surfaced together rather than aborting at the first offense.
#[derive(Error, Debug, Clone, Eq, PartialEq, Default)]
#[error("{} parse error(s)", .0.len())]
pub struct ParseReport(pub Vec<ParseError>);

impl ParseReport {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, error: ParseError) {
        self.0.push(error);
    }
}

#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum InvariantError {
    #[error("irregular bit string")]
    IrregularBitString,
    #[error("write value does not fit the register's declared range")]
    IrregularWrite,
    #[error("no memory element at the requested address")]
    MemoryElementNotFound,
    #[error("the CPU is not running")]
    StoppedCpu,
}

/// A fatal outcome of a single `Simulator::step`. A stall is not among
/// these - the pipeline just holds a stage in place for a cycle, which
/// `step` reports through `CycleSnapshot::stalls` rather than by failing.
#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum SimError {
    #[error("{0:?} exception")]
    Exception(ExceptionKind),
    #[error(transparent)]
    Invariant(#[from] InvariantError),
}
