//! The `.code` section strategy: turns each labeled line into a decoded
//! [`Instruction`], resolving register/immediate operands immediately and
//! deferring branch/jump label operands to a second pass once every label
//! in the source (both sections) is known.

use crate::int_util::{process_int, process_uint};
use crate::parser::Rule;
use edumips64::bits::{fits_signed, fits_unsigned};
use edumips64::constants::{FPR_COUNT, GPR_COUNT};
use edumips64::error::ParseError;
use edumips64::isa::{self, Family, Instruction, Opcode, OperandKind};
use edumips64::symbol::SymbolTable;
use pest::iterators::Pair;
use pest::Span;

/// An instruction whose `target` field still needs a label looked up in the
/// now-complete symbol table. Every control-flow mnemonic funnels through
/// here: the simulator's `EX` stage already treats `Instruction::target` as
/// an absolute address for both branches and jumps (see `take_jump`), so
/// unlike a silicon MIPS assembler there is no separate PC-relative offset
/// to compute - just the label's resolved address.
pub struct Unresolved<'i> {
    partial: Instruction,
    label: Span<'i>,
}

pub enum ParsedInstruction<'i> {
    Complete(Instruction),
    NeedsLabel(Unresolved<'i>),
}

pub(crate) fn blank(opcode: Opcode) -> Instruction {
    Instruction {
        opcode,
        rs: 0,
        rt: 0,
        rd: 0,
        shamt: 0,
        immediate: 0,
        target: 0,
        encoding: 0,
    }
}

fn mismatch(mnemonic: &str, index: usize) -> ParseError {
    ParseError::OperandMismatch {
        mnemonic: mnemonic.to_string(),
        index,
    }
}

/// Register tokens are `R`/`r`/`$` (GPR) or `F`/`f` (FPR) followed by a
/// decimal id; both are produced by atomic grammar rules so the digits are
/// everything after the one-character prefix.
fn register_id(pair: &Pair<Rule>, count: usize) -> Result<u8, ParseError> {
    let text = pair.as_str();
    let digits = &text[1..];
    let (line, _) = pair.as_span().start_pos().line_col();
    let id: usize = digits.parse().map_err(|_| ParseError::BadToken {
        line: line as u32,
        token: text.to_string(),
    })?;
    if id >= count {
        return Err(ParseError::BadToken {
            line: line as u32,
            token: format!("{} is out of range", text),
        });
    }
    Ok(id as u8)
}

fn expect_gpr(op: Pair<Rule>, mnemonic: &str, index: usize) -> Result<u8, ParseError> {
    let inner = op.into_inner().next().unwrap();
    if inner.as_rule() != Rule::gpr {
        return Err(mismatch(mnemonic, index));
    }
    register_id(&inner, GPR_COUNT)
}

fn expect_fpr(op: Pair<Rule>, mnemonic: &str, index: usize) -> Result<u8, ParseError> {
    let inner = op.into_inner().next().unwrap();
    if inner.as_rule() != Rule::fpr {
        return Err(mismatch(mnemonic, index));
    }
    register_id(&inner, FPR_COUNT)
}

fn expect_int(op: Pair<Rule>, mnemonic: &str, index: usize) -> Result<i64, ParseError> {
    let inner = op.into_inner().next().unwrap();
    if inner.as_rule() != Rule::int {
        return Err(mismatch(mnemonic, index));
    }
    process_int(inner)
}

fn expect_uint(op: Pair<Rule>, mnemonic: &str, index: usize) -> Result<u64, ParseError> {
    let inner = op.into_inner().next().unwrap();
    if inner.as_rule() != Rule::int {
        return Err(mismatch(mnemonic, index));
    }
    // `.byte`-style literals can be negative; unsigned-immediate mnemonics
    // (`ANDI`/`ORI`/`XORI`/`LUI`) just take the low 16 bits of whatever was
    // written, signed or not.
    Ok(process_int(inner)? as u64)
}

fn expect_mem(op: Pair<Rule>, mnemonic: &str, index: usize) -> Result<(i64, u8), ParseError> {
    let inner = op.into_inner().next().unwrap();
    if inner.as_rule() != Rule::mem_operand {
        return Err(mismatch(mnemonic, index));
    }
    let mut parts = inner.into_inner();
    let offset = process_int(parts.next().unwrap())?;
    let base = register_id(&parts.next().unwrap(), GPR_COUNT)?;
    Ok((offset, base))
}

fn expect_label<'i>(op: Pair<'i, Rule>, mnemonic: &str, index: usize) -> Result<Span<'i>, ParseError> {
    let inner = op.into_inner().next().unwrap();
    if inner.as_rule() != Rule::identifier {
        return Err(mismatch(mnemonic, index));
    }
    Ok(inner.as_span())
}

/// How many comma-separated operands (not [`Opcode::operand_syntax`]
/// positions) the source line should carry: the `offset(base)` addressing
/// form is two syntax positions but a single token in source text.
fn textual_operand_count(opcode: Opcode) -> usize {
    use edumips64::isa::Family;
    match opcode.family() {
        Family::Load | Family::Store | Family::FpLoadStore => 2,
        _ => opcode.operand_syntax().len(),
    }
}

pub fn process_instruction<'i>(pair: Pair<'i, Rule>) -> Result<ParsedInstruction<'i>, ParseError> {
    let mut pairs = pair.into_inner();
    let mnemonic_pair = pairs.next().unwrap();
    let mnemonic_text = mnemonic_pair.as_str();
    let opcode = Opcode::from_mnemonic(mnemonic_text)
        .ok_or_else(|| ParseError::UnknownMnemonic(mnemonic_text.to_string()))?;

    let operands: Vec<Pair<Rule>> = pairs.collect();
    if operands.len() != textual_operand_count(opcode) {
        return Err(ParseError::OperandMismatch {
            mnemonic: mnemonic_text.to_string(),
            index: operands.len(),
        });
    }
    let mut ops = operands.into_iter();

    use Opcode::*;
    let result = match opcode {
        Add | Addu | Sub | Subu | And | Or | Xor | Nor | Slt | Sltu => {
            let rd = expect_gpr(ops.next().unwrap(), mnemonic_text, 0)?;
            let rs = expect_gpr(ops.next().unwrap(), mnemonic_text, 1)?;
            let rt = expect_gpr(ops.next().unwrap(), mnemonic_text, 2)?;
            ParsedInstruction::Complete(Instruction {
                rs,
                rt,
                rd,
                ..blank(opcode)
            })
        }
        Sll | Srl | Sra => {
            let rd = expect_gpr(ops.next().unwrap(), mnemonic_text, 0)?;
            let rt = expect_gpr(ops.next().unwrap(), mnemonic_text, 1)?;
            let shamt = expect_int(ops.next().unwrap(), mnemonic_text, 2)?;
            ParsedInstruction::Complete(Instruction {
                rt,
                rd,
                shamt: shamt as u8,
                ..blank(opcode)
            })
        }
        Sllv | Srlv | Srav => {
            let rd = expect_gpr(ops.next().unwrap(), mnemonic_text, 0)?;
            let rt = expect_gpr(ops.next().unwrap(), mnemonic_text, 1)?;
            let rs = expect_gpr(ops.next().unwrap(), mnemonic_text, 2)?;
            ParsedInstruction::Complete(Instruction {
                rs,
                rt,
                rd,
                ..blank(opcode)
            })
        }
        Mult | Div => {
            let rs = expect_gpr(ops.next().unwrap(), mnemonic_text, 0)?;
            let rt = expect_gpr(ops.next().unwrap(), mnemonic_text, 1)?;
            ParsedInstruction::Complete(Instruction {
                rs,
                rt,
                ..blank(opcode)
            })
        }
        Addi | Addiu | Slti | Sltiu => {
            let rt = expect_gpr(ops.next().unwrap(), mnemonic_text, 0)?;
            let rs = expect_gpr(ops.next().unwrap(), mnemonic_text, 1)?;
            let immediate = expect_int(ops.next().unwrap(), mnemonic_text, 2)?;
            ParsedInstruction::Complete(Instruction {
                rs,
                rt,
                immediate,
                ..blank(opcode)
            })
        }
        Andi | Ori | Xori => {
            let rt = expect_gpr(ops.next().unwrap(), mnemonic_text, 0)?;
            let rs = expect_gpr(ops.next().unwrap(), mnemonic_text, 1)?;
            let immediate = expect_uint(ops.next().unwrap(), mnemonic_text, 2)? as i64;
            ParsedInstruction::Complete(Instruction {
                rs,
                rt,
                immediate,
                ..blank(opcode)
            })
        }
        Lui => {
            let rt = expect_gpr(ops.next().unwrap(), mnemonic_text, 0)?;
            let immediate = expect_uint(ops.next().unwrap(), mnemonic_text, 1)? as i64;
            ParsedInstruction::Complete(Instruction {
                rt,
                immediate,
                ..blank(opcode)
            })
        }
        Lb | Lbu | Lh | Lhu | Lw | Lwu | Ld => {
            let rt = expect_gpr(ops.next().unwrap(), mnemonic_text, 0)?;
            let (offset, rs) = expect_mem(ops.next().unwrap(), mnemonic_text, 1)?;
            ParsedInstruction::Complete(Instruction {
                rs,
                rt,
                immediate: offset,
                ..blank(opcode)
            })
        }
        Sb | Sh | Sw | Sd => {
            let rt = expect_gpr(ops.next().unwrap(), mnemonic_text, 0)?;
            let (offset, rs) = expect_mem(ops.next().unwrap(), mnemonic_text, 1)?;
            ParsedInstruction::Complete(Instruction {
                rs,
                rt,
                immediate: offset,
                ..blank(opcode)
            })
        }
        LdC1 | SdC1 => {
            let rt = expect_fpr(ops.next().unwrap(), mnemonic_text, 0)?;
            let (offset, rs) = expect_mem(ops.next().unwrap(), mnemonic_text, 1)?;
            ParsedInstruction::Complete(Instruction {
                rs,
                rt,
                immediate: offset,
                ..blank(opcode)
            })
        }
        MovD | CvtDL | CvtLD => {
            let rd = expect_fpr(ops.next().unwrap(), mnemonic_text, 0)?;
            let rs = expect_fpr(ops.next().unwrap(), mnemonic_text, 1)?;
            ParsedInstruction::Complete(Instruction {
                rs,
                rd,
                ..blank(opcode)
            })
        }
        AddD | SubD | MulD | DivD => {
            let rd = expect_fpr(ops.next().unwrap(), mnemonic_text, 0)?;
            let rs = expect_fpr(ops.next().unwrap(), mnemonic_text, 1)?;
            let rt = expect_fpr(ops.next().unwrap(), mnemonic_text, 2)?;
            ParsedInstruction::Complete(Instruction {
                rs,
                rt,
                rd,
                ..blank(opcode)
            })
        }
        Beq | Bne => {
            let rs = expect_gpr(ops.next().unwrap(), mnemonic_text, 0)?;
            let rt = expect_gpr(ops.next().unwrap(), mnemonic_text, 1)?;
            let label = expect_label(ops.next().unwrap(), mnemonic_text, 2)?;
            ParsedInstruction::NeedsLabel(Unresolved {
                partial: Instruction {
                    rs,
                    rt,
                    ..blank(opcode)
                },
                label,
            })
        }
        Beqz | Bnez | Bgez | Bltz => {
            let rs = expect_gpr(ops.next().unwrap(), mnemonic_text, 0)?;
            let label = expect_label(ops.next().unwrap(), mnemonic_text, 1)?;
            ParsedInstruction::NeedsLabel(Unresolved {
                partial: Instruction {
                    rs,
                    ..blank(opcode)
                },
                label,
            })
        }
        J | Jal => {
            let label = expect_label(ops.next().unwrap(), mnemonic_text, 0)?;
            ParsedInstruction::NeedsLabel(Unresolved {
                partial: blank(opcode),
                label,
            })
        }
        Jr | Jalr => {
            let rs = expect_gpr(ops.next().unwrap(), mnemonic_text, 0)?;
            ParsedInstruction::Complete(Instruction {
                rs,
                ..blank(opcode)
            })
        }
        Halt | Syscall | Break | Trap | Nop => ParsedInstruction::Complete(blank(opcode)),
    };

    Ok(result)
}

/// Checks that an about-to-be-packed instruction's variable-width fields
/// actually fit the bits `isa::encode::pack` has for them, before handing it
/// off to `pack`. `J`/`JAL` resolve to an absolute byte address that may
/// exceed the 26-bit target field in a large program; every immediate- or
/// offset-bearing family is limited to 16 bits. Branch targets are exempt -
/// by design (see `Unresolved`'s doc comment) they live in `target`, not in
/// the packed immediate field, so there is nothing for `pack` to truncate.
fn validate_for_pack(instr: &Instruction) -> Result<(), ParseError> {
    match instr.opcode.family() {
        Family::AluI => {
            let unsigned = instr
                .opcode
                .operand_syntax()
                .contains(&OperandKind::UnsignedImmediate);
            let ok = if unsigned {
                fits_unsigned(instr.immediate as u64, 16)
            } else {
                fits_signed(instr.immediate, 16)
            };
            if !ok {
                return Err(ParseError::PackFailure(format!(
                    "{} immediate {} does not fit in 16 bits",
                    instr.opcode.mnemonic(),
                    instr.immediate
                )));
            }
        }
        Family::Load | Family::Store | Family::FpLoadStore => {
            if !fits_signed(instr.immediate, 16) {
                return Err(ParseError::PackFailure(format!(
                    "{} offset {} does not fit in 16 bits",
                    instr.opcode.mnemonic(),
                    instr.immediate
                )));
            }
        }
        Family::Jump if matches!(instr.opcode, Opcode::J | Opcode::Jal) => {
            if !fits_unsigned(instr.target, 26) {
                return Err(ParseError::AddressOutOfRange {
                    segment: "code",
                    address: instr.target,
                });
            }
        }
        _ => {}
    }
    Ok(())
}

/// Resolves the label on an [`Unresolved`] instruction against the now
/// fully-populated symbol table, filling in `target`. Any symbol kind is
/// accepted - a branch/jump to a data label is a program bug the simulator
/// will catch at runtime (as a misaligned or out-of-range fetch), not
/// something the assembler needs to reject up front.
///
/// Either way, once the instruction's operands are final this also packs it
/// into its 32-bit `encoding` via `isa::encode::pack`, after checking the
/// fields `pack` would otherwise silently truncate.
pub fn finalize_instruction(
    parsed: ParsedInstruction,
    symbols: &SymbolTable,
) -> Result<Instruction, ParseError> {
    let resolved = match parsed {
        ParsedInstruction::Complete(instr) => instr,
        ParsedInstruction::NeedsLabel(Unresolved { partial, label }) => {
            let (line, _) = label.start_pos().line_col();
            let symbol = symbols.get(label.as_str()).ok_or_else(|| ParseError::BadToken {
                line: line as u32,
                token: format!("undefined label {:?}", label.as_str()),
            })?;
            Instruction {
                target: symbol.address,
                ..partial
            }
        }
    };
    validate_for_pack(&resolved)?;
    Ok(Instruction {
        encoding: isa::pack(&resolved),
        ..resolved
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use edumips64::symbol::{Symbol, SymbolKind};

    fn complete(instr: Instruction) -> Instruction {
        finalize_instruction(ParsedInstruction::Complete(instr), &SymbolTable::new()).unwrap()
    }

    #[test]
    fn finalize_populates_the_encoding_field() {
        let instr = complete(Instruction {
            rs: 1,
            rt: 2,
            immediate: 4,
            ..blank(Opcode::Addi)
        });
        assert_eq!(instr.encoding, isa::pack(&instr));
        assert_ne!(instr.encoding, 0);
    }

    #[test]
    fn oversized_immediate_is_reported_as_a_pack_failure() {
        let err = finalize_instruction(
            ParsedInstruction::Complete(Instruction {
                rs: 1,
                rt: 2,
                immediate: i64::from(u16::MAX) + 1,
                ..blank(Opcode::Addi)
            }),
            &SymbolTable::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::PackFailure(_)));
    }

    #[test]
    fn jump_target_past_the_26_bit_field_is_an_address_range_error() {
        let mut symbols = SymbolTable::new();
        symbols
            .insert(
                "far",
                Symbol {
                    kind: SymbolKind::Code,
                    address: 1 << 26,
                },
            )
            .unwrap();
        let err = finalize_instruction(
            ParsedInstruction::NeedsLabel(Unresolved {
                partial: blank(Opcode::J),
                label: dummy_span("far"),
            }),
            &symbols,
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::AddressOutOfRange { .. }));
    }

    /// Builds a throwaway [`Span`] over `text` for tests that need a label
    /// span but have no real parse tree to pull one from.
    fn dummy_span(text: &'static str) -> Span<'static> {
        let start = pest::Position::from_start(text);
        let end = pest::Position::new(text, text.len()).unwrap();
        start.span(&end)
    }
}
