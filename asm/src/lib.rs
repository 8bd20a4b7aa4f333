//! Assembler for [`edumips64`](../edumips64/index.html).
//!
//! [`assemble`] turns EduMIPS64 assembly source into a [`Program`]: a
//! decoded instruction stream, the initial data segment, the symbol table
//! built along the way, and a [`SourceMap`] tying each instruction back to
//! the source line it came from. Parsing is two-pass: the `.data` section
//! is walked first so every data label exists before the `.code`/`.text`
//! section resolves branch and jump targets against the same table.
//!
//! Errors are accumulated into a [`ParseReport`] rather than aborting at
//! the first offense - one bad line doesn't hide a second bad line later
//! in the file.
//!
//! Parsing the assembly language is implemented using [pest]. The grammar
//! lives in `grammar.pest` and is compiled into the [`parser::Rule`] enum
//! every other module in this crate matches against.
//!
//! [pest]: https://docs.rs/pest/

mod data;
mod instructions;
mod int_util;
mod labels;
mod parser;
mod source_map;

use edumips64::constants::WORD_BYTES;
use edumips64::error::{ParseError, ParseReport};
use edumips64::isa::{Instruction, Opcode};
use edumips64::memory::Memory;
use edumips64::symbol::{SymbolKind, SymbolTable};
use instructions::blank;
use parser::{AsmParser, Rule};
use pest::iterators::Pair;
use pest::Parser;
pub use source_map::{SourceMap, SourceMapItem};

/// The product of a successful assemble: a decoded program ready to be
/// loaded into a [`edumips64::simulator::Simulator`].
pub struct Program {
    pub code: Vec<Instruction>,
    pub data: Memory,
    pub symbols: SymbolTable,
    pub source_map: SourceMap,
}

fn pest_error_to_parse_error(err: pest::error::Error<Rule>) -> ParseError {
    let line = match err.line_col {
        pest::error::LineColLocation::Pos((line, _)) => line,
        pest::error::LineColLocation::Span((line, _), _) => line,
    };
    ParseError::BadToken {
        line: line as u32,
        token: err.to_string(),
    }
}

/// Finds the `data_section`/`code_section` sub-pairs of a parsed `program`.
/// Positional indexing would also work given the grammar's fixed section
/// order, but matching on `as_rule()` doesn't care whether a silent rule
/// like `EOI` happens to show up as a sibling pair.
fn split_sections(program: Pair<Rule>) -> (Pair<Rule>, Pair<Rule>) {
    let mut data_section = None;
    let mut code_section = None;
    for inner in program.into_inner() {
        match inner.as_rule() {
            Rule::data_section => data_section = Some(inner),
            Rule::code_section => code_section = Some(inner),
            _ => {}
        }
    }
    (
        data_section.expect("grammar guarantees exactly one data_section"),
        code_section.expect("grammar guarantees exactly one code_section"),
    )
}

/// Walks every line of a parsed `code_section` pair, decoding each into an
/// `instructions::ParsedInstruction` and registering code labels along the
/// way. A line that fails to decode still reserves its instruction slot (as
/// a `Nop`) so addresses further down the section, and the source map, stay
/// aligned with the line count; its error is pushed onto `report`.
fn process_code_section<'i>(
    pair: Pair<'i, Rule>,
    symbols: &mut SymbolTable,
    report: &mut ParseReport,
) -> (Vec<instructions::ParsedInstruction<'i>>, SourceMap) {
    let mut parsed = Vec::new();
    let mut source_map = SourceMap::new();

    for line in pair.into_inner() {
        let span = line.as_span();
        let (start_line, _) = span.start_pos().line_col();
        let address = parsed.len() as u64 * WORD_BYTES as u64;

        let mut decoded = None;
        let result = labels::with_label_and_content(line, symbols, SymbolKind::Code, address, |p| {
            match instructions::process_instruction(p) {
                Ok(instr) => {
                    decoded = Some(instr);
                    Ok(())
                }
                Err(err) => Err(err),
            }
        });

        match result {
            Ok(()) => {
                if let Some(instr) = decoded {
                    parsed.push(instr);
                    source_map.push(SourceMapItem {
                        start_line: start_line as u32,
                        line_count: 1,
                    });
                }
            }
            Err(err) => {
                report.push(err);
                parsed.push(instructions::ParsedInstruction::Complete(blank(Opcode::Nop)));
                source_map.push(SourceMapItem {
                    start_line: start_line as u32,
                    line_count: 1,
                });
            }
        }
    }

    (parsed, source_map)
}

/// Resolves every `NeedsLabel` instruction's target against the now
/// complete symbol table. An unresolvable label leaves a `Nop` in its slot
/// (again keeping instruction addresses and the source map aligned) and is
/// recorded in `report`.
fn finalize_code(
    parsed: Vec<instructions::ParsedInstruction>,
    symbols: &SymbolTable,
    report: &mut ParseReport,
) -> Vec<Instruction> {
    parsed
        .into_iter()
        .map(|item| match instructions::finalize_instruction(item, symbols) {
            Ok(instr) => instr,
            Err(err) => {
                report.push(err);
                blank(Opcode::Nop)
            }
        })
        .collect()
}

/// Assembles a complete EduMIPS64 source file into a [`Program`].
///
/// `data_memory_size` sets the minimum size of the returned data memory;
/// it is grown automatically if the `.data` section needs more room.
pub fn assemble(input: &str, data_memory_size: usize) -> Result<Program, ParseReport> {
    let mut report = ParseReport::default();

    let program = match AsmParser::parse(Rule::program, input) {
        Ok(mut pairs) => pairs.next().unwrap(),
        Err(err) => {
            report.push(pest_error_to_parse_error(err));
            return Err(report);
        }
    };

    let (data_section, code_section) = split_sections(program);

    let mut symbols = SymbolTable::new();
    let data_bytes = data::process_data_section(data_section, &mut symbols, &mut report);
    let (parsed, source_map) = process_code_section(code_section, &mut symbols, &mut report);
    let code = finalize_code(parsed, &symbols, &mut report);

    if !report.is_empty() {
        return Err(report);
    }

    let mut data = Memory::new(data_memory_size.max(data_bytes.len()));
    data.load(0, &data_bytes);

    Ok(Program {
        code,
        data,
        symbols,
        source_map,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn assembles_a_minimal_program() {
        let source = "\
.data
count: .word32 1
.code
main:
    lw r1, 0(r0)
    addi r2, r1, 1
    halt
";
        let program = assemble(source, 64).unwrap();
        assert_eq!(program.code.len(), 3);
        assert_eq!(program.code[0].opcode, Opcode::Lw);
        assert_eq!(program.code[2].opcode, Opcode::Halt);
        assert_eq!(program.symbols.get("count").unwrap().address, 0);
        assert_eq!(program.symbols.get("main").unwrap().address, 0);
        assert_eq!(program.data.len(), 64);
    }

    #[test]
    fn label_after_an_odd_length_byte_run_points_at_the_padded_address() {
        let source = "\
.data
a: .byte 1
b: .word32 2
.code
    halt
";
        let program = assemble(source, 0).unwrap();
        assert_eq!(program.symbols.get("a").unwrap().address, 0);
        // `b` must land on the 4-byte-aligned address .word32 actually
        // writes to, not the pre-padding cursor position (1).
        assert_eq!(program.symbols.get("b").unwrap().address, 4);
        assert_eq!(program.data.len(), 8);
    }

    #[test]
    fn branch_label_resolves_to_an_absolute_code_address() {
        let source = "\
.data
.code
loop:
    addi r1, r1, -1
    bnez r1, loop
    halt
";
        let program = assemble(source, 0).unwrap();
        assert_eq!(program.code[1].opcode, Opcode::Bnez);
        assert_eq!(program.code[1].target, 0);
    }

    #[test]
    fn undefined_label_is_reported_without_aborting_the_rest_of_the_section() {
        let source = "\
.data
.code
main:
    j nowhere
    halt
";
        let report = assemble(source, 0).unwrap_err();
        assert_eq!(report.0.len(), 1);
    }

    #[test]
    fn unknown_mnemonic_and_a_later_error_are_both_reported() {
        let source = "\
.data
.code
main:
    frobnicate r1, r2
    j nowhere
";
        let report = assemble(source, 0).unwrap_err();
        assert_eq!(report.0.len(), 2);
    }
}
