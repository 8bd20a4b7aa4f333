//! The `.data` section strategy: walks each labeled line, dispatches on the
//! data-type sub-directive, and appends the encoded bytes to the segment's
//! backing buffer, padding the cursor up to the type's natural alignment
//! first.

use crate::int_util::{process_int, process_string, process_uint};
use crate::parser::Rule;
use edumips64::error::ParseError;
use edumips64::symbol::{SymbolKind, SymbolTable};
use byteorder::{ByteOrder, LittleEndian};
use pest::iterators::Pair;

fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) / align * align
}

fn pad_to(data: &mut Vec<u8>, align: usize) {
    let target = align_up(data.len(), align);
    data.resize(target, 0);
}

/// Whether `value` fits in a `bits`-wide field under either a signed or an
/// unsigned reading - `.byte 1, -45, 0xFF` mixes both conventions in the
/// same list, so a literal is accepted if it fits in either.
fn fits(value: i64, bits: u32) -> bool {
    if bits >= 64 {
        return true;
    }
    let smin = -(1i64 << (bits - 1));
    let smax = (1i64 << (bits - 1)) - 1;
    let umax = (1u64 << bits) - 1;
    (value >= smin && value <= smax) || (value >= 0 && (value as u64) <= umax)
}

fn push_int_list(
    pair: Pair<Rule>,
    data: &mut Vec<u8>,
    bits: u32,
    write: fn(&mut [u8], u64),
) -> Result<(), ParseError> {
    let width = (bits / 8) as usize;
    pad_to(data, width);
    for int_pair in pair.into_inner() {
        let span = int_pair.as_span();
        let value = process_int(int_pair)?;
        if !fits(value, bits) {
            let (line, _) = span.start_pos().line_col();
            return Err(ParseError::BadToken {
                line: line as u32,
                token: format!("{} does not fit in {} bits", value, bits),
            });
        }
        let start = data.len();
        data.resize(start + width, 0);
        write(&mut data[start..start + width], value as u64);
    }
    Ok(())
}

fn push_float_list(
    pair: Pair<Rule>,
    data: &mut Vec<u8>,
    single_precision: bool,
) -> Result<(), ParseError> {
    let width = if single_precision { 4 } else { 8 };
    pad_to(data, width);
    for float_pair in pair.into_inner() {
        let value = crate::int_util::process_float(float_pair)?;
        let start = data.len();
        data.resize(start + width, 0);
        if single_precision {
            LittleEndian::write_f32(&mut data[start..start + width], value as f32);
        } else {
            LittleEndian::write_f64(&mut data[start..start + width], value);
        }
    }
    Ok(())
}

fn process_data_directive(pair: Pair<Rule>, data: &mut Vec<u8>) -> Result<(), ParseError> {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::data_byte => push_int_list(
            inner.into_inner().next().unwrap(),
            data,
            8,
            |dst, v| dst[0] = v as u8,
        ),
        Rule::data_word16 => push_int_list(
            inner.into_inner().next().unwrap(),
            data,
            16,
            |dst, v| LittleEndian::write_u16(dst, v as u16),
        ),
        Rule::data_word32 | Rule::data_word => push_int_list(
            inner.into_inner().next().unwrap(),
            data,
            32,
            |dst, v| LittleEndian::write_u32(dst, v as u32),
        ),
        Rule::data_word64 => push_int_list(
            inner.into_inner().next().unwrap(),
            data,
            64,
            |dst, v| LittleEndian::write_u64(dst, v),
        ),
        Rule::data_float => push_float_list(inner.into_inner().next().unwrap(), data, true),
        Rule::data_double => push_float_list(inner.into_inner().next().unwrap(), data, false),
        Rule::data_ascii => {
            let bytes = process_string(inner.into_inner().next().unwrap());
            data.extend_from_slice(&bytes);
            Ok(())
        }
        Rule::data_asciiz => {
            let mut bytes = process_string(inner.into_inner().next().unwrap());
            bytes.push(0);
            data.extend_from_slice(&bytes);
            Ok(())
        }
        Rule::data_space => {
            let count = process_uint(inner.into_inner().next().unwrap())? as usize;
            data.resize(data.len() + count, 0);
            Ok(())
        }
        _ => unreachable!("data_directive grammar changed without updating process_data_directive"),
    }
}

/// Looks at a `data_line`'s content pair (skipping a leading `label` child,
/// if present) without consuming it, so its natural alignment can be
/// applied before a label on the same line captures an address.
fn peek_content(line: Pair<Rule>) -> Option<Pair<Rule>> {
    let mut pairs = line.into_inner();
    let mut next = pairs.next();
    if let Some(candidate) = &next {
        if candidate.as_rule() == Rule::label {
            next = pairs.next();
        }
    }
    next
}

/// The natural alignment, in bytes, of a `data_directive` pair's element
/// type - the same widths `push_int_list`/`push_float_list` pad to.
fn directive_alignment(content: &Pair<Rule>) -> usize {
    let inner = match content.clone().into_inner().next() {
        Some(inner) => inner,
        None => return 1,
    };
    match inner.as_rule() {
        Rule::data_byte => 1,
        Rule::data_word16 => 2,
        Rule::data_word32 | Rule::data_word => 4,
        Rule::data_word64 => 8,
        Rule::data_float => 4,
        Rule::data_double => 8,
        Rule::data_ascii | Rule::data_asciiz | Rule::data_space => 1,
        _ => 1,
    }
}

/// Walks every line of a parsed `data_section` pair, returning the encoded
/// segment bytes. A label is registered into `symbols` at the address its
/// line's element will actually land at: the segment cursor is padded to
/// that element's natural alignment *before* the address is captured, so a
/// label immediately preceding (say) a `.word32` after an odd-length
/// `.byte` run points at the padded, aligned start - not the pre-pad
/// cursor position.
///
/// A line that fails to parse contributes no bytes and its error is pushed
/// onto `report`; every other line in the section is still processed, so a
/// single bad `.word32` doesn't hide problems later in the segment.
pub fn process_data_section(
    pair: Pair<Rule>,
    symbols: &mut SymbolTable,
    report: &mut edumips64::error::ParseReport,
) -> Vec<u8> {
    let mut data = Vec::new();

    for line in pair.into_inner() {
        if let Some(content) = peek_content(line.clone()) {
            pad_to(&mut data, directive_alignment(&content));
        }
        let address = data.len() as u64;
        let result = crate::labels::with_label_and_content(line, symbols, SymbolKind::Data, address, |p| {
            process_data_directive(p, &mut data)
        });
        if let Err(err) = result {
            report.push(err);
        }
    }

    data
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::AsmParser;
    use pest::Parser;

    fn parse_directive(input: &str) -> Pair<'_, Rule> {
        AsmParser::parse(Rule::data_directive, input)
            .unwrap()
            .next()
            .unwrap()
    }

    #[test]
    fn byte_list_accepts_mixed_signed_and_hex_literals() {
        let mut out = Vec::new();
        process_data_directive(parse_directive(".byte 1, -45, 0xFF"), &mut out).unwrap();
        assert_eq!(out, vec![1u8, (-45i8) as u8, 0xFF]);
    }

    #[test]
    fn word32_is_little_endian() {
        let mut out = Vec::new();
        process_data_directive(parse_directive(".word32 0x01020304"), &mut out).unwrap();
        assert_eq!(out, vec![0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn asciiz_appends_a_trailing_nul() {
        let mut out = Vec::new();
        process_data_directive(parse_directive(r#".asciiz "hi""#), &mut out).unwrap();
        assert_eq!(out, vec![b'h', b'i', 0]);
    }

    #[test]
    fn word16_after_a_byte_pads_to_even_alignment() {
        let mut out = vec![0u8; 1];
        process_data_directive(parse_directive(".word16 1"), &mut out).unwrap();
        assert_eq!(out.len(), 4);
    }
}
