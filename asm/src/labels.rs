//! Pulls the optional leading `label:` off a `data_line`/`code_line` pair
//! and registers it in the shared symbol table before handing the
//! remaining content (a `data_directive` or `instruction` pair, if any) to
//! the caller.

use crate::parser::Rule;
use edumips64::error::ParseError;
use edumips64::symbol::{Symbol, SymbolKind, SymbolTable};
use pest::iterators::Pair;

/// Registers `label -> address` under `kind`, or returns `SameLabels` if the
/// label was already defined earlier in the source (by either section).
pub fn declare_label(
    symbols: &mut SymbolTable,
    label: &str,
    kind: SymbolKind,
    address: u64,
) -> Result<(), ParseError> {
    symbols
        .insert(label, Symbol { kind, address })
        .map_err(ParseError::SameLabels)
}

/// Strips an optional leading `label` pair from `line`'s children, handing
/// the content pair (if the line wasn't just a bare label) to `op`.
pub fn with_label_and_content<'i, F>(
    line: Pair<'i, Rule>,
    symbols: &mut SymbolTable,
    kind: SymbolKind,
    address: u64,
    op: F,
) -> Result<(), ParseError>
where
    F: FnOnce(Pair<'i, Rule>) -> Result<(), ParseError>,
{
    let mut pairs = line.into_inner();
    let mut next = pairs.next();

    if let Some(candidate) = &next {
        if candidate.as_rule() == Rule::label {
            declare_label(symbols, candidate.as_str(), kind, address)?;
            next = pairs.next();
        }
    }

    if let Some(content) = next {
        op(content)?;
    }

    Ok(())
}
