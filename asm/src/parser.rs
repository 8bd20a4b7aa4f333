//! The pest-derived grammar. `Rule` is the token enum every other module in
//! this crate matches on while walking a parsed [`pest::iterators::Pair`]
//! tree.

use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct AsmParser;
