//! The symbol table: a bijective, case-insensitive mapping from labels to
//! either a code address or a data address.

use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SymbolKind {
    Code,
    Data,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub address: u64,
}

#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    fn normalize(label: &str) -> String {
        label.to_ascii_lowercase()
    }

    /// Registers `label → symbol`. Returns the offending label (to build a
    /// `ParseError::SameLabels`) if it is already defined.
    pub fn insert(&mut self, label: &str, symbol: Symbol) -> Result<(), String> {
        let key = Self::normalize(label);
        if self.symbols.contains_key(&key) {
            Err(label.to_string())
        } else {
            self.symbols.insert(key, symbol);
            Ok(())
        }
    }

    pub fn get(&self, label: &str) -> Option<Symbol> {
        self.symbols.get(&Self::normalize(label)).copied()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut table = SymbolTable::new();
        table
            .insert(
                "Loop",
                Symbol {
                    kind: SymbolKind::Code,
                    address: 16,
                },
            )
            .unwrap();
        assert_eq!(table.get("loop").unwrap().address, 16);
        assert_eq!(table.get("LOOP").unwrap().address, 16);
    }

    #[test]
    fn duplicate_label_fails() {
        let mut table = SymbolTable::new();
        let sym = Symbol {
            kind: SymbolKind::Data,
            address: 0,
        };
        table.insert("x", sym).unwrap();
        assert_eq!(table.insert("X", sym), Err("X".to_string()));
    }
}
