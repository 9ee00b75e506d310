use rustc_hash::FxHashMap;
use tracing::trace;

use crate::ast::Literal;

use super::ValueKind;
use super::error::CodegenError;

/// Initial contents of a data-section symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaticData {
    Word(i32),
    /// Zero-terminated bytes.
    Text(String),
    /// `size` words; the leading ones come from `values`, the rest are zero.
    Words { values: Vec<i32>, size: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticSymbol {
    pub label: String,
    pub kind: ValueKind,
    pub data: StaticData,
}

impl StaticSymbol {
    /// Number of addressable elements, for statically checked indices.
    pub fn len(&self) -> Option<usize> {
        match &self.data {
            StaticData::Word(_) => None,
            StaticData::Text(text) => Some(text.len()),
            StaticData::Words { size, .. } => Some(*size),
        }
    }
}

/// Named statics plus the anonymous literal pool, rendered as `.data`.
#[derive(Debug, Default)]
pub struct StaticTable {
    symbols: Vec<StaticSymbol>,
    named: FxHashMap<String, usize>,
    literals: usize,
}

impl StaticTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(
        &mut self,
        name: &str,
        kind: ValueKind,
        data: StaticData,
    ) -> Result<&StaticSymbol, CodegenError> {
        if self.named.contains_key(name) {
            return Err(CodegenError::StaticRedeclared {
                name: name.to_string(),
            });
        }
        let label = format!("static_{name}");
        trace!(%label, ?kind, "allocated static");
        self.named.insert(name.to_string(), self.symbols.len());
        self.symbols.push(StaticSymbol { label, kind, data });
        Ok(&self.symbols[self.symbols.len() - 1])
    }

    pub fn lookup(&self, name: &str) -> Option<&StaticSymbol> {
        self.named.get(name).map(|&index| &self.symbols[index])
    }

    /// Allocates a fresh label holding `text` and returns it.
    pub fn literal(&mut self, text: &str) -> String {
        let label = format!("literal_{}", self.literals);
        self.literals += 1;
        self.symbols.push(StaticSymbol {
            label: label.clone(),
            kind: ValueKind::Text,
            data: StaticData::Text(text.to_string()),
        });
        label
    }

    /// Allocates a zeroed word recording whether the static at `label` has
    /// been initialized, and returns its label.
    pub fn flag(&mut self, label: &str) -> String {
        let flag = format!("{label}.ready");
        self.symbols.push(StaticSymbol {
            label: flag.clone(),
            kind: ValueKind::Bool,
            data: StaticData::Word(0),
        });
        flag
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::from(".data\n");
        for symbol in &self.symbols {
            let label = &symbol.label;
            match &symbol.data {
                StaticData::Word(value) => {
                    out.push_str(&format!("  .align 2\n{label}:\n  .word {value}\n"));
                }
                StaticData::Text(text) => {
                    out.push_str(&format!("{label}:\n  .asciz \"{}\"\n", escape(text)));
                }
                StaticData::Words { values, size } => {
                    out.push_str(&format!("  .align 2\n{label}:\n"));
                    if !values.is_empty() {
                        let words = values
                            .iter()
                            .map(i32::to_string)
                            .collect::<Vec<_>>()
                            .join(", ");
                        out.push_str(&format!("  .word {words}\n"));
                    }
                    let padding = size.saturating_sub(values.len());
                    if padding > 0 {
                        out.push_str(&format!("  .space {}\n", padding.saturating_mul(4)));
                    }
                }
            }
        }
        out
    }
}

/// Seeds an array the same way the interpreter does: strings contribute their
/// character codes, other literals fill the first slot.
pub fn array_data(size: usize, initializer: Option<&Literal>) -> StaticData {
    let values = match initializer {
        Some(Literal::String(text)) => text.chars().take(size).map(|ch| ch as i32).collect(),
        Some(Literal::Number(value)) if size > 0 => vec![*value],
        Some(Literal::Bool(value)) if size > 0 => vec![i32::from(*value)],
        _ => Vec::new(),
    };
    StaticData::Words { values, size }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            c if c.is_ascii_control() => escaped.push_str(&format!("\\{:03o}", c as u32)),
            c => escaped.push(c),
        }
    }
    escaped
}
