use std::fmt;

use serde::Deserialize;

/// Coarse classification shared by interpreter and compiler failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    /// Missing entrypoint, duplicate or undefined identifiers, arity mismatches.
    Structural,
    /// Value does not match a declared type, or an illegal `void` declaration.
    Type,
    /// Implicit-return ambiguity or a name outside the visible scope.
    Scope,
    /// The code generator ran out of registers for locals.
    ResourceLimit,
    /// Index out of range or division by zero.
    Bounds,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Structural => "structural",
            ErrorCategory::Type => "type",
            ErrorCategory::Scope => "scope",
            ErrorCategory::ResourceLimit => "resource-limit",
            ErrorCategory::Bounds => "bounds",
        };
        f.write_str(name)
    }
}

/// Renders a backend error with the source line it was raised on, if known.
pub(crate) fn located(line: &Option<usize>, message: &impl fmt::Display) -> String {
    match line {
        Some(line) => format!("Error on line {line}. {message}"),
        None => message.to_string(),
    }
}
