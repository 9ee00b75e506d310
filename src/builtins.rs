/// Functions resolved by name before any user-defined function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFunction {
    Print,
    Println,
    Rand,
    Time,
    TimeMs,
}

impl BuiltinFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "print" => Some(Self::Print),
            "println" => Some(Self::Println),
            "rand" => Some(Self::Rand),
            "time" => Some(Self::Time),
            "time_ms" => Some(Self::TimeMs),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::Println => "println",
            Self::Rand => "rand",
            Self::Time => "time",
            Self::TimeMs => "time_ms",
        }
    }

    /// Whether a call produces a value usable as an expression.
    pub fn returns_value(self) -> bool {
        matches!(self, Self::Rand | Self::Time | Self::TimeMs)
    }
}

/// Symbols supplied by the native runtime that compiled programs link against.
pub mod symbols {
    pub const ENTRY: &str = "smickelscript_entry";
    pub const INIT: &str = "smickelscript_init";
    pub const SEED: &str = "smickelscript_seed";
    pub const RAND: &str = "smickelscript_rand";
    pub const TIME: &str = "smickelscript_time";
    pub const TIME_MS: &str = "smickelscript_time_ms";
    pub const MODULO: &str = "smickelscript_modulo";
    pub const PRINT_STR: &str = "print_str";
    pub const PRINTLN_STR: &str = "println_str";
    pub const PRINT_INTEGER: &str = "print_integer";
    pub const PRINTLN_INTEGER: &str = "println_integer";
    pub const PRINT_INT_AS_CHAR: &str = "print_int_as_char";

    /// Helpers a program may call directly by name.
    pub const DIRECT_HELPERS: [&str; 5] = [
        PRINT_STR,
        PRINTLN_STR,
        PRINT_INTEGER,
        PRINTLN_INTEGER,
        PRINT_INT_AS_CHAR,
    ];

    pub fn is_direct_helper(name: &str) -> bool {
        DIRECT_HELPERS.contains(&name)
    }

    /// Prefixes of labels the generator and the runtime own.
    pub const RESERVED_PREFIXES: [&str; 3] = ["smickelscript_", "literal_", "static_"];

    /// Whether a user function labelled `name` would clash with a generated
    /// or runtime symbol.
    pub fn is_reserved(name: &str) -> bool {
        is_direct_helper(name)
            || RESERVED_PREFIXES
                .iter()
                .any(|prefix| name.starts_with(prefix))
    }
}
