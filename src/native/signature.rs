//! @ai:module:intent Declared argument kinds of a kernel entry point
//! @ai:module:layer domain
//! @ai:module:public_api EntryPointSignature, ArgKind, ScalarType
//! @ai:module:stateless true

use crate::device::ElementType;
use serde::{Deserialize, Serialize};

/// Symbol looked up when a problem does not name one.
pub const DEFAULT_ENTRY_SYMBOL: &str = "solution";

/// @ai:intent C scalar types an entry point may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    I32,
    I64,
    U32,
    U64,
    F32,
    F64,
}

impl ScalarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::I32 => "i32",
            ScalarType::I64 => "i64",
            ScalarType::U32 => "u32",
            ScalarType::U64 => "u64",
            ScalarType::F32 => "f32",
            ScalarType::F64 => "f64",
        }
    }
}

/// @ai:intent Kind of one positional argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "type")]
pub enum ArgKind {
    Input(ElementType),
    Output(ElementType),
    Scalar(ScalarType),
}

impl ArgKind {
    pub fn is_pointer(&self) -> bool {
        !matches!(self, ArgKind::Scalar(_))
    }
}

impl std::fmt::Display for ArgKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgKind::Input(ty) => write!(f, "input {ty}*"),
            ArgKind::Output(ty) => write!(f, "output {ty}*"),
            ArgKind::Scalar(ty) => write!(f, "scalar {}", ty.as_str()),
        }
    }
}

/// @ai:intent Exported symbol plus its ordered argument kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPointSignature {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    pub args: Vec<ArgKind>,
}

impl EntryPointSignature {
    /// @ai:intent Signature of the default `solution` symbol
    /// @ai:effects pure
    pub fn new(args: Vec<ArgKind>) -> Self {
        Self {
            symbol: DEFAULT_ENTRY_SYMBOL.to_string(),
            args,
        }
    }

    /// @ai:intent Number of declared arguments
    /// @ai:effects pure
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

fn default_symbol() -> String {
    DEFAULT_ENTRY_SYMBOL.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_signature_from_json_defaults_symbol() {
        let signature: EntryPointSignature = serde_json::from_str(
            r#"{"args": [
                {"kind": "input", "type": "float32"},
                {"kind": "output", "type": "float32"},
                {"kind": "scalar", "type": "u64"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(
            signature,
            EntryPointSignature::new(vec![
                ArgKind::Input(ElementType::Float32),
                ArgKind::Output(ElementType::Float32),
                ArgKind::Scalar(ScalarType::U64),
            ])
        );
        assert_eq!(signature.arity(), 3);
    }

    #[test]
    fn test_arg_kind_display() {
        assert_eq!(ArgKind::Input(ElementType::Float16).to_string(), "input float16*");
        assert_eq!(ArgKind::Scalar(ScalarType::I32).to_string(), "scalar i32");
        assert!(!ArgKind::Scalar(ScalarType::F32).is_pointer());
    }
}
