//! Dynamic RPC values and their declared type vocabulary (spec §4.10).
//!
//! Arguments and return values are untyped at the Rust level — any payload
//! has to survive going over the wire as MessagePack and being validated
//! against a declaration the two ends agreed on independently — so this
//! crate reuses `rmpv::Value` directly rather than inventing a parallel
//! enum.

pub type RpcValue = rmpv::Value;

/// The fixed type vocabulary a `typeList` is drawn from (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcType {
    String,
    Number,
    Boolean,
    Table,
    /// Functions can't cross the wire; a declaration naming this type can
    /// only ever be satisfied locally, never by a remote call.
    Function,
    Any,
    Nil,
}

impl RpcType {
    fn parse(token: &str) -> Option<Self> {
        match token.trim() {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "table" => Some(Self::Table),
            "function" => Some(Self::Function),
            "any" => Some(Self::Any),
            "nil" => Some(Self::Nil),
            _ => None,
        }
    }

    fn matches(self, value: &RpcValue) -> bool {
        match self {
            Self::Any => true,
            Self::Nil => value.is_nil(),
            Self::String => value.is_str(),
            Self::Number => value.is_i64() || value.is_u64() || value.is_f64(),
            Self::Boolean => value.is_bool(),
            Self::Table => value.is_map() || value.is_array(),
            Self::Function => false,
        }
    }
}

/// One declared parameter: a name and the set of types it accepts,
/// e.g. `itemName: string,nil`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    types: Vec<RpcType>,
}

impl ParamSpec {
    /// `type_list` is the comma-delimited vocabulary string from spec
    /// §4.10. Unknown tokens are ignored — an empty resulting type set
    /// matches nothing, which surfaces as a validation error on first use
    /// rather than panicking at declaration time.
    pub fn new(name: impl Into<String>, type_list: &str) -> Self {
        let types = type_list.split(',').filter_map(RpcType::parse).collect();
        Self { name: name.into(), types }
    }

    pub fn accepts(&self, value: &RpcValue) -> bool {
        self.types.iter().any(|t| t.matches(value))
    }

    pub fn type_list(&self) -> String {
        self.types
            .iter()
            .map(|t| match t {
                RpcType::String => "string",
                RpcType::Number => "number",
                RpcType::Boolean => "boolean",
                RpcType::Table => "table",
                RpcType::Function => "function",
                RpcType::Any => "any",
                RpcType::Nil => "nil",
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_any_of_the_declared_types() {
        let spec = ParamSpec::new("itemName", "string,nil");
        assert!(spec.accepts(&RpcValue::from("pickaxe")));
        assert!(spec.accepts(&RpcValue::Nil));
        assert!(!spec.accepts(&RpcValue::from(10)));
    }

    #[test]
    fn number_accepts_integers_and_floats() {
        let spec = ParamSpec::new("amount", "number");
        assert!(spec.accepts(&RpcValue::from(10_001)));
        assert!(spec.accepts(&RpcValue::from(3.5)));
        assert!(!spec.accepts(&RpcValue::from("10")));
    }

    #[test]
    fn unknown_type_token_matches_nothing() {
        let spec = ParamSpec::new("weird", "bogus");
        assert!(!spec.accepts(&RpcValue::Nil));
        assert!(!spec.accepts(&RpcValue::from(1)));
    }
}
