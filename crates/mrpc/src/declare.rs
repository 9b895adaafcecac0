//! Function declarations and argument/return validation (spec §4.10).

use crate::error::Error;
use crate::value::{ParamSpec, RpcValue};

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub args: Vec<ParamSpec>,
    pub returns: Option<Vec<ParamSpec>>,
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>, args: Vec<ParamSpec>, returns: Option<Vec<ParamSpec>>) -> Self {
        Self { name: name.into(), args, returns }
    }
}

/// Validates `values` against `spec`, positionally. Used for both argument
/// validation (before wire transmission or local dispatch) and return-value
/// validation (before a sync call's reply is sent) — spec §4.10: "Validation
/// throws on mismatch before wire transmission or local dispatch."
pub fn validate(function_name: &str, spec: &[ParamSpec], values: &[RpcValue], is_return: bool) -> Result<(), Error> {
    if values.len() != spec.len() {
        return Err(Error::ArgCount { name: function_name.to_string(), expected: spec.len(), got: values.len() });
    }
    for (index, (param, value)) in spec.iter().zip(values).enumerate() {
        if !param.accepts(value) {
            return if is_return {
                Err(Error::ReturnType { name: function_name.to_string(), types: param.type_list(), index })
            } else {
                Err(Error::ArgType { name: function_name.to_string(), param: param.name.clone(), types: param.type_list() })
            };
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_argument_count() {
        let spec = vec![ParamSpec::new("amount", "number")];
        let err = validate("f", &spec, &[], false).unwrap_err();
        assert!(matches!(err, Error::ArgCount { .. }));
    }

    #[test]
    fn rejects_mismatched_type() {
        let spec = vec![ParamSpec::new("amount", "number")];
        let err = validate("f", &spec, &[RpcValue::from("not a number")], false).unwrap_err();
        assert!(matches!(err, Error::ArgType { .. }));
    }

    #[test]
    fn accepts_matching_values() {
        let spec = vec![ParamSpec::new("itemName", "string,nil"), ParamSpec::new("amount", "number")];
        assert!(validate("f", &spec, &[RpcValue::Nil, RpcValue::from(5)], false).is_ok());
    }
}
