//! Errors raised by `mrpc`.
//!
//! Mirrors `mnet::Error`'s split: validation failures are synchronous and
//! carry no wire activity (spec §7's *Validation* category); everything
//! past that point either succeeds or times out as a drop.

#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("function '{name}' expects {expected} argument(s), got {got}")]
    ArgCount { name: String, expected: usize, got: usize },

    #[error("function '{name}' argument '{param}' does not match declared type(s) '{types}'")]
    ArgType { name: String, param: String, types: String },

    #[error("function '{name}' return value does not match declared type(s) '{types}' at position {index}")]
    ReturnType { name: String, types: String, index: usize },

    #[error("no function declared with name '{name}'")]
    UndeclaredFunction { name: String },

    #[error("call to '{name}' was not acknowledged before dropTime elapsed")]
    Drop { name: String },

    #[error(transparent)]
    Transport(#[from] mnet::Error),
}
