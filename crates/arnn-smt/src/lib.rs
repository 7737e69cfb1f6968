//! Oracle side of arnn: the decision-procedure contract the CEGAR loop
//! queries, and an implementation backed by a Z3 process.
//!
//! Networks and properties are encoded as `QF_LRA` SMT-LIB queries with
//! ReLU as `ite`. A `sat` answer carries a model, parsed back into an input
//! assignment.

mod encoder;
mod model_parser;
mod oracle;
mod z3;

pub use encoder::{real_literal, EncodedNetwork, QueryEncoder};
pub use model_parser::{parse_model, parse_model_to_map, parse_value_literal};
pub use oracle::{Oracle, OracleOutcome, OracleStatus};
pub use z3::{parse_check_sat, Z3Oracle, Z3OracleConfig, Z3Presolver};

use arnn_core::ArnnError;
use thiserror::Error;

/// Errors from encoding queries and talking to the solver process.
#[derive(Debug, Error)]
pub enum SmtError {
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Solver not available: {0}")]
    Unavailable(String),

    #[error("Solver error: {0}")]
    Solver(String),

    #[error("Could not read model: {0}")]
    Model(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] ArnnError),
}

pub type Result<T> = std::result::Result<T, SmtError>;

impl From<SmtError> for ArnnError {
    fn from(err: SmtError) -> Self {
        match err {
            SmtError::Core(inner) => inner,
            other => ArnnError::Oracle(other.to_string()),
        }
    }
}
