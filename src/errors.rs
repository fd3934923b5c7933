use miette::Diagnostic;
use thiserror::Error;

use crate::authz::errors::PolicyError;

#[derive(Debug, Error, Diagnostic)]
pub enum PalisadeError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(palisade::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(palisade::config))]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Policy(#[from] PolicyError),
}
