use super::errors::ExecError;

pub type ExecResult<T> = Result<T, ExecError>;
