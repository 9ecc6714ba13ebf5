pub type Result<T, E = DiftError> = std::result::Result<T, E>;

#[derive(Debug, derive_more::Display, thiserror::Error)]
pub enum DiftError {
    #[display(fmt = "Err invalid config: {}", _0)]
    Config(String),

    #[display(fmt = "Err malformed trace: {}", _0)]
    Trace(String),

    #[display(fmt = "Err unsupported: {}", _0)]
    Unsupported(String),

    #[display(fmt = "Err io: {}", _0)]
    Io(#[from] std::io::Error),
}
