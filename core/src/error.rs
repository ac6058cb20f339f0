use thiserror::Error;

pub type Result<T> = std::result::Result<T, QualityError>;

#[derive(Error, Debug)]
pub enum QualityError {
    /// The watcher exhausted its attempt budget without a match.
    #[error("element {selector} not found after {attempts} attempts")]
    ElementNotFound { selector: String, attempts: u32 },

    /// None of the liveness heuristics matched.
    #[error("could not determine whether the stream is live")]
    LivenessUndetermined,

    #[error("quality menu rendered no options")]
    NoOptionsAvailable,

    /// The host document (browser backend) failed to answer a query or click.
    #[error("document error: {0}")]
    Document(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),
}
