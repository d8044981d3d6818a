use thiserror::Error;

/// Rejected benchmark configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("iteration count must be positive")]
    ZeroIterations,
    #[error("switch task count must be positive")]
    ZeroSwitchTasks,
    /// Every switch task would perform zero yields
    #[error("{tasks} switch tasks exceed {iterations} iterations")]
    TooManySwitchTasks { tasks: usize, iterations: u64 },
    #[error("invalid channel capacity `{0}` (expected a number or `N`)")]
    InvalidCapacity(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("backend `{0}` is not compiled in")]
    Unavailable(&'static str),
}
