/// Error types for the registration engine and its solvers.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum IcpError {
    /// Empty or malformed point set, or unusable engine parameters.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Too few correspondences for the rigid solver.
    #[error("Rigid estimation requires at least {required} correspondences, got {actual}")]
    DegenerateInput {
        /// Minimum number of correspondences required by the solver.
        required: usize,
        /// Actual number of correspondences provided.
        actual: usize,
    },

    /// The cost was queried before a registration pass completed.
    #[error("No completed registration pass")]
    NotRegistered,

    /// A solver produced non-finite values.
    #[error("Numeric fault: {0}")]
    NumericFault(String),

    /// The engine already ran its registration pass.
    #[error("Registration already ran on this engine")]
    AlreadyRegistered,
}
