use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Protocol error taxonomy. Validation errors are caller errors and are
/// never retried internally; state errors mean the operation is invalid in
/// the current lifecycle state; authorization errors guard the governance
/// and ACCS-only entry points; verification failures are terminal for the
/// proof record they concern but never fatal to the system.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Insufficient stake: required {required}, available {available}")]
    InsufficientStake { required: u64, available: u64 },

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Duration out of range: {actual}s not within [{min}s, {max}s]")]
    DurationOutOfRange { min: u64, max: u64, actual: u64 },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Insufficient available stake: requested {requested}, available {available}")]
    InsufficientAvailableStake { requested: u64, available: u64 },

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Duration too short: {actual}s below minimum {min}s")]
    DurationTooShort { min: u64, actual: u64 },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Header not newer than stored header")]
    HeaderNotNewer,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Proof rejected: {0}")]
    ProofRejected(String),

    #[error("No verifier registered for subnet {subnet} (vm {vm})")]
    NoVerifierRegistered { subnet: String, vm: String },
}
