use thiserror::Error;

pub type FlkResult<T> = Result<T, FlkError>;

/// Why a login attempt was turned away.
///
/// Never shown to the remote caller: every variant surfaces as the same
/// `unauthorized` message. Kept for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// No challenge was issued for this user, or it was already consumed
    NonceMissing,
    /// The challenge outlived its TTL
    NonceExpired,
    /// The signature did not verify against the registered public key
    BadSignature,
    /// No public key is registered for this user id
    UnknownUser,
    /// Signature or key material could not be decoded
    MalformedRequest,
}

impl AuthRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthRejection::NonceMissing => "nonce missing",
            AuthRejection::NonceExpired => "nonce expired",
            AuthRejection::BadSignature => "bad signature",
            AuthRejection::UnknownUser => "unknown user",
            AuthRejection::MalformedRequest => "malformed request",
        }
    }
}

#[derive(Debug, Error)]
pub enum FlkError {
    /// Bad caller input: area outside the image, zero dimensions, mismatched
    /// image layouts. Raised before any output is produced.
    #[error("validation error: {0}")]
    Validation(String),

    /// A fractal worker failed mid-render; the whole attempt is discarded.
    #[error("fractal generation failed: {0}")]
    Generation(String),

    #[error("operation cancelled")]
    Cancelled,

    /// AEAD tag mismatch or a key that cannot open the box.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("unauthorized")]
    AuthRejected(AuthRejection),

    /// Truncated or corrupt key material / sealed envelope.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("image error: {0}")]
    Image(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FlkError {
    /// Internal reason behind an `AuthRejected` error, if this is one.
    pub fn auth_reason(&self) -> Option<AuthRejection> {
        match self {
            FlkError::AuthRejected(reason) => Some(*reason),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, FlkError::Validation(_))
    }
}
