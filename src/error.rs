//! Error taxonomy and the status codes reported to the disk arbitration daemon.

use thiserror::Error;

/// Result type alias for hfsutil operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while probing or updating a volume.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error on the device or a system file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device block size could not be determined.
    #[error("Device geometry: {0}")]
    Geometry(String),

    /// The bytes on disk are not the format being looked for.
    #[error("Unrecognized format: {0}")]
    Unrecognized(String),

    /// The format was identified but its structures are inconsistent.
    #[error("Corrupt volume: {0}")]
    Corrupt(String),

    /// An extent lookup ran off the end of the extent list.
    #[error("Tried to map past end of file at logical offset {offset}")]
    MapPastEnd { offset: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad device argument or an operation not allowed for it.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An external collaborator does not support the request.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The volume status database rejected a lookup or update.
    #[error("Volume status store: {0}")]
    StatusStore(String),
}

impl From<deku::DekuError> for Error {
    fn from(e: deku::DekuError) -> Self {
        Error::Corrupt(e.to_string())
    }
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unrecognized,
    Failure,
    InvalidArgument,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unrecognized(_) => ErrorKind::Unrecognized,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            _ => ErrorKind::Failure,
        }
    }

    pub fn is_unrecognized(&self) -> bool {
        self.kind() == ErrorKind::Unrecognized
    }
}

/// Converts "not my format" into a hard failure once a signature has matched.
///
/// Past that point a structural mismatch means the volume is damaged, not
/// that it belongs to some other filesystem.
pub trait ConfirmedFormat {
    fn confirmed(self) -> Self;
}

impl<T> ConfirmedFormat for Result<T> {
    fn confirmed(self) -> Self {
        self.map_err(|e| match e {
            Error::Unrecognized(msg) => Error::Corrupt(msg),
            other => other,
        })
    }
}

/// Status codes of the loadable filesystem utility contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Recognized,
    Unrecognized,
    IoSuccess,
    IoFail,
    Invalid,
}

impl Status {
    pub const fn code(self) -> i32 {
        match self {
            Status::Recognized => -1,
            Status::Unrecognized => -2,
            Status::IoSuccess => -3,
            Status::IoFail => -4,
            Status::Invalid => -6,
        }
    }

    /// Process exit status: the low byte of [`Status::code`].
    pub const fn exit_code(self) -> u8 {
        self.code() as u8
    }

    /// Maps an operation outcome to a status, with `success` used for `Ok`.
    pub fn of<T>(result: &Result<T>, success: Status) -> Status {
        match result {
            Ok(_) => success,
            Err(e) => match e.kind() {
                ErrorKind::Unrecognized => Status::Unrecognized,
                ErrorKind::Failure => Status::IoFail,
                ErrorKind::InvalidArgument => Status::Invalid,
            },
        }
    }
}
