use std::fmt;
use std::io;

/// Enumerates the errors `drvshelld` and its protocol layer can report.
///
/// Authors of new dispatch code should try to map their failures onto one
/// of these values before reaching for a new variant; keep the variant
/// generic enough that it's reusable outside this one call site.
#[derive(Debug)]
pub enum Error {
    /// A socket name didn't match the `<name>.<slot>.<suffix>` grammar.
    InvalidEndpointName(String),

    /// Two endpoints resolved to the same `(name, slot)` identity.
    DuplicateEndpoint { name: String, slot: u32 },

    /// A frame carried an unrecognized signature byte.
    BadSignature(u8),

    /// A length-prefixed field declared more bytes than the protocol
    /// allows (arguments are capped at 255 bytes, for instance).
    FieldTooLong { what: &'static str, len: usize },

    /// The peer closed the connection or sent fewer bytes than a frame
    /// requires.
    UnexpectedEof,

    /// Underlying I/O failure (socket, directory watch, stdin).
    Io(io::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidEndpointName(name) => {
                write!(f, "not a valid endpoint name: {name}")
            }
            Error::DuplicateEndpoint { name, slot } => {
                write!(f, "duplicate driver: {name} at slot {slot}")
            }
            Error::BadSignature(sig) => {
                write!(f, "invalid frame signature {sig:#04x}")
            }
            Error::FieldTooLong { what, len } => {
                write!(f, "{what} is too long ({len} bytes)")
            }
            Error::UnexpectedEof => write!(f, "peer closed connection"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
