use serde::{Deserialize, Serialize};

/// Categorical failure codes shared between guest and host.
///
/// This vocabulary is closed: higher layers pattern-match on it (permission
/// checks, not-found handling, ...), so the wire codes below are stable.
/// On the minimal wire the code travels as an `i32`; on the structured wire
/// the variant name travels as a string.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorKind {
    Other = 1,
    NotFound = 2,
    PermissionDenied = 3,
    ConnectionRefused = 4,
    ConnectionReset = 5,
    ConnectionAborted = 6,
    NotConnected = 7,
    AddrInUse = 8,
    AddrNotAvailable = 9,
    BrokenPipe = 10,
    AlreadyExists = 11,
    InvalidData = 12,
    TimedOut = 13,
    Interrupted = 14,
    WriteZero = 15,
    UnexpectedEof = 16,
    BadResource = 17,
    Busy = 18,
}

impl ErrorKind {
    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Decode a wire code. A code outside the known vocabulary maps to
    /// [`ErrorKind::Other`]: the record framing is intact, only the
    /// vocabulary is newer than ours, so the failure stays recoverable.
    pub fn from_code(code: i32) -> ErrorKind {
        match code {
            2 => ErrorKind::NotFound,
            3 => ErrorKind::PermissionDenied,
            4 => ErrorKind::ConnectionRefused,
            5 => ErrorKind::ConnectionReset,
            6 => ErrorKind::ConnectionAborted,
            7 => ErrorKind::NotConnected,
            8 => ErrorKind::AddrInUse,
            9 => ErrorKind::AddrNotAvailable,
            10 => ErrorKind::BrokenPipe,
            11 => ErrorKind::AlreadyExists,
            12 => ErrorKind::InvalidData,
            13 => ErrorKind::TimedOut,
            14 => ErrorKind::Interrupted,
            15 => ErrorKind::WriteZero,
            16 => ErrorKind::UnexpectedEof,
            17 => ErrorKind::BadResource,
            18 => ErrorKind::Busy,
            _ => ErrorKind::Other,
        }
    }
}

/// A failed host operation, as surfaced to caller code.
///
/// Kind and message are preserved verbatim from the wire so callers can
/// discriminate programmatically.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct OpError {
    pub kind: ErrorKind,
    pub message: String,
}

impl OpError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The protocol-violation shape both codecs emit for a response that
    /// does not match the wire contract.
    pub fn malformed_message() -> Self {
        Self::new(ErrorKind::InvalidData, "malformed message")
    }
}

impl From<std::io::Error> for OpError {
    fn from(e: std::io::Error) -> Self {
        Self::new(io_error_kind(&e), e.to_string())
    }
}

/// Classify a `std::io::Error` into the shared vocabulary.
///
/// Used by host-side providers encoding failures onto the wire.
pub fn io_error_kind(e: &std::io::Error) -> ErrorKind {
    use std::io::ErrorKind as Io;
    match e.kind() {
        Io::NotFound => ErrorKind::NotFound,
        Io::PermissionDenied => ErrorKind::PermissionDenied,
        Io::ConnectionRefused => ErrorKind::ConnectionRefused,
        Io::ConnectionReset => ErrorKind::ConnectionReset,
        Io::ConnectionAborted => ErrorKind::ConnectionAborted,
        Io::NotConnected => ErrorKind::NotConnected,
        Io::AddrInUse => ErrorKind::AddrInUse,
        Io::AddrNotAvailable => ErrorKind::AddrNotAvailable,
        Io::BrokenPipe => ErrorKind::BrokenPipe,
        Io::AlreadyExists => ErrorKind::AlreadyExists,
        Io::InvalidInput => ErrorKind::InvalidData,
        Io::InvalidData => ErrorKind::InvalidData,
        Io::TimedOut => ErrorKind::TimedOut,
        Io::Interrupted => ErrorKind::Interrupted,
        Io::WriteZero => ErrorKind::WriteZero,
        Io::UnexpectedEof => ErrorKind::UnexpectedEof,
        _ => ErrorKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wire_codes_round_trip() {
        for kind in [
            ErrorKind::Other,
            ErrorKind::NotFound,
            ErrorKind::PermissionDenied,
            ErrorKind::InvalidData,
            ErrorKind::Interrupted,
            ErrorKind::BadResource,
            ErrorKind::Busy,
        ] {
            assert_eq!(ErrorKind::from_code(kind.code()), kind);
        }
    }

    #[test]
    fn not_found_is_code_2() {
        // fixed wire code; the guest side of real hosts depends on it
        assert_eq!(ErrorKind::NotFound.code(), 2);
    }

    #[test]
    fn unknown_code_maps_to_other() {
        assert_eq!(ErrorKind::from_code(0), ErrorKind::Other);
        assert_eq!(ErrorKind::from_code(-3), ErrorKind::Other);
        assert_eq!(ErrorKind::from_code(9999), ErrorKind::Other);
    }

    #[test]
    fn display_keeps_kind_and_message() {
        let e = OpError::new(ErrorKind::NotFound, "no such file");
        assert_eq!(e.to_string(), "NotFound: no such file");
    }

    #[test]
    fn io_error_classification() {
        use std::io;
        let e = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(io_error_kind(&e), ErrorKind::PermissionDenied);
        let e = io::Error::new(io::ErrorKind::Unsupported, "nope");
        assert_eq!(io_error_kind(&e), ErrorKind::Other);
    }

    #[test]
    fn kind_serializes_by_name() {
        let s = serde_json::to_string(&ErrorKind::PermissionDenied).unwrap();
        assert_eq!(s, "\"PermissionDenied\"");
    }
}
