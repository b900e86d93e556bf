use std::io;
use thiserror::Error;

/// Error type for RTP stream operations
#[derive(Debug, Error, Clone)]
pub enum Error {
    /// Datagram too small to contain an RTP header
    #[error("RTP packet too short: need {required} bytes but have {available}")]
    PacketTooShort {
        required: usize,
        available: usize,
    },

    /// Version field in the header is not 2
    #[error("unsupported RTP version: {0}")]
    UnsupportedVersion(u8),

    /// PCM payload length is not a multiple of the sample width
    #[error("PCM payload length {0} is not a multiple of the sample width")]
    OddPayloadLength(usize),

    /// Per-packet transmit failure; the stream continues
    #[error("failed to send packet: {0}")]
    SendFailed(String),

    /// Socket bind failure, fatal at startup
    #[error("failed to bind socket: {0}")]
    BindFailed(String),

    /// Other transport-level error
    #[error("transport error: {0}")]
    Transport(String),

    /// Invalid parameter for a stream operation
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let short = Error::PacketTooShort { required: 12, available: 4 };
        assert_eq!(
            short.to_string(),
            "RTP packet too short: need 12 bytes but have 4"
        );

        let version = Error::UnsupportedVersion(1);
        assert_eq!(version.to_string(), "unsupported RTP version: 1");

        let io_err = Error::from(io::Error::new(io::ErrorKind::NotFound, "no route"));
        assert!(io_err.to_string().contains("transport error"));
    }
}
