use thiserror::Error;

/// Broad failure class, used by the binary to pick a diagnostic prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A marker field is missing, unreadable, or cannot hold its value.
    Format,
    /// Reading, writing, or seeking a file failed.
    Io,
    /// The compression backend reported a failure.
    Codec,
}

/// Errors produced by the patch engine, the stream engine, and the path runners.
#[derive(Debug, Error)]
pub enum Error {
    /// The data-offset marker label does not occur in the image.
    #[error("corrupt file header: data-offset marker not found")]
    MissingOffsetMarker,

    /// The mode marker label does not occur in the image.
    #[error("corrupt file header: mode marker not found")]
    MissingModeMarker,

    /// The decimal offset does not fit in the reserved value region.
    #[error("offset {value} needs {digits} digits but the marker holds at most {width}")]
    OffsetOverflow {
        /// Offset that was to be written.
        value: u64,
        /// Decimal digits required.
        digits: usize,
        /// Digits available in the value region.
        width: usize,
    },

    /// The data-offset value region does not hold a usable offset.
    #[error("corrupt file header: {0}")]
    CorruptOffset(String),

    /// The mode marker carries a value other than pack or unpack.
    #[error("corrupt file header: unknown mode byte {0:#04x}")]
    UnknownMode(u8),

    /// Underlying I/O failure, tagged with the stage that hit it.
    #[error("{stage}: {source}")]
    Io {
        /// What was being done when the error occurred.
        stage: &'static str,
        /// The system error.
        #[source]
        source: std::io::Error,
    },

    /// The sink accepted fewer bytes than it was handed.
    #[error("short write: sink accepted {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes handed to the sink.
        expected: usize,
        /// Bytes the sink accepted.
        written: usize,
    },

    /// The backend returned a status outside the success/stream-end set.
    #[error("{codec} codec error: {message}")]
    Codec {
        /// Backend name.
        codec: &'static str,
        /// Backend status text.
        message: String,
    },
}

impl Error {
    /// Wrap an I/O error with the stage that produced it.
    pub fn io(stage: &'static str, source: std::io::Error) -> Self {
        Self::Io { stage, source }
    }

    /// Which class of failure this is.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingOffsetMarker
            | Self::MissingModeMarker
            | Self::OffsetOverflow { .. }
            | Self::CorruptOffset(_)
            | Self::UnknownMode(_) => ErrorKind::Format,
            Self::Io { .. } | Self::ShortWrite { .. } => ErrorKind::Io,
            Self::Codec { .. } => ErrorKind::Codec,
        }
    }
}

/// Result type for myzip operations.
pub type Result<T> = std::result::Result<T, Error>;
