use crate::types::ChannelFormat;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XDFError {
    #[error("Input file not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Structural violation of the container framing. Fatal for the file.
    #[error("Protocol error at byte {offset}{}: {message}", fmt_stream(.stream_id))]
    ProtocolError {
        offset: u64,
        stream_id: Option<u32>,
        message: String,
    },

    /// Malformed header/footer XML. Fatal only for the stream it belongs to.
    #[error("Metadata error{}: {message}", fmt_stream(.stream_id))]
    MetadataError {
        stream_id: Option<u32>,
        message: String,
    },

    #[error("Precondition failed for stream {stream_id}: {message}")]
    PreconditionError { stream_id: u32, message: String },

    #[error("Type mismatch for stream {stream_id}: {operation} requires numeric data, got {format}")]
    TypeMismatch {
        stream_id: u32,
        operation: &'static str,
        format: ChannelFormat,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

fn fmt_stream(stream_id: &Option<u32>) -> String {
    match stream_id {
        Some(id) => format!(" (stream {})", id),
        None => String::new(),
    }
}

impl XDFError {
    pub(crate) fn protocol(offset: u64, stream_id: Option<u32>, message: impl Into<String>) -> Self {
        XDFError::ProtocolError {
            offset,
            stream_id,
            message: message.into(),
        }
    }

    pub(crate) fn metadata(stream_id: Option<u32>, message: impl Into<String>) -> Self {
        XDFError::MetadataError {
            stream_id,
            message: message.into(),
        }
    }

    pub(crate) fn precondition(stream_id: u32, message: impl Into<String>) -> Self {
        XDFError::PreconditionError {
            stream_id,
            message: message.into(),
        }
    }

    /// Stream id the error refers to, if any.
    pub fn stream_id(&self) -> Option<u32> {
        match self {
            XDFError::ProtocolError { stream_id, .. } | XDFError::MetadataError { stream_id, .. } => {
                *stream_id
            }
            XDFError::PreconditionError { stream_id, .. } | XDFError::TypeMismatch { stream_id, .. } => {
                Some(*stream_id)
            }
            _ => None,
        }
    }

    /// Whether the caller can keep using the container after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            XDFError::MetadataError { .. }
                | XDFError::PreconditionError { .. }
                | XDFError::TypeMismatch { .. }
                | XDFError::Cancelled
        )
    }
}

pub type Result<T> = std::result::Result<T, XDFError>;
