use thiserror::Error;

/// Failures while decoding or routing a control message.
///
/// None of these are fatal: the dispatcher degrades every variant to a
/// dropped message or an outbound ERROR reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("message truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
    #[error("declared length {0} is shorter than the fixed message layout")]
    BadLength(u16),
    #[error("unsupported protocol version {0:#04x}")]
    BadVersion(u8),
    #[error("unknown message type code {0}")]
    UnknownType(u8),
    #[error("unknown flow-mod command {0}")]
    UnknownCommand(u8),
    #[error("unknown multipart type {0}")]
    BadMultipart(u16),
    #[error("port number {0} out of range")]
    BadPort(u32),
}
