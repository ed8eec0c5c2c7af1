/// The socket or serial line call an [`Io`](super::TransportError::Io) error
/// came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOperation {
    Read,
    Write,
    /// Pushing buffered bytes onto the wire.
    Flush,
    Bind,
    Connect,
    /// A socket option such as TCP_NODELAY.
    Configure,
    /// Local or peer address lookup.
    Address,
    Shutdown,
    /// Serial line control: input drain, timeouts, open.
    Line,
}

impl IoOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Flush => "flush",
            Self::Bind => "bind",
            Self::Connect => "connect",
            Self::Configure => "socket option",
            Self::Address => "address lookup",
            Self::Shutdown => "shutdown",
            Self::Line => "serial line control",
        }
    }
}

impl std::fmt::Display for IoOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
