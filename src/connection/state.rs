//! Client connection state machine.

/// Lifecycle state of a [`WsClient`](super::WsClient).
///
/// ```text
/// NOT_OPEN -> OPENING_UNDERLYING_IO -> WAITING_FOR_UPGRADE_RESPONSE -> OPEN
/// OPEN -> CLOSING_WAITING_FOR_CLOSE_FRAME -> CLOSING_UNDERLYING_IO -> NOT_OPEN
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Idle; `open_async` is allowed.
    #[default]
    NotOpen,
    /// Waiting for the transport to report its open result.
    OpeningUnderlyingIo,
    /// Upgrade request sent, accumulating the HTTP response.
    WaitingForUpgradeResponse,
    /// Handshake complete; frames flow both ways.
    Open,
    /// Our close frame is out, waiting for the peer's.
    ClosingWaitingForCloseFrame,
    /// Waiting for the transport to report its close.
    ClosingUnderlyingIo,
}

impl ConnectionState {
    /// Check if application data may be sent in this state.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Check if received bytes are decoded as frames in this state.
    #[must_use]
    #[inline]
    pub const fn can_receive(&self) -> bool {
        matches!(
            self,
            ConnectionState::Open | ConnectionState::ClosingWaitingForCloseFrame
        )
    }

    /// Returns `true` for both closing states.
    #[must_use]
    #[inline]
    pub const fn is_closing(&self) -> bool {
        matches!(
            self,
            ConnectionState::ClosingWaitingForCloseFrame | ConnectionState::ClosingUnderlyingIo
        )
    }

    /// Returns `true` while the open is still in progress.
    #[must_use]
    #[inline]
    pub const fn is_opening(&self) -> bool {
        matches!(
            self,
            ConnectionState::OpeningUnderlyingIo | ConnectionState::WaitingForUpgradeResponse
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::NotOpen => "NOT_OPEN",
            ConnectionState::OpeningUnderlyingIo => "OPENING_UNDERLYING_IO",
            ConnectionState::WaitingForUpgradeResponse => "WAITING_FOR_UPGRADE_RESPONSE",
            ConnectionState::Open => "OPEN",
            ConnectionState::ClosingWaitingForCloseFrame => "CLOSING_WAITING_FOR_CLOSE_FRAME",
            ConnectionState::ClosingUnderlyingIo => "CLOSING_UNDERLYING_IO",
        };
        f.write_str(name)
    }
}
