use serde::Serialize;

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TerminalSize {
    pub cols: u32,
    pub rows: u32,
}

impl TerminalSize {
    /// Validate client-supplied dimensions.
    ///
    /// Returns `None` unless both values are in `1..=65535`.
    #[must_use]
    pub fn from_signed(cols: i64, rows: i64) -> Option<Self> {
        let valid = |v: i64| (1..=i64::from(u16::MAX)).contains(&v);
        if valid(cols) && valid(rows) {
            Some(Self {
                cols: u32::try_from(cols).ok()?,
                rows: u32::try_from(rows).ok()?,
            })
        } else {
            None
        }
    }
}

/// Pseudo-terminal parameters for a new shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    pub term: String,
    pub size: TerminalSize,
}

/// Lifecycle of a terminal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    PtyRequested,
    ShellRunning,
    Closing,
    Closed,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::PtyRequested => "pty_requested",
            Self::ShellRunning => "shell_running",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
