//! Process signals that trigger a graceful shutdown

use std::fmt;

use tokio::signal;

/// Signal that requested the shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
    User1,
}

impl ShutdownSignal {
    pub fn name(self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Terminate => "SIGTERM",
            ShutdownSignal::User1 => "SIGUSR1",
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Wait for SIGINT, SIGTERM or SIGUSR1.
///
/// Fails only if a handler cannot be installed.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<ShutdownSignal> {
    use signal::unix::{signal as unix_signal, SignalKind};

    let mut terminate = unix_signal(SignalKind::terminate())?;
    let mut user1 = unix_signal(SignalKind::user_defined1())?;

    tokio::select! {
        result = signal::ctrl_c() => result.map(|()| ShutdownSignal::Interrupt),
        _ = terminate.recv() => Ok(ShutdownSignal::Terminate),
        _ = user1.recv() => Ok(ShutdownSignal::User1),
    }
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<ShutdownSignal> {
    signal::ctrl_c().await.map(|()| ShutdownSignal::Interrupt)
}
