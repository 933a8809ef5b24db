//! Service-manager readiness notification (`sd_notify` protocol).

use std::io;
use std::path::Path;

const NOTIFY_SOCKET: &str = "NOTIFY_SOCKET";

/// Tell the supervising service manager the daemon is ready, when one is
/// listening on `$NOTIFY_SOCKET`. Returns whether a notification was sent.
pub fn notify_ready() -> io::Result<bool> {
    match std::env::var_os(NOTIFY_SOCKET) {
        Some(socket) => notify_ready_at(Path::new(&socket)),
        None => Ok(false),
    }
}

#[cfg(unix)]
pub fn notify_ready_at(socket: &Path) -> io::Result<bool> {
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::net::UnixDatagram;

    // Abstract-namespace sockets are not reachable through a filesystem path.
    if socket.as_os_str().as_bytes().first() == Some(&b'@') {
        tracing::debug!(socket = %socket.display(), "Abstract notify socket ignored");
        return Ok(false);
    }
    let sock = UnixDatagram::unbound()?;
    sock.send_to(b"READY=1", socket)?;
    Ok(true)
}

#[cfg(not(unix))]
pub fn notify_ready_at(_socket: &Path) -> io::Result<bool> {
    Ok(false)
}
