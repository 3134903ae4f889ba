//! TCP reachability checks used for engine readiness.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Checks whether something accepts connections on `endpoint`.
///
/// # Errors
///
/// Propagates IO errors that do not simply mean nothing is listening.
pub fn endpoint_is_reachable(endpoint: SocketAddr) -> io::Result<bool> {
    match TcpStream::connect_timeout(&endpoint, CONNECT_TIMEOUT) {
        Ok(_) => Ok(true),
        Err(error) if listener_absent(&error) => Ok(false),
        Err(error) => Err(error),
    }
}

/// Errors that mean no process is accepting yet.
///
/// A timed-out connect is an engine still binding its sockets or a full
/// accept backlog; the readiness deadline bounds how long that may last.
/// `ConnectionReset` is excluded: a peer accepted and then dropped the
/// connection, so a listener exists.
fn listener_absent(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::NotFound
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::TimedOut
    )
}
