//! Classify client-side request failures (timeouts, transport errors).

use std::error::Error as StdError;
use std::io;

use super::fault::classify_fault;
use super::ProxyError;

/// io error kinds that mean "the backend could not be reached right now".
pub const RETRYABLE_IO_KINDS: &[io::ErrorKind] = &[
    io::ErrorKind::ConnectionRefused,
    io::ErrorKind::ConnectionReset,
    io::ErrorKind::ConnectionAborted,
    io::ErrorKind::NotConnected,
    io::ErrorKind::BrokenPipe,
    io::ErrorKind::TimedOut,
    io::ErrorKind::AddrNotAvailable,
    io::ErrorKind::UnexpectedEof,
];

/// True if any error in the source chain is a transport failure: an io error
/// of a retryable kind, or text that [`classify_fault`] recognises.
pub fn is_network_failure(err: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if RETRYABLE_IO_KINDS.contains(&io_err.kind()) {
                return true;
            }
        }
        if classify_fault(&e.to_string()).is_transport() {
            return true;
        }
        current = e.source();
    }
    false
}

/// Map a reqwest failure onto the taxonomy.
///
/// Timeouts become `UPSTREAM_TIMEOUT`, transport failures `BACKEND_UNREACHABLE`
/// (both retryable); anything else (bad URL, redirect loop, decode failure) is
/// an `INTERNAL_ERROR` that a repeat cannot fix.
pub fn classify_transport(err: &reqwest::Error) -> ProxyError {
    if err.is_timeout() {
        return ProxyError::timeout();
    }
    if err.is_connect() || is_network_failure(err) {
        return ProxyError::unreachable();
    }
    ProxyError::internal(err.to_string())
}
