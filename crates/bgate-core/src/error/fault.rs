//! Text heuristics for transport faults.
//!
//! Some failures only reveal themselves through human-readable text: the
//! backend reporting its own DNS or TLS trouble in an error body, or a
//! client error whose cause chain only has a message. All such patterns
//! live here.

/// What kind of fault a piece of error text describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Name resolution failed.
    Dns,
    /// TLS session dropped mid-handshake or mid-read.
    TlsEof,
    /// Connection-level failure (refused, reset, broken pipe, unreachable host).
    Network,
    Unclassified,
}

impl FaultKind {
    /// Faults a backend may report about its own downstream dependencies.
    /// A non-2xx body carrying one of these means the backend is effectively
    /// unreachable even though it answered.
    pub fn is_downstream_fault(self) -> bool {
        matches!(self, FaultKind::Dns | FaultKind::TlsEof)
    }

    pub fn is_transport(self) -> bool {
        !matches!(self, FaultKind::Unclassified)
    }
}

const DNS_PATTERNS: &[&str] = &["could not translate host name", "enotfound"];
const TLS_EOF_PATTERNS: &[&str] = &["ssl syscall error: eof detected"];

// Only matched against errors raised on our side of the connection.
const NETWORK_PATTERNS: &[&str] = &[
    "fetch failed",
    "dns error",
    "failed to lookup address",
    "connection refused",
    "connection reset",
    "broken pipe",
    "host unreachable",
    "network unreachable",
    "connection closed before message completed",
];

/// Classify free-form error text (case-insensitive).
pub fn classify_fault(text: &str) -> FaultKind {
    let lower = text.to_lowercase();
    if DNS_PATTERNS.iter().any(|p| lower.contains(p)) {
        FaultKind::Dns
    } else if TLS_EOF_PATTERNS.iter().any(|p| lower.contains(p)) {
        FaultKind::TlsEof
    } else if NETWORK_PATTERNS.iter().any(|p| lower.contains(p)) {
        FaultKind::Network
    } else {
        FaultKind::Unclassified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns_and_tls_text_is_downstream() {
        let dns = classify_fault("could not translate host name \"db.internal\" to address");
        assert_eq!(dns, FaultKind::Dns);
        assert!(dns.is_downstream_fault());
        assert_eq!(classify_fault("getaddrinfo ENOTFOUND db"), FaultKind::Dns);
        let tls = classify_fault("SSL SYSCALL error: EOF detected");
        assert_eq!(tls, FaultKind::TlsEof);
        assert!(tls.is_downstream_fault());
    }

    #[test]
    fn local_network_text_is_transport_only() {
        let kind = classify_fault("tcp connect error: Connection refused (os error 111)");
        assert_eq!(kind, FaultKind::Network);
        assert!(kind.is_transport());
        assert!(!kind.is_downstream_fault());
    }

    #[test]
    fn ordinary_messages_are_unclassified() {
        assert_eq!(classify_fault("season has no episodes"), FaultKind::Unclassified);
        assert!(!classify_fault("").is_transport());
    }
}
