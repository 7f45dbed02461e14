//! Dependency readiness probing.
//!
//! A probe answers one question: is a single network-addressable dependency
//! currently accepting connections? The gate in [`crate::gate`] applies a
//! probe under a retry policy; this module defines the capability trait, the
//! outcome type, and the TCP implementation.

mod tcp;

pub use tcp::TcpProbe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A network-addressable external data store the pipeline must reach
/// before operating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Name used for diagnostics and log lines.
    pub name: String,
    /// Host name or address.
    pub host: String,
    /// Port, when the readiness signal needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Dependency {
    /// Creates a dependency without a port.
    #[must_use]
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: None,
        }
    }

    /// Sets the port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// The endpoint string a connection-oriented probe dials.
    ///
    /// With a port this is `host:port`; without one the host is returned
    /// as written (it may already carry a port).
    #[must_use]
    pub fn endpoint(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{port}", self.host),
            None => self.host.clone(),
        }
    }
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.endpoint())
    }
}

/// The outcome of a single probe attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeOutcome {
    /// The dependency is accepting connections.
    Ready,
    /// The dependency answered with a clean negative, such as a refused
    /// connection.
    NotReady,
    /// The probe itself could not complete (DNS failure, malformed address,
    /// timeout). Treated like `NotReady` by the gate; the detail is kept
    /// for diagnostics.
    Error(String),
}

impl ProbeOutcome {
    /// Returns true if the dependency is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Detail text for diagnostics, present only for probe errors.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Error(detail) => Some(detail),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::NotReady => write!(f, "not ready"),
            Self::Error(detail) => write!(f, "probe error: {detail}"),
        }
    }
}

/// Capability trait for dependency readiness checks.
///
/// A probe must not block indefinitely: implementations bound each attempt
/// with a timeout shorter than the gate's retry delay. Probes for
/// independent dependencies run concurrently, so implementations are
/// `Send + Sync`.
#[async_trait]
pub trait ReadinessProbe: Send + Sync + Debug {
    /// Checks whether the dependency is currently accepting connections.
    async fn check(&self, dependency: &Dependency) -> ProbeOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_endpoint_with_port() {
        let dep = Dependency::new("source", "source-postgres").with_port(5432);
        assert_eq!(dep.endpoint(), "source-postgres:5432");
    }

    #[test]
    fn test_endpoint_without_port_passes_host_through() {
        let dep = Dependency::new("source", "localhost:5433");
        assert_eq!(dep.endpoint(), "localhost:5433");
    }

    #[test]
    fn test_dependency_display() {
        let dep = Dependency::new("dest", "db.internal").with_port(5432);
        assert_eq!(dep.to_string(), "dest (db.internal:5432)");
    }

    #[test]
    fn test_outcome_predicates() {
        assert!(ProbeOutcome::Ready.is_ready());
        assert!(!ProbeOutcome::NotReady.is_ready());
        assert!(!ProbeOutcome::Error("dns".to_string()).is_ready());
    }

    #[test]
    fn test_outcome_detail_only_for_errors() {
        assert_eq!(ProbeOutcome::Ready.detail(), None);
        assert_eq!(ProbeOutcome::NotReady.detail(), None);
        assert_eq!(
            ProbeOutcome::Error("no address".to_string()).detail(),
            Some("no address")
        );
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(ProbeOutcome::Ready.to_string(), "ready");
        assert_eq!(ProbeOutcome::NotReady.to_string(), "not ready");
        assert_eq!(
            ProbeOutcome::Error("timed out".to_string()).to_string(),
            "probe error: timed out"
        );
    }

    #[test]
    fn test_dependency_serialization_round_trip() {
        let dep = Dependency::new("source", "source-postgres").with_port(5432);
        let yaml = serde_yaml::to_string(&dep).unwrap();
        let back: Dependency = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(dep, back);
    }
}
