//! TCP connect probe.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;

use super::{Dependency, ProbeOutcome, ReadinessProbe};

/// Default bound on a single probe attempt.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Probes readiness by opening a TCP connection to the dependency endpoint.
///
/// A completed connection is `Ready`; a refused or otherwise failed
/// connection is `NotReady`; resolution failures and attempts that exceed
/// the timeout are probe errors. The timeout bounds the whole attempt,
/// resolution included, and must stay below the gate's retry delay.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    /// Creates a probe with the default timeout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn try_connect(endpoint: &str) -> ProbeOutcome {
        let addrs = match lookup_host(endpoint).await {
            Ok(addrs) => addrs,
            Err(error) => {
                return ProbeOutcome::Error(format!("cannot resolve {endpoint}: {error}"));
            }
        };

        let mut attempted = false;
        for addr in addrs {
            attempted = true;
            if TcpStream::connect(addr).await.is_ok() {
                return ProbeOutcome::Ready;
            }
        }

        if attempted {
            ProbeOutcome::NotReady
        } else {
            ProbeOutcome::Error(format!("no addresses resolved for {endpoint}"))
        }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadinessProbe for TcpProbe {
    async fn check(&self, dependency: &Dependency) -> ProbeOutcome {
        let endpoint = dependency.endpoint();
        match timeout(self.timeout, Self::try_connect(&endpoint)).await {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome::Error(format!(
                "probe of {endpoint} timed out after {}ms",
                self.timeout.as_millis()
            )),
        }
    }
}
