//! Shared test utilities and fixtures for mxgate integration tests.

pub use mxgate_core::{ConnectionStatus, DiscoveredCapabilities, DomainEvent};

/// Event testing utilities.
pub mod events {
    use mxgate_core::DomainEvent;
    use std::time::Duration;
    use tokio::sync::broadcast;

    /// Create a test event channel with sufficient capacity.
    pub fn test_event_channel() -> (broadcast::Sender<DomainEvent>, broadcast::Receiver<DomainEvent>) {
        broadcast::channel(100)
    }

    /// Collect events from a receiver until `timeout` elapses.
    pub async fn collect_events(mut rx: broadcast::Receiver<DomainEvent>, timeout: Duration) -> Vec<DomainEvent> {
        let mut events = Vec::new();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Ok(event)) => events.push(event),
                Ok(Err(_)) => break,
                Err(_) => break,
            }
        }
        events
    }

    /// Wait for the first event matching `predicate`.
    pub async fn wait_for_event<F>(
        mut rx: broadcast::Receiver<DomainEvent>,
        timeout: Duration,
        predicate: F,
    ) -> Option<DomainEvent>
    where
        F: Fn(&DomainEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Ok(event)) if predicate(&event) => return Some(event),
                Ok(Ok(_)) => continue,
                Ok(Err(_)) => return None,
                Err(_) => return None,
            }
        }
    }
}

/// Fixtures for the config/domain types integration tests build up most
/// often.
pub mod fixtures {
    use mxgate_core::{RestartPolicy, ServerSpec, TransportSpec};
    use std::collections::HashMap;

    /// A disabled stdio server spec. Disabled servers are added to the
    /// fleet and tracked but never attempt to connect, which makes them
    /// useful for exercising reconciliation/routing logic without a real
    /// child process or network endpoint.
    pub fn disabled_stdio_spec(name: &str, tags: &[&str]) -> ServerSpec {
        ServerSpec {
            name: name.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            disabled: true,
            transport: TransportSpec::Stdio {
                command: "true".to_string(),
                args: Vec::new(),
                env: HashMap::new(),
                cwd: None,
            },
            connect_timeout_secs: 5,
            request_timeout_secs: 5,
            restart_policy: RestartPolicy { enabled: false, ..RestartPolicy::default() },
        }
    }
}

/// Async test helpers.
pub mod async_helpers {
    use std::time::Duration;
    use tokio::time::timeout;

    /// Run an async operation with a timeout, panicking if it doesn't
    /// resolve in time.
    pub async fn with_timeout<F, T>(duration: Duration, f: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        timeout(duration, f).await.expect("operation timed out")
    }

    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
}
