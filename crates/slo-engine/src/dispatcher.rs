//! Back-channel dispatch.
//!
//! Every call is independent: calls run concurrently up to a bound, each
//! is limited by its own timeout, and a failing service never affects the
//! outcome of another. Errors are turned into a `FAILURE` status here and
//! go no further.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::request::LogoutRequestStatus;
use crate::transport::{LogoutHttpBody, LogoutTransport, TransportError};

/// One back-channel call.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Position of the originating request in the logout pass.
    pub index: usize,
    /// The service being notified.
    pub service_id: String,
    /// Destination URL.
    pub url: String,
    /// Request body.
    pub body: LogoutHttpBody,
}

/// Delivers back-channel logout calls.
#[derive(Clone)]
pub struct LogoutDispatcher {
    transport: Arc<dyn LogoutTransport>,
    timeout: Duration,
    concurrency: usize,
    asynchronous: bool,
}

impl std::fmt::Debug for LogoutDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogoutDispatcher")
            .field("timeout", &self.timeout)
            .field("concurrency", &self.concurrency)
            .field("asynchronous", &self.asynchronous)
            .finish_non_exhaustive()
    }
}

impl LogoutDispatcher {
    /// Creates a synchronous dispatcher.
    #[must_use]
    pub fn new(transport: Arc<dyn LogoutTransport>, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            concurrency: 8,
            asynchronous: false,
        }
    }

    /// Sets the maximum number of calls in flight.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Fire-and-forget mode: calls are spawned and recorded as delivered.
    #[must_use]
    pub const fn asynchronous(mut self, asynchronous: bool) -> Self {
        self.asynchronous = asynchronous;
        self
    }

    /// Delivers all calls and returns the status of each, keyed by index.
    ///
    /// Results are not ordered.
    pub async fn dispatch(&self, deliveries: Vec<Delivery>) -> Vec<(usize, LogoutRequestStatus)> {
        if self.asynchronous {
            return deliveries
                .into_iter()
                .map(|delivery| {
                    let index = delivery.index;
                    let transport = Arc::clone(&self.transport);
                    let timeout = self.timeout;
                    tokio::spawn(async move {
                        deliver(transport.as_ref(), delivery, timeout).await;
                    });
                    (index, LogoutRequestStatus::Success)
                })
                .collect();
        }

        stream::iter(deliveries)
            .map(|delivery| {
                let index = delivery.index;
                async move {
                    let status = deliver(self.transport.as_ref(), delivery, self.timeout).await;
                    (index, status)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}

async fn deliver(
    transport: &dyn LogoutTransport,
    delivery: Delivery,
    timeout: Duration,
) -> LogoutRequestStatus {
    let Delivery {
        service_id, url, body, ..
    } = delivery;

    match send(transport, &url, body, timeout).await {
        Ok(code) => {
            tracing::info!(
                service = %service_id,
                location = %url,
                status = code,
                "Logout request delivered"
            );
            LogoutRequestStatus::Success
        }
        Err(e) => {
            tracing::warn!(
                service = %service_id,
                location = %url,
                error = %e,
                "Failed to deliver logout request"
            );
            LogoutRequestStatus::Failure
        }
    }
}

async fn send(
    transport: &dyn LogoutTransport,
    url: &str,
    body: LogoutHttpBody,
    timeout: Duration,
) -> Result<u16, TransportError> {
    match tokio::time::timeout(timeout, transport.post(url, body, timeout)).await {
        Err(_) => Err(TransportError::Timeout),
        Ok(Err(e)) => Err(e),
        Ok(Ok(code)) if (200..300).contains(&code) => Ok(code),
        Ok(Ok(code)) => Err(TransportError::Status(code)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Instant;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct ScriptedTransport {
        behaviour: HashMap<String, Behaviour>,
        calls: Mutex<Vec<String>>,
    }

    #[derive(Clone, Copy)]
    enum Behaviour {
        Status(u16),
        Hang,
        Refuse,
    }

    #[async_trait]
    impl LogoutTransport for ScriptedTransport {
        async fn post(
            &self,
            url: &str,
            _body: LogoutHttpBody,
            _timeout: Duration,
        ) -> Result<u16, TransportError> {
            self.calls.lock().push(url.to_string());
            match self.behaviour.get(url).copied().unwrap_or(Behaviour::Status(200)) {
                Behaviour::Status(code) => Ok(code),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(200)
                }
                Behaviour::Refuse => Err(TransportError::Connection("refused".to_string())),
            }
        }
    }

    fn delivery(index: usize, url: &str) -> Delivery {
        Delivery {
            index,
            service_id: format!("sp-{index}"),
            url: url.to_string(),
            body: LogoutHttpBody::Form("logoutRequest=x".to_string()),
        }
    }

    fn sorted(mut results: Vec<(usize, LogoutRequestStatus)>) -> Vec<(usize, LogoutRequestStatus)> {
        results.sort_by_key(|(index, _)| *index);
        results
    }

    #[tokio::test]
    async fn one_hanging_service_does_not_affect_others() {
        let mut transport = ScriptedTransport::default();
        transport
            .behaviour
            .insert("https://sp2/slo".to_string(), Behaviour::Hang);
        let dispatcher = LogoutDispatcher::new(Arc::new(transport), Duration::from_millis(200));

        let started = Instant::now();
        let results = dispatcher
            .dispatch(vec![
                delivery(0, "https://sp1/slo"),
                delivery(1, "https://sp2/slo"),
                delivery(2, "https://sp3/slo"),
            ])
            .await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(
            sorted(results),
            vec![
                (0, LogoutRequestStatus::Success),
                (1, LogoutRequestStatus::Failure),
                (2, LogoutRequestStatus::Success),
            ]
        );
    }

    #[tokio::test]
    async fn non_success_status_and_connection_errors_fail() {
        let mut transport = ScriptedTransport::default();
        transport
            .behaviour
            .insert("https://sp1/slo".to_string(), Behaviour::Status(500));
        transport
            .behaviour
            .insert("https://sp2/slo".to_string(), Behaviour::Refuse);
        transport
            .behaviour
            .insert("https://sp3/slo".to_string(), Behaviour::Status(204));
        let dispatcher = LogoutDispatcher::new(Arc::new(transport), Duration::from_secs(1))
            .with_concurrency(1);

        let results = dispatcher
            .dispatch(vec![
                delivery(0, "https://sp1/slo"),
                delivery(1, "https://sp2/slo"),
                delivery(2, "https://sp3/slo"),
            ])
            .await;
        assert_eq!(
            sorted(results),
            vec![
                (0, LogoutRequestStatus::Failure),
                (1, LogoutRequestStatus::Failure),
                (2, LogoutRequestStatus::Success),
            ]
        );
    }

    #[tokio::test]
    async fn asynchronous_mode_records_success_on_submission() {
        let mut transport = ScriptedTransport::default();
        transport
            .behaviour
            .insert("https://sp1/slo".to_string(), Behaviour::Status(500));
        let transport = Arc::new(transport);
        let dispatcher =
            LogoutDispatcher::new(transport.clone(), Duration::from_secs(1)).asynchronous(true);

        let results = dispatcher
            .dispatch(vec![delivery(0, "https://sp1/slo")])
            .await;
        assert_eq!(results, vec![(0, LogoutRequestStatus::Success)]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.calls.lock().as_slice(), ["https://sp1/slo"]);
    }
}
