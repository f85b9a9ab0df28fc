//! Health prober - classifies whether a system's endpoint is reachable.
//!
//! A probe is a single HEAD request. Anything answering with a status in
//! `[200, 400)` is accessible; everything else is classified either as a network
//! failure or as an HTTP error. Certificate verification is turned off on purpose:
//! internal systems often run with self-signed certificates and the question being
//! asked is "does it answer", not "is its certificate valid".

use crate::{
    config::HealthSettings,
    core::system::SystemRecord,
    errors::{Error, Result},
};
use async_trait::async_trait;
use reqwest::{Client, Url, redirect::Policy};
use std::{
    collections::HashMap,
    error::Error as StdError,
    fmt, io,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{sync::Semaphore, task::JoinSet};

/// Why a probe did not find the endpoint accessible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    /// Host name could not be resolved
    Dns,
    /// Nothing listening on the port
    ConnectionRefused,
    /// No answer within the probe timeout
    Timeout,
    /// TLS handshake failed
    Tls,
    /// Connection closed without a response
    EmptyResponse,
    /// Redirect chain longer than allowed
    TooManyRedirects,
    /// Any other transport failure
    Network(String),
    /// Server answered with a non-success status
    Http {
        /// HTTP status code
        code: u16,
        /// Reason phrase
        reason: String,
    },
}

impl ProbeFailure {
    /// Whether the failure happened below HTTP (no status code was received).
    #[must_use]
    pub const fn is_network(&self) -> bool {
        !matches!(self, Self::Http { .. })
    }
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dns => f.write_str("DNS resolution failed"),
            Self::ConnectionRefused => f.write_str("Connection refused"),
            Self::Timeout => f.write_str("Connection timed out"),
            Self::Tls => f.write_str("TLS handshake failed"),
            Self::EmptyResponse => f.write_str("Empty response from server"),
            Self::TooManyRedirects => f.write_str("Too many redirects"),
            Self::Network(detail) => write!(f, "Network error: {detail}"),
            Self::Http { code, reason } => write!(f, "HTTP {code} {reason}"),
        }
    }
}

/// Outcome of one probe. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckResult {
    /// Whether the endpoint answered with a status in `[200, 400)`
    pub accessible: bool,
    /// Status code, when one was received
    pub http_code: Option<u16>,
    /// Classified failure when not accessible
    pub error: Option<ProbeFailure>,
    /// Wall time spent on the probe
    pub response_time: Duration,
}

impl HealthCheckResult {
    /// An accessible result with the given status code.
    #[must_use]
    pub const fn accessible(code: u16, response_time: Duration) -> Self {
        Self {
            accessible: true,
            http_code: Some(code),
            error: None,
            response_time,
        }
    }

    /// An inaccessible result.
    #[must_use]
    pub fn failed(error: ProbeFailure, response_time: Duration) -> Self {
        let http_code = match &error {
            ProbeFailure::Http { code, .. } => Some(*code),
            _ => None,
        };
        Self {
            accessible: false,
            http_code,
            error: Some(error),
            response_time,
        }
    }

    /// Human-readable reason used in status log notes.
    #[must_use]
    pub fn reason(&self) -> String {
        match (&self.error, self.accessible) {
            (_, true) => "System is now accessible".to_string(),
            (Some(error), false) => error.to_string(),
            (None, false) => "System is not accessible".to_string(),
        }
    }
}

/// Something that can probe an endpoint.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probes `endpoint`.
    ///
    /// # Errors
    /// Only [`Error::InvalidEndpoint`], when the endpoint string cannot be used at all.
    /// Unreachable or erroring endpoints produce an `Ok` result with `accessible = false`.
    async fn check_health(&self, endpoint: &str) -> Result<HealthCheckResult>;
}

/// Turns a configured domain into a probe URL, assuming `http://` when no scheme is given.
pub fn normalize_endpoint(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidEndpoint {
            endpoint: raw.to_string(),
            reason: "endpoint is empty".to_string(),
        });
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let url = Url::parse(&candidate).map_err(|e| Error::InvalidEndpoint {
        endpoint: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        "http" | "https" => Err(Error::InvalidEndpoint {
            endpoint: raw.to_string(),
            reason: "missing host".to_string(),
        }),
        other => Err(Error::InvalidEndpoint {
            endpoint: raw.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

/// Canned reason phrase for common HTTP status codes.
#[must_use]
pub const fn http_reason(code: u16) -> &'static str {
    match code {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        400..=499 => "Client Error",
        500..=599 => "Server Error",
        _ => "Unexpected Status",
    }
}

/// Classifies a received status code. `None` means accessible.
#[must_use]
pub fn classify_status(code: u16) -> Option<ProbeFailure> {
    if (200..400).contains(&code) {
        None
    } else {
        Some(ProbeFailure::Http {
            code,
            reason: http_reason(code).to_string(),
        })
    }
}

/// The error and every cause below it, including the payload of any `io::Error`,
/// which `io::Error::source` skips.
fn causes<'a>(err: &'a (dyn StdError + 'static)) -> Vec<&'a (dyn StdError + 'static)> {
    let mut found: Vec<&'a (dyn StdError + 'static)> = Vec::new();
    let mut next = Some(err);
    while let Some(current) = next {
        found.push(current);
        if let Some(payload) = current
            .downcast_ref::<io::Error>()
            .and_then(io::Error::get_ref)
        {
            found.push(payload);
        }
        next = current.source();
    }
    found
}

/// Full `outer: inner: ...` text of an error chain.
fn chain_text(err: &(dyn StdError + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

fn classify_cause(cause: &(dyn StdError + 'static)) -> Option<ProbeFailure> {
    if cause.downcast_ref::<rustls::Error>().is_some() {
        return Some(ProbeFailure::Tls);
    }
    if let Some(hyper_err) = cause.downcast_ref::<hyper::Error>() {
        if hyper_err.is_incomplete_message() {
            return Some(ProbeFailure::EmptyResponse);
        }
        if hyper_err.is_timeout() {
            return Some(ProbeFailure::Timeout);
        }
    }
    let io_err = cause.downcast_ref::<io::Error>()?;
    match io_err.kind() {
        io::ErrorKind::ConnectionRefused => Some(ProbeFailure::ConnectionRefused),
        io::ErrorKind::TimedOut => Some(ProbeFailure::Timeout),
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => Some(ProbeFailure::EmptyResponse),
        _ => None,
    }
}

fn classify_transport_error(err: &reqwest::Error) -> ProbeFailure {
    if err.is_timeout() {
        return ProbeFailure::Timeout;
    }
    if err.is_redirect() {
        return ProbeFailure::TooManyRedirects;
    }

    let chain = causes(err);
    if let Some(failure) = chain.iter().find_map(|cause| classify_cause(*cause)) {
        return failure;
    }
    // The connector reports resolver failures as an untyped "dns error".
    if err.is_connect() && chain.iter().any(|cause| cause.to_string().starts_with("dns error")) {
        return ProbeFailure::Dns;
    }
    ProbeFailure::Network(chain_text(err))
}

/// [`HealthProbe`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    /// Builds a prober from the health settings.
    pub fn new(settings: &HealthSettings) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(settings.timeout())
            .redirect(Policy::limited(settings.max_redirects))
            .danger_accept_invalid_certs(true)
            .user_agent(settings.user_agent.clone());
        if !settings.use_system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder.build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for HttpProber {
    async fn check_health(&self, endpoint: &str) -> Result<HealthCheckResult> {
        let url = normalize_endpoint(endpoint)?;
        let started = Instant::now();

        let result = match self.client.head(url.clone()).send().await {
            Ok(response) => {
                let code = response.status().as_u16();
                classify_status(code).map_or_else(
                    || HealthCheckResult::accessible(code, started.elapsed()),
                    |failure| HealthCheckResult::failed(failure, started.elapsed()),
                )
            }
            Err(err) => {
                tracing::debug!("Probe of {url} failed: {err:?}");
                HealthCheckResult::failed(classify_transport_error(&err), started.elapsed())
            }
        };

        tracing::debug!(
            %url,
            accessible = result.accessible,
            http_code = result.http_code,
            elapsed_ms = u64::try_from(result.response_time.as_millis()).unwrap_or(u64::MAX),
            "Probe finished"
        );
        Ok(result)
    }
}

/// One system's probe result.
#[derive(Debug)]
pub struct ProbeOutcome {
    /// The probed system, as read at the start of the pass
    pub system: SystemRecord,
    /// The probe result, or the reason the endpoint could not be probed
    pub result: Result<HealthCheckResult>,
}

/// Probes every system with at most `concurrency` probes in flight.
///
/// Each worker pauses for `delay` after its probe before releasing its slot.
/// Outcomes are returned sorted by system id regardless of completion order. A
/// task that panics still yields an outcome, carrying [`Error::CheckAborted`].
pub async fn probe_all(
    prober: Arc<dyn HealthProbe>,
    systems: Vec<SystemRecord>,
    concurrency: usize,
    delay: Duration,
) -> Vec<ProbeOutcome> {
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();
    let mut in_flight = HashMap::new();

    for system in systems {
        let prober = Arc::clone(&prober);
        let permits = Arc::clone(&permits);
        let record = system.clone();
        let handle = tasks.spawn(async move {
            let _permit = permits.acquire_owned().await;
            let result = prober.check_health(&system.domain).await;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            ProbeOutcome { system, result }
        });
        in_flight.insert(handle.id(), record);
    }

    let mut outcomes = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((id, outcome)) => {
                in_flight.remove(&id);
                outcomes.push(outcome);
            }
            Err(e) => {
                tracing::error!("Health check task failed: {e}");
                if let Some(system) = in_flight.remove(&e.id()) {
                    let result = Err(Error::CheckAborted {
                        system_id: system.id,
                        reason: e.to_string(),
                    });
                    outcomes.push(ProbeOutcome { system, result });
                }
            }
        }
    }
    outcomes.sort_by_key(|outcome| outcome.system.id);
    outcomes
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
    };

    /// Serves `response` verbatim to a single connection and returns the local address.
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0_u8; 2048];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        addr.to_string()
    }

    /// Binds a listener and hands every accepted connection to `handle`.
    async fn serve_with<F, Fut>(handle: F) -> String
    where
        F: Fn(TcpStream, String) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let served = addr.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(handle(socket, served.clone()));
            }
        });
        addr
    }

    fn test_prober() -> HttpProber {
        prober_with_timeout(5)
    }

    fn prober_with_timeout(timeout_secs: u64) -> HttpProber {
        let settings = HealthSettings {
            timeout_secs,
            use_system_proxy: false,
            ..HealthSettings::default()
        };
        HttpProber::new(&settings).unwrap()
    }

    #[test]
    fn test_normalize_endpoint_adds_scheme() {
        let url = normalize_endpoint(" intranet.example.com/app ").unwrap();
        assert_eq!(url.as_str(), "http://intranet.example.com/app");

        let url = normalize_endpoint("https://secure.example.com").unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn test_normalize_endpoint_rejects_unusable() {
        assert!(matches!(
            normalize_endpoint("   ").unwrap_err(),
            Error::InvalidEndpoint { .. }
        ));
        assert!(matches!(
            normalize_endpoint("ftp://files.example.com").unwrap_err(),
            Error::InvalidEndpoint { .. }
        ));
        assert!(matches!(
            normalize_endpoint("http://").unwrap_err(),
            Error::InvalidEndpoint { .. }
        ));
    }

    #[test]
    fn test_classify_status_boundaries() {
        assert_eq!(
            classify_status(199),
            Some(ProbeFailure::Http {
                code: 199,
                reason: "Unexpected Status".to_string()
            })
        );
        assert_eq!(classify_status(200), None);
        assert_eq!(classify_status(301), None);
        assert_eq!(classify_status(399), None);
        assert_eq!(
            classify_status(404),
            Some(ProbeFailure::Http {
                code: 404,
                reason: "Not Found".to_string()
            })
        );
        assert_eq!(
            classify_status(418),
            Some(ProbeFailure::Http {
                code: 418,
                reason: "Client Error".to_string()
            })
        );
    }

    #[test]
    fn test_result_reason_text() {
        let ok = HealthCheckResult::accessible(200, Duration::ZERO);
        assert_eq!(ok.reason(), "System is now accessible");

        let refused = HealthCheckResult::failed(ProbeFailure::ConnectionRefused, Duration::ZERO);
        assert_eq!(refused.reason(), "Connection refused");
        assert!(refused.http_code.is_none());

        let http = HealthCheckResult::failed(
            ProbeFailure::Http {
                code: 503,
                reason: "Service Unavailable".to_string(),
            },
            Duration::ZERO,
        );
        assert_eq!(http.reason(), "HTTP 503 Service Unavailable");
        assert_eq!(http.http_code, Some(503));
        assert!(!http.error.as_ref().unwrap().is_network());
    }

    #[tokio::test]
    async fn test_http_prober_accessible() {
        let addr =
            serve_once("HTTP/1.1 204 No Content\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
        let result = test_prober().check_health(&addr).await.unwrap();
        assert!(result.accessible);
        assert_eq!(result.http_code, Some(204));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_http_prober_http_error() {
        let addr = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let result = test_prober().check_health(&addr).await.unwrap();
        assert!(!result.accessible);
        assert_eq!(result.http_code, Some(503));
        assert_eq!(
            result.error,
            Some(ProbeFailure::Http {
                code: 503,
                reason: "Service Unavailable".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_http_prober_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = test_prober().check_health(&addr.to_string()).await.unwrap();
        assert!(!result.accessible);
        assert_eq!(result.error, Some(ProbeFailure::ConnectionRefused));
    }

    #[tokio::test]
    async fn test_http_prober_tls_against_plain_http() {
        let addr =
            serve_once("HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
        let result = test_prober()
            .check_health(&format!("https://{addr}"))
            .await
            .unwrap();
        assert!(!result.accessible);
        assert_eq!(result.error, Some(ProbeFailure::Tls));
    }

    #[tokio::test]
    async fn test_http_prober_closed_without_response() {
        let addr = serve_with(|mut socket, _| async move {
            let mut buf = [0_u8; 2048];
            let _ = socket.read(&mut buf).await;
            drop(socket);
        })
        .await;
        let result = test_prober().check_health(&addr).await.unwrap();
        assert!(!result.accessible);
        assert_eq!(result.error, Some(ProbeFailure::EmptyResponse));
    }

    #[tokio::test]
    async fn test_http_prober_silent_server_times_out() {
        let addr = serve_with(|mut socket, _| async move {
            let mut buf = [0_u8; 2048];
            let _ = socket.read(&mut buf).await;
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        })
        .await;
        let result = prober_with_timeout(1).check_health(&addr).await.unwrap();
        assert!(!result.accessible);
        assert_eq!(result.error, Some(ProbeFailure::Timeout));
    }

    #[tokio::test]
    async fn test_http_prober_redirect_loop() {
        let addr = serve_with(|mut socket, addr| async move {
            let mut buf = [0_u8; 2048];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 302 Found\r\nLocation: http://{addr}/again\r\n\
                 Content-Length: 0\r\nConnection: close\r\n\r\n"
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        })
        .await;
        let result = test_prober().check_health(&addr).await.unwrap();
        assert!(!result.accessible);
        assert_eq!(result.error, Some(ProbeFailure::TooManyRedirects));
    }

    #[tokio::test]
    async fn test_http_prober_invalid_endpoint_is_an_error() {
        let result = test_prober().check_health("").await;
        assert!(matches!(result, Err(Error::InvalidEndpoint { .. })));
    }

    #[tokio::test]
    async fn test_probe_all_sorts_by_system_id() {
        let prober = Arc::new(ScriptedProber::default());
        prober.set("a.internal", true);
        prober.set("b.internal", false);
        prober.set("c.internal", true);

        let systems = vec![
            sample_record(3, "c.internal"),
            sample_record(1, "a.internal"),
            sample_record(2, "b.internal"),
        ];

        let outcomes = probe_all(prober.clone(), systems, 2, Duration::ZERO).await;
        let ids: Vec<i64> = outcomes.iter().map(|o| o.system.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(outcomes[0].result.as_ref().unwrap().accessible);
        assert!(!outcomes[1].result.as_ref().unwrap().accessible);
        assert_eq!(prober.probe_count(), 3);
    }

    #[tokio::test]
    async fn test_panicked_task_still_yields_an_outcome() {
        let prober = Arc::new(ScriptedProber::default());
        prober.set("a.internal", true);
        prober.set_panicking("b.internal");

        let systems = vec![
            sample_record(1, "a.internal"),
            sample_record(2, "b.internal"),
        ];
        let outcomes = probe_all(prober, systems, 2, Duration::ZERO).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].result.as_ref().unwrap().accessible);
        assert_eq!(outcomes[1].system.id, 2);
        assert!(matches!(
            outcomes[1].result,
            Err(Error::CheckAborted { system_id: 2, .. })
        ));
    }
}
