//! HTTP transport for driver commands.
//!
//! Each driver exposes a `cr` resource. A command is a single GET:
//!
//! ```text
//! GET {endpoint}/cr?dn={service}-dc=lft-dp=AUAVsim
//! ```
//!
//! The query is written verbatim (not form-encoded) because drivers split it
//! on `-` and `=` themselves. `DriverArgs` guarantees it holds no URL
//! metacharacters.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use skyroutine_config::Config;
use skyroutine_utils::error::TransportError;
use skyroutine_utils::types::ServiceId;

use crate::args::DriverArgs;
use crate::transport::{CommandResponse, DriverTransport};

/// Connect timeout for driver endpoints
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Driver transport over HTTP.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    default_endpoint: String,
    endpoints: BTreeMap<String, String>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("default_endpoint", &self.default_endpoint)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Create a transport that sends every service to `default_endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Dispatch` if the HTTP client cannot be built.
    pub fn new(default_endpoint: impl Into<String>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| TransportError::Dispatch {
                service: "*".to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            default_endpoint: default_endpoint.into(),
            endpoints: BTreeMap::new(),
        })
    }

    /// Create a transport from the `[transport]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Dispatch` if the HTTP client cannot be built.
    pub fn new_from_config(config: &Config) -> Result<Self, TransportError> {
        let mut transport = Self::new(config.transport.default_endpoint.clone())?;
        transport.endpoints = config.transport.endpoints.clone();
        Ok(transport)
    }

    /// Route one service to its own endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, service: &ServiceId, endpoint: impl Into<String>) -> Self {
        self.endpoints
            .insert(service.as_str().to_string(), endpoint.into());
        self
    }

    /// Full request URL for a command.
    #[must_use]
    pub fn request_url(&self, service: &ServiceId, args: &DriverArgs) -> String {
        let endpoint = self
            .endpoints
            .get(service.as_str())
            .unwrap_or(&self.default_endpoint);
        format!(
            "{}/cr?dn={}-{}",
            endpoint.trim_end_matches('/'),
            service.as_str(),
            args.encode()
        )
    }
}

#[async_trait]
impl DriverTransport for HttpTransport {
    async fn call(
        &self,
        service: &ServiceId,
        args: &DriverArgs,
    ) -> Result<CommandResponse, TransportError> {
        let url = self.request_url(service, args);
        debug!(service = %service.short_name(), url = %url, "Sending driver command");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TransportError::Dispatch {
                service: service.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| TransportError::Dispatch {
            service: service.to_string(),
            reason: format!("failed to read response body: {e}"),
        })?;

        if status.is_success() {
            Ok(CommandResponse::ok(text))
        } else {
            warn!(
                service = %service.short_name(),
                status = %status,
                "Driver reported command failure"
            );
            Ok(CommandResponse::remote_failure(text))
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::DriverCommand;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-shot HTTP responder; returns the base URL and a handle yielding the request line.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let reply = format!(
                "{status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request.lines().next().unwrap_or_default().to_string()
        });
        (format!("http://{addr}"), handle)
    }

    fn takeoff() -> DriverArgs {
        DriverArgs::command(DriverCommand::Lft)
            .param("AUAVsim")
            .build()
            .unwrap()
    }

    #[test]
    fn test_request_url_uses_override() {
        let service = ServiceId::new("org.reroutlab.code.auav.drivers.FlyDroneDriver");
        let transport = HttpTransport::new("http://127.0.0.1:5117/")
            .unwrap()
            .with_endpoint(&ServiceId::new("camera"), "http://127.0.0.1:5120");

        assert_eq!(
            transport.request_url(&service, &takeoff()),
            "http://127.0.0.1:5117/cr?dn=org.reroutlab.code.auav.drivers.FlyDroneDriver-dc=lft-dp=AUAVsim"
        );
        assert!(
            transport
                .request_url(&ServiceId::new("camera"), &takeoff())
                .starts_with("http://127.0.0.1:5120/cr?")
        );
    }

    #[tokio::test]
    async fn test_success_response() {
        let (base, server) = serve_once("HTTP/1.1 200 OK", "lft: airborne").await;
        let transport = HttpTransport::new(base).unwrap();

        let response = transport
            .call(&ServiceId::new("flight"), &takeoff())
            .await
            .unwrap();

        assert_eq!(response, CommandResponse::ok("lft: airborne"));
        let request_line = server.await.unwrap();
        assert!(request_line.starts_with("GET /cr?dn=flight-dc=lft-dp=AUAVsim "));
    }

    #[tokio::test]
    async fn test_error_status_is_remote_failure() {
        let (base, _server) = serve_once("HTTP/1.1 500 Internal Server Error", "gimbal jammed").await;
        let transport = HttpTransport::new(base).unwrap();

        let response = transport
            .call(&ServiceId::new("gimbal"), &takeoff())
            .await
            .unwrap();

        assert!(!response.success);
        assert_eq!(response.text, "gimbal jammed");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_dispatch_error() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(format!("http://{addr}")).unwrap();
        let err = transport
            .call(&ServiceId::new("flight"), &takeoff())
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Dispatch { .. }));
    }
}
