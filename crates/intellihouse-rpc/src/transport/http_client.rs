use async_trait::async_trait;
use futures::future::BoxFuture;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::Method;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use intellihouse_common::{
    canonical_endpoint, ClientTransport, ClientTransportProvider, HostId, PayloadTransform,
    PlainPayload, Result, RpcConst, RpcError,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

type HyperClient = Client<HttpConnector, Full<Bytes>>;

/// Maps host ids to HTTP endpoints and opens one POST exchange per request.
///
/// Base URLs are canonicalized on registration: trailing slashes are
/// trimmed and the RPC path is appended when missing. Hosts without an
/// explicit endpoint use the default endpoint, if one is set.
///
/// The transport timeout bounds connection setup. Reading a response is
/// bounded by the time the request has left.
pub struct HttpTransportProvider {
    client: HyperClient,
    endpoints: RwLock<HashMap<HostId, String>>,
    default_endpoint: RwLock<Option<String>>,
    transform: Arc<dyn PayloadTransform>,
}

impl Default for HttpTransportProvider {
    fn default() -> Self {
        Self::new(RpcConst::TRANSPORT_TIMEOUT)
    }
}

impl HttpTransportProvider {
    pub fn new(transport_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(transport_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            endpoints: RwLock::new(HashMap::new()),
            default_endpoint: RwLock::new(None),
            transform: Arc::new(PlainPayload),
        }
    }

    pub fn with_transform(mut self, transform: Arc<dyn PayloadTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_endpoint(self, host_id: impl Into<HostId>, base_url: &str) -> Result<Self> {
        self.add_endpoint(host_id, base_url)?;
        Ok(self)
    }

    pub fn with_default_endpoint(self, base_url: &str) -> Result<Self> {
        *self.default_endpoint.write() = Some(canonical_endpoint(base_url)?);
        Ok(self)
    }

    pub fn add_endpoint(&self, host_id: impl Into<HostId>, base_url: &str) -> Result<()> {
        let endpoint = canonical_endpoint(base_url)?;
        self.endpoints.write().insert(host_id.into(), endpoint);
        Ok(())
    }

    pub fn endpoint(&self, host_id: &HostId) -> Option<String> {
        self.endpoints
            .read()
            .get(host_id)
            .cloned()
            .or_else(|| self.default_endpoint.read().clone())
    }
}

impl ClientTransportProvider for HttpTransportProvider {
    fn create_client_transport(&self, host_id: &HostId) -> Result<Box<dyn ClientTransport>> {
        let endpoint = self
            .endpoint(host_id)
            .ok_or_else(|| RpcError::UnknownHost(host_id.clone()))?;

        Ok(Box::new(HttpClientTransport {
            client: self.client.clone(),
            endpoint,
            transform: self.transform.clone(),
            in_flight: None,
        }))
    }

    fn close(&self) {
        self.endpoints.write().clear();
        tracing::debug!("HTTP transport provider closed");
    }
}

/// One HTTP POST exchange.
pub struct HttpClientTransport {
    client: HyperClient,
    endpoint: String,
    transform: Arc<dyn PayloadTransform>,
    in_flight: Option<BoxFuture<'static, Result<Bytes>>>,
}

impl HttpClientTransport {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ClientTransport for HttpClientTransport {
    async fn send_request(&mut self, payload: Bytes) -> Result<()> {
        let body = self.transform.seal(payload)?;
        let request = hyper::Request::builder()
            .method(Method::POST)
            .uri(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(body))
            .map_err(|e| RpcError::Transport(format!("Failed to build HTTP request: {}", e)))?;

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        self.in_flight = Some(Box::pin(async move {
            let response = client
                .request(request)
                .await
                .map_err(|e| RpcError::Transport(format!("HTTP request to {} failed: {}", endpoint, e)))?;

            let status = response.status();
            if !status.is_success() {
                return Err(RpcError::Transport(format!("{} answered HTTP {}", endpoint, status)));
            }

            Ok(response
                .into_body()
                .collect()
                .await
                .map_err(|e| RpcError::Transport(format!("Failed to read response body: {}", e)))?
                .to_bytes())
        }));
        Ok(())
    }

    async fn receive_response(&mut self, timeout: Duration) -> Result<Bytes> {
        let in_flight = self
            .in_flight
            .take()
            .ok_or_else(|| RpcError::Transport("No request in flight".to_string()))?;

        match tokio::time::timeout(timeout, in_flight).await {
            Ok(body) => self.transform.open(body?),
            Err(_) => Err(RpcError::Timeout(timeout.as_millis() as u64)),
        }
    }
}
