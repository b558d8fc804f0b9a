//! Direct Line HTTP connection: endpoint, bearer secret, bounded request execution.

use crate::config::DirectLineConfig;
use std::time::Duration;

/// Failure below the protocol level (no usable HTTP response).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// A finished HTTP exchange.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: reqwest::StatusCode,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Client for one Direct Line endpoint.
#[derive(Clone)]
pub struct Connection {
    client: reqwest::Client,
    endpoint: String,
    secret: Option<String>,
    timeout: Duration,
}

impl Connection {
    pub fn new(config: &DirectLineConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: &DirectLineConfig) -> Self {
        Self {
            client,
            endpoint: config.endpoint.trim().trim_end_matches('/').to_string(),
            secret: config
                .secret
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            timeout: config.timeout(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `{endpoint}/conversations`
    pub fn conversations_url(&self) -> String {
        format!("{}/conversations", self.endpoint)
    }

    /// `{endpoint}/conversations/{id}/activities`
    pub fn activities_url(&self, conversation_id: &str) -> String {
        format!("{}/conversations/{}/activities", self.endpoint, conversation_id)
    }

    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.get(url))
    }

    pub fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.post(url))
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.secret {
            Some(secret) => req.bearer_auth(secret),
            None => req,
        }
    }

    /// Send the request and read the whole body, both bounded by the configured timeout.
    pub async fn execute(&self, req: reqwest::RequestBuilder) -> Result<HttpResponse, TransportError> {
        let exchange = async {
            let res = req.send().await?;
            let status = res.status();
            let body = res.bytes().await?.to_vec();
            Ok::<_, reqwest::Error>(HttpResponse { status, body })
        };
        match tokio::time::timeout(self.timeout, exchange).await {
            Err(_) => Err(TransportError::Timeout(self.timeout)),
            Ok(Err(e)) if e.is_timeout() => Err(TransportError::Timeout(self.timeout)),
            Ok(result) => Ok(result?),
        }
    }
}
