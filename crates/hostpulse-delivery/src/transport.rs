// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::TransportError;
use crate::shared_key::SharedKey;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

pub const TIMESTAMP_HEADER: &str = "X-Timestamp";
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Upper bound on a single delivery attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A single-shot POST of an already encoded JSON body.
///
/// Implementations must not retry; retry policy belongs to
/// [`DeliveryQueue`](crate::DeliveryQueue).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<(), TransportError>;
}

/// Encodes `payload` as JSON and hands it to `transport`.
pub async fn send<Tr, T>(transport: &Tr, url: &str, payload: &T) -> Result<(), TransportError>
where
    Tr: Transport + ?Sized,
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec(payload)?;
    transport.post(url, body).await
}

/// Signs every body with the shared key and POSTs it over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    key: SharedKey,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(key: SharedKey) -> Result<Self, TransportError> {
        Self::with_timeout(key, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(key: SharedKey, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpTransport {
            client,
            key,
            timeout,
        })
    }

    fn headers(&self, body: &[u8], timestamp: &str) -> Result<HeaderMap, TransportError> {
        let signature = self.key.sign(body, timestamp);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, header_value(&self.key.bearer())?);
        headers.insert(TIMESTAMP_HEADER, header_value(timestamp)?);
        headers.insert(SIGNATURE_HEADER, header_value(&signature)?);
        Ok(headers)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value)
        .map_err(|e| TransportError::Request(format!("invalid header value: {e}")))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<(), TransportError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let headers = self.headers(&body, &timestamp)?;

        let time = Instant::now();
        let resp = self
            .client
            .post(url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .inspect_err(|e| {
                if e.is_timeout() {
                    debug!("POST {url} timed out after {} ms", self.timeout.as_millis());
                }
            })?;
        let status = resp.status();
        debug!(
            "POST {url} answered {status} in {} ms",
            time.elapsed().as_millis()
        );

        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status(status))
        }
    }
}
