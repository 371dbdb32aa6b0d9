// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt::Debug;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// The secret shared with the collector.
///
/// It is sent as the bearer token and keys the request signature. Cloning is
/// cheap and `Debug` never prints the key.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedKey(Arc<str>);

impl SharedKey {
    pub fn new(key: &str) -> Self {
        Self(Arc::from(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }

    /// Hex-encoded HMAC-SHA256 of `body || timestamp`.
    pub fn sign(&self, body: &[u8], timestamp: &str) -> String {
        // HMAC accepts keys of any length, so this cannot fail.
        let Ok(mut mac) = HmacSha256::new_from_slice(self.0.as_bytes()) else {
            return String::new();
        };
        mac.update(body);
        mac.update(timestamp.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Checks an `Authorization` header value against this key.
    pub fn authorizes(&self, header: Option<&str>) -> bool {
        header.is_some_and(|value| value == self.bearer())
    }
}

impl Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedKey(***)")
    }
}
