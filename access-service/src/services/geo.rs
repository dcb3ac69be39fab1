//! IP geolocation enrichment for the audit trail.
//!
//! Best effort only: enrichment failures and timeouts yield no geo data and
//! never delay or fail the decision that triggered the event.

use async_trait::async_trait;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

use crate::models::GeoInfo;
use crate::services::ServiceError;

/// Resolves a public IP to coarse location metadata.
#[async_trait]
pub trait GeoProvider: Send + Sync {
    async fn resolve(&self, ip: IpAddr) -> Result<Option<GeoInfo>, ServiceError>;
}

/// Whether an address should be sent to the geolocation provider at all.
/// Loopback, private, link-local and unspecified addresses resolve to the
/// fixed "Local" placeholder without a network call.
pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => {
            // fc00::/7 unique-local and fe80::/10 link-local
            let segments = v6.segments();
            let unique_local = (segments[0] & 0xfe00) == 0xfc00;
            let link_local = (segments[0] & 0xffc0) == 0xfe80;
            !(v6.is_loopback() || v6.is_unspecified() || unique_local || link_local)
        }
    }
}

/// Wire shape of the upstream geolocation response.
#[derive(Debug, Deserialize)]
struct GeoApiResponse {
    status: String,
    #[serde(default)]
    country: String,
    #[serde(default, rename = "countryCode")]
    country_code: String,
    #[serde(default, rename = "regionName")]
    region: String,
    #[serde(default)]
    city: String,
    lat: Option<f64>,
    lon: Option<f64>,
    #[serde(default)]
    timezone: String,
}

/// HTTP geolocation client.
#[derive(Clone)]
pub struct HttpGeoProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGeoProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("geo client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GeoProvider for HttpGeoProvider {
    async fn resolve(&self, ip: IpAddr) -> Result<Option<GeoInfo>, ServiceError> {
        let url = format!("{}/{}", self.base_url, ip);

        let mut headers = reqwest::header::HeaderMap::new();
        service_core::observability::inject_trace_headers(&mut headers, None);

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| ServiceError::EnrichmentUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::EnrichmentUnavailable(format!(
                "geo provider returned {}",
                response.status()
            )));
        }

        let payload: GeoApiResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::EnrichmentUnavailable(e.to_string()))?;

        if payload.status != "success" {
            return Ok(None);
        }

        Ok(Some(GeoInfo {
            country: payload.country,
            country_code: payload.country_code,
            region: payload.region,
            city: payload.city,
            lat: payload.lat,
            lon: payload.lon,
            timezone: payload.timezone,
        }))
    }
}

/// Provider that always resolves to a fixed answer. Used in tests and when
/// enrichment is disabled.
pub struct StaticGeoProvider {
    answer: Option<GeoInfo>,
}

impl StaticGeoProvider {
    pub fn new(answer: Option<GeoInfo>) -> Self {
        Self { answer }
    }

    pub fn disabled() -> Self {
        Self { answer: None }
    }
}

#[async_trait]
impl GeoProvider for StaticGeoProvider {
    async fn resolve(&self, _ip: IpAddr) -> Result<Option<GeoInfo>, ServiceError> {
        Ok(self.answer.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_ranges_are_not_public() {
        for ip in ["127.0.0.1", "10.1.2.3", "192.168.0.10", "172.16.5.5", "0.0.0.0", "::1", "fe80::1", "fd12:3456::1"] {
            assert!(!is_public_ip(ip.parse().unwrap()), "{} should be local", ip);
        }
    }

    #[test]
    fn public_addresses_are_public() {
        for ip in ["8.8.8.8", "203.0.113.7", "2001:4860:4860::8888"] {
            assert!(is_public_ip(ip.parse().unwrap()), "{} should be public", ip);
        }
    }
}
