//! Background sync client for point uploads.
//!
//! A standalone, UI-independent HTTP client: everything it needs (token,
//! language) is resolved from the durable store, so it can be driven from
//! background execution contexts with no component tree mounted. Each call
//! performs exactly one attempt — retry policy and backoff belong to the
//! scheduler, which keeps this client free of state beyond the pooled
//! connection.

use crate::error::SyncError;
use crate::store::SyncStore;
use crate::types::{ActivityRecord, LocationSample};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::header::ACCEPT_LANGUAGE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Hard upper bound on one upload call; firing abandons the request.
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// Wire shape of one uploaded point.
#[derive(Debug, Serialize)]
struct WirePoint {
    lat: f64,
    lng: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    ele: Option<f64>,
    /// RFC 3339 capture time
    time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f64>,
}

impl From<&LocationSample> for WirePoint {
    fn from(sample: &LocationSample) -> Self {
        Self {
            lat: sample.lat,
            lng: sample.lng,
            ele: sample.elevation,
            time: format_epoch_ms(sample.timestamp),
            speed: sample.speed,
        }
    }
}

fn format_epoch_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

#[derive(Debug, Serialize)]
struct PointsPayload {
    points: Vec<WirePoint>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Uploads buffered location samples to the backend.
pub struct SyncClient {
    client: Client,
    base_url: String,
    store: Arc<SyncStore>,
    timeout: Duration,
}

impl SyncClient {
    pub fn new(base_url: impl Into<String>, store: Arc<SyncStore>) -> Result<Self, SyncError> {
        Self::with_timeout(base_url, store, SYNC_TIMEOUT)
    }

    /// Client with a non-default call deadline (tests use short ones).
    pub fn with_timeout(
        base_url: impl Into<String>,
        store: Arc<SyncStore>,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| SyncError::Network(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            store,
            timeout,
        })
    }

    /// Upload one batch of points for an activity. One attempt, no retry.
    ///
    /// Success returns the server's updated aggregates. A 401 maps to
    /// [`SyncError::Unauthorized`] so the caller can trigger
    /// re-authentication instead of blind retry; a fired deadline maps to
    /// [`SyncError::Timeout`], distinct from other network failures.
    pub async fn sync_points(
        &self,
        activity_id: &str,
        points: &[LocationSample],
    ) -> Result<ActivityRecord, SyncError> {
        let token = self.store.auth_token().ok_or(SyncError::NoAuthToken)?;
        let language = self.store.language();
        let url = format!("{}/activities/{}/points", self.base_url, activity_id);

        let payload = PointsPayload {
            points: points.iter().map(WirePoint::from).collect(),
        };

        debug!(
            "[sync_points] POST {} ({} points, lang {})",
            url,
            payload.points.len(),
            language
        );

        let call = async {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&token)
                .header(ACCEPT_LANGUAGE, language.as_str())
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        SyncError::Timeout
                    } else {
                        SyncError::Network(e.to_string())
                    }
                })?;

            let status = response.status();

            if status == reqwest::StatusCode::UNAUTHORIZED {
                warn!("[sync_points] 401 for activity {}", activity_id);
                return Err(SyncError::Unauthorized);
            }

            if !status.is_success() {
                let message = match response.json::<ErrorBody>().await {
                    Ok(body) => body
                        .message
                        .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
                    Err(_) => format!("HTTP {}", status.as_u16()),
                };
                warn!(
                    "[sync_points] upload failed for {}: {} ({})",
                    activity_id,
                    message,
                    status.as_u16()
                );
                return Err(SyncError::Http {
                    status: status.as_u16(),
                    message,
                });
            }

            response
                .json::<ActivityRecord>()
                .await
                .map_err(|e| SyncError::Network(format!("Invalid response body: {}", e)))
        };

        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "[sync_points] abandoned after {:?} for activity {}",
                    self.timeout, activity_id
                );
                Err(SyncError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_point_shape() {
        let sample = LocationSample {
            lat: 47.37,
            lng: 8.54,
            elevation: Some(408.0),
            timestamp: 1717236000000,
            speed: Some(3.2),
            heart_rate: Some(155),
            cadence: Some(82),
        };

        let value = serde_json::to_value(WirePoint::from(&sample)).unwrap();
        let object = value.as_object().unwrap();

        // heart rate and cadence are merged server-side, not sent per point
        let keys: Vec<&str> = object.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys.len(), 5);
        for key in ["lat", "lng", "ele", "time", "speed"] {
            assert!(keys.contains(&key), "missing key {}", key);
        }
        assert_eq!(object["time"].as_str().unwrap(), "2024-06-01T10:00:00+00:00");
    }

    #[test]
    fn test_wire_point_omits_absent_optionals() {
        let sample = LocationSample {
            lat: 0.0,
            lng: 0.0,
            elevation: None,
            timestamp: 0,
            speed: None,
            heart_rate: None,
            cadence: None,
        };

        let value = serde_json::to_value(WirePoint::from(&sample)).unwrap();
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("ele"));
        assert!(!object.contains_key("speed"));
    }
}
