//! HTTP adapter for the live-conditions feed.

use std::fmt;

use serde::Deserialize;
use tracing::warn;

use crate::model::{Closure, Conditions, Coordinate, DEFAULT_TRAFFIC_FACTOR, RouteId};
use crate::traits::ConditionsSource;

#[derive(Debug, Clone)]
pub struct ConditionsFeedConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ConditionsFeedConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 2,
        }
    }
}

#[derive(Debug)]
pub enum FeedError {
    Http(reqwest::Error),
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedError::Http(err) => write!(f, "conditions feed request failed: {}", err),
        }
    }
}

impl std::error::Error for FeedError {}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        FeedError::Http(err)
    }
}

#[derive(Debug, Clone)]
pub struct ConditionsFeedClient {
    config: ConditionsFeedConfig,
    client: reqwest::blocking::Client,
}

impl ConditionsFeedClient {
    pub fn new(config: ConditionsFeedConfig) -> Result<Self, FeedError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Fetch conditions for a route, surfacing transport and decode errors.
    pub fn fetch(&self, route_id: &RouteId) -> Result<Conditions, FeedError> {
        let url = format!(
            "{}/routes/{}/conditions",
            self.config.base_url.trim_end_matches('/'),
            route_id
        );

        let body = self
            .client
            .get(url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<FeedResponse>())?;

        Ok(body.into())
    }
}

impl ConditionsSource for ConditionsFeedClient {
    fn conditions_for(&self, route_id: &RouteId) -> Conditions {
        match self.fetch(route_id) {
            Ok(conditions) => conditions,
            Err(err) => {
                warn!(route = %route_id, error = %err, "conditions feed unavailable, using defaults");
                Conditions::default()
            }
        }
    }
}

/// Feed wire format. Closures arrive as bare coordinates.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedResponse {
    traffic_factor: Option<f64>,
    #[serde(default)]
    closures: Vec<Coordinate>,
    vehicle_position: Option<Coordinate>,
}

impl From<FeedResponse> for Conditions {
    fn from(response: FeedResponse) -> Self {
        Conditions {
            traffic_factor: response.traffic_factor.unwrap_or(DEFAULT_TRAFFIC_FACTOR),
            closures: response
                .closures
                .into_iter()
                .map(|location| Closure { location })
                .collect(),
            vehicle_position: response.vehicle_position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_defaults() {
        let response: FeedResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(Conditions::from(response), Conditions::default());
    }

    #[test]
    fn test_response_maps_closures() {
        let response: FeedResponse = serde_json::from_str(
            r#"{"trafficFactor": 1.6, "closures": [{"latitude": 36.1, "longitude": -115.2}]}"#,
        )
        .unwrap();
        let conditions = Conditions::from(response);

        assert_eq!(conditions.traffic_factor, 1.6);
        assert_eq!(conditions.closures, vec![Closure::at(36.1, -115.2)]);
    }

    #[test]
    fn test_unreachable_feed_falls_back() {
        let client = ConditionsFeedClient::new(ConditionsFeedConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
        })
        .unwrap();

        let route_id = RouteId::new("r1");
        assert!(client.fetch(&route_id).is_err());
        assert_eq!(client.conditions_for(&route_id), Conditions::default());
    }
}
