// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of PowerMan.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use crate::errors::{HaError, HaResult};
use crate::types::{HaEntityState, HaServiceResponse, HaStateUpdate};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Home Assistant REST API client
#[derive(Clone)]
pub struct HomeAssistantClient {
    base_url: String,
    token: String,
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl std::fmt::Debug for HomeAssistantClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomeAssistantClient")
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

impl HomeAssistantClient {
    /// Create a client with a 10 second request timeout
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> HaResult<Self> {
        Self::with_request_timeout(base_url, token, Duration::from_secs(10))
    }

    /// Create a client whose requests give up after `timeout`
    ///
    /// Conversation agents can take far longer than a state read, so the
    /// advisor adapter uses its own client with a longer timeout.
    pub fn with_request_timeout(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> HaResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HaError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: token.into(),
            client,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        })
    }

    /// Create HA client using Supervisor API environment variables
    /// This is the standard method for HA addons
    pub fn from_supervisor() -> HaResult<Self> {
        let base_url = "http://supervisor/core";
        let token = std::env::var("SUPERVISOR_TOKEN").map_err(|_| {
            HaError::ConfigError(
                "SUPERVISOR_TOKEN environment variable not set. Are you running as an HA addon?"
                    .to_owned(),
            )
        })?;

        info!("Initializing HA client using Supervisor API");
        Self::new(base_url, token)
    }

    /// Create HA client from configuration values
    /// Falls back to environment variables if config values are not set
    pub fn from_config(base_url: Option<String>, token: Option<String>) -> HaResult<Self> {
        let base_url = base_url
            .or_else(|| std::env::var("HA_BASE_URL").ok())
            .unwrap_or_else(|| "http://localhost:8123".to_owned());

        let token = token
            .or_else(|| std::env::var("HA_TOKEN").ok())
            .ok_or_else(|| {
                HaError::ConfigError(
                    "HA token not found in config or HA_TOKEN environment variable".to_owned(),
                )
            })?;

        info!("Initializing HA client from configuration: {}", base_url);
        Self::new(base_url, token)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Same endpoint and credentials, different request timeout
    pub fn cloned_with_timeout(&self, timeout: Duration) -> HaResult<Self> {
        Ok(Self::with_request_timeout(&self.base_url, &self.token, timeout)?
            .with_retry_config(self.max_retries, self.retry_delay))
    }

    fn state_url(&self, entity_id: &str) -> String {
        format!(
            "{}/api/states/{}",
            self.base_url,
            urlencoding::encode(entity_id)
        )
    }

    /// Get the state of a specific entity
    pub async fn get_state(&self, entity_id: &str) -> HaResult<HaEntityState> {
        let url = self.state_url(entity_id);
        debug!("🔍 [HA QUERY] Getting state for entity: {}", entity_id);
        trace!("   URL: {}", url);

        let response = self
            .retry_request(|| async { self.client.get(&url).bearer_auth(&self.token).send().await })
            .await?;

        match response.status() {
            StatusCode::OK => {
                let state = response.json::<HaEntityState>().await?;
                debug!("✅ [HA RESULT] Entity: {} = '{}'", entity_id, state.state);
                trace!("   Last updated: {}", state.last_updated);
                Ok(state)
            }
            StatusCode::NOT_FOUND => {
                warn!("❌ [HA ERROR] Entity not found: {}", entity_id);
                Err(HaError::EntityNotFound(entity_id.to_owned()))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!("❌ [HA ERROR] Authentication failed for entity: {}", entity_id);
                Err(HaError::AuthenticationFailed)
            }
            status => Err(Self::api_error(status, response).await),
        }
    }

    /// Create or overwrite an entity state
    pub async fn set_state(&self, entity_id: &str, update: &HaStateUpdate) -> HaResult<HaEntityState> {
        let url = self.state_url(entity_id);
        debug!("📝 [HA STATE] Setting {} = '{}'", entity_id, update.state);

        let response = self
            .retry_request(|| async {
                self.client
                    .post(&url)
                    .bearer_auth(&self.token)
                    .json(update)
                    .send()
                    .await
            })
            .await?;

        match response.status() {
            // 201 when the entity was created, 200 when it was updated
            StatusCode::OK | StatusCode::CREATED => Ok(response.json::<HaEntityState>().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!("❌ [HA STATE] Authentication failed for: {}", entity_id);
                Err(HaError::AuthenticationFailed)
            }
            status => Err(Self::api_error(status, response).await),
        }
    }

    /// Call a Home Assistant service
    ///
    /// # Example
    /// ```no_run
    /// # use powerman_ha::client::HomeAssistantClient;
    /// # use serde_json::json;
    /// # async fn example() {
    /// # let client = HomeAssistantClient::from_config(None, None).unwrap();
    /// client.call_service(
    ///     "persistent_notification.create",
    ///     json!({ "title": "PowerMan", "message": "Battery below reserve" })
    /// ).await.unwrap();
    /// # }
    /// ```
    pub async fn call_service(&self, service: &str, data: Value) -> HaResult<()> {
        self.post_service(service, &data, false).await?;
        Ok(())
    }

    /// Call a service that returns data (`?return_response`)
    pub async fn call_service_with_response(
        &self,
        service: &str,
        data: Value,
    ) -> HaResult<HaServiceResponse> {
        let response = self.post_service(service, &data, true).await?;
        let body = response.json::<HaServiceResponse>().await?;
        Ok(body)
    }

    async fn post_service(
        &self,
        service: &str,
        data: &Value,
        return_response: bool,
    ) -> HaResult<Response> {
        let Some((domain, name)) = service
            .split_once('.')
            .filter(|(domain, name)| !domain.is_empty() && !name.is_empty() && !name.contains('.'))
        else {
            error!("❌ [HA ERROR] Invalid service format: {}", service);
            return Err(HaError::ServiceCallFailed {
                service: service.to_owned(),
                reason: "Invalid service format, expected 'domain.service'".to_owned(),
            });
        };

        let mut url = format!("{}/api/services/{}/{}", self.base_url, domain, name);
        if return_response {
            url.push_str("?return_response");
        }
        info!("📞 [HA SERVICE] Calling: {}", service);
        trace!("   Data: {}", data);

        let response = self
            .retry_request(|| async {
                self.client
                    .post(&url)
                    .bearer_auth(&self.token)
                    .json(data)
                    .send()
                    .await
            })
            .await?;

        match response.status() {
            StatusCode::OK => {
                debug!("✅ [HA SERVICE] Success: {}", service);
                Ok(response)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!("❌ [HA SERVICE] Authentication failed for: {}", service);
                Err(HaError::AuthenticationFailed)
            }
            status => {
                let reason = response.text().await.unwrap_or_default();
                error!("❌ [HA SERVICE] Failed: {} (status: {})", service, status);
                debug!("   Error: {}", reason);
                Err(HaError::ServiceCallFailed {
                    service: service.to_owned(),
                    reason,
                })
            }
        }
    }

    /// Health check - ping HA API
    pub async fn ping(&self) -> HaResult<bool> {
        let url = format!("{}/api/", self.base_url);
        debug!("Performing health check");

        match self.client.get(&url).bearer_auth(&self.token).send().await {
            Ok(response) => {
                let is_ok = response.status().is_success();
                if is_ok {
                    debug!("Health check passed");
                } else {
                    warn!("Health check failed: status {}", response.status());
                }
                Ok(is_ok)
            }
            Err(e) => {
                warn!("Health check failed: {}", e);
                Ok(false)
            }
        }
    }

    /// Get Home Assistant configuration (including timezone)
    pub async fn get_config(&self) -> HaResult<Value> {
        let url = format!("{}/api/config", self.base_url);
        debug!("Fetching Home Assistant configuration");

        let response = self
            .retry_request(|| async { self.client.get(&url).bearer_auth(&self.token).send().await })
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json::<Value>().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(HaError::AuthenticationFailed),
            status => Err(Self::api_error(status, response).await),
        }
    }

    /// Get Home Assistant timezone
    pub async fn get_timezone(&self) -> HaResult<String> {
        let config = self.get_config().await?;

        config
            .get("time_zone")
            .and_then(Value::as_str)
            .map(|tz| {
                info!("🌍 Home Assistant timezone: {}", tz);
                tz.to_owned()
            })
            .ok_or_else(|| HaError::InvalidResponse("time_zone missing from HA config".to_owned()))
    }

    async fn api_error(status: StatusCode, response: Response) -> HaError {
        let message = response.text().await.unwrap_or_default();
        error!("❌ [HA ERROR] Status {}: {}", status, message);
        HaError::ApiError {
            status: status.as_u16(),
            message,
        }
    }

    /// Retry a request with exponential backoff
    async fn retry_request<F, Fut>(&self, mut request_fn: F) -> HaResult<Response>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Response, reqwest::Error>>,
    {
        let mut attempts = 0;
        let mut delay = self.retry_delay;

        loop {
            attempts += 1;
            match request_fn().await {
                Ok(response) => return Ok(response),
                Err(e) if attempts >= self.max_retries || e.is_timeout() => {
                    // A timed out request has already used its whole budget
                    error!("Request failed after {} attempts: {}", attempts, e);
                    return Err(HaError::from_transport(e));
                }
                Err(e) => {
                    warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {:?}",
                        attempts, self.max_retries, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    /// Set custom retry configuration
    pub fn with_retry_config(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = retry_delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn state_body(entity_id: &str, state: &str) -> String {
        json!({
            "entity_id": entity_id,
            "state": state,
            "attributes": {},
            "last_changed": "2025-10-02T10:00:00Z",
            "last_updated": "2025-10-02T10:00:00Z"
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_get_state_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/states/sensor.battery_soc")
            .match_header("authorization", "Bearer test_token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(state_body("sensor.battery_soc", "64"))
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let state = client.get_state("sensor.battery_soc").await.unwrap();

        assert_eq!(state.entity_id, "sensor.battery_soc");
        assert_eq!(state.state, "64");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_state_not_found() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/states/sensor.nonexistent")
            .with_status(404)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let result = client.get_state("sensor.nonexistent").await;

        assert!(matches!(result, Err(HaError::EntityNotFound(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_state_unauthorized() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/states/sensor.battery_soc")
            .with_status(401)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "wrong").unwrap();
        let result = client.get_state("sensor.battery_soc").await;

        assert!(matches!(result, Err(HaError::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn test_set_state_accepts_created() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/states/sensor.powerman_home_advice")
            .match_header("authorization", "Bearer test_token")
            .match_body(Matcher::PartialJson(json!({
                "state": "plug_in_ev_now",
                "attributes": { "confidence": 0.8 }
            })))
            .with_status(201)
            .with_body(state_body("sensor.powerman_home_advice", "plug_in_ev_now"))
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let update = HaStateUpdate {
            state: "plug_in_ev_now".to_owned(),
            attributes: json!({ "confidence": 0.8 }),
        };
        let state = client
            .set_state("sensor.powerman_home_advice", &update)
            .await
            .unwrap();

        assert_eq!(state.state, "plug_in_ev_now");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_call_service_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/services/persistent_notification/create")
            .match_header("authorization", "Bearer test_token")
            .match_body(Matcher::Json(json!({
                "title": "PowerMan",
                "message": "hello"
            })))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let result = client
            .call_service(
                "persistent_notification.create",
                json!({"title": "PowerMan", "message": "hello"}),
            )
            .await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_call_service_with_response() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/services/conversation/process")
            .match_query(Matcher::Regex("return_response".to_owned()))
            .with_status(200)
            .with_body(
                json!({
                    "changed_states": [],
                    "service_response": {
                        "response": { "speech": { "plain": { "speech": "Wait for the sun." } } }
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let response = client
            .call_service_with_response("conversation.process", json!({"text": "hi"}))
            .await
            .unwrap();

        assert_eq!(response.conversation_speech(), Some("Wait for the sun."));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_call_service_failure_reports_reason() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/services/notify/mobile_app")
            .with_status(400)
            .with_body("Service not found")
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        let result = client.call_service("notify.mobile_app", json!({})).await;

        assert!(matches!(
            result,
            Err(HaError::ServiceCallFailed { ref reason, .. }) if reason == "Service not found"
        ));
    }

    #[tokio::test]
    async fn test_call_service_invalid_format() {
        let client = HomeAssistantClient::new("http://localhost", "token").unwrap();
        for service in ["invalid", "a.b.c", ".create"] {
            let result = client.call_service(service, json!({})).await;
            assert!(matches!(result, Err(HaError::ServiceCallFailed { .. })));
        }
    }

    #[tokio::test]
    async fn test_ping_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/")
            .match_header("authorization", "Bearer test_token")
            .with_status(200)
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        assert!(client.ping().await.unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_timezone() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/config")
            .with_status(200)
            .with_body(json!({"time_zone": "Europe/Prague", "version": "2025.10.1"}).to_string())
            .create_async()
            .await;

        let client = HomeAssistantClient::new(server.url(), "test_token").unwrap();
        assert_eq!(client.get_timezone().await.unwrap(), "Europe/Prague");
    }

    #[tokio::test]
    async fn test_connection_refused_retries_then_fails() {
        // Nothing listens on port 9 of localhost
        let client = HomeAssistantClient::new("http://127.0.0.1:9", "token")
            .unwrap()
            .with_retry_config(2, Duration::from_millis(10));

        let result = client.get_state("sensor.battery_soc").await;
        assert!(matches!(result, Err(HaError::HttpError(_))));
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let client = HomeAssistantClient::new("http://ha.local:8123/", "token").unwrap();
        assert_eq!(client.base_url(), "http://ha.local:8123");
        assert_eq!(
            client.state_url("sensor.battery"),
            "http://ha.local:8123/api/states/sensor.battery"
        );
    }
}
