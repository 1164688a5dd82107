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

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use chrono::{TimeZone, Utc};
use powerman_core::{
    AdvicePublisher, AdvisorSink, Collaborators, EntityStateSource, FixedClock, NotificationSink,
    SubscriptionManager,
};
use powerman_types::{EntityMapping, EntryConfig, EntryOptions, PublishedAdvice};
use powerman_web::{AppState, router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt; // for Router::oneshot

struct States;

#[async_trait]
impl EntityStateSource for States {
    async fn raw_state(&self, entity_id: &str) -> Result<String> {
        match entity_id {
            "sensor.battery" => Ok("20".to_owned()),
            "sensor.price" => Ok("0.10".to_owned()),
            _ => Err(anyhow!("Entity not found: {entity_id}")),
        }
    }

    fn name(&self) -> &str {
        "static"
    }
}

struct Silent;

#[async_trait]
impl NotificationSink for Silent {
    async fn notify(&self, _title: &str, _message: &str) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "silent"
    }
}

#[async_trait]
impl AdvisorSink for Silent {
    async fn run_prompt(&self, _agent_id: &str, _prompt: &str) -> Result<String> {
        Ok("ok".to_owned())
    }

    fn name(&self) -> &str {
        "silent"
    }
}

#[async_trait]
impl AdvicePublisher for Silent {
    async fn publish(&self, _: &str, _: &str, _: &PublishedAdvice) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "silent"
    }
}

async fn app() -> Router {
    let manager = Arc::new(SubscriptionManager::new(Collaborators {
        states: Arc::new(States),
        notifier: Arc::new(Silent),
        advisor: Arc::new(Silent),
        publisher: Arc::new(Silent),
        clock: Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
        )),
    }));
    manager
        .start(EntryConfig {
            id: "home".to_owned(),
            name: "Home".to_owned(),
            entities: EntityMapping {
                battery: Some("sensor.battery".to_owned()),
                price_now: Some("sensor.price".to_owned()),
                ..Default::default()
            },
            options: EntryOptions::default(),
        })
        .unwrap();
    // Wait for the first tick
    manager.current_advice("home").await.unwrap();

    router(AppState { manager })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            request = request.header("content-type", "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_lists_entries() {
    let app = app().await;
    let (status, body) = send(&app, "GET", "/api/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["entries"], json!(["home"]));
}

#[tokio::test]
async fn test_current_advice() {
    let app = app().await;
    let (status, body) = send(&app, "GET", "/api/entries/home/advice", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["advice"]["code"], "charge_battery_from_grid_now");
    assert_eq!(body["advice"]["confidence"], 0.85);
    assert!(body["advice"]["timestamp"].is_string());
}

#[tokio::test]
async fn test_unknown_entry_is_not_found() {
    let app = app().await;
    let (status, body) = send(&app, "GET", "/api/entries/cabin/advice", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown entry: cabin");
}

#[tokio::test]
async fn test_advise_now_action() {
    let app = app().await;
    let (status, body) = send(&app, "POST", "/api/entries/home/actions/advise_now", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["command"], "advise_now");
    assert_eq!(body["notified"], true);
}

#[tokio::test]
async fn test_generate_insight_action_without_agent() {
    let app = app().await;
    let (status, body) =
        send(&app, "POST", "/api/entries/home/actions/generate_insight", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["command"], "generate_insight");
    assert_eq!(body["external"]["status"], "disabled");
}

#[tokio::test]
async fn test_unknown_action_is_rejected() {
    let app = app().await;
    let (status, body) = send(&app, "POST", "/api/entries/home/actions/self_destruct", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unknown command: self_destruct");
}

#[tokio::test]
async fn test_update_options() {
    let app = app().await;
    let options = json!({ "options": { "reserve_soc": 40, "advisor_interval_minutes": 5 } });
    let (status, body) = send(&app, "PUT", "/api/entries/home/options", Some(options)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], true);

    let (_, options) = send(&app, "GET", "/api/entries/home/options", None).await;
    assert_eq!(options["reserve_soc"], 40);
    assert_eq!(options["advisor_interval_minutes"], 5);
    assert_eq!(options["target_soc"], 80);
}

#[tokio::test]
async fn test_invalid_options_are_not_applied() {
    let app = app().await;
    let options = json!({ "options": { "peak_start": "25:99" } });
    let (status, body) = send(&app, "PUT", "/api/entries/home/options", Some(options)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["applied"], false);
    assert_eq!(body["validation"]["errors"][0]["field"], "options.peak_start");

    let (_, options) = send(&app, "GET", "/api/entries/home/options", None).await;
    assert_eq!(options["peak_start"], "17:00");
}
