//! HTTP client for the Discord REST API.
//!
//! All outbound HTTP calls go through [`DiscordHttpClient`] so that auth
//! headers, rate-limit back-off, and error handling live in one place.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::types::*;

const BASE_URL: &str = "https://discord.com/api/v10";
const USER_AGENT_VALUE: &str = "DiscordBot (https://github.com/carnage-bot, 0.1)";
const MAX_RETRIES: u32 = 5;
/// Never sleep longer than this for a single rate limit.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Rate-limit tracker (per-bucket)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct BucketState {
    remaining: u32,
    resets_at: Instant,
}

#[derive(Debug, Clone, Default)]
struct RateLimiter {
    /// Route key → bucket id.
    route_buckets: HashMap<String, String>,
    /// Bucket id → state.
    buckets: HashMap<String, BucketState>,
    /// No request may go out before this instant.
    global_until: Option<Instant>,
}

impl RateLimiter {
    /// How long to wait before sending on `route_key`, if at all.
    fn delay_for(&self, route_key: &str, now: Instant) -> Option<Duration> {
        if let Some(until) = self.global_until.filter(|&u| u > now) {
            return Some(until - now);
        }
        let bucket_id = self.route_buckets.get(route_key)?;
        let state = self.buckets.get(bucket_id)?;
        (state.remaining == 0 && state.resets_at > now).then(|| state.resets_at - now)
    }

    fn update(&mut self, route_key: &str, info: &RateLimitInfo, now: Instant) {
        let reset_at = now + info.reset_after.map_or(Duration::from_secs(1), Duration::from_secs_f64);
        if info.is_global {
            self.global_until = Some(reset_at);
        }
        if let Some(bucket) = &info.bucket {
            self.route_buckets.insert(route_key.to_string(), bucket.clone());
            self.buckets.insert(
                bucket.clone(),
                BucketState {
                    remaining: info.remaining.unwrap_or(1),
                    resets_at: reset_at,
                },
            );
        }
    }
}

fn parse_rate_limit_headers(headers: &HeaderMap) -> RateLimitInfo {
    let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    RateLimitInfo {
        remaining: get("x-ratelimit-remaining").and_then(|s| s.parse().ok()),
        reset_after: get("x-ratelimit-reset-after").and_then(|s| s.parse().ok()),
        bucket: get("x-ratelimit-bucket").map(str::to_string),
        is_global: get("x-ratelimit-global") == Some("true"),
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum HttpError {
    /// Non-success status from Discord.
    #[error("Discord API error {status} on {route}: {body}")]
    Api { status: u16, body: String, route: String },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("serialisation error: {0}")]
    Serde(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// DiscordHttpClient
// ---------------------------------------------------------------------------

/// A rate-limit aware client for the Discord REST API.
///
/// Cheap to clone (internals are behind `Arc`).
#[derive(Clone)]
pub struct DiscordHttpClient {
    client: reqwest::Client,
    token: String,
    limiter: Arc<Mutex<RateLimiter>>,
}

impl DiscordHttpClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
            limiter: Arc::new(Mutex::new(RateLimiter::default())),
        }
    }

    /// Send a request to `{BASE_URL}/{path}` and return the body bytes.
    ///
    /// `route_key` groups requests for rate-limit bucketing; use a template
    /// like `POST /channels/{channel_id}/messages`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        route_key: &str,
        body: Option<&Value>,
    ) -> Result<Vec<u8>, HttpError> {
        let url = format!("{}/{}", BASE_URL, path.trim_start_matches('/'));

        for attempt in 0..=MAX_RETRIES {
            let delay = self.limiter.lock().await.delay_for(route_key, Instant::now());
            if let Some(delay) = delay {
                let delay = delay.min(MAX_BACKOFF);
                debug!(route = route_key, delay_ms = delay.as_millis() as u64, "rate-limit pre-emptive backoff");
                tokio::time::sleep(delay).await;
            }

            let mut req = self
                .client
                .request(method.clone(), &url)
                .header(AUTHORIZATION, format!("Bot {}", self.token))
                .header(USER_AGENT, USER_AGENT_VALUE);
            if let Some(json) = body {
                req = req.json(json);
            }
            let resp = req.send().await?;

            let status = resp.status();
            let info = parse_rate_limit_headers(resp.headers());
            self.limiter.lock().await.update(route_key, &info, Instant::now());

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RETRIES {
                let retry_after = info.reset_after.unwrap_or(1.0);
                warn!(
                    route = route_key,
                    attempt,
                    retry_after_s = retry_after,
                    global = info.is_global,
                    "rate-limited by Discord, backing off"
                );
                tokio::time::sleep(Duration::from_secs_f64(retry_after).min(MAX_BACKOFF)).await;
                continue;
            }

            let bytes = resp.bytes().await?;
            if status.is_success() {
                return Ok(bytes.to_vec());
            }
            return Err(HttpError::Api {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
                route: route_key.to_string(),
            });
        }

        Err(HttpError::Api {
            status: StatusCode::TOO_MANY_REQUESTS.as_u16(),
            body: "rate-limited after max retries".to_string(),
            route: route_key.to_string(),
        })
    }

    /// Like [`Self::request`] but deserialises the response body as JSON.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        route_key: &str,
        body: Option<&Value>,
    ) -> Result<T, HttpError> {
        let bytes = self.request(method, path, route_key, body).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    // ------------------------------------------------------------------
    // Endpoints
    // ------------------------------------------------------------------

    /// Answer an interaction. Must happen within three seconds of receipt.
    pub async fn create_interaction_response(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        response: &InteractionResponse,
    ) -> Result<(), HttpError> {
        let body = serde_json::to_value(response)?;
        self.request(
            Method::POST,
            &format!("interactions/{}/{}/callback", interaction_id, interaction_token),
            "POST /interactions/{id}/{token}/callback",
            Some(&body),
        )
        .await?;
        Ok(())
    }

    pub async fn create_message(&self, channel_id: &str, message: &CreateMessage) -> Result<Message, HttpError> {
        let body = serde_json::to_value(message)?;
        self.request_json(
            Method::POST,
            &format!("channels/{}/messages", channel_id),
            &format!("POST /channels/{}/messages", channel_id),
            Some(&body),
        )
        .await
    }

    /// Replace every guild command of the application with `commands`.
    pub async fn bulk_overwrite_guild_commands(
        &self,
        application_id: &str,
        guild_id: &str,
        commands: &[ApplicationCommand],
    ) -> Result<Vec<ApplicationCommand>, HttpError> {
        let body = serde_json::to_value(commands)?;
        self.request_json(
            Method::PUT,
            &format!("applications/{}/guilds/{}/commands", application_id, guild_id),
            "PUT /applications/{id}/guilds/{guild_id}/commands",
            Some(&body),
        )
        .await
    }

    /// Replace every global command of the application with `commands`.
    pub async fn bulk_overwrite_global_commands(
        &self,
        application_id: &str,
        commands: &[ApplicationCommand],
    ) -> Result<Vec<ApplicationCommand>, HttpError> {
        let body = serde_json::to_value(commands)?;
        self.request_json(
            Method::PUT,
            &format!("applications/{}/commands", application_id),
            "PUT /applications/{id}/commands",
            Some(&body),
        )
        .await
    }
}
