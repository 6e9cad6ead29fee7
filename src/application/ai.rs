use crate::domain::models::{Platform, VideoSlot, VideoType};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const GEMINI_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent";
const REQUEST_TIMEOUT_SECS: u64 = 30;

const ANALYZE_FALLBACK: &str = "Schedule analysis is unavailable right now. Try again later.";
const ANALYZE_EMPTY: &str = "There are no scheduled videos to analyze yet.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDetails {
    pub title: String,
    pub description: String,
}

/// Title/description drafting and whole-schedule commentary. Drafting errors
/// propagate so the caller can surface them next to the slot; analysis is
/// best-effort and degrades to a fixed message.
#[async_trait]
pub trait AiService: Send + Sync {
    async fn generate_video_details(
        &self,
        topic: &str,
        platform: Platform,
        video_type: VideoType,
    ) -> Result<VideoDetails, InfraError>;

    async fn analyze_schedule(&self, slots: &[VideoSlot]) -> String;
}

pub fn load_gemini_api_key_from_lookup<F>(lookup: F) -> Result<String, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    for key in ["POSTPLAN_GEMINI_API_KEY", "GEMINI_API_KEY"] {
        if let Some(value) = lookup(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Ok(normalized.to_string());
            }
        }
    }
    Err(InfraError::InvalidConfig(
        "missing gemini api key (set one of: POSTPLAN_GEMINI_API_KEY, GEMINI_API_KEY)".to_string(),
    ))
}

pub fn load_gemini_api_key() -> Result<String, InfraError> {
    load_gemini_api_key_from_lookup(|key| std::env::var(key).ok())
}

pub struct GeminiAiClient {
    client: Client,
    api_key: String,
}

impl GeminiAiClient {
    pub fn new(api_key: &str) -> Result<Self, InfraError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(InfraError::InvalidConfig(
                "gemini api key must not be empty".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|error| InfraError::Ai(format!("failed building http client: {error}")))?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
        })
    }

    async fn generate(&self, request: &Value) -> Result<Value, InfraError> {
        let response = self
            .client
            .post(GEMINI_ENDPOINT)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|error| InfraError::Ai(format!("network error calling gemini: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Ai(format!("failed reading gemini response: {error}")))?;
        if !status.is_success() {
            return Err(InfraError::Ai(format!(
                "gemini request failed: http {}; body={body}",
                status.as_u16()
            )));
        }
        serde_json::from_str(&body)
            .map_err(|error| InfraError::Ai(format!("invalid gemini payload: {error}")))
    }
}

fn platform_label(platform: Platform) -> &'static str {
    match platform {
        Platform::Youtube => "YouTube",
        Platform::Tiktok => "TikTok",
        Platform::Instagram => "Instagram",
        Platform::Twitter => "Twitter",
    }
}

fn video_type_label(video_type: VideoType) -> &'static str {
    match video_type {
        VideoType::Long => "long-form",
        VideoType::Short => "short-form",
    }
}

pub(crate) fn details_request(topic: &str, platform: Platform, video_type: VideoType) -> Value {
    let prompt = format!(
        "Write a compelling title and a two-sentence description for a {} {} video about: {}",
        video_type_label(video_type),
        platform_label(platform),
        topic.trim()
    );
    serde_json::json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "title": { "type": "STRING" },
                    "description": { "type": "STRING" }
                },
                "required": ["title", "description"]
            }
        }
    })
}

pub(crate) fn analyze_request(slots: &[VideoSlot]) -> Value {
    let mut lines = vec![
        "Review this day's posting schedule and give short, practical feedback on pacing and topic mix:".to_string(),
    ];
    for slot in slots {
        let topic = if slot.topic.trim().is_empty() {
            "(no topic)"
        } else {
            slot.topic.trim()
        };
        lines.push(format!("{} {} [{:?}] {}", slot.date, slot.time, slot.status, topic));
    }
    serde_json::json!({
        "contents": [{ "parts": [{ "text": lines.join("\n") }] }]
    })
}

fn candidate_text(body: &Value) -> Option<&str> {
    body.get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
}

pub(crate) fn extract_details(body: &Value) -> Result<VideoDetails, InfraError> {
    let text = candidate_text(body)
        .ok_or_else(|| InfraError::Ai("gemini response carried no candidate text".to_string()))?;
    serde_json::from_str(text)
        .map_err(|error| InfraError::Ai(format!("gemini returned malformed details: {error}")))
}

#[async_trait]
impl AiService for GeminiAiClient {
    async fn generate_video_details(
        &self,
        topic: &str,
        platform: Platform,
        video_type: VideoType,
    ) -> Result<VideoDetails, InfraError> {
        if topic.trim().is_empty() {
            return Err(InfraError::Validation(
                "topic must not be empty".to_string(),
            ));
        }
        let body = self
            .generate(&details_request(topic, platform, video_type))
            .await?;
        extract_details(&body)
    }

    async fn analyze_schedule(&self, slots: &[VideoSlot]) -> String {
        if slots.is_empty() {
            return ANALYZE_EMPTY.to_string();
        }
        match self.generate(&analyze_request(slots)).await {
            Ok(body) => candidate_text(&body)
                .map(ToOwned::to_owned)
                .unwrap_or_else(|| ANALYZE_FALLBACK.to_string()),
            Err(_) => ANALYZE_FALLBACK.to_string(),
        }
    }
}
