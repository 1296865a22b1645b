//! # Metadata Normalizer
//!
//! Optional pre-matching step that rewrites noisy song metadata (video
//! titles, "Artist - Title" strings, marketing suffixes) into canonical
//! name/artist/album triples.
//!
//! The [`SongNormalizer`] capability is fallible and must return exactly one
//! song per input, in order, preserving provider identity and ISRC.
//! [`LlmSongNormalizer`] implements it with a single JSON-mode completion
//! request to Gemini or OpenAI over the [`HttpClient`] bridge.

use crate::error::{MatchError, Result};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_traits::music::Song;
use core_runtime::config::{LlmProvider, LlmSettings};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const GEMINI_MODEL: &str = "gemini-2.0-flash";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const OPENAI_MODEL: &str = "gpt-4o-mini";
const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Completion requests can take a while for long playlists
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const SYSTEM_PROMPT: &str = "You normalize music metadata. For every input song return the \
canonical track name, the list of credited artist names and the album name. Remove video \
suffixes such as (Official Video), (Lyrics) or [HD], split 'Artist - Title' strings, drop \
'- Topic' channel suffixes and keep featured artists in the artist list. Never invent data: \
leave a field unchanged when unsure. Answer with a JSON object of the form \
{\"songs\":[{\"name\":\"...\",\"artist_names\":[\"...\"],\"album\":\"...\"}]} containing exactly \
one entry per input song, in the same order.";

/// Rewrites song metadata before matching.
#[async_trait]
pub trait SongNormalizer: Send + Sync {
    /// Returns one normalized song per input song, in input order.
    async fn normalize(&self, songs: Vec<Song>) -> Result<Vec<Song>>;
}

/// Wire form of one song in the prompt and the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SongMetadata {
    name: String,
    #[serde(default)]
    artist_names: Vec<String>,
    #[serde(default)]
    album: String,
}

impl From<&Song> for SongMetadata {
    fn from(song: &Song) -> Self {
        Self {
            name: song.name().to_string(),
            artist_names: song.artist_names().to_vec(),
            album: song.album().to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SongList {
    songs: Vec<SongMetadata>,
}

/// [`SongNormalizer`] backed by a hosted LLM.
pub struct LlmSongNormalizer {
    http_client: Arc<dyn HttpClient>,
    provider: LlmProvider,
    api_key: String,
}

impl LlmSongNormalizer {
    pub fn new(http_client: Arc<dyn HttpClient>, provider: LlmProvider, api_key: String) -> Self {
        Self {
            http_client,
            provider,
            api_key,
        }
    }

    /// Normalizer for the configured provider, `None` when disabled or
    /// missing its key.
    pub fn from_settings(http_client: Arc<dyn HttpClient>, settings: &LlmSettings) -> Option<Self> {
        if !settings.enabled {
            return None;
        }
        let api_key = settings.api_key.clone()?;
        Some(Self::new(http_client, settings.provider, api_key))
    }

    fn build_request(&self, payload: &str) -> Result<HttpRequest> {
        let request = match self.provider {
            LlmProvider::Gemini => HttpRequest::new(
                HttpMethod::Post,
                format!("{}/{}:generateContent", GEMINI_BASE_URL, GEMINI_MODEL),
            )
            .header("x-goog-api-key", self.api_key.clone())
            .json(&json!({
                "systemInstruction": { "parts": [{ "text": SYSTEM_PROMPT }] },
                "contents": [{ "role": "user", "parts": [{ "text": payload }] }],
                "generationConfig": {
                    "responseMimeType": "application/json",
                    "temperature": 0.0
                }
            })),
            LlmProvider::OpenAi => HttpRequest::new(HttpMethod::Post, OPENAI_URL)
                .bearer_token(&self.api_key)
                .json(&json!({
                    "model": OPENAI_MODEL,
                    "temperature": 0.0,
                    "response_format": { "type": "json_object" },
                    "messages": [
                        { "role": "system", "content": SYSTEM_PROMPT },
                        { "role": "user", "content": payload }
                    ]
                })),
        };

        request
            .map(|r| r.timeout(REQUEST_TIMEOUT))
            .map_err(|e| MatchError::Normalization(format!("failed to encode request: {}", e)))
    }

    /// Pulls the model's text answer out of the provider envelope.
    fn extract_text(&self, body: &serde_json::Value) -> Option<String> {
        let text = match self.provider {
            LlmProvider::Gemini => body
                .pointer("/candidates/0/content/parts/0/text")
                .and_then(|v| v.as_str()),
            LlmProvider::OpenAi => body
                .pointer("/choices/0/message/content")
                .and_then(|v| v.as_str()),
        };
        text.map(strip_code_fence)
    }
}

#[async_trait]
impl SongNormalizer for LlmSongNormalizer {
    #[instrument(skip(self, songs), fields(llm = ?self.provider, count = songs.len()))]
    async fn normalize(&self, songs: Vec<Song>) -> Result<Vec<Song>> {
        if songs.is_empty() {
            return Ok(songs);
        }

        let input = SongList {
            songs: songs.iter().map(SongMetadata::from).collect(),
        };
        let payload = serde_json::to_string(&input)
            .map_err(|e| MatchError::Normalization(format!("failed to encode songs: {}", e)))?;

        debug!("Requesting metadata normalization");
        let response = self.http_client.execute(self.build_request(&payload)?).await?;

        if !response.is_success() {
            let status = response.status;
            let body = response
                .text()
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            warn!(status = status, error = %body, "Normalizer request failed");
            return Err(MatchError::Normalization(format!(
                "LLM endpoint returned {}",
                status
            )));
        }

        let envelope: serde_json::Value = response
            .json()
            .map_err(|e| MatchError::Normalization(format!("invalid response body: {}", e)))?;
        let text = self
            .extract_text(&envelope)
            .ok_or_else(|| MatchError::Normalization("response carried no text".to_string()))?;
        let output: SongList = serde_json::from_str(&text)
            .map_err(|e| MatchError::Normalization(format!("invalid song list: {}", e)))?;

        if output.songs.len() != songs.len() {
            return Err(MatchError::LengthMismatch {
                expected: songs.len(),
                actual: output.songs.len(),
            });
        }

        let normalized: Vec<Song> = songs
            .iter()
            .zip(output.songs)
            .map(|(original, meta)| {
                // an empty answer never replaces real data
                let name = if meta.name.trim().is_empty() {
                    original.name().to_string()
                } else {
                    meta.name
                };
                let artists = if meta.artist_names.iter().all(|a| a.trim().is_empty()) {
                    original.artist_names().to_vec()
                } else {
                    meta.artist_names
                };
                original.with_metadata(name, artists, meta.album)
            })
            .collect();

        info!(count = normalized.len(), "Normalized song metadata");
        Ok(normalized)
    }
}

/// Models sometimes wrap JSON answers in a markdown fence.
fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim().to_string()
}
