//! Optional vision-model advisory for analyzed regions.
//!
//! The classifier annotates; it never categorizes. A note can describe the
//! change in reviewer terms and tag volatile content (timestamps, uuids)
//! that the auto-approval policy may act on. Failures here degrade to the
//! deterministic verdict.

use base64::Engine;
use futures::future::BoxFuture;
use image::imageops::FilterType;
use image::DynamicImage;
use serde::Deserialize;
use url::Url;

use crate::config::AiAnalysis;
use crate::error::{Result, VdcError};
use crate::screenshot::Screenshot;
use crate::types::{AdvisoryNote, ChangeRegion, Extent, PixelBox, VolatileKind};

pub const API_KEY_ENV: &str = "VDC_ADVISORY_API_KEY";
pub const ENDPOINT_ENV: &str = "VDC_ADVISORY_ENDPOINT";
pub const MODEL_ENV: &str = "VDC_ADVISORY_MODEL";
const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o";

/// Context pixels included around a region crop.
const CROP_PADDING: u32 = 8;
/// Longest side of the full-screenshot thumbnails.
const THUMBNAIL_MAX: u32 = 800;

/// Something that can produce an advisory note for one region.
pub trait AdvisoryClassifier: Send + Sync {
    fn describe<'a>(
        &'a self,
        baseline: &'a Screenshot,
        current: &'a Screenshot,
        region: &'a ChangeRegion,
    ) -> BoxFuture<'a, Result<AdvisoryNote>>;
}

/// Resolved advisory settings: config values first, environment fallbacks.
#[derive(Debug, Clone)]
pub struct AdvisoryConfig {
    pub endpoint: Url,
    pub model: String,
    pub api_key: String,
    pub max_regions: usize,
}

impl AdvisoryConfig {
    /// Returns `Ok(None)` when the advisory is disabled or no API key can
    /// be found in the config or the environment. An endpoint that does not
    /// parse as a URL is an error rather than a disabled advisory.
    pub fn resolve(settings: &AiAnalysis) -> Result<Option<AdvisoryConfig>> {
        if !settings.enabled {
            return Ok(None);
        }
        let Some(api_key) = settings
            .api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .or_else(|| std::env::var(OPENAI_KEY_ENV).ok())
        else {
            return Ok(None);
        };
        let endpoint = settings
            .endpoint
            .clone()
            .or_else(|| std::env::var(ENDPOINT_ENV).ok())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let endpoint = Url::parse(&endpoint)?;
        let model = settings
            .model
            .clone()
            .or_else(|| std::env::var(MODEL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Ok(Some(AdvisoryConfig {
            endpoint,
            model,
            api_key,
            max_regions: settings.max_regions,
        }))
    }
}

/// Advisory classifier backed by an OpenAI-compatible vision endpoint.
pub struct VisionClassifier {
    config: AdvisoryConfig,
    client: reqwest::Client,
}

impl VisionClassifier {
    pub fn new(config: AdvisoryConfig) -> VisionClassifier {
        VisionClassifier {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_policy(settings: &AiAnalysis) -> Result<Option<VisionClassifier>> {
        Ok(AdvisoryConfig::resolve(settings)?.map(VisionClassifier::new))
    }

    pub fn max_regions(&self) -> usize {
        self.config.max_regions
    }
}

impl AdvisoryClassifier for VisionClassifier {
    fn describe<'a>(
        &'a self,
        baseline: &'a Screenshot,
        current: &'a Screenshot,
        region: &'a ChangeRegion,
    ) -> BoxFuture<'a, Result<AdvisoryNote>> {
        Box::pin(async move {
            let base_full = thumbnail_b64(baseline)?;
            let curr_full = thumbnail_b64(current)?;
            let base_crop = crop_b64(baseline, &region.bounds)?;
            let curr_crop = crop_b64(current, &region.bounds)?;
            let prompt = build_prompt(region, current.extent());

            let payload = serde_json::json!({
                "model": self.config.model,
                "messages": [
                    {
                        "role": "user",
                        "content": [
                            { "type": "text", "text": prompt },
                            {
                                "type": "image_url",
                                "image_url": { "url": data_url(&base_full), "detail": "low" }
                            },
                            {
                                "type": "image_url",
                                "image_url": { "url": data_url(&curr_full), "detail": "low" }
                            },
                            {
                                "type": "image_url",
                                "image_url": { "url": data_url(&base_crop), "detail": "high" }
                            },
                            {
                                "type": "image_url",
                                "image_url": { "url": data_url(&curr_crop), "detail": "high" }
                            }
                        ]
                    }
                ],
                "max_tokens": 250,
                "response_format": { "type": "json_object" }
            });

            let response = self
                .client
                .post(self.config.endpoint.clone())
                .header("Authorization", format!("Bearer {}", self.config.api_key))
                .header("Content-Type", "application/json")
                .json(&payload)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(VdcError::Unknown(format!(
                    "advisory endpoint returned {status}: {body}"
                )));
            }

            let resp: ChatResponse = response
                .json()
                .await
                .map_err(|e| VdcError::Unknown(format!("unreadable advisory response: {e}")))?;
            let content = resp
                .choices
                .first()
                .and_then(|c| c.message.content.as_ref())
                .ok_or_else(|| VdcError::Unknown("empty advisory response".to_string()))?;
            let analysis: AdvisoryAnalysis = serde_json::from_str(content)
                .map_err(|e| VdcError::Unknown(format!("unparseable advisory analysis: {e}")))?;

            Ok(AdvisoryNote {
                description: analysis.description,
                volatile: analysis.volatile.and_then(VolatileTag::into_kind),
                confidence: analysis.confidence,
            })
        })
    }
}

fn build_prompt(region: &ChangeRegion, extent: Extent) -> String {
    let b = &region.bounds;
    let location = format!(
        "REGION: position ({:.0}%, {:.0}%) from top-left, size ({:.0}% x {:.0}%) of the screenshot.\n\
         PIXEL-LEVEL READ: kind '{}', {:.2}% of pixels changed, mean magnitude {:.0}%.",
        b.x as f32 / extent.width as f32 * 100.0,
        b.y as f32 / extent.height as f32 * 100.0,
        b.width as f32 / extent.width as f32 * 100.0,
        b.height as f32 / extent.height as f32 * 100.0,
        region.kind.label(),
        region.ratio * 100.0,
        region.mean_magnitude * 100.0,
    );

    format!(
        r#"You are reviewing a visual regression between an approved BASELINE screenshot and the CURRENT build.

I'm providing:
1. Full BASELINE screenshot
2. Full CURRENT screenshot
3. Cropped BASELINE region (zoomed in on the change)
4. Cropped CURRENT region (same area)

{location}

Your task: describe what changed in terms a reviewer can act on, and say whether the changed content is volatile, meaning it re-renders differently on every run. Volatile content is either a timestamp (clocks, relative times like "2 minutes ago", dates) or a uuid (random identifiers, session ids, cache-busting hashes).

Only describe differences you can actually see in the crops. If the crops look identical, say so.

Respond in JSON:
{{
  "description": "Specific, actionable description of what changed.",
  "volatile": "timestamp|uuid|none",
  "confidence": 0.0 to 1.0
}}"#
    )
}

fn data_url(b64: &str) -> String {
    format!("data:image/png;base64,{b64}")
}

fn thumbnail_b64(shot: &Screenshot) -> Result<String> {
    let img = DynamicImage::ImageRgba8(shot.pixels().clone());
    let img = if img.width() <= THUMBNAIL_MAX && img.height() <= THUMBNAIL_MAX {
        img
    } else {
        img.resize(THUMBNAIL_MAX, THUMBNAIL_MAX, FilterType::Lanczos3)
    };
    encode_png_base64(&img)
}

fn crop_b64(shot: &Screenshot, bounds: &PixelBox) -> Result<String> {
    let x0 = bounds.x.saturating_sub(CROP_PADDING);
    let y0 = bounds.y.saturating_sub(CROP_PADDING);
    let x1 = bounds.right().saturating_add(CROP_PADDING).min(shot.width());
    let y1 = bounds
        .bottom()
        .saturating_add(CROP_PADDING)
        .min(shot.height());
    let crop =
        image::imageops::crop_imm(shot.pixels(), x0, y0, (x1 - x0).max(1), (y1 - y0).max(1))
            .to_image();
    encode_png_base64(&DynamicImage::ImageRgba8(crop))
}

fn encode_png_base64(img: &DynamicImage) -> Result<String> {
    let mut buf = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buf);
    img.write_to(&mut cursor, image::ImageOutputFormat::Png)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(&buf))
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdvisoryAnalysis {
    description: String,
    #[serde(default)]
    volatile: Option<VolatileTag>,
    #[serde(default)]
    confidence: Option<f32>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum VolatileTag {
    Timestamp,
    Uuid,
    None,
}

impl VolatileTag {
    fn into_kind(self) -> Option<VolatileKind> {
        match self {
            VolatileTag::Timestamp => Some(VolatileKind::Timestamp),
            VolatileTag::Uuid => Some(VolatileKind::Uuid),
            VolatileTag::None => None,
        }
    }
}
