use crate::provider::{GeminiConfig, HistoricalEvent, ProviderError, SceneModel, UserImage};
use serde::{Deserialize, Serialize};
use timewalk_types::{async_trait, json, utils::data_url};

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-pro";
const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

/// Markers the service puts into rejection bodies for bad keys. Used on top
/// of the status-code check so that proxies reporting odd statuses still
/// classify correctly.
const AUTH_BODY_MARKERS: [&str; 2] = ["API key not valid", "API_KEY_INVALID"];

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, if any.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect();
        if text.is_empty() { None } else { Some(text) }
    }

    /// First inline image of the first candidate, as a data URI.
    fn inline_image(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        content.parts.iter().find_map(|part| {
            part.inline_data
                .as_ref()
                .map(|inline| data_url::encode(&inline.mime_type, &inline.data))
        })
    }
}

/// JSON schema (in the service's uppercase dialect) constraining event
/// listings to an array of `{title, prompt}` objects.
fn event_schema() -> json::Value {
    json::json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "title": {
                    "type": "STRING",
                    "description": "The name of the historical era or concept.",
                },
                "prompt": {
                    "type": "STRING",
                    "description": "A descriptive prompt for generating an image in this era.",
                },
            },
            "required": ["title", "prompt"],
        },
    })
}

fn classify_failure(status: reqwest::StatusCode, body: &str) -> ProviderError {
    let marked = AUTH_BODY_MARKERS.iter().any(|marker| body.contains(marker));
    if matches!(status.as_u16(), 400 | 401 | 403) || marked {
        ProviderError::Auth(format!("{status}: {body}"))
    } else {
        ProviderError::Transient(format!("{status}: {body}"))
    }
}

/// Wire client for the `models/{model}:generateContent` endpoint.
pub struct GeminiModel {
    client: reqwest::Client,
    endpoint: String,
    text_model: String,
    image_model: String,
}

impl GeminiModel {
    pub fn new(config: &GeminiConfig) -> Self {
        GeminiModel {
            client: reqwest::Client::new(),
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            text_model: config
                .text_model
                .clone()
                .unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            image_model: config
                .image_model
                .clone()
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
        }
    }

    fn request_url(&self, model: &str, credential: &str) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.endpoint.trim_end_matches('/'),
            model,
            credential
        )
    }

    async fn generate(
        &self,
        model: &str,
        credential: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ProviderError> {
        let response = self
            .client
            .post(self.request_url(model, credential))
            .json(request)
            .send()
            .await
            .map_err(|err| ProviderError::Transient(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = classify_failure(status, &body);
            tracing::debug!(%status, model, kind = ?err, "generateContent call failed");
            return Err(err);
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|err| ProviderError::Transient(format!("malformed response: {err}")))
    }
}

#[async_trait]
impl SceneModel for GeminiModel {
    async fn list_events(
        &self,
        credential: &str,
        instruction: &str,
    ) -> Result<Vec<HistoricalEvent>, ProviderError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(instruction.to_string()),
                    inline_data: None,
                }],
            }],
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(event_schema()),
                ..Default::default()
            }),
        };

        let response = self.generate(&self.text_model, credential, &request).await?;
        let text = response
            .text()
            .ok_or_else(|| ProviderError::Transient("response carried no text".to_string()))?;
        json::from_str::<Vec<HistoricalEvent>>(text.trim())
            .map_err(|err| ProviderError::Transient(format!("unparseable event list: {err}")))
    }

    async fn refine_prompt(
        &self,
        credential: &str,
        instruction: &str,
    ) -> Result<String, ProviderError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(instruction.to_string()),
                    inline_data: None,
                }],
            }],
            generation_config: Some(GenerationConfig {
                temperature: Some(0.9),
                ..Default::default()
            }),
        };

        let response = self.generate(&self.text_model, credential, &request).await?;
        response
            .text()
            .map(|text| text.trim().to_string())
            .ok_or_else(|| ProviderError::Transient("response carried no text".to_string()))
    }

    async fn compose_image(
        &self,
        credential: &str,
        image: &UserImage,
        instruction: &str,
    ) -> Result<String, ProviderError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: image.mime_type.clone(),
                            data: image.base64.clone(),
                        }),
                    },
                    Part {
                        text: Some(instruction.to_string()),
                        inline_data: None,
                    },
                ],
            }],
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["IMAGE".to_string()]),
                ..Default::default()
            }),
        };

        let response = self
            .generate(&self.image_model, credential, &request)
            .await?;
        response.inline_image().ok_or(ProviderError::Generation)
    }
}
