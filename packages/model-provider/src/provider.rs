use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use timewalk_types::{async_trait, utils::data_url};

/// One era suggestion produced by the model: a display title plus the base
/// scene prompt later refined for image work. The JSON shape of this struct
/// doubles as the response schema sent to the service.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct HistoricalEvent {
    pub title: String,
    pub prompt: String,
}

/// The selfie captured at root upload. Held once per session and reused for
/// every composition call; overwriting replaces it entirely.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct UserImage {
    pub base64: String,
    pub mime_type: String,
}

impl UserImage {
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        use base64::{Engine as _, engine::general_purpose::STANDARD};
        UserImage {
            base64: STANDARD.encode(bytes),
            mime_type: mime_type.to_string(),
        }
    }

    pub fn to_data_url(&self) -> String {
        data_url::encode(&self.mime_type, &self.base64)
    }
}

/// Typed failure taxonomy for provider calls. Classification happens inside
/// the wire client, never by substring inspection downstream.
#[derive(thiserror::Error, Clone, Debug)]
pub enum ProviderError {
    /// The service rejected the credential. Global effect: the key is purged
    /// and the user is re-prompted.
    #[error("credential rejected: {0}")]
    Auth(String),
    /// Transport, parse or content failure. Node-local effect only.
    #[error("transient provider failure: {0}")]
    Transient(String),
    /// The service answered but produced no usable image payload.
    #[error("no image was generated")]
    Generation,
}

impl ProviderError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ProviderError::Auth(_))
    }
}

/// Connection settings for the Gemini wire client. The credential is not part
/// of the configuration: it is passed per call so a flow always works with the
/// key it was started with.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, Default)]
pub struct GeminiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_model: Option<String>,
}

/// Raw model operations. Implementations perform the network call and return
/// either the typed result or a classified [`ProviderError`]; fallback
/// behavior lives one layer up in [`crate::gateway::JourneyGateway`].
#[async_trait]
pub trait SceneModel: Send + Sync {
    /// Ask the model for a JSON array of `{title, prompt}` era suggestions.
    async fn list_events(
        &self,
        credential: &str,
        instruction: &str,
    ) -> Result<Vec<HistoricalEvent>, ProviderError>;

    /// Ask the model to expand a base concept into a detailed scene prompt.
    async fn refine_prompt(
        &self,
        credential: &str,
        instruction: &str,
    ) -> Result<String, ProviderError>;

    /// Ask the model to composite the user into a scene. Returns the image as
    /// a data URI.
    async fn compose_image(
        &self,
        credential: &str,
        image: &UserImage,
        instruction: &str,
    ) -> Result<String, ProviderError>;
}
