pub mod gateway;
pub mod gemini;
pub mod provider;

pub use gateway::{EXPANSION_EVENT_COUNT, INITIAL_EVENT_COUNT, JourneyGateway, fallback_events};
pub use provider::{GeminiConfig, HistoricalEvent, ProviderError, SceneModel, UserImage};
