use crate::provider::{HistoricalEvent, ProviderError, SceneModel, UserImage};
use std::sync::Arc;

pub const INITIAL_EVENT_COUNT: usize = 7;
pub const EXPANSION_EVENT_COUNT: usize = 3;

const INITIAL_EVENTS_INSTRUCTION: &str = "Generate a JSON array of 7 major, visually distinct historical events suitable for an immersive art project. Each object should have a 'title' (e.g., 'Ancient Rome') and a 'prompt' (e.g., 'A bustling street scene in Ancient Rome with grand architecture like the Colosseum in the background.'). Focus on eras with iconic aesthetics.";

fn expansion_instruction(base: &HistoricalEvent) -> String {
    format!(
        "Based on the historical event \"{}\", generate a JSON array of 3 related, but more specific, visually distinct sub-events or concepts. For example, if the event is 'Ancient Rome', you could suggest 'The Colosseum', 'Roman Aqueducts', or 'A Senatorial Debate'. Each object must have a 'title' and a 'prompt'.",
        base.title
    )
}

fn scene_prompt_instruction(base_prompt: &str) -> String {
    format!(
        r#"You are a master art director and prompt engineer for a generative AI model. Your task is to take a simple concept and create a prompt for an image of a person taking a selfie in that historical setting.

Base Concept: "{base_prompt}"

Generate a new, detailed prompt that describes a scene from a selfie-taker's perspective. The prompt must include:
- **Composition:** Explicitly state this is a "selfie photo," "first-person perspective," or "point-of-view shot." The main subject is in the foreground, slightly off-center, as if holding the camera.
- **Background Scene:** A vivid and detailed description of the historical environment, action, and mood behind the person.
- **Artistic Style:** Specify a compelling, photorealistic style (e.g., hyperrealistic, cinematic photo, shot on film).
- **Lighting:** Detail the lighting conditions that affect both the person in the foreground and the background (e.g., bright midday sun, golden hour sunset, flickering torchlight).
- **Atmosphere:** Describe the overall mood (e.g., bustling and chaotic, serene and majestic, adventurous and exciting).
- **Specific Details:** Add at least three specific, interesting details to the background scene to make it unique and immersive.

The final output should be ONLY the new, detailed prompt as a single string, ready to be used for image generation. Do not include any other text or explanation."#
    )
}

fn composition_instruction(detailed_prompt: &str) -> String {
    format!(
        r#"Your primary task is to create a photorealistic selfie of the person from the user image, as if they have traveled back in time.

**Scene & Style Description (from the selfie-taker's perspective):**
{detailed_prompt}

**Integration Instructions:**
1.  **Composition:** The person from the user image is the main subject in the foreground, taking a selfie. Their pose should be natural for someone holding a camera or device just out of frame.
2.  **Transformation:** Transform the person to look like they truly belong in the historical era described. This includes:
    - **Clothing:** Change their clothes to be completely period-appropriate.
    - **Appearance:** Adapt their hairstyle and add subtle, era-specific details (e.g., slight weathering on skin for an ancient setting, different grooming style) to enhance realism.
3.  **Likeness:** It is absolutely crucial to maintain the person's core facial features and likeness. Do not change their face.
4.  **Seamless Blending:** Flawlessly match the person to the background's lighting, shadows, color grading, and overall artistic style to create a single, cohesive image. The final result should look like a genuine photograph, not a composite."#
    )
}

/// Built-in era list substituted when the initial listing fails for any
/// non-credential reason.
pub fn fallback_events() -> Vec<HistoricalEvent> {
    [
        (
            "Ancient Egypt",
            "Inside a grand pyramid, with hieroglyphics on the walls and golden artifacts.",
        ),
        (
            "Viking Age",
            "On a Viking longship sailing through a misty fjord, with rugged mountains in the distance.",
        ),
        (
            "Feudal Japan",
            "A serene Japanese garden with cherry blossoms, a pagoda, and samurai in the distance.",
        ),
        (
            "The Renaissance",
            "A bustling Florentine market square during the Renaissance, with artists and scholars.",
        ),
        (
            "Wild West",
            "A dusty main street of a Wild West town with saloons, cowboys, and horses.",
        ),
        (
            "Roaring Twenties",
            "A lavish Art Deco party from the Roaring Twenties, with flapper dresses and a jazz band.",
        ),
        (
            "Cyberpunk Future",
            "A neon-lit street in a futuristic cyberpunk city with flying vehicles and towering skyscrapers.",
        ),
    ]
    .into_iter()
    .map(|(title, prompt)| HistoricalEvent {
        title: title.to_string(),
        prompt: prompt.to_string(),
    })
    .collect()
}

/// The four journey operations with their degradation policy. Credential
/// failures always propagate so the orchestrator can purge the key; the two
/// listing operations and the prompt refinement mask everything else behind
/// fallback content.
pub struct JourneyGateway {
    model: Arc<dyn SceneModel>,
}

impl JourneyGateway {
    pub fn new(model: Arc<dyn SceneModel>) -> Self {
        JourneyGateway { model }
    }

    /// First ring of eras. Target count 7; a transient failure substitutes
    /// the built-in fallback list and reports success.
    pub async fn list_initial_events(
        &self,
        credential: &str,
    ) -> Result<Vec<HistoricalEvent>, ProviderError> {
        match self
            .model
            .list_events(credential, INITIAL_EVENTS_INSTRUCTION)
            .await
        {
            Ok(events) => Ok(events),
            Err(err) if err.is_auth() => Err(err),
            Err(err) => {
                tracing::warn!(%err, "initial event listing failed, substituting built-in eras");
                Ok(fallback_events())
            }
        }
    }

    /// Sub-events beneath an explored era. Target count 3; a transient
    /// failure degrades to an empty list.
    pub async fn list_expansion_events(
        &self,
        credential: &str,
        base_event: &HistoricalEvent,
    ) -> Result<Vec<HistoricalEvent>, ProviderError> {
        match self
            .model
            .list_events(credential, &expansion_instruction(base_event))
            .await
        {
            Ok(events) => Ok(events),
            Err(err) if err.is_auth() => Err(err),
            Err(err) => {
                tracing::warn!(%err, title = %base_event.title, "expansion listing failed");
                Ok(Vec::new())
            }
        }
    }

    /// Art-director pass over a base prompt. A transient failure returns the
    /// base prompt unchanged.
    pub async fn synthesize_scene_prompt(
        &self,
        credential: &str,
        base_prompt: &str,
    ) -> Result<String, ProviderError> {
        match self
            .model
            .refine_prompt(credential, &scene_prompt_instruction(base_prompt))
            .await
        {
            Ok(detailed) => Ok(detailed),
            Err(err) if err.is_auth() => Err(err),
            Err(err) => {
                tracing::warn!(%err, "scene prompt refinement failed, using base prompt");
                Ok(base_prompt.to_string())
            }
        }
    }

    /// Composite the user into the scene. No fallback: every failure
    /// propagates.
    pub async fn synthesize_image(
        &self,
        credential: &str,
        user_image: &UserImage,
        detailed_prompt: &str,
    ) -> Result<String, ProviderError> {
        self.model
            .compose_image(
                credential,
                user_image,
                &composition_instruction(detailed_prompt),
            )
            .await
    }
}
