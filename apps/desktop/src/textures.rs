use eframe::egui::{self, ColorImage, TextureHandle, TextureOptions};
use std::collections::{HashMap, HashSet};
use timewalk::journey::JourneyGraph;
use timewalk_types::utils::data_url;

/// Decoded node images, keyed by owner plus a cheap payload fingerprint so a
/// re-uploaded root picture gets a fresh entry instead of the stale texture.
#[derive(Default)]
pub struct TextureCache {
    map: HashMap<String, TextureHandle>,
    failed: HashSet<String>,
}

fn cache_key(owner: &str, data_uri: &str) -> String {
    format!("{owner}:{}", data_uri.len())
}

impl TextureCache {
    pub fn texture(
        &mut self,
        ctx: &egui::Context,
        owner: &str,
        data_uri: &str,
    ) -> Option<&TextureHandle> {
        let key = cache_key(owner, data_uri);
        if self.failed.contains(&key) {
            return None;
        }
        if !self.map.contains_key(&key) {
            let Some(decoded) = decode_data_uri(data_uri) else {
                tracing::warn!(owner, "undecodable image payload");
                self.failed.insert(key);
                return None;
            };
            let handle = ctx.load_texture(key.clone(), decoded, TextureOptions::LINEAR);
            self.map.insert(key.clone(), handle);
        }
        self.map.get(&key)
    }

    /// Frees entries no node (and no open preview) shows anymore.
    pub fn prune(&mut self, graph: &JourneyGraph, preview: Option<&str>) {
        let mut live: HashSet<String> = graph
            .nodes
            .iter()
            .filter_map(|node| node.image.as_ref().map(|uri| cache_key(&node.id, uri)))
            .collect();
        if let Some(uri) = preview {
            live.insert(cache_key("preview", uri));
        }
        self.map.retain(|key, _| live.contains(key));
        self.failed.retain(|key| live.contains(key));
    }
}

fn decode_data_uri(data_uri: &str) -> Option<ColorImage> {
    let (_mime_type, bytes) = data_url::to_bytes(data_uri)?;
    let decoded = image::load_from_memory(&bytes).ok()?;
    let rgba = decoded.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    Some(ColorImage::from_rgba_unmultiplied(size, &rgba.into_raw()))
}
