//! The two modal surfaces: credential entry and image preview.

use eframe::egui::{self, Align2, Color32, RichText};
use timewalk::orchestrator::Notice;

use crate::textures::TextureCache;

const ERROR_COLOR: Color32 = Color32::from_rgb(248, 113, 113);

/// Credential entry overlay. Shown on first run, and re-raised whenever the
/// stored key is rejected by the service.
pub struct KeyOverlay {
    open: bool,
    input: String,
    error: Option<String>,
}

impl KeyOverlay {
    pub fn new(open: bool) -> Self {
        KeyOverlay {
            open,
            input: String::new(),
            error: None,
        }
    }

    pub fn raise(&mut self, notice: Notice) {
        match notice {
            Notice::CredentialRequired { message } => {
                self.open = true;
                self.error = message;
            }
        }
    }

    /// Renders the overlay; returns the submitted key, already trimmed.
    pub fn show(&mut self, ctx: &egui::Context) -> Option<String> {
        if !self.open {
            return None;
        }
        dim(ctx);

        let mut submitted = None;
        egui::Window::new("Enter Your Gemini API Key")
            .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                ui.set_width(380.0);
                ui.label(
                    "To travel, provide your own API key. It is stored on this machine \
                     and only ever sent to the generative service.",
                );
                ui.add_space(8.0);
                let field = ui.add(
                    egui::TextEdit::singleline(&mut self.input)
                        .password(true)
                        .hint_text("Enter your key here")
                        .desired_width(f32::INFINITY),
                );
                if let Some(error) = &self.error {
                    ui.colored_label(ERROR_COLOR, error);
                }
                ui.add_space(8.0);

                let ready = !self.input.trim().is_empty();
                let clicked = ui
                    .add_enabled(ready, egui::Button::new(RichText::new("Start Traveling").strong()))
                    .clicked();
                let entered =
                    ready && field.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if clicked || entered {
                    submitted = Some(self.input.trim().to_string());
                }

                ui.add_space(4.0);
                ui.hyperlink_to(
                    "Don't have a key? Get one from Google AI Studio",
                    "https://ai.google.dev/gemini-api/docs/billing",
                );
            });

        if submitted.is_some() {
            self.open = false;
            self.error = None;
            self.input.clear();
        }
        submitted
    }
}

/// Full-size look at a generated scene. Closes on the ✕ or a click outside.
pub fn image_preview(ctx: &egui::Context, preview: &mut Option<String>, textures: &mut TextureCache) {
    let Some(image) = preview.clone() else {
        return;
    };
    dim(ctx);

    let mut open = true;
    let max_size = ctx.screen_rect().size() * 0.8;
    let window = egui::Window::new("Preview")
        .open(&mut open)
        .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
        .collapsible(false)
        .resizable(false)
        .show(ctx, |ui| {
            match textures.texture(ui.ctx(), "preview", &image) {
                Some(texture) => {
                    ui.add(egui::Image::new(texture).max_size(max_size).rounding(6.0));
                }
                None => {
                    ui.colored_label(ERROR_COLOR, "This image could not be decoded.");
                }
            }
        });

    if let Some(window) = window {
        let clicked_outside =
            ctx.input(|i| i.pointer.any_click()) && !window.response.contains_pointer();
        if clicked_outside {
            open = false;
        }
    }
    if !open {
        *preview = None;
    }
}

fn dim(ctx: &egui::Context) {
    let painter = ctx.layer_painter(egui::LayerId::new(
        egui::Order::Middle,
        egui::Id::new("overlay-dim"),
    ));
    painter.rect_filled(ctx.screen_rect(), 0.0, Color32::from_black_alpha(170));
}
