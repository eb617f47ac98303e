use std::time::Duration;

use eframe::egui;
use timewalk::journey::JourneyGraph;
use timewalk::orchestrator::Orchestrator;

use crate::canvas::{self, Camera, NodeIntent};
use crate::overlays::{self, KeyOverlay};
use crate::textures::TextureCache;

pub struct TimewalkApp {
    graph: JourneyGraph,
    orchestrator: Orchestrator,
    camera: Camera,
    textures: TextureCache,
    key_overlay: KeyOverlay,
    preview: Option<String>,
}

impl TimewalkApp {
    pub fn new(cc: &eframe::CreationContext<'_>, orchestrator: Orchestrator) -> Self {
        cc.egui_ctx.set_visuals(egui::Visuals::dark());
        let key_overlay = KeyOverlay::new(!orchestrator.has_credential());
        TimewalkApp {
            graph: JourneyGraph::new(),
            orchestrator,
            camera: Camera::default(),
            textures: TextureCache::default(),
            key_overlay,
            preview: None,
        }
    }

    fn dispatch(&mut self, intent: NodeIntent) {
        let notice = match intent {
            NodeIntent::UploadImage => rfd::FileDialog::new()
                .add_filter("image", &["png", "jpg", "jpeg"])
                .pick_file()
                .and_then(|path| self.orchestrator.handle_upload(&mut self.graph, &path)),
            NodeIntent::PreviewImage(image) => {
                self.preview = Some(image);
                None
            }
            NodeIntent::RequestGeneration(node_id) => self
                .orchestrator
                .handle_generate(&mut self.graph, &node_id),
            NodeIntent::RequestExpansion(node_id) => {
                self.orchestrator.handle_expand(&mut self.graph, &node_id)
            }
            NodeIntent::NodeMoved(node_id, position) => {
                self.orchestrator
                    .handle_node_moved(&mut self.graph, &node_id, position);
                None
            }
        };
        if let Some(notice) = notice {
            self.key_overlay.raise(notice);
        }
    }

    fn heading(ctx: &egui::Context) {
        egui::Area::new(egui::Id::new("timewalk-heading"))
            .fixed_pos(egui::pos2(16.0, 16.0))
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.heading(
                        egui::RichText::new("Timewalk").color(egui::Color32::from_rgb(103, 232, 249)),
                    );
                    ui.label("Create your personal journey through history.");
                });
            });
    }
}

impl eframe::App for TimewalkApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        for notice in self.orchestrator.pump(&mut self.graph) {
            self.key_overlay.raise(notice);
        }

        // Spinners only animate while frames keep coming.
        if self.graph.nodes.iter().any(|node| node.busy) {
            ctx.request_repaint_after(Duration::from_millis(120));
        }
        self.textures.prune(&self.graph, self.preview.as_deref());

        let mut intents = Vec::new();
        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(egui::Color32::from_rgb(17, 24, 39)))
            .show(ctx, |ui| {
                intents = canvas::show(ui, &self.graph, &mut self.camera, &mut self.textures);
            });
        Self::heading(ctx);
        for intent in intents {
            self.dispatch(intent);
        }

        if let Some(key) = self.key_overlay.show(ctx) {
            self.orchestrator.submit_credential(&key);
        }
        overlays::image_preview(ctx, &mut self.preview, &mut self.textures);
    }
}
