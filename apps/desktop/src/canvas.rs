//! The journey canvas: edges, node bodies and the per-node actions. Nodes are
//! a pure rendering of their [`JourneyNode`] record; interactions surface as
//! [`NodeIntent`]s for the app to dispatch, nothing is mutated here.

use eframe::egui::{
    self, Align2, Color32, FontId, Pos2, Rect, Sense, Stroke, Vec2, epaint::CubicBezierShape,
};
use timewalk::journey::{JourneyGraph, JourneyNode, NodeKind};

use crate::textures::TextureCache;

/// Node radius in world units.
pub const NODE_RADIUS: f32 = 120.0;

const EDGE_COLOR: Color32 = Color32::from_rgb(0, 255, 204);
const ROOT_FILL: Color32 = Color32::from_rgb(76, 29, 149);
const EVENT_FILL: Color32 = Color32::from_rgb(3, 105, 161);
const ROOT_RING: Color32 = Color32::from_rgb(167, 139, 250);
const EVENT_RING: Color32 = Color32::from_rgb(103, 232, 249);
const READY_RING: Color32 = Color32::from_rgb(74, 222, 128);
const GRID_COLOR: Color32 = Color32::from_gray(55);
const CAPTION_COLOR: Color32 = Color32::from_rgb(165, 243, 252);

#[derive(Clone, Debug, PartialEq)]
pub enum NodeIntent {
    UploadImage,
    PreviewImage(String),
    RequestGeneration(String),
    RequestExpansion(String),
    NodeMoved(String, (f32, f32)),
}

pub struct Camera {
    pub pan: Vec2,
    pub zoom: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Camera {
            pan: Vec2::ZERO,
            zoom: 0.55,
        }
    }
}

impl Camera {
    pub fn to_screen(&self, canvas: &Rect, world: (f32, f32)) -> Pos2 {
        canvas.center() + egui::vec2(world.0, world.1) * self.zoom + self.pan
    }

    pub fn to_world(&self, canvas: &Rect, screen: Pos2) -> (f32, f32) {
        let offset = (screen - canvas.center() - self.pan) / self.zoom;
        (offset.x, offset.y)
    }
}

pub fn show(
    ui: &mut egui::Ui,
    graph: &JourneyGraph,
    camera: &mut Camera,
    textures: &mut TextureCache,
) -> Vec<NodeIntent> {
    let canvas = ui.available_rect_before_wrap();
    let background = ui.allocate_rect(canvas, Sense::click_and_drag());

    if background.dragged() {
        camera.pan += background.drag_delta();
    }
    if background.hovered() {
        let scroll = ui.input(|i| i.smooth_scroll_delta.y);
        if scroll != 0.0 {
            camera.zoom = (camera.zoom * (scroll * 0.002).exp()).clamp(0.15, 2.5);
        }
        let pinch = ui.input(|i| i.zoom_delta());
        if pinch != 1.0 {
            camera.zoom = (camera.zoom * pinch).clamp(0.15, 2.5);
        }
    }

    let painter = ui.painter_at(canvas);
    paint_grid(&painter, &canvas);

    for edge in &graph.edges {
        let (Some(source), Some(target)) = (graph.node(&edge.source), graph.node(&edge.target))
        else {
            continue;
        };
        let from = camera.to_screen(&canvas, source.position);
        let to = camera.to_screen(&canvas, target.position);
        let stroke = Stroke::new((2.0 * camera.zoom).clamp(1.0, 3.0), EDGE_COLOR);
        painter.add(edge_shape(from, to, stroke));
    }

    let mut intents = Vec::new();
    for node in &graph.nodes {
        draw_node(ui, &painter, &canvas, camera, textures, node, &mut intents);
    }
    intents
}

fn paint_grid(painter: &egui::Painter, canvas: &Rect) {
    let spacing = 28.0;
    let mut y = canvas.top();
    while y < canvas.bottom() {
        let mut x = canvas.left();
        while x < canvas.right() {
            painter.circle_filled(Pos2::new(x, y), 1.0, GRID_COLOR);
            x += spacing;
        }
        y += spacing;
    }
}

fn edge_shape(from: Pos2, to: Pos2, stroke: Stroke) -> CubicBezierShape {
    let lift = ((to.y - from.y).abs() * 0.5).max(40.0);
    let control_a = Pos2::new(from.x, from.y + lift);
    let control_b = Pos2::new(to.x, to.y - lift);
    CubicBezierShape::from_points_stroke(
        [from, control_a, control_b, to],
        false,
        Color32::TRANSPARENT,
        stroke,
    )
}

fn draw_node(
    ui: &mut egui::Ui,
    painter: &egui::Painter,
    canvas: &Rect,
    camera: &Camera,
    textures: &mut TextureCache,
    node: &JourneyNode,
    intents: &mut Vec<NodeIntent>,
) {
    let center = camera.to_screen(canvas, node.position);
    let radius = NODE_RADIUS * camera.zoom;
    let rect = Rect::from_center_size(center, Vec2::splat(radius * 2.0));
    if !canvas.intersects(rect) {
        return;
    }

    let is_root = node.kind == NodeKind::Root;
    let fill = if is_root { ROOT_FILL } else { EVENT_FILL };
    let ring = if node.image.is_some() {
        READY_RING
    } else if is_root {
        ROOT_RING
    } else {
        EVENT_RING
    };

    let response = ui.interact(
        rect,
        egui::Id::new(("journey-node", &node.id)),
        Sense::click_and_drag(),
    );
    if response.dragged() {
        let delta = response.drag_delta() / camera.zoom;
        intents.push(NodeIntent::NodeMoved(
            node.id.clone(),
            (node.position.0 + delta.x, node.position.1 + delta.y),
        ));
    }

    painter.circle_filled(center, radius, fill);
    painter.circle_stroke(center, radius, Stroke::new(3.0 * camera.zoom.max(0.5), ring));

    match &node.image {
        Some(image) => {
            if let Some(texture) = textures.texture(ui.ctx(), &node.id, image) {
                let image_rect = rect.shrink(5.0 * camera.zoom.max(0.5));
                ui.put(
                    image_rect,
                    egui::Image::new(texture)
                        .rounding(image_rect.width() / 2.0)
                        .fit_to_exact_size(image_rect.size()),
                );
            }
            painter.text(
                Pos2::new(center.x, center.y + radius * 0.78),
                Align2::CENTER_CENTER,
                &node.title,
                FontId::proportional((13.0 * camera.zoom).max(9.0)),
                CAPTION_COLOR,
            );
            if response.clicked() {
                intents.push(NodeIntent::PreviewImage(image.clone()));
            }
            if !is_root && !node.busy {
                let button_rect = Rect::from_center_size(
                    Pos2::new(center.x, center.y + radius * 0.45),
                    egui::vec2(radius * 1.2, 24.0),
                );
                if ui
                    .put(button_rect, egui::Button::new("Explore Further"))
                    .clicked()
                {
                    intents.push(NodeIntent::RequestExpansion(node.id.clone()));
                }
            }
        }
        None => {
            let title_font = FontId::proportional((16.0 * camera.zoom).max(10.0));
            let status_font = FontId::proportional((11.5 * camera.zoom).max(8.0));
            let wrap = radius * 1.6;

            let title_galley =
                painter.layout(node.title.clone(), title_font, Color32::WHITE, wrap);
            let title_size = title_galley.size();
            let title_pos = Pos2::new(
                center.x - title_size.x / 2.0,
                center.y - radius * 0.5,
            );
            painter.galley(title_pos, title_galley, Color32::WHITE);

            if !node.status.is_empty() {
                let status_galley = painter.layout(
                    node.status.clone(),
                    status_font,
                    Color32::from_gray(220),
                    wrap,
                );
                let status_size = status_galley.size();
                let status_pos = Pos2::new(
                    center.x - status_size.x / 2.0,
                    title_pos.y + title_size.y + 6.0,
                );
                painter.galley(status_pos, status_galley, Color32::from_gray(220));
            }

            if !node.busy {
                let label = if is_root { "Upload Image" } else { "Enter Portal" };
                let button_rect = Rect::from_center_size(
                    Pos2::new(center.x, center.y + radius * 0.5),
                    egui::vec2(radius * 1.1, 26.0),
                );
                if ui.put(button_rect, egui::Button::new(label)).clicked() {
                    intents.push(if is_root {
                        NodeIntent::UploadImage
                    } else {
                        NodeIntent::RequestGeneration(node.id.clone())
                    });
                }
            }
        }
    }

    if node.busy {
        let spinner_rect = Rect::from_center_size(center, Vec2::splat(radius * 0.5));
        ui.put(spinner_rect, egui::Spinner::new().size(radius * 0.5));
    }
}
