//! 交互式查看分割结果: 可旋转的三维场景, 以及过体中心的三个正交切面.
//!
//! 左键拖动旋转, 滚轮缩放. 左侧面板开关各层.

use clap::Parser;
use eframe::egui;
use mri_berry::visual::camera::{self, Camera};
use mri_berry::visual::{overlay_slice, Scene};
use mri_berry::{MriScan, NiftiHeaderAttr, Plane, SegLabel};
use std::path::PathBuf;

/// 每帧最多绘制的三角形数.
const TRIANGLE_BUDGET: usize = 200_000;

/// 前三层是肿瘤子区域, 默认显示; 其余为模态外壳, 默认隐藏.
const TUMOR_LAYERS: usize = 3;

#[derive(Parser)]
#[command(name = "view")]
#[command(about = "Interactive 3D view of a segmentation with orthogonal slices")]
struct Cli {
    /// Segmentation volume, e.g. current_predictions/seg.nii.gz
    seg: PathBuf,

    /// Patient folder with the four modalities
    patient: PathBuf,
}

fn plane_title(plane: Plane) -> &'static str {
    match plane {
        Plane::Axial => "Axial Slice",
        Plane::Sagittal => "Sagittal Slice",
        Plane::Coronal => "Coronal Slice",
    }
}

fn slice_images(scan: &MriScan, label: &SegLabel) -> anyhow::Result<Vec<(Plane, egui::ColorImage)>> {
    let mut ans = Vec::with_capacity(Plane::ALL.len());
    for plane in Plane::ALL {
        let n = scan.len_of(plane);
        if n == 0 {
            continue;
        }
        let img = overlay_slice(&scan.slice_at(plane, n / 2), &label.slice_at(plane, n / 2))?;
        let size = [img.width() as usize, img.height() as usize];
        ans.push((plane, egui::ColorImage::from_rgb(size, img.as_raw())));
    }
    Ok(ans)
}

struct Viewer {
    scene: Scene,
    visible: Vec<bool>,
    camera: Camera,
    overlay: String,
    slices: Vec<(Plane, egui::ColorImage)>,
    textures: Vec<(Plane, egui::TextureHandle)>,
}

impl Viewer {
    fn new(scene: Scene, slices: Vec<(Plane, egui::ColorImage)>) -> Self {
        let visible = (0..scene.layers.len()).map(|i| i < TUMOR_LAYERS).collect();
        let overlay = scene.statistics.overlay_text();
        Self {
            scene,
            visible,
            camera: Camera::default(),
            overlay,
            slices,
            textures: Vec::new(),
        }
    }

    fn layers_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Layers");
        ui.add_space(4.0);
        for (layer, shown) in self.scene.layers.iter().zip(self.visible.iter_mut()) {
            let [r, g, b] = layer.color;
            ui.horizontal(|ui| {
                ui.checkbox(shown, "");
                ui.colored_label(egui::Color32::from_rgb(r, g, b), "■");
                ui.label(format!("{} ({} triangles)", layer.name, layer.mesh.triangles()));
            });
        }
        ui.separator();
        ui.monospace(&self.overlay);
        ui.separator();
        if ui.button("Reset camera").clicked() {
            self.camera = Camera::default();
        }
    }

    fn slices_panel(&mut self, ui: &mut egui::Ui) {
        if self.textures.is_empty() {
            for (plane, img) in self.slices.drain(..) {
                let tex = ui
                    .ctx()
                    .load_texture(plane.to_string(), img, egui::TextureOptions::NEAREST);
                self.textures.push((plane, tex));
            }
        }
        let width = ui.available_width();
        egui::ScrollArea::vertical().show(ui, |ui| {
            for (plane, tex) in self.textures.iter() {
                ui.label(egui::RichText::new(plane_title(*plane)).color(egui::Color32::WHITE));
                let [w, h] = tex.size().map(|v| v as f32);
                let size = egui::vec2(width, width * h / w.max(1.0));
                ui.image(egui::load::SizedTexture::new(tex.id(), size));
                ui.add_space(6.0);
            }
        });
    }

    fn scene_view(&mut self, ui: &mut egui::Ui) {
        let (response, painter) = ui.allocate_painter(ui.available_size(), egui::Sense::drag());
        if response.dragged() {
            let d = response.drag_delta();
            self.camera.orbit(d.x, d.y);
        }
        if response.hovered() {
            let scroll = ui.input(|i| i.smooth_scroll_delta.y);
            if scroll != 0.0 {
                self.camera.zoom_by((scroll * 0.002).exp());
            }
        }

        let rect = response.rect;
        painter.rect_filled(rect, 0.0, egui::Color32::BLACK);

        let tris = camera::project(
            &self.scene,
            &self.visible,
            &self.camera,
            [rect.width(), rect.height()],
            TRIANGLE_BUDGET,
        );
        let mut mesh = egui::Mesh::default();
        for t in tris.iter() {
            let layer = &self.scene.layers[t.layer];
            let [r, g, b] = layer.color.map(|c| (c as f32 * t.shade) as u8);
            let color = egui::Color32::from_rgba_unmultiplied(r, g, b, (layer.opacity * 255.0) as u8);
            let base = mesh.vertices.len() as u32;
            for [x, y] in t.points {
                mesh.colored_vertex(rect.min + egui::vec2(x, y), color);
            }
            mesh.add_triangle(base, base + 1, base + 2);
        }
        painter.add(egui::Shape::mesh(mesh));

        painter.text(
            rect.left_top() + egui::vec2(10.0, 10.0),
            egui::Align2::LEFT_TOP,
            &self.overlay,
            egui::FontId::monospace(13.0),
            egui::Color32::WHITE,
        );
    }
}

impl eframe::App for Viewer {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::SidePanel::left("layers")
            .resizable(false)
            .show(ctx, |ui| self.layers_panel(ui));
        egui::SidePanel::right("slices")
            .default_width(300.0)
            .frame(egui::Frame::none().fill(egui::Color32::BLACK))
            .show(ctx, |ui| self.slices_panel(ui));
        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| self.scene_view(ui));
    }
}

fn main() -> anyhow::Result<()> {
    utils::init_logger()?;
    let cli = Cli::parse();

    let (volumes, label) = utils::open_segmented(&cli.patient, &cli.seg)?;
    let scene = Scene::build(&label, &volumes.scans)?;
    let slices = slice_images(&volumes.scans[0], &label)?;
    utils::sep();
    println!("Patient: {}", volumes.id);
    println!("Shape:   {:?}", label.shape());
    println!("Layers:  {}", scene.layers.len());
    utils::sep();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 900.0])
            .with_min_inner_size([800.0, 600.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Brain Tumor Segmentation",
        options,
        Box::new(|_cc| Ok(Box::new(Viewer::new(scene, slices)))),
    )
    .map_err(|e| anyhow::anyhow!("viewer failed: {e}"))
}
