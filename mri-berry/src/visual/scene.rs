use super::mesh::{extract_mesh, Mesh};
use super::{tumor_masks, SegStatistics, VisualError, MODALITY_ISO, TUMOR_ISO};
use crate::dataset::Modality;
use crate::{MriScan, NiftiHeaderAttr, SegLabel};
use ndarray::ArrayView3;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

/// 场景清单文件名.
pub const MANIFEST_FILE_NAME: &str = "scene.json";

/// 统计信息文件名.
pub const STATISTICS_FILE_NAME: &str = "statistics.txt";

const TUMOR_PALETTE: [(&str, [u8; 3], f32); 3] = [
    ("Necrotic Tumor Core", [0xFF, 0x00, 0x00], 0.8),
    ("Peritumoral Edema", [0x00, 0xFF, 0x00], 0.8),
    ("Enhancing Tumor", [0x00, 0x00, 0xFF], 0.8),
];

const MODALITY_COLOR: [u8; 3] = [0x8B, 0x45, 0x13];
const MODALITY_OPACITY: f32 = 0.3;

fn modality_title(m: Modality) -> &'static str {
    match m {
        Modality::T1 => "T1",
        Modality::T1ce => "T1ce",
        Modality::T2 => "T2",
        Modality::Flair => "FLAIR",
    }
}

/// 场景中的一层: 一个网格及其外观.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneLayer {
    /// 图例名称.
    pub name: String,

    /// RGB 颜色.
    pub color: [u8; 3],

    /// 不透明度, 位于 `[0, 1]`.
    pub opacity: f32,

    /// 网格.
    pub mesh: Mesh,
}

impl SceneLayer {
    /// `#RRGGBB` 形式的颜色.
    pub fn hex_color(&self) -> String {
        let [r, g, b] = self.color;
        format!("#{r:02X}{g:02X}{b:02X}")
    }

    /// 导出时使用的 STL 文件名.
    pub fn file_name(&self) -> String {
        let stem: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        format!("{stem}.stl")
    }
}

/// 清单中的一层.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestLayer {
    /// 图例名称.
    pub name: String,
    /// `#RRGGBB` 颜色.
    pub color: String,
    /// 不透明度.
    pub opacity: f32,
    /// STL 文件名, 相对于场景目录.
    pub file: String,
    /// 三角形个数.
    pub triangles: usize,
}

/// `scene.json` 的内容.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneManifest {
    /// 所有层, 按绘制顺序排列.
    pub layers: Vec<ManifestLayer>,

    /// 分割统计.
    pub statistics: SegStatistics,
}

/// 由分割结果和四个模态组成的三维场景.
#[derive(Clone, Debug)]
pub struct Scene {
    /// 先是三个肿瘤子区域, 然后是四个模态.
    pub layers: Vec<SceneLayer>,

    /// 分割统计.
    pub statistics: SegStatistics,
}

fn spacing_of(label: &SegLabel) -> [f32; 3] {
    label
        .pix_dim()
        .map(|d| if d.is_finite() && d > 0.0 { d as f32 } else { 1.0 })
}

impl Scene {
    /// 构建场景. 肿瘤子区域在掩膜 0.5 处取等值面, 模态在强度 0.2 处取等值面.
    pub fn build(label: &SegLabel, scans: &[MriScan; 4]) -> Result<Self, VisualError> {
        let expected = label.shape();
        if let Some(s) = scans.iter().find(|s| s.shape() != expected) {
            return Err(VisualError::ShapeMismatch {
                expected,
                found: s.shape(),
            });
        }
        let spacing = spacing_of(label);

        let masks = tumor_masks(label);
        let mut jobs: Vec<(&str, [u8; 3], f32, ArrayView3<f32>, f32)> = TUMOR_PALETTE
            .iter()
            .zip(masks.iter())
            .map(|(&(name, color, opacity), m)| (name, color, opacity, m.view(), TUMOR_ISO))
            .collect();
        for (m, s) in Modality::ALL.into_iter().zip(scans.iter()) {
            jobs.push((modality_title(m), MODALITY_COLOR, MODALITY_OPACITY, s.data(), MODALITY_ISO));
        }

        let extract = |(name, color, opacity, values, iso): &(&str, [u8; 3], f32, ArrayView3<f32>, f32)| {
            let mesh = extract_mesh(values.view(), *iso, spacing)?;
            log::debug!("Layer `{name}`: {} triangles", mesh.triangles());
            Ok::<_, VisualError>(SceneLayer {
                name: (*name).to_owned(),
                color: *color,
                opacity: *opacity,
                mesh,
            })
        };
        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                use rayon::prelude::*;
                let layers = jobs.par_iter().map(extract).collect::<Result<Vec<_>, _>>()?;
            } else {
                let layers = jobs.iter().map(extract).collect::<Result<Vec<_>, _>>()?;
            }
        }

        Ok(Self {
            layers,
            statistics: SegStatistics::from_label(label),
        })
    }

    /// 清单内容.
    pub fn manifest(&self) -> SceneManifest {
        SceneManifest {
            layers: self
                .layers
                .iter()
                .map(|l| ManifestLayer {
                    name: l.name.clone(),
                    color: l.hex_color(),
                    opacity: l.opacity,
                    file: l.file_name(),
                    triangles: l.mesh.triangles(),
                })
                .collect(),
            statistics: self.statistics,
        }
    }

    /// 导出到 `dir`: 每层一个二进制 STL, 外加 `scene.json` 与 `statistics.txt`.
    ///
    /// 没有三角形的层同样会写出 (空的) STL 文件, 保证清单中的文件都存在.
    pub fn export<P: AsRef<Path>>(&self, dir: P) -> Result<SceneManifest, VisualError> {
        let dir = dir.as_ref();
        let io_err = |path: PathBuf| move |source: std::io::Error| VisualError::Io { path, source };
        std::fs::create_dir_all(dir).map_err(io_err(dir.to_owned()))?;

        for layer in self.layers.iter() {
            let path = dir.join(layer.file_name());
            let mut f = File::create(&path).map_err(io_err(path.clone()))?;
            layer.mesh.write_stl(&mut f).map_err(io_err(path))?;
        }

        let manifest = self.manifest();
        let path = dir.join(MANIFEST_FILE_NAME);
        std::fs::write(&path, serde_json::to_string_pretty(&manifest)?).map_err(io_err(path))?;

        let path = dir.join(STATISTICS_FILE_NAME);
        std::fs::write(&path, self.statistics.overlay_text()).map_err(io_err(path))?;

        log::info!("Scene with {} layers exported to {}", self.layers.len(), dir.display());
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array3};
    use nifti::NiftiHeader;

    fn case() -> (SegLabel, [MriScan; 4]) {
        let h = NiftiHeader::default();
        let mut seg = Array3::<u8>::zeros((8, 8, 8));
        seg.slice_mut(s![2..4, 2..4, 2..4]).fill(1);
        seg.slice_mut(s![4..6, 2..4, 2..4]).fill(2);
        let scan = Array3::from_shape_fn((8, 8, 8), |(x, y, z)| {
            if (1..7).contains(&x) && (1..7).contains(&y) && (1..7).contains(&z) {
                0.8
            } else {
                0.0
            }
        });
        let scans = [(); 4].map(|_| MriScan::from_array(&h, scan.clone()));
        (SegLabel::from_array(&h, seg), scans)
    }

    #[test]
    fn test_layer_names() {
        let l = SceneLayer {
            name: "Necrotic Tumor Core".to_owned(),
            color: [0x8B, 0x45, 0x13],
            opacity: 0.3,
            mesh: Mesh::default(),
        };
        assert_eq!(l.hex_color(), "#8B4513");
        assert_eq!(l.file_name(), "necrotic_tumor_core.stl");
    }

    #[test]
    fn test_build_scene() {
        let (label, scans) = case();
        let scene = Scene::build(&label, &scans).unwrap();
        let names: Vec<_> = scene.layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "Necrotic Tumor Core",
                "Peritumoral Edema",
                "Enhancing Tumor",
                "T1",
                "T1ce",
                "T2",
                "FLAIR"
            ]
        );
        assert!(scene.layers[0].mesh.triangles() > 0);
        assert!(scene.layers[1].mesh.triangles() > 0);
        assert!(scene.layers[2].mesh.is_empty());
        assert!(scene.layers[3..].iter().all(|l| !l.mesh.is_empty() && l.opacity == 0.3));
        assert_eq!(scene.layers[0].hex_color(), "#FF0000");
        assert_eq!(scene.layers[1].hex_color(), "#00FF00");
        assert_eq!(scene.layers[2].hex_color(), "#0000FF");
    }

    #[test]
    fn test_shape_mismatch() {
        let (label, mut scans) = case();
        scans[3] = MriScan::from_array(&NiftiHeader::default(), Array3::zeros((8, 8, 7)));
        assert!(matches!(
            Scene::build(&label, &scans),
            Err(VisualError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_export() {
        let (label, scans) = case();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("scene");
        let scene = Scene::build(&label, &scans).unwrap();
        let manifest = scene.export(&out).unwrap();

        assert_eq!(manifest.layers.len(), 7);
        for l in manifest.layers.iter() {
            assert!(out.join(&l.file).is_file());
        }
        let text = std::fs::read_to_string(out.join(MANIFEST_FILE_NAME)).unwrap();
        let back: SceneManifest = serde_json::from_str(&text).unwrap();
        assert_eq!(back, manifest);
        assert_eq!(back.statistics.necrotic, 8);
        let stats = std::fs::read_to_string(out.join(STATISTICS_FILE_NAME)).unwrap();
        assert!(stats.starts_with("Segmentation Statistics:"));
    }
}
