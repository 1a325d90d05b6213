//! 分割结果的三维可视化导出.
//!
//! 每个肿瘤子区域以及每个模态各生成一个等值面网格, 连同颜色与透明度
//! 一起导出为场景目录 (二进制 STL + `scene.json`), 附带统计信息文本,
//! 以及过体中心的三个正交切面叠加图. [`camera`] 为交互查看器提供软件投影.

pub mod camera;
mod mesh;
mod scene;
mod views;

pub use mesh::{extract_mesh, Mesh};
pub use scene::{ManifestLayer, Scene, SceneLayer, SceneManifest, MANIFEST_FILE_NAME, STATISTICS_FILE_NAME};
pub use views::{overlay_slice, save_orthogonal_views};

use crate::consts::gray::{BRATS_EDEMA, BRATS_ENHANCING, BRATS_NECROTIC};
use crate::SegLabel;
use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 肿瘤子区域掩膜的等值面阈值.
pub const TUMOR_ISO: f32 = 0.5;

/// 模态强度的等值面阈值.
pub const MODALITY_ISO: f32 = 0.2;

/// 可视化失败.
#[derive(Debug, thiserror::Error)]
pub enum VisualError {
    /// 读写失败.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        /// 出错的路径.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: std::io::Error,
    },

    /// 体数据读取失败.
    #[error(transparent)]
    Volume(#[from] crate::VolumeError),

    /// 图片保存失败.
    #[error("failed to save image: {0}")]
    Image(#[from] image::ImageError),

    /// 场景清单序列化失败.
    #[error("failed to write scene manifest: {0}")]
    Json(#[from] serde_json::Error),

    /// 等值面提取失败.
    #[error("marching cubes failed: {0}")]
    Mesh(String),

    /// 分割与模态的空间形状不一致.
    #[error("shape mismatch: segmentation {expected:?}, modality {found:?}")]
    ShapeMismatch {
        /// 分割形状.
        expected: crate::Idx3d,
        /// 模态形状.
        found: crate::Idx3d,
    },

    /// 切片与标签切片的形状不一致.
    #[error("slice shape mismatch: scan {scan:?}, label {label:?}")]
    SliceMismatch {
        /// 扫描切片形状.
        scan: crate::Idx2d,
        /// 标签切片形状.
        label: crate::Idx2d,
    },
}

/// 分割结果中各类肿瘤体素的统计.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegStatistics {
    /// 体素总数.
    pub total: usize,
    /// 坏死核心体素数.
    pub necrotic: usize,
    /// 水肿体素数.
    pub edema: usize,
    /// 增强肿瘤体素数.
    pub enhancing: usize,
}

impl SegStatistics {
    /// 统计 `label` 中的各类体素.
    pub fn from_label(label: &SegLabel) -> Self {
        let [_, necrotic, edema, enhancing] = label.statistics();
        Self {
            total: label.data().len(),
            necrotic,
            edema,
            enhancing,
        }
    }

    /// `count` 占体素总数的百分比. 体素总数为 0 时为 0.
    #[inline]
    pub fn percent(&self, count: usize) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 / self.total as f64 * 100.0
        }
    }

    /// 场景中的统计文字.
    pub fn overlay_text(&self) -> String {
        format!(
            "Segmentation Statistics:\n\
             Total volume: {} voxels\n\
             Necrotic core: {} voxels ({:.2}%)\n\
             Peritumoral edema: {} voxels ({:.2}%)\n\
             Enhancing tumor: {} voxels ({:.2}%)",
            self.total,
            self.necrotic,
            self.percent(self.necrotic),
            self.edema,
            self.percent(self.edema),
            self.enhancing,
            self.percent(self.enhancing),
        )
    }
}

/// 三个肿瘤子区域的二值掩膜, 依次为坏死核心、水肿、增强肿瘤.
pub fn tumor_masks(label: &SegLabel) -> [Array3<f32>; 3] {
    [BRATS_NECROTIC, BRATS_EDEMA, BRATS_ENHANCING].map(|c| label.binary_mask(c))
}

/// 模态强度在阈值 `iso` 处的二值掩膜.
pub fn modality_mask(values: ArrayView3<f32>, iso: f32) -> Array3<f32> {
    values.mapv(|v| if v >= iso { 1.0 } else { 0.0 })
}
