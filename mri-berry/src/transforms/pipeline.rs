use super::intensity::{ensure_channel_first, scale_intensity_range, shift_intensity};
use super::spatial::{
    crop, flip, foreground_bbox, rand_crop_start, resize_area, resize_nearest, rot90,
    spatial_dim, spatial_pad, BoundingBox,
};
use crate::consts::ROI_SIZE;
use crate::dataset::loader::{volume_loader, PatientVolumes};
use crate::dataset::SplitPart;
use crate::{Idx3d, IntensityWindow, MriScan, NiftiHeaderAttr, VolumeError};
use ndarray::{s, Array3, Array4, Array5, ArrayView3, Axis};
use nifti::NiftiHeader;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};

/// 参考模态在预处理前后的几何信息, 用于把网络输出映射回原始网格.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Geometry {
    /// 原始空间形状.
    pub shape: Idx3d,

    /// 前景包围盒.
    pub bbox: BoundingBox,
}

impl Geometry {
    /// 把固定大小的预测掩膜还原到原始网格: 最近邻缩放回前景包围盒, 盒外为背景.
    pub fn restore(&self, mask: ArrayView3<u8>) -> Array3<u8> {
        let mut out = Array3::<u8>::zeros(self.shape);
        let [x0, y0, z0] = self.bbox.start;
        let [x1, y1, z1] = self.bbox.end;
        let inner = resize_nearest(mask, self.bbox.shape());
        out.slice_mut(s![x0..x1, y0..y1, z0..z1]).assign(&inner);
        out
    }
}

/// 推理预处理的结果.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// `(1, 4, x, y, z)` 网络输入, 强度位于 `[0, 1]`.
    pub batch: Array5<f32>,

    /// 参考 (第一个) 模态的几何信息.
    pub geometry: Geometry,

    /// 参考模态的 header, 保存结果时照搬其几何字段.
    pub reference: Box<NiftiHeader>,
}

/// 确定性的推理预处理:
/// 通道优先 -> 强度缩放 `[-200, 200] -> [0, 1]` -> 前景裁剪 -> 面积插值到固定大小.
///
/// 每个模态独立处理, 然后按模态顺序拼接并加上 batch 轴.
#[derive(Copy, Clone, Debug)]
pub struct InferencePipeline {
    window: IntensityWindow,
    spatial: [usize; 3],
}

impl Default for InferencePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl InferencePipeline {
    /// 输出空间大小为 128³.
    #[inline]
    pub fn new() -> Self {
        Self {
            window: IntensityWindow::brain(),
            spatial: ROI_SIZE,
        }
    }

    /// 修改输出空间大小.
    #[inline]
    pub fn with_spatial(mut self, spatial: [usize; 3]) -> Self {
        self.spatial = spatial;
        self
    }

    /// 输出空间大小.
    #[inline]
    pub fn spatial(&self) -> [usize; 3] {
        self.spatial
    }

    /// 预处理单个模态, 返回 `(1, x, y, z)` 数据和几何信息.
    pub fn preprocess(&self, scan: &MriScan) -> (Array4<f32>, Geometry) {
        let shape = scan.shape();
        let mut vol = ensure_channel_first(scan.data().to_owned());
        scale_intensity_range(&mut vol, &self.window);
        let bbox = foreground_bbox(vol.view()).unwrap_or_else(|| {
            log::warn!("Empty foreground, using the whole volume");
            BoundingBox::whole(shape)
        });
        let cropped = crop(vol.view(), &bbox);
        let out = resize_area(cropped.view(), self.spatial);
        (out, Geometry { shape, bbox })
    }

    fn load_one(&self, path: &Path) -> Result<(Array4<f32>, Geometry, Box<NiftiHeader>), VolumeError> {
        let scan = MriScan::open(path)?;
        let (vol, geometry) = self.preprocess(&scan);
        Ok((vol, geometry, Box::new(scan.header().clone())))
    }

    /// 预处理已经载入的四个模态.
    pub fn run_scans(&self, scans: &[MriScan; 4]) -> Preprocessed {
        let parts = scans.each_ref().map(|s| {
            let (v, g) = self.preprocess(s);
            (v, g, Box::new(s.header().clone()))
        });
        Self::assemble(parts.into())
    }

    /// 读取并预处理四个模态文件 (按模态顺序).
    pub fn run(&self, paths: &[PathBuf; 4]) -> Result<Preprocessed, VolumeError> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                use rayon::prelude::*;
                let parts = paths
                    .par_iter()
                    .map(|p| self.load_one(p))
                    .collect::<Result<Vec<_>, _>>()?;
            } else {
                let parts = paths
                    .iter()
                    .map(|p| self.load_one(p))
                    .collect::<Result<Vec<_>, _>>()?;
            }
        }
        Ok(Self::assemble(parts))
    }

    fn assemble(parts: Vec<(Array4<f32>, Geometry, Box<NiftiHeader>)>) -> Preprocessed {
        let views: Vec<_> = parts.iter().map(|(v, _, _)| v.view()).collect();
        // 四个模态的输出大小相同, 拼接不会失败.
        let image = ndarray::concatenate(Axis(0), &views)
            .unwrap_or_else(|_| unreachable!("modalities share the output size"));
        let batch = image.insert_axis(Axis(0));

        let (_, geometry, reference) = parts
            .into_iter()
            .next()
            .unwrap_or_else(|| unreachable!("four modalities"));
        Preprocessed {
            batch,
            geometry,
            reference,
        }
    }
}

/// 一个训练样本: 4 通道扫描与 1 通道标签, 空间形状相同.
#[derive(Debug, Clone)]
pub struct Sample {
    /// `(4, x, y, z)` 扫描.
    pub image: Array4<f32>,

    /// `(1, x, y, z)` 标签.
    pub label: Array4<u8>,
}

/// 随机的训练预处理与增强:
///
/// 强度缩放 (仅扫描) -> 前景裁剪 (包围盒取自扫描, 同时作用于标签)
/// -> 随机裁剪固定大小 (不足时先对称填充) -> 以 0.5 概率沿 x 轴翻转
/// -> 以 0.5 概率在 x-y 平面旋转 90/180/270 度 -> 以 0.5 概率整体平移强度 (仅扫描).
///
/// 同样的种子总是得到同样的样本序列.
#[derive(Clone, Debug)]
pub struct TrainingPipeline {
    window: IntensityWindow,
    roi: [usize; 3],
    prob: f64,
    max_k: usize,
    offset: f32,
    rng: StdRng,
}

impl TrainingPipeline {
    /// 以 `seed` 创建. 裁剪大小为 128³.
    pub fn new(seed: u64) -> Self {
        Self {
            window: IntensityWindow::brain(),
            roi: ROI_SIZE,
            prob: 0.5,
            max_k: 3,
            offset: 0.1,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// 修改裁剪大小.
    #[inline]
    pub fn with_roi(mut self, roi: [usize; 3]) -> Self {
        self.roi = roi;
        self
    }

    /// 对一对扫描与标签执行全部变换.
    pub fn apply(&mut self, image: Array4<f32>, label: Array4<u8>) -> Result<Sample, VolumeError> {
        let shape = spatial_dim(&image.view());
        let found = spatial_dim(&label.view());
        if shape != found {
            return Err(VolumeError::ShapeMismatch {
                expected: shape,
                found,
            });
        }

        let mut image = image;
        scale_intensity_range(&mut image, &self.window);

        let bbox = foreground_bbox(image.view()).unwrap_or(BoundingBox::whole(shape));
        let image = spatial_pad(crop(image.view(), &bbox).view(), self.roi);
        let label = spatial_pad(crop(label.view(), &bbox).view(), self.roi);

        let start = rand_crop_start(spatial_dim(&image.view()), self.roi, &mut self.rng);
        let window = BoundingBox::at(start, self.roi);
        let mut image = crop(image.view(), &window);
        let mut label = crop(label.view(), &window);

        if self.rng.gen_bool(self.prob) {
            image = flip(image, 0);
            label = flip(label, 0);
        }
        if self.rng.gen_bool(self.prob) {
            let k = self.rng.gen_range(1..=self.max_k);
            image = rot90(image, k, (0, 1));
            label = rot90(label, k, (0, 1));
        }
        if self.rng.gen_bool(self.prob) {
            let off = self.rng.gen_range(-self.offset..=self.offset);
            shift_intensity(&mut image, off);
        }
        Ok(Sample { image, label })
    }

    /// 把一位病人的体数据组装成样本并执行全部变换.
    pub fn load(&mut self, volumes: PatientVolumes) -> Result<Sample, VolumeError> {
        let PatientVolumes { id, scans, label } = volumes;
        let label = label.ok_or(VolumeError::MissingLabel(id))?;
        let views = scans.each_ref().map(|s| s.data());
        let image = ndarray::stack(Axis(0), &views).map_err(|_| VolumeError::ShapeMismatch {
            expected: scans[0].shape(),
            found: label.shape(),
        })?;
        let label = ensure_channel_first(label.into_data());
        self.apply(image, label)
    }

    /// 依次加载并变换划分中的每位病人. 扫描个数不为 4 的条目会被跳过.
    pub fn samples<'a>(
        &'a mut self,
        part: &SplitPart,
    ) -> impl Iterator<Item = (String, Result<Sample, VolumeError>)> + 'a {
        let items: Vec<_> = part
            .iter()
            .filter_map(|(x, y)| {
                let id = y
                    .parent()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                match <[PathBuf; 4]>::try_from(x.to_vec()) {
                    Ok(images) => Some((id, images, Some(y.to_owned()))),
                    Err(_) => {
                        log::warn!("Skipping {id}: expected 4 images, found {}", x.len());
                        None
                    }
                }
            })
            .collect();
        volume_loader(items).map(move |(id, v)| {
            let sample = v.and_then(|v| self.load(v));
            (id, sample)
        })
    }
}
