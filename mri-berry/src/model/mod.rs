//! 分割网络.
//!
//! [`UNet`] 是网络本身, [`Segmenter`] 在其上做 arg-max 得到逐体素标签.
//! 推理服务只依赖 [`SegmentationModel`], 便于在测试中替换为桩实现.

mod checkpoint;
mod unet;

pub use checkpoint::{load_checkpoint, monai_key_remap, save_checkpoint, CheckpointFormat};
pub use unet::{ConvBlock, ResidualUnit, UNet, UNetConfig, UpBlock};

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use ndarray::{Array3, Array5};
use std::path::{Path, PathBuf};

/// CPU 后端.
pub type CpuBackend = burn::backend::NdArray<f32>;

/// 网络相关错误.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// 网络结构参数不合法.
    #[error("invalid network config: {0}")]
    Config(String),

    /// 权重文件无法读取或解析.
    #[error("failed to load checkpoint {}: {reason}", path.display())]
    Load {
        /// 文件路径.
        path: PathBuf,
        /// 原因.
        reason: String,
    },

    /// 权重与网络结构不符.
    #[error("checkpoint {} does not match the network: {detail}", path.display())]
    ShapeMismatch {
        /// 文件路径.
        path: PathBuf,
        /// 第一处差异.
        detail: String,
    },

    /// 权重文件无法写入.
    #[error("failed to save checkpoint {}: {reason}", path.display())]
    Save {
        /// 文件路径.
        path: PathBuf,
        /// 原因.
        reason: String,
    },

    /// 输入或输出张量形状不符合要求.
    #[error("unexpected tensor shape: {0}")]
    Shape(String),
}

/// 把预处理后的网络输入映射为逐体素标签.
pub trait SegmentationModel: Send {
    /// `batch` 形状为 `(1, 4, x, y, z)`, 返回 `(x, y, z)` 的标签, 取值为类别下标.
    fn predict(&self, batch: &Array5<f32>) -> Result<Array3<u8>, ModelError>;
}

/// 在 [`UNet`] 输出的类别轴上取 arg-max.
#[derive(Debug)]
pub struct Segmenter<B: Backend> {
    model: UNet<B>,
    in_channels: usize,
    out_channels: usize,
    device: B::Device,
}

impl<B: Backend> Segmenter<B> {
    /// 包装已经构建好的网络.
    pub fn new(model: UNet<B>, config: &UNetConfig, device: B::Device) -> Self {
        Self {
            model,
            in_channels: config.in_channels,
            out_channels: config.out_channels,
            device,
        }
    }

    /// 以默认结构读取权重文件.
    pub fn load(path: &Path, device: B::Device) -> Result<Self, ModelError> {
        Self::load_with(&UNetConfig::new(), path, device)
    }

    /// 以指定结构读取权重文件.
    pub fn load_with(config: &UNetConfig, path: &Path, device: B::Device) -> Result<Self, ModelError> {
        let model = load_checkpoint::<B>(config, path, &device)?;
        Ok(Self::new(model, config, device))
    }

    /// 内部网络.
    #[inline]
    pub fn network(&self) -> &UNet<B> {
        &self.model
    }
}

impl<B: Backend> SegmentationModel for Segmenter<B> {
    fn predict(&self, batch: &Array5<f32>) -> Result<Array3<u8>, ModelError> {
        let (b, c, x, y, z) = batch.dim();
        if b != 1 || c != self.in_channels {
            return Err(ModelError::Shape(format!(
                "expected input (1, {}, x, y, z), found {:?}",
                self.in_channels,
                batch.dim()
            )));
        }

        let data = TensorData::new(batch.iter().copied().collect::<Vec<f32>>(), [b, c, x, y, z]);
        let input = Tensor::<B, 5>::from_data(data, &self.device);
        let logits = self.model.forward(input);
        let dims = logits.dims();
        if dims != [1, self.out_channels, x, y, z] {
            return Err(ModelError::Shape(format!(
                "expected output [1, {}, {x}, {y}, {z}], found {dims:?}",
                self.out_channels
            )));
        }

        let labels = logits.argmax(1).into_data();
        let labels: Vec<u8> = labels.iter::<i64>().map(|v| v as u8).collect();
        Array3::from_shape_vec((x, y, z), labels).map_err(|e| ModelError::Shape(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> UNetConfig {
        UNetConfig::new()
            .with_channels(vec![2, 4, 8])
            .with_strides(vec![2, 2])
            .with_num_res_units(1)
    }

    #[test]
    fn test_segmenter_predict() {
        let device = Default::default();
        let config = tiny();
        let net = config.init::<CpuBackend>(&device).unwrap();
        let seg = Segmenter::new(net, &config, device);

        let batch = Array5::from_shape_fn((1, 4, 8, 8, 4), |(_, c, x, y, z)| {
            ((c + x + y + z) % 5) as f32 / 5.0
        });
        let mask = seg.predict(&batch).unwrap();
        assert_eq!(mask.dim(), (8, 8, 4));
        assert!(mask.iter().all(|&v| v < 4));
    }

    #[test]
    fn test_segmenter_rejects_bad_input() {
        let device = Default::default();
        let config = tiny();
        let net = config.init::<CpuBackend>(&device).unwrap();
        let seg = Segmenter::new(net, &config, device);
        let batch = Array5::<f32>::zeros((1, 3, 8, 8, 8));
        assert!(matches!(seg.predict(&batch), Err(ModelError::Shape(_))));
    }
}
