//! 3D 残差 U-Net.
//!
//! 编码器每层是一个步长为 2 的残差单元, 最底层是步长为 1 的残差单元.
//! 解码器每层先做步长为 2 的转置卷积, 再接一个残差子单元;
//! 解码器输入是 `[跳跃连接, 下一层输出]` 在通道轴上的拼接.
//! 卷积核均为 3, 归一化为无仿射参数的实例归一化, 激活为 PReLU.

use super::ModelError;
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv3d, Conv3dConfig, ConvTranspose3d, ConvTranspose3dConfig};
use burn::nn::{InstanceNorm, InstanceNormConfig, PRelu, PReluConfig, PaddingConfig3d};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// 网络结构参数.
#[derive(Config, Debug)]
pub struct UNetConfig {
    /// 输入通道数, 即模态个数.
    #[config(default = "crate::consts::NUM_MODALITIES")]
    pub in_channels: usize,

    /// 输出通道数, 即类别个数.
    #[config(default = "crate::consts::NUM_CLASSES")]
    pub out_channels: usize,

    /// 各层通道数, 最后一个是最底层.
    #[config(default = "vec![32, 64, 128, 256, 512]")]
    pub channels: Vec<usize>,

    /// 编码器各层步长. 长度比 `channels` 少 1.
    #[config(default = "vec![2, 2, 2, 2]")]
    pub strides: Vec<usize>,

    /// 编码器每层残差单元中的子单元个数.
    #[config(default = 2)]
    pub num_res_units: usize,
}

/// 卷积 -> 实例归一化 -> PReLU. `conv_only` 时只有卷积.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv3d<B>,
    norm: Option<InstanceNorm<B>>,
    act: Option<PRelu<B>>,
}

impl<B: Backend> ConvBlock<B> {
    fn new(channels: [usize; 2], stride: usize, conv_only: bool, device: &B::Device) -> Self {
        let conv = Conv3dConfig::new(channels, [3, 3, 3])
            .with_stride([stride; 3])
            .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
            .init(device);
        let (norm, act) = if conv_only {
            (None, None)
        } else {
            (
                Some(norm_layer(channels[1], device)),
                Some(PReluConfig::new().init(device)),
            )
        };
        Self { conv, norm, act }
    }

    fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let mut x = self.conv.forward(x);
        if let Some(norm) = &self.norm {
            x = norm.forward(x);
        }
        if let Some(act) = &self.act {
            x = act.forward(x);
        }
        x
    }
}

fn norm_layer<B: Backend>(channels: usize, device: &B::Device) -> InstanceNorm<B> {
    InstanceNormConfig::new(channels)
        .with_affine(false)
        .init(device)
}

/// 残差单元: 若干卷积子单元, 加上恒等或卷积投影的残差支路.
///
/// 步长不为 1 时投影为 3 核卷积; 只有通道数变化时投影为 1 核卷积.
#[derive(Module, Debug)]
pub struct ResidualUnit<B: Backend> {
    units: Vec<ConvBlock<B>>,
    residual: Option<Conv3d<B>>,
}

impl<B: Backend> ResidualUnit<B> {
    fn new(
        channels: [usize; 2],
        stride: usize,
        subunits: usize,
        last_conv_only: bool,
        device: &B::Device,
    ) -> Self {
        let [c_in, c_out] = channels;
        let subunits = subunits.max(1);
        let units = (0..subunits)
            .map(|su| {
                let (c, s) = if su == 0 { (c_in, stride) } else { (c_out, 1) };
                let conv_only = last_conv_only && su + 1 == subunits;
                ConvBlock::new([c, c_out], s, conv_only, device)
            })
            .collect();

        let residual = if stride != 1 {
            Some(
                Conv3dConfig::new(channels, [3, 3, 3])
                    .with_stride([stride; 3])
                    .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
                    .init(device),
            )
        } else if c_in != c_out {
            Some(Conv3dConfig::new(channels, [1, 1, 1]).init(device))
        } else {
            None
        };
        Self { units, residual }
    }

    fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let res = match &self.residual {
            Some(conv) => conv.forward(x.clone()),
            None => x.clone(),
        };
        let cx = self.units.iter().fold(x, |x, u| u.forward(x));
        cx + res
    }
}

/// 解码器一层: 转置卷积 -> 实例归一化 -> PReLU -> 残差子单元.
#[derive(Module, Debug)]
pub struct UpBlock<B: Backend> {
    conv: ConvTranspose3d<B>,
    norm: InstanceNorm<B>,
    act: PRelu<B>,
    unit: ResidualUnit<B>,
}

impl<B: Backend> UpBlock<B> {
    fn new(channels: [usize; 2], stride: usize, is_top: bool, device: &B::Device) -> Self {
        let conv = ConvTranspose3dConfig::new(channels, [3, 3, 3])
            .with_stride([stride; 3])
            .with_padding([1; 3])
            .with_padding_out([stride - 1; 3])
            .init(device);
        Self {
            conv,
            norm: norm_layer(channels[1], device),
            act: PReluConfig::new().init(device),
            unit: ResidualUnit::new([channels[1]; 2], 1, 1, is_top, device),
        }
    }

    fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let x = self.conv.forward(x);
        let x = self.act.forward(self.norm.forward(x));
        self.unit.forward(x)
    }
}

/// 3D 残差 U-Net.
#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    down: Vec<ResidualUnit<B>>,
    bottom: ResidualUnit<B>,
    up: Vec<UpBlock<B>>,
}

impl UNetConfig {
    /// 检查参数一致性.
    pub fn validate(&self) -> Result<(), ModelError> {
        let n = self.channels.len();
        if n < 2 {
            return Err(ModelError::Config(format!(
                "need at least 2 channel levels, found {n}"
            )));
        }
        if self.strides.len() + 1 != n {
            return Err(ModelError::Config(format!(
                "{} strides do not match {n} channel levels",
                self.strides.len()
            )));
        }
        if self.strides.contains(&0) || self.channels.contains(&0) {
            return Err(ModelError::Config("zero stride or channel".to_owned()));
        }
        if self.num_res_units == 0 {
            return Err(ModelError::Config(
                "at least one residual unit per level is required".to_owned(),
            ));
        }
        Ok(())
    }

    /// 构建随机初始化的网络.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<UNet<B>, ModelError> {
        self.validate()?;
        let ch = &self.channels;
        let n = ch.len();

        let down = (0..n - 1)
            .map(|i| {
                let c_in = if i == 0 { self.in_channels } else { ch[i - 1] };
                ResidualUnit::new([c_in, ch[i]], self.strides[i], self.num_res_units, false, device)
            })
            .collect();
        let bottom = ResidualUnit::new([ch[n - 2], ch[n - 1]], 1, self.num_res_units, false, device);
        let up = (0..n - 1)
            .map(|i| {
                let c_in = if i + 2 < n { 2 * ch[i] } else { ch[i] + ch[i + 1] };
                let c_out = if i == 0 { self.out_channels } else { ch[i - 1] };
                UpBlock::new([c_in, c_out], self.strides[i], i == 0, device)
            })
            .collect();

        Ok(UNet { down, bottom, up })
    }
}

impl<B: Backend> UNet<B> {
    /// 前向传播.
    ///
    /// # Shapes
    ///
    /// - input: `[batch, in_channels, x, y, z]`, 每个空间轴需能被步长之积整除.
    /// - output: `[batch, out_channels, x, y, z]`, 未归一化的 logits.
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let mut skips = Vec::with_capacity(self.down.len());
        let mut x = x;
        for d in self.down.iter() {
            x = d.forward(x);
            skips.push(x.clone());
        }

        let mut y = self.bottom.forward(x);
        for (up, skip) in self.up.iter().zip(skips).rev() {
            y = up.forward(Tensor::cat(vec![skip, y], 1));
        }
        y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CpuBackend;

    #[test]
    fn test_default_config() {
        let c = UNetConfig::new();
        assert_eq!(c.in_channels, crate::consts::NUM_MODALITIES);
        assert_eq!(c.out_channels, crate::consts::NUM_CLASSES);
        assert_eq!(c.channels, vec![32, 64, 128, 256, 512]);
        assert_eq!(c.strides, vec![2, 2, 2, 2]);
        assert_eq!(c.num_res_units, 2);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let c = UNetConfig::new().with_strides(vec![2, 2]);
        assert!(matches!(c.validate(), Err(ModelError::Config(_))));
        let c = UNetConfig::new().with_num_res_units(0);
        assert!(matches!(c.validate(), Err(ModelError::Config(_))));
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let net = UNetConfig::new()
            .with_channels(vec![2, 4, 8])
            .with_strides(vec![2, 2])
            .init::<CpuBackend>(&device)
            .unwrap();
        let x = Tensor::<CpuBackend, 5>::ones([1, 4, 8, 8, 8], &device);
        assert_eq!(net.forward(x).dims(), [1, 4, 8, 8, 8]);
    }
}
