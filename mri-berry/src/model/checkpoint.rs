//! 权重文件的读写.
//!
//! 格式由扩展名决定: `.mpk` 为 burn 命名 MessagePack, `.pt`/`.pth` 为 PyTorch
//! `state_dict`, 参数名沿用 MONAI `UNet` 并在读取时改写为本网络的命名.
//! 只支持写出 `.mpk`.
//! 读取时会把每个参数的形状与按配置新建的网络逐一比较, 不一致即报错.

use super::unet::{UNet, UNetConfig};
use super::ModelError;
use burn::module::{Module, ModuleVisitor, ParamId};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use std::path::Path;

/// 按遍历顺序收集所有浮点参数的形状.
#[derive(Default)]
struct ShapeCollector {
    shapes: Vec<Vec<usize>>,
}

impl<B: Backend> ModuleVisitor<B> for ShapeCollector {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        self.shapes.push(tensor.dims().to_vec());
    }
}

fn param_shapes<B: Backend>(model: &UNet<B>) -> Vec<Vec<usize>> {
    let mut c = ShapeCollector::default();
    model.visit(&mut c);
    c.shapes
}

/// 比较两组参数形状, 返回第一处差异的描述.
fn first_difference(expected: &[Vec<usize>], found: &[Vec<usize>]) -> Option<String> {
    if expected.len() != found.len() {
        return Some(format!(
            "expected {} parameters, found {}",
            expected.len(),
            found.len()
        ));
    }
    expected
        .iter()
        .zip(found)
        .enumerate()
        .find(|(_, (e, f))| e != f)
        .map(|(i, (e, f))| format!("parameter #{i}: expected {e:?}, found {f:?}"))
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// 权重文件格式.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CheckpointFormat {
    /// burn 命名 MessagePack, 扩展名 `.mpk`.
    Mpk,

    /// PyTorch `state_dict`, 扩展名 `.pt` 或 `.pth`.
    PyTorch,
}

impl CheckpointFormat {
    /// 按扩展名 (不区分大小写) 判断格式. 其他扩展名返回 [`ModelError::Load`].
    pub fn of(path: &Path) -> Result<Self, ModelError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("mpk") => Ok(Self::Mpk),
            Some("pt") | Some("pth") => Ok(Self::PyTorch),
            _ => Err(ModelError::Load {
                path: path.to_owned(),
                reason: "unsupported checkpoint extension, expected .mpk, .pt or .pth".to_owned(),
            }),
        }
    }
}

/// MONAI `UNet` 参数名到本网络参数名的改写规则 `(正则, 替换)`, 按顺序应用.
///
/// MONAI 把每一层编码器、跳连子网络和解码器嵌套为 `model.1.submodule.…`,
/// 第 `d` 层的编码器位于 `0.`, 解码器位于 `2.`, 最内层是底部残差单元.
/// `levels` 为编码器层数, 即通道层数减一.
pub fn monai_key_remap(levels: usize) -> Vec<(String, String)> {
    let prefix = |d: usize| format!("^model\\.{}", "1\\.submodule\\.".repeat(d));
    let mut rules = vec![("^module\\.".to_owned(), String::new())];
    for d in 0..levels {
        rules.push((format!("{}0\\.(.+)$", prefix(d)), format!("down.{d}.$1")));
        rules.push((format!("{}2\\.(.+)$", prefix(d)), format!("up.{d}.$1")));
    }
    rules.push((format!("{}(.+)$", prefix(levels)), "bottom.$1".to_owned()));

    let body = [
        ("^up\\.(\\d+)\\.0\\.conv\\.", "up.$1.conv."),
        ("^up\\.(\\d+)\\.0\\.adn\\.A\\.weight$", "up.$1.act.alpha"),
        ("^up\\.(\\d+)\\.1\\.", "up.$1.unit."),
        ("\\.conv\\.unit(\\d+)\\.conv\\.", ".units.$1.conv."),
        ("\\.conv\\.unit(\\d+)\\.adn\\.A\\.weight$", ".units.$1.act.alpha"),
    ];
    rules.extend(body.iter().map(|(p, r)| ((*p).to_owned(), (*r).to_owned())));
    rules
}

fn read_weights<B: Backend>(
    model: UNet<B>,
    config: &UNetConfig,
    path: &Path,
    format: CheckpointFormat,
    device: &B::Device,
) -> Result<UNet<B>, ModelError> {
    let load_err = |e: burn::record::RecorderError| ModelError::Load {
        path: path.to_owned(),
        reason: e.to_string(),
    };
    match format {
        CheckpointFormat::Mpk => model
            .load_file(path.to_owned(), &recorder(), device)
            .map_err(load_err),
        CheckpointFormat::PyTorch => {
            let mut args = LoadArgs::new(path.to_owned());
            for (pattern, replacement) in monai_key_remap(config.channels.len() - 1) {
                args = args.with_key_remap(&pattern, &replacement);
            }
            let record: <UNet<B> as Module<B>>::Record = PyTorchFileRecorder::<FullPrecisionSettings>::default()
                .load(args, device)
                .map_err(load_err)?;
            Ok(model.load_record(record))
        }
    }
}

/// 按 `config` 构建网络并从 `path` 读取权重, 格式见 [`CheckpointFormat::of`].
///
/// 扩展名不受支持、文件不存在、无法解析或任一参数形状与 `config` 不符时返回错误,
/// 不会得到部分加载的网络.
pub fn load_checkpoint<B: Backend>(
    config: &UNetConfig,
    path: &Path,
    device: &B::Device,
) -> Result<UNet<B>, ModelError> {
    let format = CheckpointFormat::of(path)?;
    if !path.is_file() {
        return Err(ModelError::Load {
            path: path.to_owned(),
            reason: "file not found".to_owned(),
        });
    }

    let model = config.init::<B>(device)?;
    let expected = param_shapes(&model);
    let model = read_weights(model, config, path, format, device)?;

    if let Some(detail) = first_difference(&expected, &param_shapes(&model)) {
        return Err(ModelError::ShapeMismatch {
            path: path.to_owned(),
            detail,
        });
    }
    log::info!(
        "Loaded {} parameters from {} ({format:?})",
        model.num_params(),
        path.display()
    );
    Ok(model)
}

/// 把网络权重保存到 `path`. 只支持 `.mpk`.
pub fn save_checkpoint<B: Backend>(model: UNet<B>, path: &Path) -> Result<(), ModelError> {
    let save_err = |reason: String| ModelError::Save {
        path: path.to_owned(),
        reason,
    };
    match CheckpointFormat::of(path) {
        Ok(CheckpointFormat::Mpk) => {}
        _ => return Err(save_err("checkpoints can only be written as .mpk".to_owned())),
    }
    model
        .save_file(path.to_owned(), &recorder())
        .map_err(|e| save_err(e.to_string()))
}
