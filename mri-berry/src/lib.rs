#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 提供 BraTS 格式脑肿瘤 MRI 数据集的结构化信息、数据清洗、
//! 预处理/增强流水线、3D U-Net 分割推理与三维可视化导出.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 该 crate 按照 BraTS 2021 的目录组织处理数据: 每个病人一个目录,
//!   目录下有四个模态文件 (T1, T1ce, T2, FLAIR) 和一个可选的 `seg` 标签文件.
//! 2. 库代码不会因为输入数据异常而 panic, 所有可预期的失败都以 `Result` 返回.
//!
//! # 开发计划
//!
//! ### 病人目录发现与模态定位 ✅
//!
//! 以固定的枚举角色 (而不是动态字典) 映射模态文件; 缺失模态时报告确切的缺失角色.
//!
//! 实现位于 `mri-berry/src/dataset/patient.rs`.
//!
//! ### 数据集清洗 ✅
//!
//! 1. 文件名编号一致性检查. ✅
//! 2. 删除标签类别数不为 4 的病人目录 (不可逆). ✅
//! 3. 将历史编码 4 重映射为 3, 并保留原 header 重新保存. ✅
//!
//! 实现位于 `mri-berry/src/dataset/prepare.rs`.
//!
//! ### 训练/测试集划分 ✅
//!
//! 固定种子 (42), 80/20 划分, 以 JSON 持久化.
//!
//! 实现位于 `mri-berry/src/dataset/split.rs`.
//!
//! ### 预处理与增强流水线 ✅
//!
//! 推理流水线是确定性的; 训练流水线以给定种子随机.
//!
//! 实现位于 `mri-berry/src/transforms`.
//!
//! ### 3D U-Net 分割 ✅
//!
//! 5 个分辨率层级 (32/64/128/256/512), 每层 2 个残差单元.
//! 权重从 `burn` 的命名 MessagePack 记录加载, 结构不匹配时拒绝加载.
//!
//! 实现位于 `mri-berry/src/model`.
//!
//! ### 推理服务核心 ✅
//!
//! 发现 -> 预处理 -> 推理 -> argmax -> 映射回原始网格 -> 保存.
//!
//! 实现位于 `mri-berry/src/infer.rs`.
//!
//! ### 三维可视化导出 ✅
//!
//! 每个肿瘤子区域与每个模态一个等值面网格, 附带统计信息和三个正交切面视图.
//!
//! 实现位于 `mri-berry/src/visual`.

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 二维索引.
pub type Idx2d = (usize, usize);

/// 3D MRI nii 文件基础数据结构.
mod data;

pub use data::{
    ImgWriteRaw, ImgWriteVis, IntensityWindow, LabelSlice, MriScan, NiftiHeaderAttr, Plane,
    ScanSlice, SegLabel, VolumeError,
};

pub mod config;
pub mod consts;
pub mod dataset;
pub mod infer;
pub mod model;
pub mod prelude;
pub mod transforms;
pub mod visual;
