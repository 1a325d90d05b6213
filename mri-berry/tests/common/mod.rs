//! 集成测试共用的 nifti 样例生成.

#![allow(dead_code)]

use mri_berry::{Idx3d, MriScan, SegLabel};
use ndarray::Array3;
use nifti::NiftiHeader;
use std::path::{Path, PathBuf};

/// 开启日志. 多个测试重复调用时忽略错误.
pub fn init_logger() {
    let _ = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Debug)
        .init();
}

/// BraTS 风格的文件名: `{id}_{role}.nii.gz`.
pub fn file_of(dir: &Path, id: &str, role: &str) -> PathBuf {
    dir.join(format!("{id}_{role}.nii.gz"))
}

/// 一个中心为亮块、四周为 -1000 的扫描.
pub fn scan_data(shape: Idx3d, bright: f32) -> Array3<f32> {
    let (x, y, z) = shape;
    Array3::from_shape_fn(shape, |(i, j, k)| {
        let inside = (x / 4..x - x / 4).contains(&i)
            && (y / 4..y - y / 4).contains(&j)
            && (z / 4..z - z / 4).contains(&k);
        if inside {
            bright + (i + j + k) as f32
        } else {
            -1000.0
        }
    })
}

/// 标签: 中心附近依次放置 1, 2, `enhancing` 三类.
pub fn label_data(shape: Idx3d, enhancing: u8) -> Array3<u8> {
    let (x, _, _) = shape;
    Array3::from_shape_fn(shape, |(i, j, k)| {
        if j < 2 || k < 2 {
            return 0;
        }
        match i * 4 / x {
            0 => 0,
            1 => 1,
            2 => 2,
            _ => enhancing,
        }
    })
}

/// 在 `root/{id}` 下写出一位病人. `roles` 为要写出的模态后缀.
pub fn write_patient(root: &Path, id: &str, shape: Idx3d, roles: &[&str], label: Option<u8>) -> PathBuf {
    let dir = root.join(id);
    std::fs::create_dir_all(&dir).unwrap();
    let h = NiftiHeader::default();
    for (n, role) in roles.iter().enumerate() {
        let scan = MriScan::from_array(&h, scan_data(shape, 50.0 * n as f32));
        scan.save(file_of(&dir, id, role)).unwrap();
    }
    if let Some(enhancing) = label {
        let seg = SegLabel::from_array(&h, label_data(shape, enhancing));
        seg.save(file_of(&dir, id, "seg")).unwrap();
    }
    dir
}

/// 四个模态齐全的病人.
pub fn write_full_patient(root: &Path, id: &str, shape: Idx3d, label: Option<u8>) -> PathBuf {
    write_patient(root, id, shape, &["t1", "t1ce", "t2", "flair"], label)
}
