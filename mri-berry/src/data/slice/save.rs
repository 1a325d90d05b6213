//! 图像的持久化存储.

use crate::{LabelSlice, ScanSlice};
use image::ImageResult;
use std::path::Path;

/// 表明一个可以通过 **可视化友好** 模式持久化存储的图像对象.
///
/// `ImgWriteVis` trait 的意图是, 图像将以 "可视化友好"
/// 的方式保存, 而不是 "as is" 的方式. 这意味着, 对于 `LabelSlice`
/// 这类仅存在 0, 1, 2, 3 像素值的图像, 在保存时会映射到肉眼较易能区分的灰度;
/// 对于 `ScanSlice` 这类强度范围因扫描仪而异的扫描,
/// 在保存时会按切片自身的最小/最大值规范化.
pub trait ImgWriteVis {
    /// 按照一定的可视化规则将图片保存到 `path` 路径.
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 表明一个可以通过 **按原样** 模式持久化存储的图像对象.
///
/// 对于 `LabelSlice` 可以直接存储为灰度图像. `ScanSlice` 的强度会被截断到 `[0, 255]`.
pub trait ImgWriteRaw {
    /// 按原样将图片保存到 `path` 路径.
    fn save_raw<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 使像素更有利于单通道可视化.
#[inline]
pub(crate) fn pretty(label: u8) -> u8 {
    use crate::consts::gray::*;
    match label {
        // 背景为黑色
        BRATS_BACKGROUND => BLACK,

        // 水肿范围最大, 用暗灰色
        BRATS_EDEMA => DARK_GRAY,

        // 坏死核心
        BRATS_NECROTIC => GRAY,

        // 增强肿瘤
        BRATS_ENHANCING | BRATS_LEGACY_ENHANCING => LIGHT_GRAY,

        _ => WHITE,
    }
}

/// 将 `v` 在 `[lo, hi]` 中线性映射到 `[0, 255]`.
#[inline]
pub(crate) fn normalize_gray(v: f32, lo: f32, hi: f32) -> u8 {
    if !v.is_finite() || hi <= lo {
        return 0;
    }
    (((v - lo) / (hi - lo)).clamp(0.0, 1.0) * 255.0) as u8
}

macro_rules! gray_image {
    ($slice: expr, $map: expr) => {{
        let (rows, cols) = $slice.shape();
        let mut buf = image::GrayImage::new(cols as u32, rows as u32);
        for ((r, c), &pix) in $slice.indexed_iter() {
            buf.put_pixel(c as u32, r as u32, image::Luma([$map(pix)]));
        }
        buf
    }};
}

/// 背景/水肿/坏死/增强分别映射为黑色/暗灰色/灰色/亮灰色, 其他值为白色.
impl ImgWriteVis for LabelSlice<'_> {
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        gray_image!(self, pretty).save(path)
    }
}

/// 按原样存储.
impl ImgWriteRaw for LabelSlice<'_> {
    fn save_raw<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        gray_image!(self, |p: u8| p).save(path)
    }
}

/// 按切片最小/最大值规范化.
impl ImgWriteVis for ScanSlice<'_> {
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let (lo, hi) = self.min_max().unwrap_or((0.0, 0.0));
        gray_image!(self, |v: f32| normalize_gray(v, lo, hi)).save(path)
    }
}

/// 强度截断到 `[0, 255]`.
impl ImgWriteRaw for ScanSlice<'_> {
    fn save_raw<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        gray_image!(self, |v: f32| if v.is_finite() {
            v.clamp(0.0, 255.0) as u8
        } else {
            0
        })
        .save(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_normalize_gray() {
        assert_eq!(normalize_gray(0.0, 0.0, 10.0), 0);
        assert_eq!(normalize_gray(10.0, 0.0, 10.0), 255);
        assert_eq!(normalize_gray(5.0, 0.0, 10.0), 127);
        assert_eq!(normalize_gray(3.0, 3.0, 3.0), 0);
        assert_eq!(normalize_gray(f32::NAN, 0.0, 1.0), 0);
    }

    #[test]
    fn test_save_slices() {
        let dir = tempfile::tempdir().unwrap();
        let a = array![[0u8, 1], [2, 3], [4, 0]];
        let s = LabelSlice::new(a.view());
        let p = dir.path().join("label.png");
        s.save(&p).unwrap();
        let img = image::open(&p).unwrap().to_luma8();
        assert_eq!(img.dimensions(), (2, 3));
        assert_eq!(img.get_pixel(1, 0).0, [pretty(1)]);

        s.save_raw(dir.path().join("raw.png")).unwrap();

        let b = array![[0.0f32, 50.0], [100.0, 25.0]];
        let p = dir.path().join("scan.png");
        ScanSlice::new(b.view()).save(&p).unwrap();
        let img = image::open(&p).unwrap().to_luma8();
        assert_eq!(img.get_pixel(0, 1).0, [255]);
        assert_eq!(img.get_pixel(0, 0).0, [0]);
    }
}
