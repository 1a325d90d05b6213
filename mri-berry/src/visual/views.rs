use super::VisualError;
use crate::data::slice::normalize_gray;
use crate::{LabelSlice, MriScan, NiftiHeaderAttr, Plane, ScanSlice, SegLabel};
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};

const OVERLAY_OPACITY: f32 = 0.8;

fn class_color(label: u8) -> Option<[u8; 3]> {
    match label {
        1 => Some([0xFF, 0x00, 0x00]),
        2 => Some([0x00, 0xFF, 0x00]),
        3 => Some([0x00, 0x00, 0xFF]),
        _ => None,
    }
}

fn blend(gray: u8, color: [u8; 3]) -> [u8; 3] {
    color.map(|c| (c as f32 * OVERLAY_OPACITY + gray as f32 * (1.0 - OVERLAY_OPACITY)).round() as u8)
}

/// 在灰度切片上叠加分割标签. 灰度按切片自身最小/最大值规范化.
///
/// 两个切片形状不同时返回 [`VisualError::SliceMismatch`].
pub fn overlay_slice(scan: &ScanSlice, label: &LabelSlice) -> Result<RgbImage, VisualError> {
    if scan.shape() != label.shape() {
        return Err(VisualError::SliceMismatch {
            scan: scan.shape(),
            label: label.shape(),
        });
    }
    let (rows, cols) = scan.shape();
    let (lo, hi) = scan.min_max().unwrap_or((0.0, 0.0));
    let mut buf = RgbImage::new(cols as u32, rows as u32);
    for ((r, c), &v) in scan.indexed_iter() {
        let g = normalize_gray(v, lo, hi);
        let pix = match class_color(label[(r, c)]) {
            Some(color) => blend(g, color),
            None => [g; 3],
        };
        buf.put_pixel(c as u32, r as u32, Rgb(pix));
    }
    Ok(buf)
}

/// 保存过体中心的轴状、矢状、冠状三个切面, 文件名为 `{平面}.png`.
pub fn save_orthogonal_views<P: AsRef<Path>>(
    scan: &MriScan,
    label: &SegLabel,
    dir: P,
) -> Result<Vec<PathBuf>, VisualError> {
    if scan.shape() != label.shape() {
        return Err(VisualError::ShapeMismatch {
            expected: label.shape(),
            found: scan.shape(),
        });
    }
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(|source| VisualError::Io {
        path: dir.to_owned(),
        source,
    })?;

    let mut ans = Vec::with_capacity(Plane::ALL.len());
    for plane in Plane::ALL {
        let n = scan.len_of(plane);
        if n == 0 {
            continue;
        }
        let img = overlay_slice(&scan.slice_at(plane, n / 2), &label.slice_at(plane, n / 2))?;
        let path = dir.join(format!("{plane}.png"));
        img.save(&path)?;
        ans.push(path);
    }
    Ok(ans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use nifti::NiftiHeader;

    #[test]
    fn test_overlay_and_save() {
        let h = NiftiHeader::default();
        let scan = MriScan::from_array(&h, Array3::from_shape_fn((6, 4, 2), |(x, _, _)| x as f32));
        let mut seg = Array3::<u8>::zeros((6, 4, 2));
        seg[(5, 0, 1)] = 2;
        let label = SegLabel::from_array(&h, seg);

        let img = overlay_slice(&scan.slice_at(Plane::Axial, 1), &label.slice_at(Plane::Axial, 1)).unwrap();
        assert_eq!(img.dimensions(), (4, 6));
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(img.get_pixel(1, 5).0, [255, 255, 255]);
        assert_eq!(img.get_pixel(0, 5).0, blend(255, [0, 255, 0]));

        let dir = tempfile::tempdir().unwrap();
        let saved = save_orthogonal_views(&scan, &label, dir.path()).unwrap();
        let names: Vec<_> = saved
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["axial.png", "sagittal.png", "coronal.png"]);
        assert_eq!(image::open(&saved[1]).unwrap().to_rgb8().dimensions(), (2, 4));
    }

    #[test]
    fn test_overlay_shape_mismatch() {
        let h = NiftiHeader::default();
        let scan = MriScan::from_array(&h, Array3::zeros((6, 4, 2)));
        let label = SegLabel::from_array(&h, Array3::zeros((6, 5, 2)));
        let r = overlay_slice(&scan.slice_at(Plane::Axial, 0), &label.slice_at(Plane::Axial, 0));
        assert!(matches!(
            r,
            Err(VisualError::SliceMismatch {
                scan: (6, 4),
                label: (6, 5)
            })
        ));
    }
}
