use crate::IntensityWindow;
use ndarray::{Array3, Array4, Axis};

/// 为单模态体数据增加长度为 1 的通道轴: `(x, y, z) -> (1, x, y, z)`.
#[inline]
pub fn ensure_channel_first<T>(vol: Array3<T>) -> Array4<T> {
    vol.insert_axis(Axis(0))
}

/// 用 `window` 就地缩放强度. 非有限值映射为窗口输出下限.
pub fn scale_intensity_range(vol: &mut Array4<f32>, window: &IntensityWindow) {
    let w = *window;
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            vol.par_mapv_inplace(|v| w.eval(v));
        } else {
            vol.mapv_inplace(|v| w.eval(v));
        }
    }
}

/// 就地为所有强度加上 `offset`.
#[inline]
pub fn shift_intensity(vol: &mut Array4<f32>, offset: f32) {
    vol.mapv_inplace(|v| v + offset);
}
