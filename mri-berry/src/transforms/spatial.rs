use crate::Idx3d;
use ndarray::{s, Array3, Array4, ArrayView3, ArrayView4, Axis, Slice};
use num::Zero;
use rand::Rng;

/// 轴对齐包围盒, 左闭右开.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    /// 起点 (含).
    pub start: [usize; 3],

    /// 终点 (不含).
    pub end: [usize; 3],
}

impl BoundingBox {
    /// 覆盖整个 `shape` 的包围盒.
    #[inline]
    pub fn whole((x, y, z): Idx3d) -> Self {
        Self {
            start: [0; 3],
            end: [x, y, z],
        }
    }

    /// 从 `start` 开始、大小为 `size` 的包围盒.
    #[inline]
    pub fn at(start: [usize; 3], size: [usize; 3]) -> Self {
        Self {
            start,
            end: [start[0] + size[0], start[1] + size[1], start[2] + size[2]],
        }
    }

    /// 包围盒形状.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        (
            self.end[0] - self.start[0],
            self.end[1] - self.start[1],
            self.end[2] - self.start[2],
        )
    }
}

/// 通道优先数组的空间形状.
#[inline]
pub fn spatial_dim<T>(vol: &ArrayView4<T>) -> Idx3d {
    let (_, x, y, z) = vol.dim();
    (x, y, z)
}

/// 任一通道上强度 `> 0` 的体素构成的包围盒. 全为背景时返回 `None`.
pub fn foreground_bbox(vol: ArrayView4<f32>) -> Option<BoundingBox> {
    let mut start = [usize::MAX; 3];
    let mut end = [0usize; 3];
    let mut any = false;
    for ((_, x, y, z), &v) in vol.indexed_iter() {
        if v > 0.0 {
            any = true;
            for (k, i) in [x, y, z].into_iter().enumerate() {
                start[k] = start[k].min(i);
                end[k] = end[k].max(i + 1);
            }
        }
    }
    any.then_some(BoundingBox { start, end })
}

/// 按包围盒裁剪所有通道.
///
/// 包围盒越界时 panic.
pub fn crop<T: Clone>(vol: ArrayView4<T>, b: &BoundingBox) -> Array4<T> {
    let [x0, y0, z0] = b.start;
    let [x1, y1, z1] = b.end;
    vol.slice(s![.., x0..x1, y0..y1, z0..z1]).to_owned()
}

/// 第 `i` 个输出单元在长度为 `n` 的输入上覆盖的区间 `[floor(i*n/m), ceil((i+1)*n/m))`.
#[inline]
fn bin(i: usize, n: usize, m: usize) -> (usize, usize) {
    let start = i * n / m;
    let end = ((i + 1) * n + m - 1) / m;
    (start, end.max(start + 1).min(n))
}

/// 沿 `axis` 做自适应平均池化, 输出长度为 `m`.
fn pool_axis(vol: ArrayView4<f32>, axis: usize, m: usize) -> Array4<f32> {
    let n = vol.len_of(Axis(axis));
    if n == m {
        return vol.to_owned();
    }
    let mut shape = vol.raw_dim();
    shape[axis] = m;
    let mut out = Array4::<f32>::zeros(shape);
    if n == 0 {
        return out;
    }
    for (i, mut lane) in out.axis_iter_mut(Axis(axis)).enumerate() {
        let (s, e) = bin(i, n, m);
        let len = (e - s) as f32;
        let sum = vol
            .slice_axis(Axis(axis), Slice::from(s..e))
            .sum_axis(Axis(axis));
        lane.assign(&sum.mapv(|v| v / len));
    }
    out
}

/// 面积插值: 逐轴自适应平均池化到 `size`. 缩小时每个输出体素是其覆盖区域的均值.
pub fn resize_area(vol: ArrayView4<f32>, size: [usize; 3]) -> Array4<f32> {
    let mut out = pool_axis(vol, 1, size[0]);
    out = pool_axis(out.view(), 2, size[1]);
    pool_axis(out.view(), 3, size[2])
}

/// 最近邻插值到 `size`, 用于标签. 输入为空时返回全默认值.
pub fn resize_nearest<T: Clone + Default>(vol: ArrayView3<T>, size: Idx3d) -> Array3<T> {
    let (nx, ny, nz) = vol.dim();
    if nx == 0 || ny == 0 || nz == 0 {
        return Array3::from_elem(size, T::default());
    }
    let (sx, sy, sz) = size;
    Array3::from_shape_fn(size, |(i, j, k)| {
        vol[(i * nx / sx, j * ny / sy, k * nz / sz)].clone()
    })
}

/// 对称地以 0 填充空间轴, 直到每个轴至少为 `size`. 已足够大的轴不变.
pub fn spatial_pad<T: Clone + Zero>(vol: ArrayView4<T>, size: [usize; 3]) -> Array4<T> {
    let (c, x, y, z) = vol.dim();
    let target = [x.max(size[0]), y.max(size[1]), z.max(size[2])];
    if target == [x, y, z] {
        return vol.to_owned();
    }
    let [bx, by, bz] = [(target[0] - x) / 2, (target[1] - y) / 2, (target[2] - z) / 2];
    let mut out = Array4::<T>::zeros((c, target[0], target[1], target[2]));
    out.slice_mut(s![.., bx..bx + x, by..by + y, bz..bz + z])
        .assign(&vol);
    out
}

/// 在 `shape` 内均匀采样大小为 `roi` 的裁剪起点. 某轴不足 `roi` 时该轴起点为 0.
pub fn rand_crop_start<R: Rng + ?Sized>(shape: Idx3d, roi: [usize; 3], rng: &mut R) -> [usize; 3] {
    let (x, y, z) = shape;
    let mut ans = [0; 3];
    for (k, n) in [x, y, z].into_iter().enumerate() {
        ans[k] = rng.gen_range(0..=n.saturating_sub(roi[k]));
    }
    ans
}

/// 沿空间轴 `spatial_axis` (0, 1, 2) 翻转.
pub fn flip<T: Clone>(mut vol: Array4<T>, spatial_axis: usize) -> Array4<T> {
    vol.invert_axis(Axis(spatial_axis + 1));
    vol.as_standard_layout().into_owned()
}

/// 在空间平面 `plane` 内旋转 `k` 个 90 度, 方向为从 `plane.0` 转向 `plane.1`.
pub fn rot90<T: Clone>(mut vol: Array4<T>, k: usize, plane: (usize, usize)) -> Array4<T> {
    let (a, b) = (plane.0 + 1, plane.1 + 1);
    match k % 4 {
        0 => return vol,
        1 => {
            vol.invert_axis(Axis(b));
            vol.swap_axes(a, b);
        }
        2 => {
            vol.invert_axis(Axis(a));
            vol.invert_axis(Axis(b));
        }
        _ => {
            vol.swap_axes(a, b);
            vol.invert_axis(Axis(b));
        }
    }
    vol.as_standard_layout().into_owned()
}
