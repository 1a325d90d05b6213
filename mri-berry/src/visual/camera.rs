//! 交互查看器使用的软件投影.
//!
//! 场景先平移到包围球中心并按半径归一化, 再绕竖直轴 (yaw) 和水平轴 (pitch)
//! 旋转, 最后正交投影到屏幕. 三角形按深度从远到近排序, 以便半透明层正确叠加.

use super::scene::Scene;

/// 轨道相机.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Camera {
    /// 绕竖直轴的旋转角, 弧度.
    pub yaw: f32,

    /// 绕水平轴的旋转角, 弧度. 限制在 `(-π/2, π/2)` 内.
    pub pitch: f32,

    /// 缩放倍数.
    pub zoom: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            yaw: 0.6,
            pitch: -0.4,
            zoom: 1.0,
        }
    }
}

const PITCH_LIMIT: f32 = 1.55;
const ORBIT_SPEED: f32 = 0.01;

impl Camera {
    /// 按鼠标拖动的像素距离旋转.
    pub fn orbit(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * ORBIT_SPEED;
        self.pitch = (self.pitch + dy * ORBIT_SPEED).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// 乘以 `factor` 缩放, 结果限制在 `[0.1, 20]`.
    pub fn zoom_by(&mut self, factor: f32) {
        if factor.is_finite() && factor > 0.0 {
            self.zoom = (self.zoom * factor).clamp(0.1, 20.0);
        }
    }

    /// 把相对场景中心的坐标旋转到视图坐标. 视图 `z` 轴指向观察者.
    pub fn rotate(&self, [x, y, z]: [f32; 3]) -> [f32; 3] {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        let (x, z) = (cy * x + sy * z, -sy * x + cy * z);
        let (y, z) = (cp * y - sp * z, sp * y + cp * z);
        [x, y, z]
    }
}

/// 投影到屏幕上的一个三角形.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScreenTriangle {
    /// 所属层的下标.
    pub layer: usize,

    /// 三个顶点的屏幕坐标, 原点为视口左上角, `y` 向下.
    pub points: [[f32; 2]; 3],

    /// 视图深度, 越大越靠近观察者.
    pub depth: f32,

    /// 漫反射亮度, 位于 `[0, 1]`.
    pub shade: f32,
}

/// 可见层所有顶点的包围球 `(中心, 半径)`. 没有可见顶点时返回 `None`.
pub fn bounding_sphere(scene: &Scene, visible: &[bool]) -> Option<([f32; 3], f32)> {
    let mut lo = [f32::INFINITY; 3];
    let mut hi = [f32::NEG_INFINITY; 3];
    let layers = scene
        .layers
        .iter()
        .enumerate()
        .filter(|(i, _)| visible.get(*i).copied().unwrap_or(false));
    for (_, layer) in layers {
        for v in layer.mesh.vertices.iter() {
            for k in 0..3 {
                lo[k] = lo[k].min(v[k]);
                hi[k] = hi[k].max(v[k]);
            }
        }
    }
    if lo[0] > hi[0] {
        return None;
    }
    let center = [0, 1, 2].map(|k| (lo[k] + hi[k]) / 2.0);
    let half = [0, 1, 2].map(|k| (hi[k] - lo[k]) / 2.0);
    let radius = (half[0] * half[0] + half[1] * half[1] + half[2] * half[2]).sqrt();
    Some((center, radius.max(f32::EPSILON)))
}

/// 把可见层投影到 `viewport` (宽, 高) 大小的屏幕上, 按深度从远到近排序.
///
/// 可见三角形总数超过 `budget` 时, 每层按相同步长抽样, 使总数接近 `budget`.
pub fn project(
    scene: &Scene,
    visible: &[bool],
    camera: &Camera,
    viewport: [f32; 2],
    budget: usize,
) -> Vec<ScreenTriangle> {
    let Some((center, radius)) = bounding_sphere(scene, visible) else {
        return Vec::new();
    };
    let is_visible = |i: usize| visible.get(i).copied().unwrap_or(false);

    let total: usize = scene
        .layers
        .iter()
        .enumerate()
        .filter(|(i, _)| is_visible(*i))
        .map(|(_, l)| l.mesh.triangles())
        .sum();
    let step = if budget == 0 { usize::MAX } else { total.div_ceil(budget).max(1) };

    let [w, h] = viewport;
    let scale = 0.45 * w.min(h) * camera.zoom / radius;
    let to_view = |p: [f32; 3]| camera.rotate([p[0] - center[0], p[1] - center[1], p[2] - center[2]]);

    let mut ans = Vec::with_capacity(total.min(budget));
    for (li, layer) in scene.layers.iter().enumerate() {
        if !is_visible(li) {
            continue;
        }
        let mesh = &layer.mesh;
        for t in mesh.indices.chunks_exact(3).step_by(step) {
            let [a, b, c] = [t[0], t[1], t[2]].map(|i| to_view(mesh.vertices[i]));
            let n = super::mesh::face_normal(a, b, c);
            ans.push(ScreenTriangle {
                layer: li,
                points: [a, b, c].map(|p| [w / 2.0 + p[0] * scale, h / 2.0 - p[1] * scale]),
                depth: (a[2] + b[2] + c[2]) / 3.0,
                shade: 0.35 + 0.65 * n[2].abs(),
            });
        }
    }
    ans.sort_by(|x, y| x.depth.total_cmp(&y.depth));
    ans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visual::{Mesh, SceneLayer, SegStatistics};

    fn layer(name: &str, vertices: Vec<[f32; 3]>, indices: Vec<usize>) -> SceneLayer {
        SceneLayer {
            name: name.to_owned(),
            color: [255, 0, 0],
            opacity: 0.8,
            mesh: Mesh { vertices, indices },
        }
    }

    fn scene() -> Scene {
        // 两个平行于 xy 平面的三角形, z 分别为 0 与 10.
        Scene {
            layers: vec![
                layer("near", vec![[0.0, 0.0, 10.0], [4.0, 0.0, 10.0], [0.0, 4.0, 10.0]], vec![0, 1, 2]),
                layer("far", vec![[0.0, 0.0, 0.0], [4.0, 0.0, 0.0], [0.0, 4.0, 0.0]], vec![0, 1, 2]),
            ],
            statistics: SegStatistics {
                total: 0,
                necrotic: 0,
                edema: 0,
                enhancing: 0,
            },
        }
    }

    fn front() -> Camera {
        Camera {
            yaw: 0.0,
            pitch: 0.0,
            zoom: 1.0,
        }
    }

    #[test]
    fn test_rotate() {
        let c = front();
        assert_eq!(c.rotate([1.0, 2.0, 3.0]), [1.0, 2.0, 3.0]);

        let c = Camera {
            yaw: std::f32::consts::FRAC_PI_2,
            ..front()
        };
        let [x, y, z] = c.rotate([1.0, 0.0, 0.0]);
        assert!(x.abs() < 1e-6 && y.abs() < 1e-6 && (z + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_orbit_and_zoom_limits() {
        let mut c = front();
        c.orbit(0.0, 1e6);
        assert_eq!(c.pitch, PITCH_LIMIT);
        c.zoom_by(1e6);
        assert_eq!(c.zoom, 20.0);
        c.zoom_by(f32::NAN);
        assert_eq!(c.zoom, 20.0);
        c.zoom_by(1e-9);
        assert_eq!(c.zoom, 0.1);
    }

    #[test]
    fn test_bounding_sphere() {
        let s = scene();
        let (c, r) = bounding_sphere(&s, &[true, true]).unwrap();
        assert_eq!(c, [2.0, 2.0, 5.0]);
        assert!((r - (4.0f32 + 4.0 + 25.0).sqrt()).abs() < 1e-5);
        assert_eq!(bounding_sphere(&s, &[false, false]), None);
        assert_eq!(bounding_sphere(&s, &[]), None);
    }

    #[test]
    fn test_project_sorts_far_to_near() {
        let s = scene();
        let tris = project(&s, &[true, true], &front(), [200.0, 100.0], 100);
        assert_eq!(tris.len(), 2);
        assert_eq!(tris[0].layer, 1);
        assert_eq!(tris[1].layer, 0);
        assert!(tris[0].depth < tris[1].depth);
        // 正对观察者的面最亮.
        assert!((tris[1].shade - 1.0).abs() < 1e-6);

        // 包围球中心落在视口中心, y 轴朝上.
        let [p0, _, p2] = tris[1].points;
        assert!(p0[0] < 100.0 && p0[1] > 50.0);
        assert!(p2[1] < p0[1]);
        for p in tris.iter().flat_map(|t| t.points) {
            assert!((0.0..=200.0).contains(&p[0]) && (0.0..=100.0).contains(&p[1]));
        }
    }

    #[test]
    fn test_project_hidden_layers_and_budget() {
        let s = scene();
        let tris = project(&s, &[false, true], &front(), [100.0, 100.0], 100);
        assert_eq!(tris.len(), 1);
        assert_eq!(tris[0].layer, 1);

        let mut big = scene();
        big.layers[0].mesh.indices = [0, 1, 2].repeat(10);
        let tris = project(&big, &[true, true], &front(), [100.0, 100.0], 4);
        // 11 个三角形, 步长 3: 第一层 4 个, 第二层 1 个.
        assert_eq!(tris.len(), 5);
    }
}
