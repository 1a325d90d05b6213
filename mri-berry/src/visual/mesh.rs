use super::VisualError;
use lin_alg::f32::Vec3;
use mcubes::{MarchingCubes, MeshSide};
use ndarray::{s, Array3, ArrayView3};
use std::io::Write;

/// 三角网格. 顶点坐标以毫米为单位, 原点为体数据的第一个体素.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    /// 顶点坐标.
    pub vertices: Vec<[f32; 3]>,

    /// 每 3 个一组的顶点下标.
    pub indices: Vec<usize>,
}

impl Mesh {
    /// 三角形个数.
    #[inline]
    pub fn triangles(&self) -> usize {
        self.indices.len() / 3
    }

    /// 是否没有任何三角形?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.len() < 3
    }

    /// 以二进制 STL 格式写出. 法向量由顶点叉积求得.
    pub fn write_stl<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        let triangles = self.indices.chunks_exact(3).map(|t| {
            let [a, b, c] = [self.vertices[t[0]], self.vertices[t[1]], self.vertices[t[2]]];
            stl_io::Triangle {
                normal: stl_io::Normal::new(face_normal(a, b, c)),
                vertices: [
                    stl_io::Vertex::new(a),
                    stl_io::Vertex::new(b),
                    stl_io::Vertex::new(c),
                ],
            }
        });
        stl_io::write_stl(w, triangles)
    }
}

pub(super) fn face_normal(a: [f32; 3], b: [f32; 3], c: [f32; 3]) -> [f32; 3] {
    let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let n = [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ];
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    if len > 0.0 {
        [n[0] / len, n[1] / len, n[2] / len]
    } else {
        [0.0, 0.0, 1.0]
    }
}

/// 用 marching cubes 提取 `values` 在 `iso` 处的等值面.
///
/// 体数据四周先补一圈 0, 使贴边的区域也得到封闭曲面.
/// `spacing` 为 `(x, y, z)` 方向的体素间距. 没有任何体素达到 `iso` 时返回空网格.
pub fn extract_mesh(values: ArrayView3<f32>, iso: f32, spacing: [f32; 3]) -> Result<Mesh, VisualError> {
    if !values.iter().any(|&v| v >= iso) {
        return Ok(Mesh::default());
    }

    let (x, y, z) = values.dim();
    let mut padded = Array3::<f32>::zeros((x + 2, y + 2, z + 2));
    padded.slice_mut(s![1..=x, 1..=y, 1..=z]).assign(&values);
    let (px, py, pz) = padded.dim();

    // x 变化最快.
    let flat: Vec<f32> = padded.t().iter().copied().collect();
    let mc = MarchingCubes::new(
        (px, py, pz),
        (
            px as f32 * spacing[0],
            py as f32 * spacing[1],
            pz as f32 * spacing[2],
        ),
        (px as f32, py as f32, pz as f32),
        Vec3::new(-spacing[0], -spacing[1], -spacing[2]),
        flat,
        iso,
    )
    .map_err(|e| VisualError::Mesh(format!("{e:?}")))?;
    let mesh = mc.generate(MeshSide::OutsideOnly);

    Ok(Mesh {
        vertices: mesh
            .vertices
            .iter()
            .map(|v| [v.posit.x, v.posit.y, v.posit.z])
            .collect(),
        indices: mesh.indices,
    })
}
