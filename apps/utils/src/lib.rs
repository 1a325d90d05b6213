//! 各入口程序依赖的通用组件.

use log::LevelFilter;
use mri_berry::dataset::{discover_modalities, DiscoverError, PatientVolumes};
use mri_berry::SegLabel;
use simple_logger::SimpleLogger;
use std::path::Path;

pub mod loader;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
pub fn sep() {
    println!("{SEP}");
}

/// 简单分隔线.
#[inline]
pub fn sep_to<W: std::io::Write>(mut w: W) -> std::io::Result<()> {
    writeln!(&mut w, "{SEP}")
}

/// 初始化日志. 默认级别为 `info`, 可由 `RUST_LOG` 覆盖.
pub fn init_logger() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()?;
    Ok(())
}

/// 病人标识, 取目录名.
pub fn patient_id(patient: &Path) -> String {
    patient
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "patient".into())
}

/// 打开病人目录中的四个模态以及分割结果 `seg`.
pub fn open_segmented(patient: &Path, seg: &Path) -> anyhow::Result<(PatientVolumes, SegLabel)> {
    let paths = discover_modalities(patient)?;
    let images = paths
        .to_array()
        .map_err(|missing| DiscoverError::MissingModality {
            folder: patient.to_owned(),
            missing,
        })?;
    let seg = seg.to_path_buf();
    let mut volumes = PatientVolumes::open(patient_id(patient), &images, Some(&seg))?;
    let Some(label) = volumes.label.take() else {
        anyhow::bail!("segmentation {} not loaded", seg.display());
    };
    Ok((volumes, label))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patient_id() {
        assert_eq!(patient_id(Path::new("data/BraTS20_001")), "BraTS20_001");
        assert_eq!(patient_id(Path::new("/")), "patient");
    }

    #[test]
    fn test_open_segmented_without_modalities() {
        let dir = tempfile::tempdir().unwrap();
        let seg = dir.path().join("seg.nii.gz");
        let e = open_segmented(dir.path(), &seg).unwrap_err();
        assert!(e.to_string().contains("Missing modalities"), "{e}");
    }
}
