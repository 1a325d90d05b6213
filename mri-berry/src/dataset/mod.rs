//! 数据集操作.

use std::path::{Path, PathBuf};

pub mod loader;
pub mod patient;
pub mod prepare;
pub mod split;

pub use loader::{volume_loader, PatientVolumes, VolumeLoader};
pub use patient::{
    collate_dataset, collate_patient, discover_modalities, DiscoverError, Modality,
    ModalityPaths, PatientRecord,
};
pub use prepare::{PrepareError, PrepareReport, Preparer};
pub use split::{SplitDataset, SplitError, SplitPart};

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = home_dataset_dir()?;
    ans.extend(it);
    Some(ans)
}

/// 按名称升序列出 `root` 下的所有子目录, 即病人目录.
pub fn list_patient_dirs<P: AsRef<Path>>(root: P) -> std::io::Result<Vec<PathBuf>> {
    let mut ans = Vec::new();
    for entry in std::fs::read_dir(root.as_ref())? {
        let path = entry?.path();
        if path.is_dir() {
            ans.push(path);
        }
    }
    ans.sort_unstable();
    Ok(ans)
}
