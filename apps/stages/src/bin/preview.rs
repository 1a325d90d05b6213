//! 保存一位病人每个 nifti 文件的中间切片预览.

use anyhow::Context;
use clap::Parser;
use mri_berry::dataset::{list_patient_dirs, prepare::preview_patient};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "preview")]
#[command(about = "Save middle-slice previews of one patient folder")]
struct Cli {
    /// Config file (falls back to $BRATS_CONFIG, then ./config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Patient folder (defaults to the first folder of the raw dataset)
    patient: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    utils::init_logger()?;
    let cli = Cli::parse();
    let config = utils::loader::resolve_config(cli.config.as_deref())?;

    let folder = match cli.patient {
        Some(p) => p,
        None => list_patient_dirs(&config.data.raw_data_path)
            .with_context(|| {
                format!("failed to list {}", config.data.raw_data_path.display())
            })?
            .into_iter()
            .next()
            .context("raw dataset has no patient folders")?,
    };

    let saved = preview_patient(&folder, &config.visualization.loc)?;
    utils::sep();
    for p in &saved {
        println!("{}", p.display());
    }
    utils::sep();
    Ok(())
}
