//! 将分割结果导出为三维场景与三个正交切面.

use clap::Parser;
use mri_berry::visual::{save_orthogonal_views, Scene};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "visualize")]
#[command(about = "Export a segmentation as a 3D scene and orthogonal slice views")]
struct Cli {
    /// Config file (falls back to $BRATS_CONFIG, then ./config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Segmentation volume, e.g. current_predictions/seg.nii.gz
    seg: PathBuf,

    /// Patient folder with the four modalities
    patient: PathBuf,

    /// Output directory (defaults to `<visualization.loc>/<patient id>`)
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    utils::init_logger()?;
    let cli = Cli::parse();
    let config = utils::loader::resolve_config(cli.config.as_deref())?;

    let out = cli
        .out
        .unwrap_or_else(|| config.visualization.loc.join(utils::patient_id(&cli.patient)));
    let (volumes, label) = utils::open_segmented(&cli.patient, &cli.seg)?;

    let scene = Scene::build(&label, &volumes.scans)?;
    let manifest = scene.export(&out)?;
    let views = save_orthogonal_views(&volumes.scans[0], &label, &out)?;

    utils::sep();
    println!("{}", scene.statistics.overlay_text());
    println!("Layers: {}", manifest.layers.len());
    println!("Views:  {}", views.len());
    println!("Saved to {}", out.display());
    utils::sep();
    Ok(())
}
