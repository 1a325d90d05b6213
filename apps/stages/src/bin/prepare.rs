//! 清洗原始数据集: 文件名检查, 预览, 删除标签不完整的病人, 4 -> 3 重映射.

use clap::Parser;
use mri_berry::dataset::Preparer;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "prepare")]
#[command(about = "Clean the raw BraTS dataset in place")]
struct Cli {
    /// Config file (falls back to $BRATS_CONFIG, then ./config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only flag unwanted folders, do not delete them
    #[arg(long)]
    keep: bool,
}

fn main() -> anyhow::Result<()> {
    utils::init_logger()?;
    let cli = Cli::parse();
    let config = utils::loader::resolve_config(cli.config.as_deref())?;

    let report = Preparer::from_config(&config)
        .with_deletion(!cli.keep)
        .run()?;

    utils::sep();
    println!("Patients:          {}", report.patients);
    println!("Name mismatches:   {}", report.mismatches.len());
    for m in &report.mismatches {
        println!("  {}: {}", m.folder, m.file);
    }
    println!("Previews:          {}", report.previews.len());
    println!("Unwanted folders:  {}", report.unwanted.len());
    println!("Deleted folders:   {}", report.deleted.deleted.len());
    for (p, e) in &report.deleted.failed {
        println!("  failed {}: {e}", p.display());
    }
    println!(
        "Remapped labels:   {} ({} voxels)",
        report.remap.rewritten.len(),
        report.remap.voxels
    );
    utils::sep();
    Ok(())
}
