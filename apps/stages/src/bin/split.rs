//! 划分训练集与测试集, 并可检查训练样本的形状.

use anyhow::Context;
use clap::Parser;
use mri_berry::consts::SPLIT_SEED;
use mri_berry::dataset::{collate_dataset, SplitDataset};
use mri_berry::transforms::TrainingPipeline;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "split")]
#[command(about = "Split the cleaned dataset into train/test lists")]
struct Cli {
    /// Config file (falls back to $BRATS_CONFIG, then ./config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Load the saved split and run the training transforms on the first patient
    #[arg(long)]
    inspect: bool,
}

fn main() -> anyhow::Result<()> {
    utils::init_logger()?;
    let cli = Cli::parse();
    let config = utils::loader::resolve_config(cli.config.as_deref())?;

    let records = collate_dataset(&config.data.raw_data_path)?;
    let split = SplitDataset::from_records_default(&records)?;
    split.save(&config.data.split_data)?;

    utils::sep();
    println!("Train: {}", split.train.len());
    println!("Test:  {}", split.test.len());
    utils::sep();

    if cli.inspect {
        let saved = SplitDataset::load(&config.data.split_data)?;
        let mut pipeline = TrainingPipeline::new(SPLIT_SEED);
        let (id, sample) = pipeline
            .samples(&saved.train)
            .next()
            .context("training split is empty")?;
        let sample = sample.with_context(|| format!("failed to load {id}"))?;
        println!("Sample {id}");
        println!("  image: {:?}", sample.image.dim());
        println!("  label: {:?}", sample.label.dim());
    }
    Ok(())
}
