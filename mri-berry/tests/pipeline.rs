mod common;

use common::write_full_patient;
use mri_berry::dataset::{collate_dataset, SplitDataset};
use mri_berry::transforms::{InferencePipeline, TrainingPipeline};

const SHAPE: (usize, usize, usize) = (12, 10, 8);

#[test]
fn split_then_train_samples() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw");
    for i in 0..5 {
        write_full_patient(&raw, &format!("BraTS2021_{i:05}"), SHAPE, Some(3));
    }

    let records = collate_dataset(&raw).unwrap();
    let split = SplitDataset::from_records_default(&records).unwrap();
    assert_eq!(split.test.len(), 1);
    assert_eq!(split.train.len(), 4);
    assert_eq!(split, SplitDataset::from_records_default(&records).unwrap());

    let out = dir.path().join("split");
    split.save(&out).unwrap();
    let back = SplitDataset::load(&out).unwrap();
    assert_eq!(back, split);

    let mut pipe = TrainingPipeline::new(0).with_roi([8, 8, 8]);
    let samples: Vec<_> = pipe.samples(&back.train).collect();
    assert_eq!(samples.len(), 4);
    for (id, s) in samples {
        let s = s.unwrap_or_else(|e| panic!("{id}: {e}"));
        assert_eq!(s.image.dim(), (4, 8, 8, 8));
        assert_eq!(s.label.dim(), (1, 8, 8, 8));
        assert!(s.label.iter().all(|&v| v <= 3));
    }
}

#[test]
fn inference_preprocessing_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let p = write_full_patient(dir.path(), "case", SHAPE, None);
    let paths = mri_berry::dataset::discover_modalities(&p)
        .unwrap()
        .to_array()
        .unwrap();

    let pre = InferencePipeline::new().with_spatial([4, 4, 4]).run(&paths).unwrap();
    assert_eq!(pre.batch.dim(), (1, 4, 4, 4, 4));
    assert!(pre.batch.iter().all(|v| (0.0..=1.0).contains(v)));
    assert_eq!(pre.geometry.shape, SHAPE);
    // 前景是中心亮块.
    assert_eq!(pre.geometry.bbox.start, [3, 2, 2]);
    assert_eq!(pre.geometry.bbox.end, [9, 8, 6]);
}

#[test]
fn default_roi_preprocessing_and_restore() {
    let dir = tempfile::tempdir().unwrap();
    let p = write_full_patient(dir.path(), "case", SHAPE, None);
    let paths = mri_berry::dataset::discover_modalities(&p)
        .unwrap()
        .to_array()
        .unwrap();

    let pipe = InferencePipeline::new();
    assert_eq!(pipe.spatial(), mri_berry::consts::ROI_SIZE);
    let pre = pipe.run(&paths).unwrap();
    assert_eq!(pre.batch.dim(), (1, 4, 128, 128, 128));
    assert!(pre.batch.iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v)));

    // 全 1 的预测还原后恰好覆盖前景包围盒.
    let mask = ndarray::Array3::<u8>::ones((128, 128, 128));
    let restored = pre.geometry.restore(mask.view());
    assert_eq!(restored.dim(), SHAPE);
    assert_eq!(restored.iter().filter(|&&v| v == 1).count(), 6 * 6 * 4);
    assert_eq!(restored[(3, 2, 2)], 1);
    assert_eq!(restored[(2, 2, 2)], 0);
    assert_eq!(restored[(8, 7, 5)], 1);
    assert_eq!(restored[(9, 7, 5)], 0);
}
