//! 通用常量.

/// 单通道颜色.
pub mod gray {
    /// BraTS 标签中, 背景的体素值.
    pub const BRATS_BACKGROUND: u8 = 0;

    /// BraTS 标签中, 坏死核心 (necrotic core) 的体素值.
    pub const BRATS_NECROTIC: u8 = 1;

    /// BraTS 标签中, 瘤周水肿 (peritumoral edema) 的体素值.
    pub const BRATS_EDEMA: u8 = 2;

    /// BraTS 标签中, 增强肿瘤 (enhancing tumor) 的体素值.
    pub const BRATS_ENHANCING: u8 = 3;

    /// 旧版 BraTS 数据中增强肿瘤的编码. 清洗时会被重映射为 [`BRATS_ENHANCING`].
    pub const BRATS_LEGACY_ENHANCING: u8 = 4;

    /// 单通道黑色.
    pub const BLACK: u8 = 0b_0000_0000;

    /// 单通道暗灰色.
    pub const DARK_GRAY: u8 = 0b_0100_0000;

    /// 单通道灰色.
    pub const GRAY: u8 = 0b_1000_0000;

    /// 单通道亮灰色.
    pub const LIGHT_GRAY: u8 = 0b_1100_0000;

    /// 单通道白色.
    pub const WHITE: u8 = 0b_1111_1111;

    /// 体素是否属于任一肿瘤子区域?
    #[inline]
    pub const fn is_tumor(p: u8) -> bool {
        matches!(p, BRATS_NECROTIC | BRATS_EDEMA | BRATS_ENHANCING)
    }

    /// 体素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        matches!(p, BRATS_BACKGROUND)
    }

    /// 体素是否是旧版编码?
    #[inline]
    pub const fn is_legacy(p: u8) -> bool {
        matches!(p, BRATS_LEGACY_ENHANCING)
    }
}

/// 合格标签中不同体素值的个数 (背景 + 三个肿瘤子区域).
pub const EXPECTED_LABEL_CLASSES: usize = 4;

/// 分割网络输入/输出的类别通道数.
pub const NUM_CLASSES: usize = 4;

/// 每个病人的模态个数.
pub const NUM_MODALITIES: usize = 4;

/// 网络输入的固定空间大小.
pub const ROI_SIZE: [usize; 3] = [128, 128, 128];

/// 强度缩放输入下限.
pub const INTENSITY_A_MIN: f32 = -200.0;

/// 强度缩放输入上限.
pub const INTENSITY_A_MAX: f32 = 200.0;

/// 训练/测试划分的默认随机种子.
pub const SPLIT_SEED: u64 = 42;

/// 测试集默认占比.
pub const SPLIT_TEST_RATIO: f64 = 0.2;

/// 推理结果固定文件名.
pub const PREDICTION_FILE_NAME: &str = "seg.nii.gz";
