use crate::consts::{INTENSITY_A_MAX, INTENSITY_A_MIN};

/// 强度窗口. 将输入区间 `[a_min, a_max]` 线性映射到输出区间 `[b_min, b_max]`,
/// 并可选地将结果截断到输出区间内.
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntensityWindow {
    a_min: f32,
    a_max: f32,
    b_min: f32,
    b_max: f32,
    clip: bool,
}

impl IntensityWindow {
    /// 构建强度窗口.
    ///
    /// 四个端点必须有限, 且 `a_min < a_max`, `b_min < b_max`, 否则返回 `None`.
    pub fn new(a_min: f32, a_max: f32, b_min: f32, b_max: f32, clip: bool) -> Option<Self> {
        let finite = [a_min, a_max, b_min, b_max].iter().all(|v| v.is_finite());
        if finite && a_min < a_max && b_min < b_max {
            Some(Self {
                a_min,
                a_max,
                b_min,
                b_max,
                clip,
            })
        } else {
            None
        }
    }

    /// 分割网络输入使用的脑部窗口: `[-200, 200] -> [0, 1]`, 截断.
    #[inline]
    pub const fn brain() -> Self {
        Self {
            a_min: INTENSITY_A_MIN,
            a_max: INTENSITY_A_MAX,
            b_min: 0.0,
            b_max: 1.0,
            clip: true,
        }
    }

    /// 输入下限.
    #[inline]
    pub fn a_min(&self) -> f32 {
        self.a_min
    }

    /// 输入上限.
    #[inline]
    pub fn a_max(&self) -> f32 {
        self.a_max
    }

    /// 输出下限.
    #[inline]
    pub fn b_min(&self) -> f32 {
        self.b_min
    }

    /// 输出上限.
    #[inline]
    pub fn b_max(&self) -> f32 {
        self.b_max
    }

    /// 是否截断.
    #[inline]
    pub fn clip(&self) -> bool {
        self.clip
    }

    /// 求 `v` 在当前窗口下的映射值.
    ///
    /// 如果 `v` 无意义 (如 inf, NaN), 则返回 `b_min`.
    pub fn eval(&self, v: f32) -> f32 {
        if !v.is_finite() {
            return self.b_min;
        }
        let ratio = (v - self.a_min) / (self.a_max - self.a_min);
        let out = self.b_min + ratio * (self.b_max - self.b_min);
        if self.clip {
            out.clamp(self.b_min, self.b_max)
        } else {
            out
        }
    }

    /// 求 `v` 在当前窗口下对应的灰度图像素整数值 (0 <= value <= 255).
    /// 总是截断.
    pub fn eval_gray(&self, v: f32) -> u8 {
        if !v.is_finite() || v <= self.a_min {
            return u8::MIN;
        }
        if v >= self.a_max {
            return u8::MAX;
        }
        // 255, not 256.
        ((v - self.a_min) / (self.a_max - self.a_min) * 255.0) as u8
    }
}

impl Default for IntensityWindow {
    #[inline]
    fn default() -> Self {
        Self::brain()
    }
}

#[cfg(test)]
mod tests {
    use crate::IntensityWindow;

    fn is_valid_init(a_min: f32, a_max: f32) -> bool {
        IntensityWindow::new(a_min, a_max, 0.0, 1.0, true).is_some()
    }

    #[test]
    fn test_window_invalid_input() {
        assert!(!is_valid_init(0.0, -1.0));
        assert!(!is_valid_init(0.0, 0.0));
        assert!(!is_valid_init(f32::NAN, 1.0));
        assert!(IntensityWindow::new(0.0, 1.0, 1.0, 1.0, false).is_none());
    }

    fn float_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_brain_window() {
        let w = IntensityWindow::brain();
        assert_eq!(w, IntensityWindow::default());
        assert!(float_eq(w.eval(f32::NAN), 0.0));
        assert!(float_eq(w.eval(f32::INFINITY), 0.0));
        assert!(float_eq(w.eval(-1000.0), 0.0));
        assert!(float_eq(w.eval(-200.0), 0.0));
        assert!(float_eq(w.eval(-100.0), 0.25));
        assert!(float_eq(w.eval(0.0), 0.5));
        assert!(float_eq(w.eval(100.0), 0.75));
        assert!(float_eq(w.eval(200.0), 1.0));
        assert!(float_eq(w.eval(5000.0), 1.0));
    }

    #[test]
    fn test_window_without_clip() {
        let w = IntensityWindow::new(0.0, 10.0, 0.0, 1.0, false).unwrap();
        assert!(float_eq(w.eval(20.0), 2.0));
        assert!(float_eq(w.eval(-10.0), -1.0));
    }

    #[test]
    fn test_window_gray() {
        // [60, 100]
        let w = IntensityWindow::new(60.0, 100.0, 0.0, 1.0, true).unwrap();
        assert_eq!(w.eval_gray(f32::NAN), 0);
        assert_eq!(w.eval_gray(f32::MIN), 0);
        assert_eq!(w.eval_gray(f32::MAX), 255);
        assert_eq!(w.eval_gray(60.1), 0);
        assert_eq!(w.eval_gray(70.0), (255.0 * 0.25) as u8);
        assert_eq!(w.eval_gray(80.0), (255.0 * 0.5) as u8);
        assert_eq!(w.eval_gray(99.999), 254);
        assert_eq!(w.eval_gray(100.0), u8::MAX);
    }
}
