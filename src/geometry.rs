use serde::{Deserialize, Serialize};

/// 设备原始坐标
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCoords {
    pub x: i32,
    pub y: i32,
}

impl DeviceCoords {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DeviceFloatCoords {
    pub x: f64,
    pub y: f64,
}

/// 归一化到 1000dpi 的相对位移
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NormalizedCoords {
    pub x: f64,
    pub y: f64,
}

impl NormalizedCoords {
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiscreteCoords {
    pub x: f64,
    pub y: f64,
}

/// 以毫米为单位的矩形
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl DeviceRect {
    pub fn contains(&self, point: &DeviceCoords) -> bool {
        let (x, y) = (i64::from(point.x), i64::from(point.y));
        x >= i64::from(self.x)
            && x < i64::from(self.x) + i64::from(self.w)
            && y >= i64::from(self.y)
            && y < i64::from(self.y) + i64::from(self.h)
    }
}

fn hysteresis_axis(input: i32, center: i32, margin: i32) -> i32 {
    let (input_wide, margin_wide) = (i64::from(input), i64::from(margin));
    let diff = input_wide - i64::from(center);
    if diff.abs() <= margin_wide {
        center
    } else if diff > 0 {
        input.saturating_sub(margin)
    } else {
        input.saturating_add(margin)
    }
}

/// 以 `center` 为中心的死区滤波，`margin` 为每个轴的半宽
pub fn hysteresis(input: &DeviceCoords, center: &DeviceCoords, margin: &DeviceCoords) -> DeviceCoords {
    DeviceCoords {
        x: hysteresis_axis(input.x, center.x, margin.x),
        y: hysteresis_axis(input.y, center.y, margin.y),
    }
}

/// 相对位移的旋转，90 度的整数倍是精确的
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    degrees: u32,
    cos: f64,
    sin: f64,
}

impl Rotation {
    pub fn new(degrees: u32) -> Self {
        let degrees = degrees % 360;
        let rad = f64::from(degrees).to_radians();
        Self {
            degrees,
            cos: rad.cos(),
            sin: rad.sin(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.degrees == 0
    }

    pub fn apply(&self, x: i32, y: i32) -> (i32, i32) {
        match self.degrees {
            0 => (x, y),
            90 => (y.saturating_neg(), x),
            180 => (x.saturating_neg(), y.saturating_neg()),
            270 => (y, x.saturating_neg()),
            _ => {
                let (fx, fy) = (f64::from(x), f64::from(y));
                (
                    (fx * self.cos - fy * self.sin).round() as i32,
                    (fx * self.sin + fy * self.cos).round() as i32,
                )
            }
        }
    }
}

/// 2x3 的仿射矩阵，用于绝对坐标校准
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration(pub [f64; 6]);

impl Calibration {
    pub fn apply(&self, point: &DeviceCoords) -> DeviceCoords {
        let [a, b, c, d, e, f] = self.0;
        let (x, y) = (f64::from(point.x), f64::from(point.y));
        DeviceCoords {
            x: (a * x + b * y + c).round() as i32,
            y: (d * x + e * y + f).round() as i32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hysteresis_inside_margin_sticks_to_center() {
        let center = DeviceCoords::new(100, 100);
        let margin = DeviceCoords::new(2, 2);
        let out = hysteresis(&DeviceCoords::new(101, 101), &center, &margin);
        assert_eq!(out, center);
    }

    #[test]
    fn hysteresis_outside_margin_trails_input() {
        let center = DeviceCoords::new(100, 100);
        let margin = DeviceCoords::new(2, 2);
        let out = hysteresis(&DeviceCoords::new(110, 100), &center, &margin);
        assert_eq!(out, DeviceCoords::new(108, 100));
        let out = hysteresis(&DeviceCoords::new(90, 97), &center, &margin);
        assert_eq!(out, DeviceCoords::new(92, 99));
    }

    #[test]
    fn rotation_quarter_turns_are_exact() {
        assert_eq!(Rotation::new(90).apply(3, 1), (-1, 3));
        assert_eq!(Rotation::new(180).apply(3, 1), (-3, -1));
        assert_eq!(Rotation::new(450).apply(3, 1), (-1, 3));
        assert!(Rotation::new(360).is_identity());
    }

    #[test]
    fn rect_excludes_far_edge() {
        let rect = DeviceRect { x: 10, y: 10, w: 5, h: 5 };
        assert!(rect.contains(&DeviceCoords::new(10, 14)));
        assert!(!rect.contains(&DeviceCoords::new(15, 12)));
    }

    #[test]
    fn extreme_values_do_not_overflow() {
        let center = DeviceCoords::new(100, 100);
        let margin = DeviceCoords::new(2, 2);
        let out = hysteresis(&DeviceCoords::new(i32::MIN, i32::MAX), &center, &margin);
        assert_eq!(out, DeviceCoords::new(i32::MIN + 2, i32::MAX - 2));

        assert_eq!(Rotation::new(90).apply(0, i32::MIN), (i32::MAX, 0));
        assert_eq!(Rotation::new(180).apply(i32::MIN, 1), (i32::MAX, -1));

        let wide = DeviceRect { x: i32::MAX - 1, y: 0, w: i32::MAX, h: i32::MAX };
        assert!(wide.contains(&DeviceCoords::new(i32::MAX, 5)));
        assert!(!wide.contains(&DeviceCoords::new(i32::MIN, 5)));
    }
}
