use serde::Deserialize;

/// Maps a normalized intensity in `[0, 1]` to an RGB color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMap {
    /// Piecewise-linear approximation of matplotlib's magma.
    #[default]
    Magma,
    Gray,
}

// Nine evenly spaced stops, black-purple to pale yellow.
const MAGMA_STOPS: [[f32; 3]; 9] = [
    [0.001, 0.000, 0.014],
    [0.113, 0.065, 0.277],
    [0.316, 0.072, 0.485],
    [0.513, 0.149, 0.508],
    [0.716, 0.215, 0.475],
    [0.902, 0.320, 0.388],
    [0.987, 0.535, 0.382],
    [0.996, 0.759, 0.524],
    [0.987, 0.991, 0.750],
];

impl ColorMap {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "magma" => Some(Self::Magma),
            "gray" | "grey" => Some(Self::Gray),
            _ => None,
        }
    }

    pub fn rgb(self, t: f32) -> [u8; 3] {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        match self {
            Self::Gray => {
                let v = to_u8(t);
                [v, v, v]
            }
            Self::Magma => {
                let scaled = t * (MAGMA_STOPS.len() - 1) as f32;
                let i = (scaled.floor() as usize).min(MAGMA_STOPS.len() - 2);
                let frac = scaled - i as f32;
                let (a, b) = (MAGMA_STOPS[i], MAGMA_STOPS[i + 1]);
                [
                    to_u8(a[0] + (b[0] - a[0]) * frac),
                    to_u8(a[1] + (b[1] - a[1]) * frac),
                    to_u8(a[2] + (b[2] - a[2]) * frac),
                ]
            }
        }
    }
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gray_endpoints() {
        assert_eq!(ColorMap::Gray.rgb(0.0), [0, 0, 0]);
        assert_eq!(ColorMap::Gray.rgb(1.0), [255, 255, 255]);
        assert_eq!(ColorMap::Gray.rgb(2.0), [255, 255, 255]);
        assert_eq!(ColorMap::Gray.rgb(f32::NAN), [0, 0, 0]);
    }

    #[test]
    fn test_magma_is_dark_to_bright() {
        let lo = ColorMap::Magma.rgb(0.0);
        let hi = ColorMap::Magma.rgb(1.0);
        assert_eq!(lo, [0, 0, 4]);
        assert_eq!(hi, [252, 253, 191]);

        let luminance = |c: [u8; 3]| c[0] as u32 * 3 + c[1] as u32 * 6 + c[2] as u32;
        let mut previous = 0;
        for step in 0..=20 {
            let l = luminance(ColorMap::Magma.rgb(step as f32 / 20.0));
            assert!(l >= previous, "luminance dropped at step {step}");
            previous = l;
        }
    }

    #[test]
    fn test_from_name() {
        assert_eq!(ColorMap::from_name("Magma"), Some(ColorMap::Magma));
        assert_eq!(ColorMap::from_name("grey"), Some(ColorMap::Gray));
        assert_eq!(ColorMap::from_name("jet"), None);
    }
}
