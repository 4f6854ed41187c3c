use plotters::style::RGBColor;

/// Sequential blues, light to dark (ColorBrewer "Blues").
const BLUES: [[u8; 3]; 9] = [
    [0xf7, 0xfb, 0xff],
    [0xde, 0xeb, 0xf7],
    [0xc6, 0xdb, 0xef],
    [0x9e, 0xca, 0xe1],
    [0x6b, 0xae, 0xd6],
    [0x42, 0x92, 0xc6],
    [0x21, 0x71, 0xb5],
    [0x08, 0x51, 0x9c],
    [0x08, 0x30, 0x6b],
];

/// Continuous color scale for per-unit voltages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageScale {
    pub vmin: f64,
    pub vmax: f64,
}

impl VoltageScale {
    pub fn new(vmin: f64, vmax: f64) -> Self {
        Self { vmin, vmax }
    }

    /// Position of `v` on the scale in [0, 1].
    pub fn normalize(&self, v: f64) -> f64 {
        if !(self.vmax > self.vmin) {
            return 0.5;
        }
        ((v - self.vmin) / (self.vmax - self.vmin)).clamp(0.0, 1.0)
    }

    pub fn color(&self, v: f64) -> RGBColor {
        interpolate(&BLUES, self.normalize(v))
    }
}

fn lerp(a: u8, b: u8, t: f64) -> u8 {
    (a as f64 + (b as f64 - a as f64) * t).round() as u8
}

fn interpolate(stops: &[[u8; 3]], t: f64) -> RGBColor {
    let n = stops.len() - 1;
    let pos = t * n as f64;
    let i = (pos.floor() as usize).min(n - 1);
    let f = pos - i as f64;
    let (a, b) = (stops[i], stops[i + 1]);
    RGBColor(lerp(a[0], b[0], f), lerp(a[1], b[1], f), lerp(a[2], b[2], f))
}
