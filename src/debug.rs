use pretty_dtoa::{dtoa, FmtFloatConfig};

const FLOAT_CONFIG: FmtFloatConfig = FmtFloatConfig::default()
    .add_point_zero(false)
    .max_significant_digits(9);

pub fn format_f64(v: f64) -> String {
    dtoa(v, FLOAT_CONFIG)
}

pub fn format_range(lo: f64, hi: f64) -> String {
    format!("[{}, {}]", format_f64(lo), format_f64(hi))
}
