use crate::debug::format_f64;
use crate::load::LoadProfile;
use anyhow::{format_err, Result};
use chrono::{Duration, NaiveDateTime};
use derive_builder::Builder;
use log::info;
use plotters::coord::types::RangedDateTime;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::Path;

const LINE_COLOR: RGBColor = RGBColor(0x46, 0x82, 0xb4); // steelblue

#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct LoadPlotOptions {
    #[builder(setter(into))]
    pub title: String,

    #[builder(setter(into))]
    pub x_desc: String,

    #[builder(setter(into))]
    pub y_desc: String,

    /// Image width and height (pixels).
    pub size: (u32, u32),
}

impl Default for LoadPlotOptions {
    fn default() -> Self {
        Self {
            title: "Total District Power Draw".to_string(),
            x_desc: "Time".to_string(),
            y_desc: "Power (kW)".to_string(),
            // 7 x 5 in at 100 dpi
            size: (700, 500),
        }
    }
}

/// Time and power ranges for the chart axes.
pub(crate) fn axis_ranges(
    profile: &LoadProfile,
) -> Result<((NaiveDateTime, NaiveDateTime), (f64, f64))> {
    let (Some(&start), Some(&end)) = (profile.timestamps.first(), profile.timestamps.last())
    else {
        return Err(format_err!("load profile is empty"));
    };
    let end = if end > start {
        end
    } else {
        start + Duration::minutes(1)
    };

    let lo = profile.total.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = profile
        .total
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let margin = if hi > lo { (hi - lo) * 0.05 } else { 1.0 };

    Ok(((start, end), (lo - margin, hi + margin)))
}

/// Renders the aggregate load line chart to a PNG file at `path`.
pub fn render_load_plot(profile: &LoadProfile, path: &Path, opts: &LoadPlotOptions) -> Result<()> {
    let root = BitMapBackend::new(path, opts.size).into_drawing_area();
    draw_load_plot(&root, profile, opts)?;
    root.present()?;

    if let Some((t, p)) = profile.peak() {
        info!("Peak total load {} kW at {}", format_f64(p), t);
    }
    info!("Saved plot to {}", path.display());
    Ok(())
}

pub fn draw_load_plot<DB>(
    root: &DrawingArea<DB, Shift>,
    profile: &LoadProfile,
    opts: &LoadPlotOptions,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let ((start, end), (lo, hi)) = axis_ranges(profile)?;

    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(root)
        .caption(&opts.title, ("sans-serif", 18).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(RangedDateTime::from(start..end), lo..hi)?;

    chart
        .configure_mesh()
        .x_desc(opts.x_desc.as_str())
        .y_desc(opts.y_desc.as_str())
        .x_labels(6)
        .x_label_formatter(&|t| t.format("%m-%d %H:%M").to_string())
        .y_label_formatter(&|v| format!("{:.0}", v))
        .draw()?;

    chart.draw_series(LineSeries::new(
        profile
            .timestamps
            .iter()
            .copied()
            .zip(profile.total.iter().copied()),
        LINE_COLOR.stroke_width(2),
    ))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::load::{default_start, load_load_table, time_index};
    use std::env;

    #[test]
    fn test_axis_ranges() -> Result<()> {
        let profile = LoadProfile {
            timestamps: crate::load::time_index(default_start(), 3, Duration::minutes(15)),
            total: vec![10.0, 30.0, 20.0],
        };
        let ((start, end), (lo, hi)) = axis_ranges(&profile)?;
        assert_eq!(start, default_start());
        assert_eq!(end, default_start() + Duration::minutes(30));
        assert!((lo - 9.0).abs() < 1e-9);
        assert!((hi - 31.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_single_sample() -> Result<()> {
        let profile = LoadProfile {
            timestamps: vec![default_start()],
            total: vec![5.0],
        };
        let ((start, end), (lo, hi)) = axis_ranges(&profile)?;
        assert!(end > start);
        assert_eq!((lo, hi), (4.0, 6.0));
        Ok(())
    }

    #[test]
    fn test_empty_profile() {
        let profile = LoadProfile {
            timestamps: vec![],
            total: vec![],
        };
        assert!(axis_ranges(&profile).is_err());
    }

    #[test]
    fn test_options_builder() -> Result<()> {
        let opts = LoadPlotOptionsBuilder::default()
            .title("Feeder 7 Load")
            .size((350, 250))
            .build()?;
        assert_eq!(opts.title, "Feeder 7 Load");
        assert_eq!(opts.x_desc, "Time");
        assert_eq!(opts.y_desc, "Power (kW)");
        assert_eq!(opts.size, (350, 250));
        assert_eq!(LoadPlotOptions::default().size, (700, 500));
        Ok(())
    }

    #[test]
    fn test_draw_fixture_profile() -> Result<()> {
        let manifest_dir = env::var("CARGO_MANIFEST_DIR")?;
        let path = Path::new(&manifest_dir)
            .join("testdata")
            .join("load_timeseries_data.csv");
        let table = load_load_table(&path)?;
        let profile = LoadProfile::from_table(&table, default_start(), Duration::minutes(15));

        let opts = LoadPlotOptions::default();
        let canvas = Canvas::new(opts.size);
        let sketch = canvas.sketch();
        let root = canvas.into_drawing_area();
        draw_load_plot(&root, &profile, &opts)?;
        root.present()?;

        let sketch = sketch.borrow();
        assert!(sketch.presented);
        assert!(sketch.inked > 0);
        assert!(sketch.has_text("Total District Power Draw"));
        assert!(sketch.has_text("Time"));
        assert!(sketch.has_text("Power (kW)"));
        Ok(())
    }

    #[test]
    fn test_draw_bitmap() -> Result<()> {
        let profile = LoadProfile {
            timestamps: time_index(default_start(), 4, Duration::minutes(15)),
            total: vec![36.0, 17.0, 18.5, 28.0],
        };
        let (w, h) = (350, 250);
        let mut buf = vec![0u8; (w * h * 3) as usize];
        {
            let root = BitMapBackend::with_buffer(&mut buf, (w, h)).into_drawing_area();
            draw_load_plot(&root, &profile, &LoadPlotOptions::default())?;
            root.present()?;
        }
        assert!(buf.iter().any(|&b| b != 255));
        Ok(())
    }

    #[test]
    fn test_draw_single_sample() -> Result<()> {
        let profile = LoadProfile {
            timestamps: time_index(default_start(), 1, Duration::minutes(15)),
            total: vec![42.0],
        };
        let canvas = Canvas::new((350, 250));
        let sketch = canvas.sketch();
        draw_load_plot(
            &canvas.into_drawing_area(),
            &profile,
            &LoadPlotOptions::default(),
        )?;
        assert!(sketch.borrow().inked > 0);
        Ok(())
    }
}
