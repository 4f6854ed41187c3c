use crate::buses::{BusRecord, BusTable, Extent};
use crate::colormap::VoltageScale;
use crate::debug::format_range;
use crate::topology::LineSegment;
use anyhow::Result;
use derive_builder::Builder;
use log::{debug, info};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::colors::TRANSPARENT;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use std::f64::consts::PI;
use std::path::Path;

/// Lower and upper regulatory voltage limits (p.u.).
pub const VOLTAGE_LIMITS: [f64; 2] = [0.95, 1.05];

const HV_LABEL: &str = "12.47 kV Bus";
const LV_LABEL: &str = "480 V Bus";
const PV_LABEL: &str = "Solar PV Bus";

const LINE_COLOR: RGBColor = RGBColor(0x00, 0x00, 0x00);
const HV_EDGE: RGBColor = RGBColor(0x2c, 0x3e, 0x50);
const LV_EDGE: RGBColor = RGBColor(0x34, 0x49, 0x5e);
const PV_RING: RGBColor = RGBColor(0xff, 0x8c, 0x00);
const SUB_FILL: RGBColor = RGBColor(0xe7, 0x4c, 0x3c);
const SUB_EDGE: RGBColor = RGBColor(0xc0, 0x39, 0x2b);
const LIMIT_COLOR: RGBColor = RGBColor(0xe7, 0x4c, 0x3c);
const LEGEND_EDGE: RGBColor = RGBColor(0x7f, 0x8c, 0x8d);

/// Marker areas in square points.
const HV_AREA: f64 = 85.0;
const LV_AREA: f64 = 70.0;
const PV_AREA: f64 = 140.0;
const SUB_AREA: f64 = 250.0;

/// Substation marker location.
#[derive(Debug, Clone, PartialEq)]
pub struct Substation {
    pub lat: f64,
    pub lon: f64,
}

impl Default for Substation {
    fn default() -> Self {
        Self {
            lat: 34.67381297784516,
            lon: -82.83387399502244,
        }
    }
}

#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct MapOptions {
    #[builder(setter(into))]
    pub title: String,

    pub substation: Substation,

    /// Figure width and height (inches).
    pub width_in: f64,
    pub height_in: f64,

    /// Output resolution (pixels per inch).
    pub dpi: f64,

    /// Buses with a base voltage above this (kV) are drawn as primary.
    pub kv_threshold: f64,

    /// Axis padding as a fraction of the coordinate range.
    pub pad: f64,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            title: "Distribution Feeder Voltage Map - Phase A".to_string(),
            substation: Substation::default(),
            width_in: 12.0,
            height_in: 9.0,
            dpi: 300.0,
            kv_threshold: 1.0,
            pad: 0.08,
        }
    }
}

impl MapOptions {
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            (self.width_in * self.dpi).round() as u32,
            (self.height_in * self.dpi).round() as u32,
        )
    }

    /// Converts a length in points to pixels at the output resolution.
    pub fn px(&self, pt: f64) -> f64 {
        pt * self.dpi / 72.0
    }
}

/// A voltage-colored bus marker at (lon, lat).
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub pos: (f64, f64),
    pub pu: f64,
}

/// Everything drawn on the map, bottom layer first.
#[derive(Debug, Clone)]
pub struct MapLayers {
    pub lines: Vec<[(f64, f64); 2]>,
    pub hv: Vec<Marker>,
    pub lv: Vec<Marker>,
    /// `None` when the table has no PV column.
    pub pv: Option<Vec<(f64, f64)>>,
    pub scale: VoltageScale,
    pub extent: Extent,
    /// Segments with an endpoint missing from the bus table or lacking
    /// coordinates.
    pub skipped: usize,
}

/// Joins the topology with the bus table and splits buses into layers.
pub fn plan_layers(
    table: &BusTable,
    segments: &[LineSegment],
    kv_threshold: f64,
    pad: f64,
) -> Result<MapLayers> {
    let (vmin, vmax) = table.voltage_bounds()?;
    let extent = table.extent(pad)?;

    let positions = table.positions();
    let lookup = |bus: &str| positions.get(bus).copied().flatten();

    let mut lines = Vec::with_capacity(segments.len());
    let mut skipped = 0;
    for seg in segments {
        match (lookup(&seg.bus1), lookup(&seg.bus2)) {
            (Some(a), Some(b)) => lines.push([a, b]),
            _ => skipped += 1,
        }
    }

    // buses without a voltage reading or a position get no marker
    let markers = |rows: Vec<&BusRecord>| -> Vec<Marker> {
        rows.into_iter()
            .filter_map(|r| Some(Marker { pos: r.pos()?, pu: r.pu? }))
            .collect()
    };
    let (hv, lv) = table.split_by_kv(kv_threshold);

    let pv = if table.has_pv_column() {
        Some(table.pv_buses().iter().filter_map(|r| r.pos()).collect())
    } else {
        None
    };

    Ok(MapLayers {
        lines,
        hv: markers(hv),
        lv: markers(lv),
        pv,
        scale: VoltageScale::new(vmin, vmax),
        extent,
        skipped,
    })
}

/// Radius in pixels of a marker with the given area in square points.
fn marker_radius(area: f64, opts: &MapOptions) -> f64 {
    opts.px(area.sqrt() / 2.0)
}

fn triangle(r: f64) -> Vec<(i32, i32)> {
    (0..3)
        .map(|k| {
            let a = -PI / 2.0 + k as f64 * 2.0 * PI / 3.0;
            ((r * a.cos()).round() as i32, (r * a.sin()).round() as i32)
        })
        .collect()
}

fn star(r: f64) -> Vec<(i32, i32)> {
    let inner = r * 0.4;
    (0..10)
        .map(|k| {
            let a = -PI / 2.0 + k as f64 * PI / 5.0;
            let rk = if k % 2 == 0 { r } else { inner };
            ((rk * a.cos()).round() as i32, (rk * a.sin()).round() as i32)
        })
        .collect()
}

fn closed(points: &[(i32, i32)]) -> Vec<(i32, i32)> {
    let mut path = points.to_vec();
    if let Some(&first) = points.first() {
        path.push(first);
    }
    path
}

/// Range drawn on the color bar; widened when all voltages are equal.
fn colorbar_range(scale: &VoltageScale) -> (f64, f64) {
    if scale.vmax > scale.vmin {
        (scale.vmin, scale.vmax)
    } else {
        (scale.vmin - 0.01, scale.vmax + 0.01)
    }
}

/// Decimals needed for color-bar ticks over `lo..hi` to stay distinct.
fn tick_precision(lo: f64, hi: f64) -> usize {
    let step = (hi - lo) / 10.0;
    if step.is_nan() || step <= 0.0 {
        return 2;
    }
    (-step.log10()).ceil().clamp(2.0, 6.0) as usize
}

fn font(opts: &MapOptions, pt: f64, style: FontStyle) -> FontDesc<'static> {
    FontDesc::new(FontFamily::SansSerif, opts.px(pt), style)
}

/// Renders the feeder voltage map to a PNG file at `path`.
pub fn render_feeder_map(
    table: &BusTable,
    segments: &[LineSegment],
    path: &Path,
    opts: &MapOptions,
) -> Result<()> {
    let layers = plan_layers(table, segments, opts.kv_threshold, opts.pad)?;
    if layers.skipped > 0 {
        debug!(
            "{} of {} line segments have an endpoint without coordinates",
            layers.skipped,
            segments.len()
        );
    }
    debug!(
        "{} color bounds {}",
        table.phase,
        format_range(layers.scale.vmin, layers.scale.vmax)
    );

    let root = BitMapBackend::new(path, opts.pixel_size()).into_drawing_area();
    draw_feeder_map(&root, &layers, opts)?;
    root.present()?;

    info!("Saved plot to {}", path.display());
    Ok(())
}

pub fn draw_feeder_map<DB>(
    root: &DrawingArea<DB, Shift>,
    layers: &MapLayers,
    opts: &MapOptions,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;

    let (width, _) = root.dim_in_pixel();
    let (main, bar) = root.split_horizontally((width as f64 * 0.88) as u32);

    let titled = main.titled(&opts.title, font(opts, 17.0, FontStyle::Bold))?;

    let margin = opts.px(12.0);
    let x_label_area = opts.px(42.0);
    let y_label_area = opts.px(64.0);

    let (w, h) = titled.dim_in_pixel();
    let plot_w = (w as f64 - 2.0 * margin - y_label_area).max(1.0) as u32;
    let plot_h = (h as f64 - 2.0 * margin - x_label_area).max(1.0) as u32;
    let ext = layers.extent.with_equal_aspect(plot_w, plot_h);
    debug!(
        "map extent x {} y {}",
        format_range(ext.x_min, ext.x_max),
        format_range(ext.y_min, ext.y_max)
    );

    let mut chart = ChartBuilder::on(&titled)
        .margin(margin as u32)
        .x_label_area_size(x_label_area as u32)
        .y_label_area_size(y_label_area as u32)
        .build_cartesian_2d(ext.x_min..ext.x_max, ext.y_min..ext.y_max)?;

    chart
        .configure_mesh()
        .x_desc("Longitude")
        .y_desc("Latitude")
        .axis_desc_style(font(opts, 13.0, FontStyle::Bold))
        .label_style(font(opts, 10.0, FontStyle::Normal))
        .x_label_formatter(&|v| format!("{:.3}", v))
        .y_label_formatter(&|v| format!("{:.3}", v))
        .bold_line_style(BLACK.mix(0.15))
        .light_line_style(TRANSPARENT)
        .draw()?;

    // Topology
    let line_width = opts.px(1.5).round() as u32;
    chart.draw_series(
        layers
            .lines
            .iter()
            .map(|&[a, b]| PathElement::new(vec![a, b], LINE_COLOR.stroke_width(line_width))),
    )?;

    let scale = layers.scale;

    // Primary buses
    let tri = triangle(marker_radius(HV_AREA, opts));
    let tri_edge = closed(&tri);
    let hv_edge = opts.px(0.8).round() as u32;
    chart
        .draw_series(layers.hv.iter().map(|m| {
            EmptyElement::at(m.pos)
                + Polygon::new(tri.clone(), scale.color(m.pu).mix(0.95).filled())
                + PathElement::new(tri_edge.clone(), HV_EDGE.stroke_width(hv_edge))
        }))?
        .label(HV_LABEL)
        .legend({
            let (tri, tri_edge) = (tri.clone(), tri_edge.clone());
            let fill = scale.color(scale.vmax);
            move |(x, y)| {
                EmptyElement::at((x, y))
                    + Polygon::new(tri.clone(), fill.filled())
                    + PathElement::new(tri_edge.clone(), HV_EDGE.stroke_width(hv_edge))
            }
        });

    // Secondary buses
    let lv_r = marker_radius(LV_AREA, opts).round() as i32;
    let lv_edge = opts.px(0.7).round() as u32;
    chart
        .draw_series(layers.lv.iter().map(|m| {
            EmptyElement::at(m.pos)
                + Circle::new((0, 0), lv_r, scale.color(m.pu).mix(0.95).filled())
                + Circle::new((0, 0), lv_r, LV_EDGE.stroke_width(lv_edge))
        }))?
        .label(LV_LABEL)
        .legend({
            let fill = scale.color(scale.vmax);
            move |(x, y)| {
                EmptyElement::at((x, y))
                    + Circle::new((0, 0), lv_r, fill.filled())
                    + Circle::new((0, 0), lv_r, LV_EDGE.stroke_width(lv_edge))
            }
        });

    // PV rings above the voltage markers
    let pv_r = marker_radius(PV_AREA, opts).round() as i32;
    let pv_width = opts.px(2.2).round() as u32;
    if let Some(pv) = &layers.pv {
        chart.draw_series(
            pv.iter()
                .map(|&pos| Circle::new(pos, pv_r, PV_RING.stroke_width(pv_width))),
        )?;
    }

    // Substation on top
    let sub = &opts.substation;
    let star_pts = star(marker_radius(SUB_AREA, opts));
    let star_edge = closed(&star_pts);
    let sub_width = opts.px(1.6).round() as u32;
    chart
        .draw_series(std::iter::once(
            EmptyElement::at((sub.lon, sub.lat))
                + Polygon::new(star_pts.clone(), SUB_FILL.mix(0.95).filled())
                + PathElement::new(star_edge.clone(), SUB_EDGE.stroke_width(sub_width)),
        ))?
        .label("Substation")
        .legend(move |(x, y)| {
            EmptyElement::at((x, y))
                + Polygon::new(star_pts.clone(), SUB_FILL.filled())
                + PathElement::new(star_edge.clone(), SUB_EDGE.stroke_width(sub_width))
        });

    // The rings carry no label of their own, so the PV entry goes last.
    if layers.pv.is_some() {
        chart
            .draw_series(std::iter::empty::<Circle<(f64, f64), i32>>())?
            .label(PV_LABEL)
            .legend(move |(x, y)| Circle::new((x, y), pv_r, PV_RING.stroke_width(pv_width)));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .legend_area_size(opts.px(24.0) as u32)
        .label_font(font(opts, 11.0, FontStyle::Normal))
        .background_style(WHITE.mix(0.97))
        .border_style(LEGEND_EDGE)
        .draw()?;

    // align the bar with the plotting area below the title
    let top = root.dim_in_pixel().1.saturating_sub(h) + margin as u32;
    let bottom = margin as u32 + x_label_area as u32;
    draw_colorbar(&bar, &scale, top, bottom, opts)?;

    Ok(())
}

fn draw_colorbar<DB>(
    area: &DrawingArea<DB, Shift>,
    scale: &VoltageScale,
    top: u32,
    bottom: u32,
    opts: &MapOptions,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (lo, hi) = colorbar_range(scale);
    let prec = tick_precision(lo, hi);

    let mut bar = ChartBuilder::on(area)
        .margin_top(top)
        .margin_bottom(bottom)
        .margin_left(opts.px(6.0) as u32)
        .margin_right(opts.px(6.0) as u32)
        .set_label_area_size(LabelAreaPosition::Right, opts.px(64.0) as u32)
        .build_cartesian_2d(0.0..1.0, lo..hi)?;

    bar.configure_mesh()
        .disable_mesh()
        .disable_x_axis()
        .y_desc("Voltage (per unit)")
        .axis_desc_style(font(opts, 12.0, FontStyle::Bold))
        .label_style(font(opts, 10.0, FontStyle::Normal))
        .y_label_formatter(&|v| format!("{:.*}", prec, v))
        .draw()?;

    const STEPS: usize = 256;
    let dv = (hi - lo) / STEPS as f64;
    bar.draw_series((0..STEPS).map(|i| {
        let v0 = lo + i as f64 * dv;
        Rectangle::new(
            [(0.0, v0), (1.0, v0 + dv)],
            scale.color(v0 + dv / 2.0).filled(),
        )
    }))?;

    let dash = opts.px(4.0) as u32;
    let gap = opts.px(2.5) as u32;
    let width = opts.px(1.5).round() as u32;
    for v in VOLTAGE_LIMITS.iter().copied().filter(|v| (lo..=hi).contains(v)) {
        bar.draw_series(DashedLineSeries::new(
            vec![(0.0, v), (1.0, v)],
            dash,
            gap,
            LIMIT_COLOR.mix(0.7).stroke_width(width),
        ))?;
    }

    bar.draw_series(std::iter::once(Rectangle::new(
        [(0.0, lo), (1.0, hi)],
        BLACK.stroke_width(1),
    )))?;

    Ok(())
}
