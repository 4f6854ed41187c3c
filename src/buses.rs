use crate::load::coerce_numeric;
use crate::topology::strip_phase_suffix;
use anyhow::{format_err, Context, Result};
use csv::StringRecord;
use log::{debug, info};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const BUS_COL: &str = "bus";
pub const LAT_COL: &str = "x";
pub const LON_COL: &str = "y";
pub const KV_BASE_COL: &str = "kvBase";
pub const HAS_PV_COL: &str = "has_pv";

/// Default phase voltage column.
pub const PU_A: &str = "pu_a";

/// Half-width given to an axis whose coordinates are all equal.
const FLAT_HALF_SPAN: f64 = 1e-3;

/// Bus snapshot joined from the voltage results table. Numeric fields are
/// `None` where the cell was blank or not a number.
#[derive(Debug, Clone, PartialEq)]
pub struct BusRecord {
    /// Bus name without phase suffix.
    pub bus: String,

    /// Latitude (the `x` column).
    pub lat: Option<f64>,

    /// Longitude (the `y` column).
    pub lon: Option<f64>,

    /// Nominal voltage class (kV).
    pub kv_base: Option<f64>,

    /// Voltage magnitude of the selected phase (p.u.).
    pub pu: Option<f64>,

    /// Distributed (PV) generation present at the bus.
    pub has_pv: bool,
}

impl BusRecord {
    /// Plot position (lon, lat), if both coordinates are known.
    pub fn pos(&self) -> Option<(f64, f64)> {
        self.lon.zip(self.lat)
    }
}

/// Axis bounds in plot coordinates: longitude along x, latitude along y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Extent {
    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Grows the narrower axis about its centre so that one data unit spans
    /// the same number of pixels along both axes of a `width` x `height` area.
    pub fn with_equal_aspect(&self, width: u32, height: u32) -> Extent {
        if width == 0 || height == 0 {
            return *self;
        }
        let (w, h) = (self.width(), self.height());
        let target = width as f64 / height as f64;
        if w <= 0.0 || h <= 0.0 {
            return *self;
        }

        let mut ext = *self;
        if w / h < target {
            let grow = (h * target - w) / 2.0;
            ext.x_min -= grow;
            ext.x_max += grow;
        } else {
            let grow = (w / target - h) / 2.0;
            ext.y_min -= grow;
            ext.y_max += grow;
        }
        ext
    }
}

pub struct BusTable {
    pub phase: String,
    pub rows: Vec<BusRecord>,
    pv_column: bool,
}

impl BusTable {
    pub fn new(phase: impl Into<String>, rows: Vec<BusRecord>, pv_column: bool) -> Self {
        Self {
            phase: phase.into(),
            rows,
            pv_column,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether the source table carried a `has_pv` column.
    pub fn has_pv_column(&self) -> bool {
        self.pv_column
    }

    /// Position of the first row for each bus name. The position is `None`
    /// when that row lacks a coordinate.
    pub fn positions(&self) -> HashMap<&str, Option<(f64, f64)>> {
        let mut positions = HashMap::with_capacity(self.rows.len());
        for r in &self.rows {
            positions.entry(r.bus.as_str()).or_insert_with(|| r.pos());
        }
        positions
    }

    /// Observed minimum and maximum of the phase voltage column, ignoring
    /// missing values.
    pub fn voltage_bounds(&self) -> Result<(f64, f64)> {
        let mut values = self.rows.iter().filter_map(|r| r.pu).peekable();
        if values.peek().is_none() {
            return Err(format_err!("no {} values in bus table", self.phase));
        }
        Ok(values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        }))
    }

    /// Splits rows into buses above `threshold` kV and those at or below it.
    /// Rows without a base voltage fall in neither group.
    pub fn split_by_kv(&self, threshold: f64) -> (Vec<&BusRecord>, Vec<&BusRecord>) {
        let hv = self
            .rows
            .iter()
            .filter(|r| r.kv_base.is_some_and(|kv| kv > threshold))
            .collect();
        let lv = self
            .rows
            .iter()
            .filter(|r| r.kv_base.is_some_and(|kv| kv <= threshold))
            .collect();
        (hv, lv)
    }

    pub fn pv_buses(&self) -> Vec<&BusRecord> {
        self.rows.iter().filter(|r| r.has_pv).collect()
    }

    /// Coordinate bounds padded by `pad` times the range on every side.
    /// Rows without both coordinates are ignored.
    pub fn extent(&self, pad: f64) -> Result<Extent> {
        let mut ext = Extent {
            x_min: f64::INFINITY,
            x_max: f64::NEG_INFINITY,
            y_min: f64::INFINITY,
            y_max: f64::NEG_INFINITY,
        };
        let mut found = false;
        for (lon, lat) in self.rows.iter().filter_map(BusRecord::pos) {
            ext.x_min = ext.x_min.min(lon);
            ext.x_max = ext.x_max.max(lon);
            ext.y_min = ext.y_min.min(lat);
            ext.y_max = ext.y_max.max(lat);
            found = true;
        }
        if !found {
            return Err(format_err!("no bus coordinates in bus table"));
        }
        if ext.width() <= 0.0 {
            ext.x_min -= FLAT_HALF_SPAN;
            ext.x_max += FLAT_HALF_SPAN;
        }
        if ext.height() <= 0.0 {
            ext.y_min -= FLAT_HALF_SPAN;
            ext.y_max += FLAT_HALF_SPAN;
        }
        let x_pad = ext.width() * pad;
        let y_pad = ext.height() * pad;
        ext.x_min -= x_pad;
        ext.x_max += x_pad;
        ext.y_min -= y_pad;
        ext.y_max += y_pad;
        Ok(ext)
    }
}

fn column(headers: &StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| format_err!("missing column: {}", name))
}

fn numeric(record: &StringRecord, idx: usize) -> Option<f64> {
    record.get(idx).and_then(coerce_numeric)
}

fn parse_flag(cell: &str) -> bool {
    matches!(
        cell.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

/// Reads the bus voltage table, selecting the `phase` column as the
/// voltage to plot.
pub fn read_bus_table<R: Read>(reader: R, phase: &str) -> Result<BusTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();

    let bus_idx = column(&headers, BUS_COL)?;
    let lat_idx = column(&headers, LAT_COL)?;
    let lon_idx = column(&headers, LON_COL)?;
    let kv_idx = column(&headers, KV_BASE_COL)?;
    let pu_idx = column(&headers, phase)?;
    let pv_idx = column(&headers, HAS_PV_COL).ok();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let bus = record.get(bus_idx).unwrap_or("").trim();
        rows.push(BusRecord {
            bus: strip_phase_suffix(bus).to_string(),
            lat: numeric(&record, lat_idx),
            lon: numeric(&record, lon_idx),
            kv_base: numeric(&record, kv_idx),
            pu: numeric(&record, pu_idx),
            has_pv: pv_idx
                .and_then(|idx| record.get(idx))
                .map(parse_flag)
                .unwrap_or(false),
        });
    }
    debug!(
        "bus table: {} rows, {} without {}, pv column {}",
        rows.len(),
        rows.iter().filter(|r| r.pu.is_none()).count(),
        phase,
        pv_idx.is_some()
    );

    Ok(BusTable::new(phase, rows, pv_idx.is_some()))
}

pub fn load_bus_table(path: &Path, phase: &str) -> Result<BusTable> {
    let file =
        File::open(path).with_context(|| format!("unable to open {}", path.display()))?;
    let table =
        read_bus_table(file, phase).with_context(|| format!("unable to read {}", path.display()))?;
    info!("Loaded {} buses from {}", table.len(), path.display());
    Ok(table)
}
