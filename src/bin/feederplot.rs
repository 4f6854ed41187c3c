use anyhow::{Context, Result};
use chrono::{Duration, NaiveDateTime};
use clap::{Args, Parser, Subcommand};
use feederplot::{
    load_bus_table, load_line_segments, load_load_table, render_feeder_map, render_load_plot,
    LoadPlotOptionsBuilder, LoadProfile, MapOptionsBuilder, Substation, DEFAULT_STEP_MINUTES, PU_A,
};
use log::warn;
use std::fs;
use std::path::{Path, PathBuf};

/// Feeder voltage maps and load plots from distribution simulation results.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feeder voltage map
    Map(MapArgs),

    /// Aggregate load time series
    Load(LoadArgs),
}

#[derive(Args)]
struct MapArgs {
    /// Circuit-description file with line definitions.
    #[arg(long, default_value = "raw_data/Lines.dss")]
    lines: PathBuf,

    /// Bus voltage table.
    #[arg(long, default_value = "results/voltage_timeseries.csv")]
    voltages: PathBuf,

    /// Voltage column to plot.
    #[arg(long, default_value = PU_A)]
    phase: String,

    /// Figure title.
    #[arg(long, default_value = "Distribution Feeder Voltage Map - Phase A")]
    title: String,

    /// Output image.
    #[arg(short, long, default_value = "plots/phase_a.png")]
    output: PathBuf,

    /// Output resolution in dots per inch.
    #[arg(long, default_value_t = 300.0)]
    dpi: f64,

    /// Substation latitude.
    #[arg(long, allow_hyphen_values = true)]
    sub_lat: Option<f64>,

    /// Substation longitude.
    #[arg(long, allow_hyphen_values = true)]
    sub_lon: Option<f64>,

    /// Only write the image; do not open it in a viewer.
    #[arg(long)]
    no_show: bool,
}

#[derive(Args)]
struct LoadArgs {
    /// Load table with a leading index column.
    #[arg(short, long, default_value = "raw_data/load_timeseries_data.csv")]
    input: PathBuf,

    /// Chart title.
    #[arg(long, default_value = "Total District Power Draw")]
    title: String,

    /// Output image.
    #[arg(short, long, default_value = "plots/total_load.png")]
    output: PathBuf,

    /// Timestamp of the first row.
    #[arg(long, default_value = "2023-01-01 00:00", value_parser = parse_start)]
    start: NaiveDateTime,

    /// Minutes between rows.
    #[arg(long, default_value_t = DEFAULT_STEP_MINUTES)]
    step_minutes: i64,

    /// Only write the image; do not open it in a viewer.
    #[arg(long)]
    no_show: bool,
}

fn parse_start(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
}

fn main() {
    env_logger::Builder::from_default_env()
        .format_level(false)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    match execute(&cli) {
        Ok(_) => {
            std::process::exit(0);
        }
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::exit(2);
        }
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("unable to create {}", dir.display()))?;
    }
    Ok(())
}

/// Opens a saved image in the system viewer. A missing viewer is not an
/// error since the image is already on disk.
fn show(path: &Path, no_show: bool) {
    if no_show {
        return;
    }
    if let Err(err) = opener::open(path) {
        warn!("unable to open {}: {}", path.display(), err);
    }
}

fn execute(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Map(args) => {
            let segments = load_line_segments(&args.lines)?;
            let table = load_bus_table(&args.voltages, &args.phase)?;

            let mut substation = Substation::default();
            if let Some(lat) = args.sub_lat {
                substation.lat = lat;
            }
            if let Some(lon) = args.sub_lon {
                substation.lon = lon;
            }

            let opts = MapOptionsBuilder::default()
                .title(args.title.as_str())
                .dpi(args.dpi)
                .substation(substation)
                .build()?;

            create_parent(&args.output)?;
            render_feeder_map(&table, &segments, &args.output, &opts)?;
            show(&args.output, args.no_show);
            Ok(())
        }
        Commands::Load(args) => {
            let table = load_load_table(&args.input)?;
            let profile =
                LoadProfile::from_table(&table, args.start, Duration::minutes(args.step_minutes));

            let opts = LoadPlotOptionsBuilder::default()
                .title(args.title.as_str())
                .build()?;

            create_parent(&args.output)?;
            render_load_plot(&profile, &args.output, &opts)?;
            show(&args.output, args.no_show);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_load_flags() -> Result<()> {
        let cli = Cli::try_parse_from(["feederplot", "load", "--title", "Feeder 7", "--no-show"])?;
        let Commands::Load(args) = cli.command else {
            panic!("expected load command");
        };
        assert_eq!(args.title, "Feeder 7");
        assert!(args.no_show);
        assert_eq!(args.step_minutes, 15);
        Ok(())
    }

    #[test]
    fn test_map_shows_by_default() -> Result<()> {
        let cli = Cli::try_parse_from(["feederplot", "map", "--sub-lon", "-82.8"])?;
        let Commands::Map(args) = cli.command else {
            panic!("expected map command");
        };
        assert!(!args.no_show);
        assert_eq!(args.sub_lon, Some(-82.8));
        assert_eq!(args.output, PathBuf::from("plots/phase_a.png"));
        Ok(())
    }
}
