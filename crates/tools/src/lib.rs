//! `vsource`: load a JSON record file into a vector store and inspect it
//! offline (time bounds, animation windows, area selections).

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::{Parser, Subcommand};
use foundation::bounds::Extent;
use foundation::time::TimeRange;
use geometry::Geometry;
use layers::{
    FeatureLimit, LayerId, SourceConfig, SourceContext, SourceError, SourceEvent, VectorSource,
    decode_records,
};
use runtime::ManualClock;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("encode output: {0}")]
    Output(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Offline inspection of vector record files")]
pub struct Cli {
    /// Store config (JSON); missing fields take their defaults
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Layer settings to restore (JSON, persisted-key format)
    #[arg(long, global = true)]
    pub layer: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `layers=trace`; overrides RUST_LOG
    #[arg(long, global = true)]
    pub log: Option<String>,

    /// Feature cap shared by the store
    #[arg(long, global = true, default_value_t = layers::DEFAULT_FEATURE_CAP)]
    pub cap: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest records and report counts and time bounds; with `--window`,
    /// step the animation through each window in order
    Replay {
        records: PathBuf,

        /// Display window `start,end` (ms); repeat to animate
        #[arg(long = "window", value_parser = parse_window)]
        windows: Vec<TimeRange>,

        /// Fade records in look-ahead bands
        #[arg(long)]
        fade: bool,
    },

    /// Select records inside an area
    Select {
        records: PathBuf,

        /// Box `minLon,minLat,maxLon,maxLat`
        #[arg(long, value_parser = parse_extent, conflicts_with = "circle")]
        bbox: Option<Extent>,

        /// Circle `lon,lat,radius` (degrees)
        #[arg(long, value_parser = parse_circle)]
        circle: Option<[f64; 3]>,
    },
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ReplayReport {
    pub admitted: usize,
    pub dropped: usize,
    pub degraded: u64,
    pub time_start: f64,
    pub time_end: f64,
    pub columns: Vec<String>,
    pub frames: Vec<FrameReport>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct FrameReport {
    pub start: f64,
    pub end: f64,
    pub visible: usize,
    pub faded: usize,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct SelectReport {
    pub candidates: usize,
    pub selected: Vec<foundation::ids::RecordId>,
}

fn numbers(s: &str, n: usize) -> Result<Vec<f64>, String> {
    let values = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("{p:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    if values.len() != n {
        return Err(format!("expected {n} comma-separated numbers, got {}", values.len()));
    }
    Ok(values)
}

fn parse_window(s: &str) -> Result<TimeRange, String> {
    let v = numbers(s, 2)?;
    Ok(TimeRange::new(v[0], v[1]))
}

fn parse_extent(s: &str) -> Result<Extent, String> {
    let v = numbers(s, 4)?;
    Ok(Extent::new([v[0], v[1]], [v[2], v[3]]))
}

fn parse_circle(s: &str) -> Result<[f64; 3], String> {
    let v = numbers(s, 3)?;
    Ok([v[0], v[1], v[2]])
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ToolError> {
    let text = fs::read_to_string(path).map_err(|source| ToolError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ToolError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Builds a store from the global options and loads `records` into it.
fn load(cli: &Cli, records: &Path) -> Result<(VectorSource, usize), ToolError> {
    let config: SourceConfig = match &cli.config {
        Some(path) => read_json(path)?,
        None => SourceConfig::default(),
    };
    let ctx = SourceContext::new(
        Rc::new(FeatureLimit::new(cli.cap)),
        Rc::new(ManualClock::new(0)),
    );
    let mut source = VectorSource::new(LayerId(1), config, Rc::new(ctx));
    if let Some(path) = &cli.layer {
        let layer: serde_json::Value = read_json(path)?;
        source.restore(&layer)?;
    }

    let text = fs::read_to_string(records).map_err(|source| ToolError::Io {
        path: records.to_path_buf(),
        source,
    })?;
    let decoded = decode_records(&text)?;
    let total = decoded.len();

    source.begin_batch();
    let admitted = source.add_records(decoded);
    source.commit_batch();
    tracing::info!(records = total, admitted, "records loaded");
    Ok((source, total - admitted))
}

pub fn replay(
    cli: &Cli,
    records: &Path,
    windows: &[TimeRange],
    fade: bool,
) -> Result<ReplayReport, ToolError> {
    let (mut source, dropped) = load(cli, records)?;
    let span = source.time_range();

    let mut frames = Vec::with_capacity(windows.len());
    if !windows.is_empty() {
        source.set_fade_enabled(fade);
        source.set_animation_enabled(true);
        source.set_playing(true);
        for window in windows {
            source.set_display_range(*window);
            let visible = source.animation_visible();
            frames.push(FrameReport {
                start: window.start,
                end: window.end,
                visible: visible.len(),
                faded: visible.iter().filter(|(_, o)| *o < 1.0).count(),
            });
        }
    }

    Ok(ReplayReport {
        admitted: source.len(),
        dropped,
        degraded: source.metrics().counter("records.degraded"),
        time_start: span.start.0,
        time_end: span.end.0,
        columns: source.columns().iter().cloned().collect(),
        frames,
    })
}

pub fn select(
    cli: &Cli,
    records: &Path,
    bbox: Option<Extent>,
    circle: Option<[f64; 3]>,
) -> Result<SelectReport, ToolError> {
    let (mut source, _) = load(cli, records)?;

    let area = match (bbox, circle) {
        (_, Some([lon, lat, radius])) => Geometry::circle([lon, lat], radius, 64),
        (Some(extent), None) => Geometry::rectangle(&extent),
        (None, None) => Geometry::rectangle(&Extent::new([-180.0, -90.0], [180.0, 90.0])),
    };

    let unsupported = Rc::new(std::cell::Cell::new(false));
    let flag = Rc::clone(&unsupported);
    source.listen(move |e| {
        if matches!(e, SourceEvent::ShapeUnsupported { .. }) {
            flag.set(true);
        }
    });

    let candidates = source.features_in_extent(&area.extent()).len();
    source.select_in_geometry(&area);
    if unsupported.get() {
        tracing::warn!(kind = area.type_name(), "area shape not supported");
    }
    Ok(SelectReport {
        candidates,
        selected: source.selected_ids(),
    })
}

/// Runs a parsed command and returns its JSON report.
pub fn run(cli: &Cli) -> Result<String, ToolError> {
    let out = match &cli.command {
        Command::Replay {
            records,
            windows,
            fade,
        } => serde_json::to_string_pretty(&replay(cli, records, windows, *fade)?)?,
        Command::Select {
            records,
            bbox,
            circle,
        } => serde_json::to_string_pretty(&select(cli, records, *bbox, *circle)?)?,
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{Cli, ToolError, run};
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn fixture(name: &str, body: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vsource-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("tmp dir");
        let path = dir.join("records.json");
        std::fs::write(&path, body).expect("write fixture");
        path
    }

    const RECORDS: &str = r#"[
        {"id": 1, "geometry": {"type": "Point", "coordinates": [1, 1]},
         "time": {"start": 10, "end": 10}},
        {"id": 2, "geometry": {"type": "Point", "coordinates": [2, 2]},
         "time": {"start": 20, "end": 20}},
        {"id": "x", "geometry": {"type": "Point", "coordinates": [8, 8]},
         "attributes": {"kind": "buoy"}}
    ]"#;

    #[test]
    fn replay_reports_bounds_and_frames() {
        let path = fixture("replay", RECORDS);
        let cli = Cli::parse_from([
            "vsource",
            "replay",
            path.to_str().expect("utf8"),
            "--window",
            "0,15",
            "--window",
            "15,25",
            "--fade",
        ]);
        let out: serde_json::Value = serde_json::from_str(&run(&cli).expect("run")).expect("json");
        assert_eq!(out["admitted"], 3);
        assert_eq!(out["time_start"], 10.0);
        assert_eq!(out["time_end"], 20.0);
        assert_eq!(out["frames"][0]["visible"], 2);
        assert_eq!(out["frames"][1]["visible"], 3);
        assert_eq!(out["frames"][1]["faded"], 1);
        assert_eq!(out["columns"], serde_json::json!(["LAT", "LON", "kind"]));
    }

    #[test]
    fn select_by_box_and_cap() {
        let path = fixture("select", RECORDS);
        let p = path.to_str().expect("utf8");
        let cli = Cli::parse_from(["vsource", "select", p, "--bbox", "0,0,3,3"]);
        let out: serde_json::Value = serde_json::from_str(&run(&cli).expect("run")).expect("json");
        assert_eq!(out["selected"], serde_json::json!([1, 2]));

        let capped = Cli::parse_from(["vsource", "--cap", "1", "select", p]);
        let out: serde_json::Value =
            serde_json::from_str(&run(&capped).expect("run")).expect("json");
        assert_eq!(out["selected"], serde_json::json!([1]));
    }

    #[test]
    fn bad_arguments_and_files_are_errors() {
        assert!(Cli::try_parse_from(["vsource", "select", "r.json", "--bbox", "1,2"]).is_err());

        let cli = Cli::parse_from(["vsource", "replay", "/nonexistent/records.json"]);
        assert!(matches!(run(&cli), Err(ToolError::Io { .. })));

        let path = fixture("bad", "{not json");
        let cli = Cli::parse_from(["vsource", "replay", path.to_str().expect("utf8")]);
        assert!(matches!(run(&cli), Err(ToolError::Source(_))));
    }
}
