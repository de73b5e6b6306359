extern crate log;
pub mod api;
pub mod geofile;
pub mod map;
pub mod parcel;
pub mod state;
use crate::api::arcgis::{ArcGisEndpoints, ArcGisParcelApi};
use crate::api::http::{HttpParcelApi, DEFAULT_TIMEOUT_SECS};
use crate::api::ParcelApi;
use crate::geofile::gdal_geofile::{write_parcels_to_geofile, GdalDriverType};
use crate::map::geojson_map::GeoJsonFileMap;
use crate::map::MapAdapter;
use crate::parcel::region::{ParcelRecord, Region};
use crate::state::download::FileDownloadSink;
use crate::state::export::{ExportFormat, DEFAULT_FOLDER_NAME};
use crate::state::session::{NoticeLevel, SearchOutcome, Session};
use crate::state::style::{FileStyleStorage, HexColor, StylePatch, StyleStorage, StyleStore};
use anyhow::anyhow;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use std::{fs::read_to_string, path::Path};

/// Look up land parcels by lot/plan, pick the ones you need and export them as KML or shapefile.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input config file.
    #[arg(short, long)]
    config_filepath: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search parcels, then optionally select, export and map them.
    Search {
        /// File with one parcel identifier per line, `-` to read stdin.
        #[arg(short, long)]
        input: String,
        /// Result rows to select, e.g. `0,2`. Without a selection everything is exported.
        #[arg(short, long, value_delimiter = ',')]
        select: Vec<usize>,
        /// Export the chosen parcels in this format.
        #[arg(short, long, value_enum)]
        export: Option<ExportFormat>,
        /// KML folder name.
        #[arg(long, default_value = DEFAULT_FOLDER_NAME)]
        folder_name: String,
        /// Download file name, `.kml` becomes `.zip` for shapefiles.
        #[arg(long, default_value = "parcels.kml")]
        file_name: String,
        /// Write the styled results to this GeoJSON file.
        #[arg(short, long)]
        map: Option<PathBuf>,
        /// Also write the chosen parcels to this GeoPackage.
        #[arg(long)]
        gpkg: Option<PathBuf>,
    },
    /// Show the persisted style, or change it when any field is given.
    Style {
        #[arg(long)]
        fill_color: Option<HexColor>,
        #[arg(long)]
        outline_color: Option<HexColor>,
        #[arg(long)]
        fill_opacity: Option<f64>,
        #[arg(long)]
        outline_weight: Option<f64>,
    },
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum BackendConfig {
    /// A parcel service exposing `/api/search` and `/api/download/{format}`.
    Remote { base_url: String },
    /// Query the state cadastre layers directly and render exports locally.
    ArcGis {
        #[serde(default)]
        endpoints: ArcGisEndpoints,
    },
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Deserialize, Debug)]
struct Config {
    backend: BackendConfig,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    style_path: PathBuf,
    output_dir: PathBuf,
}

fn read_config(contents: &str) -> anyhow::Result<Config> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.timeout_secs == 0 {
        return Err(anyhow!("timeout_secs must be at least 1"));
    }
    Ok(config)
}

struct SearchArgs {
    input: String,
    select: Vec<usize>,
    export: Option<ExportFormat>,
    folder_name: String,
    file_name: String,
    map: Option<PathBuf>,
    gpkg: Option<PathBuf>,
}

fn read_search_input(input: &str) -> anyhow::Result<String> {
    if input == "-" {
        return Ok(std::io::read_to_string(std::io::stdin())?);
    }
    if !Path::new(input).exists() {
        return Err(anyhow!("Input file {} not found", input));
    }
    Ok(read_to_string(input)?)
}

/// Select each listed row once, however often it is repeated.
fn select_rows<A: ParcelApi, S: StyleStorage>(session: &mut Session<A, S>, rows: &[usize]) {
    let rows: BTreeSet<usize> = rows.iter().copied().collect();
    for index in rows {
        if index >= session.store().len() {
            log::warn!("Row {} does not exist, ignoring", index);
            continue;
        }
        if !session.store().is_selected(index) {
            session.toggle(index);
        }
    }
}

fn run_search<A: ParcelApi>(api: A, config: &Config, args: SearchArgs) -> anyhow::Result<()> {
    let raw = read_search_input(&args.input)?;
    let mut session = Session::new(api, FileStyleStorage::new(&config.style_path));

    let outcome = session.search(&raw);
    for notice in session.take_notices() {
        eprintln!("{}", notice);
    }
    match outcome {
        SearchOutcome::Skipped => {
            log::info!("No parcel identifiers in {}", args.input);
            return Ok(());
        }
        SearchOutcome::Failed | SearchOutcome::Stale => return Err(anyhow!("Search failed")),
        SearchOutcome::Loaded { .. } => {}
    }

    select_rows(&mut session, &args.select);

    for (index, feature) in session.store().features().iter().enumerate() {
        let record = ParcelRecord::from_feature(feature);
        let region = session
            .region_of(index)
            .map(|region| region.name())
            .unwrap_or("?");
        println!(
            "{:>3} [{}] {} lot {} section {} plan {}",
            index,
            if session.store().is_selected(index) { "x" } else { " " },
            region,
            record.lot,
            if record.section.is_empty() { "-" } else { record.section.as_str() },
            record.plan,
        );
    }

    if let Some(map_filepath) = &args.map {
        GeoJsonFileMap::new(map_filepath).render(&session.frame())?;
    }

    if let Some(gpkg_filepath) = &args.gpkg {
        let chosen = session.store().chosen_features();
        write_parcels_to_geofile(
            &chosen,
            Region::infer(&chosen),
            gpkg_filepath,
            &GdalDriverType::GeoPackage,
        )?;
    }

    let mut failed = false;
    if let Some(format) = args.export {
        let mut sink = FileDownloadSink::new(&config.output_dir);
        session.export(format, &args.folder_name, &args.file_name, &mut sink);
        for notice in session.take_notices() {
            failed |= notice.level == NoticeLevel::Error;
            eprintln!("{}", notice);
        }
    }
    if failed {
        return Err(anyhow!("Export failed"));
    }
    Ok(())
}

fn run_style(config: &Config, patch: StylePatch) -> anyhow::Result<()> {
    let mut style_store = StyleStore::open(FileStyleStorage::new(&config.style_path));
    if !patch.is_empty() {
        style_store.update(&patch)?;
        log::info!("Saved style to {:?}", config.style_path);
    }
    println!("{}", serde_json::to_string_pretty(style_store.current())?);
    Ok(())
}

fn try_main() -> anyhow::Result<()> {
    let args = Args::try_parse()?;
    if !Path::new(&args.config_filepath).exists() {
        return Err(anyhow!("Config file {} not found", &args.config_filepath));
    }
    let config_contents = read_to_string(&args.config_filepath)?;
    let config = read_config(&config_contents)?;
    let timeout = Duration::from_secs(config.timeout_secs);

    match args.command {
        Command::Style {
            fill_color,
            outline_color,
            fill_opacity,
            outline_weight,
        } => run_style(
            &config,
            StylePatch {
                fill_color,
                outline_color,
                fill_opacity,
                outline_weight,
            },
        ),
        Command::Search {
            input,
            select,
            export,
            folder_name,
            file_name,
            map,
            gpkg,
        } => {
            let search_args = SearchArgs {
                input,
                select,
                export,
                folder_name,
                file_name,
                map,
                gpkg,
            };
            match &config.backend {
                BackendConfig::Remote { base_url } => {
                    log::info!("Using parcel service at {}", base_url);
                    run_search(HttpParcelApi::new(base_url, timeout)?, &config, search_args)
                }
                BackendConfig::ArcGis { endpoints } => {
                    log::info!("Querying cadastre layers directly");
                    run_search(
                        ArcGisParcelApi::new(endpoints.clone(), timeout)?,
                        &config,
                        search_args,
                    )
                }
            }
        }
    }
}

fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    env_logger::init();
    if let Err(e) = try_main() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::api::{ParcelApi, SearchResponse};
    use crate::geofile::feature::Feature;
    use crate::state::{export::ExportRequest, session::Session, style::tests::MemoryStyleStorage};

    use super::{read_config, select_rows, BackendConfig};

    #[rstest]
    fn test_remote_config() {
        let config = read_config(
            "backend:\n  type: Remote\n  base_url: http://localhost:8000\n\
             style_path: data/style.json\noutput_dir: data\n",
        )
        .unwrap();
        assert!(matches!(
            config.backend,
            BackendConfig::Remote { ref base_url } if base_url == "http://localhost:8000"
        ));
        assert_eq!(config.timeout_secs, 30);
    }

    #[rstest]
    fn test_arcgis_config_with_defaults() {
        let config = read_config(
            "backend:\n  type: ArcGis\ntimeout_secs: 5\nstyle_path: style.json\noutput_dir: out\n",
        )
        .unwrap();
        match config.backend {
            BackendConfig::ArcGis { endpoints } => {
                assert_eq!(endpoints, crate::api::arcgis::ArcGisEndpoints::default())
            }
            other => panic!("unexpected backend {:?}", other),
        }
        assert_eq!(config.timeout_secs, 5);
    }

    #[rstest]
    fn test_zero_timeout_is_rejected() {
        let err = read_config(
            "backend:\n  type: ArcGis\ntimeout_secs: 0\nstyle_path: style.json\noutput_dir: out\n",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "timeout_secs must be at least 1");
    }

    struct ThreeParcels;

    impl ParcelApi for ThreeParcels {
        fn search(&self, _inputs: &[String]) -> anyhow::Result<SearchResponse> {
            let point = || Feature::from(geo::Geometry::Point(geo::Point::new(153.0, -27.5)));
            Ok(SearchResponse {
                features: vec![point(), point(), point()],
                regions: vec![],
            })
        }

        fn export(&self, _request: &ExportRequest) -> anyhow::Result<Vec<u8>> {
            Ok(vec![])
        }
    }

    #[rstest]
    #[case(vec![1, 1], vec![1])]
    #[case(vec![2, 0, 2, 2], vec![0, 2])]
    #[case(vec![1, 7], vec![1])]
    #[case(vec![], vec![])]
    fn test_repeated_rows_are_selected_once(
        #[case] rows: Vec<usize>,
        #[case] expected: Vec<usize>,
    ) {
        let mut session = Session::new(ThreeParcels, MemoryStyleStorage::default());
        session.search("1RP1");

        select_rows(&mut session, &rows);

        assert_eq!(session.store().selected_indices(), expected);
    }
}
