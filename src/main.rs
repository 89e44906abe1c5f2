mod obj;

use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use navtile_build::{BuildConfig, BuildInput, build_navmesh, load_config_from_path};
use navtile_geom::AreaDefinition;
use navtile_mesh::{NavMesh, extract_mesh_geometry, extract_tile_geometry};

#[derive(Parser, Debug)]
#[command(name = "navtile", version, about = "Tiled navigation mesh builder")]
struct Args {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a tiled mesh from OBJ geometry and save it as a tile set
    Build {
        /// TOML build configuration; defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,
        /// Walkable geometry (Wavefront OBJ)
        #[arg(long)]
        geometry: PathBuf,
        /// Area geometry tagged with a code, as CODE:PATH (repeatable)
        #[arg(long = "area", value_parser = parse_area_arg)]
        areas: Vec<(u8, PathBuf)>,
        /// Output tile set file
        #[arg(long, short)]
        out: PathBuf,
    },
    /// Print the header and tiles of a tile set
    Info {
        file: PathBuf,
        /// Load through a memory mapping instead of a private copy
        #[arg(long)]
        mapped: bool,
    },
    /// Write the walkable surface of a tile set as OBJ
    Extract {
        file: PathBuf,
        /// Only this tile, as X,Y
        #[arg(long, value_parser = parse_tile_arg)]
        tile: Option<(i32, i32)>,
        /// Output OBJ file; stdout when omitted
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
}

fn parse_area_arg(s: &str) -> Result<(u8, PathBuf), String> {
    let (code, path) = s.split_once(':').ok_or_else(|| format!("expected CODE:PATH, got '{s}'"))?;
    let code: u8 = code.parse().map_err(|_| format!("bad area code '{code}'"))?;
    if code == 0 || code >= 63 {
        return Err(format!("area code {code} is reserved"));
    }
    Ok((code, PathBuf::from(path)))
}

fn parse_tile_arg(s: &str) -> Result<(i32, i32), String> {
    let (x, y) = s.split_once(',').ok_or_else(|| format!("expected X,Y, got '{s}'"))?;
    let x = x.trim().parse().map_err(|_| format!("bad tile x '{x}'"))?;
    let y = y.trim().parse().map_err(|_| format!("bad tile y '{y}'"))?;
    Ok((x, y))
}

fn run_build(config: Option<&Path>, geometry: &Path, areas: &[(u8, PathBuf)], out: &Path) -> Result<(), Box<dyn Error>> {
    let config = match config {
        Some(path) => load_config_from_path(path)?,
        None => BuildConfig::default(),
    };
    let mut input = BuildInput::new(obj::load_obj(geometry)?);
    for (code, path) in areas {
        input = input.with_area(AreaDefinition::new(obj::load_obj(path)?, *code));
    }
    let (mesh, report) = build_navmesh(&input, &config, None)?;
    for (x, y, msg) in &report.failures {
        log::warn!("tile ({x}, {y}): {msg}");
    }
    navtile_io::save_to_path(&mesh, out)?;
    log::info!(
        "wrote {} tiles ({} empty, {} failed) to {}",
        report.tiles_built,
        report.tiles_empty,
        report.tiles_failed,
        out.display()
    );
    Ok(())
}

fn open(file: &Path, mapped: bool) -> Result<NavMesh, Box<dyn Error>> {
    let mesh = if mapped { navtile_io::map_from_path(file)? } else { navtile_io::load_from_path(file)? };
    Ok(mesh)
}

fn run_info(file: &Path, mapped: bool) -> Result<(), Box<dyn Error>> {
    let mesh = open(file, mapped)?;
    let p = mesh.params();
    let budget = mesh.budget();
    println!("{}: {:?} storage", file.display(), mesh.storage_mode());
    println!(
        "origin [{}, {}, {}], tile {} x {}",
        p.origin[0], p.origin[1], p.origin[2], p.tile_width, p.tile_height
    );
    println!(
        "{} / {} tiles, {} polys per tile ({} tile bits, {} poly bits, {} salt bits)",
        mesh.tile_count(),
        p.max_tiles,
        p.max_polys,
        budget.tile_bits,
        budget.poly_bits,
        budget.salt_bits()
    );
    for tile in mesh.tiles() {
        let (x, y, layer) = tile.coord();
        let v = &tile.view;
        println!(
            "  ({x}, {y}, {layer}) ref {:#x}: {} polys, {} verts, {} detail tris, {} links, {} bytes",
            tile.tile_ref.0,
            v.poly_count(),
            v.verts.len(),
            v.detail_tris.len(),
            v.off_mesh_cons.len(),
            tile.bytes().len()
        );
    }
    Ok(())
}

fn run_extract(file: &Path, tile: Option<(i32, i32)>, out: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let mesh = open(file, false)?;
    let geom = match tile {
        Some((x, y)) => extract_tile_geometry(&mesh, x, y),
        None => extract_mesh_geometry(&mesh),
    };
    if geom.is_empty() {
        log::warn!("no walkable surface to extract");
    }
    match out {
        Some(path) => {
            let mut w = BufWriter::new(File::create(path)?);
            obj::write_obj(&geom.verts, &geom.tris, &mut w)?;
            w.flush()?;
            log::info!("wrote {} triangles to {}", geom.tris.len(), path.display());
        }
        None => {
            let mut w = BufWriter::new(std::io::stdout().lock());
            obj::write_obj(&geom.verts, &geom.tris, &mut w)?;
            w.flush()?;
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match &args.command {
        Command::Build { config, geometry, areas, out } => run_build(config.as_deref(), geometry, areas, out),
        Command::Info { file, mapped } => run_info(file, *mapped),
        Command::Extract { file, tile, out } => run_extract(file, *tile, out.as_deref()),
    }
}
