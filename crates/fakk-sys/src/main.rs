// main.rs — fakk-cm: load a FAKK map and poke at its collision model
//
// Usage:
//   fakk-cm [+set name value ...] info maps/test.bsp
//   fakk-cm contents maps/test.bsp -- -8 0 0
//   fakk-cm trace maps/test.bsp --start 0 0 50 --end 0 0 -50 --mask solid
//   fakk-cm pvs maps/test.bsp --from 5 0 0 --to -5 0 0
//   fakk-cm areas maps/test.bsp --open 0 1

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use fakk_common::cmodel::{self, ClipHandle};
use fakk_common::common::{com_printf, DISTNAME, DISTVER};
use fakk_common::cvar::{cvar_get, cvar_init, cvar_variable_value, with_cvar_ctx};
use fakk_common::files::{fs_init, fs_shutdown, with_fs_ctx, GlobalFs};
use fakk_common::q_shared::{
    ContentFlags, Vec3, MASK_ALL, MASK_DEADSOLID, MASK_MONSTERSOLID, MASK_OPAQUE,
    MASK_PLAYERSOLID, MASK_SHOT, MASK_SOLID, MASK_WATER, SurfaceFlags,
};

#[derive(Parser)]
#[command(name = "fakk-cm", version = DISTVER)]
#[command(about = "Inspect the collision model of a FAKK BSP map")]
struct Cli {
    /// Directory to search for map files; later ones win
    #[arg(long, global = true, default_value = ".")]
    basedir: Vec<PathBuf>,

    /// Log at debug level and print query counters
    #[arg(long, global = true)]
    developer: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print lump counts, checksums and the entity string
    Info {
        map: String,
        /// Also dump the entity string
        #[arg(long)]
        entities: bool,
    },
    /// Contents at a point
    Contents {
        map: String,
        #[arg(num_args = 3, value_names = ["X", "Y", "Z"], allow_negative_numbers = true)]
        point: Vec<f32>,
        /// Inline model number, 0 is the world
        #[arg(long, default_value_t = 0)]
        model: i32,
        #[arg(long, num_args = 3, allow_negative_numbers = true)]
        origin: Option<Vec<f32>>,
        #[arg(long, num_args = 3, allow_negative_numbers = true)]
        angles: Option<Vec<f32>>,
    },
    /// Sweep a box from start to end
    Trace {
        map: String,
        #[arg(long, num_args = 3, allow_negative_numbers = true, required = true)]
        start: Vec<f32>,
        #[arg(long, num_args = 3, allow_negative_numbers = true, required = true)]
        end: Vec<f32>,
        #[arg(long, num_args = 3, allow_negative_numbers = true)]
        mins: Option<Vec<f32>>,
        #[arg(long, num_args = 3, allow_negative_numbers = true)]
        maxs: Option<Vec<f32>>,
        #[arg(long, default_value_t = 0)]
        model: i32,
        #[arg(long, value_enum, default_value_t = Mask::All)]
        mask: Mask,
        #[arg(long, num_args = 3, allow_negative_numbers = true)]
        origin: Option<Vec<f32>>,
        #[arg(long, num_args = 3, allow_negative_numbers = true)]
        angles: Option<Vec<f32>>,
    },
    /// Whether two points can see each other through the PVS
    Pvs {
        map: String,
        #[arg(long, num_args = 3, allow_negative_numbers = true, required = true)]
        from: Vec<f32>,
        #[arg(long, num_args = 3, allow_negative_numbers = true, required = true)]
        to: Vec<f32>,
    },
    /// Area connectivity, optionally after opening portals
    Areas {
        map: String,
        /// Open the portal between two areas (repeatable)
        #[arg(long, num_args = 2, value_names = ["AREA1", "AREA2"], action = clap::ArgAction::Append)]
        open: Vec<i32>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mask {
    All,
    Solid,
    Playersolid,
    Monstersolid,
    Deadsolid,
    Water,
    Opaque,
    Shot,
}

impl Mask {
    fn flags(self) -> ContentFlags {
        match self {
            Mask::All => MASK_ALL,
            Mask::Solid => MASK_SOLID,
            Mask::Playersolid => MASK_PLAYERSOLID,
            Mask::Monstersolid => MASK_MONSTERSOLID,
            Mask::Deadsolid => MASK_DEADSOLID,
            Mask::Water => MASK_WATER,
            Mask::Opaque => MASK_OPAQUE,
            Mask::Shot => MASK_SHOT,
        }
    }
}

fn vec3(v: &[f32]) -> Result<Vec3> {
    match v {
        [x, y, z] => Ok([*x, *y, *z]),
        _ => bail!("expected 3 components, got {}", v.len()),
    }
}

fn opt_vec3(v: &Option<Vec<f32>>) -> Result<Vec3> {
    v.as_deref().map_or(Ok([0.0; 3]), vec3)
}

fn load(map: &str) -> Result<u32> {
    cmodel::cm_load_map(map, &mut GlobalFs).with_context(|| format!("loading {}", map))
}

fn print_counts() {
    cmodel::with_cmodel_ctx(|s| {
        let m = &s.map;
        println!("map:         {}", m.map_name());
        println!("checksum:    {:#010x} (header {:#010x})", m.checksum(), m.header_checksum);
        println!("shaders:     {}", m.map_shaders.len());
        println!("planes:      {}", m.map_planes.len());
        println!("brushes:     {}", m.map_brushes.len());
        println!("brushsides:  {}", m.map_brushsides.len());
        println!("nodes:       {}", m.map_nodes.len());
        println!("leafs:       {}", m.map_leafs.len());
        println!("models:      {}", m.num_inline_models());
        println!("clusters:    {}", m.num_clusters());
        println!("areas:       {}", m.num_areas());
        println!("entity text: {} bytes", m.entity_string().len());
    });
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Info { map, entities } => {
            load(&map)?;
            if let Some(path) = with_fs_ctx(|fs| fs.last_path.clone()).flatten() {
                println!("file:        {}", path.display());
            }
            print_counts();
            if entities {
                println!("{}", cmodel::cm_entity_string());
            }
        }
        Commands::Contents { map, point, model, origin, angles } => {
            load(&map)?;
            let p = vec3(&point)?;
            let handle: ClipHandle = check_model(model)?;
            let contents = if origin.is_some() || angles.is_some() {
                cmodel::cm_transformed_point_contents(&p, handle, &opt_vec3(&origin)?, &opt_vec3(&angles)?)
            } else {
                cmodel::cm_point_contents(&p, handle)
            };
            let leaf = cmodel::cm_point_leafnum(&p);
            println!(
                "leaf {} cluster {} area {}",
                leaf,
                cmodel::cm_leaf_cluster(leaf),
                cmodel::cm_leaf_area(leaf)
            );
            println!("contents {:?}", contents);
        }
        Commands::Trace { map, start, end, mins, maxs, model, mask, origin, angles } => {
            load(&map)?;
            let handle = check_model(model)?;
            let (start, end) = (vec3(&start)?, vec3(&end)?);
            let (mins, maxs) = (opt_vec3(&mins)?, opt_vec3(&maxs)?);
            let tr = if origin.is_some() || angles.is_some() {
                cmodel::cm_transformed_box_trace(
                    &start, &end, &mins, &maxs, handle, mask.flags(), &opt_vec3(&origin)?, &opt_vec3(&angles)?,
                    false,
                )
            } else {
                cmodel::cm_box_trace(&start, &end, &mins, &maxs, handle, mask.flags(), false)
            };
            println!("fraction   {}", tr.fraction);
            println!("endpos     {:?}", tr.endpos);
            println!("startsolid {} allsolid {}", tr.startsolid, tr.allsolid);
            if tr.fraction < 1.0 {
                println!("plane      {:?} dist {}", tr.plane.normal, tr.plane.dist);
                println!("surface    {:?}", tr.surface_flags);
                println!("material   {:?}", tr.surface_flags & SurfaceFlags::MATERIALS);
                println!("contents   {:?}", tr.contents);
            }
        }
        Commands::Pvs { map, from, to } => {
            load(&map)?;
            let (p1, p2) = (vec3(&from)?, vec3(&to)?);
            println!("{}", if cmodel::cm_in_pvs(&p1, &p2) { "visible" } else { "not visible" });
        }
        Commands::Areas { map, open } => {
            load(&map)?;
            for pair in open.chunks_exact(2) {
                cmodel::cm_adjust_area_portal_state(pair[0], pair[1], true)
                    .with_context(|| format!("opening {} <-> {}", pair[0], pair[1]))?;
            }
            let numareas = cmodel::with_cmodel_ctx(|s| s.map.num_areas()).unwrap_or(0);
            let mut bits = vec![0u8; numareas.div_ceil(8)];
            for area in 0..numareas as i32 {
                let bytes = cmodel::cm_write_area_bits(&mut bits, area);
                let reachable: Vec<i32> = (0..numareas as i32)
                    .filter(|&a| bits[..bytes][(a >> 3) as usize] & (1 << (a & 7)) != 0)
                    .collect();
                println!("area {}: {:?}", area, reachable);
            }
        }
    }
    Ok(())
}

fn check_model(model: i32) -> Result<ClipHandle> {
    let count = cmodel::cm_num_inline_models();
    if model < 0 || model as usize >= count {
        bail!("model {} out of range, map has {}", model, count);
    }
    Ok(cmodel::cm_inline_model(model))
}

/// Log level used when RUST_LOG doesn't choose one.
fn default_level(developer: bool) -> log::LevelFilter {
    if developer {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    }
}

fn main() -> Result<()> {
    // logger first so complaints about +set arguments are not lost; the
    // level is settled once developer is known
    let rust_log = std::env::var_os("RUST_LOG").is_some();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    if !rust_log {
        log::set_max_level(default_level(false));
    }

    cvar_init();
    cvar_get("developer", "0", 0);

    // +set name value pairs are console variables, the rest goes to clap
    let args = with_cvar_ctx(|c| c.apply_command_line(std::env::args())).unwrap_or_default();
    let cli = Cli::parse_from(args);

    let developer = cli.developer || cvar_variable_value("developer") != 0.0;
    if !rust_log {
        log::set_max_level(default_level(developer));
    }

    com_printf(&format!("{} {}\n", DISTNAME, DISTVER));
    fs_init(&cli.basedir);
    if developer {
        with_fs_ctx(|fs| fs.path_f());
    }
    cmodel::cmodel_init();

    run(cli.command)?;

    if developer {
        if let Some(stats) = cmodel::with_cmodel_ctx(|s| s.client.stats) {
            log::debug!(
                "{} traces, {} brush traces, {} point contents",
                stats.traces,
                stats.brush_traces,
                stats.point_contents
            );
        }
    }
    cmodel::cm_clear_map();
    cmodel::cmodel_shutdown();
    fs_shutdown();
    Ok(())
}
