//! spark_rois - edit the ROI file that defines monitored spots.
//!
//! Spots are numbered by position: the first region is slot 1. `undo` drops
//! the most recently added spot.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use spark_occupancy::{Rect, RoiStore, SpotRegistry};

#[derive(Parser, Debug)]
#[command(author, version, about = "Edit parking spot regions")]
struct Args {
    /// ROI file to edit.
    #[arg(long, env = "SPARK_ROIS_PATH", default_value = "rois.json")]
    rois: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a spot from its top-left corner and size.
    Add {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    /// Add a spot from two opposite corners, in either order.
    AddCorners { x1: u32, y1: u32, x2: u32, y2: u32 },
    /// Remove the most recently added spot.
    Undo,
    /// Print every spot.
    List,
    /// Remove all spots.
    Clear,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let store = RoiStore::new(&args.rois);
    let mut registry = SpotRegistry::new();
    store.load_into(&mut registry)?;

    match args.command {
        Command::Add {
            x,
            y,
            width,
            height,
        } => {
            let spot = registry.create(Rect::new(x, y, width, height))?;
            println!("added slot {} at {}", spot.slot_id(), spot.region());
        }
        Command::AddCorners { x1, y1, x2, y2 } => {
            let spot = registry.create(Rect::from_corners((x1, y1), (x2, y2)))?;
            println!("added slot {} at {}", spot.slot_id(), spot.region());
        }
        Command::Undo => match registry.remove_last() {
            Some(spot) => println!("removed slot {}", spot.slot_id()),
            None => println!("no spots to remove"),
        },
        Command::List => {
            for spot in registry.snapshot() {
                println!("{} {}", spot.slot_id(), spot.region());
            }
            return Ok(());
        }
        Command::Clear => {
            let removed = registry.len();
            registry.load(std::iter::empty())?;
            println!("removed {} spots", removed);
        }
    }

    store.save(&registry)?;
    log::info!(
        "saved {} spots to {}",
        registry.len(),
        store.path().display()
    );
    Ok(())
}
