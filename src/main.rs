//! Headless chipset runner.
//!
//! ```text
//! calcchip [CONFIG.json] [--cycles N] [--save CONFIG.json]
//! ```
//!
//! Builds a chipset with an idle core, runs it for N master cycles
//! (default: one emulated second) and logs what happened.

use std::path::PathBuf;
use std::process::ExitCode;

use log::{error, info};

use calcchip::{Chipset, ChipsetConfig, ChipsetError, IdleCore};

struct Args {
    config: Option<PathBuf>,
    cycles: Option<u64>,
    save: Option<PathBuf>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let value_of = |flag: &str| args.windows(2).find(|w| w[0] == flag).map(|w| w[1].clone());
    Args {
        config: args
            .iter()
            .enumerate()
            .find(|(i, a)| !a.starts_with("--") && (*i == 0 || !args[i - 1].starts_with("--")))
            .map(|(_, a)| PathBuf::from(a)),
        cycles: value_of("--cycles").and_then(|s| s.parse().ok()),
        save: value_of("--save").map(PathBuf::from),
    }
}

fn run(args: Args) -> Result<(), ChipsetError> {
    let config = match &args.config {
        Some(path) => ChipsetConfig::load_strict(path)?,
        None => ChipsetConfig::default(),
    };
    if let Some(path) = &args.save {
        config.save(path)?;
    }

    let mut chipset = Chipset::new(&config, IdleCore::new())?;
    info!("[calcchip] peripherals: {}", chipset.peripheral_names().join(", "));

    let cycles = args.cycles.unwrap_or(config.cycles_per_second as u64);
    chipset.run(cycles);

    let stats = chipset.stats();
    info!(
        "[calcchip] {} cycles, {} steps, {} interrupts delivered, {} resets",
        stats.cycles, stats.steps, stats.deliveries, stats.resets
    );
    info!(
        "[calcchip] HTBR {:#04X}, LTBR {:#04X}, mode {:?}",
        chipset.clock().read_htbr(),
        chipset.clock().read_ltbr(),
        chipset.run_mode()
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(parse_args()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("[calcchip] {e}");
            ExitCode::FAILURE
        }
    }
}
