//! Command-line front end.
//!
//! Hand-parsed flags, matching the rest of the workspace's avoidance of a
//! CLI-argument-parsing crate: there's no interactive UI behind this binary
//! (see [`emu_bbc_micro::spawn_stub_ui`]), so there's little surface for a
//! derive-based parser to save work on.

use std::process::ExitCode;
use std::sync::Arc;

use emu_bbc_micro::{
    spawn_stub_ui, Accuracy, BbcMicro, ExecutionMode, MachineConfig, RomBank, RunResult,
    StopCondition,
};
use mos_6502_jit::TrapPolicy;

struct Args {
    rom_banks: Vec<RomBank>,
    mode: ExecutionMode,
    accuracy: Accuracy,
    headless: bool,
    stop_pc: Option<u16>,
    stop_cycles: Option<u64>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        rom_banks: Vec::new(),
        mode: ExecutionMode::Jit,
        accuracy: Accuracy::Accurate,
        headless: true,
        stop_pc: None,
        stop_cycles: None,
    };

    let mut it = std::env::args().skip(1);
    while let Some(flag) = it.next() {
        match flag.as_str() {
            "--rom" => {
                let spec = it.next().ok_or("--rom requires PATH:ADDR")?;
                let (path, addr) = spec.split_once(':').ok_or("--rom expects PATH:ADDR")?;
                let load_address = parse_u16(addr)?;
                args.rom_banks.push(RomBank { path: path.to_string(), load_address });
            }
            "--mode" => match it.next().as_deref() {
                Some("jit") => args.mode = ExecutionMode::Jit,
                Some("interp") => args.mode = ExecutionMode::Interp,
                _ => return Err("--mode expects jit or interp".into()),
            },
            "--accuracy" => match it.next().as_deref() {
                Some("accurate") => args.accuracy = Accuracy::Accurate,
                Some("fast") => args.accuracy = Accuracy::Fast,
                _ => return Err("--accuracy expects accurate or fast".into()),
            },
            "--ui" => args.headless = false,
            "--stop-pc" => args.stop_pc = Some(parse_u16(&it.next().ok_or("--stop-pc requires ADDR")?)?),
            "--stop-cycles" => {
                let n = it.next().ok_or("--stop-cycles requires N")?;
                args.stop_cycles = Some(n.parse().map_err(|_| "--stop-cycles expects a number")?);
            }
            other => return Err(format!("unrecognized argument: {other}")),
        }
    }
    Ok(args)
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u16::from_str_radix(s, 16).map_err(|_| format!("invalid hex address: {s}"))
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let config = MachineConfig {
        rom_banks: args.rom_banks,
        mode: args.mode,
        accuracy: args.accuracy,
        headless: args.headless,
        stop: StopCondition { pc: args.stop_pc, cycles: args.stop_cycles },
        ..MachineConfig::default()
    };

    let ui = if config.headless { None } else { Some(spawn_stub_ui()) };
    let keys = ui.as_ref().map_or_else(
        || Arc::new(emu_bbc_micro::KeyMatrix::new()),
        |ui| Arc::clone(&ui.keys),
    );

    let mut machine = match BbcMicro::new(config, keys) {
        Ok(machine) => machine,
        Err(e) => {
            eprintln!("failed to build machine: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(ui) = &ui {
        loop {
            match machine.run_burst(TrapPolicy::FallBackToInterp) {
                RunResult::Halted | RunResult::Trapped(_) => break,
                RunResult::Stopped => {}
            }
            ui.vsync(true, false, false);
            if ui.exited() {
                return ExitCode::from(ui.exit_code().clamp(0, 255) as u8);
            }
        }
    } else {
        machine.run_to_stop_condition();
    }

    ExitCode::SUCCESS
}
