use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use nescore::config::NesConfig;
use nescore::nes::Nes;
use nescore::nes::cartridge::{ROM_FLAG_BATTERY, Rom};
use nescore::nes::input::DEV_JOYPAD0;
use sha1::{Digest, Sha1};

#[derive(Debug, Clone, Default)]
struct Args {
    rom: Option<PathBuf>,
    frames: u32,
    config: Option<PathBuf>,
    save_state: Option<PathBuf>,
    load_state: Option<PathBuf>,
    sram: Option<PathBuf>,
    press: u8,
    events: usize,
}

fn print_help() {
    println!(
        "nescore_run <rom.nes> [options]\n\n\
         Runs a cartridge headless and prints hashes of the final frame and the audio.\n\n\
         Options:\n  \
         --frames N          frames to emulate (default 60)\n  \
         --config PATH       JSON machine settings\n  \
         --load-state PATH   restore an SNSS snapshot after power-on\n  \
         --save-state PATH   write an SNSS snapshot when done\n  \
         --sram PATH         battery RAM file, read if present and written back for battery carts\n  \
         --press MASK        joypad 0 buttons held for the whole run (0x01 = A .. 0x80 = right)\n  \
         --events N          machine events to print (default 16)\n  \
         --help              show this message"
    );
}

fn parse_u8(value: &str) -> Option<u8> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => value.parse::<u8>().ok(),
    }
}

fn parse_args() -> Result<Args> {
    let mut cfg = Args {
        frames: 60,
        events: 16,
        ..Args::default()
    };
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--frames" => {
                let value = args
                    .next()
                    .context("--frames requires an integer, e.g. --frames 600")?;
                cfg.frames = value
                    .parse::<u32>()
                    .with_context(|| format!("invalid --frames value: {value}"))?;
            }
            "--config" => {
                let value = args
                    .next()
                    .context("--config requires a path, e.g. --config nescore.json")?;
                cfg.config = Some(PathBuf::from(value));
            }
            "--save-state" => {
                let value = args
                    .next()
                    .context("--save-state requires a path, e.g. --save-state game.ss0")?;
                cfg.save_state = Some(PathBuf::from(value));
            }
            "--load-state" => {
                let value = args
                    .next()
                    .context("--load-state requires a path, e.g. --load-state game.ss0")?;
                cfg.load_state = Some(PathBuf::from(value));
            }
            "--sram" => {
                let value = args
                    .next()
                    .context("--sram requires a path, e.g. --sram game.sav")?;
                cfg.sram = Some(PathBuf::from(value));
            }
            "--press" => {
                let value = args
                    .next()
                    .context("--press requires a button mask, e.g. --press 0x08")?;
                cfg.press = parse_u8(&value)
                    .with_context(|| format!("invalid --press value: {value}"))?;
            }
            "--events" => {
                let value = args
                    .next()
                    .context("--events requires an integer, e.g. --events 32")?;
                cfg.events = value
                    .parse::<usize>()
                    .with_context(|| format!("invalid --events value: {value}"))?;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other if other.starts_with("--") => {
                anyhow::bail!("unknown argument: {other}\nUse --help to view supported options.");
            }
            other => {
                if cfg.rom.is_some() {
                    anyhow::bail!("more than one ROM given: {other}");
                }
                cfg.rom = Some(PathBuf::from(other));
            }
        }
    }

    Ok(cfg)
}

fn sha1_base64(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(Sha1::digest(bytes))
}

fn run_audio_frame(nes: &mut Nes, sample_bits: u8, samples: usize, out: &mut Vec<u8>) {
    if sample_bits == 8 {
        let mut buf = vec![0u8; samples];
        nes.process_audio(&mut buf);
        out.extend_from_slice(&buf);
    } else {
        let mut buf = vec![0i16; samples];
        nes.process_audio(&mut buf);
        out.extend(buf.iter().flat_map(|sample| sample.to_le_bytes()));
    }
}

fn main() -> Result<()> {
    let args = parse_args()?;
    let Some(rom_path) = args.rom.clone() else {
        print_help();
        anyhow::bail!("no ROM given");
    };

    let config = match &args.config {
        Some(path) => NesConfig::load(path)?,
        None => NesConfig::default(),
    };

    let mut nes = Nes::new();
    config.apply(&mut nes);
    let rom = Rom::from_file(&rom_path)?;
    nes.insert(rom)
        .with_context(|| format!("failed to insert {}", rom_path.display()))?;

    if let Some(path) = &args.sram {
        if path.exists() {
            let data = fs::read(path)
                .with_context(|| format!("failed to read SRAM: {}", path.display()))?;
            nes.load_sram(&data)?;
        }
    }
    if let Some(path) = &args.load_state {
        nes.load_state_file(path)?;
    }
    nes.input_mut().set(DEV_JOYPAD0, u16::from(args.press));

    let samples = nes.samples_per_frame();
    let sample_bytes = if config.sample_bits == 8 { 1 } else { 2 };
    let mut audio = Vec::with_capacity(samples * sample_bytes * args.frames as usize);
    for frame in 0..args.frames {
        let draw = !config.auto_frame_skip || frame + 1 == args.frames;
        nes.render_frame(draw);
        run_audio_frame(&mut nes, config.sample_bits, samples, &mut audio);
    }

    if let Some(path) = &args.save_state {
        nes.save_state_file(path)?;
    }
    if let Some(path) = &args.sram {
        if nes.rom().has_flag(ROM_FLAG_BATTERY) {
            fs::write(path, nes.sram())
                .with_context(|| format!("failed to write SRAM: {}", path.display()))?;
        }
    }

    println!("{}", nes.info());
    println!("frames: {}", nes.frame_count());
    println!("pc: ${:04X}", nes.cpu().pc);
    println!("frame sha1: {}", sha1_base64(&nes.frame()));
    println!("audio sha1: {} ({} bytes)", sha1_base64(&audio), audio.len());
    let events = nes.recent_events(args.events);
    if !events.is_empty() {
        println!("events:");
        for event in events.iter().rev() {
            println!("  {event}");
        }
    }
    Ok(())
}
