// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Command-line front end: argument parsing, logging setup, progress
//! rendering, and error-to-exit-code mapping. The protocol and codec work
//! all happens in `bsl-core`; this binary only wires it to a terminal.

mod transport_adapter;

use anyhow::{bail, Context, Result};
use bsl_core::codecs::{ascii, ihex, raw, srecord};
use bsl_core::orchestrator::{Config, ErasePlan, InterfaceKind, ResetMethod, Session, Transform};
use bsl_core::{MemoryImage, Phase, ProgressEvent};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use transport_adapter::FileTransport;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum InterfaceArg {
    Uart,
    SpiDevice,
    SpiBridge,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ResetArg {
    None,
    Dtr,
    Rts,
    Gpio,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum EraseArg {
    None,
    Mass,
    Sectors,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FormatArg {
    Srecord,
    Ihex,
    Ascii,
    Raw,
}

/// Programs, reads out from, and jumps a target running the factory BSL.
#[derive(Parser, Debug)]
#[command(name = "bsl", version, about)]
struct Cli {
    /// Device node to open (a serial port or an SPI device).
    port: String,

    #[arg(long, value_enum, default_value = "uart")]
    interface: InterfaceArg,

    #[arg(long, value_enum, default_value = "none")]
    reset: ResetArg,

    #[arg(long, value_enum, default_value = "none")]
    erase: EraseArg,

    /// Verify every written byte by reading it back after upload.
    #[arg(long)]
    verify: bool,

    /// Input file(s) to merge into the session image before upload.
    #[arg(long = "write", value_name = "PATH")]
    inputs: Vec<String>,

    /// Input file format; required when any --write is given.
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Base address for raw-binary input files.
    #[arg(long, default_value_t = 0)]
    base_address: u32,

    /// Read out `lo:hi` (hex, inclusive) and write it to PATH before exit.
    #[arg(long, value_name = "lo:hi")]
    read: Option<String>,
    #[arg(long, value_name = "PATH")]
    read_out: Option<String>,

    /// Jump to this address (hex) after upload.
    #[arg(long, value_name = "ADDR")]
    go: Option<String>,

    /// Image transform applied before upload, may be repeated; one of
    /// `fill:lo:hi:value`, `clip:lo:hi`, `cut:lo:hi`, `copy:srclo:srchi:dstlo`,
    /// `move:srclo:srchi:dstlo` (all addresses and the fill value in hex).
    #[arg(long = "transform", value_name = "SPEC")]
    transforms: Vec<String>,

    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_hex_u32(s: &str) -> Result<u32> {
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(s, 16).with_context(|| format!("invalid hex address {s:?}"))
}

fn parse_transform(spec: &str) -> Result<Transform> {
    let fields: Vec<&str> = spec.split(':').collect();
    match fields.as_slice() {
        ["fill", lo, hi, value] => Ok(Transform::Fill {
            lo: parse_hex_u32(lo)?,
            hi: parse_hex_u32(hi)?,
            value: parse_hex_u32(value)? as u8,
        }),
        ["clip", lo, hi] => Ok(Transform::Clip {
            lo: parse_hex_u32(lo)?,
            hi: parse_hex_u32(hi)?,
        }),
        ["cut", lo, hi] => Ok(Transform::Cut {
            lo: parse_hex_u32(lo)?,
            hi: parse_hex_u32(hi)?,
        }),
        ["copy", src_lo, src_hi, dst_lo] => Ok(Transform::Copy {
            src_lo: parse_hex_u32(src_lo)?,
            src_hi: parse_hex_u32(src_hi)?,
            dst_lo: parse_hex_u32(dst_lo)?,
        }),
        ["move", src_lo, src_hi, dst_lo] => Ok(Transform::Move {
            src_lo: parse_hex_u32(src_lo)?,
            src_hi: parse_hex_u32(src_hi)?,
            dst_lo: parse_hex_u32(dst_lo)?,
        }),
        _ => bail!("invalid --transform {spec:?}"),
    }
}

fn decode_into(format: FormatArg, bytes: &[u8], base_address: u32, image: &mut MemoryImage) -> Result<()> {
    let text = || std::str::from_utf8(bytes).context("input file is not valid UTF-8");
    match format {
        FormatArg::Srecord => srecord::decode(text()?, image)?,
        FormatArg::Ihex => ihex::decode(text()?, image)?,
        FormatArg::Ascii => ascii::decode(text()?, image)?,
        FormatArg::Raw => raw::decode(bytes, base_address, image)?,
    }
    Ok(())
}

fn encode_from(format: FormatArg, image: &MemoryImage) -> Result<Vec<u8>> {
    Ok(match format {
        FormatArg::Srecord => srecord::encode(image)?,
        FormatArg::Ihex => ihex::encode(image)?,
        FormatArg::Ascii => ascii::encode(image)?,
        FormatArg::Raw => raw::encode(image)?,
    })
}

fn run(cli: Cli) -> Result<()> {
    let mut image = MemoryImage::new();
    if !cli.inputs.is_empty() {
        let format = cli.format.context("--format is required with --write")?;
        for path in &cli.inputs {
            let bytes = fs::read(path).with_context(|| format!("reading {path}"))?;
            decode_into(format, &bytes, cli.base_address, &mut image)?;
        }
    }

    let config = Config {
        interface: match cli.interface {
            InterfaceArg::Uart => InterfaceKind::Uart,
            InterfaceArg::SpiDevice => InterfaceKind::SpiDevice,
            InterfaceArg::SpiBridge => InterfaceKind::SpiBridge,
        },
        reset_method: match cli.reset {
            ResetArg::None => ResetMethod::None,
            ResetArg::Dtr => ResetMethod::Dtr,
            ResetArg::Rts => ResetMethod::Rts,
            ResetArg::Gpio => ResetMethod::Gpio,
        },
        uart_mode_override: None,
        sync_retries: bsl_core::protocol::constants::DEFAULT_SYNC_RETRIES,
        erase: match cli.erase {
            EraseArg::None => ErasePlan::None,
            EraseArg::Mass => ErasePlan::Mass,
            EraseArg::Sectors => ErasePlan::Sectors,
        },
        transforms: cli
            .transforms
            .iter()
            .map(|s| parse_transform(s))
            .collect::<Result<Vec<_>>>()?,
        verify: cli.verify,
        jump_after: cli.go.as_deref().map(parse_hex_u32).transpose()?,
    };

    let mut transport = FileTransport::new(&cli.port);
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:40}] {bytes}/{total_bytes}")
            .unwrap()
            .progress_chars("=>-"),
    );
    let mut sink = |event: ProgressEvent| match event {
        ProgressEvent::PhaseStarted { phase } => {
            bar.set_message(phase_label(phase));
            bar.set_position(0);
        }
        ProgressEvent::BytesTransferred {
            bytes_done,
            bytes_total,
        } => {
            bar.set_length(bytes_total as u64);
            bar.set_position(bytes_done as u64);
        }
        ProgressEvent::RamRoutineLoaded => log::info!("RAM routine side-loaded"),
        ProgressEvent::PhaseFinished { phase } => log::debug!("{:?} finished", phase),
    };

    let mut session = Session::open(&mut transport, config, &mut sink)?;
    log::info!(
        "identified {:?}, bsl version 0x{:02X}, {} kB flash",
        session.target().family,
        session.target().bsl_version,
        session.target().flash_kb
    );

    if !cli.inputs.is_empty() || !cli.transforms.is_empty() {
        session.program(&image, &mut sink)?;
    }

    if let (Some(range), Some(out_path)) = (&cli.read, &cli.read_out) {
        let (lo_str, hi_str) = range
            .split_once(':')
            .context("--read expects lo:hi, e.g. 8000:80FF")?;
        let lo = parse_hex_u32(lo_str)?;
        let hi = parse_hex_u32(hi_str)?;
        let readback = session.read_out(lo, hi, &mut sink)?;
        let format = cli.format.context("--format is required with --read")?;
        let bytes = encode_from(format, &readback)?;
        fs::write(out_path, bytes).with_context(|| format!("writing {out_path}"))?;
    } else if cli.read.is_some() != cli.read_out.is_some() {
        bail!("--read and --read-out must be given together");
    }

    session.go_if_requested(&mut sink)?;
    bar.finish_and_clear();
    session.close()?;
    Ok(())
}

fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Sync => "synchronizing",
        Phase::Identify => "identifying",
        Phase::Erase => "erasing",
        Phase::Upload => "writing",
        Phase::Verify => "verifying",
        Phase::ReadOut => "reading",
        Phase::Go => "jumping",
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
