use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use xcvr_core::dump::hex_dump;
use xcvr_core::session::{ModuleSession, SessionConfig, any_checksum_failed};
use xcvr_core::transport::NusbTransport;
use xcvr_core::{ChecksumResult, ModuleType, PageId, WriteResult};

#[derive(Parser, Debug)]
#[command(author, version, about = "Optical transceiver coding box tool", long_about = None)]
struct Args {
    /// Session configuration (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the session event log when done
    #[arg(long, global = true)]
    show_log: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Identify the plugged module
    Detect,
    /// Read and decode the module
    Read {
        /// Skip detection and read as this type (sfp, sfp+, xfp, qsfp, qsfp-dd)
        #[arg(short = 't', long = "type")]
        module: Option<ModuleType>,
        /// Read only this page (a0 or a2) and print it raw
        #[arg(long)]
        page: Option<PageId>,
        /// Also print a hex dump of A0
        #[arg(long)]
        dump: bool,
    },
    /// Write one byte, reboot the module and read it back
    Write {
        /// Page address (a0 or a2)
        #[arg(long, default_value = "a0")]
        page: PageId,
        /// Byte offset (0x14 or 20)
        #[arg(long, value_parser = parse_byte)]
        offset: u8,
        /// Value to write (0x4F or 79)
        #[arg(long, value_parser = parse_byte)]
        value: u8,
        /// Skip detection and write as this type
        #[arg(short = 't', long = "type")]
        module: Option<ModuleType>,
    },
    /// Decode a binary A0 dump from a file (no device needed)
    Decode {
        file: PathBuf,
        #[arg(short = 't', long = "type")]
        module: Option<ModuleType>,
    },
    /// Print the effective configuration, or write it to a file
    Config {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn parse_byte(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| format!("'{s}' is not a byte value: {e}"))
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match run(args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            error!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<SessionConfig> {
    match path {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(SessionConfig::default()),
    }
}

fn open_session(config: SessionConfig) -> Result<ModuleSession<NusbTransport>> {
    let transport = NusbTransport::open_with_ids(config.vendor_id, config.product_id)
        .context("opening coding box")?;
    Ok(ModuleSession::new(transport, config))
}

fn print_checksums(results: &[ChecksumResult]) {
    for c in results {
        println!("{} {} CheckSum {}", c.page, c.end_offset, c.status);
    }
}

/// Returns `Ok(false)` when the operation finished but did not succeed.
fn run(args: Args) -> Result<bool> {
    let config = load_config(args.config.as_ref())?;

    match args.command {
        Cmd::Config { output } => {
            match output {
                Some(path) => {
                    config.save_to_file(&path)?;
                    info!(path = %path.display(), "Configuration written");
                }
                None => print!("{}", toml::to_string_pretty(&config)?),
            }
            Ok(true)
        }
        Cmd::Decode { file, module } => {
            let data = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let module = module.unwrap_or(config.default_module);
            let (info, checksums) =
                xcvr_core::session::decode_buffer(module, &data, config.checksum_rule);
            println!("{info}");
            print_checksums(&checksums);
            Ok(!any_checksum_failed(&checksums))
        }
        Cmd::Detect => {
            let mut session = open_session(config)?;
            let detection = session.detect_and_select();
            println!("Detected: {detection}");
            println!("Selected: {}", session.selected_module());
            finish(&session, args.show_log);
            Ok(detection.module().is_some())
        }
        Cmd::Read { module, page, dump } => {
            let mut session = open_session(config)?;
            if let Some(page) = page {
                if let Some(m) = module {
                    session.select_module(m);
                }
                let result = session.read_page(page);
                finish(&session, args.show_log);
                let page = result?;
                print!("{}", hex_dump(page.received_bytes()));
                print_checksums(&page.checksums);
                return Ok(page.is_complete() && page.checksums_ok());
            }

            let result = match module {
                Some(m) => session.read_module_as(m),
                None => session.read_module(),
            };
            finish(&session, args.show_log);
            let report = result?;

            println!("{}", report.info);
            if let Some(diag) = &report.diagnostics {
                print!("{diag}");
            }
            if dump {
                print!("{}", hex_dump(report.a0.received_bytes()));
            }
            let checksums = report.checksums();
            print_checksums(&checksums);
            if !report.a0.is_complete() {
                warn!(
                    received = report.a0.received,
                    expected = report.a0.expected,
                    "A0 read was short"
                );
            }
            Ok(report.checksums_ok())
        }
        Cmd::Write {
            page,
            offset,
            value,
            module,
        } => {
            let mut session = open_session(config)?;
            let result = match module {
                Some(m) => session.write_byte_as(m, page.address(), offset, value),
                None => session.write_byte(page.address(), offset, value),
            };
            finish(&session, args.show_log);
            match result {
                WriteResult::WriteError { .. } => bail!("{result}"),
                _ => {
                    println!("{result}");
                    Ok(result.is_verified())
                }
            }
        }
    }
}

fn finish<T: xcvr_core::Transport>(session: &ModuleSession<T>, show_log: bool) {
    if show_log {
        for line in session.event_log().lines() {
            println!("{line}");
        }
    }
}
