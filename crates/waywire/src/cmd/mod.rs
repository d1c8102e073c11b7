use clap::{Args, Subcommand};
use std::path::PathBuf;

use waywire_frame::{DEFAULT_ANCILLARY_BUFFER_SIZE, DEFAULT_READ_BUFFER_SIZE};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod relay;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Relay clients to an upstream compositor and print the traffic.
    Relay(RelayArgs),
    /// Decode a captured byte stream into messages.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Relay(args) => relay::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct RelayArgs {
    /// Socket path to listen on.
    pub path: PathBuf,
    /// Upstream socket path. Default: $XDG_RUNTIME_DIR/$WAYLAND_DISPLAY.
    #[arg(long, env = "WAYWIRE_UPSTREAM")]
    pub upstream: Option<PathBuf>,
    /// Payload bytes per socket read.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_READ_BUFFER_SIZE)]
    pub read_buffer: usize,
    /// Control-data bytes per socket read (bounds descriptors per read).
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_ANCILLARY_BUFFER_SIZE)]
    pub ancillary_buffer: usize,
    /// Relay without printing traffic.
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// File holding raw message bytes. Reads stdin when omitted or "-".
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
