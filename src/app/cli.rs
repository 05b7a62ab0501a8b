use crate::player::{AutostartMode, Drive};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// ultiplay - play SIDs, programs, cartridges and disk images on a C64 Ultimate 🕹️
#[derive(Parser, Debug)]
#[command(name = "ultiplay", version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Device base URL (overrides config)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Network password sent as X-Password (overrides config)
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Disk image autostart strategy
    #[arg(long, global = true, value_enum)]
    pub autostart: Option<AutostartArg>,

    /// Drive used for disk images
    #[arg(long, global = true, value_enum)]
    pub drive: Option<DriveArg>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Generate default config.toml to stdout
    #[arg(long)]
    pub generate_config: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Queue files and play them interactively
    Play {
        /// Local files, or device paths with --remote
        #[arg(required = true)]
        files: Vec<String>,

        /// Paths are on the device's own filesystem
        #[arg(long)]
        remote: bool,

        /// Sub-tune for SID files
        #[arg(long)]
        song: Option<u16>,

        /// Fallback duration in seconds when no songlength is known
        #[arg(long)]
        duration: Option<u64>,

        #[arg(long)]
        shuffle: bool,

        #[arg(long)]
        repeat: bool,
    },
    /// Reset the machine
    Stop,
    /// Mute and freeze the machine
    Pause,
    /// Thaw the machine and restore the mixer
    Resume {
        /// Drop the saved mixer values instead of writing them back
        #[arg(long)]
        discard_audio: bool,
    },
    /// Write the first program of a disk image as a .prg
    Extract {
        image: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show how files would be played
    Classify {
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Look up a SID's length in the HVSC songlengths database
    Songlength {
        path: String,
        #[arg(long)]
        song: Option<u16>,
        /// Songlengths file or HVSC root (overrides config)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print every device config category as JSON
    DumpConfig,
    /// Machine memory access
    Ram {
        #[command(subcommand)]
        action: RamAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum RamAction {
    /// Freeze the machine, save its memory to a file, then thaw it
    Dump {
        #[arg(short, long, default_value = "ram.bin")]
        output: PathBuf,

        /// Start address, decimal or hex ($C000, 0xC000)
        #[arg(long, default_value = "0", value_parser = parse_address)]
        address: u16,

        /// Bytes to read; clipped at the top of memory
        #[arg(long, default_value_t = 0x1_0000)]
        length: u32,
    },
}

fn parse_address(text: &str) -> Result<u16, String> {
    let hex = text
        .strip_prefix('$')
        .or_else(|| text.strip_prefix("0x"))
        .or_else(|| text.strip_prefix("0X"));
    match hex {
        Some(digits) => u16::from_str_radix(digits, 16),
        None => text.parse(),
    }
    .map_err(|e| format!("invalid address {:?}: {}", text, e))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum AutostartArg {
    Classic,
    Dma,
}

impl From<AutostartArg> for AutostartMode {
    fn from(arg: AutostartArg) -> Self {
        match arg {
            AutostartArg::Classic => AutostartMode::Classic,
            AutostartArg::Dma => AutostartMode::Dma,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DriveArg {
    A,
    B,
}

impl From<DriveArg> for Drive {
    fn from(arg: DriveArg) -> Self {
        match arg {
            DriveArg::A => Drive::A,
            DriveArg::B => Drive::B,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_play() {
        let args = Args::parse_from([
            "ultiplay", "play", "--remote", "--song", "2", "/USB0/a.sid", "/USB0/b.d64", "--autostart", "dma",
        ]);
        assert_eq!(args.autostart, Some(AutostartArg::Dma));
        match args.command {
            Some(Command::Play { files, remote, song, .. }) => {
                assert_eq!(files, vec!["/USB0/a.sid", "/USB0/b.d64"]);
                assert!(remote);
                assert_eq!(song, Some(2));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_generate_config_needs_no_command() {
        let args = Args::parse_from(["ultiplay", "--generate-config"]);
        assert!(args.generate_config);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_parse_ram_dump() {
        let args = Args::parse_from(["ultiplay", "ram", "dump", "--address", "$C000", "--length", "4096"]);
        match args.command {
            Some(Command::Ram {
                action: RamAction::Dump { output, address, length },
            }) => {
                assert_eq!(output, PathBuf::from("ram.bin"));
                assert_eq!(address, 0xC000);
                assert_eq!(length, 4096);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let args = Args::parse_from(["ultiplay", "ram", "dump", "-o", "mem.bin"]);
        match args.command {
            Some(Command::Ram {
                action: RamAction::Dump { output, address, length },
            }) => {
                assert_eq!(output, PathBuf::from("mem.bin"));
                assert_eq!(address, 0);
                assert_eq!(length, 0x1_0000);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(Args::try_parse_from(["ultiplay", "ram", "dump", "--address", "0x10000"]).is_err());
    }

    #[test]
    fn test_verbosity_counts() {
        let args = Args::parse_from(["ultiplay", "stop", "-vv", "--drive", "b"]);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.drive.map(Drive::from), Some(Drive::B));
    }
}
