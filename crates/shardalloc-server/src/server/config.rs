use anyhow::Context;
use clap::Parser;
use shardalloc::{AddressSpaceConfig, DEFAULT_SEEDS_FILE, DEFAULT_SHARD_COUNT, DEFAULT_SHARD_OVERLAP};
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};

/// Runtime configuration for the `shardalloc-server` binary.
///
/// The two partitioning tunables are fixed for the lifetime of the process:
/// every anchor handed out depends on them, and changing them between restarts
/// only affects seeds that register afterwards. All values are parsed from CLI
/// arguments or environment variables.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "shardalloc-server",
    version,
    about = "An HTTP service assigning durable shard ranges to ledger nodes"
)]
pub struct CliArgs {
    /// Number of logical partitions the address space is divided into.
    ///
    /// Must be greater than 0. Once this many seeds have registered, later
    /// seeds reuse partition indices round-robin.
    ///
    /// Environment variable: `SHARD_COUNT`
    #[arg(long, env = "SHARD_COUNT", default_value_t = DEFAULT_SHARD_COUNT, allow_negative_numbers = true)]
    pub shard_count: i64,

    /// Fraction of a chunk shared with its neighbor, in `[0, 1)`.
    ///
    /// Environment variable: `SHARD_OVERLAP`
    #[arg(long, env = "SHARD_OVERLAP", default_value_t = DEFAULT_SHARD_OVERLAP, allow_negative_numbers = true)]
    pub shard_overlap: f64,

    /// Address to bind the HTTP listener to.
    ///
    /// Environment variable: `BIND_ADDR`
    #[arg(long = "bind", env = "BIND_ADDR", default_value_t = IpAddr::from([0, 0, 0, 0]))]
    pub bind_addr: IpAddr,

    /// Port to listen on.
    ///
    /// Environment variable: `PORT`
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Path of the seed file holding every assignment.
    ///
    /// Environment variable: `SEEDS_FILE`
    #[arg(long, env = "SEEDS_FILE", default_value = DEFAULT_SEEDS_FILE)]
    pub seeds_file: PathBuf,

    /// Flush the seed file and its directory to disk on every write.
    ///
    /// Environment variable: `SEEDS_FSYNC`
    #[arg(long, env = "SEEDS_FSYNC", default_value_t = true, action = clap::ArgAction::Set)]
    pub fsync: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address_space: AddressSpaceConfig,
    pub listen_addr: SocketAddr,
    pub seeds_file: PathBuf,
    pub fsync: bool,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let address_space = AddressSpaceConfig::load(args.shard_count, args.shard_overlap)
            .context("invalid SHARD_COUNT/SHARD_OVERLAP")?;

        if args.seeds_file.as_os_str().is_empty() {
            anyhow::bail!("SEEDS_FILE must not be empty");
        }

        Ok(Self {
            address_space,
            listen_addr: SocketAddr::new(args.bind_addr, args.port),
            seeds_file: args.seeds_file,
            fsync: args.fsync,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let args = CliArgs::try_parse_from(
            core::iter::once("shardalloc-server").chain(args.iter().copied()),
        )?;
        ServerConfig::try_from(args)
    }

    #[test]
    fn defaults_apply_without_flags() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.address_space, AddressSpaceConfig::default());
        assert_eq!(config.listen_addr, SocketAddr::from(([0, 0, 0, 0], 8080)));
        assert_eq!(config.seeds_file, PathBuf::from("seeds.db"));
        assert!(config.fsync);
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--shard-count",
            "4",
            "--shard-overlap",
            "0.5",
            "--bind",
            "127.0.0.1",
            "--port",
            "9000",
            "--seeds-file",
            "/tmp/seeds.json",
            "--fsync",
            "false",
        ])
        .unwrap();
        assert_eq!(config.address_space.shard_count(), 4);
        assert_eq!(config.address_space.shard_overlap(), 0.5);
        assert_eq!(config.listen_addr, SocketAddr::from(([127, 0, 0, 1], 9000)));
        assert_eq!(config.seeds_file, PathBuf::from("/tmp/seeds.json"));
        assert!(!config.fsync);
    }

    #[test]
    fn invalid_partitioning_is_fatal() {
        assert!(parse(&["--shard-count", "0"]).is_err());
        assert!(parse(&["--shard-count", "-5"]).is_err());
        assert!(parse(&["--shard-overlap", "1.0"]).is_err());
        assert!(parse(&["--shard-overlap", "-0.2"]).is_err());
        assert!(parse(&["--shard-count", "ten"]).is_err());
    }
}
