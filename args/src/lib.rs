// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

pub use clap::Parser;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

pub const DEFAULT_SNAPLEN: u32 = 9230;
pub const DEFAULT_BUFFER: usize = 128 * 1024 * 1024;

#[derive(Debug, Parser)]
#[command(name = "capture")]
#[command(version = "1.0")]
#[command(about = "Dump raw multicast UDP traffic to a pcap file", long_about = None)]
#[command(
    override_usage = "capture [options] -i <iface-addr> <file> <group>:<port>..."
)]
pub struct CmdArgs {
    /// IP address of the capture interface.
    #[arg(short = 'i', long = "interface", value_name = "ADDR")]
    interface: Ipv4Addr,

    /// Maximum frame size to capture; longer frames are truncated by the NIC.
    #[arg(
        short = 's',
        long = "snaplen",
        value_name = "BYTES",
        default_value_t = DEFAULT_SNAPLEN,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    snaplen: u32,

    /// Maximum memory for buffering, in bytes.
    #[arg(long = "buffer", value_name = "BYTES", default_value_t = DEFAULT_BUFFER)]
    buffer: usize,

    /// CPU core for the network receive thread; negative leaves it unpinned.
    #[arg(
        short = 'N',
        long = "network-cpu",
        value_name = "CPU",
        default_value_t = -1,
        allow_negative_numbers = true
    )]
    network_cpu: i32,

    /// CPU core for the disk write thread; negative leaves it unpinned.
    #[arg(
        short = 'D',
        long = "disk-cpu",
        value_name = "CPU",
        default_value_t = -1,
        allow_negative_numbers = true
    )]
    disk_cpu: i32,

    /// Hint write-back after each flush for better performance on high-speed
    /// disks.
    #[arg(long = "sync")]
    sync: bool,

    /// Stamp records with a wall-clock software timestamp instead of zero.
    #[arg(long = "time")]
    time: bool,

    /// Output filename.
    #[arg(value_name = "FILE")]
    filename: PathBuf,

    /// Multicast streams to capture.
    #[arg(value_name = "GROUP:PORT", required = true, num_args = 1..)]
    endpoint: Vec<String>,
}

impl CmdArgs {
    pub fn interface(&self) -> Ipv4Addr {
        self.interface
    }

    pub fn snaplen(&self) -> u32 {
        self.snaplen
    }

    pub fn buffer(&self) -> usize {
        self.buffer
    }

    /// Requested network-thread CPU, if any.
    pub fn network_cpu(&self) -> Option<usize> {
        usize::try_from(self.network_cpu).ok()
    }

    /// Requested disk-thread CPU, if any.
    pub fn disk_cpu(&self) -> Option<usize> {
        usize::try_from(self.disk_cpu).ok()
    }

    pub fn sync(&self) -> bool {
        self.sync
    }

    pub fn time(&self) -> bool {
        self.time
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// The raw `group:port` strings; validated against the multicast range
    /// during capture setup, not at the CLI boundary.
    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.endpoint.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_command_line() {
        let args = CmdArgs::try_parse_from([
            "capture",
            "-i",
            "10.8.0.2",
            "-s",
            "100",
            "--buffer",
            "4096",
            "-N",
            "3",
            "-D",
            "4",
            "--sync",
            "out.pcap",
            "239.1.1.1:7148",
            "239.1.1.2:7148",
        ])
        .unwrap();
        assert_eq!(args.interface(), Ipv4Addr::new(10, 8, 0, 2));
        assert_eq!(args.snaplen(), 100);
        assert_eq!(args.buffer(), 4096);
        assert_eq!(args.network_cpu(), Some(3));
        assert_eq!(args.disk_cpu(), Some(4));
        assert!(args.sync());
        assert!(!args.time());
        assert_eq!(args.filename(), Path::new("out.pcap"));
        assert_eq!(
            args.endpoints().collect::<Vec<_>>(),
            ["239.1.1.1:7148", "239.1.1.2:7148"]
        );
    }

    #[test]
    fn defaults_match_the_tool_contract() {
        let args =
            CmdArgs::try_parse_from(["capture", "-i", "10.8.0.2", "out.pcap", "239.1.1.1:7148"])
                .unwrap();
        assert_eq!(args.snaplen(), 9230);
        assert_eq!(args.buffer(), 128 * 1024 * 1024);
        assert_eq!(args.network_cpu(), None);
        assert_eq!(args.disk_cpu(), None);
        assert!(!args.sync());
        assert!(!args.time());
    }

    #[test]
    fn interface_is_required() {
        let err =
            CmdArgs::try_parse_from(["capture", "out.pcap", "239.1.1.1:7148"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn at_least_one_endpoint_is_required() {
        let err = CmdArgs::try_parse_from(["capture", "-i", "10.8.0.2", "out.pcap"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn bad_interface_is_a_usage_error() {
        let err = CmdArgs::try_parse_from([
            "capture",
            "-i",
            "not-an-address",
            "out.pcap",
            "239.1.1.1:7148",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn negative_cpu_means_unpinned() {
        let args = CmdArgs::try_parse_from([
            "capture",
            "-i",
            "10.8.0.2",
            "-N",
            "-1",
            "out.pcap",
            "239.1.1.1:7148",
        ])
        .unwrap();
        assert_eq!(args.network_cpu(), None);
    }
}
