// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! pcap stream emission.
//!
//! Classic (non-ng) pcap, little-endian variant, link type Ethernet. The
//! format is simple enough that no capture library is worth linking; the
//! headers below are the on-disk layout and are emitted as raw bytes.

// Record headers live inside DMA chunk memory and are written to disk as
// their in-memory image, so field stores must already be little-endian.
#[cfg(target_endian = "big")]
compile_error!("pcap emission writes in-memory headers verbatim and needs a little-endian host");

pub mod writer;

pub use writer::{Writer, WriterError, DEFAULT_BUFFER_SIZE};

/// Magic for the little-endian classic variant this tool emits.
pub const MAGIC: u32 = 0xA1B2_3C4D;
pub const VERSION_MAJOR: u16 = 2;
pub const VERSION_MINOR: u16 = 4;
/// DLT_EN10MB: frames start at the Ethernet header.
pub const LINKTYPE_ETHERNET: u32 = 1;

/// pcap file header: see <https://wiki.wireshark.org/Development/LibpcapFileFormat>
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub magic_number: u32,
    pub version_major: u16,
    pub version_minor: u16,
    pub this_zone: i32,
    pub sigfigs: u32,
    pub snaplen: u32,
    pub network: u32,
}

impl FileHeader {
    pub const SIZE: usize = std::mem::size_of::<FileHeader>();

    #[must_use]
    pub fn new(snaplen: u32) -> FileHeader {
        FileHeader {
            magic_number: MAGIC,
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            this_zone: 0,
            sigfigs: 0,
            snaplen,
            network: LINKTYPE_ETHERNET,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; Self::SIZE] {
        // SAFETY: repr(C) with 4/2/2/4/4/4/4-byte fields leaves no padding.
        unsafe { &*std::ptr::from_ref(self).cast::<[u8; Self::SIZE]>() }
    }
}

/// pcap record header: see <https://wiki.wireshark.org/Development/LibpcapFileFormat>
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordHeader {
    pub ts_sec: u32,
    pub ts_usec: u32,
    pub incl_len: u32,
    pub orig_len: u32,
}

impl RecordHeader {
    pub const SIZE: usize = std::mem::size_of::<RecordHeader>();

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; Self::SIZE] {
        // SAFETY: repr(C) with four u32 fields leaves no padding.
        unsafe { &*std::ptr::from_ref(self).cast::<[u8; Self::SIZE]>() }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn file_header_layout_is_packed() {
        assert_eq!(FileHeader::SIZE, 24);
        assert_eq!(RecordHeader::SIZE, 16);
    }

    #[test]
    fn file_header_bytes_for_snaplen_100() {
        let header = FileHeader::new(100);
        let bytes = header.as_bytes();
        assert_eq!(&bytes[0..4], &[0x4d, 0x3c, 0xb2, 0xa1]);
        assert_eq!(&bytes[4..8], &[0x02, 0x00, 0x04, 0x00]);
        assert_eq!(&bytes[8..16], &[0; 8]);
        assert_eq!(&bytes[16..20], &[0x64, 0x00, 0x00, 0x00]);
        assert_eq!(&bytes[20..24], &[0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn record_header_bytes() {
        let record = RecordHeader {
            ts_sec: 0,
            ts_usec: 0,
            incl_len: 106,
            orig_len: 106,
        };
        let bytes = record.as_bytes();
        assert_eq!(&bytes[0..8], &[0; 8]);
        assert_eq!(&bytes[8..12], &[106, 0, 0, 0]);
        assert_eq!(&bytes[12..16], &[106, 0, 0, 0]);
    }
}
