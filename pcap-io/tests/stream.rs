// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! Re-parse emitted pcap streams with an independent reader.

use std::io::{Read, Seek};

use pcap_io::{FileHeader, RecordHeader, Writer, LINKTYPE_ETHERNET, MAGIC};

struct ParsedRecord {
    incl_len: u32,
    orig_len: u32,
    payload: Vec<u8>,
}

/// Minimal classic-pcap reader used only to check what the writer produced.
fn parse(bytes: &[u8]) -> (FileHeader, Vec<ParsedRecord>) {
    let u32_at = |off: usize| u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
    let u16_at = |off: usize| u16::from_le_bytes(bytes[off..off + 2].try_into().unwrap());

    assert!(bytes.len() >= FileHeader::SIZE, "truncated file header");
    let header = FileHeader {
        magic_number: u32_at(0),
        version_major: u16_at(4),
        version_minor: u16_at(6),
        this_zone: u32_at(8) as i32,
        sigfigs: u32_at(12),
        snaplen: u32_at(16),
        network: u32_at(20),
    };

    let mut records = Vec::new();
    let mut off = FileHeader::SIZE;
    while off < bytes.len() {
        assert!(bytes.len() - off >= RecordHeader::SIZE, "truncated record");
        let incl_len = u32_at(off + 8);
        let orig_len = u32_at(off + 12);
        let start = off + RecordHeader::SIZE;
        let end = start + incl_len as usize;
        assert!(bytes.len() >= end, "truncated payload");
        records.push(ParsedRecord {
            incl_len,
            orig_len,
            payload: bytes[start..end].to_vec(),
        });
        off = end;
    }
    (header, records)
}

fn frame(len: usize, fill: u8) -> Vec<u8> {
    vec![fill; len]
}

#[test]
fn emitted_stream_reparses_in_order() {
    let tmp = tempfile::tempfile().unwrap();
    let mut probe = tmp.try_clone().unwrap();
    // A staging buffer smaller than the stream, so flush boundaries fall
    // inside records.
    let mut writer = Writer::new(tmp, 64, false).unwrap();

    writer.write(FileHeader::new(100).as_bytes()).unwrap();
    let lengths = [106u32, 122, 82];
    for (i, &len) in lengths.iter().enumerate() {
        let record = RecordHeader {
            ts_sec: 0,
            ts_usec: 0,
            incl_len: len,
            orig_len: len,
        };
        writer.write(record.as_bytes()).unwrap();
        writer.write(&frame(len as usize, i as u8)).unwrap();
    }
    writer.close().unwrap();

    probe.rewind().unwrap();
    let mut bytes = Vec::new();
    probe.read_to_end(&mut bytes).unwrap();

    let (header, records) = parse(&bytes);
    assert_eq!(header.magic_number, MAGIC);
    assert_eq!(header.version_major, 2);
    assert_eq!(header.version_minor, 4);
    assert_eq!(header.snaplen, 100);
    assert_eq!(header.network, LINKTYPE_ETHERNET);

    assert_eq!(records.len(), lengths.len());
    for (i, (record, &len)) in records.iter().zip(lengths.iter()).enumerate() {
        assert_eq!(record.incl_len, len);
        assert_eq!(record.orig_len, len);
        assert_eq!(record.payload, frame(len as usize, i as u8));
    }
}

#[test]
fn header_only_stream_is_valid() {
    let tmp = tempfile::tempfile().unwrap();
    let mut probe = tmp.try_clone().unwrap();
    let mut writer = Writer::new(tmp, 4096, false).unwrap();

    writer.write(FileHeader::new(9230).as_bytes()).unwrap();
    writer.close().unwrap();

    probe.rewind().unwrap();
    let mut bytes = Vec::new();
    probe.read_to_end(&mut bytes).unwrap();

    let (header, records) = parse(&bytes);
    assert_eq!(header.snaplen, 9230);
    assert!(records.is_empty());
}
