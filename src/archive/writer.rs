//! Byte-level zip layout for store-only archives.

use super::{ArchiveBlob, ArchiveEntry, DosDateTime};

const LOCAL_FILE_SIGNATURE: u32 = 0x0403_4b50;
const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0201_4b50;
const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0605_4b50;

/// Version 2.0: the minimum readers need for stored entries with directories.
const VERSION: u16 = 20;

/// General purpose bit 11: names are UTF-8.
const FLAG_UTF8_NAMES: u16 = 1 << 11;

/// Compression method 0.
const METHOD_STORE: u16 = 0;

/// Fixed part of a local file header.
pub const LOCAL_HEADER_LEN: usize = 30;

/// Fixed part of a central directory record.
pub const CENTRAL_HEADER_LEN: usize = 46;

/// End-of-central-directory record without a comment.
pub const END_RECORD_LEN: usize = 22;

/// Serializes `blob` into a complete zip byte stream.
///
/// Entries appear in the blob's insertion order. The output length always
/// equals [`ArchiveBlob::encoded_len`].
#[must_use]
pub fn build_archive(blob: &ArchiveBlob) -> Vec<u8> {
    let mut out = Vec::with_capacity(usize::try_from(blob.encoded_len()).unwrap_or(0));
    let timestamp = blob.timestamp();

    let mut offsets = Vec::with_capacity(blob.len());
    for entry in blob.entries() {
        offsets.push(field32(out.len()));
        write_local_entry(&mut out, entry, timestamp);
    }

    let central_start = out.len();
    for (entry, offset) in blob.entries().iter().zip(offsets) {
        write_central_record(&mut out, entry, timestamp, offset);
    }
    let central_len = out.len() - central_start;

    write_end_record(&mut out, blob.len(), central_len, central_start);

    debug_assert_eq!(out.len() as u64, blob.encoded_len());
    out
}

fn write_local_entry(out: &mut Vec<u8>, entry: &ArchiveEntry, timestamp: DosDateTime) {
    put_u32(out, LOCAL_FILE_SIGNATURE);
    put_u16(out, VERSION);
    put_u16(out, FLAG_UTF8_NAMES);
    put_u16(out, METHOD_STORE);
    put_u16(out, timestamp.time);
    put_u16(out, timestamp.date);
    put_u32(out, entry.crc32());
    put_u32(out, entry.size()); // compressed
    put_u32(out, entry.size()); // uncompressed
    put_u16(out, field16(entry.name().len()));
    put_u16(out, 0); // extra field length
    out.extend_from_slice(entry.name().as_bytes());
    out.extend_from_slice(entry.data());
}

fn write_central_record(
    out: &mut Vec<u8>,
    entry: &ArchiveEntry,
    timestamp: DosDateTime,
    local_offset: u32,
) {
    put_u32(out, CENTRAL_DIRECTORY_SIGNATURE);
    put_u16(out, VERSION); // made by
    put_u16(out, VERSION); // needed to extract
    put_u16(out, FLAG_UTF8_NAMES);
    put_u16(out, METHOD_STORE);
    put_u16(out, timestamp.time);
    put_u16(out, timestamp.date);
    put_u32(out, entry.crc32());
    put_u32(out, entry.size());
    put_u32(out, entry.size());
    put_u16(out, field16(entry.name().len()));
    put_u16(out, 0); // extra field length
    put_u16(out, 0); // comment length
    put_u16(out, 0); // disk number start
    put_u16(out, 0); // internal attributes
    put_u32(out, 0); // external attributes
    put_u32(out, local_offset);
    out.extend_from_slice(entry.name().as_bytes());
}

fn write_end_record(out: &mut Vec<u8>, count: usize, central_len: usize, central_start: usize) {
    let count = field16(count);
    put_u32(out, END_OF_CENTRAL_DIRECTORY_SIGNATURE);
    put_u16(out, 0); // this disk
    put_u16(out, 0); // disk with central directory
    put_u16(out, count); // entries on this disk
    put_u16(out, count); // total entries
    put_u32(out, field32(central_len));
    put_u32(out, field32(central_start));
    put_u16(out, 0); // comment length
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

// `ArchiveBlob::push` keeps every count, size and offset within the classic
// field widths, so these conversions cannot saturate for blobs built through it.
fn field16(value: usize) -> u16 {
    debug_assert!(u16::try_from(value).is_ok(), "16-bit zip field overflow");
    u16::try_from(value).unwrap_or(u16::MAX)
}

fn field32(value: usize) -> u32 {
    debug_assert!(u32::try_from(value).is_ok(), "32-bit zip field overflow");
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn u16_at(bytes: &[u8], pos: usize) -> u16 {
        u16::from_le_bytes([bytes[pos], bytes[pos + 1]])
    }

    fn u32_at(bytes: &[u8], pos: usize) -> u32 {
        u32::from_le_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
    }

    fn sample_blob() -> ArchiveBlob {
        let ts = NaiveDate::from_ymd_opt(2024, 6, 30)
            .unwrap()
            .and_hms_opt(8, 30, 10)
            .unwrap();
        let mut blob = ArchiveBlob::new(&ts);
        blob.push(ArchiveEntry::new("a.txt", b"hello".to_vec()).unwrap())
            .unwrap();
        blob.push(ArchiveEntry::new("dir/b.bin", vec![0xAB; 3]).unwrap())
            .unwrap();
        blob
    }

    #[test]
    fn test_local_header_fields() {
        let blob = sample_blob();
        let bytes = build_archive(&blob);

        assert_eq!(u32_at(&bytes, 0), LOCAL_FILE_SIGNATURE);
        assert_eq!(u16_at(&bytes, 4), 20);
        assert_eq!(u16_at(&bytes, 6), 0x0800);
        assert_eq!(u16_at(&bytes, 8), 0);
        assert_eq!(u16_at(&bytes, 10), blob.timestamp().time);
        assert_eq!(u16_at(&bytes, 12), blob.timestamp().date);
        assert_eq!(u32_at(&bytes, 14), crate::archive::crc32(b"hello"));
        assert_eq!(u32_at(&bytes, 18), 5);
        assert_eq!(u32_at(&bytes, 22), 5);
        assert_eq!(u16_at(&bytes, 26), 5);
        assert_eq!(u16_at(&bytes, 28), 0);
        assert_eq!(&bytes[30..35], b"a.txt");
        assert_eq!(&bytes[35..40], b"hello");

        // Second local header follows immediately.
        assert_eq!(u32_at(&bytes, 40), LOCAL_FILE_SIGNATURE);
    }

    #[test]
    fn test_central_directory_points_at_local_headers() {
        let blob = sample_blob();
        let bytes = build_archive(&blob);

        let first_local_len = 30 + 5 + 5;
        let second_local_len = 30 + 9 + 3;
        let central_start = first_local_len + second_local_len;

        assert_eq!(u32_at(&bytes, central_start), CENTRAL_DIRECTORY_SIGNATURE);
        assert_eq!(u32_at(&bytes, central_start + 42), 0);
        assert_eq!(&bytes[central_start + 46..central_start + 51], b"a.txt");

        let second_central = central_start + 46 + 5;
        assert_eq!(u32_at(&bytes, second_central), CENTRAL_DIRECTORY_SIGNATURE);
        assert_eq!(
            u32_at(&bytes, second_central + 42),
            u32::try_from(first_local_len).unwrap()
        );
    }

    #[test]
    fn test_end_record_fields() {
        let blob = sample_blob();
        let bytes = build_archive(&blob);
        let end = bytes.len() - END_RECORD_LEN;

        let central_start = (30 + 5 + 5) + (30 + 9 + 3);
        let central_len = (46 + 5) + (46 + 9);

        assert_eq!(u32_at(&bytes, end), END_OF_CENTRAL_DIRECTORY_SIGNATURE);
        assert_eq!(u16_at(&bytes, end + 8), 2);
        assert_eq!(u16_at(&bytes, end + 10), 2);
        assert_eq!(u32_at(&bytes, end + 12), central_len);
        assert_eq!(u32_at(&bytes, end + 16), central_start);
        assert_eq!(u16_at(&bytes, end + 20), 0);
        assert_eq!(bytes.len() as u64, blob.encoded_len());
    }

    #[test]
    fn test_output_is_deterministic() {
        let blob = sample_blob();
        assert_eq!(build_archive(&blob), build_archive(&blob));
    }
}
