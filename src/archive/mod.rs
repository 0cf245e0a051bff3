//! Store-only zip archive encoding.
//!
//! This module builds a single uncompressed zip byte stream from a set of
//! named byte blobs. Every entry uses the "store" method, so the bytes in the
//! archive are exactly the bytes that were fetched and the CRC in each header
//! can be checked by any standard zip reader.
//!
//! # Layout
//!
//! - One local file header + name + raw data per entry, in insertion order
//! - One central directory record + name per entry
//! - One end-of-central-directory record
//!
//! Only the classic (non-ZIP64) layout is produced. [`ArchiveBlob::push`]
//! refuses entries that would exceed its 16-bit entry count or 32-bit size
//! and offset fields.
//!
//! # Example
//!
//! ```
//! use asset_bundler::archive::{ArchiveBlob, ArchiveEntry};
//!
//! # fn example() -> Result<(), asset_bundler::archive::ArchiveError> {
//! let mut blob = ArchiveBlob::now();
//! blob.push(ArchiveEntry::new("example.com/logo.png", b"png bytes".to_vec())?)?;
//! let bytes = blob.to_bytes();
//! assert_eq!(bytes.len() as u64, blob.encoded_len());
//! # Ok(())
//! # }
//! ```

pub mod crc;
mod writer;

use std::collections::HashSet;

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use thiserror::Error;

pub use crc::{Crc32, crc32};
pub use writer::{
    CENTRAL_HEADER_LEN, END_RECORD_LEN, LOCAL_HEADER_LEN, build_archive,
};

/// Largest entry count the classic end record can describe.
pub const MAX_ENTRIES: usize = u16::MAX as usize;

/// Largest size or offset a classic header field can hold.
pub const MAX_FIELD_VALUE: u64 = u32::MAX as u64;

/// Errors raised while assembling an [`ArchiveBlob`].
///
/// Encoding itself never fails; these errors guard the limits of the classic
/// zip layout before any bytes are produced.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArchiveError {
    /// Entry name is empty after separator normalization.
    #[error("archive entry name is empty")]
    EmptyName,

    /// Entry name does not fit the 16-bit name length field.
    #[error("archive entry name is {len} bytes, limit is {}", u16::MAX)]
    NameTooLong {
        /// Encoded name length in bytes.
        len: usize,
    },

    /// Entry data does not fit the 32-bit size field.
    #[error("archive entry {name} is {len} bytes, limit is {MAX_FIELD_VALUE}")]
    EntryTooLarge {
        /// Entry name.
        name: String,
        /// Data length in bytes.
        len: usize,
    },

    /// Another entry in the blob already uses this name.
    #[error("duplicate archive entry name: {name}")]
    DuplicateName {
        /// The colliding name.
        name: String,
    },

    /// Adding the entry would exceed the 16-bit entry count.
    #[error("archive already holds the maximum of {MAX_ENTRIES} entries")]
    TooManyEntries,

    /// Adding the entry would push an offset past the 32-bit limit.
    #[error("archive would exceed {MAX_FIELD_VALUE} bytes")]
    ArchiveTooLarge,
}

/// A named byte blob stored uncompressed in an archive.
///
/// The checksum and size are computed once at construction and always
/// describe exactly `data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    name: String,
    data: Vec<u8>,
    crc32: u32,
    size: u32,
}

impl ArchiveEntry {
    /// Creates an entry, normalizing path separators in `name` to `/`.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::EmptyName`], [`ArchiveError::NameTooLong`] or
    /// [`ArchiveError::EntryTooLarge`] when the entry cannot be described by
    /// classic zip headers.
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Result<Self, ArchiveError> {
        let name = normalize_entry_name(&name.into());
        if name.is_empty() {
            return Err(ArchiveError::EmptyName);
        }
        if u16::try_from(name.len()).is_err() {
            return Err(ArchiveError::NameTooLong { len: name.len() });
        }
        let Ok(size) = u32::try_from(data.len()) else {
            return Err(ArchiveError::EntryTooLarge {
                name,
                len: data.len(),
            });
        };

        Ok(Self {
            crc32: crc32(&data),
            size,
            name,
            data,
        })
    }

    /// Replaces the entry name, keeping the data and its checksum.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::EmptyName`] or [`ArchiveError::NameTooLong`].
    pub fn rename(mut self, name: impl Into<String>) -> Result<Self, ArchiveError> {
        let name = normalize_entry_name(&name.into());
        if name.is_empty() {
            return Err(ArchiveError::EmptyName);
        }
        if u16::try_from(name.len()).is_err() {
            return Err(ArchiveError::NameTooLong { len: name.len() });
        }
        self.name = name;
        Ok(self)
    }

    /// Entry path inside the archive.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw entry bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// CRC-32 of [`data`](Self::data).
    #[must_use]
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// Length of [`data`](Self::data) in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Bytes this entry contributes to the local section.
    fn local_len(&self) -> u64 {
        LOCAL_HEADER_LEN as u64 + self.name.len() as u64 + u64::from(self.size)
    }

    /// Bytes this entry contributes to the central directory.
    fn central_len(&self) -> u64 {
        CENTRAL_HEADER_LEN as u64 + self.name.len() as u64
    }
}

/// Converts backslash separators to `/` and drops leading slashes.
fn normalize_entry_name(name: &str) -> String {
    name.replace('\\', "/").trim_start_matches('/').to_string()
}

/// MS-DOS packed date and time, with two-second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosDateTime {
    /// Packed `hour << 11 | minute << 5 | second / 2`.
    pub time: u16,
    /// Packed `(year - 1980) << 9 | month << 5 | day`.
    pub date: u16,
}

impl DosDateTime {
    /// Earliest representable instant, 1980-01-01 00:00:00.
    pub const EPOCH: Self = Self {
        time: 0,
        date: (1 << 5) | 1,
    };

    /// Packs a calendar timestamp. Years outside 1980..=2107 clamp to the
    /// nearest representable value.
    #[must_use]
    pub fn from_datetime(datetime: &NaiveDateTime) -> Self {
        let year = datetime.year();
        if year < 1980 {
            return Self::EPOCH;
        }
        if year > 2107 {
            return Self {
                time: (23 << 11) | (59 << 5) | 29,
                date: (127 << 9) | (12 << 5) | 31,
            };
        }

        // All components are range-checked above or bounded by chrono.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let date = (((year - 1980) as u16) << 9)
            | ((datetime.month() as u16) << 5)
            | datetime.day() as u16;
        #[allow(clippy::cast_possible_truncation)]
        let time = ((datetime.hour() as u16) << 11)
            | ((datetime.minute() as u16) << 5)
            | (datetime.second() as u16 / 2);

        Self { time, date }
    }
}

/// Ordered archive entries plus the timestamp stamped on every header.
#[derive(Debug, Clone)]
pub struct ArchiveBlob {
    entries: Vec<ArchiveEntry>,
    names: HashSet<String>,
    timestamp: DosDateTime,
    local_len: u64,
    central_len: u64,
}

impl ArchiveBlob {
    /// Creates an empty blob stamped with `timestamp`.
    #[must_use]
    pub fn new(timestamp: &NaiveDateTime) -> Self {
        Self {
            entries: Vec::new(),
            names: HashSet::new(),
            timestamp: DosDateTime::from_datetime(timestamp),
            local_len: 0,
            central_len: 0,
        }
    }

    /// Creates an empty blob stamped with the current local time.
    #[must_use]
    pub fn now() -> Self {
        Self::new(&Local::now().naive_local())
    }

    /// Appends an entry, preserving insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::DuplicateName`] if the name is taken,
    /// [`ArchiveError::TooManyEntries`] past 65535 entries, or
    /// [`ArchiveError::ArchiveTooLarge`] when a header offset would overflow.
    pub fn push(&mut self, entry: ArchiveEntry) -> Result<(), ArchiveError> {
        if self.names.contains(entry.name()) {
            return Err(ArchiveError::DuplicateName {
                name: entry.name.clone(),
            });
        }
        if self.entries.len() >= MAX_ENTRIES {
            return Err(ArchiveError::TooManyEntries);
        }

        let local_len = self.local_len + entry.local_len();
        let central_len = self.central_len + entry.central_len();
        if local_len > MAX_FIELD_VALUE || central_len > MAX_FIELD_VALUE {
            return Err(ArchiveError::ArchiveTooLarge);
        }

        self.local_len = local_len;
        self.central_len = central_len;
        self.names.insert(entry.name.clone());
        self.entries.push(entry);
        Ok(())
    }

    /// Entries in archive order.
    #[must_use]
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the blob holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Timestamp written into every header.
    #[must_use]
    pub fn timestamp(&self) -> DosDateTime {
        self.timestamp
    }

    /// Sum of data sizes across all entries.
    #[must_use]
    pub fn data_len(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.size)).sum()
    }

    /// Exact length of [`to_bytes`](Self::to_bytes) output.
    #[must_use]
    pub fn encoded_len(&self) -> u64 {
        self.local_len + self.central_len + END_RECORD_LEN as u64
    }

    /// Serializes the blob into zip bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        build_archive(self)
    }
}
