//! Minimal TIFF/IFD plumbing shared by the GPS writer and reader.
//!
//! Offsets are relative to the start of the TIFF header, as stored in EXIF.

use std::ops::Range;

// TIFF field types
pub const FORMAT_BYTE: u16 = 1;
pub const FORMAT_ASCII: u16 = 2;
pub const FORMAT_SHORT: u16 = 3;
pub const FORMAT_LONG: u16 = 4;
pub const FORMAT_RATIONAL: u16 = 5;

/// IFD0 tag pointing at the GPS sub-IFD.
pub const TAG_GPS_IFD_POINTER: u16 = 0x8825;

const ENTRY_SIZE: usize = 12;

/// Byte order declared in the TIFF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Read the byte order marker (`II` / `MM`) at the start of a TIFF block.
    pub fn detect(tiff: &[u8]) -> Option<Self> {
        match tiff.get(0..2)? {
            b"II" => Some(Self::Little),
            b"MM" => Some(Self::Big),
            _ => None,
        }
    }

    pub fn read_u16(self, data: &[u8], offset: usize) -> Option<u16> {
        let bytes: [u8; 2] = data.get(offset..offset + 2)?.try_into().ok()?;
        Some(match self {
            Self::Little => u16::from_le_bytes(bytes),
            Self::Big => u16::from_be_bytes(bytes),
        })
    }

    pub fn read_u32(self, data: &[u8], offset: usize) -> Option<u32> {
        let bytes: [u8; 4] = data.get(offset..offset + 4)?.try_into().ok()?;
        Some(match self {
            Self::Little => u32::from_le_bytes(bytes),
            Self::Big => u32::from_be_bytes(bytes),
        })
    }

    pub fn encode_u16(self, val: u16) -> [u8; 2] {
        match self {
            Self::Little => val.to_le_bytes(),
            Self::Big => val.to_be_bytes(),
        }
    }

    pub fn encode_u32(self, val: u32) -> [u8; 4] {
        match self {
            Self::Little => val.to_le_bytes(),
            Self::Big => val.to_be_bytes(),
        }
    }

    /// Encode unsigned rationals as consecutive numerator/denominator pairs.
    pub fn encode_rationals(self, values: &[(u32, u32)]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(values.len() * 8);
        for &(num, den) in values {
            bytes.extend_from_slice(&self.encode_u32(num));
            bytes.extend_from_slice(&self.encode_u32(den));
        }
        bytes
    }
}

/// One 12-byte IFD entry as stored on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub tag: u16,
    pub format: u16,
    pub count: u32,
    /// Inline value or offset, still in file byte order.
    pub value: [u8; 4],
}

impl RawEntry {
    pub fn to_bytes(&self, order: ByteOrder) -> [u8; ENTRY_SIZE] {
        let mut out = [0u8; ENTRY_SIZE];
        out[0..2].copy_from_slice(&order.encode_u16(self.tag));
        out[2..4].copy_from_slice(&order.encode_u16(self.format));
        out[4..8].copy_from_slice(&order.encode_u32(self.count));
        out[8..12].copy_from_slice(&self.value);
        out
    }

    /// Size in bytes of the value this entry describes.
    pub fn data_len(&self) -> Option<usize> {
        let unit: usize = match self.format {
            FORMAT_BYTE | FORMAT_ASCII | 6 | 7 => 1,
            FORMAT_SHORT | 8 => 2,
            FORMAT_LONG | 9 | 11 => 4,
            FORMAT_RATIONAL | 10 | 12 => 8,
            _ => return None,
        };
        unit.checked_mul(self.count as usize)
    }

    /// Byte range of an out-of-line value, or None when it is stored inline.
    pub fn data_range(&self, order: ByteOrder) -> Option<Range<usize>> {
        let len = self.data_len()?;
        if len <= 4 {
            return None;
        }
        let offset = order.read_u32(&self.value, 0)? as usize;
        Some(offset..offset.checked_add(len)?)
    }

    /// Borrow the entry's value bytes, following the offset when it does not fit inline.
    pub fn data<'a>(&'a self, tiff: &'a [u8], order: ByteOrder) -> Option<&'a [u8]> {
        let len = self.data_len()?;
        if len <= 4 {
            return self.value.get(..len);
        }
        tiff.get(self.data_range(order)?)
    }
}

/// A parsed image file directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Ifd {
    pub entries: Vec<RawEntry>,
    pub next: u32,
}

impl Ifd {
    pub fn find(&self, tag: u16) -> Option<&RawEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    /// Bytes occupied by this IFD when stored at `offset`: the entry table
    /// followed by every out-of-line value inside `tiff`, sorted by start.
    pub fn footprint(&self, tiff: &[u8], order: ByteOrder, offset: usize) -> Vec<Range<usize>> {
        let mut ranges = vec![offset..offset + 2 + self.entries.len() * ENTRY_SIZE + 4];
        ranges.extend(
            self.entries
                .iter()
                .filter_map(|e| e.data_range(order))
                .filter(|r| r.end <= tiff.len()),
        );
        ranges.sort_by_key(|r| r.start);
        ranges
    }
}

/// The single span covered by `ranges` (sorted by start), allowing one
/// padding byte between neighbours. None if they leave a larger gap.
pub fn contiguous_span(ranges: &[Range<usize>]) -> Option<Range<usize>> {
    let first = ranges.first()?;
    let mut span = first.clone();
    for r in &ranges[1..] {
        if r.start > span.end + 1 {
            return None;
        }
        span.end = span.end.max(r.end);
    }
    Some(span)
}

/// Offset of IFD0 from the TIFF header, after checking the magic number.
pub fn first_ifd_offset(tiff: &[u8], order: ByteOrder) -> Option<usize> {
    if order.read_u16(tiff, 2)? != 42 {
        return None;
    }
    Some(order.read_u32(tiff, 4)? as usize)
}

/// Parse the IFD at `offset`. Returns None if it runs past the end of the data.
pub fn read_ifd(tiff: &[u8], order: ByteOrder, offset: usize) -> Option<Ifd> {
    let count = order.read_u16(tiff, offset)? as usize;
    let start = offset + 2;
    let end = start + count * ENTRY_SIZE;
    let next = order.read_u32(tiff, end)?;

    let entries = (0..count)
        .map(|i| {
            let eo = start + i * ENTRY_SIZE;
            Some(RawEntry {
                tag: order.read_u16(tiff, eo)?,
                format: order.read_u16(tiff, eo + 2)?,
                count: order.read_u32(tiff, eo + 4)?,
                value: tiff.get(eo + 8..eo + 12)?.try_into().ok()?,
            })
        })
        .collect::<Option<Vec<_>>>()?;

    Some(Ifd { entries, next })
}

/// A tag and its value bytes, not yet placed in a TIFF block.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEntry {
    pub tag: u16,
    pub format: u16,
    pub count: u32,
    pub data: Vec<u8>,
}

/// Serialize an IFD holding `entries` as if stored at offset `base`.
///
/// Entries are written sorted by tag, with out-of-line values right after
/// the entry table.
pub fn encode_ifd(order: ByteOrder, entries: &[PendingEntry], next: u32, base: usize) -> Option<Vec<u8>> {
    let mut sorted: Vec<&PendingEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.tag);

    let data_start = base + 2 + sorted.len() * ENTRY_SIZE + 4;
    let mut data_off = data_start;
    let mut blobs: Vec<u8> = Vec::new();

    let mut out = Vec::with_capacity(data_start - base);
    out.extend_from_slice(&order.encode_u16(u16::try_from(sorted.len()).ok()?));
    for entry in &sorted {
        let mut value = [0u8; 4];
        if entry.data.len() <= 4 {
            value[..entry.data.len()].copy_from_slice(&entry.data);
        } else {
            // Keep values word-aligned
            if blobs.len() % 2 != 0 {
                blobs.push(0);
                data_off += 1;
            }
            value = order.encode_u32(u32::try_from(data_off).ok()?);
            blobs.extend_from_slice(&entry.data);
            data_off += entry.data.len();
        }
        let raw = RawEntry {
            tag: entry.tag,
            format: entry.format,
            count: entry.count,
            value,
        };
        out.extend_from_slice(&raw.to_bytes(order));
    }
    out.extend_from_slice(&order.encode_u32(next));
    out.extend_from_slice(&blobs);
    // Every offset in the block must fit in 32 bits
    if u32::try_from(base + out.len()).is_err() {
        return None;
    }

    Some(out)
}

/// Append an IFD holding `entries` (plus any out-of-line values) to `out`.
///
/// Returns the offset of the new IFD.
pub fn append_ifd(out: &mut Vec<u8>, order: ByteOrder, entries: &[PendingEntry], next: u32) -> Option<u32> {
    // IFDs must start on a word boundary
    if out.len() % 2 != 0 {
        out.push(0);
    }

    let ifd_start = out.len();
    let encoded = encode_ifd(order, entries, next, ifd_start)?;
    out.extend_from_slice(&encoded);

    u32::try_from(ifd_start).ok()
}

/// Append a copy of `ifd` with `replacement` swapped in (or inserted in tag order).
///
/// Out-of-line values of the copied entries keep pointing at their original
/// locations, which stay in place. Returns the offset of the new IFD.
pub fn append_ifd_with(out: &mut Vec<u8>, order: ByteOrder, ifd: &Ifd, replacement: RawEntry) -> Option<u32> {
    if out.len() % 2 != 0 {
        out.push(0);
    }

    let mut entries: Vec<RawEntry> = ifd
        .entries
        .iter()
        .filter(|e| e.tag != replacement.tag)
        .cloned()
        .collect();
    let pos = entries
        .iter()
        .position(|e| e.tag > replacement.tag)
        .unwrap_or(entries.len());
    entries.insert(pos, replacement);

    let ifd_start = out.len();
    out.extend_from_slice(&order.encode_u16(u16::try_from(entries.len()).ok()?));
    for entry in &entries {
        out.extend_from_slice(&entry.to_bytes(order));
    }
    out.extend_from_slice(&order.encode_u32(ifd.next));

    u32::try_from(ifd_start).ok()
}
