//! Persisted index format.
//!
//! A little-endian binary blob:
//!
//! ```text
//! magic "HC2L" | version u32 | n u64 | height u16 | bitmask_words u16
//! label_blob_len u64 | label_blob ((hub u32, dist u32) pairs)
//! per_node_table (n x { offset u64, length u32, depth u16, bitmask_words u16, bitmask words u64... })
//! chain_table (n x parent u32, n x dist u32)
//! stats (num_cuts u64, sum_cut_sizes u64, max_cut_size u32, num_shortcuts u64)
//! ```
//!
//! The table covers nodes `1..=n`; slot `0` is the sentinel and not stored.
//! Any incompatible layout change requires a version bump.

use crate::algo::contraction_index::ContractionIndex;
use std::io::{Error, ErrorKind, Read, Result, Write};

const MAGIC: [u8; 4] = *b"HC2L";
const VERSION: u32 = 1;

impl ContractionIndex {
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let parts = self.raw_parts();
        let n = parts.fold_parent.len() - 1;
        let words = parts.bitmask_words as usize;

        writer.write_all(&MAGIC)?;
        write_u32(writer, VERSION)?;
        write_u64(writer, n as u64)?;
        write_u16(writer, parts.height)?;
        write_u16(writer, parts.bitmask_words)?;

        write_u64(writer, (parts.hubs.len() * 8) as u64)?;
        for (&hub, &dist) in parts.hubs.iter().zip(parts.hub_dists.iter()) {
            write_u32(writer, hub)?;
            write_u32(writer, dist)?;
        }

        for node in 1..=n {
            let offset = parts.label_first[node];
            let length = parts.label_first[node + 1] - offset;
            write_u64(writer, offset)?;
            write_u32(writer, length as u32)?;
            write_u16(writer, parts.depth[node])?;
            write_u16(writer, parts.bitmask_words)?;
            for &word in &parts.partition[node * words..(node + 1) * words] {
                write_u64(writer, word)?;
            }
        }

        for node in 1..=n {
            write_u32(writer, parts.fold_parent[node])?;
        }
        for node in 1..=n {
            write_u32(writer, parts.fold_dist[node])?;
        }

        write_u64(writer, parts.num_cuts)?;
        write_u64(writer, parts.sum_cut_sizes)?;
        write_u32(writer, parts.max_cut_size)?;
        write_u64(writer, parts.num_shortcuts)?;

        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<ContractionIndex> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(invalid("not an index file"));
        }
        let version = read_u32(reader)?;
        if version != VERSION {
            return Err(invalid(&format!("unsupported index version {}", version)));
        }

        let n = read_u64(reader)? as usize;
        let height = read_u16(reader)?;
        let bitmask_words = read_u16(reader)?;
        let words = bitmask_words as usize;

        let label_blob_len = read_u64(reader)? as usize;
        if label_blob_len % 8 != 0 {
            return Err(invalid("label blob length not a multiple of the pair size"));
        }
        let num_pairs = label_blob_len / 8;
        let mut hubs = Vec::with_capacity(num_pairs);
        let mut hub_dists = Vec::with_capacity(num_pairs);
        for _ in 0..num_pairs {
            hubs.push(read_u32(reader)?);
            hub_dists.push(read_u32(reader)?);
        }

        let num_slots = n + 1;
        let mut label_first = vec![0u64; num_slots + 1];
        let mut depth = vec![0u16; num_slots];
        let mut partition = vec![0u64; num_slots * words];
        for node in 1..=n {
            let offset = read_u64(reader)?;
            let length = read_u32(reader)? as u64;
            if offset != label_first[node] {
                return Err(invalid("per-node table is not contiguous"));
            }
            if offset + length > num_pairs as u64 {
                return Err(invalid("label range out of bounds"));
            }
            label_first[node + 1] = offset + length;
            depth[node] = read_u16(reader)?;
            let node_words = read_u16(reader)?;
            if node_words != bitmask_words {
                return Err(invalid("inconsistent bitmask width"));
            }
            for word in 0..words {
                partition[node * words + word] = read_u64(reader)?;
            }
        }
        if label_first[n + 1] != num_pairs as u64 {
            return Err(invalid("label blob larger than the per-node table covers"));
        }

        let mut fold_parent = vec![0u32; num_slots];
        for node in 1..=n {
            fold_parent[node] = read_u32(reader)?;
        }
        let mut fold_dist = vec![0u32; num_slots];
        for node in 1..=n {
            fold_dist[node] = read_u32(reader)?;
        }

        let num_cuts = read_u64(reader)?;
        let sum_cut_sizes = read_u64(reader)?;
        let max_cut_size = read_u32(reader)?;
        let num_shortcuts = read_u64(reader)?;

        Ok(ContractionIndex::from_raw_parts(
            height,
            bitmask_words,
            label_first,
            hubs,
            hub_dists,
            depth,
            partition,
            fold_parent,
            fold_dist,
            num_cuts,
            sum_cut_sizes,
            max_cut_size,
            num_shortcuts,
        ))
    }
}

fn invalid(message: &str) -> Error {
    Error::new(ErrorKind::InvalidData, message.to_string())
}

fn write_u16<W: Write>(writer: &mut W, value: u16) -> Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn write_u32<W: Write>(writer: &mut W, value: u32) -> Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn read_u16<R: Read>(reader: &mut R) -> Result<u16> {
    let mut buffer = [0u8; 2];
    reader.read_exact(&mut buffer)?;
    Ok(u16::from_le_bytes(buffer))
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buffer = [0u8; 4];
    reader.read_exact(&mut buffer)?;
    Ok(u32::from_le_bytes(buffer))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buffer = [0u8; 8];
    reader.read_exact(&mut buffer)?;
    Ok(u64::from_le_bytes(buffer))
}
