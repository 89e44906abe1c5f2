use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::ops::Range;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::MmapMut;
use navtile_mesh::{MeshError, NavMesh, NavMeshParams, TileRef};

use crate::{ContainerError, HEADER_SIZE, RECORD_HEADER_SIZE, SET_MAGIC, SET_VERSION};

/// Fixed-size head of a container.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContainerHeader {
    pub magic: u32,
    pub version: u32,
    pub tile_count: i32,
    pub params: NavMeshParams,
}

impl ContainerHeader {
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.magic)?;
        w.write_u32::<LittleEndian>(self.version)?;
        w.write_i32::<LittleEndian>(self.tile_count)?;
        for &v in &self.params.origin {
            w.write_f32::<LittleEndian>(v)?;
        }
        w.write_f32::<LittleEndian>(self.params.tile_width)?;
        w.write_f32::<LittleEndian>(self.params.tile_height)?;
        w.write_i32::<LittleEndian>(self.params.max_tiles)?;
        w.write_i32::<LittleEndian>(self.params.max_polys)?;
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let magic = r.read_u32::<LittleEndian>()?;
        let version = r.read_u32::<LittleEndian>()?;
        let tile_count = r.read_i32::<LittleEndian>()?;
        let mut origin = [0.0; 3];
        for v in &mut origin {
            *v = r.read_f32::<LittleEndian>()?;
        }
        Ok(Self {
            magic,
            version,
            tile_count,
            params: NavMeshParams {
                origin,
                tile_width: r.read_f32::<LittleEndian>()?,
                tile_height: r.read_f32::<LittleEndian>()?,
                max_tiles: r.read_i32::<LittleEndian>()?,
                max_polys: r.read_i32::<LittleEndian>()?,
            },
        })
    }
}

struct Record {
    tile_ref: TileRef,
    range: Range<usize>,
}

fn corrupt(msg: impl Into<String>) -> ContainerError {
    ContainerError::CorruptPayload(msg.into())
}

fn truncated(e: io::Error) -> ContainerError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => corrupt("container is truncated"),
        _ => ContainerError::Io(e),
    }
}

/// Errors from re-adding a record mean the file disagrees with itself.
fn record_error(index: usize, e: MeshError) -> ContainerError {
    match e {
        MeshError::CorruptPayload(_)
        | MeshError::InvalidReference(_)
        | MeshError::AlreadyOccupied { .. }
        | MeshError::CoordinateMismatch { .. } => corrupt(format!("tile record {index}: {e}")),
        other => ContainerError::Mesh(other),
    }
}

/// Reads and checks the header of a container.
pub fn read_header(bytes: &[u8]) -> Result<ContainerHeader, ContainerError> {
    let mut cur = Cursor::new(bytes);
    let magic = cur.read_u32::<LittleEndian>().map_err(truncated)?;
    let version = cur.read_u32::<LittleEndian>().map_err(truncated)?;
    if magic != SET_MAGIC || version != SET_VERSION {
        return Err(ContainerError::FormatMismatch { magic, version });
    }
    cur.set_position(0);
    let header = ContainerHeader::read_from(&mut cur).map_err(truncated)?;
    if header.tile_count < 0 {
        return Err(corrupt(format!("negative tile count {}", header.tile_count)));
    }
    Ok(header)
}

/// Walks every record, checking sizes against the buffer. No tile data is
/// parsed here.
fn scan(bytes: &[u8]) -> Result<(ContainerHeader, Vec<Record>), ContainerError> {
    let header = read_header(bytes)?;
    let count = header.tile_count as usize;
    // Every record holds at least a record header and one byte of data.
    let room = bytes.len().saturating_sub(HEADER_SIZE) / (RECORD_HEADER_SIZE + 1);
    if count > room {
        return Err(corrupt(format!("{count} tile records cannot fit in {} bytes", bytes.len())));
    }
    if header.tile_count > header.params.max_tiles {
        return Err(corrupt(format!(
            "{count} tile records exceed the capacity of {} tiles",
            header.params.max_tiles
        )));
    }
    let mut cur = Cursor::new(bytes);
    cur.set_position(HEADER_SIZE as u64);
    let mut records = Vec::with_capacity(count);
    for index in 0..count {
        let tile_ref = cur.read_u64::<LittleEndian>().map_err(truncated)?;
        let size = cur.read_i32::<LittleEndian>().map_err(truncated)?;
        if tile_ref == 0 {
            return Err(corrupt(format!("tile record {index} has a null reference")));
        }
        if size <= 0 {
            return Err(corrupt(format!("tile record {index} has size {size}")));
        }
        let start = cur.position() as usize;
        let end = start
            .checked_add(size as usize)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| corrupt(format!("tile record {index} runs past the end of the container")))?;
        records.push(Record { tile_ref: TileRef(tile_ref), range: start..end });
        cur.set_position(end as u64);
    }
    let used = cur.position() as usize;
    if used != bytes.len() {
        return Err(corrupt(format!("{} trailing bytes after the last tile", bytes.len() - used)));
    }
    Ok((header, records))
}

/// Writes every occupied tile of `mesh`, in slot order.
pub fn export<W: Write>(mesh: &NavMesh, w: &mut W) -> Result<(), ContainerError> {
    let header = ContainerHeader {
        magic: SET_MAGIC,
        version: SET_VERSION,
        tile_count: mesh.tile_count() as i32,
        params: *mesh.params(),
    };
    header.write_to(w)?;
    let mut written = 0;
    for tile in mesh.tiles() {
        let data = tile.bytes();
        w.write_u64::<LittleEndian>(tile.tile_ref.0)?;
        w.write_i32::<LittleEndian>(data.len() as i32)?;
        w.write_all(data)?;
        written += 1;
    }
    debug_assert_eq!(written, mesh.tile_count());
    log::debug!("exported {written} tiles");
    Ok(())
}

pub fn save_to_path(mesh: &NavMesh, path: impl AsRef<Path>) -> Result<(), ContainerError> {
    let path = path.as_ref();
    let mut w = BufWriter::new(File::create(path)?);
    export(mesh, &mut w)?;
    w.flush()?;
    log::info!("saved {} tiles to {}", mesh.tile_count(), path.display());
    Ok(())
}

/// Rebuilds a mesh from container bytes. Each tile is copied into its own
/// allocation.
pub fn import_bytes(bytes: &[u8]) -> Result<NavMesh, ContainerError> {
    let (header, records) = scan(bytes)?;
    let mut mesh = NavMesh::with_heap_storage(header.params).map_err(|e| corrupt(format!("mesh parameters: {e}")))?;
    for (index, rec) in records.iter().enumerate() {
        let payload = navtile_tile::TilePayload::from_bytes(&bytes[rec.range.clone()]);
        mesh.add_tile_with_ref(payload, rec.tile_ref)
            .map_err(|e| record_error(index, e))?;
    }
    Ok(mesh)
}

/// Reads a container file into memory.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<NavMesh, ContainerError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let mesh = import_bytes(&bytes)?;
    log::info!("loaded {} tiles from {}", mesh.tile_count(), path.display());
    Ok(mesh)
}

/// Maps a container file read/write and serves tiles straight from the
/// mapping, which lives as long as the returned mesh.
pub fn map_from_path(path: impl AsRef<Path>) -> Result<NavMesh, ContainerError> {
    let path = path.as_ref();
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    // SAFETY: the mapping is owned by the returned mesh and the file must not
    // be truncated or rewritten by another process while it is alive.
    let map = unsafe { MmapMut::map_mut(&file)? };
    let (header, records) = scan(&map)?;
    let mut mesh = NavMesh::with_mapping(header.params, map).map_err(|e| corrupt(format!("mesh parameters: {e}")))?;
    for (index, rec) in records.into_iter().enumerate() {
        mesh.add_mapped_tile(rec.range, Some(rec.tile_ref))
            .map_err(|e| record_error(index, e))?;
    }
    log::info!("mapped {} tiles from {}", mesh.tile_count(), path.display());
    Ok(mesh)
}
