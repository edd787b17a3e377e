//! On-disk container: a little-endian header describing extent, channel
//! declarations, block layout and line order; a block offset table; a
//! payload section of independently addressable f32 blocks; and a trailing
//! attribute section located through a header pointer.
//!
//! The channel table is stored sorted lexicographically by name, so
//! readers enumerate channels canonically rather than in save order.
//! Offset 0 in the block table marks a block that was never written;
//! readers substitute zeros for it.

use std::{
    collections::BTreeMap,
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
};

use log::{debug, trace};

const MAGIC: [u8; 4] = *b"RBS1";
const VERSION: u16 = 1;

const LAYOUT_SCANLINE: u8 = 0;
const LAYOUT_TILED: u8 = 1;
const ORDER_INCREASING: u8 = 0;
const ORDER_RANDOM: u8 = 1;
const SAMPLE_F32: u8 = 2;
const ATTR_TEXT: u8 = 0;
const ATTR_MATRIX3: u8 = 1;

/// Named header attribute, independent of block layout. The geodetic
/// reference layer stores its projection string and 3x3 transform here.
#[derive(Clone, Debug, PartialEq)]
pub enum Attribute {
    Text(String),
    Matrix3([[f64; 3]; 3]),
}

/// On-disk ordering policy for blocks. Under `Increasing` the sink holds
/// out-of-order blocks in memory until their turn; under `Random` it
/// appends blocks in whatever order they arrive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineOrder {
    Increasing,
    Random,
}

/// Fixed header contents.
#[derive(Clone, Debug, PartialEq)]
pub struct ContainerHeader {
    pub tiled: bool,
    pub line_order: LineOrder,
    pub cols: u32,
    pub rows: u32,
    pub block_width: u32,
    pub block_height: u32,
    /// Channel names in container enumeration order (lexicographic).
    pub channels: Vec<String>,
}

impl ContainerHeader {
    pub fn block_count(&self) -> usize {
        (self.cols.div_ceil(self.block_width) * self.rows.div_ceil(self.block_height)) as usize
    }

    fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(&MAGIC)?;
        write_u16(writer, VERSION)?;
        let layout = if self.tiled { LAYOUT_TILED } else { LAYOUT_SCANLINE };
        let order = match self.line_order {
            LineOrder::Increasing => ORDER_INCREASING,
            LineOrder::Random => ORDER_RANDOM,
        };
        writer.write_all(&[layout, order])?;
        write_u32(writer, self.cols)?;
        write_u32(writer, self.rows)?;
        write_u32(writer, self.block_width)?;
        write_u32(writer, self.block_height)?;
        write_u16(writer, checked_u16(self.channels.len(), "channel count")?)?;
        for name in &self.channels {
            write_str(writer, name)?;
            writer.write_all(&[SAMPLE_F32])?;
        }
        Ok(())
    }

    fn read_from(reader: &mut impl Read) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(corrupt("bad magic"));
        }
        let version = read_u16(reader)?;
        if version != VERSION {
            return Err(corrupt(format!("unsupported container version {version}")));
        }
        let mut flags = [0u8; 2];
        reader.read_exact(&mut flags)?;
        let tiled = match flags[0] {
            LAYOUT_SCANLINE => false,
            LAYOUT_TILED => true,
            other => return Err(corrupt(format!("unknown layout tag {other}"))),
        };
        let line_order = match flags[1] {
            ORDER_INCREASING => LineOrder::Increasing,
            ORDER_RANDOM => LineOrder::Random,
            other => return Err(corrupt(format!("unknown line order tag {other}"))),
        };
        let cols = read_u32(reader)?;
        let rows = read_u32(reader)?;
        let block_width = read_u32(reader)?;
        let block_height = read_u32(reader)?;
        if cols == 0 || rows == 0 || block_width == 0 || block_height == 0 {
            return Err(corrupt("degenerate image or block extent"));
        }
        let planes = read_u16(reader)?;
        if planes == 0 {
            return Err(corrupt("container declares no channels"));
        }
        let mut channels = Vec::with_capacity(planes as usize);
        for _ in 0..planes {
            let name = read_str(reader)?;
            let mut sample = [0u8; 1];
            reader.read_exact(&mut sample)?;
            if sample[0] != SAMPLE_F32 {
                return Err(corrupt(format!(
                    "channel {name} has unsupported sample type {}",
                    sample[0]
                )));
            }
            channels.push(name);
        }
        Ok(Self {
            tiled,
            line_order,
            cols,
            rows,
            block_width,
            block_height,
            channels,
        })
    }
}

/// Read side of a container: header, offset table and block payloads.
#[derive(Debug)]
pub struct BlockSource {
    file: File,
    header: ContainerHeader,
    offsets: Vec<u64>,
    attributes: BTreeMap<String, Attribute>,
}

impl BlockSource {
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let header = ContainerHeader::read_from(&mut file)?;
        let attr_offset = read_u64(&mut file)?;
        let mut offsets = vec![0u64; header.block_count()];
        for offset in offsets.iter_mut() {
            *offset = read_u64(&mut file)?;
        }
        let attributes = if attr_offset != 0 {
            file.seek(SeekFrom::Start(attr_offset))?;
            read_attrs(&mut file)?
        } else {
            BTreeMap::new()
        };
        debug!(
            "opened container {}: {} blocks, channels {:?}",
            path.display(),
            offsets.len(),
            header.channels
        );
        Ok(Self {
            file,
            header,
            offsets,
            attributes,
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn attributes(&self) -> &BTreeMap<String, Attribute> {
        &self.attributes
    }

    /// Decode one block as `len` planar f32 samples in container channel
    /// order. `None` if the block was never written.
    pub fn read_block(&mut self, index: usize, len: usize) -> io::Result<Option<Vec<f32>>> {
        let offset = *self
            .offsets
            .get(index)
            .ok_or_else(|| corrupt(format!("block index {index} outside the offset table")))?;
        if offset == 0 {
            return Ok(None);
        }
        self.file.seek(SeekFrom::Start(offset))?;
        let mut bytes = vec![0u8; len * 4];
        self.file.read_exact(&mut bytes)?;
        let samples = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Some(samples))
    }
}

/// Write side of a container.
///
/// Blocks are appended to the payload section and their offsets patched
/// into the table at [finish](BlockSink::finish) time, which also writes
/// the attribute section. `finish` is idempotent so an explicit close and
/// the eventual drop can both call it.
#[derive(Debug)]
pub struct BlockSink {
    file: File,
    table_pos: u64,
    offsets: Vec<u64>,
    end: u64,
    next_in_order: usize,
    pending: BTreeMap<usize, Vec<f32>>,
    random_order: bool,
    written: usize,
    finished: bool,
}

impl BlockSink {
    pub fn create(path: &Path, header: &ContainerHeader) -> io::Result<Self> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let block_count = header.block_count();
        let mut buf = Vec::new();
        header.write_to(&mut buf)?;
        let table_pos = buf.len() as u64 + 8;
        buf.extend_from_slice(&0u64.to_le_bytes()); // attribute section offset
        buf.resize(buf.len() + block_count * 8, 0);
        file.write_all(&buf)?;
        debug!(
            "created container {}: {} blocks of {}x{}",
            path.display(),
            block_count,
            header.block_width,
            header.block_height
        );
        Ok(Self {
            file,
            table_pos,
            offsets: vec![0u64; block_count],
            end: buf.len() as u64,
            next_in_order: 0,
            pending: BTreeMap::new(),
            random_order: header.line_order == LineOrder::Random,
            written: 0,
            finished: false,
        })
    }

    /// Blocks accepted so far, including any still buffered in memory.
    pub fn blocks_written(&self) -> usize {
        self.written
    }

    /// Accept one block of planar samples in container channel order.
    pub fn put_block(&mut self, index: usize, samples: Vec<f32>) -> io::Result<()> {
        if index >= self.offsets.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("block index {index} outside the {} block grid", self.offsets.len()),
            ));
        }
        self.written += 1;
        if self.random_order {
            return self.append(index, &samples);
        }
        if index == self.next_in_order {
            self.append(index, &samples)?;
            self.next_in_order = index + 1;
            self.drain_ready()
        } else {
            // out of turn under increasing line order: hold it in memory
            self.pending.insert(index, samples);
            Ok(())
        }
    }

    fn drain_ready(&mut self) -> io::Result<()> {
        while let Some(samples) = self.pending.remove(&self.next_in_order) {
            let index = self.next_in_order;
            self.append(index, &samples)?;
            self.next_in_order = index + 1;
        }
        Ok(())
    }

    fn append(&mut self, index: usize, samples: &[f32]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(self.end))?;
        let mut bytes = Vec::with_capacity(samples.len() * 4);
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        self.file.write_all(&bytes)?;
        self.offsets[index] = self.end;
        self.end += bytes.len() as u64;
        trace!("block {index} appended at offset {}", self.offsets[index]);
        Ok(())
    }

    /// Drain buffered blocks, write the attribute section and patch the
    /// header pointer and offset table.
    pub fn finish(&mut self, attributes: &BTreeMap<String, Attribute>) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        let stranded: Vec<(usize, Vec<f32>)> = std::mem::take(&mut self.pending).into_iter().collect();
        for (index, samples) in stranded {
            self.append(index, &samples)?;
        }
        let attr_offset = if attributes.is_empty() {
            0
        } else {
            let offset = self.end;
            self.file.seek(SeekFrom::Start(offset))?;
            let mut buf = Vec::new();
            write_attrs(&mut buf, attributes)?;
            self.file.write_all(&buf)?;
            self.end += buf.len() as u64;
            offset
        };
        self.file.seek(SeekFrom::Start(self.table_pos - 8))?;
        let mut table = Vec::with_capacity(8 + self.offsets.len() * 8);
        table.extend_from_slice(&attr_offset.to_le_bytes());
        for offset in &self.offsets {
            table.extend_from_slice(&offset.to_le_bytes());
        }
        self.file.write_all(&table)?;
        self.file.flush()?;
        self.finished = true;
        Ok(())
    }
}

/// Accumulates scanline rows into `rows_per_block` blocks. Rows may
/// arrive in disjoint column pieces; a block goes to the sink once every
/// cell of every one of its rows has been covered. Blocks still partial
/// at finish time go out zero-padded.
#[derive(Debug)]
pub struct ScanlineSink {
    sink: BlockSink,
    cols: usize,
    rows: usize,
    planes: usize,
    rows_per_block: usize,
    partial: BTreeMap<usize, PartialBlock>,
}

#[derive(Debug)]
struct PartialBlock {
    samples: Vec<f32>,
    /// One flag per cell, row-major over the single-plane block extent.
    filled: Vec<bool>,
    remaining: usize,
}

impl ScanlineSink {
    pub fn new(sink: BlockSink, cols: usize, rows: usize, planes: usize, rows_per_block: usize) -> Self {
        Self {
            sink,
            cols,
            rows,
            planes,
            rows_per_block,
            partial: BTreeMap::new(),
        }
    }

    /// Rows of this block, clipped at the image bottom.
    fn block_rows(&self, block: usize) -> usize {
        self.rows_per_block.min(self.rows - block * self.rows_per_block)
    }

    /// Accept the rows of one window. `samples` is the planar f32 window
    /// buffer in container channel order, `[planes, height, width]`.
    pub fn put_rows(
        &mut self,
        offset: (usize, usize),
        shape: (usize, usize),
        samples: &[f32],
    ) -> io::Result<()> {
        let (x0, y0) = offset;
        let (width, height) = shape;
        let area = width * height;
        for r in 0..height {
            let y = y0 + r;
            let block = y / self.rows_per_block;
            let row_in_block = y % self.rows_per_block;
            let block_rows = self.block_rows(block);
            let (cols, planes) = (self.cols, self.planes);
            let partial = self.partial.entry(block).or_insert_with(|| PartialBlock {
                samples: vec![0.0; planes * block_rows * cols],
                filled: vec![false; block_rows * cols],
                remaining: block_rows * cols,
            });
            for p in 0..planes {
                let src = &samples[p * area + r * width..][..width];
                let dst = p * block_rows * cols + row_in_block * cols + x0;
                partial.samples[dst..dst + width].copy_from_slice(src);
            }
            for flag in &mut partial.filled[row_in_block * cols + x0..][..width] {
                if !*flag {
                    *flag = true;
                    partial.remaining -= 1;
                }
            }
            if partial.remaining == 0 {
                if let Some(done) = self.partial.remove(&block) {
                    self.sink.put_block(block, done.samples)?;
                }
            }
        }
        Ok(())
    }

    pub fn finish(&mut self, attributes: &BTreeMap<String, Attribute>) -> io::Result<()> {
        let partial = std::mem::take(&mut self.partial);
        for (block, pending) in partial {
            self.sink.put_block(block, pending.samples)?;
        }
        self.sink.finish(attributes)
    }
}

fn corrupt(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn checked_u16(value: usize, what: &str) -> io::Result<u16> {
    u16::try_from(value).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{what} {value} exceeds the container field width"),
        )
    })
}

fn write_u16(writer: &mut impl Write, value: u16) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn write_u32(writer: &mut impl Write, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn write_f64(writer: &mut impl Write, value: f64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

fn write_str(writer: &mut impl Write, value: &str) -> io::Result<()> {
    write_u16(writer, checked_u16(value.len(), "name length")?)?;
    writer.write_all(value.as_bytes())
}

fn read_u16(reader: &mut impl Read) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(reader: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(reader: &mut impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_f64(reader: &mut impl Read) -> io::Result<f64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn read_str(reader: &mut impl Read) -> io::Result<String> {
    let len = read_u16(reader)? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| corrupt(format!("invalid name: {e}")))
}

fn write_attrs(
    writer: &mut impl Write,
    attributes: &BTreeMap<String, Attribute>,
) -> io::Result<()> {
    write_u16(writer, checked_u16(attributes.len(), "attribute count")?)?;
    for (name, attribute) in attributes {
        write_str(writer, name)?;
        match attribute {
            Attribute::Text(text) => {
                writer.write_all(&[ATTR_TEXT])?;
                write_u32(writer, text.len() as u32)?;
                writer.write_all(text.as_bytes())?;
            }
            Attribute::Matrix3(matrix) => {
                writer.write_all(&[ATTR_MATRIX3])?;
                for row in matrix {
                    for value in row {
                        write_f64(writer, *value)?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn read_attrs(reader: &mut impl Read) -> io::Result<BTreeMap<String, Attribute>> {
    let count = read_u16(reader)?;
    let mut attributes = BTreeMap::new();
    for _ in 0..count {
        let name = read_str(reader)?;
        let mut kind = [0u8; 1];
        reader.read_exact(&mut kind)?;
        let attribute = match kind[0] {
            ATTR_TEXT => {
                let len = read_u32(reader)? as usize;
                let mut buf = vec![0u8; len];
                reader.read_exact(&mut buf)?;
                Attribute::Text(
                    String::from_utf8(buf).map_err(|e| corrupt(format!("invalid text: {e}")))?,
                )
            }
            ATTR_MATRIX3 => {
                let mut matrix = [[0f64; 3]; 3];
                for row in matrix.iter_mut() {
                    for value in row.iter_mut() {
                        *value = read_f64(reader)?;
                    }
                }
                Attribute::Matrix3(matrix)
            }
            other => return Err(corrupt(format!("unknown attribute tag {other}"))),
        };
        attributes.insert(name, attribute);
    }
    Ok(attributes)
}
