/// NMRPipe format reader/writer
///
/// NMRPipe uses a 2048-byte (512 float32) header followed by spectral data.
/// A 1D file holds one vector, a 2D file holds FDSPECNUM rows of FDSIZE
/// points. Complex rows are stored as a real block followed by an imaginary
/// block, or interleaved R, I, R, I when the pipe flag is set.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use nus_core::{
    Axis, Complex64, ComplexMatrix, Dataset, DatasetError, MemoryDataset, RealMatrix, Region,
};
use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};

/// NMRPipe header size: 512 float32 values = 2048 bytes
const HEADER_FLOATS: usize = 512;
const HEADER_BYTES: usize = HEADER_FLOATS * 4;

/// FDFLTORDER value as seen when the file's byte order matches the reader's.
const BYTE_ORDER_MARK: f32 = 2.345;

/// Key header indices (0-based, each is a float32 slot)
mod idx {
    pub const FDFLTFORMAT: usize = 1; // Float format (IEEE marker)
    pub const FDFLTORDER: usize = 2; // Byte order
    pub const FDDIMCOUNT: usize = 9; // Number of dimensions
    pub const FDF2LABEL: usize = 16; // F2 label (8 chars in two slots)
    pub const FDF1LABEL: usize = 18; // F1 label
    pub const FDPIPEFLAG: usize = 57; // Pipe mode flag
    pub const FDREALSIZE: usize = 97; // Total real data size
    pub const FDSIZE: usize = 99; // Number of points in the direct dim
    pub const FDF2SW: usize = 100; // Spectral width F2 (Hz)
    pub const FDF2ORIG: usize = 101; // Origin F2 (Hz)
    pub const FDQUADFLAG: usize = 106; // 0=complex, 1=real
    pub const FDF2OBS: usize = 119; // Observe freq F2 (MHz)
    pub const FDF1OBS: usize = 218; // Observe freq F1 (MHz)
    pub const FDSPECNUM: usize = 219; // Number of rows (Y size for 2D)
    pub const FDF2FTFLAG: usize = 220; // 1=freq domain, 0=time domain
    pub const FDF1FTFLAG: usize = 222; // 1=freq domain F1
    pub const FDF1SW: usize = 229; // Spectral width F1 (Hz)
    pub const FDF1ORIG: usize = 249; // Origin F1 (Hz)
}

fn invalid(msg: impl Into<String>) -> DatasetError {
    DatasetError::Invalid(msg.into())
}

/// The 512-slot NMRPipe header, kept whole so unrecognised parameters
/// survive a read/write cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeHeader {
    values: Vec<f32>,
}

impl PipeHeader {
    /// Fresh header for a 1D (`[n]`) or 2D (`[rows, n]`) matrix.
    pub fn new(sizes: &[usize], complex: bool, frequency_domain: bool) -> Self {
        let mut values = vec![0.0f32; HEADER_FLOATS];
        values[idx::FDFLTFORMAT] = f32::from_bits(0x4f6eeeef);
        values[idx::FDFLTORDER] = BYTE_ORDER_MARK;
        let mut header = Self { values };
        header.set_sizes(sizes, complex);
        for dim in 0..header.ndim() {
            header.set_frequency_domain(dim, frequency_domain);
        }
        header
    }

    /// Parse the header block. Returns the header and whether the file is
    /// big-endian.
    fn parse(bytes: &[u8]) -> Result<(Self, bool), DatasetError> {
        if bytes.len() < HEADER_BYTES {
            return Err(invalid("file too small for NMRPipe format"));
        }
        let mut values = vec![0.0f32; HEADER_FLOATS];
        let mut cursor = Cursor::new(&bytes[..HEADER_BYTES]);
        for h in values.iter_mut() {
            *h = cursor.read_f32::<LittleEndian>()?;
        }
        // FDFLTORDER reads as 2.345 only in the file's own byte order.
        let big_endian = (values[idx::FDFLTORDER] - BYTE_ORDER_MARK).abs() > 0.01;
        if big_endian {
            let mut cursor = Cursor::new(&bytes[..HEADER_BYTES]);
            for h in values.iter_mut() {
                *h = cursor.read_f32::<BigEndian>()?;
            }
        }
        Ok((Self { values }, big_endian))
    }

    pub fn ndim(&self) -> usize {
        if (self.values[idx::FDDIMCOUNT] as usize) >= 2 && self.rows() > 1 {
            2
        } else {
            1
        }
    }

    fn rows(&self) -> usize {
        (self.values[idx::FDSPECNUM] as usize).max(1)
    }

    /// Row-major sizes: `[n]` or `[rows, n]`.
    pub fn sizes(&self) -> Vec<usize> {
        let n = self.values[idx::FDSIZE] as usize;
        if self.ndim() == 2 {
            vec![self.rows(), n]
        } else {
            vec![n]
        }
    }

    pub fn is_complex(&self) -> bool {
        self.values[idx::FDQUADFLAG] as i32 == 0
    }

    /// Whether the direct (last) dimension has been transformed.
    pub fn is_frequency_domain(&self) -> bool {
        self.values[idx::FDF2FTFLAG] as i32 == 1
    }

    fn domain_slot(&self, dim: usize) -> usize {
        if dim + 1 >= self.ndim() {
            idx::FDF2FTFLAG
        } else {
            idx::FDF1FTFLAG
        }
    }

    fn is_interleaved(&self) -> bool {
        self.values[idx::FDPIPEFLAG] as i32 == 1
    }

    pub fn set_sizes(&mut self, sizes: &[usize], complex: bool) {
        let n = sizes.last().copied().unwrap_or(1);
        let rows = if sizes.len() >= 2 { sizes[0] } else { 1 };
        self.values[idx::FDDIMCOUNT] = sizes.len().max(1) as f32;
        self.values[idx::FDSIZE] = n as f32;
        self.values[idx::FDSPECNUM] = rows as f32;
        self.values[idx::FDREALSIZE] = n as f32;
        self.values[idx::FDQUADFLAG] = if complex { 0.0 } else { 1.0 };
        self.values[idx::FDPIPEFLAG] = 0.0;
    }

    /// Flag dimension `dim` (row-major) as transformed or not.
    pub fn set_frequency_domain(&mut self, dim: usize, frequency_domain: bool) {
        let slot = self.domain_slot(dim);
        self.values[slot] = if frequency_domain { 1.0 } else { 0.0 };
    }

    /// Axes in row-major order (F1 first for 2D). Reference ppm is the
    /// shift of point 0, the left edge at `ORIG + SW`.
    pub fn axes(&self) -> Vec<Axis> {
        let sizes = self.sizes();
        let f2 = self.axis(
            idx::FDF2SW,
            idx::FDF2OBS,
            idx::FDF2ORIG,
            idx::FDF2LABEL,
            "F2",
            sizes[sizes.len() - 1],
        );
        if sizes.len() == 2 {
            let f1 = self.axis(
                idx::FDF1SW,
                idx::FDF1OBS,
                idx::FDF1ORIG,
                idx::FDF1LABEL,
                "F1",
                sizes[0],
            );
            vec![f1, f2]
        } else {
            vec![f2]
        }
    }

    fn axis(&self, sw: usize, obs: usize, orig: usize, label: usize, name: &str, size: usize) -> Axis {
        let sw_hz = self.values[sw] as f64;
        let obs_mhz = self.values[obs] as f64;
        let orig_hz = self.values[orig] as f64;
        let reference_ppm = if obs_mhz > 0.0 {
            (orig_hz + sw_hz) / obs_mhz
        } else {
            0.0
        };
        let label = decode_label(&self.values, label);
        Axis::new(
            if label.is_empty() { name } else { &label },
            size,
            sw_hz,
            obs_mhz,
            reference_ppm,
        )
    }

    /// Store axis parameters, row-major order as returned by [`Self::axes`].
    pub fn set_axes(&mut self, axes: &[Axis]) {
        let slots = [
            (idx::FDF2SW, idx::FDF2OBS, idx::FDF2ORIG, idx::FDF2LABEL),
            (idx::FDF1SW, idx::FDF1OBS, idx::FDF1ORIG, idx::FDF1LABEL),
        ];
        for (axis, (sw, obs, orig, label)) in axes.iter().rev().zip(slots) {
            self.values[sw] = axis.spectral_width_hz as f32;
            self.values[obs] = axis.observe_freq_mhz as f32;
            self.values[orig] =
                (axis.reference_ppm * axis.observe_freq_mhz - axis.spectral_width_hz) as f32;
            encode_label(&mut self.values, label, &axis.label);
        }
    }
}

/// Decode a label stored in two consecutive float slots
fn decode_label(header: &[f32], start_idx: usize) -> String {
    let bytes1 = header[start_idx].to_bits().to_be_bytes();
    let bytes2 = header[start_idx + 1].to_bits().to_be_bytes();
    let combined: Vec<u8> = bytes1
        .iter()
        .chain(bytes2.iter())
        .copied()
        .filter(|&b| b.is_ascii_alphanumeric() || b == b' ')
        .collect();
    String::from_utf8_lossy(&combined).trim().to_string()
}

fn encode_label(header: &mut [f32], start_idx: usize, label: &str) {
    let mut bytes = [0u8; 8];
    for (slot, b) in bytes.iter_mut().zip(label.bytes()) {
        *slot = b;
    }
    header[start_idx] = f32::from_bits(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));
    header[start_idx + 1] =
        f32::from_bits(u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]));
}

/// A whole NMRPipe file: header plus data as a complex matrix (imaginary
/// parts zero for real data).
#[derive(Debug, Clone)]
pub struct PipeFile {
    pub header: PipeHeader,
    pub data: ComplexMatrix,
}

impl PipeFile {
    pub fn read(path: &Path) -> Result<Self, DatasetError> {
        let bytes = std::fs::read(path)?;
        let file = Self::from_bytes(&bytes)?;
        log::info!(
            "Read NMRPipe file {}: {:?} {}",
            path.display(),
            file.data.sizes(),
            if file.header.is_complex() { "complex" } else { "real" }
        );
        Ok(file)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DatasetError> {
        let (header, big_endian) = PipeHeader::parse(bytes)?;
        let data_slice = &bytes[HEADER_BYTES..];
        let num_floats = data_slice.len() / 4;
        let mut cursor = Cursor::new(data_slice);
        let mut values = Vec::with_capacity(num_floats);
        for _ in 0..num_floats {
            let v = if big_endian {
                cursor.read_f32::<BigEndian>()?
            } else {
                cursor.read_f32::<LittleEndian>()?
            };
            values.push(v as f64);
        }

        let sizes = header.sizes();
        let n = sizes[sizes.len() - 1];
        let rows = if sizes.len() == 2 { sizes[0] } else { 1 };
        let per_point = if header.is_complex() { 2 } else { 1 };
        let needed = rows.checked_mul(n).and_then(|v| v.checked_mul(per_point));
        if n == 0 || needed.map_or(true, |needed| values.len() < needed) {
            return Err(invalid(format!(
                "header describes {:?} {} points, file holds {} values",
                sizes,
                if per_point == 2 { "complex" } else { "real" },
                values.len()
            )));
        }

        let row_len = values.len() / rows;
        let mut data = ComplexMatrix::new(&sizes)?;
        for r in 0..rows {
            let row = &values[r * row_len..(r + 1) * row_len];
            let out = &mut data.as_mut_slice()[r * n..(r + 1) * n];
            if !header.is_complex() {
                for (z, &re) in out.iter_mut().zip(row) {
                    *z = Complex64::new(re, 0.0);
                }
            } else if header.is_interleaved() {
                for (i, z) in out.iter_mut().enumerate() {
                    *z = Complex64::new(row[2 * i], row[2 * i + 1]);
                }
            } else {
                for (i, z) in out.iter_mut().enumerate() {
                    *z = Complex64::new(row[i], row[n + i]);
                }
            }
        }
        Ok(Self { header, data })
    }

    /// Write little-endian, complex rows as real block then imaginary block.
    pub fn write(&self, path: &Path) -> Result<(), DatasetError> {
        let mut header = self.header.clone();
        let complex = header.is_complex();
        header.set_sizes(self.data.sizes(), complex);

        let mut out = BufWriter::new(File::create(path)?);
        for &h in &header.values {
            out.write_f32::<LittleEndian>(h)?;
        }
        let n = self.data.sizes()[self.data.ndim() - 1];
        for row in self.data.as_slice().chunks(n) {
            for z in row {
                out.write_f32::<LittleEndian>(z.re as f32)?;
            }
            if complex {
                for z in row {
                    out.write_f32::<LittleEndian>(z.im as f32)?;
                }
            }
        }
        out.flush()?;
        log::info!("Wrote NMRPipe file {}", path.display());
        Ok(())
    }
}

/// Real part of an NMRPipe spectrum exposed as a [`Dataset`].
#[derive(Debug, Clone)]
pub struct PipeDataset {
    path: PathBuf,
    header: PipeHeader,
    inner: MemoryDataset,
}

impl PipeDataset {
    pub fn open(path: &Path) -> Result<Self, DatasetError> {
        let file = PipeFile::read(path)?;
        Self::from_file(path, file)
    }

    pub fn from_file(path: &Path, file: PipeFile) -> Result<Self, DatasetError> {
        if !file.header.is_frequency_domain() {
            log::warn!("{} is flagged as time domain", path.display());
        }
        let axes = file.header.axes();
        let inner = MemoryDataset::new(file.data.real(), axes)?;
        Ok(Self {
            path: path.to_path_buf(),
            header: file.header,
            inner,
        })
    }

    pub fn with_regions(mut self, regions: Vec<Region>) -> Self {
        self.inner.set_regions(regions);
        self
    }

    pub fn header(&self) -> &PipeHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File stem, used to name peak lists.
    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn matrix(&self) -> &RealMatrix {
        self.inner.matrix()
    }
}

impl Dataset for PipeDataset {
    fn axes(&self) -> &[Axis] {
        self.inner.axes()
    }

    fn read_region(&self, region: &Region) -> Result<RealMatrix, DatasetError> {
        self.inner.read_region(region)
    }

    fn regions(&self) -> &[Region] {
        self.inner.regions()
    }
}
