//! RAW preview decoding.
//!
//! Most RAW containers carry a full-size JPEG rendition next to the sensor
//! data. `RawPreviewDecoder` pulls the largest embedded JPEG out of the file and
//! only falls back to an external converter (macOS `sips` by default) when no
//! usable JPEG is found. Converter output goes to a scratch directory owned by
//! the decoder and removed by [`Decoder::cleanup`].

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use image::metadata::Orientation;
use image::{DynamicImage, GenericImageView, ImageDecoder, ImageReader, Rgb, RgbImage};
use parking_lot::Mutex;
use tempfile::TempDir;
use tracing::{debug, trace, warn};
use xxhash_rust::xxh3::xxh3_64;

/// Placeholder dimensions used when a file cannot be decoded.
const PLACEHOLDER_WIDTH: u32 = 800;
const PLACEHOLDER_HEIGHT: u32 = 600;
const PLACEHOLDER_GRAY: u8 = 30;

/// JPEG Start Of Image marker.
const JPEG_SOI: &[u8] = b"\xff\xd8\xff";

/// Embedded JPEGs smaller than this are thumbnails, not previews.
const MIN_EMBEDDED_JPEG_BYTES: usize = 16 * 1024;

/// How often a running converter is polled for completion.
const CONVERTER_POLL: Duration = Duration::from_millis(20);

const SCRATCH_PREFIX: &str = "raw_culler_";

/// Anything that can turn a RAW path into a displayable image.
///
/// Implementations are shared between the interactive thread and every decode
/// worker, so they must be callable concurrently.
pub trait Decoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<DynamicImage>;

    /// Release scratch resources. Called once when the preview cache shuts down.
    fn cleanup(&self) {}
}

/// A decoded preview shared between the cache and its readers.
#[derive(Clone)]
pub struct PreviewImage {
    image: Arc<DynamicImage>,
    placeholder: bool,
}

impl std::fmt::Debug for PreviewImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewImage")
            .field("dimensions", &self.dimensions())
            .field("placeholder", &self.placeholder)
            .finish()
    }
}

impl PreviewImage {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image: Arc::new(image),
            placeholder: false,
        }
    }

    /// Dark gray stand-in for files that failed to decode.
    pub fn placeholder() -> Self {
        let buffer = RgbImage::from_pixel(
            PLACEHOLDER_WIDTH,
            PLACEHOLDER_HEIGHT,
            Rgb([PLACEHOLDER_GRAY; 3]),
        );
        Self {
            image: Arc::new(DynamicImage::ImageRgb8(buffer)),
            placeholder: true,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Copy of the image turned clockwise by `quarters` quarter turns.
    pub fn rotated(&self, quarters: u8) -> DynamicImage {
        match quarters % 4 {
            1 => self.image.rotate90(),
            2 => self.image.rotate180(),
            3 => self.image.rotate270(),
            _ => (*self.image).clone(),
        }
    }

    /// Returns `true` if both handles point at the same decoded image.
    pub fn ptr_eq(&self, other: &PreviewImage) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

/// Decode `path`, substituting a placeholder on any failure.
pub fn decode_or_placeholder(decoder: &dyn Decoder, path: &Path) -> PreviewImage {
    match decoder.decode(path) {
        Ok(image) => PreviewImage::new(image),
        Err(e) => {
            warn!(?path, error = ?e, "Preview decode failed, using placeholder");
            PreviewImage::placeholder()
        }
    }
}

/// External conversion command. `{input}` and `{output}` in `args` are
/// substituted with the RAW path and the scratch JPEG path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converter {
    pub program: String,
    pub args: Vec<String>,
}

impl Converter {
    /// macOS built-in image conversion.
    pub fn sips() -> Self {
        Self {
            program: "sips".into(),
            args: [
                "-s",
                "format",
                "jpeg",
                "-s",
                "formatOptions",
                "85",
                "{input}",
                "--out",
                "{output}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }

    /// The converter available on this platform, if any.
    pub fn platform_default() -> Option<Self> {
        if cfg!(target_os = "macos") {
            Some(Self::sips())
        } else {
            None
        }
    }

    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        for arg in &self.args {
            match arg.as_str() {
                "{input}" => cmd.arg(input),
                "{output}" => cmd.arg(output),
                other => cmd.arg(other),
            };
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

/// Embedded-JPEG extractor with an external converter fallback.
pub struct RawPreviewDecoder {
    scratch: Mutex<Option<TempDir>>,
    scratch_path: PathBuf,
    converter: Option<Converter>,
    timeout: Duration,
}

impl RawPreviewDecoder {
    /// Create a decoder with its own scratch directory under the system temp dir.
    pub fn new(timeout: Duration) -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir()
            .context("Failed to create preview scratch directory")?;
        let scratch_path = scratch.path().to_path_buf();
        debug!(?scratch_path, "Created preview scratch directory");

        Ok(Self {
            scratch: Mutex::new(Some(scratch)),
            scratch_path,
            converter: Converter::platform_default(),
            timeout,
        })
    }

    pub fn with_converter(mut self, converter: Option<Converter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_path
    }

    /// Scratch file for `path`, hashed on the full path so same-named files in
    /// different folders never share one.
    fn scratch_file(&self, path: &Path) -> PathBuf {
        let hash = xxh3_64(path.to_string_lossy().as_bytes());
        self.scratch_path.join(format!("{:016x}.jpg", hash))
    }

    fn convert(&self, converter: &Converter, path: &Path) -> Result<DynamicImage> {
        if self.scratch.lock().is_none() {
            bail!("Decoder scratch directory already released");
        }
        let out = self.scratch_file(path);
        let mut child = converter
            .command(path, &out)
            .spawn()
            .with_context(|| format!("Failed to start {}", converter.program))?;

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                let _ = std::fs::remove_file(&out);
                bail!(
                    "{} timed out after {:?} on {:?}",
                    converter.program,
                    self.timeout,
                    path
                );
            }
            std::thread::sleep(CONVERTER_POLL);
        };

        if !status.success() || !out.exists() {
            let _ = std::fs::remove_file(&out);
            bail!("{} failed on {:?} ({})", converter.program, path, status);
        }

        let bytes =
            std::fs::read(&out).with_context(|| format!("Failed to read converted {:?}", out))?;
        let _ = std::fs::remove_file(&out);
        open_oriented(&bytes).with_context(|| format!("Failed to decode converted {:?}", path))
    }
}

impl Decoder for RawPreviewDecoder {
    fn decode(&self, path: &Path) -> Result<DynamicImage> {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;

        if let Some(jpeg) = largest_embedded_jpeg(&bytes) {
            match open_oriented(jpeg) {
                Ok(image) => {
                    trace!(?path, bytes = jpeg.len(), "Decoded embedded JPEG");
                    return Ok(image);
                }
                Err(e) => debug!(?path, error = ?e, "Embedded JPEG unusable"),
            }
        }

        match &self.converter {
            Some(converter) => self.convert(converter, path),
            None => Err(anyhow!("No embedded preview in {:?}", path)),
        }
    }

    fn cleanup(&self) {
        let Some(scratch) = self.scratch.lock().take() else {
            return;
        };
        match scratch.close() {
            Ok(()) => debug!(path = ?self.scratch_path, "Removed preview scratch directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = ?self.scratch_path, error = ?e, "Failed to remove scratch directory"),
        }
    }
}

/// Decode image bytes and apply their EXIF orientation.
pub fn open_oriented(bytes: &[u8]) -> Result<DynamicImage> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("Failed to guess image format")?
        .into_decoder()
        .context("Unsupported image format")?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut image = DynamicImage::from_decoder(decoder).context("Failed to decode image")?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Locate the largest complete JPEG stream in a RAW container.
fn largest_embedded_jpeg(buffer: &[u8]) -> Option<&[u8]> {
    let mut largest: Option<&[u8]> = None;
    let mut pos = 0;

    while pos + JPEG_SOI.len() <= buffer.len() {
        if !buffer[pos..].starts_with(JPEG_SOI) {
            pos += 1;
            continue;
        }
        let Some(end) = jpeg_stream_end(buffer, pos) else {
            pos += 1;
            continue;
        };

        let candidate = &buffer[pos..end];
        if largest.map_or(true, |l| candidate.len() > l.len()) {
            largest = Some(candidate);
        }
        pos = end;
    }

    largest.filter(|jpeg| jpeg.len() >= MIN_EMBEDDED_JPEG_BYTES)
}

/// End offset (past EOI) of the JPEG starting at `start`, found by walking
/// segment lengths so thumbnails nested in APP segments are skipped.
fn jpeg_stream_end(buffer: &[u8], start: usize) -> Option<usize> {
    let mut pos = start + 2;
    loop {
        if *buffer.get(pos)? != 0xff {
            return None;
        }
        // Fill bytes before a marker.
        while *buffer.get(pos + 1)? == 0xff {
            pos += 1;
        }
        let marker = buffer[pos + 1];
        match marker {
            0xd9 => return Some(pos + 2),
            0x01 | 0xd0..=0xd7 => pos += 2,
            _ => {
                let len = u16::from_be_bytes([*buffer.get(pos + 2)?, *buffer.get(pos + 3)?]);
                if len < 2 {
                    return None;
                }
                pos += 2 + len as usize;
                if marker == 0xda {
                    pos = skip_entropy_data(buffer, pos)?;
                }
            }
        }
    }
}

/// Offset of the first marker after entropy-coded data at `pos`.
/// Stuffed `FF 00` bytes and restart markers belong to the scan.
fn skip_entropy_data(buffer: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let offset = buffer.get(pos..)?.iter().position(|&b| b == 0xff)?;
        pos += offset;
        match *buffer.get(pos + 1)? {
            0x00 | 0xd0..=0xd7 => pos += 2,
            _ => return Some(pos),
        }
    }
}
