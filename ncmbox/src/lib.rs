//! Decode NCM containers into standard audio files.
//!
//! An NCM file wraps an MP3 or FLAC stream in a proprietary envelope:
//! a per-file key blob sealed with a fixed application key, an encrypted
//! JSON metadata record, an optional embedded cover image, and the audio
//! payload run through a table-based stream cipher. [`convert`] unwraps
//! one file end to end and rewrites the output's tags from the recovered
//! metadata.
//!
//! Container and key failures are fatal; metadata, cover and tagging
//! problems degrade into [`Warning`]s on a successful [`Outcome`], so a
//! caller always knows whether audio bytes were produced independently
//! of whether the file ended up fully tagged.

mod cipher;
mod container;
mod cover;
pub mod error;
mod metadata;
mod tag;

pub use cipher::{KeyBox, recover_content_key};
pub use container::Container;
pub use cover::CoverImage;
pub use error::{NcmError, Result};
pub use metadata::TrackMetadata;
pub use tag::{AudioFormat, write_tags};

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

/// Audio payload chunk size; bounds peak memory, nothing else.
const CHUNK_SIZE: usize = 0x8000;

/// Knobs for a single conversion.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Where the decoded file goes; the input's directory when `None`.
    pub output_dir: Option<PathBuf>,
    /// Allow one HTTP fetch of the metadata's cover URL when the
    /// container embeds no image.
    pub fetch_cover: bool,
}

/// A soft failure recorded on an otherwise successful conversion.
#[derive(Debug, Clone)]
pub enum Warning {
    /// The metadata blob could not be decoded.
    Metadata(String),
    /// No cover art could be obtained.
    Cover(String),
    /// The decoded audio was delivered without tags.
    TagsSkipped(String),
    /// Tagging failed; the untagged decoded file is intact.
    TagWrite(String),
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metadata(msg) => write!(f, "metadata unavailable: {msg}"),
            Self::Cover(msg) => write!(f, "cover unavailable: {msg}"),
            Self::TagsSkipped(msg) => write!(f, "tags skipped: {msg}"),
            Self::TagWrite(msg) => write!(f, "tag write failed: {msg}"),
        }
    }
}

/// Result of a successful conversion.
#[derive(Debug)]
pub struct Outcome {
    pub output_path: PathBuf,
    /// Container kind sniffed from the decrypted payload.
    pub format: AudioFormat,
    pub warnings: Vec<Warning>,
}

impl Outcome {
    /// `true` when every stage ran to completion, including tagging.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Convert an NCM file to a standard audio file, without network access.
///
/// Returns the written output path and any soft-stage warnings.
pub fn convert(input: &Path, output_dir: Option<&Path>) -> Result<Outcome> {
    let opts = ConvertOptions {
        output_dir: output_dir.map(Path::to_path_buf),
        fetch_cover: false,
    };
    convert_with_options(input, &opts)
}

/// Convert an NCM file with explicit [`ConvertOptions`].
pub fn convert_with_options(input: &Path, opts: &ConvertOptions) -> Result<Outcome> {
    let mut file = File::open(input)?;
    let container = Container::parse(&mut file)?;
    debug!(
        "{}: container parsed, audio payload at 0x{:x}",
        input.display(),
        container.audio_offset
    );

    let content_key = recover_content_key(&container.key_blob)?;
    let key_box = KeyBox::derive(&content_key);

    // Sniff the payload before creating any output file.
    let mut header = [0u8; 8];
    file.seek(SeekFrom::Start(container.audio_offset))?;
    let header_len = read_up_to(&mut file, &mut header)?;
    key_box.apply(0, &mut header[..header_len]);
    let sniffed = AudioFormat::sniff(&header[..header_len]);

    let mut warnings = Vec::new();

    let track = if container.meta_blob.is_empty() {
        debug!("{}: no metadata blob", input.display());
        None
    } else {
        match metadata::decode_meta_blob(&container.meta_blob) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!("{}: {e}", input.display());
                warnings.push(Warning::Metadata(e.to_string()));
                None
            }
        }
    };

    // The sniffed kind wins; the metadata hint only decides the extension
    // of an unrecognized payload.
    let named_format = if sniffed == AudioFormat::Unknown {
        track.as_ref().map_or(AudioFormat::Unknown, |m| m.format_hint)
    } else {
        sniffed
    };
    let stem = input.file_stem().unwrap_or_default();
    let out_dir = opts
        .output_dir
        .clone()
        .unwrap_or_else(|| input.parent().unwrap_or(Path::new(".")).to_path_buf());
    let output_path = out_dir.join(format!(
        "{}.{}",
        stem.to_string_lossy(),
        named_format.extension()
    ));

    if let Err(e) = dump_audio(&mut file, container.audio_offset, &key_box, &output_path) {
        // Never leave a partially decoded file behind.
        let _ = fs::remove_file(&output_path);
        return Err(e);
    }
    // No handle may stay open across the cover fetch.
    drop(file);
    debug!("{}: audio decoded to {}", input.display(), output_path.display());

    if sniffed == AudioFormat::Unknown {
        warnings.push(Warning::TagsSkipped("unrecognized audio container".into()));
    } else if let Some(track) = &track {
        let cover = match cover::resolve_cover(&container.cover_blob, Some(track), opts.fetch_cover)
        {
            Ok(cover) => cover,
            Err(msg) => {
                warnings.push(Warning::Cover(msg));
                None
            }
        };
        if let Err(e) = write_tags(&output_path, track, cover.as_ref()) {
            warn!("{}: {e}", output_path.display());
            warnings.push(Warning::TagWrite(e.to_string()));
        }
    } else {
        warnings.push(Warning::TagsSkipped("no metadata in container".into()));
    }

    Ok(Outcome {
        output_path,
        format: sniffed,
        warnings,
    })
}

/// Decrypt the audio payload to `output` in fixed-size chunks.
///
/// The cipher is positional, so each chunk is decrypted against its
/// absolute payload offset; chunking never changes the plaintext.
fn dump_audio<R: Read + Seek>(
    r: &mut R,
    audio_offset: u64,
    key_box: &KeyBox,
    output: &Path,
) -> Result<()> {
    r.seek(SeekFrom::Start(audio_offset))?;
    let out = File::create(output)?;
    let mut writer = BufWriter::new(out);

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut offset = 0u64;
    loop {
        let n = r.read(&mut buf)?;
        if n == 0 {
            break;
        }
        key_box.apply(offset, &mut buf[..n]);
        writer.write_all(&buf[..n])?;
        offset += n as u64;
    }
    writer.flush()?;
    Ok(())
}

fn read_up_to<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
