use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::picture::{Picture, PictureType};
use lofty::probe::Probe;
use lofty::tag::{Accessor, Tag, TagExt};

use crate::cover::CoverImage;
use crate::error::{NcmError, Result};
use crate::metadata::TrackMetadata;

/// Audio container kind of a decrypted payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Flac,
    Unknown,
}

impl AudioFormat {
    /// Classify a decrypted payload by its leading bytes.
    pub fn sniff(header: &[u8]) -> Self {
        if header.starts_with(b"fLaC") {
            Self::Flac
        } else if header.starts_with(b"ID3")
            || (header.len() >= 2 && header[0] == 0xFF && header[1] & 0xE0 == 0xE0)
        {
            Self::Mp3
        } else {
            Self::Unknown
        }
    }

    /// File extension for the decoded output. `Unknown` payloads are
    /// delivered as `.mp3` unless a metadata hint says otherwise.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 | Self::Unknown => "mp3",
            Self::Flac => "flac",
        }
    }
}

/// Write title/artist/album and optional cover art to the decoded file.
///
/// The tag structures are applied to a scratch copy which replaces the
/// original only after a successful save; a failure at any point leaves
/// the untagged decoded audio byte-identical and removes the scratch.
pub fn write_tags(path: &Path, metadata: &TrackMetadata, cover: Option<&CoverImage>) -> Result<()> {
    let scratch = scratch_path(path);
    fs::copy(path, &scratch)?;
    match apply_tags(&scratch, metadata, cover) {
        Ok(()) => {
            fs::rename(&scratch, path)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&scratch);
            Err(e)
        }
    }
}

fn scratch_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map_or_else(OsString::new, OsString::from);
    name.push(".tagtmp");
    path.with_file_name(name)
}

fn apply_tags(path: &Path, metadata: &TrackMetadata, cover: Option<&CoverImage>) -> Result<()> {
    let mut tagged_file = Probe::open(path)
        .map_err(|e| NcmError::Tag(e.to_string()))?
        .read()
        .map_err(|e| NcmError::Tag(e.to_string()))?;

    if tagged_file.primary_tag().is_none() {
        let tag_type = tagged_file.primary_tag_type();
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let Some(tag) = tagged_file.primary_tag_mut() else {
        return Err(NcmError::Tag("file type accepts no tag".into()));
    };

    tag.set_title(metadata.title.clone());
    tag.set_artist(metadata.artist_names());
    tag.set_album(metadata.album.clone());

    if let Some(cover) = cover {
        let picture = Picture::unchecked(cover.data.clone())
            .pic_type(PictureType::CoverFront)
            .mime_type(cover.mime())
            .build();
        tag.push_picture(picture);
    }

    tag.save_to_path(path, WriteOptions::default())
        .map_err(|e| NcmError::Tag(e.to_string()))
}
