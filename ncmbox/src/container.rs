use std::io::{Read, Seek, SeekFrom};

use crate::error::{NcmError, Result};

/// Leading signature of every NCM container: "CTENFDAM".
const MAGIC: [u8; 8] = *b"CTENFDAM";

/// Reserved bytes between the signature and the key blob.
const HEADER_GAP: u64 = 2;
/// CRC and cover format version between the metadata blob and the cover
/// frame length.
const COVER_HEADER_GAP: u64 = 5;

/// The container's sections, read but not decrypted.
///
/// The audio payload is never materialized here; only its start offset
/// is recorded so the caller can stream it in chunks.
#[derive(Debug)]
pub struct Container {
    pub key_blob: Vec<u8>,
    /// Empty when the file carries no metadata.
    pub meta_blob: Vec<u8>,
    /// Empty when the file carries no embedded cover image.
    pub cover_blob: Vec<u8>,
    /// Absolute offset of the encrypted audio payload.
    pub audio_offset: u64,
}

impl Container {
    /// Parse the fixed container layout from a seekable reader.
    ///
    /// Every declared section length is checked against the bytes that
    /// actually remain; a length field pointing past end-of-file is a
    /// [`NcmError::Truncated`] error, never a silent short read.
    pub fn parse<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let file_len = r.seek(SeekFrom::End(0))?;
        r.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; 8];
        read_exact(r, &mut magic, "signature")?;
        if magic != MAGIC {
            return Err(NcmError::CorruptContainer);
        }
        skip(r, HEADER_GAP, file_len, "header gap")?;

        let key_blob = read_sized_section(r, file_len, "key blob")?;
        let meta_blob = read_sized_section(r, file_len, "metadata blob")?;

        skip(r, COVER_HEADER_GAP, file_len, "cover header")?;

        // The cover frame reserves space; the image may be smaller, with
        // padding up to the frame length.
        let frame_len = u64::from(read_u32_le(r, "cover frame length")?);
        let image_len = u64::from(read_u32_le(r, "cover image length")?);
        if image_len > frame_len {
            return Err(NcmError::Truncated("cover frame"));
        }
        ensure_remaining(r, frame_len, file_len, "cover frame")?;
        let mut cover_blob = vec![0u8; usize::try_from(image_len).map_err(|_| NcmError::Truncated("cover image"))?];
        read_exact(r, &mut cover_blob, "cover image")?;
        skip(r, frame_len - image_len, file_len, "cover padding")?;

        let audio_offset = r.stream_position()?;
        Ok(Self {
            key_blob,
            meta_blob,
            cover_blob,
            audio_offset,
        })
    }
}

fn read_exact<R: Read>(r: &mut R, buf: &mut [u8], section: &'static str) -> Result<()> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            NcmError::Truncated(section)
        } else {
            NcmError::Io(e)
        }
    })
}

fn read_u32_le<R: Read>(r: &mut R, section: &'static str) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact(r, &mut buf, section)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read a `u32`-length-prefixed section, validating the length first.
fn read_sized_section<R: Read + Seek>(
    r: &mut R,
    file_len: u64,
    section: &'static str,
) -> Result<Vec<u8>> {
    let len = u64::from(read_u32_le(r, section)?);
    ensure_remaining(r, len, file_len, section)?;
    let mut buf = vec![0u8; usize::try_from(len).map_err(|_| NcmError::Truncated(section))?];
    read_exact(r, &mut buf, section)?;
    Ok(buf)
}

fn ensure_remaining<R: Seek>(
    r: &mut R,
    need: u64,
    file_len: u64,
    section: &'static str,
) -> Result<()> {
    let pos = r.stream_position()?;
    if need > file_len.saturating_sub(pos) {
        return Err(NcmError::Truncated(section));
    }
    Ok(())
}

fn skip<R: Seek>(r: &mut R, count: u64, file_len: u64, section: &'static str) -> Result<()> {
    ensure_remaining(r, count, file_len, section)?;
    r.seek(SeekFrom::Current(
        i64::try_from(count).map_err(|_| NcmError::Truncated(section))?,
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn build(key: &[u8], meta: &[u8], frame_len: u32, image: &[u8], audio: &[u8]) -> Vec<u8> {
        let mut out = MAGIC.to_vec();
        out.extend_from_slice(&[0u8; 2]);
        out.extend_from_slice(&u32::try_from(key.len()).unwrap().to_le_bytes());
        out.extend_from_slice(key);
        out.extend_from_slice(&u32::try_from(meta.len()).unwrap().to_le_bytes());
        out.extend_from_slice(meta);
        out.extend_from_slice(&[0u8; 5]);
        out.extend_from_slice(&frame_len.to_le_bytes());
        out.extend_from_slice(&u32::try_from(image.len()).unwrap().to_le_bytes());
        out.extend_from_slice(image);
        let padding = frame_len as usize - image.len();
        out.extend_from_slice(&vec![0u8; padding]);
        out.extend_from_slice(audio);
        out
    }

    #[test]
    fn parses_all_sections() {
        let bytes = build(b"keydata", b"metadata", 5, b"img", b"audio");
        let container = Container::parse(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(container.key_blob, b"keydata");
        assert_eq!(container.meta_blob, b"metadata");
        assert_eq!(container.cover_blob, b"img");
        // frame padding (2 bytes) sits between the image and the audio
        let expected_offset = bytes.len() as u64 - 5;
        assert_eq!(container.audio_offset, expected_offset);
    }

    #[test]
    fn empty_meta_and_cover_are_valid() {
        let bytes = build(b"keydata", b"", 0, b"", b"audio");
        let container = Container::parse(&mut Cursor::new(&bytes)).unwrap();
        assert!(container.meta_blob.is_empty());
        assert!(container.cover_blob.is_empty());
    }

    #[test]
    fn bad_magic_is_corrupt() {
        let mut bytes = build(b"keydata", b"", 0, b"", b"audio");
        bytes[0] ^= 0xFF;
        let err = Container::parse(&mut Cursor::new(&bytes)).unwrap_err();
        assert!(matches!(err, NcmError::CorruptContainer));
    }

    #[test]
    fn key_length_past_eof_is_truncated() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 2]);
        bytes.extend_from_slice(&1000u32.to_le_bytes());
        bytes.extend_from_slice(b"short");
        let err = Container::parse(&mut Cursor::new(&bytes)).unwrap_err();
        assert!(matches!(err, NcmError::Truncated("key blob")));
    }

    #[test]
    fn meta_length_past_eof_is_truncated() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 2]);
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(b"key");
        bytes.extend_from_slice(&50u32.to_le_bytes());
        bytes.extend_from_slice(b"tiny");
        let err = Container::parse(&mut Cursor::new(&bytes)).unwrap_err();
        assert!(matches!(err, NcmError::Truncated("metadata blob")));
    }

    #[test]
    fn cover_frame_smaller_than_image_is_truncated() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 2]);
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(b"key");
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 5]);
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&8u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        let err = Container::parse(&mut Cursor::new(&bytes)).unwrap_err();
        assert!(matches!(err, NcmError::Truncated("cover frame")));
    }

    #[test]
    fn truncated_signature_is_truncated() {
        let err = Container::parse(&mut Cursor::new(b"CTEN")).unwrap_err();
        assert!(matches!(err, NcmError::Truncated("signature")));
    }
}
