use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;

use crate::cipher;
use crate::error::{NcmError, Result};
use crate::tag::AudioFormat;

/// XOR mask applied to the metadata blob on disk.
const META_MASK: u8 = 0x63;
/// Marker in front of the base64 payload.
const META_MARKER: &[u8] = b"163 key(Don't modify):";
/// Marker in front of the decrypted JSON record.
const MUSIC_MARKER: &[u8] = b"music:";

/// Track information recovered from the container's metadata blob.
#[derive(Debug, Clone)]
pub struct TrackMetadata {
    pub id: u64,
    pub title: String,
    /// Ordered (name, id) pairs.
    pub artists: Vec<(String, u64)>,
    pub album: String,
    /// Remote cover URL, used when the container embeds no image.
    pub cover_url: Option<String>,
    /// The source's claim about the payload format. The decrypted bytes
    /// are still sniffed; this only breaks ties.
    pub format_hint: AudioFormat,
    pub bitrate: Option<u64>,
    pub duration: Option<u64>,
}

impl TrackMetadata {
    /// Join artist names with " / ".
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

/// Ids in the metadata record arrive as JSON numbers or strings,
/// depending on the file's vintage.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Num(u64),
    Text(String),
}

impl IdValue {
    fn value(&self) -> Option<u64> {
        match self {
            Self::Num(n) => Some(*n),
            Self::Text(s) => s.parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawMeta {
    #[serde(rename = "musicId", default)]
    music_id: Option<IdValue>,
    #[serde(rename = "musicName", default)]
    music_name: String,
    #[serde(default)]
    album: String,
    #[serde(rename = "albumPic", default)]
    album_pic: Option<String>,
    #[serde(default)]
    artist: Vec<(String, IdValue)>,
    #[serde(default)]
    bitrate: Option<IdValue>,
    #[serde(default)]
    duration: Option<IdValue>,
    #[serde(default)]
    format: String,
}

impl From<RawMeta> for TrackMetadata {
    fn from(raw: RawMeta) -> Self {
        let format_hint = match raw.format.as_str() {
            "mp3" => AudioFormat::Mp3,
            "flac" => AudioFormat::Flac,
            _ => AudioFormat::Unknown,
        };
        Self {
            id: raw.music_id.and_then(|v| v.value()).unwrap_or(0),
            title: raw.music_name,
            artists: raw
                .artist
                .into_iter()
                .map(|(name, id)| (name, id.value().unwrap_or(0)))
                .collect(),
            album: raw.album,
            cover_url: raw.album_pic.filter(|url| !url.is_empty()),
            format_hint,
            bitrate: raw.bitrate.and_then(|v| v.value()),
            duration: raw.duration.and_then(|v| v.value()),
        }
    }
}

/// Decode a non-empty metadata blob into a [`TrackMetadata`].
///
/// Every failure is reported as [`NcmError::Metadata`]; the facade treats
/// this stage as soft and converts the audio regardless.
pub fn decode_meta_blob(meta_blob: &[u8]) -> Result<TrackMetadata> {
    let unmasked: Vec<u8> = meta_blob.iter().map(|b| b ^ META_MASK).collect();
    let b64 = unmasked
        .strip_prefix(META_MARKER)
        .ok_or_else(|| NcmError::Metadata("missing 163 key marker".into()))?;
    let encrypted = BASE64
        .decode(b64)
        .map_err(|e| NcmError::Metadata(format!("base64 decode: {e}")))?;
    let decrypted = cipher::aes128_ecb_decrypt(&cipher::META_KEY, &encrypted)
        .map_err(|_| NcmError::Metadata("block decrypt failed".into()))?;
    let json = decrypted
        .strip_prefix(MUSIC_MARKER)
        .ok_or_else(|| NcmError::Metadata("missing music marker".into()))?;
    let raw: RawMeta = serde_json::from_slice(json)
        .map_err(|e| NcmError::Metadata(format!("JSON parse: {e}")))?;
    Ok(TrackMetadata::from(raw))
}
