use std::time::Duration;

use lofty::picture::MimeType;
use log::warn;

use crate::metadata::TrackMetadata;

/// PNG signature, for MIME detection.
const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Cover art ready for embedding, however it was obtained.
#[derive(Debug, Clone)]
pub struct CoverImage {
    pub data: Vec<u8>,
}

impl CoverImage {
    pub fn mime(&self) -> MimeType {
        if self.data.starts_with(&PNG_MAGIC) {
            MimeType::Png
        } else {
            MimeType::Jpeg
        }
    }
}

/// Pick cover art for one conversion.
///
/// Embedded bytes win. Otherwise, when the caller allowed network access
/// and the metadata carries a cover URL, a single bounded fetch is tried.
/// `Ok(None)` means no cover exists anywhere; `Err` carries the fetch
/// failure for the caller to record as a warning. This stage never fails
/// a conversion.
pub fn resolve_cover(
    embedded: &[u8],
    metadata: Option<&TrackMetadata>,
    fetch_remote: bool,
) -> std::result::Result<Option<CoverImage>, String> {
    if !embedded.is_empty() {
        return Ok(Some(CoverImage {
            data: embedded.to_vec(),
        }));
    }
    if !fetch_remote {
        return Ok(None);
    }
    let Some(url) = metadata.and_then(|m| m.cover_url.as_deref()) else {
        return Ok(None);
    };
    match fetch(url) {
        Ok(data) => Ok(Some(CoverImage { data })),
        Err(e) => {
            warn!("cover fetch from {url} failed: {e}");
            Err(format!("cover fetch failed: {e}"))
        }
    }
}

fn fetch(url: &str) -> std::result::Result<Vec<u8>, reqwest::Error> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(FETCH_TIMEOUT)
        .build()?;
    let response = client.get(url).send()?.error_for_status()?;
    Ok(response.bytes()?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_cover_wins() {
        let cover = resolve_cover(b"jpegbytes", None, true).unwrap().unwrap();
        assert_eq!(cover.data, b"jpegbytes");
    }

    #[test]
    fn no_cover_without_network() {
        let cover = resolve_cover(b"", None, false).unwrap();
        assert!(cover.is_none());
    }

    #[test]
    fn mime_detection() {
        let png = CoverImage {
            data: [&PNG_MAGIC[..], b"rest"].concat(),
        };
        assert_eq!(png.mime(), MimeType::Png);
        let jpeg = CoverImage {
            data: vec![0xFF, 0xD8, 0xFF, 0xE0],
        };
        assert_eq!(jpeg.mime(), MimeType::Jpeg);
    }
}
