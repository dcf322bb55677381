//! Pre-flight checks on a candidate file.
//!
//! Validation runs before every attempt, including resumes, and never
//! touches the network. It reads at most [`SNIFF_LEN`] bytes.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::error::{Error, Result};

use super::FileIdentity;

/// Number of leading bytes read for sniffing and fingerprinting.
pub const SNIFF_LEN: usize = 64 * 1024;

/// Broad kind of media the remote library accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaCategory {
    /// Still image, including camera RAW
    Image,
    /// Video clip
    Video,
}

impl MediaCategory {
    /// Category implied by a MIME type, if it is a media type at all.
    #[must_use]
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.split('/').next() {
            Some("image") => Some(Self::Image),
            Some("video") => Some(Self::Video),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => f.write_str("image"),
            Self::Video => f.write_str("video"),
        }
    }
}

/// Content type recognized from a file's leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sniffed {
    /// MIME type declared to the server
    pub mime_type: &'static str,
    /// Media category
    pub category: MediaCategory,
}

impl Sniffed {
    const fn image(mime_type: &'static str) -> Self {
        Self {
            mime_type,
            category: MediaCategory::Image,
        }
    }

    const fn video(mime_type: &'static str) -> Self {
        Self {
            mime_type,
            category: MediaCategory::Video,
        }
    }
}

/// A file that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedFile {
    /// Identity used to find the session record
    pub identity: FileIdentity,
    /// Sniffed MIME type
    pub mime_type: String,
    /// Sniffed media category
    pub category: MediaCategory,
}

/// Size and content checks applied before an upload.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    min_size: u64,
    max_size: u64,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(crate::MIN_FILE_SIZE, crate::MAX_FILE_SIZE)
    }
}

impl Validator {
    /// Create a validator accepting sizes in `min_size..=max_size`.
    #[must_use]
    pub const fn new(min_size: u64, max_size: u64) -> Self {
        Self { min_size, max_size }
    }

    /// Validate a file and compute its identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFile`] if the file cannot be opened, is not a
    /// regular file, has an out-of-range size, or does not look like a photo
    /// or video.
    pub async fn validate(&self, path: &Path) -> Result<ValidatedFile> {
        let canonical = fs::canonicalize(path)
            .await
            .map_err(|e| Error::invalid_file(path, format!("cannot open: {e}")))?;

        let mut file = fs::File::open(&canonical)
            .await
            .map_err(|e| Error::invalid_file(path, format!("cannot open: {e}")))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| Error::invalid_file(path, format!("cannot stat: {e}")))?;

        if !metadata.is_file() {
            return Err(Error::invalid_file(path, "not a regular file"));
        }

        let size = metadata.len();
        if size < self.min_size {
            return Err(Error::invalid_file(
                path,
                format!("size {size} is below the minimum of {} bytes", self.min_size),
            ));
        }
        if size > self.max_size {
            return Err(Error::invalid_file(
                path,
                format!("size {size} exceeds the maximum of {} bytes", self.max_size),
            ));
        }

        let mut prefix = Vec::with_capacity(SNIFF_LEN.min(size as usize));
        (&mut file)
            .take(SNIFF_LEN as u64)
            .read_to_end(&mut prefix)
            .await
            .map_err(|e| Error::invalid_file(path, format!("cannot read: {e}")))?;

        let sniffed = sniff(&prefix)
            .ok_or_else(|| Error::invalid_file(path, "content is not a recognized photo or video"))?;

        let implied = mime_guess::from_path(&canonical)
            .first()
            .and_then(|m| MediaCategory::from_mime(m.essence_str()));
        if let Some(expected) = implied {
            if expected != sniffed.category {
                return Err(Error::invalid_file(
                    path,
                    format!(
                        "extension suggests {expected} but content is {} ({})",
                        sniffed.category, sniffed.mime_type
                    ),
                ));
            }
        }

        tracing::debug!(
            path = %canonical.display(),
            size,
            mime_type = sniffed.mime_type,
            "Validated file"
        );

        Ok(ValidatedFile {
            identity: FileIdentity {
                path: canonical,
                size,
                fingerprint: xxhash_rust::xxh3::xxh3_64(&prefix),
            },
            mime_type: sniffed.mime_type.to_string(),
            category: sniffed.category,
        })
    }
}

/// Recognize a photo or video from its leading bytes.
#[must_use]
pub fn sniff(bytes: &[u8]) -> Option<Sniffed> {
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";
    const MATROSKA: &[u8] = b"\x1a\x45\xdf\xa3";
    const ASF: &[u8] = b"\x30\x26\xb2\x75\x8e\x66\xcf\x11";
    const MPEG_PS: &[u8] = b"\x00\x00\x01\xba";

    if bytes.starts_with(b"\xff\xd8\xff") {
        return Some(Sniffed::image("image/jpeg"));
    }
    if bytes.starts_with(PNG) {
        return Some(Sniffed::image("image/png"));
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some(Sniffed::image("image/gif"));
    }
    if bytes.len() >= 12 && bytes.starts_with(b"RIFF") {
        return match &bytes[8..12] {
            b"WEBP" => Some(Sniffed::image("image/webp")),
            b"AVI " => Some(Sniffed::video("video/x-msvideo")),
            _ => None,
        };
    }
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        return sniff_ftyp(&bytes[8..12]);
    }
    // TIFF, and the TIFF-based RAW formats (DNG, CR2, NEF, ARW, ORF, RW2)
    if bytes.starts_with(b"II*\x00")
        || bytes.starts_with(b"MM\x00*")
        || bytes.starts_with(b"IIRO")
        || bytes.starts_with(b"IIU\x00")
    {
        return Some(Sniffed::image("image/tiff"));
    }
    if bytes.starts_with(MATROSKA) {
        return Some(if bytes.windows(4).any(|w| w == b"webm") {
            Sniffed::video("video/webm")
        } else {
            Sniffed::video("video/x-matroska")
        });
    }
    if bytes.starts_with(ASF) {
        return Some(Sniffed::video("video/x-ms-wmv"));
    }
    if bytes.starts_with(MPEG_PS) {
        return Some(Sniffed::video("video/mpeg"));
    }
    if is_transport_stream(bytes) {
        return Some(Sniffed::video("video/mp2t"));
    }
    if bytes.starts_with(b"BM") && bytes.len() >= 14 {
        return Some(Sniffed::image("image/bmp"));
    }
    None
}

fn sniff_ftyp(brand: &[u8]) -> Option<Sniffed> {
    match brand {
        b"heic" | b"heix" | b"hevc" | b"hevx" | b"heim" | b"heis" => {
            Some(Sniffed::image("image/heic"))
        }
        b"mif1" | b"msf1" => Some(Sniffed::image("image/heif")),
        b"avif" | b"avis" => Some(Sniffed::image("image/avif")),
        b"crx " => Some(Sniffed::image("image/x-canon-cr3")),
        b"qt  " => Some(Sniffed::video("video/quicktime")),
        b"3gp4" | b"3gp5" | b"3gp6" | b"3g2a" => Some(Sniffed::video("video/3gpp")),
        b"isom" | b"iso2" | b"iso4" | b"iso5" | b"iso6" | b"mp41" | b"mp42" | b"avc1"
        | b"dash" | b"M4V " | b"M4VH" | b"MSNV" | b"XAVC" => Some(Sniffed::video("video/mp4")),
        _ => None,
    }
}

/// MPEG-TS packets are 188 bytes with a 0x47 sync byte; camera M2TS files
/// prefix each packet with a 4-byte timestamp.
fn is_transport_stream(bytes: &[u8]) -> bool {
    const SYNC: u8 = 0x47;
    let synced = |start: usize, stride: usize| {
        bytes.len() > start + stride && bytes[start] == SYNC && bytes[start + stride] == SYNC
    };
    synced(0, 188) || synced(4, 192)
}
