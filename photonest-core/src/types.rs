//! Domain types shared across the scan subsystem.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! row_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

row_id!(
    /// Identifies a registered user.
    UserId
);
row_id!(
    /// Identifies one album. The unit of scan scheduling; the scheduler
    /// de-duplicates queued work by this id.
    AlbumId
);
row_id!(
    /// Identifies one discovered media file.
    MediaId
);

/// Owner of one or more album trees.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

/// A directory tree owned by a user. Root albums have no parent; nested
/// directories are represented as child albums with their own scan jobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Album {
    pub id: AlbumId,
    pub owner: UserId,
    pub parent: Option<AlbumId>,
    pub title: String,
    pub path: PathBuf,
}

/// One discovered photo or video inside an album.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Media {
    pub id: MediaId,
    pub album: AlbumId,
    pub path: PathBuf,
    pub title: String,
    pub media_type: MediaType,
    pub discovered_at: DateTime<Utc>,
}

/// Fields needed to insert a media record; the store assigns the id and
/// discovery timestamp.
#[derive(Clone, Debug)]
pub struct NewMedia {
    pub album: AlbumId,
    pub path: PathBuf,
    pub title: String,
    pub media_type: MediaType,
}

/// Supported media formats, detected from the file extension.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Jpeg,
    Png,
    Gif,
    Webp,
    Tiff,
    Bmp,
    Heif,
    Raw,
    Mp4,
    Webm,
    Mkv,
    Mov,
    Avi,
    Mpeg,
}

impl MediaType {
    /// Detect the media type of `path` from its extension. Returns `None`
    /// for unsupported or missing extensions.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::from_extension(&extension)
    }

    /// Detect the media type from a bare, already-lowercased extension.
    pub fn from_extension(extension: &str) -> Option<Self> {
        let detected = match extension {
            "jpg" | "jpeg" => Self::Jpeg,
            "png" => Self::Png,
            "gif" => Self::Gif,
            "webp" => Self::Webp,
            "tif" | "tiff" => Self::Tiff,
            "bmp" => Self::Bmp,
            "heic" | "heif" | "avif" => Self::Heif,
            "cr2" | "cr3" | "nef" | "arw" | "dng" | "orf" | "raf" | "rw2" | "pef" | "srw"
            | "x3f" => Self::Raw,
            "mp4" | "m4v" => Self::Mp4,
            "webm" => Self::Webm,
            "mkv" => Self::Mkv,
            "mov" => Self::Mov,
            "avi" => Self::Avi,
            "mpg" | "mpeg" | "ts" | "m2ts" | "mts" => Self::Mpeg,
            _ => return None,
        };
        Some(detected)
    }

    /// Whether this is a camera RAW format needing conversion before display.
    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw)
    }

    /// Whether this is a video format.
    pub fn is_video(&self) -> bool {
        matches!(
            self,
            Self::Mp4 | Self::Webm | Self::Mkv | Self::Mov | Self::Avi | Self::Mpeg
        )
    }

    /// Whether this is a still-image format (RAW included).
    pub fn is_photo(&self) -> bool {
        !self.is_video()
    }
}

/// What a derived artifact is for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// Small preview used in grids.
    Thumbnail,
    /// Browser-displayable rendition of a photo.
    WebPhoto,
    /// Browser-playable rendition of a video.
    WebVideo,
}

/// One generated output (thumbnail, transcode, ...) tied to a media item.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DerivedArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_types_case_insensitively() {
        assert_eq!(
            MediaType::from_path(Path::new("/a/photo.JPG")),
            Some(MediaType::Jpeg)
        );
        assert_eq!(
            MediaType::from_path(Path::new("/a/clip.Mp4")),
            Some(MediaType::Mp4)
        );
        assert_eq!(
            MediaType::from_path(Path::new("/a/shot.cr2")),
            Some(MediaType::Raw)
        );
    }

    #[test]
    fn unknown_extensions_are_not_media() {
        assert_eq!(MediaType::from_path(Path::new("/a/track.gpx")), None);
        assert_eq!(MediaType::from_path(Path::new("/a/noext")), None);
    }

    #[test]
    fn classification_helpers() {
        assert!(MediaType::Raw.is_raw());
        assert!(MediaType::Raw.is_photo());
        assert!(MediaType::Mkv.is_video());
        assert!(!MediaType::Jpeg.is_video());
    }
}
