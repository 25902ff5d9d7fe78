use std::fmt;
use std::path::Path;

use tracing::debug;

/// AVC level at or above which MP4 sources are not trusted for direct play.
pub const MP4_DIRECT_LEVEL_LIMIT: u32 = 40;

/// The media kinds the delivery policy knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MimeKind {
    Mp4,
    Ogg,
    Webm,
    Mp3,
    Wav,
    Png,
    Jpg,
    Other,
}

/// The kind every transcode produces.
pub const TRANSCODE_TARGET: MimeKind = MimeKind::Ogg;

impl MimeKind {
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "video/mp4" => MimeKind::Mp4,
            "video/ogg" | "audio/ogg" => MimeKind::Ogg,
            "video/webm" | "audio/webm" => MimeKind::Webm,
            "audio/mpeg" | "audio/mp3" => MimeKind::Mp3,
            "audio/wav" | "audio/x-wav" | "audio/wave" => MimeKind::Wav,
            "image/png" => MimeKind::Png,
            "image/jpeg" | "image/jpg" => MimeKind::Jpg,
            _ => MimeKind::Other,
        }
    }

    /// Guesses the kind from a file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        mime_guess::from_path(path)
            .first_raw()
            .map(MimeKind::from_mime)
            .unwrap_or(MimeKind::Other)
    }

    /// Canonical mime string. [`MimeKind::Other`] maps to `application/octet-stream`.
    pub fn mime(&self) -> &'static str {
        match self {
            MimeKind::Mp4 => "video/mp4",
            MimeKind::Ogg => "video/ogg",
            MimeKind::Webm => "video/webm",
            MimeKind::Mp3 => "audio/mpeg",
            MimeKind::Wav => "audio/wav",
            MimeKind::Png => "image/png",
            MimeKind::Jpg => "image/jpeg",
            MimeKind::Other => "application/octet-stream",
        }
    }

    /// Whether bytes of this kind may be sent to the client untouched.
    ///
    /// WAV is left out on purpose: browsers handle it poorly enough that it
    /// always goes through the transcoder.
    pub fn is_direct(&self) -> bool {
        matches!(
            self,
            MimeKind::Mp4 | MimeKind::Webm | MimeKind::Ogg | MimeKind::Mp3 | MimeKind::Png | MimeKind::Jpg
        )
    }
}

impl fmt::Display for MimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// An MP4 still needs transcoding when the server forces it, or when its AVC
/// level is at or above [`MP4_DIRECT_LEVEL_LIMIT`].
pub fn needs_transcode_for_mp4(kind: MimeKind, avc_level: u32, mp4_trans_forced: bool) -> bool {
    if kind != MimeKind::Mp4 {
        return false;
    }
    debug!(avc_level, mp4_trans_forced, "mp4 profile");
    mp4_trans_forced || avc_level >= MP4_DIRECT_LEVEL_LIMIT
}

/// The mime type used for every transcoded response.
pub fn transcode_target_mime() -> &'static str {
    TRANSCODE_TARGET.mime()
}
