use serde::Deserialize;

use crate::access::IpFilter;

pub const DEFAULT_WIDTH: u32 = 720;
pub const DEFAULT_HEIGHT: u32 = 404;

/// Read-only server settings consumed by the media routes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Raw allow/deny rules, see [`IpFilter`].
    pub ip_filter: String,
    /// Explicit preview width, `0` when unset.
    pub web_width: u32,
    /// Explicit preview height, `0` when unset.
    pub web_height: u32,
    /// Combined `"WxH"` preview size, consulted when width or height is unset.
    pub web_size: Option<String>,
    /// Transcode every MP4 regardless of its profile.
    pub web_mp4_trans: bool,
}

#[derive(Debug, Clone, Copy)]
enum Dimension {
    Width,
    Height,
}

impl ServerConfig {
    pub fn ip_filter(&self) -> IpFilter {
        IpFilter::from_raw(&self.ip_filter)
    }

    pub fn web_width(&self) -> u32 {
        self.dimension(self.web_width, Dimension::Width, DEFAULT_WIDTH)
    }

    pub fn web_height(&self) -> u32 {
        self.dimension(self.web_height, Dimension::Height, DEFAULT_HEIGHT)
    }

    // A malformed size string is not an error, the default is used instead.
    fn dimension(&self, explicit: u32, which: Dimension, default: u32) -> u32 {
        if explicit != 0 {
            return explicit;
        }
        let Some(size) = self.web_size.as_deref().filter(|s| !s.is_empty()) else {
            return default;
        };
        let Some((width, height)) = size.split_once('x') else {
            return default;
        };
        let part = match which {
            Dimension::Width => width,
            Dimension::Height => height,
        };
        part.trim().parse().unwrap_or(default)
    }
}
