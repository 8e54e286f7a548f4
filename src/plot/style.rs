//! Plot style presets
//!
//! A style is a plain value handed to every render call. The names follow
//! the common plotting themes. The data colour map is viridis except for
//! `grayscale`.

use super::colormap::{hex_to_rgba, Colormap};
use image::Rgba;
use tracing::{debug, warn};

pub const DEFAULT_STYLE: &str = "default";

/// Names accepted by [`PlotStyle::named`].
pub const STYLE_NAMES: [&str; 9] = [
    "default",
    "classic",
    "dark_background",
    "ggplot",
    "grayscale",
    "bmh",
    "fivethirtyeight",
    "seaborn",
    "Solarize_Light2",
];

#[derive(Debug, Clone, PartialEq)]
pub struct PlotStyle {
    pub name: String,
    pub background: Rgba<u8>,
    /// Panel area behind the data
    pub panel: Rgba<u8>,
    /// Frames and tick marks
    pub foreground: Rgba<u8>,
    pub nan_color: Rgba<u8>,
    pub line_color: Rgba<u8>,
    pub colormap: Colormap,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self::preset("default", "#ffffff", "#ffffff", "#000000", "#1f77b4")
    }
}

impl PlotStyle {
    fn preset(name: &str, background: &str, panel: &str, foreground: &str, line: &str) -> Self {
        Self {
            name: name.to_string(),
            background: hex_to_rgba(background),
            panel: hex_to_rgba(panel),
            foreground: hex_to_rgba(foreground),
            nan_color: hex_to_rgba("#bfbfbf"),
            line_color: hex_to_rgba(line),
            colormap: Colormap::viridis(),
        }
    }

    /// Look up a preset by name, `None` when unknown.
    pub fn named(name: &str) -> Option<Self> {
        let style = match name {
            "default" => Self::default(),
            "classic" => Self::preset(name, "#ffffff", "#ffffff", "#000000", "#0000ff"),
            "dark_background" => {
                let mut style = Self::preset(name, "#000000", "#000000", "#ffffff", "#8dd3c7");
                style.nan_color = hex_to_rgba("#404040");
                style
            }
            "ggplot" => Self::preset(name, "#ffffff", "#e5e5e5", "#555555", "#e24a33"),
            "grayscale" => {
                let mut style = Self::preset(name, "#ffffff", "#ffffff", "#000000", "#000000");
                style.colormap = Colormap::gray();
                style
            }
            "bmh" => Self::preset(name, "#ffffff", "#eeeeee", "#bcbcbc", "#348abd"),
            "fivethirtyeight" => Self::preset(name, "#f0f0f0", "#f0f0f0", "#cbcbcb", "#008fd5"),
            "seaborn" => Self::preset(name, "#ffffff", "#eaeaf2", "#ffffff", "#4c72b0"),
            "Solarize_Light2" => Self::preset(name, "#fdf6e3", "#eee8d5", "#586e75", "#268bd2"),
            _ => return None,
        };
        Some(style)
    }

    /// Resolve a user-supplied style name. Empty and `auto` select the
    /// default; unknown names are logged and replaced by the default.
    pub fn resolve(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            None | Some("") | Some("auto") => Self::default(),
            Some(name) => match Self::named(name) {
                Some(style) => {
                    debug!(style = name, "using plot style");
                    style
                }
                None => {
                    warn!(style = name, "unknown plot style, using '{}'", DEFAULT_STYLE);
                    Self::default()
                }
            },
        }
    }
}
