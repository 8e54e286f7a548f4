//! Colour maps built from hex colour stops

use image::Rgba;

/// A colour stop: position in `[0, 1]` and a `#rrggbb` colour
#[derive(Debug, Clone, PartialEq)]
pub struct ColorStop {
    pub position: f32,
    pub color: String,
}

impl ColorStop {
    pub fn new(position: f32, color: &str) -> Self {
        Self {
            position,
            color: color.to_string(),
        }
    }
}

/// Parse `#rrggbb` (leading `#` optional).
pub fn hex_to_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }

    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;

    Some((r, g, b))
}

/// Opaque RGBA from a hex colour, black when the string is malformed.
pub fn hex_to_rgba(hex: &str) -> Rgba<u8> {
    let (r, g, b) = hex_to_rgb(hex).unwrap_or((0, 0, 0));
    Rgba([r, g, b, 255])
}

/// Piecewise-linear colour map
#[derive(Debug, Clone, PartialEq)]
pub struct Colormap {
    name: String,
    stops: Vec<(f32, [u8; 3])>,
}

impl Colormap {
    /// Build from stops; malformed colours are skipped, positions sorted.
    pub fn from_stops(name: &str, stops: &[ColorStop]) -> Self {
        let mut parsed: Vec<(f32, [u8; 3])> = stops
            .iter()
            .filter_map(|s| hex_to_rgb(&s.color).map(|(r, g, b)| (s.position.clamp(0.0, 1.0), [r, g, b])))
            .collect();
        parsed.sort_by(|a, b| a.0.total_cmp(&b.0));
        if parsed.is_empty() {
            parsed = vec![(0.0, [0, 0, 0]), (1.0, [255, 255, 255])];
        }
        Self {
            name: name.to_string(),
            stops: parsed,
        }
    }

    pub fn viridis() -> Self {
        Self::from_stops(
            "viridis",
            &[
                ColorStop::new(0.0, "#440154"),
                ColorStop::new(0.125, "#472d7b"),
                ColorStop::new(0.25, "#3b528b"),
                ColorStop::new(0.375, "#2c728e"),
                ColorStop::new(0.5, "#21918c"),
                ColorStop::new(0.625, "#28ae80"),
                ColorStop::new(0.75, "#5ec962"),
                ColorStop::new(0.875, "#addc30"),
                ColorStop::new(1.0, "#fde725"),
            ],
        )
    }

    pub fn gray() -> Self {
        Self::from_stops(
            "gray",
            &[ColorStop::new(0.0, "#000000"), ColorStop::new(1.0, "#ffffff")],
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Colour at `t`, clamped into `[0, 1]`.
    pub fn color_at(&self, t: f64) -> Rgba<u8> {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) as f32 } else { 0.0 };
        let first = self.stops[0];
        if t <= first.0 {
            return rgba(first.1);
        }
        for pair in self.stops.windows(2) {
            let (p0, c0) = pair[0];
            let (p1, c1) = pair[1];
            if t <= p1 {
                let span = (p1 - p0).max(f32::EPSILON);
                let f = (t - p0) / span;
                let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * f).round() as u8;
                return Rgba([mix(c0[0], c1[0]), mix(c0[1], c1[1]), mix(c0[2], c1[2]), 255]);
            }
        }
        rgba(self.stops[self.stops.len() - 1].1)
    }
}

fn rgba(c: [u8; 3]) -> Rgba<u8> {
    Rgba([c[0], c[1], c[2], 255])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_parsing() {
        assert_eq!(hex_to_rgb("#ff8000"), Some((255, 128, 0)));
        assert_eq!(hex_to_rgb("fff"), None);
    }

    #[test]
    fn test_viridis_endpoints() {
        let cmap = Colormap::viridis();
        assert_eq!(cmap.color_at(0.0), Rgba([0x44, 0x01, 0x54, 255]));
        assert_eq!(cmap.color_at(1.0), Rgba([0xfd, 0xe7, 0x25, 255]));
        assert_eq!(cmap.color_at(7.0), cmap.color_at(1.0));
    }

    #[test]
    fn test_gray_midpoint() {
        let mid = Colormap::gray().color_at(0.5);
        assert!(mid.0[0] == 127 || mid.0[0] == 128);
    }
}
