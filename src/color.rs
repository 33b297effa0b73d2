use std::collections::BTreeMap;

use palette::{Hsl, IntoColor, Srgb};
use serde::Serialize;

use crate::data::model::ALL;
use crate::data::order::AudienceOrder;

/// Neutral colour reserved for the sentinel audience.
pub const SENTINEL_COLOR: &str = "#808080";

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            let rgb: Srgb<u8> = rgb.into_format();
            format!("#{:02x}{:02x}{:02x}", rgb.red, rgb.green, rgb.blue)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Color mapping: audience → hex colour
// ---------------------------------------------------------------------------

/// Maps audiences to colours in rank order, so each audience keeps its colour
/// across every chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudienceColors {
    mapping: BTreeMap<String, String>,
}

/// One legend row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegendEntry {
    pub audience: String,
    pub color: String,
}

impl AudienceColors {
    pub fn new(order: &AudienceOrder) -> Self {
        let palette = generate_palette(order.audiences().len());
        let mapping = order
            .audiences()
            .iter()
            .cloned()
            .zip(palette)
            .collect();
        AudienceColors { mapping }
    }

    /// Colour for an audience; the sentinel and unknown audiences are grey.
    pub fn color_for(&self, audience: &str) -> &str {
        if audience == ALL {
            return SENTINEL_COLOR;
        }
        self.mapping
            .get(audience)
            .map(String::as_str)
            .unwrap_or(SENTINEL_COLOR)
    }

    /// Legend entries for the given audiences (already in display order).
    pub fn legend<'a>(&self, audiences: impl IntoIterator<Item = &'a str>) -> Vec<LegendEntry> {
        audiences
            .into_iter()
            .map(|a| LegendEntry {
                audience: a.to_string(),
                color: self.color_for(a).to_string(),
            })
            .collect()
    }
}
