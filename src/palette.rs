//! Palette storage and colour matching.

/// Number of slots in a palette.
pub const PALETTE_SLOTS: usize = 256;

/// Highest entry count reachable through [`Palette::match_color`].
///
/// Slot 255 is never appended by matching; it can only be written by a
/// decoder that copies a full 256-colour table.
pub const MATCH_APPEND_LIMIT: usize = 255;

/// Tolerance, per channel, of [`is_near_transparent`].
pub const NEAR_TRANSPARENT_TOLERANCE: i32 = 8;

/// A 256-slot RGB palette with a count of used entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    red: [u8; PALETTE_SLOTS],
    green: [u8; PALETTE_SLOTS],
    blue: [u8; PALETTE_SLOTS],
    len: usize,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            red: [0; PALETTE_SLOTS],
            green: [0; PALETTE_SLOTS],
            blue: [0; PALETTE_SLOTS],
            len: 0,
        }
    }
}

impl Palette {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed two-entry black/white palette of monochrome images.
    pub fn monochrome() -> Self {
        let mut p = Self::default();
        p.set(0, [0, 0, 0]);
        p.set(1, [255, 255, 255]);
        p
    }

    /// Build from packed RGB triplets, at most 256 are used.
    pub fn from_rgb_triplets(rgb: &[u8]) -> Self {
        let mut p = Self::default();
        for (i, c) in rgb.chunks_exact(3).take(PALETTE_SLOTS).enumerate() {
            p.set(i, [c[0], c[1], c[2]]);
        }
        p
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Colour at `index`; unused slots read as black.
    pub fn get(&self, index: u8) -> [u8; 3] {
        let i = index as usize;
        [self.red[i], self.green[i], self.blue[i]]
    }

    /// Write slot `index` directly, growing the count to cover it.
    pub fn set(&mut self, index: usize, rgb: [u8; 3]) {
        if index >= PALETTE_SLOTS {
            return;
        }
        self.red[index] = rgb[0];
        self.green[index] = rgb[1];
        self.blue[index] = rgb[2];
        if index >= self.len {
            self.len = index + 1;
        }
    }

    /// Used entries as packed RGB triplets.
    pub fn to_rgb_triplets(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len * 3);
        for i in 0..self.len {
            out.extend_from_slice(&[self.red[i], self.green[i], self.blue[i]]);
        }
        out
    }

    /// Index of an exact match among used entries.
    pub fn find(&self, rgb: [u8; 3]) -> Option<u8> {
        (0..self.len)
            .find(|&i| self.red[i] == rgb[0] && self.green[i] == rgb[1] && self.blue[i] == rgb[2])
            .map(|i| i as u8)
    }

    /// Whether this is exactly the monochrome palette.
    pub fn is_monochrome(&self) -> bool {
        self.len == 2 && self.get(0) == [0, 0, 0] && self.get(1) == [255, 255, 255]
    }

    /// Return the index for a colour, appending it while fewer than 255
    /// entries are used, otherwise falling back to the nearest existing
    /// entry by Euclidean distance (first entry wins ties).
    pub fn match_color(&mut self, r: u8, g: u8, b: u8) -> u8 {
        if let Some(i) = self.find([r, g, b]) {
            return i;
        }
        if self.len < MATCH_APPEND_LIMIT {
            let i = self.len;
            self.set(i, [r, g, b]);
            return i as u8;
        }
        self.nearest(r, g, b)
    }

    /// Index of the nearest used entry, 0 for an empty palette.
    pub fn nearest(&self, r: u8, g: u8, b: u8) -> u8 {
        let mut best = 0usize;
        let mut best_dist = f64::MAX;
        for i in 0..self.len {
            let dr = self.red[i] as f64 - r as f64;
            let dg = self.green[i] as f64 - g as f64;
            let db = self.blue[i] as f64 - b as f64;
            let dist = (dr * dr + dg * dg + db * db).sqrt();
            if dist < best_dist {
                best_dist = dist;
                best = i;
            }
        }
        best as u8
    }

    /// Whether every used entry is a shade of grey.
    pub fn is_grayscale(&self) -> bool {
        (0..self.len).all(|i| self.red[i] == self.green[i] && self.green[i] == self.blue[i])
    }
}

/// Luminance `0.30 R + 0.59 G + 0.11 B`, truncated.
///
/// The sum is not rounded, so some neutral greys land one below their own
/// value: `luma(128, 128, 128)` is 127.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.30 * r as f64 + 0.59 * g as f64 + 0.11 * b as f64) as u8
}

/// Whether `(r, g, b)` lies within ±8 per channel of the transparent key.
pub fn is_near_transparent(r: u8, g: u8, b: u8, transparent: Option<[u8; 3]>) -> bool {
    let Some([tr, tg, tb]) = transparent else {
        return false;
    };
    let near = |a: u8, k: u8| (a as i32 - k as i32).abs() <= NEAR_TRANSPARENT_TOLERANCE;
    near(r, tr) && near(g, tg) && near(b, tb)
}
