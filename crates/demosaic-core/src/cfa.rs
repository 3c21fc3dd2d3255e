use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DemosaicError, Result};

/// Color channel in a CFA pattern. The discriminant doubles as the
/// output plane index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Red = 0,
    Green = 1,
    Blue = 2,
}

impl Channel {
    fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'R' => Some(Self::Red),
            'G' => Some(Self::Green),
            'B' => Some(Self::Blue),
            _ => None,
        }
    }

    fn letter(self) -> char {
        match self {
            Self::Red => 'R',
            Self::Green => 'G',
            Self::Blue => 'B',
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// A 2x2 Bayer channel ordering, row-major from the top-left mosaic
/// corner. Besides the four classic orderings, the four single-column
/// and single-row green variants produced by odd alignment offsets are
/// supported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[allow(clippy::upper_case_acronyms)]
pub enum BayerPattern {
    RGGB,
    BGGR,
    GBRG,
    GRBG,
    GRGB,
    GBGR,
    RGBG,
    BGRG,
}

impl BayerPattern {
    pub const ALL: [BayerPattern; 8] = [
        Self::RGGB,
        Self::BGGR,
        Self::GBRG,
        Self::GRBG,
        Self::GRGB,
        Self::GBGR,
        Self::RGBG,
        Self::BGRG,
    ];

    /// The four channels in row-major order.
    pub fn channels(self) -> [Channel; 4] {
        use Channel::*;
        match self {
            Self::RGGB => [Red, Green, Green, Blue],
            Self::BGGR => [Blue, Green, Green, Red],
            Self::GBRG => [Green, Blue, Red, Green],
            Self::GRBG => [Green, Red, Blue, Green],
            Self::GRGB => [Green, Red, Green, Blue],
            Self::GBGR => [Green, Blue, Green, Red],
            Self::RGBG => [Red, Green, Blue, Green],
            Self::BGRG => [Blue, Green, Red, Green],
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            Self::RGGB => "RGGB",
            Self::BGGR => "BGGR",
            Self::GBRG => "GBRG",
            Self::GRBG => "GRBG",
            Self::GRGB => "GRGB",
            Self::GBGR => "GBGR",
            Self::RGBG => "RGBG",
            Self::BGRG => "BGRG",
        }
    }

    pub fn parse(id: &str) -> Result<Self> {
        let id = id.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.id() == id)
            .ok_or_else(|| DemosaicError::InvalidCfaPattern(id))
    }
}

impl fmt::Display for BayerPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// CFA pattern descriptor for 2x2 Bayer and 6x6 X-Trans mosaics.
///
/// Backed by a fixed-size table; `channel_at` is a modulo lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CfaPattern {
    table: [Channel; 36],
    size: usize,
}

impl CfaPattern {
    /// Tile size: 2 for Bayer, 6 for X-Trans.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_bayer(&self) -> bool {
        self.size == 2
    }

    pub fn is_xtrans(&self) -> bool {
        self.size == 6
    }

    pub fn bayer(pattern: BayerPattern) -> Self {
        let p = pattern.channels();
        let mut table = [Channel::Green; 36];
        table[..4].copy_from_slice(&p);
        Self { table, size: 2 }
    }

    /// Parse a CFA pattern string: 4 characters for Bayer, 36 for
    /// X-Trans, row-major, letters R/G/B. Bayer strings must name one
    /// of the eight supported orderings.
    pub fn parse(id: &str) -> Result<Self> {
        let id = id.trim();
        match id.len() {
            4 => Ok(Self::bayer(BayerPattern::parse(id)?)),
            36 => {
                let mut table = [Channel::Green; 36];
                for (i, c) in id.chars().enumerate() {
                    table[i] = Channel::from_letter(c)
                        .ok_or_else(|| DemosaicError::InvalidCfaPattern(id.to_owned()))?;
                }
                let cfa = Self { table, size: 6 };
                cfa.validate(id)?;
                Ok(cfa)
            }
            _ => Err(DemosaicError::InvalidCfaPattern(id.to_owned())),
        }
    }

    /// Channel at mosaic position (x, y). Wraps modulo the tile size.
    #[inline]
    pub fn channel_at(&self, x: usize, y: usize) -> Channel {
        self.table[(y % self.size) * self.size + (x % self.size)]
    }

    /// Channel counts [R, G, B] over one tile.
    pub fn channel_counts(&self) -> [usize; 3] {
        let mut counts = [0usize; 3];
        for y in 0..self.size {
            for x in 0..self.size {
                counts[self.channel_at(x, y) as usize] += 1;
            }
        }
        counts
    }

    /// Pattern string, row-major.
    pub fn id(&self) -> String {
        let mut s = String::with_capacity(self.size * self.size);
        for y in 0..self.size {
            for x in 0..self.size {
                s.push(self.channel_at(x, y).letter());
            }
        }
        s
    }

    /// Per-tile channel counts for a plausible X-Trans layout.
    fn validate(&self, id: &str) -> Result<()> {
        let [r, g, b] = self.channel_counts();
        if (6..=10).contains(&r) && (16..=24).contains(&g) && (6..=10).contains(&b) {
            Ok(())
        } else {
            Err(DemosaicError::InvalidCfaPattern(id.to_owned()))
        }
    }
}

impl fmt::Display for CfaPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bayer() {
            f.write_str(&self.id())
        } else {
            write!(f, "X-Trans {}", self.id())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bayer_lookup_wraps() {
        let cfa = CfaPattern::bayer(BayerPattern::RGGB);
        assert_eq!(cfa.channel_at(0, 0), Channel::Red);
        assert_eq!(cfa.channel_at(1, 0), Channel::Green);
        assert_eq!(cfa.channel_at(0, 1), Channel::Green);
        assert_eq!(cfa.channel_at(1, 1), Channel::Blue);
        assert_eq!(cfa.channel_at(2, 2), Channel::Red);
        assert_eq!(cfa.channel_at(5, 4), Channel::Green);
    }

    #[test]
    fn all_bayer_orderings_round_trip() {
        for p in BayerPattern::ALL {
            let cfa = CfaPattern::bayer(p);
            assert_eq!(cfa.id(), p.id());
            assert_eq!(CfaPattern::parse(p.id()).unwrap(), cfa);
            assert_eq!(BayerPattern::parse(p.id()).unwrap(), p);
        }
    }

    #[test]
    fn invalid_bayer_rejected() {
        assert!(CfaPattern::parse("RRGG").is_err());
        assert!(CfaPattern::parse("RGGX").is_err());
        assert!(BayerPattern::parse("XYZW").is_err());
    }

    #[test]
    fn unsupported_bayer_orderings_rejected() {
        // {R,G,G,B} multisets that are not one of the eight orderings.
        for id in ["RBGG", "BRGG", "GGRB", "GGBR"] {
            assert!(CfaPattern::parse(id).is_err(), "{id} accepted");
            assert!(BayerPattern::parse(id).is_err(), "{id} accepted");
        }
    }
}
