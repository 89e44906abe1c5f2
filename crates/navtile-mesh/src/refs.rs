//! Bit-packed tile and polygon references.
//!
//! A reference packs `salt | tile | poly` into its low 32 bits, polygon index
//! lowest. Tile and polygon fields together never exceed [`REF_BITS`]; the
//! salt takes what is left and is never zero, so a valid reference is never 0.

use crate::MeshError;

/// Bits shared by the tile and polygon fields.
pub const REF_BITS: u32 = 22;
/// Upper bound on tile bits so at least 2^8 polygons stay addressable per tile.
pub const MAX_TILE_BITS: u32 = 14;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileRef(pub u64);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolyRef(pub u64);

impl TileRef {
    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl PolyRef {
    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Split of the reference bits between tile slots and polygons per tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReferenceBudget {
    pub tile_bits: u32,
    pub poly_bits: u32,
}

impl ReferenceBudget {
    /// Covers `tile_count` tiles where the tile cap allows, leaving every other
    /// bit to polygons.
    pub fn for_tile_count(tile_count: u64) -> Self {
        let p = tile_count.max(1).checked_next_power_of_two().unwrap_or(1 << 63);
        let tile_bits = p.ilog2().min(MAX_TILE_BITS);
        Self {
            tile_bits,
            poly_bits: REF_BITS - tile_bits,
        }
    }

    /// Budget able to address `max_tiles` tiles of `max_polys` polygons each.
    pub fn from_capacity(max_tiles: u32, max_polys: u32) -> Result<Self, MeshError> {
        if max_tiles == 0 || max_polys == 0 {
            return Err(MeshError::InvalidParams("tile and polygon capacity must be positive"));
        }
        let bits = |n: u32| n.checked_next_power_of_two().map_or(32, u32::ilog2);
        let (tile_bits, poly_bits) = (bits(max_tiles), bits(max_polys));
        if tile_bits + poly_bits > REF_BITS {
            return Err(MeshError::InvalidParams("tile and polygon capacity exceed the reference width"));
        }
        Ok(Self { tile_bits, poly_bits })
    }

    #[inline]
    pub fn max_tiles(&self) -> u32 {
        1 << self.tile_bits
    }

    #[inline]
    pub fn max_polys_per_tile(&self) -> u32 {
        1 << self.poly_bits
    }

    #[inline]
    pub fn salt_bits(&self) -> u32 {
        (32 - self.tile_bits - self.poly_bits).min(31)
    }

    #[inline]
    pub(crate) fn salt_mask(&self) -> u32 {
        (1 << self.salt_bits()) - 1
    }

    /// Next salt after `salt`, skipping zero.
    #[inline]
    pub(crate) fn next_salt(&self, salt: u32) -> u32 {
        match salt.wrapping_add(1) & self.salt_mask() {
            0 => 1,
            s => s,
        }
    }

    pub fn encode(&self, salt: u32, tile: u32, poly: u32) -> PolyRef {
        let tile_mask = (1u64 << self.tile_bits) - 1;
        let poly_mask = (1u64 << self.poly_bits) - 1;
        PolyRef(
            (u64::from(salt & self.salt_mask()) << (self.poly_bits + self.tile_bits))
                | ((u64::from(tile) & tile_mask) << self.poly_bits)
                | (u64::from(poly) & poly_mask),
        )
    }

    #[inline]
    pub fn tile_ref(&self, salt: u32, tile: u32) -> TileRef {
        TileRef(self.encode(salt, tile, 0).0)
    }

    /// `(salt, tile, poly)` of a reference.
    pub fn decode(&self, r: u64) -> (u32, u32, u32) {
        let salt_mask = u64::from(self.salt_mask());
        let tile_mask = (1u64 << self.tile_bits) - 1;
        let poly_mask = (1u64 << self.poly_bits) - 1;
        (
            ((r >> (self.poly_bits + self.tile_bits)) & salt_mask) as u32,
            ((r >> self.poly_bits) & tile_mask) as u32,
            (r & poly_mask) as u32,
        )
    }

    /// True when no bit outside the salt, tile and polygon fields is set.
    #[inline]
    pub(crate) fn fits(&self, r: u64) -> bool {
        r >> (self.salt_bits() + self.tile_bits + self.poly_bits) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_grids() {
        let b = ReferenceBudget::for_tile_count(1);
        assert_eq!((b.tile_bits, b.poly_bits), (0, 22));
        let b = ReferenceBudget::for_tile_count(4);
        assert_eq!((b.tile_bits, b.poly_bits), (2, 20));
        let b = ReferenceBudget::for_tile_count(121);
        assert_eq!((b.tile_bits, b.max_tiles()), (7, 128));
    }

    #[test]
    fn tile_bits_are_capped() {
        let b = ReferenceBudget::for_tile_count(1 << 20);
        assert_eq!((b.tile_bits, b.poly_bits), (14, 8));
        assert_eq!(b.max_polys_per_tile(), 256);
        assert_eq!(b.salt_bits(), 10);
    }

    #[test]
    fn encode_decode() {
        let b = ReferenceBudget::for_tile_count(100);
        let r = b.encode(3, 77, 1234);
        assert_eq!(b.decode(r.0), (3, 77, 1234));
        assert!(b.fits(r.0));
        assert!(!b.fits(r.0 | 1 << 40));
    }

    #[test]
    fn salt_wraps_past_zero() {
        let b = ReferenceBudget::for_tile_count(4);
        assert_eq!(b.next_salt(1), 2);
        assert_eq!(b.next_salt(b.salt_mask()), 1);
    }

    #[test]
    fn capacity_round_trip() {
        let b = ReferenceBudget::for_tile_count(300);
        let c = ReferenceBudget::from_capacity(b.max_tiles(), b.max_polys_per_tile()).unwrap();
        assert_eq!(b, c);
        assert!(ReferenceBudget::from_capacity(1 << 14, 1 << 10).is_err());
    }
}
