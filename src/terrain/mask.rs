//! Paint masks aligned with the heightmap grid.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Material category a road is painted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PaintLayer {
    Asphalt,
    Gravel,
    Dirt,
}

impl PaintLayer {
    /// Lowercase name used for file naming.
    pub fn name(&self) -> &'static str {
        match self {
            PaintLayer::Asphalt => "asphalt",
            PaintLayer::Gravel => "gravel",
            PaintLayer::Dirt => "dirt",
        }
    }
}

/// Binary byte mask (0 or 255) with the same shape as the heightmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerMask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl LayerMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    #[inline]
    pub fn mark(&mut self, x: u32, y: u32) {
        let i = y as usize * self.width as usize + x as usize;
        self.data[i] = 255;
    }

    /// Number of painted pixels.
    pub fn coverage(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }
}

/// One mask per paint layer in use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerMaskSet {
    pub masks: BTreeMap<PaintLayer, LayerMask>,
}

impl LayerMaskSet {
    /// Returns the mask for `layer`, creating an empty one of the given shape if missing.
    pub fn layer_mut(&mut self, layer: PaintLayer, width: u32, height: u32) -> &mut LayerMask {
        self.masks
            .entry(layer)
            .or_insert_with(|| LayerMask::new(width, height))
    }

    pub fn get(&self, layer: PaintLayer) -> Option<&LayerMask> {
        self.masks.get(&layer)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PaintLayer, &LayerMask)> {
        self.masks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_mark_and_coverage() {
        let mut set = LayerMaskSet::default();
        let mask = set.layer_mut(PaintLayer::Gravel, 8, 4);
        mask.mark(3, 2);
        mask.mark(3, 2);
        mask.mark(0, 0);
        assert_eq!(set.get(PaintLayer::Gravel).unwrap().coverage(), 2);
        assert_eq!(set.get(PaintLayer::Gravel).unwrap().get(3, 2), 255);
        assert!(set.get(PaintLayer::Asphalt).is_none());
    }
}
