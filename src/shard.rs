//! Shard construction and the shard registry
//!
//! A shard is one independently warped screen region: a 4-point
//! correspondence between display and source space, a mask polygon, and the
//! transforms derived from them. Shards are immutable once built; new
//! correspondence data replaces the whole registry rather than patching
//! individual entries.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::ShardDescriptor;
use crate::error::ShardFault;
use crate::homography::{Homography, InvertStatus, Point};

/// One screen region with its derived transforms.
///
/// `forward` maps display coordinates into source coordinates (the sampling
/// direction: a display pixel is traced back to the source pixel it shows);
/// `inverse` maps the other way and re-expresses the mask polygon for the
/// stencil pass.
#[derive(Debug, Clone)]
pub struct Shard {
    /// Stable identity from the descriptor; survives visibility filtering.
    pub index: usize,
    pub source_points: Vec<Point>,
    pub display_points: Vec<Point>,
    pub mask_points: Vec<Point>,
    pub forward: Homography,
    pub inverse: Homography,
    /// Mask polygon pushed through `inverse`; this is what the stencil pass
    /// rasterizes.
    pub transformed_mask_points: Vec<Point>,
    /// False when the correspondence data was unusable; the shard stays
    /// addressable for diagnostics but never renders.
    pub ready: bool,
    /// Construction diagnostic, if any.
    pub fault: Option<ShardFault>,
}

impl Shard {
    /// Build a shard from externally supplied descriptor data.
    ///
    /// Only the first 4 points of each correspondence array are used for the
    /// fit; extras are retained for diagnostics. Too few points marks the
    /// shard unavailable. A degenerate fit does not: the inverse falls back
    /// to identity and the shard renders unwarped, with the fault recorded
    /// so callers can tell the difference.
    pub fn build(desc: &ShardDescriptor) -> Self {
        if desc.source_points.len() < 4 || desc.display_points.len() < 4 {
            let fault = ShardFault::InsufficientCorrespondence {
                source_points: desc.source_points.len(),
                display_points: desc.display_points.len(),
            };
            tracing::warn!("Shard {}: {}", desc.index, fault);

            return Self {
                index: desc.index,
                source_points: desc.source_points.clone(),
                display_points: desc.display_points.clone(),
                mask_points: desc.mask_points.clone(),
                forward: Homography::IDENTITY,
                inverse: Homography::IDENTITY,
                transformed_mask_points: desc.mask_points.clone(),
                ready: false,
                fault: Some(fault),
            };
        }

        let forward = Homography::from_correspondence(&desc.display_points, &desc.source_points);
        let (inverse, status) = forward.invert();

        let fault = if status == InvertStatus::Degenerate {
            tracing::warn!(
                "Shard {}: {}",
                desc.index,
                ShardFault::DegenerateHomography
            );
            Some(ShardFault::DegenerateHomography)
        } else {
            None
        };

        let transformed_mask_points = desc
            .mask_points
            .iter()
            .map(|p| inverse.transform_point(*p))
            .collect();

        Self {
            index: desc.index,
            source_points: desc.source_points.clone(),
            display_points: desc.display_points.clone(),
            mask_points: desc.mask_points.clone(),
            forward,
            inverse,
            transformed_mask_points,
            ready: true,
            fault,
        }
    }
}

/// Ordered collection of shards. Position in the set is the slot used for
/// visibility flags and stencil assignment; it is distinct from the stable
/// `index` carried by each shard.
#[derive(Debug, Clone, Default)]
pub struct ShardSet {
    shards: Vec<Shard>,
}

impl ShardSet {
    pub fn from_descriptors(descriptors: &[ShardDescriptor]) -> Self {
        let shards: Vec<Shard> = descriptors.iter().map(Shard::build).collect();
        let ready = shards.iter().filter(|s| s.ready).count();
        tracing::info!("Built {} shards, {} ready", shards.len(), ready);

        Self { shards }
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn ready_count(&self) -> usize {
        self.shards.iter().filter(|s| s.ready).count()
    }

    pub fn get(&self, slot: usize) -> Option<&Shard> {
        self.shards.get(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shard> {
        self.shards.iter()
    }
}

/// Shared registry handing out immutable shard-set snapshots.
///
/// `replace` swaps the whole set at once; a frame that grabbed `current`
/// beforehand keeps rendering the old set unchanged.
pub struct Registry {
    inner: RwLock<Arc<ShardSet>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(ShardSet::default())),
        }
    }

    /// Rebuild the registry from fresh descriptor data, all or nothing.
    pub fn replace(&self, descriptors: &[ShardDescriptor]) -> Arc<ShardSet> {
        let set = Arc::new(ShardSet::from_descriptors(descriptors));
        *self.inner.write() = set.clone();
        set
    }

    pub fn current(&self) -> Arc<ShardSet> {
        self.inner.read().clone()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
