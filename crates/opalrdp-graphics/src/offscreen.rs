//! Offscreen surface registry, fed by the create/delete surface commands.
//!
//! The aggregate size and entry count are bounded by what was negotiated in
//! the offscreen cache capability; hitting either bound evicts the oldest
//! surface.

use std::collections::HashMap;

use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffscreenSurface {
    pub surface_id: u16,
    pub width: u16,
    pub height: u16,
    pub bpp: u8,
    pub pixels: Vec<u8>,
}

impl OffscreenSurface {
    fn byte_size(&self) -> usize {
        self.pixels.len()
    }
}

#[derive(Debug)]
pub struct OffscreenSurfaceRegistry {
    surfaces: HashMap<u16, OffscreenSurface>,
    /// Creation order, oldest first; used for eviction.
    order: Vec<u16>,
    max_entries: usize,
    max_aggregate_bytes: usize,
    aggregate_bytes: usize,
}

impl OffscreenSurfaceRegistry {
    pub fn new(max_entries: usize, max_aggregate_bytes: usize) -> Self {
        Self {
            surfaces: HashMap::new(),
            order: Vec::new(),
            max_entries,
            max_aggregate_bytes,
            aggregate_bytes: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub fn aggregate_bytes(&self) -> usize {
        self.aggregate_bytes
    }

    /// Registers a surface, replacing any surface with the same id and
    /// evicting the oldest surfaces until the negotiated limits hold.
    pub fn create(&mut self, surface: OffscreenSurface) {
        let surface_id = surface.surface_id;

        if self.surfaces.contains_key(&surface_id) {
            debug!(surface_id, "Offscreen surface recreated");
            self.delete(surface_id);
        }

        self.aggregate_bytes += surface.byte_size();
        self.surfaces.insert(surface_id, surface);
        self.order.push(surface_id);

        while self.surfaces.len() > self.max_entries || self.aggregate_bytes > self.max_aggregate_bytes {
            let Some(oldest) = self.order.first().copied() else {
                break;
            };

            if oldest == surface_id && self.surfaces.len() == 1 {
                // A single surface larger than the negotiated budget; keep it
                // and let the server live with its own choice.
                warn!(surface_id, "Offscreen surface exceeds the negotiated aggregate size");
                break;
            }

            warn!(surface_id = oldest, "Evicting oldest offscreen surface");
            self.delete(oldest);
        }
    }

    pub fn delete(&mut self, surface_id: u16) -> bool {
        match self.surfaces.remove(&surface_id) {
            Some(surface) => {
                self.aggregate_bytes -= surface.byte_size();
                self.order.retain(|id| *id != surface_id);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, surface_id: u16) -> Option<&OffscreenSurface> {
        self.surfaces.get(&surface_id)
    }

    pub fn get_mut(&mut self, surface_id: u16) -> Option<&mut OffscreenSurface> {
        self.surfaces.get_mut(&surface_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(id: u16, bytes: usize) -> OffscreenSurface {
        OffscreenSurface {
            surface_id: id,
            width: 8,
            height: 8,
            bpp: 24,
            pixels: vec![0; bytes],
        }
    }

    #[test]
    fn create_get_delete() {
        let mut registry = OffscreenSurfaceRegistry::new(8, 1024);

        registry.create(surface(3, 64));
        assert_eq!(registry.get(3).unwrap().pixels.len(), 64);

        assert!(registry.delete(3));
        assert!(!registry.delete(3));
        assert!(registry.get(3).is_none());
        assert_eq!(registry.aggregate_bytes(), 0);
    }

    #[test]
    fn entry_limit_evicts_oldest() {
        let mut registry = OffscreenSurfaceRegistry::new(2, 1024);

        registry.create(surface(1, 16));
        registry.create(surface(2, 16));
        registry.create(surface(3, 16));

        assert_eq!(registry.len(), 2);
        assert!(registry.get(1).is_none());
        assert!(registry.get(2).is_some());
        assert!(registry.get(3).is_some());
    }

    #[test]
    fn byte_limit_evicts_oldest() {
        let mut registry = OffscreenSurfaceRegistry::new(8, 100);

        registry.create(surface(1, 60));
        registry.create(surface(2, 60));

        assert_eq!(registry.len(), 1);
        assert!(registry.get(2).is_some());
    }

    #[test]
    fn recreating_a_surface_replaces_it() {
        let mut registry = OffscreenSurfaceRegistry::new(8, 1024);

        registry.create(surface(1, 16));
        registry.create(surface(1, 32));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.aggregate_bytes(), 32);
    }
}
