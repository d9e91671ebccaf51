//! Shader argument shapes and the root-signature cache key (§3, §4.10).
//!
//! A root signature is derived entirely from the *shape* of the arguments a
//! pipeline binds, not from which resources are bound at a given moment —
//! so two otherwise-unrelated PSOs whose arguments declare the same shape
//! share one native root signature, found through
//! [`crate::cache_map::CacheMap`] keyed by [`RootSignatureKey::hash`].

use std::hash::{Hash, Hasher};

use fnv::FnvHasher;

use crate::state::RootSignatureKind;

/// One shader argument's shape: how many of each descriptor kind it binds,
/// and whether it carries an inline CBV.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ShaderArgShape {
    pub num_srvs: u8,
    pub num_uavs: u8,
    pub num_samplers: u8,
    pub has_cbv: bool,
}

impl ShaderArgShape {
    pub const EMPTY: Self = Self { num_srvs: 0, num_uavs: 0, num_samplers: 0, has_cbv: false };
}

/// Cache key for [`crate::cache_map::CacheMap`]: the shape array plus a
/// "has root constants" flag plus the signature kind.
#[derive(Clone, Debug)]
pub struct RootSignatureKey {
    pub arg_shapes: Vec<ShaderArgShape>,
    pub has_root_constants: bool,
    pub kind: RootSignatureKind,
}

impl RootSignatureKey {
    /// Domain-separated FNV hash; `cache_map` treats a collision as
    /// equality, so this folds in the arg count and kind discriminant
    /// explicitly rather than relying on `Hash` derive alone to avoid
    /// accidental short hashes for small shape arrays.
    pub fn hash(&self) -> u64 {
        let mut hasher = FnvHasher::default();
        self.arg_shapes.len().hash(&mut hasher);
        for shape in &self.arg_shapes {
            shape.hash(&mut hasher);
        }
        self.has_root_constants.hash(&mut hasher);
        kind_discriminant(self.kind).hash(&mut hasher);
        hasher.finish()
    }
}

fn kind_discriminant(kind: RootSignatureKind) -> u8 {
    match kind {
        RootSignatureKind::Graphics => 0,
        RootSignatureKind::Compute => 1,
        RootSignatureKind::RaytracingLocal => 2,
        RootSignatureKind::RaytracingGlobal => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_shapes_hash_identically() {
        let a = RootSignatureKey {
            arg_shapes: vec![ShaderArgShape { num_srvs: 2, num_uavs: 0, num_samplers: 1, has_cbv: true }],
            has_root_constants: false,
            kind: RootSignatureKind::Graphics,
        };
        let b = a.clone();
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn different_kind_changes_hash() {
        let shapes = vec![ShaderArgShape::EMPTY];
        let a = RootSignatureKey { arg_shapes: shapes.clone(), has_root_constants: false, kind: RootSignatureKind::Graphics };
        let b = RootSignatureKey { arg_shapes: shapes, has_root_constants: false, kind: RootSignatureKind::Compute };
        assert_ne!(a.hash(), b.hash());
    }
}
