//! Tunables for building and editing a [`DynamicMesh`](crate::dynamic::DynamicMesh).

use crate::mesh_error::MeshError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicConfig {
    /// Slot capacity of each patch as a multiple of its initial element count.
    pub capacity_factor: f32,
    /// Target number of owned faces per patch for the built-in patcher.
    pub patch_size: usize,
    /// Workers per block; stride loops shorter than this run inline.
    pub block_threads: usize,
    /// How many times a patch may fail with a retryable error other than
    /// contention before the edit is abandoned.
    pub max_attempts: u32,
    /// Target occupancy of the LP hash tables.
    pub lp_load_factor: f32,
    /// Upper bound on owner-chain length.
    pub max_owner_hops: u32,
}

impl Default for DynamicConfig {
    fn default() -> Self {
        Self {
            capacity_factor: 1.8,
            patch_size: 512,
            block_threads: 256,
            max_attempts: 8,
            lp_load_factor: 0.5,
            max_owner_hops: 64,
        }
    }
}

impl DynamicConfig {
    pub fn validate(&self) -> Result<(), MeshError> {
        if !(self.capacity_factor >= 1.0) {
            return Err(MeshError::InvalidConfig(format!(
                "capacity_factor must be >= 1.0, got {}",
                self.capacity_factor
            )));
        }
        if self.patch_size == 0 {
            return Err(MeshError::InvalidConfig("patch_size must be positive".into()));
        }
        if self.block_threads == 0 {
            return Err(MeshError::InvalidConfig(
                "block_threads must be positive".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(MeshError::InvalidConfig(
                "max_attempts must be positive".into(),
            ));
        }
        if !(self.lp_load_factor > 0.0 && self.lp_load_factor < 1.0) {
            return Err(MeshError::InvalidConfig(format!(
                "lp_load_factor must lie in (0, 1), got {}",
                self.lp_load_factor
            )));
        }
        if self.max_owner_hops == 0 {
            return Err(MeshError::InvalidConfig(
                "max_owner_hops must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        DynamicConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_small_capacity_factor() {
        let cfg = DynamicConfig {
            capacity_factor: 0.5,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(MeshError::InvalidConfig(_))));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: DynamicConfig = serde_json::from_str(r#"{ "patch_size": 64 }"#).unwrap();
        assert_eq!(cfg.patch_size, 64);
        assert_eq!(cfg.max_attempts, DynamicConfig::default().max_attempts);
        let back: DynamicConfig =
            serde_json::from_str(&serde_json::to_string(&cfg).unwrap()).unwrap();
        assert_eq!(back, cfg);
    }
}
