//! Reserved nonvolatile region layout checking.
//!
//! Fixed-size reserved regions (settings areas, tool tables and the like)
//! are registered at startup. An overlap between two regions would corrupt
//! stored data silently, so it is treated as fatal: startup halts instead
//! of proceeding with a corrupt layout.

use thiserror::Error;

/// Overlapping reserved regions; fatal at initialization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("nonvolatile regions overlap: '{first}' [{first_addr:#06x}..{first_end:#06x}) and '{second}' [{second_addr:#06x}..{second_end:#06x})")]
pub struct LayoutError {
    /// Name of the first region of the overlapping pair.
    pub first: &'static str,
    /// Start address of the first region.
    pub first_addr: u32,
    /// End address (exclusive) of the first region.
    pub first_end: u32,
    /// Name of the second region of the overlapping pair.
    pub second: &'static str,
    /// Start address of the second region.
    pub second_addr: u32,
    /// End address (exclusive) of the second region.
    pub second_end: u32,
}

/// A fixed-size reserved region of nonvolatile storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Human-readable region name, used in diagnostics.
    pub name: &'static str,
    /// Start address.
    pub address: u32,
    /// Size in bytes.
    pub size: u32,
}

impl Region {
    /// End address, exclusive.
    pub const fn end(&self) -> u32 {
        self.address + self.size
    }

    /// Whether two regions share any byte.
    pub const fn overlaps(&self, other: &Region) -> bool {
        self.address < other.end() && other.address < self.end()
    }
}

/// Verify that no two regions overlap.
///
/// Returns the first offending pair. Empty regions never overlap anything.
pub fn verify_disjoint(regions: &[Region]) -> Result<(), LayoutError> {
    for (i, a) in regions.iter().enumerate() {
        for b in &regions[i + 1..] {
            if a.overlaps(b) {
                return Err(LayoutError {
                    first: a.name,
                    first_addr: a.address,
                    first_end: a.end(),
                    second: b.name,
                    second_addr: b.address,
                    second_end: b.end(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn region(name: &'static str, address: u32, size: u32) -> Region {
        Region {
            name,
            address,
            size,
        }
    }

    #[test]
    fn disjoint_regions_pass() {
        let regions = [
            region("settings", 0, 512),
            region("tool_table", 512, 256),
            region("driver", 1024, 128),
        ];
        assert!(verify_disjoint(&regions).is_ok());
    }

    #[test]
    fn touching_regions_do_not_overlap() {
        let regions = [region("a", 0, 100), region("b", 100, 100)];
        assert!(verify_disjoint(&regions).is_ok());
    }

    #[test]
    fn overlap_is_fatal_and_names_the_pair() {
        let regions = [
            region("settings", 0, 512),
            region("driver", 500, 128),
        ];
        let err = verify_disjoint(&regions).unwrap_err();
        assert_eq!(err.first, "settings");
        assert_eq!(err.second, "driver");
    }

    #[test]
    fn empty_region_never_overlaps() {
        let regions = [region("a", 0, 512), region("marker", 100, 0)];
        assert!(verify_disjoint(&regions).is_ok());
    }
}
