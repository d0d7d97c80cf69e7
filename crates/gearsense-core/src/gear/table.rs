//! Fixed-capacity chainring/sprocket tooth table

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of chainrings supported
pub const MAX_CHAINRINGS: usize = 3;

/// Maximum number of rear sprockets supported
pub const MAX_SPROCKETS: usize = 12;

/// Default 50/34 compact chainrings
pub const DEFAULT_CHAINRINGS: [u8; 2] = [50, 34];

/// Default 9-speed 11-28 cassette
pub const DEFAULT_SPROCKETS: [u8; 9] = [11, 12, 13, 15, 17, 19, 21, 24, 28];

/// Reasons a gear table is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GearTableError {
    #[error("Too many chainrings: {count} (max {max})")]
    TooManyChainrings { count: usize, max: usize },

    #[error("Too many sprockets: {count} (max {max})")]
    TooManySprockets { count: usize, max: usize },

    #[error("Gear table needs at least one chainring and one sprocket")]
    Empty,

    #[error("Tooth count must be non-zero")]
    ZeroTeeth,
}

/// Tooth counts for the drivetrain, stored in fixed arrays
///
/// Indices exposed to collaborators are 1-based; internal indices are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GearTable {
    chainrings: [u8; MAX_CHAINRINGS],
    chainring_count: usize,
    sprockets: [u8; MAX_SPROCKETS],
    sprocket_count: usize,
}

impl GearTable {
    /// Build a table, checking capacity and tooth counts
    ///
    /// # Example
    /// ```
    /// use gearsense_core::gear::table::GearTable;
    ///
    /// let table = GearTable::new(&[50, 34], &[11, 28]).unwrap();
    /// assert_eq!(table.chainrings(), &[50, 34]);
    /// assert!(GearTable::new(&[53, 39, 30, 22], &[11]).is_err());
    /// ```
    pub fn new(chainrings: &[u8], sprockets: &[u8]) -> Result<Self, GearTableError> {
        if chainrings.len() > MAX_CHAINRINGS {
            return Err(GearTableError::TooManyChainrings {
                count: chainrings.len(),
                max: MAX_CHAINRINGS,
            });
        }
        if sprockets.len() > MAX_SPROCKETS {
            return Err(GearTableError::TooManySprockets {
                count: sprockets.len(),
                max: MAX_SPROCKETS,
            });
        }
        if chainrings.is_empty() || sprockets.is_empty() {
            return Err(GearTableError::Empty);
        }
        if chainrings.iter().chain(sprockets).any(|&t| t == 0) {
            return Err(GearTableError::ZeroTeeth);
        }

        let mut table = Self {
            chainrings: [0; MAX_CHAINRINGS],
            chainring_count: chainrings.len(),
            sprockets: [0; MAX_SPROCKETS],
            sprocket_count: sprockets.len(),
        };
        table.chainrings[..chainrings.len()].copy_from_slice(chainrings);
        table.sprockets[..sprockets.len()].copy_from_slice(sprockets);
        Ok(table)
    }

    /// 2x9 compact road setup used until a table is configured
    pub fn compact_road() -> Self {
        let mut table = Self {
            chainrings: [0; MAX_CHAINRINGS],
            chainring_count: DEFAULT_CHAINRINGS.len(),
            sprockets: [0; MAX_SPROCKETS],
            sprocket_count: DEFAULT_SPROCKETS.len(),
        };
        table.chainrings[..DEFAULT_CHAINRINGS.len()].copy_from_slice(&DEFAULT_CHAINRINGS);
        table.sprockets[..DEFAULT_SPROCKETS.len()].copy_from_slice(&DEFAULT_SPROCKETS);
        table
    }

    /// Configured chainring tooth counts
    pub fn chainrings(&self) -> &[u8] {
        &self.chainrings[..self.chainring_count]
    }

    /// Configured sprocket tooth counts
    pub fn sprockets(&self) -> &[u8] {
        &self.sprockets[..self.sprocket_count]
    }

    /// Teeth of the chainring at a 1-based index
    pub fn chainring_teeth(&self, index: u8) -> Option<u8> {
        (index as usize)
            .checked_sub(1)
            .and_then(|i| self.chainrings().get(i).copied())
    }

    /// Teeth of the sprocket at a 1-based index
    pub fn sprocket_teeth(&self, index: u8) -> Option<u8> {
        (index as usize)
            .checked_sub(1)
            .and_then(|i| self.sprockets().get(i).copied())
    }

    /// Number of gear combinations
    pub fn combinations(&self) -> usize {
        self.chainring_count * self.sprocket_count
    }
}

impl Default for GearTable {
    fn default() -> Self {
        Self::compact_road()
    }
}

/// Serializable form of a gear table, used by configuration files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GearSpec {
    /// Chainring tooth counts, largest first by convention
    pub chainrings: Vec<u8>,
    /// Sprocket tooth counts, smallest first by convention
    pub sprockets: Vec<u8>,
}

impl Default for GearSpec {
    fn default() -> Self {
        Self {
            chainrings: DEFAULT_CHAINRINGS.to_vec(),
            sprockets: DEFAULT_SPROCKETS.to_vec(),
        }
    }
}

impl TryFrom<&GearSpec> for GearTable {
    type Error = GearTableError;

    fn try_from(spec: &GearSpec) -> Result<Self, Self::Error> {
        GearTable::new(&spec.chainrings, &spec.sprockets)
    }
}
