//! Dex core types: catalog records, generation windows, sort orders.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

mod error;
pub mod normalize;
pub mod view;

pub use error::{CatalogError, CatalogResult, StorageError};

/// Species id as served by the remote catalog (1-based, stable).
pub type RecordId = u32;

/// Type identifiers of a record, in slot order. Almost always one or two.
pub type TypeList = SmallVec<[String; 2]>;

/// Normalized catalog entry. Immutable once produced by the normalizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogRecord {
    pub id: RecordId,
    /// Lowercase, unique across the catalog.
    pub name: String,
    pub types: TypeList,
    /// Hectograms, as served.
    pub weight: u32,
    /// Decimetres, as served.
    pub height: u32,
}

impl CatalogRecord {
    pub fn has_type(&self, ty: &str) -> bool {
        self.types.iter().any(|t| t == ty)
    }
}

/// Lightweight identity pair used for local matching only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexEntry {
    pub name: String,
    pub id: RecordId,
}

/// Half-open slice `[offset, offset + limit)` of the catalog's list endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationWindow {
    pub offset: u32,
    pub limit: u32,
}

impl GenerationWindow {
    pub fn end(&self) -> u32 {
        self.offset + self.limit
    }

    /// Whether a 1-based record id falls inside the window.
    pub fn contains_id(&self, id: RecordId) -> bool {
        id > self.offset && id <= self.end()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Generation {
    #[default]
    I,
    II,
    III,
    IV,
    V,
    VI,
    VII,
    VIII,
    IX,
}

const WINDOWS: [GenerationWindow; 9] = [
    GenerationWindow { offset: 0, limit: 151 },
    GenerationWindow { offset: 151, limit: 100 },
    GenerationWindow { offset: 251, limit: 135 },
    GenerationWindow { offset: 386, limit: 107 },
    GenerationWindow { offset: 493, limit: 156 },
    GenerationWindow { offset: 649, limit: 72 },
    GenerationWindow { offset: 721, limit: 88 },
    GenerationWindow { offset: 809, limit: 96 },
    GenerationWindow { offset: 905, limit: 120 },
];

/// Sum of all generation limits.
pub const CATALOG_SIZE: u32 = 1025;

impl Generation {
    pub const ALL: [Generation; 9] = [
        Generation::I,
        Generation::II,
        Generation::III,
        Generation::IV,
        Generation::V,
        Generation::VI,
        Generation::VII,
        Generation::VIII,
        Generation::IX,
    ];

    /// 1-based ordinal.
    pub fn number(self) -> u8 {
        self as u8 + 1
    }

    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.get(usize::from(n).checked_sub(1)?).copied()
    }

    pub fn window(self) -> GenerationWindow {
        WINDOWS[self as usize]
    }

    fn roman(self) -> &'static str {
        ["i", "ii", "iii", "iv", "v", "vi", "vii", "viii", "ix"][self as usize]
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.number())
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("unknown {what}: {input}")]
pub struct ParseEnumError {
    what: &'static str,
    input: String,
}

impl FromStr for Generation {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().to_ascii_lowercase();
        let key = raw
            .strip_prefix("gen-")
            .or_else(|| raw.strip_prefix("gen"))
            .unwrap_or(&raw);
        if let Ok(n) = key.parse::<u8>() {
            if let Some(g) = Self::from_number(n) {
                return Ok(g);
            }
        }
        Self::ALL
            .into_iter()
            .find(|g| g.roman() == key)
            .ok_or_else(|| ParseEnumError { what: "generation", input: s.to_string() })
    }
}

/// Display ordering of a list. `IdDesc` is also the only order that pages
/// from the tail of a generation window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    #[default]
    IdAsc,
    IdDesc,
    NameAsc,
    NameDesc,
}

impl SortOrder {
    pub fn fetches_from_tail(self) -> bool {
        matches!(self, SortOrder::IdDesc)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::IdAsc => "ID_ASC",
            SortOrder::IdDesc => "ID_DESC",
            SortOrder::NameAsc => "AZ",
            SortOrder::NameDesc => "ZA",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "id_asc" | "asc" => Ok(SortOrder::IdAsc),
            "id_desc" | "desc" => Ok(SortOrder::IdDesc),
            "az" | "name_asc" => Ok(SortOrder::NameAsc),
            "za" | "name_desc" => Ok(SortOrder::NameDesc),
            _ => Err(ParseEnumError { what: "sort order", input: s.to_string() }),
        }
    }
}

/// Caller-owned list parameters, supplied on every render/tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub search: String,
    pub types: BTreeSet<String>,
    pub generation: Generation,
    pub sort: SortOrder,
}

pub mod prelude {
    pub use super::{
        CatalogError, CatalogRecord, CatalogResult, FilterState, Generation, GenerationWindow,
        IndexEntry, RecordId, SortOrder, StorageError, TypeList,
    };
}
