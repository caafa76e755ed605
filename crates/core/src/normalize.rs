//! Raw payload shapes and their conversion into [`CatalogRecord`] / [`IndexEntry`].
//!
//! Only the fields the core renders are modelled; serde ignores the rest of
//! the (large) detail payload.

use serde::{Deserialize, Serialize};

use crate::{CatalogError, CatalogRecord, CatalogResult, IndexEntry, RecordId};

/// `{ name, url }` resource reference as returned by list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamedRef {
    pub name: String,
    pub url: String,
}

/// Envelope of the paginated list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPage {
    #[serde(default)]
    pub count: Option<u32>,
    pub results: Vec<NamedRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawTypeSlot {
    pub slot: u8,
    #[serde(rename = "type")]
    pub ty: NamedRef,
}

/// Subset of the detail payload the normalizer reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawDetail {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub types: Vec<RawTypeSlot>,
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub height: u32,
}

/// Parse the trailing numeric segment of a resource reference
/// (`.../pokemon/25/` -> 25).
pub fn id_from_url(url: &str) -> CatalogResult<RecordId> {
    let seg = url
        .rsplit('/')
        .find(|s| !s.is_empty())
        .ok_or_else(|| CatalogError::malformed(format!("reference has no path segment: {url:?}")))?;
    match seg.parse::<RecordId>() {
        Ok(0) | Err(_) => Err(CatalogError::malformed(format!("reference has no numeric id: {url:?}"))),
        Ok(id) => Ok(id),
    }
}

pub fn index_entry(r: &NamedRef) -> CatalogResult<IndexEntry> {
    Ok(IndexEntry { name: r.name.to_lowercase(), id: id_from_url(&r.url)? })
}

pub fn normalize_detail(raw: RawDetail) -> CatalogResult<CatalogRecord> {
    if raw.id == 0 {
        return Err(CatalogError::malformed(format!("detail for {:?} has id 0", raw.name)));
    }
    let mut slots = raw.types;
    slots.sort_by_key(|s| s.slot);
    Ok(CatalogRecord {
        id: raw.id,
        name: raw.name.to_lowercase(),
        types: slots.into_iter().map(|s| s.ty.name).collect(),
        weight: raw.weight,
        height: raw.height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_from_trailing_segment() {
        assert_eq!(id_from_url("https://pokeapi.co/api/v2/pokemon/25/").unwrap(), 25);
        assert_eq!(id_from_url("https://pokeapi.co/api/v2/pokemon/1025").unwrap(), 1025);
        assert_eq!(id_from_url("/pokemon//7//").unwrap(), 7);
    }

    #[test]
    fn id_from_url_rejects_non_numeric() {
        for bad in ["https://pokeapi.co/api/v2/pokemon/pikachu/", "", "///", "/pokemon/0/", "/pokemon/-3/"] {
            let err = id_from_url(bad).unwrap_err();
            assert!(matches!(err, CatalogError::MalformedResponse(_)), "{bad:?} -> {err:?}");
        }
    }

    #[test]
    fn detail_types_follow_slot_order() {
        let raw: RawDetail = serde_json::from_value(serde_json::json!({
            "id": 6,
            "name": "Charizard",
            "weight": 905,
            "height": 17,
            "base_experience": 267,
            "types": [
                { "slot": 2, "type": { "name": "flying", "url": "https://pokeapi.co/api/v2/type/3/" } },
                { "slot": 1, "type": { "name": "fire", "url": "https://pokeapi.co/api/v2/type/10/" } }
            ]
        }))
        .unwrap();
        let rec = normalize_detail(raw).unwrap();
        assert_eq!(rec.id, 6);
        assert_eq!(rec.name, "charizard");
        assert_eq!(rec.types.as_slice(), ["fire", "flying"]);
        assert_eq!((rec.weight, rec.height), (905, 17));
    }

    #[test]
    fn index_entry_from_ref() {
        let e = index_entry(&NamedRef { name: "pikachu".into(), url: "https://pokeapi.co/api/v2/pokemon/25/".into() }).unwrap();
        assert_eq!(e, IndexEntry { name: "pikachu".into(), id: 25 });
    }
}
