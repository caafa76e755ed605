//! Pure filter/sort stage applied on top of accumulated pager output.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::{CatalogRecord, FilterState, SortOrder};

/// A record passes only if every selected type is among its types.
pub fn matches_types(rec: &CatalogRecord, selected: &BTreeSet<String>) -> bool {
    selected.iter().all(|t| rec.has_type(t))
}

/// Comparator for a sort order. Ties (equal names ignoring case) fall back to id.
pub fn compare(order: SortOrder, a: &CatalogRecord, b: &CatalogRecord) -> Ordering {
    match order {
        SortOrder::IdAsc => a.id.cmp(&b.id),
        SortOrder::IdDesc => b.id.cmp(&a.id),
        SortOrder::NameAsc => cmp_names(a, b).then(a.id.cmp(&b.id)),
        SortOrder::NameDesc => cmp_names(b, a).then(a.id.cmp(&b.id)),
    }
}

fn cmp_names(a: &CatalogRecord, b: &CatalogRecord) -> Ordering {
    let la = a.name.chars().flat_map(char::to_lowercase);
    let lb = b.name.chars().flat_map(char::to_lowercase);
    la.cmp(lb)
}

/// Local text match: name or decimal id contains the (lowercased) query.
pub fn matches_text(rec: &CatalogRecord, query: &str) -> bool {
    query.is_empty() || rec.name.contains(query) || rec.id.to_string().contains(query)
}

/// Full caller filter: search text, type intersection, then order.
pub fn apply_filter<'a, I>(records: I, filter: &FilterState) -> Vec<CatalogRecord>
where
    I: IntoIterator<Item = &'a CatalogRecord>,
{
    let query = filter.search.trim().to_lowercase();
    let mut out: Vec<CatalogRecord> = records
        .into_iter()
        .filter(|r| matches_text(r, &query) && matches_types(r, &filter.types))
        .cloned()
        .collect();
    sort_records(&mut out, filter.sort);
    out
}

pub fn sort_records(records: &mut [CatalogRecord], order: SortOrder) {
    records.sort_by(|a, b| compare(order, a, b));
}

/// Filter by type intersection, then order.
pub fn apply_view<'a, I>(records: I, selected: &BTreeSet<String>, order: SortOrder) -> Vec<CatalogRecord>
where
    I: IntoIterator<Item = &'a CatalogRecord>,
{
    let mut out: Vec<CatalogRecord> = records
        .into_iter()
        .filter(|r| matches_types(r, selected))
        .cloned()
        .collect();
    sort_records(&mut out, order);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: u32, name: &str, types: &[&str]) -> CatalogRecord {
        CatalogRecord {
            id,
            name: name.to_string(),
            types: types.iter().map(|t| t.to_string()).collect(),
            weight: 0,
            height: 0,
        }
    }

    fn names(v: &[CatalogRecord]) -> Vec<&str> {
        v.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn az_orders_names() {
        let recs = vec![rec(1, "bulbasaur", &[]), rec(4, "charmander", &[]), rec(63, "abra", &[])];
        let out = apply_view(&recs, &BTreeSet::new(), SortOrder::NameAsc);
        assert_eq!(names(&out), ["abra", "bulbasaur", "charmander"]);
        let out = apply_view(&recs, &BTreeSet::new(), SortOrder::NameDesc);
        assert_eq!(names(&out), ["charmander", "bulbasaur", "abra"]);
    }

    #[test]
    fn id_desc_orders_ids() {
        let recs = vec![rec(1, "a", &[]), rec(4, "b", &[]), rec(2, "c", &[])];
        let out = apply_view(&recs, &BTreeSet::new(), SortOrder::IdDesc);
        assert_eq!(out.iter().map(|r| r.id).collect::<Vec<_>>(), [4, 2, 1]);
    }

    #[test]
    fn name_compare_ignores_case() {
        let recs = vec![rec(2, "Zubat", &[]), rec(1, "abra", &[])];
        let out = apply_view(&recs, &BTreeSet::new(), SortOrder::NameAsc);
        assert_eq!(names(&out), ["abra", "Zubat"]);
    }

    #[test]
    fn type_filter_requires_every_selected_type() {
        let recs = vec![
            rec(6, "charizard", &["fire", "flying"]),
            rec(4, "charmander", &["fire"]),
            rec(16, "pidgey", &["normal", "flying"]),
            rec(146, "moltres", &["fire", "flying"]),
        ];
        let selected: BTreeSet<String> = ["flying", "fire"].iter().map(|s| s.to_string()).collect();
        let out = apply_view(&recs, &selected, SortOrder::IdAsc);
        assert_eq!(names(&out), ["charizard", "moltres"]);
        assert_eq!(apply_view(&recs, &BTreeSet::new(), SortOrder::IdAsc).len(), 4);
    }

    #[test]
    fn filter_applies_text_types_and_order() {
        let recs = vec![
            rec(6, "charizard", &["fire", "flying"]),
            rec(5, "charmeleon", &["fire"]),
            rec(4, "charmander", &["fire"]),
            rec(25, "pikachu", &["electric"]),
        ];
        let mut f = FilterState { search: " CHAR ".into(), sort: SortOrder::NameAsc, ..Default::default() };
        assert_eq!(names(&apply_filter(&recs, &f)), ["charizard", "charmander", "charmeleon"]);
        f.types.insert("flying".into());
        assert_eq!(names(&apply_filter(&recs, &f)), ["charizard"]);
        let by_id = FilterState { search: "25".into(), ..Default::default() };
        assert_eq!(names(&apply_filter(&recs, &by_id)), ["pikachu"]);
    }
}
