#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use dex_api::{ApiConfig, BrowseMode, Browser, CatalogApi, DexError, GenerationParams, InProcApi};
use dex_core::{FilterState, Generation, SortOrder};
use dex_persist::ResponseCache;
use dex_remote::MockCatalog;

fn api(mock: &Arc<MockCatalog>) -> Arc<InProcApi> {
    Arc::new(InProcApi::new(mock.clone(), Arc::new(ResponseCache::in_memory()), ApiConfig::default()))
}

#[tokio::test]
async fn load_generation_loads_first_slice_then_more() {
    let mock = Arc::new(MockCatalog::synthetic(dex_core::CATALOG_SIZE));
    let api = api(&mock);
    let params = GenerationParams { generation: Generation::V, sort: SortOrder::IdDesc, types: BTreeSet::new() };

    let first = api.load_generation(params.clone()).await.unwrap();
    assert_eq!(first.records.len(), 20);
    assert_eq!(first.records[0].id, Generation::V.window().end());
    assert!(first.has_more);
    assert!(!first.loading);

    // same session: no reset, nothing refetched
    let again = api.load_generation(params.clone()).await.unwrap();
    assert_eq!(again.loaded_count, 20);
    assert_eq!(mock.calls(&mock.page_calls), 1);

    let all = api.load_all(&params.types).await.unwrap();
    assert_eq!(all.records.len(), 156);
    assert!(!all.has_more);
}

#[tokio::test]
async fn type_filter_applies_to_pager_output() {
    let mock = Arc::new(MockCatalog::synthetic(dex_core::CATALOG_SIZE));
    let api = api(&mock);
    let types: BTreeSet<String> = ["fire".to_string()].into_iter().collect();
    let params = GenerationParams { generation: Generation::I, sort: SortOrder::NameAsc, types: types.clone() };
    api.load_generation(params).await.unwrap();
    let view = api.load_all(&types).await.unwrap();
    assert!(!view.records.is_empty());
    assert!(view.records.iter().all(|r| r.has_type("fire")));
    assert!(view.records.windows(2).all(|w| w[0].name.to_lowercase() <= w[1].name.to_lowercase()));
}

#[tokio::test]
async fn detail_and_not_found() {
    let mock = Arc::new(MockCatalog::synthetic(30));
    let api = api(&mock);
    assert_eq!(api.detail("Species7").await.unwrap().id, 7);
    assert_eq!(api.detail("7").await.unwrap().name, "species7");
    assert!(matches!(api.detail("missingno").await, Err(DexError::NotFound(_))));
    assert_eq!(api.cache_len(), 1);
    api.clear_cache();
    assert_eq!(api.cache_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn search_mode_overrides_pagination() {
    let mock = Arc::new(MockCatalog::synthetic(dex_core::CATALOG_SIZE));
    let api = api(&mock);
    let mut browser = Browser::new(api.clone());

    api.load_generation(GenerationParams::default()).await.unwrap();
    assert_eq!(browser.mode(), BrowseMode::Paged);
    assert_eq!(browser.view().records.len(), 20);

    browser.set_filter(FilterState { search: " 25".into(), ..browser.filter().clone() });
    // not settled yet: still paged
    assert_eq!(browser.mode(), BrowseMode::Paged);

    let view = browser.next_settled().await.unwrap().unwrap();
    assert_eq!(view.mode, BrowseMode::Search);
    assert!(!view.has_more);
    assert_eq!(view.records.first().map(|r| r.id), Some(25));

    // next-page triggers are inert in search mode
    assert!(!browser.request_next_page());
    assert_eq!(api.pager().settle().await.loaded_count, 20);

    // clearing the text returns to the untouched pager list
    browser.set_filter(FilterState { search: String::new(), ..browser.filter().clone() });
    let view = browser.next_settled().await.unwrap().unwrap();
    assert_eq!(view.mode, BrowseMode::Paged);
    assert_eq!(view.records.len(), 20);
    assert!(browser.request_next_page());
    assert_eq!(api.pager().settle().await.loaded_count, 40);
}

#[tokio::test(start_paused = true)]
async fn filter_generation_change_resets_pager() {
    let mock = Arc::new(MockCatalog::synthetic(dex_core::CATALOG_SIZE));
    let api = api(&mock);
    let mut browser = Browser::new(api.clone());
    api.load_generation(GenerationParams::default()).await.unwrap();

    browser.set_filter(FilterState { generation: Generation::VII, ..browser.filter().clone() });
    let snap = api.pager().settle().await;
    assert_eq!(snap.session.generation, Generation::VII);
    assert_eq!(snap.loaded_count, 0);
    assert!(browser.view().records.is_empty());

    assert!(browser.request_next_page());
    api.pager().settle().await;
    let view = browser.view();
    assert_eq!(view.records.len(), 20);
    assert!(view.records.iter().all(|r| Generation::VII.window().contains_id(r.id)));
}

#[tokio::test(start_paused = true)]
async fn refresh_runs_search_for_unprocessed_settled_text() {
    let mock = Arc::new(MockCatalog::synthetic(dex_core::CATALOG_SIZE));
    let api = api(&mock);
    let mut browser = Browser::new(api.clone());

    browser.set_filter(FilterState { search: "species7".into(), ..browser.filter().clone() });
    // let the text settle without consuming it through next_settled
    tokio::time::sleep(api.config().search.debounce * 2).await;
    assert_eq!(browser.settled_search(), "species7");
    let pending = browser.view();
    assert_eq!(pending.mode, BrowseMode::Search);
    assert!(pending.loading);
    assert!(pending.records.is_empty());

    let view = browser.refresh().await.unwrap();
    assert!(!view.loading);
    assert_eq!(view.records.first().map(|r| r.id), Some(7));

    // already current: no second search
    let index_calls = mock.calls(&mock.index_calls);
    let details = mock.calls(&mock.detail_calls);
    browser.refresh().await.unwrap();
    assert_eq!(mock.calls(&mock.index_calls), index_calls);
    assert_eq!(mock.calls(&mock.detail_calls), details);
}
