mod common;

use cachepoint::application::assets::Delivery;
use cachepoint::application::error::CacheError;
use cachepoint::application::pagination::Listing;
use cachepoint::domain::types::{AssetState, RequestedState};
use cachepoint::domain::urls;
use cachepoint::util::clock::Clock;
use time::Duration;

use common::{CDN_BASE, harness, theme_url};

#[tokio::test]
async fn first_sighting_creates_a_pending_entry_with_an_upload_reference() {
    let h = harness();
    let theme = h.theme_point().await;
    let url = theme_url("style.css");

    let resolved = h
        .services
        .assets
        .resolve_many(std::slice::from_ref(&url))
        .await
        .expect("resolve");
    assert_eq!(resolved.get(&url), Some(&Delivery::Upload(h.upload_url(&url))));

    let entry = h
        .services
        .assets
        .find_by_key(&urls::entry_key(&url))
        .await
        .expect("find entry")
        .expect("entry created");
    assert_eq!(entry.cache_point_id, theme);
    assert_eq!(entry.state, AssetState::PendingUpload);
    assert_eq!(entry.local_url, url);
    assert_eq!(entry.cached_url, url);
}

#[tokio::test]
async fn fresh_pending_entries_serve_locally_until_the_window_passes() {
    let h = harness();
    h.theme_point().await;
    let url = theme_url("app.js");
    let urls = vec![url.clone()];

    h.services.assets.resolve_many(&urls).await.expect("create");

    h.clock.advance(Duration::seconds(30));
    let fresh = h.services.assets.resolve_many(&urls).await.expect("fresh");
    assert_eq!(fresh.get(&url), Some(&Delivery::Local(url.clone())));

    h.clock.advance(common::freshness_window());
    let stale = h.services.assets.resolve_many(&urls).await.expect("stale");
    assert_eq!(stale.get(&url), Some(&Delivery::Upload(h.upload_url(&url))));
}

#[tokio::test]
async fn uploaded_entries_resolve_to_the_remote_copy() {
    let h = harness();
    h.theme_point().await;
    let url = theme_url("logo.png");
    let urls = vec![url.clone()];
    h.services.assets.resolve_many(&urls).await.expect("create");

    let entry = h
        .services
        .assets
        .find_by_key(&urls::entry_key(&url))
        .await
        .expect("find")
        .expect("exists");
    let remote = format!("{CDN_BASE}/themes/demo/logo.png");
    let recorded = h
        .services
        .assets
        .record_upload(entry.id, &remote)
        .await
        .expect("record upload")
        .expect("entry updated");
    assert_eq!(recorded.state, AssetState::Active);

    let resolved = h.services.assets.resolve_many(&urls).await.expect("resolve");
    assert_eq!(resolved.get(&url), Some(&Delivery::Remote(remote)));
}

#[tokio::test]
async fn entry_creation_is_capped_per_batch() {
    let h = harness();
    let theme = h.theme_point().await;
    let urls: Vec<String> = (0..7).map(|i| theme_url(&format!("img/{i}.png"))).collect();

    let resolved = h.services.assets.resolve_many(&urls).await.expect("resolve");

    let uploads = resolved
        .values()
        .filter(|delivery| matches!(delivery, Delivery::Upload(_)))
        .count();
    let local = resolved
        .values()
        .filter(|delivery| matches!(delivery, Delivery::Local(_)))
        .count();
    assert_eq!(uploads, 5);
    assert_eq!(local, 2);

    let theme_page = h
        .services
        .assets
        .list(theme, None, 1)
        .await
        .expect("list entries");
    assert_eq!(theme_page.total, 5);
}

#[tokio::test]
async fn concurrent_first_sightings_create_one_entry() {
    let h = harness();
    let theme = h.theme_point().await;
    let urls = vec![theme_url("race.css")];

    let (left, right) = tokio::join!(
        h.services.assets.prepare_batch(&urls, 5),
        h.services.assets.prepare_batch(&urls, 5),
    );
    let left = left.expect("left batch");
    let right = right.expect("right batch");

    assert_eq!(left.get(&urls[0]), right.get(&urls[0]));
    let page = h.services.assets.list(theme, None, 1).await.expect("list");
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn uncovered_urls_are_left_out_of_resolution() {
    let h = harness();
    h.theme_point().await;
    let plugin = "/wp-content/plugins/x/y.js".to_string();

    let resolved = h
        .services
        .assets
        .resolve_many(std::slice::from_ref(&plugin))
        .await
        .expect("resolve");
    assert!(resolved.is_empty());
}

#[tokio::test]
async fn listing_pages_and_searches_entries() {
    let h = harness();
    let theme = h.theme_point().await;

    let empty = h.services.assets.list(theme, None, 1).await.expect("empty");
    assert_eq!(empty.listing, Listing::NothingCached);

    let urls = vec![
        theme_url("a.css"),
        theme_url("b.css"),
        theme_url("c.js"),
    ];
    h.services.assets.resolve_many(&urls).await.expect("create");

    let first = h.services.assets.list(theme, None, 1).await.expect("page 1");
    assert_eq!(first.total, 3);
    assert_eq!(first.total_pages, 2);
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.listing, Listing::Results);

    let second = h.services.assets.list(theme, None, 2).await.expect("page 2");
    assert_eq!(second.items.len(), 1);
    assert!(first.items[1].id < second.items[0].id);

    let beyond = h.services.assets.list(theme, None, 9).await.expect("page 9");
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total, 3);

    let css = h
        .services
        .assets
        .list(theme, Some(" .css "), 1)
        .await
        .expect("search");
    assert_eq!(css.total, 2);

    let none = h
        .services
        .assets
        .list(theme, Some("missing"), 1)
        .await
        .expect("unmatched search");
    assert_eq!(none.listing, Listing::NoMatches);

    let err = h
        .services
        .assets
        .list(999, None, 1)
        .await
        .expect_err("unknown cache point");
    assert!(matches!(err, CacheError::NotFound { .. }));
}

#[tokio::test]
async fn bulk_state_changes_report_only_changed_entries() {
    let h = harness();
    h.theme_point().await;
    let urls = vec![theme_url("one.css"), theme_url("two.css")];
    h.services.assets.resolve_many(&urls).await.expect("create");

    let one = h
        .services
        .assets
        .find_by_key(&urls::entry_key(&urls[0]))
        .await
        .expect("find one")
        .expect("one exists");
    let two = h
        .services
        .assets
        .find_by_key(&urls::entry_key(&urls[1]))
        .await
        .expect("find two")
        .expect("two exists");
    let remote = format!("{CDN_BASE}/themes/demo/one.css");
    h.services
        .assets
        .record_upload(one.id, &remote)
        .await
        .expect("record upload");

    let changed = h
        .services
        .assets
        .set_state(&[one.id, two.id, one.id, 4242], RequestedState::Disabled)
        .await
        .expect("disable");
    assert_eq!(changed, vec![one.id, two.id]);

    let again = h
        .services
        .assets
        .set_state(&[one.id], RequestedState::Disabled)
        .await
        .expect("disable again");
    assert!(again.is_empty());

    let enabled = h
        .services
        .assets
        .set_state(&[one.id, two.id], RequestedState::Active)
        .await
        .expect("enable");
    assert_eq!(enabled, vec![one.id, two.id]);

    let one = h
        .services
        .assets
        .find_by_key(&one.entry_key)
        .await
        .expect("reload one")
        .expect("one exists");
    let two = h
        .services
        .assets
        .find_by_key(&two.entry_key)
        .await
        .expect("reload two")
        .expect("two exists");
    assert_eq!(one.state, AssetState::Active);
    assert_eq!(two.state, AssetState::PendingUpload);
    assert!(two.is_stale(h.clock.now(), common::freshness_window()));
}

#[tokio::test]
async fn deleting_an_uploaded_entry_removes_the_remote_copy() {
    let h = harness();
    h.theme_point().await;
    let url = theme_url("gone.css");
    h.services
        .assets
        .resolve_many(std::slice::from_ref(&url))
        .await
        .expect("create");
    let entry = h
        .services
        .assets
        .find_by_key(&urls::entry_key(&url))
        .await
        .expect("find")
        .expect("exists");
    let remote = format!("{CDN_BASE}/themes/demo/gone.css");
    h.services
        .assets
        .record_upload(entry.id, &remote)
        .await
        .expect("record upload");

    let changed = h
        .services
        .assets
        .set_state(&[entry.id], RequestedState::Deleted)
        .await
        .expect("delete");
    assert_eq!(changed, vec![entry.id]);
    assert_eq!(h.uploader.removed(), vec![remote]);
    assert!(
        h.services
            .assets
            .find_by_key(&entry.entry_key)
            .await
            .expect("find after delete")
            .is_none()
    );
}

#[tokio::test]
async fn repeated_batches_drain_the_backlog_five_at_a_time() {
    let h = harness();
    let theme = h.theme_point().await;
    let urls: Vec<String> = (0..12).map(|i| theme_url(&format!("js/{i}.js"))).collect();

    let first = h
        .services
        .assets
        .prepare_batch(&urls, 5)
        .await
        .expect("first batch");
    assert_eq!(first.len(), 5);
    assert!(urls[..5].iter().all(|url| first.contains_key(url)));

    let second = h
        .services
        .assets
        .prepare_batch(&urls[5..], 5)
        .await
        .expect("second batch");
    assert_eq!(second.len(), 5);

    let third = h
        .services
        .assets
        .prepare_batch(&urls[10..], 5)
        .await
        .expect("third batch");
    assert_eq!(third.len(), 2);

    let page = h.services.assets.list(theme, None, 1).await.expect("list");
    assert_eq!(page.total, 12);
}

#[tokio::test]
async fn deleted_entries_are_recreated_on_next_sighting() {
    let h = harness();
    h.theme_point().await;
    let url = theme_url("again.css");
    let urls = vec![url.clone()];
    h.services.assets.resolve_many(&urls).await.expect("create");

    let entry = h
        .services
        .assets
        .find_by_key(&urls::entry_key(&url))
        .await
        .expect("find")
        .expect("exists");
    h.services
        .assets
        .set_state(&[entry.id], RequestedState::Deleted)
        .await
        .expect("delete");

    let resolved = h.services.assets.resolve_many(&urls).await.expect("resolve");
    assert_eq!(resolved.get(&url), Some(&Delivery::Upload(h.upload_url(&url))));

    let recreated = h
        .services
        .assets
        .find_by_key(&urls::entry_key(&url))
        .await
        .expect("find recreated")
        .expect("recreated");
    assert_ne!(recreated.id, entry.id);
    assert_eq!(recreated.state, AssetState::PendingUpload);
}

#[tokio::test]
async fn third_page_of_forty_five_holds_the_last_five() {
    let h = common::harness_configured(|config| {
        config.assets.page_size = 20;
    });
    let theme = h.theme_point().await;
    let urls: Vec<String> = (0..45)
        .map(|i| theme_url(&format!("img/{i:02}.png")))
        .collect();
    h.services
        .assets
        .prepare_batch(&urls, urls.len())
        .await
        .expect("create entries");

    let third = h.services.assets.list(theme, None, 3).await.expect("page 3");
    assert_eq!(third.items.len(), 5);
    assert_eq!(third.total, 45);
    assert_eq!(third.total_pages, 3);
    assert_eq!(third.items[0].local_url, urls[40]);
    assert_eq!(third.items[4].local_url, urls[44]);

    let none = h
        .services
        .assets
        .list(theme, Some("nomatch"), 1)
        .await
        .expect("search");
    assert!(none.items.is_empty());
    assert_eq!(none.listing, Listing::NoMatches);
}

#[tokio::test]
async fn deeper_root_adopts_entries_uploaded_under_its_parent() {
    let h = harness();
    let themes = h
        .services
        .registry
        .register("/wp-content/themes/", "themes")
        .await
        .expect("register shallow root")
        .record()
        .id;
    let url = theme_url("style.css");
    let urls = vec![url.clone()];
    h.services.assets.resolve_many(&urls).await.expect("create");

    let entry = h
        .services
        .assets
        .find_by_key(&urls::entry_key(&url))
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(entry.cache_point_id, themes);
    let remote = format!("{CDN_BASE}/themes/demo/style.css");
    h.services
        .assets
        .record_upload(entry.id, &remote)
        .await
        .expect("record upload");

    let demo = h.theme_point().await;
    let resolved = h.services.assets.resolve_many(&urls).await.expect("resolve");
    assert_eq!(resolved.get(&url), Some(&Delivery::Remote(remote.clone())));

    let moved = h
        .services
        .assets
        .find_by_key(&entry.entry_key)
        .await
        .expect("find moved")
        .expect("still exists");
    assert_eq!(moved.id, entry.id);
    assert_eq!(moved.cache_point_id, demo);
    assert_eq!(h.services.assets.list(demo, None, 1).await.expect("list demo").total, 1);
    assert_eq!(
        h.services
            .assets
            .list(themes, None, 1)
            .await
            .expect("list themes")
            .total,
        0
    );

    let again = h.services.assets.resolve_many(&urls).await.expect("resolve again");
    assert_eq!(again.get(&url), Some(&Delivery::Remote(remote)));
}

#[tokio::test]
async fn preparing_an_uploaded_url_keeps_the_remote_copy() {
    let h = harness();
    h.theme_point().await;
    let url = theme_url("fonts/body.woff2");
    let urls = vec![url.clone()];
    h.services.assets.resolve_many(&urls).await.expect("create");

    let entry = h
        .services
        .assets
        .find_by_key(&urls::entry_key(&url))
        .await
        .expect("find")
        .expect("exists");
    let remote = format!("{CDN_BASE}/themes/demo/fonts/body.woff2");
    h.services
        .assets
        .record_upload(entry.id, &remote)
        .await
        .expect("record upload");

    let prepared = h
        .services
        .assets
        .prepare_batch(&urls, 5)
        .await
        .expect("prepare");
    assert_eq!(prepared.get(&url), Some(&Delivery::Remote(remote)));
}
