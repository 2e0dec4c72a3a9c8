mod common;

use common::MockDriver;
use relfind_engine::config::EngineConfig;
use relfind_engine::dom::{NodeId, PageBuilder, PageSnapshot};
use relfind_engine::extractor;
use relfind_engine::selector::{RowSelector, SelectorBody};
use relfind_engine::synthesis::{self, SynthesisError};

/// Product listing: li rows, each with a name link and a price span.
fn product_page(rows: usize) -> (PageSnapshot, Vec<NodeId>, Vec<NodeId>) {
    let mut page = PageBuilder::new("https://shop.test/list");
    let body = page.child(page.root(), "body");
    page.text_child(body, "h1", "Results");
    let list = page.child(body, "ul");
    let mut names = Vec::new();
    let mut prices = Vec::new();
    for i in 0..rows {
        let li = page.child(list, "li");
        names.push(page.text_child(li, "a", &format!("item {i}")));
        prices.push(page.text_child(li, "span", &format!("${i}.00")));
    }
    let page = page.build();
    (page, names, prices)
}

#[test]
fn one_demonstrated_row_reproduces_every_row() {
    let (page, names, prices) = product_page(6);
    // demonstrated in price-then-name order, the reverse of document order
    let xpaths = vec![page.xpath(prices[0]), page.xpath(names[0])];

    let found = synthesis::likely_relation(&page, &xpaths, None)
        .unwrap()
        .expect("relation");
    let selector = &found.selector;
    assert_eq!(selector.num_rows_in_demonstration, Some(6));
    assert_eq!(selector.url.as_deref(), Some("https://shop.test/list"));

    let relation = extractor::relation_matching(&page, selector).into_rows();
    assert_eq!(relation.len(), 6);

    // column order follows demonstration order, not document order
    assert_eq!(selector.columns.len(), 2);
    assert_eq!(selector.columns[0].xpath, page.xpath(prices[0]));
    assert_eq!(selector.columns[1].xpath, page.xpath(names[0]));
    assert_eq!(page.text_content(relation[3][0].unwrap()), "$3.00");
    assert_eq!(page.text_content(relation[3][1].unwrap()), "item 3");
}

#[test]
fn content_identical_rows_are_both_reproduced() {
    let mut page = PageBuilder::new("https://shop.test/dupes");
    let body = page.child(page.root(), "body");
    let list = page.child(body, "ul");
    let mut first = None;
    for _ in 0..2 {
        let li = page.child(list, "li");
        let a = page.text_child(li, "a", "reposted item");
        first.get_or_insert(a);
    }
    let first = first.unwrap();
    let page = page.build();

    let found = synthesis::likely_relation(&page, &[page.xpath(first)], None)
        .unwrap()
        .expect("relation");
    assert_eq!(found.selector.num_rows_in_demonstration, Some(2));

    let relation = extractor::relation_matching(&page, &found.selector).into_rows();
    assert_eq!(relation.len(), 2);
    // identical text, but two distinct nodes
    assert_ne!(relation[0][0], relation[1][0]);
    assert_eq!(page.text_content(relation[0][0].unwrap()), "reposted item");
    assert_eq!(page.text_content(relation[1][0].unwrap()), "reposted item");
}

#[test]
fn table_demonstration_takes_the_table_path_and_skips_headers() {
    let mut page = PageBuilder::new("https://shop.test/table");
    let body = page.child(page.root(), "body");
    let table = page.child(body, "table");
    let header = page.child(table, "tr");
    page.text_child(header, "th", "Name");
    page.text_child(header, "th", "Price");
    let mut first_data_cells = Vec::new();
    for i in 0..3 {
        let tr = page.child(table, "tr");
        let name = page.text_child(tr, "td", &format!("item {i}"));
        let price = page.text_child(tr, "td", &format!("${i}"));
        if i == 0 {
            first_data_cells = vec![name, price];
        }
    }
    let page = page.build();
    let table_xpath = page.xpath(table);

    let xpaths: Vec<String> = first_data_cells.iter().map(|&c| page.xpath(c)).collect();
    let found = synthesis::likely_relation(&page, &xpaths, None)
        .unwrap()
        .expect("relation");
    let selector = &found.selector;

    match &selector.body {
        SelectorBody::Single(RowSelector::Table(t)) => assert_eq!(t.xpath, table_xpath),
        other => panic!("expected table selector, got {other:?}"),
    }
    assert_eq!(selector.exclude_first, 1);

    let relation = extractor::relation_matching(&page, selector).into_rows();
    assert_eq!(relation.len(), 3);
    assert_eq!(page.text_content(relation[0][0].unwrap()), "item 0");
}

#[test]
fn stray_demonstrated_cell_is_dropped_for_the_larger_subset() {
    let (page, names, _) = product_page(3);
    let title = page.by_tag("h1")[0];
    let xpaths = vec![page.xpath(names[0]), page.xpath(title)];

    let found = synthesis::likely_relation(&page, &xpaths, None)
        .unwrap()
        .expect("relation");
    let selector = &found.selector;
    // the one-off page title cannot generalize into rows
    assert_eq!(selector.columns.len(), 1);
    assert_eq!(selector.columns[0].xpath, page.xpath(names[0]));
    let relation = extractor::relation_matching(&page, selector).into_rows();
    assert_eq!(relation.len(), 3);
}

#[test]
fn saved_selector_is_reused_when_it_still_explains_the_demonstration() {
    let (page, names, prices) = product_page(4);
    let xpaths = vec![page.xpath(names[0]), page.xpath(prices[0])];

    let mut saved = synthesis::likely_relation(&page, &xpaths, None)
        .unwrap()
        .expect("relation")
        .selector;
    saved.name = Some("products".into());

    let again = synthesis::likely_relation(&page, &xpaths, Some(&saved))
        .unwrap()
        .expect("relation");
    assert_eq!(again.selector.name.as_deref(), Some("products"));
}

#[test]
fn mixed_demonstration_yields_pulldown_selectors_too() {
    let mut page = PageBuilder::new("https://shop.test/search");
    let body = page.child(page.root(), "body");
    let select = page.child(body, "select");
    let option = page.text_child(select, "option", "any color");
    page.text_child(select, "option", "red");
    let list = page.child(body, "ul");
    let mut first = 0;
    for i in 0..3 {
        let li = page.child(list, "li");
        let a = page.text_child(li, "a", &format!("hit {i}"));
        if i == 0 {
            first = a;
        }
    }
    let page = page.build();

    let xpaths = vec![page.xpath(first), page.xpath(option)];
    let found = synthesis::likely_relation(&page, &xpaths, None)
        .unwrap()
        .expect("relation");
    assert_eq!(found.pulldowns.len(), 1);
    let pulldown = &found.pulldowns[0];
    assert_eq!(pulldown.version(), 2);
    assert_eq!(pulldown.num_rows_in_demonstration, Some(2));
    let relation = extractor::relation_matching(&page, &found.selector).into_rows();
    assert_eq!(relation.len(), 3);
}

#[tokio::test]
async fn retry_gives_up_after_the_configured_attempts() {
    let mut page = PageBuilder::new("https://slow.test");
    page.child(page.root(), "body");
    let mut driver = MockDriver::new(vec![page.build()]);
    let config = EngineConfig {
        max_likely_relation_attempts: 4,
        retry_backoff_ms: 0,
        ..EngineConfig::default()
    };

    let err = synthesis::likely_relation_with_retry(
        &mut driver,
        &["/html[1]/body[1]/ul[1]/li[1]/a[1]".to_string()],
        None,
        &config,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SynthesisError::NoData(4)));
}

#[tokio::test]
async fn retry_returns_as_soon_as_the_page_has_rows() {
    let (page, names, _) = product_page(2);
    let xpaths = vec![page.xpath(names[0])];
    let mut driver = MockDriver::new(vec![page]);
    let config = EngineConfig { retry_backoff_ms: 0, ..EngineConfig::default() };

    let found = synthesis::likely_relation_with_retry(&mut driver, &xpaths, None, &config)
        .await
        .unwrap();
    assert_eq!(found.selector.num_rows_in_demonstration, Some(2));
}
