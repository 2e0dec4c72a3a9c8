//! Re-resolves a recorded pagination control descriptor against the current
//! page. The stored descriptor is structural only, so the button is located
//! fresh on every use: by image source, exact text, element id, class, numbered
//! page label, and finally xpath edit distance.

use relfind_common::dom::{NodeId, PageSnapshot};
use relfind_common::selector::NextButtonSelector;

/// Best current match for the pagination control, or `None` when nothing on
/// the page resembles it.
pub fn find_next_button(
    page: &PageSnapshot,
    selector: &NextButtonSelector,
    prior_text: Option<&str>,
) -> Option<NodeId> {
    let candidates = page.by_tag(&selector.tag);
    if candidates.is_empty() {
        return None;
    }

    // A numbered pager advances past the last clicked label rather than
    // re-clicking the recorded one.
    let numeric_prior: Option<i64> = prior_text.and_then(|t| t.trim().parse().ok());

    let promising: Vec<NodeId> = candidates
        .iter()
        .copied()
        .filter(|&id| is_promising(page, id, selector, numeric_prior))
        .collect();
    if promising.is_empty() {
        return None;
    }

    if selector.src.is_some() {
        return promising.first().copied();
    }

    if numeric_prior.is_none() {
        if promising.len() == 1 {
            return promising.first().copied();
        }
        if let Some(wanted) = selector.id.as_deref().filter(|s| !s.is_empty()) {
            let by_id: Vec<NodeId> = promising
                .iter()
                .copied()
                .filter(|&id| page.node(id).is_some_and(|n| n.elem_id.as_deref() == Some(wanted)))
                .collect();
            if by_id.len() == 1 {
                return by_id.first().copied();
            }
        }
        let by_class: Vec<NodeId> = promising
            .iter()
            .copied()
            .filter(|&id| {
                page.node(id).is_some_and(|n| n.class.as_deref() == selector.class.as_deref())
            })
            .collect();
        if by_class.len() == 1 {
            return by_class.first().copied();
        }
    } else {
        // Prefer labels sharing the recorded class, then take the smallest
        // page number past the prior one.
        let same_class: Vec<NodeId> = promising
            .iter()
            .copied()
            .filter(|&id| {
                page.node(id).is_some_and(|n| n.class.as_deref() == selector.class.as_deref())
            })
            .collect();
        let pool = if same_class.is_empty() { &promising } else { &same_class };
        if let Some(next) = pool
            .iter()
            .copied()
            .filter_map(|id| integer_text(page, id).map(|n| (n, id)))
            .min_by_key(|&(n, _)| n)
        {
            return Some(next.1);
        }
    }

    promising
        .into_iter()
        .min_by_key(|&id| strsim::levenshtein(&page.xpath(id), &selector.xpath))
}

fn is_promising(
    page: &PageSnapshot,
    id: NodeId,
    selector: &NextButtonSelector,
    numeric_prior: Option<i64>,
) -> bool {
    let Some(node) = page.node(id) else {
        return false;
    };
    if let Some(src) = selector.src.as_deref() {
        return node.attributes.get("src").is_some_and(|s| s == src);
    }
    match numeric_prior {
        None => {
            let text = page.text_content(id);
            selector.text.as_deref() == Some(text.as_str())
        }
        Some(prior) => integer_text(page, id).is_some_and(|n| n > prior),
    }
}

fn integer_text(page: &PageSnapshot, id: NodeId) -> Option<i64> {
    page.text_content(id).trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relfind_common::dom::PageBuilder;

    fn descriptor(tag: &str, text: &str, xpath: &str) -> NextButtonSelector {
        NextButtonSelector {
            tag: tag.into(),
            text: Some(text.into()),
            id: None,
            class: None,
            src: None,
            xpath: xpath.into(),
            frame_id: None,
        }
    }

    #[test]
    fn unique_text_match_wins() {
        let mut page = PageBuilder::new("u");
        let body = page.child(page.root(), "body");
        page.text_child(body, "a", "Prev");
        let next = page.text_child(body, "a", "Next");
        let page = page.build();

        let sel = descriptor("a", "Next", "/html[1]/body[1]/a[2]");
        assert_eq!(find_next_button(&page, &sel, None), Some(next));
    }

    #[test]
    fn numbered_pager_advances_past_prior_label() {
        let mut page = PageBuilder::new("u");
        let body = page.child(page.root(), "body");
        let mut third = None;
        for n in 1..=5 {
            let a = page.text_child(body, "a", &n.to_string());
            if n == 3 {
                third = Some(a);
            }
        }
        let page = page.build();

        let sel = descriptor("a", "2", "/html[1]/body[1]/a[2]");
        assert_eq!(find_next_button(&page, &sel, Some("2")), third);
    }

    #[test]
    fn xpath_distance_breaks_text_ties() {
        let mut page = PageBuilder::new("u");
        let body = page.child(page.root(), "body");
        let top_nav = page.child(body, "div");
        page.text_child(top_nav, "a", "More");
        let bottom_nav = page.child(body, "div");
        page.text_child(bottom_nav, "span", "filler");
        page.text_child(bottom_nav, "span", "filler");
        let wanted = page.text_child(bottom_nav, "a", "More");
        let page = page.build();

        let sel = descriptor("a", "More", &page.xpath(wanted));
        assert_eq!(find_next_button(&page, &sel, None), Some(wanted));
    }

    #[test]
    fn image_button_matches_on_src() {
        let mut page = PageBuilder::new("u");
        let body = page.child(page.root(), "body");
        let decoy = page.child(body, "img");
        page.set_attr(decoy, "src", "/spacer.gif");
        let arrow = page.child(body, "img");
        page.set_attr(arrow, "src", "/next-arrow.png");
        let page = page.build();

        let sel = NextButtonSelector {
            tag: "img".into(),
            text: None,
            id: None,
            class: None,
            src: Some("/next-arrow.png".into()),
            xpath: "/html[1]/body[1]/img[2]".into(),
            frame_id: None,
        };
        assert_eq!(find_next_button(&page, &sel, None), Some(arrow));
    }
}
