//! Feature Engine: computes named structural, textual, geometric, and style
//! features of a snapshot node, and tests feature-set constraints against
//! candidates. Side-effect-free; cheap enough to run for every element on the
//! page.

use relfind_common::dom::{NodeId, PageSnapshot};
use relfind_common::selector::{FeatureConstraint, FeatureSet, Polarity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Tag,
    XPath,
    Id,
    Class,
    Width,
    Height,
    FontSize,
    FontFamily,
    FontWeight,
    Color,
    BackgroundColor,
    Text,
    PrecedingText,
    FollowingText,
}

/// The default search space. XPath generalizes best on regular pages; tag
/// keeps it honest.
pub const DEFAULT_FEATURES: &[Feature] = &[Feature::Tag, Feature::XPath];

/// The fallback space when xpaths are too scattered to constrain anything.
pub const FEATURES_EXCEPT_XPATH: &[Feature] = &[
    Feature::Tag,
    Feature::Id,
    Feature::Class,
    Feature::Width,
    Feature::Height,
    Feature::FontSize,
    Feature::FontFamily,
    Feature::FontWeight,
    Feature::Color,
    Feature::BackgroundColor,
    Feature::Text,
    Feature::PrecedingText,
    Feature::FollowingText,
];

impl Feature {
    pub fn name(self) -> &'static str {
        match self {
            Feature::Tag => "tag",
            Feature::XPath => "xpath",
            Feature::Id => "id",
            Feature::Class => "class",
            Feature::Width => "width",
            Feature::Height => "height",
            Feature::FontSize => "font-size",
            Feature::FontFamily => "font-family",
            Feature::FontWeight => "font-weight",
            Feature::Color => "color",
            Feature::BackgroundColor => "background-color",
            Feature::Text => "text",
            Feature::PrecedingText => "preceding-text",
            Feature::FollowingText => "following-text",
        }
    }

    pub fn from_name(name: &str) -> Option<Feature> {
        let all = [
            Feature::Tag,
            Feature::XPath,
            Feature::Id,
            Feature::Class,
            Feature::Width,
            Feature::Height,
            Feature::FontSize,
            Feature::FontFamily,
            Feature::FontWeight,
            Feature::Color,
            Feature::BackgroundColor,
            Feature::Text,
            Feature::PrecedingText,
            Feature::FollowingText,
        ];
        all.into_iter().find(|f| f.name() == name)
    }
}

/// Computes one feature value. Missing attributes and styles compute to the
/// empty string so membership tests stay total.
pub fn compute(page: &PageSnapshot, id: NodeId, feature: Feature) -> String {
    let node = match page.node(id) {
        Some(n) => n,
        None => return String::new(),
    };
    match feature {
        Feature::Tag => node.tag.clone(),
        Feature::XPath => page.xpath(id),
        Feature::Id => node.elem_id.clone().unwrap_or_default(),
        Feature::Class => node.class.clone().unwrap_or_default(),
        Feature::Width => node.rect.width.to_string(),
        Feature::Height => node.rect.height.to_string(),
        Feature::FontSize
        | Feature::FontFamily
        | Feature::FontWeight
        | Feature::Color
        | Feature::BackgroundColor => {
            node.styles.get(feature.name()).cloned().unwrap_or_default()
        }
        Feature::Text => page.text_content(id).trim().to_string(),
        Feature::PrecedingText => page
            .preceding_sibling_text(id)
            .map(|t| t.trim().to_string())
            .unwrap_or_default(),
        Feature::FollowingText => page
            .following_sibling_text(id)
            .map(|t| t.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Builds the feature set generalizing the positive examples. A feature the
/// positives disagree on carries no row signal and is dropped; the exception
/// is xpath, whose disagreeing values merge into an index-wildcard pattern.
pub fn feature_set(page: &PageSnapshot, space: &[Feature], positives: &[NodeId]) -> FeatureSet {
    let mut out = FeatureSet::new();
    for &feature in space {
        let values: std::collections::BTreeSet<String> =
            positives.iter().map(|&n| compute(page, n, feature)).collect();
        if values.len() > 1 && feature != Feature::XPath {
            continue;
        }
        out.insert(feature.name(), FeatureConstraint::include(values));
    }
    out
}

/// True when every named feature is one this engine can compute.
pub fn supported(fs: &FeatureSet) -> bool {
    fs.iter().all(|(name, _)| Feature::from_name(name).is_some())
}

/// Xpath membership with index generalization: the accepted xpaths form a
/// pattern in which any step index they disagree on becomes a wildcard, so
/// two demonstrated rows admit every structurally identical sibling row.
fn xpath_generalizes(accepted: &std::collections::BTreeSet<String>, candidate: &str) -> bool {
    if accepted.contains(candidate) {
        return true;
    }
    let cand: Vec<&str> = candidate.trim_start_matches('/').split('/').collect();
    let split = |step: &'_ str| -> (String, String) {
        match step.split_once('[') {
            Some((tag, rest)) => (tag.to_string(), rest.trim_end_matches(']').to_string()),
            None => (step.to_string(), String::new()),
        }
    };
    let patterns: Vec<Vec<&str>> = accepted
        .iter()
        .map(|xp| xp.trim_start_matches('/').split('/').collect())
        .collect();
    if patterns.is_empty() || patterns.iter().any(|p| p.len() != cand.len()) {
        return false;
    }
    for (i, &step) in cand.iter().enumerate() {
        let (ctag, cidx) = split(step);
        let mut indices = std::collections::BTreeSet::new();
        for pattern in &patterns {
            let (tag, idx) = split(pattern[i]);
            if tag != ctag {
                return false;
            }
            indices.insert(idx);
        }
        // Agreement fixes the index; disagreement leaves it wild.
        if indices.len() == 1 && !indices.contains(&cidx) {
            return false;
        }
    }
    true
}

/// Candidate test: logical AND over per-feature membership, honoring
/// polarity.
pub fn node_matches(page: &PageSnapshot, id: NodeId, fs: &FeatureSet) -> bool {
    for (name, constraint) in fs.iter() {
        let feature = match Feature::from_name(name) {
            Some(f) => f,
            None => return false,
        };
        let value = compute(page, id, feature);
        let member = if feature == Feature::XPath {
            xpath_generalizes(&constraint.values, &value)
        } else {
            constraint.values.contains(&value)
        };
        let ok = match constraint.polarity {
            Polarity::Include => member,
            Polarity::Exclude => !member,
        };
        if !ok {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use relfind_common::dom::PageBuilder;

    #[test]
    fn feature_set_unions_positive_values() {
        let mut page = PageBuilder::new("u");
        let body = page.child(page.root(), "body");
        let a = page.text_child(body, "li", "one");
        let b = page.text_child(body, "li", "two");
        let page = page.build();

        let fs = feature_set(&page, DEFAULT_FEATURES, &[a, b]);
        let tags = &fs.get("tag").unwrap().values;
        assert_eq!(tags.len(), 1);
        let xpaths = &fs.get("xpath").unwrap().values;
        assert_eq!(xpaths.len(), 2);

        assert!(node_matches(&page, a, &fs));
        assert!(node_matches(&page, b, &fs));
        assert!(!node_matches(&page, body, &fs));
    }

    #[test]
    fn two_demonstrated_xpaths_admit_all_sibling_rows() {
        let mut page = PageBuilder::new("u");
        let body = page.child(page.root(), "body");
        let list = page.child(body, "ul");
        let rows: Vec<_> = (0..4).map(|_| page.child(list, "li")).collect();
        let stray = page.child(body, "li");
        let page = page.build();

        let fs = feature_set(&page, DEFAULT_FEATURES, &rows[..2]);
        for &row in &rows {
            assert!(node_matches(&page, row, &fs));
        }
        // different structure: /body/li instead of /body/ul/li
        assert!(!node_matches(&page, stray, &fs));
    }

    #[test]
    fn exclude_polarity_inverts_membership() {
        let mut page = PageBuilder::new("u");
        let body = page.child(page.root(), "body");
        let a = page.child(body, "li");
        let b = page.child(body, "span");
        let page = page.build();

        let mut fs = FeatureSet::new();
        fs.insert(
            "tag",
            FeatureConstraint {
                values: ["li".to_string()].into_iter().collect(),
                polarity: Polarity::Exclude,
            },
        );
        assert!(!node_matches(&page, a, &fs));
        assert!(node_matches(&page, b, &fs));
    }

    #[test]
    fn unknown_feature_never_matches() {
        let page = PageBuilder::new("u").build();
        let mut fs = FeatureSet::new();
        fs.insert("zorder", FeatureConstraint::include(["1".to_string()]));
        assert!(!supported(&fs));
        assert!(!node_matches(&page, 0, &fs));
    }
}
