//! The node transformer (C2, spec.md §4.2): a pure classification function
//! run once per node as it appears out of the incremental parser. It
//! rewrites URL-bearing attributes in place against the entry's base URI and
//! reports back what the streaming loader (C3) should do with the node next
//! (leave it, fetch and inline a stylesheet, schedule a script...).
//!
//! The original design threads a mutable `ctx` (fetcher, deferred queue,
//! entry resolver) through the transform and lets it enqueue/fetch directly.
//! Here the transform stays a pure `(node) -> NodeAction` and the caller
//! performs the fetch/enqueue side effects the action describes — same
//! division of labor, expressed as data instead of callbacks.

use qiankun_dom::{NodeKey, DOM};
use url::Url;

/// Tags whose content belongs in the app's virtual head rather than its
/// container (spec.md §4.2 row "`<meta>` / `<title>` / `<base>`").
const HEAD_DIVERTED_TAGS: [&str; 3] = ["meta", "title", "base"];

const URL_ATTR_TAGS: [(&str, &str); 5] =
    [("img", "src"), ("video", "src"), ("audio", "src"), ("source", "src"), ("a", "href")];

/// What the streaming loader should do with a node after [`transform`] has
/// rewritten its attributes in place.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeAction {
    /// No special scheduling; the node stays where the parser put it.
    PassThrough,
    /// `<meta>`/`<title>`/`<base>`: move into the head container. `<base>`'s
    /// `href` has already been stripped (neutralized).
    DivertToHead,
    /// `<link rel="prefetch"|"preload">`: `href` rewritten absolute, left in
    /// place as a hint, nothing further to do.
    PrefetchHint,
    /// `<link rel="stylesheet">`: fetch `href` (C1), inline the result as a
    /// `<style>` with its own `url(...)` references rewritten, and block
    /// further parsing until that completes.
    StylesheetLink { href: Url },
    /// `<style>`: its own text has already been rewritten in place.
    InlineStyle,
    /// The entry script (exactly one per entry HTML): blocking. After it
    /// runs, the loader reads `sandbox.latest_set_prop` to resolve the
    /// library export.
    EntryScript { src: Option<Url>, inline: Option<String> },
    /// A synchronous or `defer`red script: enqueue into the deferred queue
    /// (C5), which drains FIFO once the stream ends (or immediately for a
    /// plain sync script that must block parsing).
    ScheduledScript { src: Option<Url>, inline: Option<String>, blocking: bool },
    /// `async` script: let it run without blocking anything.
    AsyncScript { src: Option<Url>, inline: Option<String> },
}

/// Resolve `raw` against `base` if it parses as a URL, returning the
/// original string unchanged if it's already absolute or doesn't parse
/// (e.g. `data:`/`mailto:` or a caller typo) — this is what makes re-running
/// the transform on an already-resolved attribute a no-op.
fn resolve(base: &Url, raw: &str) -> String {
    if raw.is_empty() || Url::parse(raw).is_ok() {
        return raw.to_owned();
    }
    base.join(raw).map_or_else(|_| raw.to_owned(), |resolved| resolved.to_string())
}

/// Run the per-tag transform on `node`, rewriting its attributes in place
/// and returning what the caller should do next. Idempotent: a node whose
/// `data-qiankun-transformed` marker is already set is returned as
/// [`NodeAction::PassThrough`] without being touched again.
pub fn transform(dom: &mut DOM, node: NodeKey, base_uri: &Url) -> NodeAction {
    if dom.has_attr(node, "data-qiankun-transformed") {
        return NodeAction::PassThrough;
    }
    let Some(tag) = dom.tag_of(node) else {
        return NodeAction::PassThrough;
    };
    dom.set_attr(node, "data-qiankun-transformed", "1");

    match tag.as_str() {
        "script" => transform_script(dom, node, base_uri),
        "link" => transform_link(dom, node, base_uri),
        "style" => NodeAction::InlineStyle,
        _ if HEAD_DIVERTED_TAGS.contains(&tag.as_str()) => transform_head_diverted(dom, node),
        _ => transform_url_bearing(dom, node, base_uri, &tag),
    }
}

fn transform_script(dom: &mut DOM, node: NodeKey, base_uri: &Url) -> NodeAction {
    if dom.has_attr(node, "nomodule") {
        dom.set_attr(node, "nomodule", "");
    }
    let src = dom.get_attr(node, "src").map(|raw| {
        let resolved = resolve(base_uri, &raw);
        dom.set_attr(node, "src", &resolved);
        resolved
    });
    let src_url = src.as_deref().and_then(|value| Url::parse(value).ok());
    let inline = if src.is_none() { dom.children_of(node).iter().find_map(|&child| dom.text_of(child)) } else { None };

    if dom.has_attr(node, "entry") {
        return NodeAction::EntryScript { src: src_url, inline };
    }
    if dom.has_attr(node, "async") {
        return NodeAction::AsyncScript { src: src_url, inline };
    }
    let blocking = src_url.is_none() || !dom.has_attr(node, "defer");
    NodeAction::ScheduledScript { src: src_url, inline, blocking }
}

fn transform_link(dom: &mut DOM, node: NodeKey, base_uri: &Url) -> NodeAction {
    let rel = dom.get_attr(node, "rel").unwrap_or_default();
    let href = dom.get_attr(node, "href").map(|raw| {
        let resolved = resolve(base_uri, &raw);
        dom.set_attr(node, "href", &resolved);
        resolved
    });
    match rel.as_str() {
        "stylesheet" => match href.and_then(|value| Url::parse(&value).ok()) {
            Some(url) => NodeAction::StylesheetLink { href: url },
            None => NodeAction::PassThrough,
        },
        "prefetch" | "preload" => NodeAction::PrefetchHint,
        _ => NodeAction::PassThrough,
    }
}

fn transform_head_diverted(dom: &mut DOM, node: NodeKey) -> NodeAction {
    if dom.tag_of(node).as_deref() == Some("base") && dom.has_attr(node, "href") {
        dom.set_attr(node, "href", "");
    }
    NodeAction::DivertToHead
}

fn transform_url_bearing(dom: &mut DOM, node: NodeKey, base_uri: &Url, tag: &str) -> NodeAction {
    if tag == "a" && dom.get_attr(node, "target").as_deref() == Some("_blank") {
        return NodeAction::PassThrough;
    }
    if let Some((_, attr)) = URL_ATTR_TAGS.iter().find(|(candidate, _)| *candidate == tag) {
        if let Some(raw) = dom.get_attr(node, attr) {
            let resolved = resolve(base_uri, &raw);
            dom.set_attr(node, attr, &resolved);
        }
    }
    NodeAction::PassThrough
}

#[cfg(test)]
mod tests {
    use super::{transform, NodeAction};
    use qiankun_dom::DOM;
    use url::Url;

    fn base() -> Url {
        Url::parse("https://host.example/app/").expect("valid base")
    }

    #[test]
    fn resolves_relative_script_src_and_detects_entry() {
        let (mut dom, _rx) = DOM::new();
        let root = dom.root_key();
        let script = dom.new_element("script");
        dom.append_child(root, script);
        dom.set_attr(script, "src", "main.js");
        dom.set_attr(script, "entry", "");

        let action = transform(&mut dom, script, &base());
        assert_eq!(dom.get_attr(script, "src").as_deref(), Some("https://host.example/app/main.js"));
        assert!(matches!(action, NodeAction::EntryScript { .. }));
    }

    #[test]
    fn strips_nomodule_but_keeps_script_scheduled() {
        let (mut dom, _rx) = DOM::new();
        let root = dom.root_key();
        let script = dom.new_element("script");
        dom.append_child(root, script);
        dom.set_attr(script, "src", "a.js");
        dom.set_attr(script, "nomodule", "true");

        let action = transform(&mut dom, script, &base());
        assert_eq!(dom.get_attr(script, "nomodule").as_deref(), Some(""));
        assert!(matches!(action, NodeAction::ScheduledScript { blocking: true, .. }));
    }

    #[test]
    fn defer_script_is_non_blocking() {
        let (mut dom, _rx) = DOM::new();
        let root = dom.root_key();
        let script = dom.new_element("script");
        dom.append_child(root, script);
        dom.set_attr(script, "src", "a.js");
        dom.set_attr(script, "defer", "");

        let action = transform(&mut dom, script, &base());
        assert!(matches!(action, NodeAction::ScheduledScript { blocking: false, .. }));
    }

    #[test]
    fn stylesheet_link_resolves_href() {
        let (mut dom, _rx) = DOM::new();
        let root = dom.root_key();
        let link = dom.new_element("link");
        dom.append_child(root, link);
        dom.set_attr(link, "rel", "stylesheet");
        dom.set_attr(link, "href", "style.css");

        let action = transform(&mut dom, link, &base());
        match action {
            NodeAction::StylesheetLink { href } => assert_eq!(href.as_str(), "https://host.example/app/style.css"),
            other => panic!("expected StylesheetLink, got {other:?}"),
        }
    }

    #[test]
    fn base_tag_is_neutralized_and_diverted() {
        let (mut dom, _rx) = DOM::new();
        let root = dom.root_key();
        let base_tag = dom.new_element("base");
        dom.append_child(root, base_tag);
        dom.set_attr(base_tag, "href", "https://elsewhere.example/");

        let action = transform(&mut dom, base_tag, &base());
        assert_eq!(dom.get_attr(base_tag, "href").as_deref(), Some(""));
        assert_eq!(action, NodeAction::DivertToHead);
    }

    #[test]
    fn running_transform_twice_is_a_no_op() {
        let (mut dom, _rx) = DOM::new();
        let root = dom.root_key();
        let img = dom.new_element("img");
        dom.append_child(root, img);
        dom.set_attr(img, "src", "pic.png");

        let _first = transform(&mut dom, img, &base());
        let resolved_once = dom.get_attr(img, "src");
        let second = transform(&mut dom, img, &base());
        assert_eq!(dom.get_attr(img, "src"), resolved_once);
        assert_eq!(second, NodeAction::PassThrough);
    }

    #[test]
    fn anchor_target_blank_is_left_alone_besides_base_marker() {
        let (mut dom, _rx) = DOM::new();
        let root = dom.root_key();
        let anchor = dom.new_element("a");
        dom.append_child(root, anchor);
        dom.set_attr(anchor, "href", "page.html");
        dom.set_attr(anchor, "target", "_blank");

        transform(&mut dom, anchor, &base());
        assert_eq!(dom.get_attr(anchor, "href").as_deref(), Some("page.html"));
    }
}
