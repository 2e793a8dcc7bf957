//! C3: the streaming entry-HTML loader. Fetches an app's entry document,
//! strips its `<head>`/`</head>` tags so the parser can't clobber the host
//! page's own head (`tag_rewrite`), feeds it through `html5ever`
//! (`qiankun_dom::parser::Html5everEngine`), walks every element the parser
//! produced through the per-tag transform (C2, `transform`), and resolves
//! the app's exported `{bootstrap, mount, unmount, update}` library (C7's
//! entry point into this crate).
//!
//! `Html5everEngine` holds its `&mut DOM` borrow for its own lifetime, which
//! rules out calling [`transform::transform`] (itself `&mut DOM`) while a
//! chunk is mid-parse. Since [`qiankun_fetch::AssetCache::fetch_text`]
//! already returns a whole body rather than a real byte stream, there is no
//! byte-level interleaving to preserve anyway: this loader parses the whole
//! document first, drops the parser, and only then walks the nodes it
//! produced in document order. "Streaming" here means chunk-fed parsing and
//! FIFO-ordered deferred execution, not interleaved network I/O.

pub mod entry;
pub mod error;
pub mod tag_rewrite;
pub mod transform;

use std::sync::{Arc, Mutex};

use qiankun_dom::parser::Html5everEngine;
use qiankun_dom::DOM;
use qiankun_fetch::AssetCache;
use qiankun_js::{DOMUpdate, JsEngine, NodeKey};
use qiankun_sandbox::{DeferredScript, DeferredScriptQueue, LifecycleOutcome, LifecycleResultRegistry};
use qiankun_style::{rewrite_urls, scope_stylesheet};
use url::Url;

pub use entry::{build_invoke_phase_script, build_resolve_script, run_lifecycle_script, MISSING_LIFECYCLE_SENTINEL};
pub use error::QiankunError;
pub use tag_rewrite::TagRewriter;
pub use transform::{transform, NodeAction};

/// `streamTransformer` (spec.md §6): runs over an app's decoded entry body
/// ahead of C3's tag-rewrite + parse pass. Takes and returns the whole body
/// rather than a chunked operator — see the module doc for why this loader
/// never has a true byte stream to insert a stream operator into.
pub type StreamTransformerHook = Arc<dyn Fn(String) -> String + Send + Sync>;

/// `nodeTransformer` (spec.md §6): runs once per node, immediately before
/// C2's own [`transform`] sees it.
pub type NodeTransformerHook = Arc<dyn Fn(&mut DOM, NodeKey) + Send + Sync>;

/// What loading an entry document resolved, handed back to the lifecycle
/// controller (C7) so it can proceed to `bootstrap`/`mount`.
#[derive(Debug)]
pub struct ResolvedEntry {
    /// The global key the app's library was found under (e.g. what
    /// `window[name] = {...}` assigned to).
    pub library_name: String,
    /// Whether the resolved library also exports `update`.
    pub has_update: bool,
    /// Non-fatal failures collected while loading (a broken prefetch, a
    /// deferred script that threw, an async script that never fetched) —
    /// the caller dispatches these to the global error bus (C10) rather
    /// than failing the whole load over them.
    pub deferred_errors: Vec<QiankunError>,
}

/// Fetch, parse, and resolve an app's entry HTML, relocating its body
/// content into `container` and (if the document carried one) its head
/// content into `head`.
///
/// `style_scope`, when set, is an attribute selector (e.g.
/// `[data-qiankun-app="cart"]`) appended to every top-level selector in the
/// app's stylesheets — `experimentalStyleIsolation` (spec.md §6).
///
/// # Errors
/// Returns [`QiankunError::EntryFetchFailed`] if the entry document itself
/// can't be fetched, [`QiankunError::MultipleEntryScripts`] if more than one
/// `<script entry>` is found, and [`QiankunError::EntryMissingLifecycle`] if
/// no exported `{bootstrap, mount, unmount}` shape could be resolved at all.
pub async fn load_entry<E: JsEngine>(
    engine: &mut E,
    lifecycle_registry: &Arc<Mutex<LifecycleResultRegistry>>,
    fetch_cache: &AssetCache,
    deferred_queue: &mut DeferredScriptQueue,
    dom: &mut DOM,
    container: NodeKey,
    head: Option<NodeKey>,
    entry_url: &Url,
    app: &str,
    style_scope: Option<&str>,
    stream_transformer: Option<&StreamTransformerHook>,
    node_transformer: Option<&NodeTransformerHook>,
) -> Result<ResolvedEntry, QiankunError> {
    let asset = fetch_cache.fetch_text(entry_url).await.map_err(|error| QiankunError::EntryFetchFailed {
        url: error.url.clone(),
        message: error.message.clone(),
    })?;
    let body = stream_transformer.map_or_else(|| asset.body.clone(), |hook| hook(asset.body.clone()));

    let (element_keys, html_scaffold) = parse_entry_document(dom, &body);

    let mut deferred_errors = Vec::new();
    let mut entry_script: Option<NodeKey> = None;
    let mut last_assigned: Option<String> = None;
    let mut async_scripts: Vec<(Option<Url>, Option<String>)> = Vec::new();

    for node in element_keys {
        if let Some(hook) = node_transformer {
            hook(dom, node);
        }
        match transform(dom, node, entry_url) {
            NodeAction::PassThrough | NodeAction::PrefetchHint => {}
            NodeAction::DivertToHead => {
                if let Some(head) = head {
                    dom.remove_from_parent(node);
                    dom.append_child(head, node);
                }
            }
            NodeAction::InlineStyle => {
                rewrite_inline_style(dom, node, entry_url, style_scope);
            }
            NodeAction::StylesheetLink { href } => {
                if let Err(error) = inline_stylesheet(dom, node, &href, fetch_cache, style_scope).await {
                    deferred_errors.push(error);
                }
            }
            NodeAction::EntryScript { src, inline } => {
                if entry_script.is_some() {
                    return Err(QiankunError::MultipleEntryScripts { app: app.to_owned() });
                }
                entry_script = Some(node);
                let outcome = run_script(engine, fetch_cache, src, inline).await;
                match outcome {
                    Ok(key) => last_assigned = key.or(last_assigned),
                    Err(error) => return Err(error),
                }
            }
            NodeAction::ScheduledScript { src, inline, blocking } => {
                if blocking {
                    match run_script(engine, fetch_cache, src, inline).await {
                        Ok(key) => last_assigned = key.or(last_assigned),
                        Err(error) => deferred_errors.push(error),
                    }
                } else {
                    deferred_queue.enqueue(DeferredScript { url: src.map(|url| url.to_string()), inline_source: inline });
                }
            }
            NodeAction::AsyncScript { src, inline } => async_scripts.push((src, inline)),
        }
    }

    relocate_body(dom, html_scaffold, container);

    run_async_scripts(engine, fetch_cache, async_scripts, &mut last_assigned, &mut deferred_errors).await;
    drain_deferred(engine, fetch_cache, deferred_queue, &mut last_assigned, &mut deferred_errors).await;

    let Some(library_name) = last_assigned.or_else(|| engine.last_global_assignment_key()) else {
        return Err(QiankunError::EntryMissingLifecycle { app: app.to_owned() });
    };

    let probe = build_resolve_script(&library_name);
    let outcome =
        run_lifecycle_script(engine, lifecycle_registry, &probe, entry_url.as_str(), app, "resolve").await?;
    match outcome {
        LifecycleOutcome::Ok(payload) => {
            Ok(ResolvedEntry { library_name, has_update: payload == "1", deferred_errors })
        }
        LifecycleOutcome::Threw(message) if message == MISSING_LIFECYCLE_SENTINEL => {
            Err(QiankunError::EntryMissingLifecycle { app: app.to_owned() })
        }
        LifecycleOutcome::Threw(message) => {
            Err(QiankunError::LifecycleThrew { app: app.to_owned(), phase: String::from("resolve"), message })
        }
    }
}

/// Fetch and evaluate a manifest entry's styles and scripts in their
/// declared order, then resolve the app's exported library exactly as
/// [`load_entry`] does. There is no HTML document to walk here, so no node
/// transform (C2) applies and nothing is relocated into `container` — only
/// `head` (if any) gains the fetched stylesheets.
///
/// # Errors
/// Returns [`QiankunError::AssetFetchFailed`] if a script fetch or eval
/// fails (style fetch failures are instead collected into
/// `deferred_errors`, matching a broken `<link rel="stylesheet">` in
/// [`load_entry`]), and [`QiankunError::EntryMissingLifecycle`] if no
/// exported library could be resolved.
pub async fn load_manifest<E: JsEngine>(
    engine: &mut E,
    lifecycle_registry: &Arc<Mutex<LifecycleResultRegistry>>,
    fetch_cache: &AssetCache,
    dom: &mut DOM,
    head: Option<NodeKey>,
    scripts: &[Url],
    styles: &[Url],
    app: &str,
    style_scope: Option<&str>,
) -> Result<ResolvedEntry, QiankunError> {
    let mut deferred_errors = Vec::new();
    if let Some(head) = head {
        for href in styles {
            if let Err(error) = append_manifest_stylesheet(dom, head, href, fetch_cache, style_scope).await {
                deferred_errors.push(error);
            }
        }
    }

    let mut last_assigned: Option<String> = None;
    for src in scripts {
        let assigned = run_script(engine, fetch_cache, Some(src.clone()), None).await?;
        last_assigned = assigned.or(last_assigned);
    }

    let Some(library_name) = last_assigned.or_else(|| engine.last_global_assignment_key()) else {
        return Err(QiankunError::EntryMissingLifecycle { app: app.to_owned() });
    };

    let probe = build_resolve_script(&library_name);
    let outcome =
        run_lifecycle_script(engine, lifecycle_registry, &probe, "qiankun://manifest", app, "resolve").await?;
    match outcome {
        LifecycleOutcome::Ok(payload) => {
            Ok(ResolvedEntry { library_name, has_update: payload == "1", deferred_errors })
        }
        LifecycleOutcome::Threw(message) if message == MISSING_LIFECYCLE_SENTINEL => {
            Err(QiankunError::EntryMissingLifecycle { app: app.to_owned() })
        }
        LifecycleOutcome::Threw(message) => {
            Err(QiankunError::LifecycleThrew { app: app.to_owned(), phase: String::from("resolve"), message })
        }
    }
}

async fn append_manifest_stylesheet(
    dom: &mut DOM,
    head: NodeKey,
    href: &Url,
    fetch_cache: &AssetCache,
    style_scope: Option<&str>,
) -> Result<(), QiankunError> {
    let asset = fetch_cache.fetch_text(href).await.map_err(|error| QiankunError::AssetFetchFailed {
        url: error.url.clone(),
        message: error.message.clone(),
    })?;
    let rewritten = rewrite_urls(&asset.body, href);
    let scoped = style_scope.map_or_else(|| rewritten.clone(), |selector| scope_stylesheet(&rewritten, selector));
    let style_node = dom.new_element("style");
    dom.append_child(head, style_node);
    let text_node = dom.new_text(&scoped);
    dom.append_child(style_node, text_node);
    Ok(())
}

/// Run the rewriter + parser over the whole entry body (see the module doc
/// for why this isn't interleaved with the network fetch), returning every
/// element the parse produced, in document order, plus the scaffold
/// `<html>` node html5ever always synthesizes so the caller can detach it
/// once the body's content has been relocated.
fn parse_entry_document(dom: &mut DOM, body: &str) -> (Vec<NodeKey>, Option<NodeKey>) {
    let mut rewriter = TagRewriter::new();
    let mut history: Vec<DOMUpdate> = Vec::new();
    {
        let mut parser = Html5everEngine::new(&mut *dom);
        history.extend(parser.push(&rewriter.push(body)));
        let tail = rewriter.finish();
        if !tail.is_empty() {
            history.extend(parser.push(&tail));
        }
        history.extend(parser.finalize());
    }

    let mut elements = Vec::new();
    let mut html_scaffold = None;
    for update in &history {
        if let DOMUpdate::InsertElement { node, tag, .. } = update {
            elements.push(*node);
            if tag == "html" {
                html_scaffold = Some(*node);
            }
        }
    }
    (elements, html_scaffold)
}

/// Move the parsed `<body>`'s children into `container` and detach the now
/// hollow `<html>` scaffold. Nodes diverted to `head` by the main walk have
/// already been moved individually, so nothing but the empty wrapper
/// structure is left behind here.
fn relocate_body(dom: &mut DOM, html_scaffold: Option<NodeKey>, container: NodeKey) {
    let Some(html_scaffold) = html_scaffold else { return };
    let body = dom
        .children_of(html_scaffold)
        .into_iter()
        .find(|&child| dom.tag_of(child).as_deref() == Some("body"));
    if let Some(body) = body {
        dom.reparent_children(body, container);
    }
    dom.remove_from_parent(html_scaffold);
}

fn rewrite_inline_style(dom: &mut DOM, node: NodeKey, base_uri: &Url, style_scope: Option<&str>) {
    let Some(text_node) = dom.children_of(node).into_iter().next() else { return };
    let Some(text) = dom.text_of(text_node) else { return };
    let rewritten = rewrite_urls(&text, base_uri);
    let scoped = style_scope.map_or_else(|| rewritten.clone(), |selector| scope_stylesheet(&rewritten, selector));
    dom.update_text(text_node, &scoped);
}

async fn inline_stylesheet(
    dom: &mut DOM,
    link_node: NodeKey,
    href: &Url,
    fetch_cache: &AssetCache,
    style_scope: Option<&str>,
) -> Result<(), QiankunError> {
    let asset = fetch_cache.fetch_text(href).await.map_err(|error| QiankunError::AssetFetchFailed {
        url: error.url.clone(),
        message: error.message.clone(),
    });
    match asset {
        Ok(asset) => {
            let rewritten = rewrite_urls(&asset.body, href);
            let scoped = style_scope.map_or_else(|| rewritten.clone(), |selector| scope_stylesheet(&rewritten, selector));
            let style_node = dom.new_element("style");
            dom.insert_before(link_node, style_node);
            let text_node = dom.new_text(&scoped);
            dom.append_child(style_node, text_node);
            dom.remove_from_parent(link_node);
            Ok(())
        }
        Err(error) => {
            dom.remove_from_parent(link_node);
            Err(error)
        }
    }
}

/// Fetch (if external) and evaluate one script, returning the global key it
/// assigned to, if any.
async fn run_script<E: JsEngine>(
    engine: &mut E,
    fetch_cache: &AssetCache,
    src: Option<Url>,
    inline: Option<String>,
) -> Result<Option<String>, QiankunError> {
    let (source, url) = match src {
        Some(url) => {
            let asset = fetch_cache.fetch_text(&url).await.map_err(|error| QiankunError::AssetFetchFailed {
                url: error.url.clone(),
                message: error.message.clone(),
            })?;
            (asset.body.clone(), url.to_string())
        }
        None => (inline.unwrap_or_default(), String::from("qiankun://inline-script")),
    };
    engine
        .eval_script(&source, &url)
        .map_err(|error| QiankunError::AssetFetchFailed { url: Url::parse(&url).unwrap_or_else(|_| url_placeholder()), message: error.to_string() })?;
    Ok(engine.last_global_assignment_key())
}

fn url_placeholder() -> Url {
    Url::parse("qiankun://unknown").unwrap_or_else(|_| unreachable!("static URL always parses"))
}

/// Fetch every async script concurrently, then evaluate them sequentially —
/// there's no worker-thread pool here (spec.md §5), so "overlapped I/O" is
/// as close as this runtime gets to the real concurrency a browser offers.
async fn run_async_scripts<E: JsEngine>(
    engine: &mut E,
    fetch_cache: &AssetCache,
    scripts: Vec<(Option<Url>, Option<String>)>,
    last_assigned: &mut Option<String>,
    deferred_errors: &mut Vec<QiankunError>,
) {
    let fetches = scripts.into_iter().map(|(src, inline)| async move {
        match src {
            Some(url) => match fetch_cache.fetch_text(&url).await {
                Ok(asset) => Ok((asset.body.clone(), url.to_string())),
                Err(error) => Err(QiankunError::AssetFetchFailed { url: error.url.clone(), message: error.message.clone() }),
            },
            None => Ok((inline.unwrap_or_default(), String::from("qiankun://inline-async-script"))),
        }
    });
    let resolved = futures::future::join_all(fetches).await;
    for result in resolved {
        match result {
            Ok((source, url)) => match engine.eval_script(&source, &url) {
                Ok(()) => *last_assigned = engine.last_global_assignment_key().or_else(|| last_assigned.take()),
                Err(error) => deferred_errors.push(QiankunError::AssetFetchFailed { url: url_placeholder(), message: error.to_string() }),
            },
            Err(error) => deferred_errors.push(error),
        }
    }
}

/// Drain the deferred-script queue (C5) in FIFO order once the document has
/// otherwise finished loading (spec.md §4.5).
async fn drain_deferred<E: JsEngine>(
    engine: &mut E,
    fetch_cache: &AssetCache,
    queue: &mut DeferredScriptQueue,
    last_assigned: &mut Option<String>,
    deferred_errors: &mut Vec<QiankunError>,
) {
    while let Some(script) = queue.pop_front() {
        let fetched = match &script.url {
            Some(raw) => match Url::parse(raw) {
                Ok(url) => match fetch_cache.fetch_text(&url).await {
                    Ok(asset) => Ok((asset.body.clone(), url.to_string())),
                    Err(error) => Err(QiankunError::AssetFetchFailed { url: error.url.clone(), message: error.message.clone() }),
                },
                Err(_) => Err(QiankunError::AssetFetchFailed { url: url_placeholder(), message: format!("invalid deferred script URL: {raw}") }),
            },
            None => Ok((script.inline_source.clone().unwrap_or_default(), String::from("qiankun://deferred-script"))),
        };
        match fetched {
            Ok((source, url)) => match engine.eval_script(&source, &url) {
                Ok(()) => *last_assigned = engine.last_global_assignment_key().or_else(|| last_assigned.take()),
                Err(error) => deferred_errors.push(QiankunError::AssetFetchFailed { url: url_placeholder(), message: error.to_string() }),
            },
            Err(error) => deferred_errors.push(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{load_entry, load_manifest, QiankunError};
    use anyhow::Result;
    use futures::future::FutureExt;
    use qiankun_dom::DOM;
    use qiankun_fetch::{AssetCache, CachedAsset};
    use qiankun_js::JsEngine;
    use qiankun_sandbox::{DeferredScriptQueue, LifecycleOutcome, LifecycleResultRegistry};
    use std::sync::{Arc, Mutex};
    use url::Url;

    /// A fake engine that evaluates nothing for real but mimics a well
    /// behaved entry bundle: any script assigns `window.probeApp`, and the
    /// lifecycle probe script (recognized by its `lifecycle.report` call)
    /// reports a valid library synchronously.
    struct FakeEngine {
        registry: Arc<Mutex<LifecycleResultRegistry>>,
        assigned: bool,
    }

    impl JsEngine for FakeEngine {
        fn eval_script(&mut self, source: &str, _url: &str) -> Result<()> {
            if source.contains("lifecycle.report") {
                if let Ok(mut guard) = self.registry.lock() {
                    guard.set(LifecycleOutcome::Ok(String::from("0")));
                }
            } else {
                self.assigned = true;
            }
            Ok(())
        }
        fn eval_module(&mut self, source: &str, url: &str) -> Result<()> {
            self.eval_script(source, url)
        }
        fn run_jobs(&mut self) -> Result<()> {
            Ok(())
        }
        fn last_global_assignment_key(&mut self) -> Option<String> {
            self.assigned.then(|| String::from("probeApp"))
        }
    }

    fn fetch_cache_serving(pages: Vec<(&'static str, &'static str)>) -> AssetCache {
        AssetCache::with_fetch_override(Arc::new(move |url: Url| {
            let body = pages
                .iter()
                .find(|(path, _)| url.as_str().ends_with(path))
                .map_or_else(String::new, |(_, body)| (*body).to_owned());
            async move { Ok(Arc::new(CachedAsset { body, content_type: None, url })) }.boxed()
        }))
    }

    #[tokio::test]
    async fn resolves_library_and_relocates_body_content() {
        let html = r#"<html><head><title>x</title></head><body><script entry src="main.js"></script><div id="root">hi</div></body></html>"#;
        let cache = fetch_cache_serving(vec![("entry.html", html), ("main.js", "window.probeApp = {};")]);
        let (mut dom, _rx) = DOM::new();
        let root = dom.root_key();
        let container = dom.new_element("div");
        dom.append_child(root, container);
        let head = dom.new_element("qiankun-host-head");
        dom.append_child(root, head);

        let registry = Arc::new(Mutex::new(LifecycleResultRegistry::default()));
        let mut engine = FakeEngine { registry: Arc::clone(&registry), assigned: false };
        let mut queue = DeferredScriptQueue::new();
        let entry_url = Url::parse("https://host.example/app/entry.html").unwrap();

        let resolved = load_entry(
            &mut engine,
            &registry,
            &cache,
            &mut queue,
            &mut dom,
            container,
            Some(head),
            &entry_url,
            "probeApp",
            None,
            None,
            None,
        )
        .await
        .expect("entry resolves");

        assert_eq!(resolved.library_name, "probeApp");
        assert!(!resolved.has_update);
        assert!(resolved.deferred_errors.is_empty());

        let container_children = dom.children_of(container);
        assert!(container_children.iter().any(|&key| dom.tag_of(key).as_deref() == Some("div")));
        let head_children = dom.children_of(head);
        assert!(head_children.iter().any(|&key| dom.tag_of(key).as_deref() == Some("title")));
    }

    #[tokio::test]
    async fn missing_entry_library_is_reported() {
        let html = "<html><body><p>no scripts here</p></body></html>";
        let cache = fetch_cache_serving(vec![("entry.html", html)]);
        let (mut dom, _rx) = DOM::new();
        let root = dom.root_key();
        let container = dom.new_element("div");
        dom.append_child(root, container);

        let registry = Arc::new(Mutex::new(LifecycleResultRegistry::default()));
        let mut engine = FakeEngine { registry: Arc::clone(&registry), assigned: false };
        let mut queue = DeferredScriptQueue::new();
        let entry_url = Url::parse("https://host.example/app/entry.html").unwrap();

        let result = load_entry(
            &mut engine, &registry, &cache, &mut queue, &mut dom, container, None, &entry_url, "probeApp", None, None, None,
        )
        .await;

        assert!(matches!(result, Err(QiankunError::EntryMissingLifecycle { app }) if app == "probeApp"));
    }

    #[tokio::test]
    async fn manifest_entry_runs_scripts_in_order_and_inlines_styles() {
        let cache = fetch_cache_serving(vec![("style.css", ".a { color: red; }"), ("main.js", "window.probeApp = {};")]);
        let (mut dom, _rx) = DOM::new();
        let root = dom.root_key();
        let head = dom.new_element("qiankun-host-head");
        dom.append_child(root, head);

        let registry = Arc::new(Mutex::new(LifecycleResultRegistry::default()));
        let mut engine = FakeEngine { registry: Arc::clone(&registry), assigned: false };
        let scripts = vec![Url::parse("https://host.example/app/main.js").unwrap()];
        let styles = vec![Url::parse("https://host.example/app/style.css").unwrap()];

        let resolved = load_manifest(&mut engine, &registry, &cache, &mut dom, Some(head), &scripts, &styles, "probeApp", None)
            .await
            .expect("manifest resolves");

        assert_eq!(resolved.library_name, "probeApp");
        assert!(resolved.deferred_errors.is_empty());
        let head_children = dom.children_of(head);
        assert!(head_children.iter().any(|&key| dom.tag_of(key).as_deref() == Some("style")));
    }

    #[tokio::test]
    async fn manifest_entry_without_scripts_reports_missing_lifecycle() {
        let cache = fetch_cache_serving(vec![]);
        let (mut dom, _rx) = DOM::new();

        let registry = Arc::new(Mutex::new(LifecycleResultRegistry::default()));
        let mut engine = FakeEngine { registry: Arc::clone(&registry), assigned: false };

        let result = load_manifest(&mut engine, &registry, &cache, &mut dom, None, &[], &[], "probeApp", None).await;

        assert!(matches!(result, Err(QiankunError::EntryMissingLifecycle { app }) if app == "probeApp"));
    }
}
