//! Text-level CSS transforms used while loading a micro app's stylesheets:
//! rewriting `url(...)` references against the entry's base URL, and scoping
//! selectors to an app's container element when `experimentalStyleIsolation`
//! is enabled.
//!
//! Earlier revisions of this crate carried a full cascade engine (stylesheet
//! parsing into `Rule`/`Declaration` ASTs, specificity-sorted resolution).
//! Qiankun never computes layout or resolves cascades — the runtime hosts a
//! real browser, which does that. What it needs before an app's CSS reaches
//! that browser is two bounded text rewrites, so this crate works directly
//! on CSS source text via `cssparser`'s tokenizer rather than building and
//! re-serializing an AST.

mod scope;
mod url_rewrite;

pub use scope::scope_stylesheet;
pub use url_rewrite::rewrite_urls;
