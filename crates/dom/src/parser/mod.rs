//! HTML parsing: a thin, synchronous wrapper around `html5ever`'s
//! incremental parser writing directly into a `qiankun_dom::DOM`.
//!
//! Chunk-by-chunk driving, and the transform/fetch/script walk over the
//! nodes each chunk produces, live in `qiankun_loader`, which is the actual
//! owner of the entry-loading pipeline (C3).

mod html5ever_engine;

pub use html5ever_engine::Html5everEngine;
