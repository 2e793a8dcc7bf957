use crate::dom::DOM;
use html5ever::parse_document;
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::tree_builder::{ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::{Attribute, Parser};
use markup5ever::{expanded_name, local_name, namespace_url, ns, ExpandedName, QualName};
use qiankun_js::{DOMUpdate, NodeKey};

static EXPANDED_HTML_DIV: ExpandedName = expanded_name!(html "div");

/// `TreeSink` implementation writing directly into a `qiankun_dom::DOM`.
/// Node handles are the DOM's own `NodeKey`, so nothing further needs to be
/// mapped once parsing finishes.
pub struct QiankunSink<'dom> {
    dom: &'dom mut DOM,
}

impl<'dom> QiankunSink<'dom> {
    pub fn new(dom: &'dom mut DOM) -> Self {
        Self { dom }
    }
}

impl<'dom> TreeSink for QiankunSink<'dom> {
    type Handle = NodeKey;
    type Output = ();

    fn finish(self) -> Self::Output {}

    fn parse_error(&mut self, _msg: std::borrow::Cow<'static, str>) {}

    fn get_document(&mut self) -> Self::Handle {
        self.dom.root_key()
    }

    fn elem_name(&self, _target: &Self::Handle) -> ExpandedName<'_> {
        EXPANDED_HTML_DIV
    }

    fn create_element(
        &mut self,
        name: QualName,
        attrs: Vec<Attribute>,
        _flags: ElementFlags,
    ) -> Self::Handle {
        let id = self.dom.new_element(&name.local);
        for attr in attrs {
            self.dom
                .set_attr(id, &attr.name.local, attr.value.as_ref());
        }
        id
    }

    fn create_comment(&mut self, text: StrTendril) -> Self::Handle {
        self.dom.new_text(&text)
    }

    fn create_pi(&mut self, _target: StrTendril, data: StrTendril) -> Self::Handle {
        self.dom.new_text(&data)
    }

    fn append(&mut self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        match child {
            NodeOrText::AppendNode(node) => self.dom.append_child(*parent, node),
            NodeOrText::AppendText(text) => {
                let node = self.dom.new_text(&text);
                self.dom.append_child(*parent, node);
            }
        }
    }

    fn append_based_on_parent_node(
        &mut self,
        _element: &Self::Handle,
        _prev_element: &Self::Handle,
        new_node: NodeOrText<Self::Handle>,
    ) {
        let parent = self.get_document();
        match new_node {
            NodeOrText::AppendNode(node) => self.dom.append_child(parent, node),
            NodeOrText::AppendText(text) => {
                let node = self.dom.new_text(&text);
                self.dom.append_child(parent, node);
            }
        }
    }

    fn append_doctype_to_document(
        &mut self,
        _name: StrTendril,
        _public_id: StrTendril,
        _system_id: StrTendril,
    ) {
    }

    fn mark_script_already_started(&mut self, _node: &Self::Handle) {}

    fn pop(&mut self, _node: &Self::Handle) {}

    fn get_template_contents(&mut self, target: &Self::Handle) -> Self::Handle {
        *target
    }

    fn same_node(&self, x: &Self::Handle, y: &Self::Handle) -> bool {
        x == y
    }

    fn set_quirks_mode(&mut self, _mode: QuirksMode) {}

    fn append_before_sibling(&mut self, sibling: &Self::Handle, new_node: NodeOrText<Self::Handle>) {
        match new_node {
            NodeOrText::AppendNode(node) => self.dom.insert_before(*sibling, node),
            NodeOrText::AppendText(text) => {
                let node = self.dom.new_text(&text);
                self.dom.insert_before(*sibling, node);
            }
        }
    }

    fn add_attrs_if_missing(&mut self, target: &Self::Handle, attrs: Vec<Attribute>) {
        for attr in attrs {
            let name = attr.name.local.to_string();
            if !self.dom.has_attr(*target, &name) {
                self.dom.set_attr(*target, &name, attr.value.as_ref());
            }
        }
    }

    fn remove_from_parent(&mut self, target: &Self::Handle) {
        self.dom.remove_from_parent(*target);
    }

    fn reparent_children(&mut self, node: &Self::Handle, new_parent: &Self::Handle) {
        self.dom.reparent_children(*node, *new_parent);
    }

    fn is_mathml_annotation_xml_integration_point(&self, _handle: &Self::Handle) -> bool {
        false
    }
}

/// Drives `html5ever`'s incremental parser chunk by chunk, exactly as
/// `crates/html/src/parser/html5ever_engine.rs`'s `Html5everEngine::push`
/// does, except the sink writes straight into `qiankun_dom::DOM` using
/// `NodeKey` handles.
pub struct Html5everEngine<'dom> {
    parser: Parser<QiankunSink<'dom>>,
}

impl<'dom> Html5everEngine<'dom> {
    pub fn new(dom: &'dom mut DOM) -> Self {
        let sink = QiankunSink::new(dom);
        let parser = parse_document(sink, Default::default());
        Self { parser }
    }

    /// The DOM being built, for callers that need to inspect or further
    /// mutate nodes just reported by [`Self::push`]/[`Self::finalize`]
    /// (the node transformer, C2, runs this way rather than through the
    /// `TreeSink` itself).
    pub fn dom_mut(&mut self) -> &mut DOM {
        self.parser.tokenizer.sink.sink.dom
    }

    /// Feed one chunk of HTML text into the parser, broadcasting the
    /// resulting `DOMUpdate` batch to subscribers once applied, and
    /// returning it so a caller (the streaming loader) can walk exactly the
    /// nodes that just appeared, in document order.
    pub fn push(&mut self, chunk: &str) -> Vec<DOMUpdate> {
        self.parser.process(StrTendril::from(chunk));
        self.dom_mut().finish_update()
    }

    /// Signal end-of-stream and flush the final `EndOfDocument` marker.
    pub fn finalize(mut self) -> Vec<DOMUpdate> {
        self.parser.tokenizer.end();
        self.dom_mut().push_update(DOMUpdate::EndOfDocument);
        self.dom_mut().finish_update()
    }
}
