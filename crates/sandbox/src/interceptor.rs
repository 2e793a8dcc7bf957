//! Explicit interceptor registry (spec.md §9 REDESIGN FLAGS: "Prototype
//! patching of global and document → explicit interceptor registry. Keep a
//! per-sandbox table `{ target, property, original, replacement }`; `active`
//! installs from the table; `inactive` uninstalls deterministically.").
//!
//! This replaces the brittle direct monkey-patch pattern the original
//! `window.foo = patchedFoo` / `delete window.foo` dance relies on with a
//! data table a sandbox can install and uninstall against in one
//! deterministic pass, instead of threading through ad hoc save/restore
//! logic at every patch site.

use std::collections::HashMap;

use crate::values::JSValue;

/// Which map an interception target lives in — `Window`/`Document` are the
/// only two global-ish objects spec.md's sandbox touches.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InterceptTarget {
    Window,
    Document,
}

/// A single `{ target, property, original, replacement }` row.
#[derive(Clone, Debug)]
pub struct Interceptor {
    pub target: InterceptTarget,
    pub property: String,
    pub original: Option<JSValue>,
    pub replacement: JSValue,
}

/// The per-sandbox table. Rows are installed in registration order on
/// `install_all` and uninstalled in reverse on `uninstall_all`, so a later
/// patch that shadows an earlier one unwinds correctly.
#[derive(Default)]
pub struct InterceptorRegistry {
    rows: Vec<Interceptor>,
}

impl InterceptorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, target: InterceptTarget, property: impl Into<String>, original: Option<JSValue>, replacement: JSValue) {
        self.rows.push(Interceptor { target, property: property.into(), original, replacement });
    }

    /// Apply every row's `replacement` into `window`/`document` value maps.
    pub fn install_all(&self, window: &mut HashMap<String, JSValue>, document: &mut HashMap<String, JSValue>) {
        for row in &self.rows {
            let map = match row.target {
                InterceptTarget::Window => &mut *window,
                InterceptTarget::Document => &mut *document,
            };
            map.insert(row.property.clone(), row.replacement.clone());
        }
    }

    /// Restore every row's `original` (or remove the property if there was
    /// none), in reverse registration order.
    pub fn uninstall_all(&self, window: &mut HashMap<String, JSValue>, document: &mut HashMap<String, JSValue>) {
        for row in self.rows.iter().rev() {
            let map = match row.target {
                InterceptTarget::Window => &mut *window,
                InterceptTarget::Document => &mut *document,
            };
            match &row.original {
                Some(value) => {
                    map.insert(row.property.clone(), value.clone());
                }
                None => {
                    map.remove(&row.property);
                }
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_then_uninstall_restores_prior_value() {
        let mut registry = InterceptorRegistry::new();
        registry.register(
            InterceptTarget::Window,
            "setTimeout",
            Some(JSValue::String(String::from("native-setTimeout"))),
            JSValue::String(String::from("patched-setTimeout")),
        );
        let mut window = HashMap::new();
        let mut document = HashMap::new();

        registry.install_all(&mut window, &mut document);
        assert_eq!(window.get("setTimeout"), Some(&JSValue::String(String::from("patched-setTimeout"))));

        registry.uninstall_all(&mut window, &mut document);
        assert_eq!(window.get("setTimeout"), Some(&JSValue::String(String::from("native-setTimeout"))));
    }

    #[test]
    fn uninstall_removes_property_that_had_no_original() {
        let mut registry = InterceptorRegistry::new();
        registry.register(InterceptTarget::Document, "__qiankunProbe", None, JSValue::Boolean(true));
        let mut window = HashMap::new();
        let mut document = HashMap::new();

        registry.install_all(&mut window, &mut document);
        registry.uninstall_all(&mut window, &mut document);
        assert!(!document.contains_key("__qiankunProbe"));
    }
}
