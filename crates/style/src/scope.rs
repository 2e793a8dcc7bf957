use cssparser::{Delimiter, Parser, ParserInput};

/// Scope every top-level selector in `css` to `attr_selector` (an attribute
/// selector such as `[data-qiankun-app="cart"]`), for `experimentalStyleIsolation`.
///
/// At-rule blocks (`@media`, `@keyframes`, ...) are copied through verbatim:
/// their preludes aren't selector lists (`@keyframes` children are
/// percentages, not selectors) and scoping inside `@media` would require
/// walking its nested rules separately. Only rules at the stylesheet's own
/// top level get scoped, which covers the common case of a micro app
/// shipping a flat stylesheet.
#[must_use]
pub fn scope_stylesheet(css: &str, attr_selector: &str) -> String {
    let chars: Vec<char> = css.chars().collect();
    let len = chars.len();
    let mut out = String::with_capacity(css.len() + 64);
    let mut segment = String::new();
    let mut depth: u32 = 0;
    let mut i = 0;

    while i < len {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                i = copy_string(&chars, i, &mut segment);
            }
            '/' if i + 1 < len && chars[i + 1] == '*' => {
                i = copy_comment(&chars, i, &mut segment);
            }
            ';' if depth == 0 && segment.trim_start().starts_with('@') => {
                out.push_str(segment.trim_start());
                out.push(';');
                segment.clear();
                i += 1;
            }
            '{' if depth == 0 => {
                if segment.trim_start().starts_with('@') {
                    out.push_str(&segment);
                } else {
                    out.push_str(&scope_prelude(&segment, attr_selector));
                }
                out.push('{');
                segment.clear();
                depth = 1;
                i += 1;
            }
            '{' => {
                segment.push('{');
                depth += 1;
                i += 1;
            }
            '}' if depth == 1 => {
                out.push_str(&segment);
                out.push('}');
                segment.clear();
                depth = 0;
                i += 1;
            }
            '}' => {
                segment.push('}');
                depth = depth.saturating_sub(1);
                i += 1;
            }
            _ => {
                segment.push(c);
                i += 1;
            }
        }
    }
    out.push_str(segment.trim());
    out
}

fn copy_string(chars: &[char], i: usize, out: &mut String) -> usize {
    let quote = chars[i];
    out.push(quote);
    let mut j = i + 1;
    while j < chars.len() {
        let c = chars[j];
        out.push(c);
        j += 1;
        if c == '\\' && j < chars.len() {
            out.push(chars[j]);
            j += 1;
            continue;
        }
        if c == quote {
            break;
        }
    }
    j
}

fn copy_comment(chars: &[char], i: usize, out: &mut String) -> usize {
    out.push_str("/*");
    let mut j = i + 2;
    while j + 1 < chars.len() && !(chars[j] == '*' && chars[j + 1] == '/') {
        out.push(chars[j]);
        j += 1;
    }
    if j + 1 < chars.len() {
        out.push_str("*/");
        j += 2;
    }
    j
}

/// Appends `attr_selector` to the rightmost compound selector of each
/// comma-separated selector in `prelude`.
fn scope_prelude(prelude: &str, attr_selector: &str) -> String {
    split_top_level_commas(prelude)
        .into_iter()
        .map(|selector| append_scope(&selector, attr_selector))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Splits a selector list on commas that are not nested inside parentheses
/// (as in `:not(a, b)`), using `cssparser`'s delimiter-aware parsing so
/// nested functional pseudo-classes aren't split incorrectly.
fn split_top_level_commas(selectors: &str) -> Vec<String> {
    let mut input = ParserInput::new(selectors);
    let mut parser = Parser::new(&mut input);
    let mut parts = Vec::new();

    loop {
        let start = parser.position();
        let _ = parser.parse_until_before::<_, (), ()>(Delimiter::Comma, |nested| {
            while nested.next_including_whitespace_and_comments().is_ok() {}
            Ok(())
        });
        let end = parser.position();
        parts.push(parser.slice(start..end).trim().to_owned());
        if parser.is_exhausted() {
            break;
        }
        let _ = parser.next_including_whitespace_and_comments();
    }
    parts.into_iter().filter(|s| !s.is_empty()).collect()
}

/// Inserts `attr_selector` just before a trailing `::pseudo-element` (which
/// must stay last in a compound selector), or at the end otherwise.
fn append_scope(selector: &str, attr_selector: &str) -> String {
    let trimmed = selector.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    trimmed.rfind("::").map_or_else(
        || format!("{trimmed}{attr_selector}"),
        |pos| format!("{}{attr_selector}{}", &trimmed[..pos], &trimmed[pos..]),
    )
}

#[cfg(test)]
mod tests {
    use super::scope_stylesheet;

    const ATTR: &str = "[data-qiankun-app=\"cart\"]";

    #[test]
    fn scopes_simple_selector() {
        let out = scope_stylesheet(".title { color: red; }", ATTR);
        assert_eq!(out, ".title[data-qiankun-app=\"cart\"] { color: red; }");
    }

    #[test]
    fn scopes_each_comma_separated_selector() {
        let out = scope_stylesheet("h1, h2 { margin: 0; }", ATTR);
        assert_eq!(
            out,
            "h1[data-qiankun-app=\"cart\"], h2[data-qiankun-app=\"cart\"] { margin: 0; }"
        );
    }

    #[test]
    fn keeps_pseudo_element_trailing() {
        let out = scope_stylesheet(".list::before { content: \"x\"; }", ATTR);
        assert_eq!(
            out,
            ".list[data-qiankun-app=\"cart\"]::before { content: \"x\"; }"
        );
    }

    #[test]
    fn does_not_split_commas_inside_not() {
        let out = scope_stylesheet(".a:not(.b, .c) { color: blue; }", ATTR);
        assert_eq!(
            out,
            ".a:not(.b, .c)[data-qiankun-app=\"cart\"] { color: blue; }"
        );
    }

    #[test]
    fn leaves_media_query_block_unscoped() {
        let css = "@media (min-width: 400px) { .title { color: red; } }";
        let out = scope_stylesheet(css, ATTR);
        assert_eq!(out, css);
    }

    #[test]
    fn leaves_keyframes_unscoped() {
        let css = "@keyframes spin { from { opacity: 0; } to { opacity: 1; } }";
        let out = scope_stylesheet(css, ATTR);
        assert_eq!(out, css);
    }
}
