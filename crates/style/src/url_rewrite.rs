use url::Url;

/// Rewrite every `url(...)` reference in `css` to an absolute URL resolved
/// against `base`. Data URLs and already-absolute URLs pass through
/// unchanged (`Url::join` on an absolute URL just returns it).
///
/// Runs as a single pass over the source characters rather than a full
/// `cssparser` tokenization: the only thing this needs to recognize
/// correctly is string and comment boundaries, so a function token scan
/// is enough and avoids re-serializing the rest of the stylesheet.
#[must_use]
pub fn rewrite_urls(css: &str, base: &Url) -> String {
    let chars: Vec<char> = css.chars().collect();
    let len = chars.len();
    let mut out = String::with_capacity(css.len());
    let mut i = 0;

    while i < len {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                i = copy_string(&chars, i, &mut out);
            }
            '/' if i + 1 < len && chars[i + 1] == '*' => {
                i = copy_comment(&chars, i, &mut out);
            }
            'u' | 'U' if is_url_function_start(&chars, i) => {
                i = rewrite_url_function(&chars, i, base, &mut out);
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn is_url_function_start(chars: &[char], i: usize) -> bool {
    let len = chars.len();
    if i > 0 {
        let prev = chars[i - 1];
        if prev.is_alphanumeric() || prev == '_' || prev == '-' {
            return false;
        }
    }
    let word: String = chars[i..(i + 3).min(len)].iter().collect();
    if !word.eq_ignore_ascii_case("url") {
        return false;
    }
    chars[(i + 3)..].iter().find(|c| !c.is_whitespace()) == Some(&'(')
}

/// Copies a quoted string (handling backslash escapes) starting at `i`
/// (which must point at the opening quote) into `out`, returning the index
/// just past the closing quote.
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

/// Rewrites one `url(...)` token starting at `i` (which points at the `u`
/// of `url`), returning the index just past the closing `)`.
fn rewrite_url_function(chars: &[char], i: usize, base: &Url, out: &mut String) -> usize {
    let mut j = i + 3;
    while j < chars.len() && chars[j].is_whitespace() {
        j += 1;
    }
    debug_assert_eq!(chars.get(j), Some(&'('));
    j += 1;
    while j < chars.len() && chars[j].is_whitespace() {
        j += 1;
    }

    let mut raw = String::new();
    if matches!(chars.get(j), Some('"') | Some('\'')) {
        let quote = chars[j];
        j += 1;
        while j < chars.len() && chars[j] != quote {
            raw.push(chars[j]);
            j += 1;
        }
        if j < chars.len() {
            j += 1;
        }
    } else {
        while j < chars.len() && chars[j] != ')' {
            raw.push(chars[j]);
            j += 1;
        }
    }
    while j < chars.len() && chars[j].is_whitespace() {
        j += 1;
    }
    if chars.get(j) == Some(&')') {
        j += 1;
    }

    let value = raw.trim();
    let resolved = if value.is_empty() || value.starts_with("data:") {
        value.to_owned()
    } else {
        base.join(value)
            .map_or_else(|_| value.to_owned(), |u| u.to_string())
    };
    out.push_str("url(\"");
    out.push_str(&resolved.replace('\\', "\\\\").replace('"', "\\\""));
    out.push_str("\")");
    j
}

#[cfg(test)]
mod tests {
    use super::rewrite_urls;
    use url::Url;

    fn base() -> Url {
        Url::parse("https://micro.example.com/apps/cart/").unwrap()
    }

    #[test]
    fn rewrites_unquoted_relative_url() {
        let css = ".bg { background: url(img/sprite.png) no-repeat; }";
        let out = rewrite_urls(css, &base());
        assert!(
            out.contains("url(\"https://micro.example.com/apps/cart/img/sprite.png\")"),
            "{out}"
        );
    }

    #[test]
    fn rewrites_quoted_relative_url() {
        let css = "@font-face { src: url('fonts/a.woff2') format('woff2'); }";
        let out = rewrite_urls(css, &base());
        assert!(
            out.contains("url(\"https://micro.example.com/apps/cart/fonts/a.woff2\")"),
            "{out}"
        );
        assert!(out.contains("format('woff2')"));
    }

    #[test]
    fn leaves_data_urls_untouched() {
        let css = ".icon { background: url(data:image/png;base64,AAAA); }";
        let out = rewrite_urls(css, &base());
        assert!(out.contains("url(\"data:image/png;base64,AAAA\")"));
    }

    #[test]
    fn does_not_match_identifier_ending_in_url() {
        let css = ".myurl(x) { color: red; }";
        let out = rewrite_urls(css, &base());
        assert_eq!(out, css);
    }
}
