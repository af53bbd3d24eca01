//! Whitespace and comment stripping for stylesheets and scripts.
//!
//! Both minifiers are lexical: they never rename, reorder or fold anything.
//! String literals (and, for scripts, template and regex literals) pass
//! through untouched.
//!
//! The script minifier keeps line breaks so automatic semicolon insertion
//! sees the same token stream as the source did.

/// Bump when either minifier's output changes, so cached files are rebuilt.
pub const MINIFIER_VERSION: u32 = 1;

/// Characters around which CSS whitespace is insignificant.
fn css_tight(c: char) -> bool {
    matches!(c, '{' | '}' | ';' | ',')
}

/// Minify a stylesheet.
///
/// Drops comments, collapses whitespace runs, removes whitespace next to
/// `{ } ; ,` and the last `;` of each block.
pub fn minify_css(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut pending_space = false;

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
                pending_space = true;
            }
            '"' | '\'' => {
                flush_space(&mut out, &mut pending_space, c);
                out.push(c);
                copy_quoted(&mut chars, &mut out, c);
            }
            c if c.is_whitespace() => pending_space = true,
            '}' => {
                pending_space = false;
                if out.ends_with(';') {
                    out.pop();
                }
                out.push('}');
            }
            c => {
                flush_space(&mut out, &mut pending_space, c);
                out.push(c);
            }
        }
    }
    out
}

fn flush_space(out: &mut String, pending: &mut bool, next: char) {
    if *pending {
        let after_tight = out.chars().last().is_none_or(css_tight);
        if !after_tight && !css_tight(next) {
            out.push(' ');
        }
        *pending = false;
    }
}

/// Copy the rest of a quoted literal, escapes included, up to and
/// including the closing `quote`.
fn copy_quoted(chars: &mut impl Iterator<Item = char>, out: &mut String, quote: char) {
    let mut escaped = false;
    for n in chars {
        out.push(n);
        if escaped {
            escaped = false;
        } else if n == '\\' {
            escaped = true;
        } else if n == quote || n == '\n' {
            break;
        }
    }
}

const REGEX_KEYWORDS: [&str; 13] = [
    "return", "typeof", "case", "do", "else", "in", "of", "new", "delete", "void", "throw",
    "yield", "await",
];

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Whether a `/` at this point starts a regex literal rather than a division.
fn regex_allowed(out: &str) -> bool {
    let trimmed = out.trim_end();
    let Some(last) = trimmed.chars().last() else {
        return true;
    };
    if last == ')' || last == ']' || last == '}' {
        return false;
    }
    if is_ident(last) {
        let word_start = trimmed
            .char_indices()
            .rev()
            .find(|(_, c)| !is_ident(*c))
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        return REGEX_KEYWORDS.contains(&&trimmed[word_start..]);
    }
    true
}

/// Minify a script.
///
/// Drops `//` and `/* */` comments, trims every line, collapses interior
/// whitespace runs to one space and removes blank lines. Strings, template
/// literals (with nested `${}` expressions) and regex literals are copied
/// verbatim.
pub fn minify_js(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut pending_space = false;
    // Brace depth of each open `${` inside a template literal.
    let mut templates: Vec<usize> = Vec::new();
    let mut depth = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'/') => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        break;
                    }
                }
                end_line(&mut out, &mut pending_space);
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                let mut newline = false;
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    newline |= n == '\n';
                    prev = n;
                }
                if newline {
                    end_line(&mut out, &mut pending_space);
                } else {
                    pending_space = true;
                }
            }
            '/' if regex_allowed(&out) => {
                push_space(&mut out, &mut pending_space);
                out.push('/');
                let mut escaped = false;
                let mut class = false;
                for n in chars.by_ref() {
                    out.push(n);
                    match n {
                        _ if escaped => escaped = false,
                        '\\' => escaped = true,
                        '[' => class = true,
                        ']' => class = false,
                        '/' if !class => break,
                        '\n' => break,
                        _ => {}
                    }
                }
            }
            '"' | '\'' => {
                push_space(&mut out, &mut pending_space);
                out.push(c);
                copy_quoted(&mut chars, &mut out, c);
            }
            '`' => {
                push_space(&mut out, &mut pending_space);
                out.push('`');
                if copy_template(&mut chars, &mut out) {
                    templates.push(depth);
                }
            }
            '{' => {
                push_space(&mut out, &mut pending_space);
                depth += 1;
                out.push('{');
            }
            '}' => {
                push_space(&mut out, &mut pending_space);
                if templates.last() == Some(&depth) {
                    templates.pop();
                    out.push('}');
                    if copy_template(&mut chars, &mut out) {
                        templates.push(depth);
                    }
                } else {
                    depth = depth.saturating_sub(1);
                    out.push('}');
                }
            }
            '\n' => end_line(&mut out, &mut pending_space),
            c if c.is_whitespace() => pending_space = true,
            c => {
                push_space(&mut out, &mut pending_space);
                out.push(c);
            }
        }
    }
    while out.ends_with('\n') {
        out.pop();
    }
    out
}

/// Copy template text up to the closing backtick or an opening `${`.
/// Returns true when stopped at `${`.
fn copy_template(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, out: &mut String) -> bool {
    let mut escaped = false;
    while let Some(n) = chars.next() {
        out.push(n);
        if escaped {
            escaped = false;
            continue;
        }
        match n {
            '\\' => escaped = true,
            '`' => return false,
            '$' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
                return true;
            }
            _ => {}
        }
    }
    false
}

fn push_space(out: &mut String, pending: &mut bool) {
    if *pending {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push(' ');
        }
        *pending = false;
    }
}

fn end_line(out: &mut String, pending: &mut bool) {
    *pending = false;
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}
