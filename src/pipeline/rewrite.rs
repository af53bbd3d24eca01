//! HTML reference rewriting.
//!
//! Points stylesheet and script references at their minified builds:
//!
//! ```text
//! href="css/pages/home.css"     → href="css/pages/home.min.css"
//! src="js/modules/gallery.js"   → src="js/modules/gallery.min.js"
//! ```
//!
//! Only double-quoted, root-relative `css/` and `js/` values are touched.
//! Values that already end in `.min.css` / `.min.js` are left alone.

struct Rule {
    attr: &'static str,
    prefix: &'static str,
    ext: &'static str,
    min_ext: &'static str,
}

const RULES: [Rule; 2] = [
    Rule {
        attr: "href",
        prefix: "css/",
        ext: ".css",
        min_ext: ".min.css",
    },
    Rule {
        attr: "src",
        prefix: "js/",
        ext: ".js",
        min_ext: ".min.js",
    },
];

/// Rewrite every matching reference. Returns the new document and the number
/// of references changed.
pub fn rewrite_references(html: &str) -> (String, usize) {
    let mut current = html.to_string();
    let mut total = 0;
    for rule in &RULES {
        let (next, n) = apply(&current, rule);
        current = next;
        total += n;
    }
    (current, total)
}

fn apply(html: &str, rule: &Rule) -> (String, usize) {
    let needle = format!("{}=\"", rule.attr);
    let mut out = String::with_capacity(html.len() + 64);
    let mut rest = html;
    let mut count = 0;

    while let Some(pos) = rest.find(&needle) {
        let value_start = pos + needle.len();
        let standalone = rest[..pos]
            .chars()
            .next_back()
            .is_none_or(|c| c.is_whitespace());
        out.push_str(&rest[..value_start]);
        rest = &rest[value_start..];

        let Some(end) = rest.find('"') else {
            break;
        };
        let value = &rest[..end];
        let eligible = standalone
            && value.starts_with(rule.prefix)
            && value.len() > rule.prefix.len() + rule.ext.len()
            && value.ends_with(rule.ext)
            && !value.ends_with(rule.min_ext);
        if eligible {
            out.push_str(&value[..value.len() - rule.ext.len()]);
            out.push_str(rule.min_ext);
            count += 1;
        } else {
            out.push_str(value);
        }
        rest = &rest[end..];
    }
    out.push_str(rest);
    (out, count)
}
