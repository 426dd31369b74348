use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static TAG_OR_TEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>|[^<]+|<").expect("valid regex"));
static TAG_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^<\s*(/?)\s*([A-Za-z][A-Za-z0-9-]*)").expect("valid regex"));
static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z][A-Za-z0-9]*);").expect("valid regex"));
static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+").expect("valid regex"));
static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$").expect("valid regex"));
static BARE_DOMAIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9.-]*\.(com|edu|gov|int|mil|net|org)(/\S*)?$").expect("valid regex"));

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr",
];

const NAMED_ENTITIES: &[(&str, char)] = &[
    ("amp", '&'),
    ("lt", '<'),
    ("gt", '>'),
    ("quot", '"'),
    ("apos", '\''),
    ("nbsp", '\u{a0}'),
    ("copy", '©'),
    ("reg", '®'),
    ("trade", '™'),
    ("hellip", '…'),
    ("mdash", '—'),
    ("ndash", '–'),
    ("lsquo", '‘'),
    ("rsquo", '’'),
    ("ldquo", '“'),
    ("rdquo", '”'),
    ("laquo", '«'),
    ("raquo", '»'),
    ("bull", '•'),
    ("middot", '·'),
    ("deg", '°'),
    ("times", '×'),
    ("divide", '÷'),
    ("euro", '€'),
    ("pound", '£'),
    ("yen", '¥'),
    ("cent", '¢'),
    ("sect", '§'),
    ("para", '¶'),
];

fn escape_char(c: char, out: &mut String) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        '\'' => out.push_str("&#x27;"),
        _ => out.push(c),
    }
}

/// Escapes HTML special characters, even ones that already are escaped.
pub(super) fn force_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        escape_char(c, &mut out);
    }
    out
}

/// Escapes HTML special characters without double-escaping existing
/// `&lt;`/`&gt;`/`&amp;`/`&quot;`/`&#x27;` entities.
pub(super) fn escape(s: &str) -> String {
    let plain = s
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'");
    force_escape(&plain)
}

pub(super) fn escape_js(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' | '\'' | '"' | '>' | '<' | '&' | '=' | '-' | ';' | '`' | '\u{2028}' | '\u{2029}' => {
                out.push_str(&format!("\\u{:04X}", c as u32));
            }
            c if (c as u32) < 32 => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

pub(super) fn unescape(s: &str) -> String {
    ENTITY
        .replace_all(s, |caps: &Captures| {
            let body = &caps[1];
            let decoded = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                NAMED_ENTITIES.iter().find(|(name, _)| *name == body).map(|(_, c)| *c)
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

pub(super) fn line_breaks(s: &str, paragraph: &str, line: &str) -> String {
    let text = if paragraph == "\n\n" {
        s.replace("\\n\\n", "\n\n")
    } else {
        s.to_string()
    };
    text.split(paragraph)
        .map(|p| format!("<p>{}</p>", line_breaks_br(p, line)))
        .collect()
}

pub(super) fn line_breaks_br(s: &str, line: &str) -> String {
    let text = if line == "\n" { s.replace("\\n", "\n") } else { s.to_string() };
    text.replace(line, "<br>")
}

pub(super) fn strip_tags(s: &str) -> String {
    let mut text = s.to_string();
    loop {
        let stripped = TAG.replace_all(&text, "").into_owned();
        if stripped == text {
            return text;
        }
        text = stripped;
    }
}

/// Percent-encodes everything except ASCII alphanumerics, `_.-~` and the
/// characters in `safe`.
pub(super) fn percent_encode(s: &str, safe: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() || "_.-~".contains(c) || (c.is_ascii() && safe.contains(c)) {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    out
}

pub(super) fn iri_encode(s: &str) -> String {
    percent_encode(s, "/#%[]=:;$&()+,!?*@'~")
}

fn trim_url(text: &str, limit: Option<i64>) -> String {
    match limit {
        Some(limit) if text.chars().count() as i64 > limit => {
            let keep = usize::try_from(limit.max(1) - 1).unwrap_or(0);
            let mut trimmed: String = text.chars().take(keep).collect();
            trimmed.push('…');
            trimmed
        }
        _ => text.to_string(),
    }
}

/// Turns URLs and e-mail addresses in plain text into links. With `limit`
/// the link text is shortened to that many characters.
pub(super) fn urlize(s: &str, limit: Option<i64>) -> String {
    const LEADING: &[char] = &['(', '<', '[', '"', '\''];
    const TRAILING: &[char] = &['.', ',', ':', ';', '!', ')', '>', ']', '"', '\''];

    WORD.replace_all(s, |caps: &Captures| {
        let word = &caps[0];
        let core_start = word.len() - word.trim_start_matches(LEADING).len();
        let core = word[core_start..].trim_end_matches(TRAILING);
        let (lead, trail) = (&word[..core_start], &word[core_start + core.len()..]);

        let lower = core.to_lowercase();
        let link = if lower.starts_with("http://") || lower.starts_with("https://") {
            Some(format!(
                "<a href=\"{}\" rel=\"nofollow\">{}</a>",
                escape(core),
                escape(&trim_url(core, limit))
            ))
        } else if lower.starts_with("www.") || BARE_DOMAIN.is_match(core) {
            Some(format!(
                "<a href=\"http://{}\" rel=\"nofollow\">{}</a>",
                escape(core),
                escape(&trim_url(core, limit))
            ))
        } else if !core.contains(':') && EMAIL.is_match(core) {
            Some(format!("<a href=\"mailto:{}\">{}</a>", escape(core), escape(&trim_url(core, limit))))
        } else {
            None
        };
        match link {
            Some(link) => format!("{}{}{}", lead, link, trail),
            None => word.to_string(),
        }
    })
    .into_owned()
}

/// Truncates the text content of an HTML fragment, closing any tags left
/// open at the cut.
fn truncate_html(s: &str, limit: i64, by_words: bool) -> String {
    let Ok(limit) = usize::try_from(limit) else {
        return String::new();
    };
    if limit == 0 {
        return String::new();
    }
    let measure = |text: &str| {
        if by_words {
            text.split_whitespace().count()
        } else {
            text.chars().count()
        }
    };
    let total: usize = TAG_OR_TEXT
        .find_iter(s)
        .filter(|m| !is_tag(m.as_str()))
        .map(|m| measure(m.as_str()))
        .sum();
    if total <= limit {
        return s.to_string();
    }

    // Characters keep room for the ellipsis; words append it after the last kept word.
    let budget = if by_words { limit } else { limit - 1 };
    let mut out = String::with_capacity(s.len());
    let mut open: Vec<String> = Vec::new();
    let mut used = 0;
    for piece in TAG_OR_TEXT.find_iter(s).map(|m| m.as_str()) {
        if is_tag(piece) {
            track_tag(piece, &mut open);
            out.push_str(piece);
            continue;
        }
        let size = measure(piece);
        if used + size <= budget {
            out.push_str(piece);
            used += size;
            continue;
        }
        let remaining = budget - used;
        if by_words {
            if remaining > 0 {
                let end = WORD.find_iter(piece).nth(remaining - 1).map_or(0, |m| m.end());
                out.push_str(&piece[..end]);
            }
            out.push_str(" …");
        } else {
            out.extend(piece.chars().take(remaining));
            out.push('…');
        }
        for name in open.iter().rev() {
            out.push_str(&format!("</{}>", name));
        }
        return out;
    }
    out
}

fn is_tag(piece: &str) -> bool {
    piece.starts_with('<') && piece.ends_with('>') && piece.len() > 1
}

fn track_tag(tag: &str, open: &mut Vec<String>) {
    let Some(caps) = TAG_NAME.captures(tag) else {
        return;
    };
    let name = caps[2].to_lowercase();
    if &caps[1] == "/" {
        if let Some(pos) = open.iter().rposition(|n| *n == name) {
            open.truncate(pos);
        }
    } else if !tag.ends_with("/>") && !VOID_TAGS.contains(&name.as_str()) {
        open.push(name);
    }
}

pub(super) fn truncate_chars_html(s: &str, limit: i64) -> String {
    truncate_html(s, limit, false)
}

pub(super) fn truncate_words_html(s: &str, limit: i64) -> String {
    truncate_html(s, limit, true)
}

/// JSON for embedding in a `<script type="application/json">` element.
pub(super) fn json_script(value: &Value, element_id: &str) -> String {
    let json = serde_json::to_string(value)
        .unwrap_or_default()
        .replace('<', "\\u003C")
        .replace('>', "\\u003E")
        .replace('&', "\\u0026");
    if element_id.is_empty() {
        format!("<script type=\"application/json\">{}</script>", json)
    } else {
        format!(
            "<script id=\"{}\" type=\"application/json\">{}</script>",
            escape(element_id),
            json
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn escaping_does_not_double_escape() {
        assert_eq!(escape("<b>\"hi\" & 'bye'</b>"), "&lt;b&gt;&quot;hi&quot; &amp; &#x27;bye&#x27;&lt;/b&gt;");
        assert_eq!(escape("&lt;b&gt;"), "&lt;b&gt;");
        assert_eq!(force_escape("&lt;"), "&amp;lt;");
    }

    #[test]
    fn javascript_escapes() {
        assert_eq!(escape_js("it's <b>\n"), "it\\u0027s \\u003Cb\\u003E\\u000A");
        assert_eq!(escape_js("a-b=c;"), "a\\u002Db\\u003Dc\\u003B");
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(unescape("&lt;body class=&quot;x&quot;&gt;"), "<body class=\"x\">");
        assert_eq!(unescape("&#65;&#x42;&hellip;&bogus;"), "AB…&bogus;");
    }

    #[test]
    fn paragraphs_and_breaks() {
        assert_eq!(line_breaks("a\nb\n\nc", "\n\n", "\n"), "<p>a<br>b</p><p>c</p>");
        assert_eq!(line_breaks_br("Street, Town", ", "), "Street<br>Town");
        assert_eq!(line_breaks_br("a\\nb", "\n"), "a<br>b");
    }

    #[test]
    fn tags_are_stripped() {
        assert_eq!(strip_tags("<b>Joel</b> <button>is</button> a <span>slug</span>"), "Joel is a slug");
    }

    #[test]
    fn url_encoding() {
        assert_eq!(percent_encode("https://x.com/a b?c=d", "/"), "https%3A//x.com/a%20b%3Fc%3Dd");
        assert_eq!(percent_encode("é", ""), "%C3%A9");
        assert_eq!(iri_encode("/a b?x=1&y=ü"), "/a%20b?x=1&y=%C3%BC");
    }

    #[test]
    fn links_are_created() {
        assert_eq!(
            urlize("Check out www.djangoproject.com.", None),
            "Check out <a href=\"http://www.djangoproject.com\" rel=\"nofollow\">www.djangoproject.com</a>."
        );
        assert_eq!(
            urlize("mail me@example.org", None),
            "mail <a href=\"mailto:me@example.org\">me@example.org</a>"
        );
        assert_eq!(
            urlize("(https://example.com/abcdef)", Some(10)),
            "(<a href=\"https://example.com/abcdef\" rel=\"nofollow\">https://e…</a>)"
        );
        assert_eq!(urlize("plain words", None), "plain words");
    }

    #[test]
    fn html_aware_truncation() {
        assert_eq!(
            truncate_words_html("<p>one <b>two three</b> four</p>", 2),
            "<p>one <b>two …</b></p>"
        );
        assert_eq!(truncate_chars_html("<p>Joel is a slug</p>", 7), "<p>Joel i…</p>");
        assert_eq!(truncate_chars_html("<p>short</p>", 7), "<p>short</p>");
        assert_eq!(truncate_chars_html("a<br>bcdefgh", 4), "a<br>bc…");
    }

    #[test]
    fn json_script_escapes_markup() {
        assert_eq!(
            json_script(&json!({"a": "<x>"}), "data"),
            "<script id=\"data\" type=\"application/json\">{\"a\":\"\\u003Cx\\u003E\"}</script>"
        );
    }
}
