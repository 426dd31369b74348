use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::data::{self, ValueType};

static TITLE_APOSTROPHE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z])'([A-Z])").expect("valid regex"));
static TITLE_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d)([A-Z])").expect("valid regex"));
static SLUG_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
static SLUG_DASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\s]+").expect("valid regex"));

pub(super) fn add_slashes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\'', "\\'")
}

pub(super) fn cap_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(super) fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Widest padding, gap or precision a filter argument may ask for.
pub(super) const MAX_WIDTH: usize = 4096;

fn clamp_width(filter: &'static str, width: usize) -> usize {
    if width > MAX_WIDTH {
        warn!(filter, width, limit = MAX_WIDTH, "width clamped");
        MAX_WIDTH
    } else {
        width
    }
}

fn width_and_fill(width: &Value, fill: &Value) -> (usize, char) {
    let width = data::to_i64(width)
        .and_then(|w| usize::try_from(w).ok())
        .map_or(0, |w| clamp_width("padding", w));
    let fill = data::display(fill).chars().next().unwrap_or(' ');
    (width, fill)
}

fn repeat(c: char, n: usize) -> String {
    std::iter::repeat(c).take(n).collect()
}

pub(super) fn center(s: &str, width: &Value, fill: &Value) -> String {
    let (width, fill) = width_and_fill(width, fill);
    let len = s.chars().count();
    if width <= len {
        return s.to_string();
    }
    let margin = width - len;
    // Odd margins put the extra fill on the left when the width is odd.
    let left = margin / 2 + (margin & width & 1);
    format!("{}{}{}", repeat(fill, left), s, repeat(fill, margin - left))
}

pub(super) fn ljust(s: &str, width: &Value, fill: &Value) -> String {
    let (width, fill) = width_and_fill(width, fill);
    let len = s.chars().count();
    format!("{}{}", s, repeat(fill, width.saturating_sub(len)))
}

pub(super) fn rjust(s: &str, width: &Value, fill: &Value) -> String {
    let (width, fill) = width_and_fill(width, fill);
    let len = s.chars().count();
    format!("{}{}", repeat(fill, width.saturating_sub(len)), s)
}

pub(super) fn title(s: &str) -> String {
    let mut titled = String::with_capacity(s.len());
    let mut previous_cased = false;
    for c in s.chars() {
        let cased = c.is_uppercase() || c.is_lowercase();
        if cased && previous_cased {
            titled.extend(c.to_lowercase());
        } else if cased {
            titled.extend(c.to_uppercase());
        } else {
            titled.push(c);
        }
        previous_cased = cased;
    }
    let titled = TITLE_APOSTROPHE.replace_all(&titled, |caps: &regex::Captures| {
        format!("{}'{}", &caps[1], caps[2].to_lowercase())
    });
    TITLE_DIGIT
        .replace_all(&titled, |caps: &regex::Captures| format!("{}{}", &caps[1], caps[2].to_lowercase()))
        .into_owned()
}

pub(super) fn phone2numeric(s: &str) -> String {
    s.chars()
        .map(|c| match c.to_ascii_lowercase() {
            'a' | 'b' | 'c' => '2',
            'd' | 'e' | 'f' => '3',
            'g' | 'h' | 'i' => '4',
            'j' | 'k' | 'l' => '5',
            'm' | 'n' | 'o' => '6',
            'p' | 'q' | 'r' | 's' => '7',
            't' | 'u' | 'v' => '8',
            'w' | 'x' | 'y' | 'z' => '9',
            _ => c,
        })
        .collect()
}

pub(super) fn slugify(s: &str) -> String {
    let ascii = deunicode::deunicode(s).to_lowercase();
    let stripped = SLUG_STRIP.replace_all(&ascii, "");
    SLUG_DASH
        .replace_all(stripped.trim(), "-")
        .trim_matches(|c| c == '-' || c == '_')
        .to_string()
}

pub(super) fn truncate_chars(s: &str, length: i64) -> String {
    let Ok(length) = usize::try_from(length) else {
        return String::new();
    };
    if length == 0 {
        return String::new();
    }
    if s.chars().count() <= length {
        return s.to_string();
    }
    let mut truncated: String = s.chars().take(length - 1).collect();
    truncated.push('…');
    truncated
}

pub(super) fn truncate_words(s: &str, length: i64) -> String {
    let Ok(length) = usize::try_from(length) else {
        return String::new();
    };
    if length == 0 {
        return String::new();
    }
    let words: Vec<&str> = s.split_whitespace().collect();
    if words.len() > length {
        format!("{} …", words[..length].join(" "))
    } else {
        words.join(" ")
    }
}

/// Wraps at `width` columns, breaking only at spaces. Words longer than the
/// width stay whole on their own line; existing newlines are kept.
pub(super) fn word_wrap(s: &str, width: i64) -> String {
    let Ok(width) = usize::try_from(width) else {
        return s.to_string();
    };
    if width == 0 {
        return s.to_string();
    }
    let mut wrapped = String::with_capacity(s.len());
    for line in s.split_inclusive('\n') {
        let mut rest: Vec<char> = line.chars().collect();
        while rest.len() > width {
            let window = &rest[..=width];
            let space = match window.iter().rposition(|&c| c == ' ') {
                Some(idx) => idx,
                None => match rest.iter().position(|&c| c == ' ') {
                    Some(idx) => idx,
                    None => break,
                },
            };
            wrapped.extend(&rest[..space]);
            wrapped.push('\n');
            rest.drain(..=space);
        }
        wrapped.extend(rest);
    }
    wrapped
}

pub(super) fn pluralize(value: &Value, suffixes: &str) -> Value {
    let (singular, plural) = match suffixes.split_once(',') {
        Some((_, rest)) if rest.contains(',') => return Value::String(String::new()),
        Some((one, many)) => (one, many),
        None => ("", suffixes),
    };
    let is_one = match value {
        Value::Number(_) | Value::Bool(_) => data::to_f64(value) == Some(1.0),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(n) => n == 1.0,
            Err(_) => true,
        },
        Value::Array(items) => items.len() == 1,
        Value::Object(map) => map.len() == 1,
        Value::Null => return Value::String(String::new()),
    };
    Value::String(if is_one { singular } else { plural }.to_string())
}

pub(super) fn yes_no(value: &Value, choices: &str) -> Value {
    let bits: Vec<&str> = choices.split(',').collect();
    let (yes, no, maybe) = match bits.as_slice() {
        [yes, no] => (*yes, *no, *no),
        [yes, no, maybe] => (*yes, *no, *maybe),
        _ => return value.clone(),
    };
    let choice = if value.is_null() {
        maybe
    } else if data::is_truthy(value) {
        yes
    } else {
        no
    };
    Value::String(choice.to_string())
}

/// Numbers each line: `args` are the starting number, the minimum gap
/// between the number and the text, and the symbol after the number.
pub(super) fn line_numbers(value: &Value, args: &[Value]) -> Value {
    let lines: Vec<String> = match value {
        Value::String(s) => s.replace("\\n", "\n").split('\n').map(str::to_string).collect(),
        Value::Array(items) => items.iter().map(data::display).collect(),
        other => {
            warn!(filter = "linenumbers", found = %ValueType::of(other), "filter cannot use a value of this type");
            return Value::Null;
        }
    };
    let start = data::to_i64(&args[0]).unwrap_or(1);
    let gap = data::to_i64(&args[1])
        .and_then(|g| usize::try_from(g).ok())
        .map_or(1, |g| clamp_width("linenumbers", g));
    let symbol = data::display(&args[2]);

    let last = start.saturating_add(lines.len() as i64 - 1);
    let tab = last.to_string().len() + symbol.chars().count() + gap;
    let mut numbered = String::new();
    for (number, line) in (start..).zip(&lines) {
        let prefix = format!("{}{}", number, symbol);
        let pad = tab.saturating_sub(prefix.chars().count());
        numbered.push_str(&prefix);
        numbered.push_str(&" ".repeat(pad));
        numbered.push_str(line);
        numbered.push('\n');
    }
    Value::String(numbered)
}

/// printf-style formatting of a single value: `[flags][width][.precision]type`.
pub(super) fn string_format(value: &Value, spec: &str) -> Value {
    match format_one(value, spec.strip_prefix('%').unwrap_or(spec)) {
        Some(text) => Value::String(text),
        None => {
            warn!(spec, value = %data::display(value), "stringformat could not format value");
            Value::String(String::new())
        }
    }
}

fn format_one(value: &Value, spec: &str) -> Option<String> {
    let (split, conversion) = spec.char_indices().last()?;
    let body = &spec[..split];
    let flags: String = body.chars().take_while(|c| "-+ 0#".contains(*c)).collect();
    let body = &body[flags.len()..];
    let (width, precision) = match body.split_once('.') {
        Some((w, p)) => (w, Some(clamp_width("stringformat", p.parse::<usize>().ok()?))),
        None => (body, None),
    };
    let width = if width.is_empty() {
        0
    } else {
        clamp_width("stringformat", width.parse::<usize>().ok()?)
    };

    let integer = || match value {
        Value::Number(_) | Value::Bool(_) => data::to_f64(value).map(|f| f.trunc() as i64),
        _ => None,
    };
    let float = || match value {
        Value::Number(_) | Value::Bool(_) => data::to_f64(value),
        _ => None,
    };

    let (mut text, numeric) = match conversion {
        's' => {
            let s = data::display(value);
            (match precision {
                Some(p) => s.chars().take(p).collect(),
                None => s,
            }, false)
        }
        'r' => (match value {
            Value::String(s) => format!("'{}'", s),
            other => data::display(other),
        }, false),
        'd' | 'i' => (integer()?.to_string(), true),
        'x' => (signed_radix(integer()?, |n| format!("{:x}", n)), true),
        'X' => (signed_radix(integer()?, |n| format!("{:X}", n)), true),
        'o' => (signed_radix(integer()?, |n| format!("{:o}", n)), true),
        'f' | 'F' => (format!("{:.*}", precision.unwrap_or(6), float()?), true),
        'e' | 'E' => {
            let text = scientific(float()?, precision.unwrap_or(6));
            (if conversion == 'E' { text.to_uppercase() } else { text }, true)
        }
        _ => return None,
    };

    if numeric && !text.starts_with('-') {
        if flags.contains('+') {
            text.insert(0, '+');
        } else if flags.contains(' ') {
            text.insert(0, ' ');
        }
    }
    let len = text.chars().count();
    if len >= width {
        return Some(text);
    }
    let pad = width - len;
    Some(if flags.contains('-') {
        format!("{}{}", text, " ".repeat(pad))
    } else if flags.contains('0') && numeric {
        let sign_len = usize::from(text.starts_with(['-', '+', ' ']));
        let (sign, digits) = text.split_at(sign_len);
        format!("{}{}{}", sign, "0".repeat(pad), digits)
    } else {
        format!("{}{}", " ".repeat(pad), text)
    })
}

fn signed_radix(n: i64, f: impl Fn(u64) -> String) -> String {
    if n < 0 {
        format!("-{}", f(n.unsigned_abs()))
    } else {
        f(n.unsigned_abs())
    }
}

/// `1.500000e+03` style exponent notation.
fn scientific(f: f64, precision: usize) -> String {
    let text = format!("{:.*e}", precision, f);
    match text.split_once('e') {
        Some((mantissa, exp)) => match exp.strip_prefix('-') {
            Some(digits) => format!("{}e-{:0>2}", mantissa, digits),
            None => format!("{}e+{:0>2}", mantissa, exp),
        },
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slashes_and_capitals() {
        assert_eq!(add_slashes("I'm testing"), r"I\'m testing");
        assert_eq!(add_slashes(r#"You are "funny""#), r#"You are \"funny\""#);
        assert_eq!(cap_first("capFirst"), "CapFirst");
        assert_eq!(capitalize("capFirst"), "Capfirst");
        assert_eq!(cap_first(""), "");
    }

    #[test]
    fn padding() {
        assert_eq!(center("Title", &json!("9"), &json!("*")), "**Title**");
        assert_eq!(center("ab", &json!(5), &json!(" ")), "  ab ");
        assert_eq!(center("abc", &json!(6), &json!("-")), "-abc--");
        assert_eq!(ljust("ab", &json!("4"), &json!(".")), "ab..");
        assert_eq!(rjust("ab", &json!("4"), &json!(".")), "..ab");
        assert_eq!(rjust("abcdef", &json!("4"), &json!(".")), "abcdef");
    }

    #[test]
    fn huge_widths_are_clamped() {
        assert_eq!(ljust("ab", &json!("99999999999999"), &json!(" ")).chars().count(), MAX_WIDTH);
        assert_eq!(center("ab", &json!(i64::MAX), &json!("*")).chars().count(), MAX_WIDTH);
        assert_eq!(rjust("ab", &json!("-5"), &json!(" ")), "ab");
        let formatted = string_format(&json!(1), "99999999999999d");
        assert_eq!(formatted.as_str().map(str::len), Some(MAX_WIDTH));
        let precise = string_format(&json!(1.5), ".99999999999f");
        assert_eq!(precise.as_str().map(str::len), Some(MAX_WIDTH + 2));
        let numbered = line_numbers(&json!("a"), &[json!(1), json!("99999999999999"), json!(".")]);
        assert_eq!(numbered.as_str().map(str::len), Some(2 + MAX_WIDTH + 2));
    }

    #[test]
    fn title_case() {
        assert_eq!(title("my FIRST post"), "My First Post");
        assert_eq!(title("they're bill's friends"), "They're Bill's Friends");
        assert_eq!(title("1st place"), "1st Place");
    }

    #[test]
    fn slugs() {
        assert_eq!(slugify(" Joel is a slug "), "joel-is-a-slug");
        assert_eq!(slugify("Crème brûlée!"), "creme-brulee");
    }

    #[test]
    fn truncation() {
        assert_eq!(truncate_chars("Joel is a slug", 7), "Joel i…");
        assert_eq!(truncate_chars("short", 7), "short");
        assert_eq!(truncate_words("Joel is a slug", 2), "Joel is …");
        assert_eq!(truncate_words("Joel  is", 2), "Joel is");
    }

    #[test]
    fn wrapping() {
        assert_eq!(word_wrap("Joel is a slug", 5), "Joel\nis a\nslug");
        assert_eq!(word_wrap("averyverylongword and", 5), "averyverylongword\nand");
        assert_eq!(word_wrap("ab cd\nef gh", 2), "ab\ncd\nef\ngh");
    }

    #[test]
    fn plurals() {
        assert_eq!(pluralize(&json!(1), "s"), json!(""));
        assert_eq!(pluralize(&json!(2), "s"), json!("s"));
        assert_eq!(pluralize(&json!(1), "y,ies"), json!("y"));
        assert_eq!(pluralize(&json!([1, 2]), "y,ies"), json!("ies"));
        assert_eq!(pluralize(&json!(2), "a,b,c"), json!(""));
    }

    #[test]
    fn yes_no_choices() {
        assert_eq!(yes_no(&json!(true), "yeah,no,maybe"), json!("yeah"));
        assert_eq!(yes_no(&json!(0), "yeah,no,maybe"), json!("no"));
        assert_eq!(yes_no(&Value::Null, "yeah,no,maybe"), json!("maybe"));
        assert_eq!(yes_no(&Value::Null, "yeah,no"), json!("no"));
        assert_eq!(yes_no(&json!(1), "single"), json!(1));
    }

    #[test]
    fn numbered_lines() {
        let args = [json!("9"), json!("1"), json!(".")];
        assert_eq!(line_numbers(&json!("a\nb"), &args), json!("9.  a\n10. b\n"));
        let args = [json!("1"), json!("2"), json!("")];
        assert_eq!(line_numbers(&json!(["x", "y"]), &args), json!("1  x\n2  y\n"));
    }

    #[test]
    fn printf_formats() {
        assert_eq!(string_format(&json!(10), "E"), json!("1.000000E+01"));
        assert_eq!(string_format(&json!(3.14159), ".2f"), json!("3.14"));
        assert_eq!(string_format(&json!(42), "05d"), json!("00042"));
        assert_eq!(string_format(&json!(255), "x"), json!("ff"));
        assert_eq!(string_format(&json!("ab"), "-4s"), json!("ab  "));
        assert_eq!(string_format(&json!(5), "+d"), json!("+5"));
        assert_eq!(string_format(&json!("x"), "d"), json!(""));
    }

    #[test]
    fn keypad() {
        assert_eq!(phone2numeric("800-COLLECT"), "800-2655328");
    }
}
