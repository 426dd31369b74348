//! The filter library.
//!
//! Every filter is a variant of [`Filter`]. Arguments are checked against a
//! static per-filter table ([`Filter::arguments`]) before the filter body
//! runs: missing, mistyped and disallowed arguments are replaced by the
//! table default and logged, and the filter still runs.

mod datetime;
mod html;
mod list;
mod number;
mod text;

use serde_json::Value;
use tracing::{info, warn};

use crate::data::{self, ValueType};

pub use datetime::{format_datetime, parse_datetime, DateStyle};

macro_rules! filters {
    ($($variant:ident => $name:literal),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Filter {
            $($variant),*
        }

        impl Filter {
            pub const ALL: &'static [Filter] = &[$(Filter::$variant),*];

            pub fn from_name(name: &str) -> Option<Filter> {
                match name {
                    $($name => Some(Filter::$variant),)*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(Filter::$variant => $name),*
                }
            }
        }
    };
}

filters! {
    Add => "add",
    AddSlashes => "addslashes",
    CapFirst => "capfirst",
    Capitalize => "capitalize",
    Center => "center",
    Cut => "cut",
    Date => "date",
    Default => "default",
    DefaultIfNone => "default_if_none",
    DictSort => "dictsort",
    DictSortReversed => "dictsortreversed",
    DivisibleBy => "divisibleby",
    Escape => "escape",
    EscapeJs => "escapejs",
    FileSizeFormat => "filesizeformat",
    First => "first",
    FloatFormat => "floatformat",
    ForceEscape => "force_escape",
    GetDigit => "get_digit",
    IriEncode => "iriencode",
    Join => "join",
    JsonScript => "json_script",
    Last => "last",
    Length => "length",
    LengthIs => "length_is",
    LineBreaks => "linebreaks",
    LineBreaksBr => "linebreaksbr",
    LineNumbers => "linenumbers",
    Ljust => "ljust",
    Lower => "lower",
    MakeList => "make_list",
    Phone2Numeric => "phone2numeric",
    Pluralize => "pluralize",
    Post => "post",
    Pprint => "pprint",
    Pre => "pre",
    Random => "random",
    Rjust => "rjust",
    Safe => "safe",
    SafeSeq => "safeseq",
    Slice => "slice",
    Slugify => "slugify",
    StringFormat => "stringformat",
    StripTags => "striptags",
    Time => "time",
    TimeSince => "timesince",
    TimeUntil => "timeuntil",
    Title => "title",
    TruncateChars => "truncatechars",
    TruncateCharsHtml => "truncatechars_html",
    TruncateWords => "truncatewords",
    TruncateWordsHtml => "truncatewords_html",
    Unescape => "unescape",
    UnorderedList => "unordered_list",
    Upper => "upper",
    UrlEncode => "urlencode",
    Urlize => "urlize",
    UrlizeTrunc => "urlizetrunc",
    Where => "where",
    WhereAll => "whereall",
    WordCount => "wordcount",
    WordWrap => "wordwrap",
    YesNo => "yesno",
}

/// A static argument default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lit {
    Str(&'static str),
    Int(i64),
    Null,
}

impl Lit {
    pub fn to_value(self) -> Value {
        match self {
            Lit::Str(s) => Value::String(s.to_string()),
            Lit::Int(i) => Value::from(i),
            Lit::Null => Value::Null,
        }
    }

    /// Loose equality: `0`, `0.0` and `false` are all the same number.
    fn matches(self, value: &Value) -> bool {
        match (self, value) {
            (Lit::Str(s), Value::String(v)) => s == v,
            (Lit::Int(i), Value::Number(_) | Value::Bool(_)) => data::to_f64(value) == Some(i as f64),
            (Lit::Null, Value::Null) => true,
            _ => false,
        }
    }
}

/// One positional argument of a filter.
#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    pub accepts: &'static [ValueType],
    pub default: Lit,
    pub disallowed: &'static [Lit],
}

impl ArgSpec {
    fn accepts(&self, value: &Value) -> bool {
        let ty = ValueType::of(value);
        // Booleans pass wherever integers do.
        self.accepts.contains(&ty) || (ty == ValueType::Bool && self.accepts.contains(&ValueType::Int))
    }
}

const fn arg(accepts: &'static [ValueType], default: Lit, disallowed: &'static [Lit]) -> ArgSpec {
    ArgSpec {
        accepts,
        default,
        disallowed,
    }
}

const ANY: &[ValueType] = &[
    ValueType::Str,
    ValueType::Int,
    ValueType::Float,
    ValueType::Dict,
    ValueType::List,
    ValueType::Bool,
    ValueType::Null,
];
const STR: &[ValueType] = &[ValueType::Str];
const STR_INT: &[ValueType] = &[ValueType::Str, ValueType::Int];
const NUMERIC: &[ValueType] = &[ValueType::Str, ValueType::Int, ValueType::Float];
const ADDABLE: &[ValueType] = &[ValueType::Str, ValueType::Int, ValueType::Float, ValueType::List];

const NOT_EMPTY: &[Lit] = &[Lit::Str("")];
const NONE: &[Lit] = &[];

const WIDTH_FILL: &[ArgSpec] = &[arg(STR_INT, Lit::Str("0"), NONE), arg(STR, Lit::Str(" "), NOT_EMPTY)];
const OPTIONAL_COUNT: &[ArgSpec] = &[arg(STR_INT, Lit::Null, NONE)];
const DATE_FORMAT: &[ArgSpec] = &[
    arg(STR, Lit::Str("D, m M Y H:i:s O"), NONE),
    arg(STR, Lit::Str("django"), NONE),
];
const TIME_FORMAT: &[ArgSpec] = &[arg(STR, Lit::Str("H:i"), NONE), arg(STR, Lit::Str("django"), NONE)];
const FALLBACK: &[ArgSpec] = &[arg(ANY, Lit::Str(""), NONE)];
const LENGTH: &[ArgSpec] = &[arg(STR_INT, Lit::Int(0), NONE)];
const MATCH_FIELD: &[ArgSpec] = &[arg(STR, Lit::Str(""), NOT_EMPTY), arg(ANY, Lit::Null, NONE)];
const SORT_KEY: &[ArgSpec] = &[arg(STR_INT, Lit::Str(""), NONE), arg(STR, Lit::Str(""), NONE)];
const TEXT_ARG: &[ArgSpec] = &[arg(STR, Lit::Str(""), NONE)];
const COMPARE_DATE: &[ArgSpec] = &[arg(STR, Lit::Str(""), NONE)];
const ADDEND: &[ArgSpec] = &[arg(ADDABLE, Lit::Str("0"), NOT_EMPTY)];
const REVERSED_SORT_KEY: &[ArgSpec] = &[arg(STR_INT, Lit::Str(""), NONE)];
const DIVISOR: &[ArgSpec] = &[arg(NUMERIC, Lit::Str("1"), &[Lit::Str(""), Lit::Int(0)])];
const PLACES: &[ArgSpec] = &[arg(STR_INT, Lit::Str("-1"), NOT_EMPTY)];
const DIGIT: &[ArgSpec] = &[arg(STR_INT, Lit::Str("1"), NOT_EMPTY)];
const SEPARATORS: &[ArgSpec] = &[arg(STR, Lit::Str(""), NONE), arg(STR, Lit::Str(" "), NOT_EMPTY)];
const PARAGRAPH_BREAKS: &[ArgSpec] = &[
    arg(STR, Lit::Str("\n\n"), NOT_EMPTY),
    arg(STR, Lit::Str("\n"), NOT_EMPTY),
];
const LINE_BREAK: &[ArgSpec] = &[arg(STR, Lit::Str("\n"), NOT_EMPTY)];
const NUMBERING: &[ArgSpec] = &[
    arg(STR_INT, Lit::Str("1"), NOT_EMPTY),
    arg(STR_INT, Lit::Str("1"), NOT_EMPTY),
    arg(STR, Lit::Str("."), NONE),
];
const SUFFIXES: &[ArgSpec] = &[arg(STR, Lit::Str("s"), NONE)];
const SLICE_BOUNDS: &[ArgSpec] = &[arg(STR_INT, Lit::Str(":"), NOT_EMPTY)];
const CONVERSION: &[ArgSpec] = &[arg(STR, Lit::Str("s"), NOT_EMPTY)];
const SAFE_CHARS: &[ArgSpec] = &[arg(STR, Lit::Str("/"), NONE)];
const CHOICES: &[ArgSpec] = &[arg(STR, Lit::Str("yes,no,maybe"), NOT_EMPTY)];

impl Filter {
    /// True for filters whose result is a boolean; such filters end an
    /// expression operand as a boolean rather than a string.
    pub fn is_boolean(self) -> bool {
        matches!(self, Filter::DivisibleBy | Filter::LengthIs)
    }

    /// Positional argument table. Filters that take no arguments ignore
    /// anything supplied.
    pub fn arguments(self) -> &'static [ArgSpec] {
        match self {
            Filter::Add => ADDEND,
            Filter::Center | Filter::Ljust | Filter::Rjust => WIDTH_FILL,
            Filter::Cut => TEXT_ARG,
            Filter::Date => DATE_FORMAT,
            Filter::Time => TIME_FORMAT,
            Filter::Default | Filter::DefaultIfNone => FALLBACK,
            Filter::DictSort => SORT_KEY,
            Filter::DictSortReversed => REVERSED_SORT_KEY,
            Filter::DivisibleBy => DIVISOR,
            Filter::FloatFormat => PLACES,
            Filter::GetDigit => DIGIT,
            Filter::Join => SEPARATORS,
            Filter::JsonScript => TEXT_ARG,
            Filter::Length | Filter::LengthIs => LENGTH,
            Filter::LineBreaks => PARAGRAPH_BREAKS,
            Filter::LineBreaksBr => LINE_BREAK,
            Filter::LineNumbers => NUMBERING,
            Filter::Pluralize => SUFFIXES,
            Filter::Post | Filter::Pre => TEXT_ARG,
            Filter::Slice => SLICE_BOUNDS,
            Filter::StringFormat => CONVERSION,
            Filter::TimeSince | Filter::TimeUntil => COMPARE_DATE,
            Filter::TruncateChars
            | Filter::TruncateCharsHtml
            | Filter::TruncateWords
            | Filter::TruncateWordsHtml
            | Filter::UrlizeTrunc
            | Filter::WordWrap => OPTIONAL_COUNT,
            Filter::UrlEncode => SAFE_CHARS,
            Filter::Where | Filter::WhereAll => MATCH_FIELD,
            Filter::YesNo => CHOICES,
            _ => &[],
        }
    }
}

/// Checks `supplied` against the filter's argument table, substituting
/// defaults where needed. The result has exactly one value per table entry.
pub fn resolve_arguments(filter: Filter, supplied: &[Value]) -> Vec<Value> {
    let name = filter.name();
    filter
        .arguments()
        .iter()
        .enumerate()
        .map(|(index, spec)| {
            let position = index + 1;
            let Some(given) = supplied.get(index) else {
                info!(filter = name, position, default = ?spec.default, "filter argument missing, using default");
                return spec.default.to_value();
            };
            if !spec.accepts(given) {
                warn!(
                    filter = name,
                    position,
                    found = %ValueType::of(given),
                    "filter argument has the wrong type"
                );
                info!(filter = name, position, default = ?spec.default, "using default argument");
                return spec.default.to_value();
            }
            if spec.disallowed.iter().any(|lit| lit.matches(given)) {
                info!(filter = name, position, default = ?spec.default, "filter argument not allowed, using default");
                return spec.default.to_value();
            }
            given.clone()
        })
        .collect()
}

/// Runs `filter` over `value` with already-resolved `supplied` arguments.
pub fn apply(filter: Filter, value: &Value, supplied: &[Value]) -> Value {
    let args = resolve_arguments(filter, supplied);
    match filter {
        Filter::Add => number::add(value, &args[0]),
        Filter::DivisibleBy => number::divisible_by(value, &args[0]),
        Filter::FileSizeFormat => number::file_size_format(value),
        Filter::FloatFormat => number::float_format(value, &args[0]),
        Filter::GetDigit => number::get_digit(value, &args[0]),

        Filter::AddSlashes => map_text(filter, value, |s| text::add_slashes(&s)),
        Filter::CapFirst => map_text(filter, value, |s| text::cap_first(&s)),
        Filter::Capitalize => map_text(filter, value, |s| text::capitalize(&s)),
        Filter::Center => map_text(filter, value, |s| text::center(&s, &args[0], &args[1])),
        Filter::Ljust => map_text(filter, value, |s| text::ljust(&s, &args[0], &args[1])),
        Filter::Rjust => map_text(filter, value, |s| text::rjust(&s, &args[0], &args[1])),
        Filter::Cut => map_text(filter, value, |s| s.replace(&data::display(&args[0]), "")),
        Filter::Lower => map_text(filter, value, |s| s.to_lowercase()),
        Filter::Upper => map_text(filter, value, |s| s.to_uppercase()),
        Filter::Title => map_text(filter, value, |s| text::title(&s)),
        Filter::Phone2Numeric => map_text(filter, value, |s| text::phone2numeric(&s)),
        Filter::Post => map_text(filter, value, |s| s + &data::display(&args[0])),
        Filter::Pre => map_text(filter, value, |s| data::display(&args[0]) + &s),
        Filter::Slugify => map_text(filter, value, |s| text::slugify(&s)),
        Filter::StringFormat => text::string_format(value, &data::display(&args[0])),
        Filter::TruncateChars => with_count(filter, value, &args[0], text::truncate_chars),
        Filter::TruncateWords => with_count(filter, value, &args[0], text::truncate_words),
        Filter::WordCount => match as_text(filter, value) {
            Some(s) => Value::from(s.split_whitespace().count()),
            None => Value::Null,
        },
        Filter::WordWrap => with_count(filter, value, &args[0], text::word_wrap),
        Filter::Pluralize => text::pluralize(value, &data::display(&args[0])),
        Filter::YesNo => text::yes_no(value, &data::display(&args[0])),
        Filter::LineNumbers => text::line_numbers(value, &args),

        Filter::Default => {
            if data::is_truthy(value) {
                value.clone()
            } else {
                args[0].clone()
            }
        }
        Filter::DefaultIfNone => {
            if value.is_null() {
                args[0].clone()
            } else {
                value.clone()
            }
        }
        Filter::DictSort => list::dict_sort(value, &args[0], &args[1]),
        Filter::DictSortReversed => list::dict_sort(value, &args[0], &Value::from("reverse")),
        Filter::First => list::first(value),
        Filter::Last => list::last(value),
        Filter::Join => list::join(value, &data::display(&args[0]), &data::display(&args[1])),
        Filter::Length => list::length(value, &args[0]),
        Filter::LengthIs => list::length_is(value, &args[0]),
        Filter::MakeList => list::make_list(value),
        Filter::Random => list::random(value),
        Filter::Slice => list::slice(value, &data::display(&args[0])),
        Filter::UnorderedList => list::unordered_list(value),
        Filter::Where => list::find_where(value, &args[0], &args[1]),
        Filter::WhereAll => list::find_where_all(value, &args[0], &args[1]),
        Filter::Pprint => Value::String(serde_json::to_string_pretty(value).unwrap_or_default()),
        Filter::Safe | Filter::SafeSeq => value.clone(),

        Filter::Escape => map_text(filter, value, |s| html::escape(&s)),
        Filter::ForceEscape => map_text(filter, value, |s| html::force_escape(&s)),
        Filter::EscapeJs => map_text(filter, value, |s| html::escape_js(&s)),
        Filter::Unescape => map_text(filter, value, |s| html::unescape(&s)),
        Filter::LineBreaks => map_text(filter, value, |s| {
            html::line_breaks(&s, &data::display(&args[0]), &data::display(&args[1]))
        }),
        Filter::LineBreaksBr => map_text(filter, value, |s| html::line_breaks_br(&s, &data::display(&args[0]))),
        Filter::StripTags => map_text(filter, value, |s| html::strip_tags(&s)),
        Filter::UrlEncode => map_text(filter, value, |s| html::percent_encode(&s, &data::display(&args[0]))),
        Filter::IriEncode => map_text(filter, value, |s| html::iri_encode(&s)),
        Filter::Urlize => map_text(filter, value, |s| html::urlize(&s, None)),
        Filter::UrlizeTrunc => with_count(filter, value, &args[0], |s, n| html::urlize(s, Some(n))),
        Filter::TruncateCharsHtml => with_count(filter, value, &args[0], html::truncate_chars_html),
        Filter::TruncateWordsHtml => with_count(filter, value, &args[0], html::truncate_words_html),
        Filter::JsonScript => Value::String(html::json_script(value, &data::display(&args[0]))),

        Filter::Date | Filter::Time => datetime::date(filter.name(), value, &args[0], &args[1]),
        Filter::TimeSince => datetime::time_since(value, &args[0]),
        Filter::TimeUntil => datetime::time_until(value, &args[0]),
    }
}

/// String form of a scalar filter input. Collections and null are rejected
/// with a warning.
fn as_text(filter: Filter, value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(_) | Value::Bool(_) => Some(data::display(value)),
        _ => {
            warn!(filter = filter.name(), found = %ValueType::of(value), "filter cannot use a value of this type");
            None
        }
    }
}

fn map_text(filter: Filter, value: &Value, f: impl FnOnce(String) -> String) -> Value {
    as_text(filter, value).map(f).map_or(Value::Null, Value::String)
}

/// Applies a count-taking text filter. A missing or unreadable count leaves
/// the value untouched.
fn with_count(filter: Filter, value: &Value, count: &Value, f: impl FnOnce(&str, i64) -> String) -> Value {
    let Some(s) = as_text(filter, value) else {
        return Value::Null;
    };
    match data::to_i64(count) {
        Some(n) => Value::String(f(&s, n)),
        None => {
            if !count.is_null() {
                warn!(filter = filter.name(), count = %data::display(count), "count is not a number");
            }
            Value::String(s)
        }
    }
}
