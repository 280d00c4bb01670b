//! printf-style single-argument substitution used by pattern handlers.
//!
//! Every conversion spec consumes the same value, so `"%s (%1$s)"` repeats
//! it. Supported specs follow `%[argnum$][flags][width][.precision]type`
//! with flags `-`, `+`, ` `, `0` and `'c` (custom padding character).

use minijinja::value::{Value, ValueKind};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::caster::cast_to_string;

static CONVERSION_SPEC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"%(?:(?P<arg>\d+)\$)?(?P<flags>(?:[-+ 0]|'.)*)(?P<width>\d+)?(?:\.(?P<precision>\d+))?(?P<spec>[bcdeEfFosuxX%])")
        .expect("conversion spec pattern is valid")
});

static NUMERIC_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?")
        .expect("numeric prefix pattern is valid")
});

#[derive(Debug, Default)]
struct Spec {
    left_align: bool,
    plus_sign: bool,
    pad: Option<char>,
    width: usize,
    precision: Option<usize>,
    kind: char,
}

impl Spec {
    fn from_captures(caps: &Captures<'_>) -> Self {
        let mut spec = Spec {
            kind: caps["spec"].chars().next().unwrap_or('s'),
            width: caps
                .name("width")
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0),
            precision: caps.name("precision").and_then(|m| m.as_str().parse().ok()),
            ..Default::default()
        };

        let mut flags = caps.name("flags").map(|m| m.as_str()).unwrap_or("").chars();
        while let Some(flag) = flags.next() {
            match flag {
                '-' => spec.left_align = true,
                '+' => spec.plus_sign = true,
                '0' => spec.pad = Some('0'),
                ' ' => spec.pad = Some(' '),
                '\'' => spec.pad = flags.next(),
                _ => {}
            }
        }
        spec
    }
}

/// Substitutes `value` into every conversion spec of `pattern`.
pub fn sprintf(pattern: &str, value: &Value) -> String {
    CONVERSION_SPEC
        .replace_all(pattern, |caps: &Captures<'_>| {
            let spec = Spec::from_captures(caps);
            if spec.kind == '%' {
                return "%".to_string();
            }
            let body = convert(&spec, value);
            pad(&spec, body)
        })
        .into_owned()
}

fn convert(spec: &Spec, value: &Value) -> String {
    match spec.kind {
        's' => {
            let text = cast_to_string(value);
            match spec.precision {
                Some(max) => text.chars().take(max).collect(),
                None => text,
            }
        }
        'd' => signed(spec, as_integer(value).to_string(), as_integer(value) >= 0),
        'u' => (as_integer(value) as u64).to_string(),
        'f' | 'F' => {
            let number = as_float(value);
            signed(
                spec,
                format!("{:.*}", spec.precision.unwrap_or(6), number),
                number >= 0.0,
            )
        }
        'e' | 'E' => {
            let number = as_float(value);
            let text = exponent(number, spec.precision.unwrap_or(6));
            let text = if spec.kind == 'E' { text.to_uppercase() } else { text };
            signed(spec, text, number >= 0.0)
        }
        'x' => format!("{:x}", as_integer(value) as u64),
        'X' => format!("{:X}", as_integer(value) as u64),
        'o' => format!("{:o}", as_integer(value) as u64),
        'b' => format!("{:b}", as_integer(value) as u64),
        'c' => u32::try_from(as_integer(value))
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default(),
        other => format!("%{}", other),
    }
}

fn signed(spec: &Spec, text: String, non_negative: bool) -> String {
    if spec.plus_sign && non_negative {
        format!("+{}", text)
    } else {
        text
    }
}

/// Exponent notation with an explicit exponent sign, e.g. `1.234500e+1`.
fn exponent(number: f64, precision: usize) -> String {
    let raw = format!("{:.*e}", precision, number);
    match raw.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            format!("{}e{:+}", mantissa, exp)
        }
        None => raw,
    }
}

fn pad(spec: &Spec, body: String) -> String {
    let len = body.chars().count();
    if len >= spec.width {
        return body;
    }
    let fill = match spec.pad {
        // Zero padding on the right would change the number.
        Some('0') if spec.left_align => ' ',
        Some(c) => c,
        None => ' ',
    };
    let padding: String = std::iter::repeat(fill).take(spec.width - len).collect();

    if spec.left_align {
        return format!("{}{}", body, padding);
    }

    if fill == '0' && (body.starts_with('-') || body.starts_with('+')) {
        let (sign, digits) = body.split_at(1);
        return format!("{}{}{}", sign, padding, digits);
    }
    format!("{}{}", padding, body)
}

/// Leading numeric part of `text` (`"17 apples"` → `"17"`), empty if none.
fn numeric_prefix(text: &str) -> &str {
    NUMERIC_PREFIX
        .find(text)
        .map_or("", |m| m.as_str().trim_start())
}

fn as_integer(value: &Value) -> i64 {
    match value.kind() {
        ValueKind::Number => i64::try_from(value.clone())
            .ok()
            .or_else(|| f64::try_from(value.clone()).ok().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        ValueKind::Bool => i64::from(value.is_true()),
        ValueKind::String => {
            let text = numeric_prefix(value.as_str().unwrap_or_default());
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().map(|f| f.trunc() as i64))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

fn as_float(value: &Value) -> f64 {
    match value.kind() {
        ValueKind::Number => f64::try_from(value.clone()).unwrap_or(0.0),
        ValueKind::Bool => {
            if value.is_true() {
                1.0
            } else {
                0.0
            }
        }
        ValueKind::String => numeric_prefix(value.as_str().unwrap_or_default())
            .parse()
            .unwrap_or(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_and_integer_specs() {
        assert_eq!(sprintf("Value is: %d", &Value::from(42)), "Value is: 42");
        assert_eq!(sprintf("Hello, %s!", &Value::from("World")), "Hello, World!");
        assert_eq!(sprintf("%d", &Value::from("17 apples")), "17");
        assert_eq!(sprintf("%d", &Value::from("-3.9kg")), "-3");
        assert_eq!(sprintf("%d", &Value::from("apples")), "0");
        assert_eq!(sprintf("%d", &Value::from(" 17 ")), "17");
        assert_eq!(sprintf("%d", &Value::from(9.99)), "9");
    }

    #[test]
    fn test_float_precision() {
        assert_eq!(sprintf("%.1f", &Value::from("2.5 km")), "2.5");
        assert_eq!(sprintf("$%.2f", &Value::from(12.3456)), "$12.35");
        assert_eq!(sprintf("%f", &Value::from(1)), "1.000000");
        assert_eq!(sprintf("%+.1f", &Value::from(2.26)), "+2.3");
    }

    #[test]
    fn test_width_and_padding() {
        assert_eq!(sprintf("[%5d]", &Value::from(42)), "[   42]");
        assert_eq!(sprintf("[%-5d]", &Value::from(42)), "[42   ]");
        assert_eq!(sprintf("[%05d]", &Value::from(-42)), "[-0042]");
        assert_eq!(sprintf("[%'*6s]", &Value::from("ab")), "[****ab]");
    }

    #[test]
    fn test_radix_and_char_specs() {
        assert_eq!(sprintf("%x", &Value::from(255)), "ff");
        assert_eq!(sprintf("%X", &Value::from(255)), "FF");
        assert_eq!(sprintf("%o", &Value::from(8)), "10");
        assert_eq!(sprintf("%b", &Value::from(5)), "101");
        assert_eq!(sprintf("%c", &Value::from(65)), "A");
    }

    #[test]
    fn test_exponent_spec() {
        assert_eq!(sprintf("%.2e", &Value::from(12345.0)), "1.23e+4");
        assert_eq!(sprintf("%.1E", &Value::from(0.05)), "5.0E-2");
    }

    #[test]
    fn test_literal_percent_and_repeat() {
        assert_eq!(sprintf("%d%%", &Value::from(50)), "50%");
        assert_eq!(sprintf("%s and %1$s", &Value::from("x")), "x and x");
        assert_eq!(sprintf("no specs here", &Value::from(1)), "no specs here");
    }

    #[test]
    fn test_string_precision_truncates() {
        assert_eq!(sprintf("%.3s", &Value::from("abcdef")), "abc");
    }
}
