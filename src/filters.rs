use std::sync::Arc;

use heck::{ToKebabCase, ToLowerCamelCase, ToPascalCase, ToShoutySnakeCase, ToSnakeCase};
use minijinja::value::Value;
use minijinja::{Environment, Error, ErrorKind};
use uuid::Uuid;

use crate::caster::cast_to_string;
use crate::formatter::{DataFormatter, MappedFormatter};
use crate::handler::{Handler, HandlerError};

/// Name the built-in text formatter is registered under.
pub const TEXT_HANDLER: &str = "text";

/// Format used by the `to_string` filter.
pub const STRING_FORMAT: &str = "string";

pub fn camelcase(s: &str) -> String {
    s.to_lower_camel_case()
}

pub fn pascalcase(s: &str) -> String {
    s.to_pascal_case()
}

pub fn snakecase(s: &str) -> String {
    s.to_snake_case()
}

pub fn kebabcase(s: &str) -> String {
    s.to_kebab_case()
}

pub fn screamingsnakecase(s: &str) -> String {
    s.to_shouty_snake_case()
}

/// Deterministic v5 UUID for non-empty input, random v4 otherwise.
pub fn uuid_generate(val: Option<&str>) -> String {
    const NAMESPACE_NAME: &str = "com.github.rendition";
    let namespace = Uuid::new_v5(&Uuid::NAMESPACE_DNS, NAMESPACE_NAME.as_bytes());

    match val {
        Some(s) if !s.is_empty() => Uuid::new_v5(&namespace, s.as_bytes()).to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}

fn text(f: fn(&str) -> String) -> Handler {
    Handler::callable(move |value: &Value, _: &str| -> Result<Value, HandlerError> {
        Ok(Value::from(f(&cast_to_string(value))))
    })
}

/// Case conversions and UUIDs, declared as supported formats so that a
/// bare `"snakecase"` resolves here through capability search.
pub fn text_formatter() -> MappedFormatter {
    MappedFormatter::lazy(|| {
        vec![
            ("camelcase".to_string(), text(camelcase)),
            ("pascalcase".to_string(), text(pascalcase)),
            ("snakecase".to_string(), text(snakecase)),
            ("kebabcase".to_string(), text(kebabcase)),
            ("screamingsnakecase".to_string(), text(screamingsnakecase)),
            (
                "uuid".to_string(),
                Handler::callable(|value, _| {
                    let seed = cast_to_string(value);
                    Ok(Value::from(uuid_generate(Some(&seed))))
                }),
            ),
            ("camel".to_string(), Handler::alias("camelcase")),
            ("pascal".to_string(), Handler::alias("pascalcase")),
            ("snake".to_string(), Handler::alias("snakecase")),
            ("kebab".to_string(), Handler::alias("kebabcase")),
            ("constant".to_string(), Handler::alias("screamingsnakecase")),
        ]
    })
}

/// Registers the `format_as` and `to_string` filters, both backed by
/// `formatter`. Their output is marked safe so HTML produced by handlers
/// is not escaped again.
pub fn register_filters(env: &mut Environment<'static>, formatter: Arc<DataFormatter>) {
    let fmt = formatter.clone();
    env.add_filter(
        "format_as",
        move |value: Value, format: String| -> Result<Value, Error> {
            fmt.format(&value, &format)
                .map(Value::from_safe_string)
                .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
        },
    );

    env.add_filter("to_string", move |value: Value| -> Result<Value, Error> {
        formatter
            .format(&value, STRING_FORMAT)
            .map(Value::from_safe_string)
            .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
    });

    env.add_function("uuid_generate", |val: Option<String>| {
        uuid_generate(val.as_deref())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerFormatter;

    #[test]
    fn test_case_conversions() {
        assert_eq!(camelcase("hello world"), "helloWorld");
        assert_eq!(pascalcase("hello world"), "HelloWorld");
        assert_eq!(snakecase("HelloWorld"), "hello_world");
        assert_eq!(kebabcase("HelloWorld"), "hello-world");
        assert_eq!(screamingsnakecase("hello world"), "HELLO_WORLD");
    }

    #[test]
    fn test_uuid_generate_is_deterministic_for_input() {
        assert_eq!(uuid_generate(Some("abc")), uuid_generate(Some("abc")));
        assert_ne!(uuid_generate(Some("abc")), uuid_generate(Some("abd")));
        assert_ne!(uuid_generate(None), uuid_generate(None));
    }

    #[test]
    fn test_text_formatter_aliases() {
        let formatter = text_formatter();
        assert_eq!(
            formatter.handle(&Value::from("Hello World"), "snake").unwrap(),
            "hello_world"
        );
        assert!(formatter.supported_formats().contains(&"constant".to_string()));
    }

    #[test]
    fn test_capability_search_finds_text_formatter() {
        let formatter =
            DataFormatter::new().with_handler(TEXT_HANDLER, Handler::formatter(text_formatter()));
        assert_eq!(
            formatter.format(&Value::from("user name"), "kebabcase").unwrap(),
            "user-name"
        );
        assert_eq!(
            formatter.format(&Value::from("user name"), "text.pascal").unwrap(),
            "UserName"
        );
    }

    #[test]
    fn test_filters_in_templates() {
        let formatter = Arc::new(
            DataFormatter::new()
                .with_handler("money", "$%.2f")
                .with_handler(TEXT_HANDLER, Handler::formatter(text_formatter())),
        );
        let mut env = Environment::new();
        register_filters(&mut env, formatter);
        let out = env
            .render_str(
                "{{ 3 | format_as('money') }} {{ 'Big Title' | format_as('snakecase') }}",
                (),
            )
            .unwrap();
        assert_eq!(out, "$3.00 big_title");
    }

    #[test]
    fn test_to_string_filter_encodes_structures() {
        let mut env = Environment::new();
        register_filters(&mut env, Arc::new(DataFormatter::new()));
        let out = env.render_str("{{ [1, 2] | to_string }}", ()).unwrap();
        assert_eq!(out, "[\n  1,\n  2\n]");
    }

    #[test]
    fn test_format_as_failure_is_template_error() {
        let formatter = Arc::new(DataFormatter::new().with_handler(
            "boom",
            Handler::callable(|_, _| anyhow::bail!("exploded")),
        ));
        let mut env = Environment::new();
        register_filters(&mut env, formatter);
        let err = env.render_str("{{ 1 | format_as('boom') }}", ()).unwrap_err();
        assert!(err.to_string().contains("exploded"));
    }
}
