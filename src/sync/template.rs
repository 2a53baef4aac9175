//! Text templating for sync actions.
//!
//! Templates render against a root object `{Data: <payload>}` using
//! handlebars with HTML escaping disabled. The helper vocabulary is fixed:
//! `base64enc`, `base64dec`, `contains`, `hasPrefix`, `hasSuffix`.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use base64::{engine::general_purpose, Engine as _};
use handlebars::{handlebars_helper, Handlebars};
use serde_json::{json, Value};

use crate::error::SyncError;
use crate::model::SyncTemplate;

handlebars_helper!(base64enc: |value: String| general_purpose::STANDARD.encode(value.as_bytes()));

handlebars_helper!(base64dec: |value: String| {
    general_purpose::STANDARD
        .decode(value.as_bytes())
        .map(|decoded| String::from_utf8_lossy(&decoded).into_owned())
        .unwrap_or_default()
});

handlebars_helper!(contains: |haystack: String, needle: String| haystack.contains(&needle));

handlebars_helper!(has_prefix: |value: String, prefix: String| value.starts_with(&prefix));

handlebars_helper!(has_suffix: |value: String, suffix: String| value.ends_with(&suffix));

fn templater() -> &'static Handlebars<'static> {
    static TEMPLATER: OnceLock<Handlebars<'static>> = OnceLock::new();
    TEMPLATER.get_or_init(|| {
        let mut handlebars = Handlebars::new();
        // Secret bytes pass through verbatim.
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.register_helper("base64enc", Box::new(base64enc));
        handlebars.register_helper("base64dec", Box::new(base64dec));
        handlebars.register_helper("contains", Box::new(contains));
        handlebars.register_helper("hasPrefix", Box::new(has_prefix));
        handlebars.register_helper("hasSuffix", Box::new(has_suffix));
        handlebars
    })
}

/// Renders a template against `{Data: <payload>}`.
///
/// `rawData` emits the rendered bytes directly; `data` renders each map value
/// and emits the canonical JSON encoding of the resulting string map.
pub fn render(template: &SyncTemplate, payload: &Value) -> Result<Vec<u8>, SyncError> {
    let root = json!({ "Data": payload });

    if let Some(raw) = &template.raw_data {
        let rendered = templater()
            .render_template(raw, &root)
            .map_err(|err| SyncError::Template(err.to_string()))?;
        return Ok(rendered.into_bytes());
    }

    if let Some(map) = &template.data {
        if !map.is_empty() {
            let mut rendered = BTreeMap::new();
            for (key, value_template) in map {
                let value = templater()
                    .render_template(value_template, &root)
                    .map_err(|err| SyncError::Template(err.to_string()))?;
                rendered.insert(key.clone(), value);
            }
            return serde_json::to_vec(&rendered)
                .map_err(|err| SyncError::Template(err.to_string()));
        }
    }

    Err(SyncError::Template("cannot apply empty template".into()))
}

/// Normalizes a name to lower-camelCase for template-map keys.
///
/// `-`, `_` and spaces are segment separators; dots are retained verbatim,
/// e.g. `my-db.password` becomes `myDb.password`.
pub fn to_lower_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    let mut started = false;
    for ch in name.chars() {
        match ch {
            '-' | '_' | ' ' => upper_next = true,
            _ if !started => {
                out.extend(ch.to_lowercase());
                started = true;
                upper_next = false;
            }
            _ if upper_next => {
                out.extend(ch.to_uppercase());
                upper_next = false;
            }
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(template: &str) -> SyncTemplate {
        SyncTemplate {
            raw_data: Some(template.to_string()),
            data: None,
        }
    }

    #[test]
    fn renders_raw_data_against_payload() {
        let payload = json!({"u": "u1", "p": "p1"});
        let rendered = render(&raw("{{Data.u}}:{{Data.p}}"), &payload).expect("renders");
        assert_eq!(rendered, b"u1:p1");
    }

    #[test]
    fn renders_scalar_payload() {
        let rendered = render(&raw("value={{Data}}"), &json!("s3cr3t")).expect("renders");
        assert_eq!(rendered, b"value=s3cr3t");
    }

    #[test]
    fn renders_data_map_as_canonical_json() {
        let template = SyncTemplate {
            raw_data: None,
            data: Some(BTreeMap::from([
                ("b".to_string(), "{{Data.y}}".to_string()),
                ("a".to_string(), "{{Data.x}}".to_string()),
            ])),
        };
        let rendered = render(&template, &json!({"x": "1", "y": "2"})).expect("renders");
        assert_eq!(rendered, br#"{"a":"1","b":"2"}"#);
    }

    #[test]
    fn base64_helpers_round_trip() {
        let encoded = render(&raw("{{base64enc Data}}"), &json!("hunter2")).expect("renders");
        assert_eq!(encoded, b"aHVudGVyMg==");

        let decoded =
            render(&raw("{{base64dec Data}}"), &json!("aHVudGVyMg==")).expect("renders");
        assert_eq!(decoded, b"hunter2");
    }

    #[test]
    fn string_predicates_compose_with_if() {
        let payload = json!("db/password");
        let rendered = render(
            &raw("{{#if (hasPrefix Data \"db/\")}}yes{{else}}no{{/if}}"),
            &payload,
        )
        .expect("renders");
        assert_eq!(rendered, b"yes");

        let rendered = render(
            &raw("{{contains Data \"word\"}},{{hasSuffix Data \"word\"}}"),
            &payload,
        )
        .expect("renders");
        assert_eq!(rendered, b"true,true");
    }

    #[test]
    fn unknown_helper_is_an_error() {
        let err = render(&raw("{{shout Data}}"), &json!("x")).unwrap_err();
        assert!(matches!(err, SyncError::Template(_)));
    }

    #[test]
    fn empty_template_is_an_error() {
        let err = render(&SyncTemplate::default(), &json!("x")).unwrap_err();
        assert!(matches!(err, SyncError::Template(_)));
    }

    #[test]
    fn lower_camel_casing() {
        assert_eq!(to_lower_camel("password"), "password");
        assert_eq!(to_lower_camel("db-password"), "dbPassword");
        assert_eq!(to_lower_camel("db_password"), "dbPassword");
        assert_eq!(to_lower_camel("Password"), "password");
        assert_eq!(to_lower_camel("my-db.password"), "myDb.password");
        assert_eq!(to_lower_camel(""), "");
    }
}
