//! `{placeholder}` interpolation for agent and task text.

use std::collections::HashMap;

/// Replace `{key}` with `inputs[key]`.
///
/// Only identifier-shaped placeholders with a matching input are replaced;
/// anything else (unknown keys, JSON snippets, lone braces) is kept verbatim.
pub fn interpolate(template: &str, inputs: &HashMap<String, String>) -> String {
    if inputs.is_empty() || !template.contains('{') {
        return template.to_string();
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let replaced = after.find('}').and_then(|close| {
            let key = &after[..close];
            if is_identifier(key) {
                inputs.get(key).map(|value| (value, close))
            } else {
                None
            }
        });

        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(value: &str) -> HashMap<String, String> {
        HashMap::from([("topic".to_string(), value.to_string())])
    }

    #[test]
    fn replaces_known_placeholders() {
        let out = interpolate(
            "A 4 paragraph article on {topic} advancements, {topic} first.",
            &topic("AI"),
        );
        assert_eq!(out, "A 4 paragraph article on AI advancements, AI first.");
    }

    #[test]
    fn keeps_unknown_and_non_identifier_braces() {
        let inputs = topic("AI");
        assert_eq!(interpolate("{unknown} {topic}", &inputs), "{unknown} AI");
        assert_eq!(
            interpolate(r#"{"action": "final_answer"}"#, &inputs),
            r#"{"action": "final_answer"}"#
        );
        assert_eq!(interpolate("open { only", &inputs), "open { only");
        assert_eq!(interpolate("{{topic}}", &inputs), "{AI}");
    }

    #[test]
    fn values_are_not_reinterpolated() {
        let out = interpolate("{topic}", &topic("{topic}"));
        assert_eq!(out, "{topic}");
    }

    #[test]
    fn handles_multibyte_text() {
        let out = interpolate("Über {topic} ✓ …", &topic("Quanten"));
        assert_eq!(out, "Über Quanten ✓ …");
    }
}
