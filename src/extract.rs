use serde_json::Value;
use std::collections::BTreeMap;

/// Outcome of extracting a structured decision from free-text model output.
///
/// Always fully populated: when extraction fails, the step's fallback values
/// are carried instead and `was_extracted` is false.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    values: BTreeMap<String, String>,
    pub was_extracted: bool,
}

impl Decision {
    /// Build a fallback decision from literal field values.
    pub fn fallback(pairs: &[(&str, &str)]) -> Self {
        Self {
            values: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            was_extracted: false,
        }
    }

    pub fn get(&self, field: &str) -> &str {
        self.values.get(field).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        self.values.insert(field.to_string(), value.into());
    }
}

/// Extract a decision object from raw model output.
///
/// Model output routinely wraps the answer in prose, so this scans for brace
/// spans instead of parsing the whole text: every innermost `{...}` span that
/// mentions each required field as a quoted key is tried as JSON, in order of
/// appearance. The first span that parses to an object holding string values
/// for all required fields wins. When nothing qualifies, the supplied
/// fallback is returned unchanged with `was_extracted = false`.
///
/// Extraction failure is an expected condition, never an error.
pub fn extract(raw: &str, required_fields: &[&str], fallback: Decision) -> Decision {
    for candidate in brace_spans(raw) {
        if !required_fields
            .iter()
            .all(|f| candidate.contains(&format!("\"{f}\"")))
        {
            continue;
        }
        let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) else {
            continue;
        };
        let mut values = BTreeMap::new();
        for (key, value) in &map {
            if let Value::String(s) = value {
                values.insert(key.clone(), s.clone());
            }
        }
        if required_fields.iter().all(|f| values.contains_key(*f)) {
            return Decision {
                values,
                was_extracted: true,
            };
        }
    }
    fallback
}

/// Innermost `{...}` spans of `raw`, left to right.
fn brace_spans(raw: &str) -> impl Iterator<Item = &str> {
    let bytes = raw.as_bytes();
    let mut spans = Vec::new();
    let mut open: Option<usize> = None;
    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'{' => open = Some(i),
            b'}' => {
                if let Some(start) = open.take() {
                    spans.push(&raw[start..=i]);
                }
            }
            _ => {}
        }
    }
    spans.into_iter()
}

/// Capability names are model-chosen and may be wrong; an unrecognized value
/// is silently replaced with the first declared capability. This is value
/// correction, not an extraction failure, so `was_extracted` is untouched.
pub fn coerce_choice(decision: &mut Decision, field: &str, allowed: &[&str]) {
    let current = decision.get(field);
    if !allowed.contains(&current) {
        if let Some(first) = allowed.first() {
            decision.set(field, *first);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RC: [&str; 2] = ["reasoning", "choice"];

    fn fb() -> Decision {
        Decision::fallback(&[("reasoning", "fallback reason"), ("choice", "fallback text")])
    }

    #[test]
    fn extracts_a_bare_object() {
        let raw = r#"{"reasoning": "because", "choice": "do it"}"#;
        let d = extract(raw, &RC, fb());
        assert!(d.was_extracted);
        assert_eq!(d.get("reasoning"), "because");
        assert_eq!(d.get("choice"), "do it");
    }

    #[test]
    fn extracts_an_object_wrapped_in_prose() {
        let raw = concat!(
            "Sure! Here is my decision:\n",
            r#"{"reasoning": "the user asked", "choice": "I'll help"}"#,
            "\nLet me know if that works."
        );
        let d = extract(raw, &RC, fb());
        assert!(d.was_extracted);
        assert_eq!(d.get("choice"), "I'll help");
    }

    #[test]
    fn first_qualifying_object_wins() {
        let raw = concat!(
            r#"{"unrelated": "x"} "#,
            r#"{"reasoning": "a", "choice": "first"} "#,
            r#"{"reasoning": "b", "choice": "second"}"#,
        );
        let d = extract(raw, &RC, fb());
        assert!(d.was_extracted);
        assert_eq!(d.get("choice"), "first");
    }

    #[test]
    fn missing_field_returns_fallback_unchanged() {
        let raw = r#"{"reasoning": "only one field"}"#;
        let d = extract(raw, &RC, fb());
        assert!(!d.was_extracted);
        assert_eq!(d.get("reasoning"), "fallback reason");
        assert_eq!(d.get("choice"), "fallback text");
    }

    #[test]
    fn unparseable_braces_return_fallback() {
        let raw = r#"{"reasoning": broken "choice": nope}"#;
        let d = extract(raw, &RC, fb());
        assert!(!d.was_extracted);
    }

    #[test]
    fn no_braces_returns_fallback() {
        let d = extract("plain prose with no structure at all", &RC, fb());
        assert!(!d.was_extracted);
        assert_eq!(d.get("choice"), "fallback text");
    }

    #[test]
    fn non_string_required_field_does_not_count() {
        let raw = r#"{"reasoning": "ok", "choice": 42}"#;
        let d = extract(raw, &RC, fb());
        assert!(!d.was_extracted);
    }

    #[test]
    fn three_field_endpoint_decision() {
        let raw = r#"noise {"reasoning": "geo fits", "choice": "using geo", "endpoint": "geo"} noise"#;
        let d = extract(
            raw,
            &["reasoning", "choice", "endpoint"],
            Decision::fallback(&[
                ("reasoning", "r"),
                ("choice", "c"),
                ("endpoint", "basic"),
            ]),
        );
        assert!(d.was_extracted);
        assert_eq!(d.get("endpoint"), "geo");
    }

    #[test]
    fn unknown_endpoint_is_coerced_to_first_declared() {
        let mut d = Decision::fallback(&[("endpoint", "region")]);
        d.was_extracted = true;
        coerce_choice(&mut d, "endpoint", &["basic", "geo", "asn"]);
        assert_eq!(d.get("endpoint"), "basic");
        assert!(d.was_extracted);
    }

    #[test]
    fn known_endpoint_is_left_alone() {
        let mut d = Decision::fallback(&[("endpoint", "asn")]);
        coerce_choice(&mut d, "endpoint", &["basic", "geo", "asn"]);
        assert_eq!(d.get("endpoint"), "asn");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn embedded_object_is_always_recovered(
                prefix in "[a-zA-Z ,.!\n]{0,80}",
                suffix in "[a-zA-Z ,.!\n]{0,80}",
                reason in "[a-z ]{1,40}",
                choice in "[a-z ]{1,40}",
            ) {
                let obj = serde_json::json!({"reasoning": reason, "choice": choice});
                let raw = format!("{prefix}{obj}{suffix}");
                let d = extract(&raw, &RC, fb());
                prop_assert!(d.was_extracted);
                prop_assert_eq!(d.get("reasoning"), reason.as_str());
                prop_assert_eq!(d.get("choice"), choice.as_str());
            }

            #[test]
            fn braceless_text_always_falls_back(raw in "[a-zA-Z0-9 ,.!?\n]{0,200}") {
                let d = extract(&raw, &RC, fb());
                prop_assert!(!d.was_extracted);
                prop_assert_eq!(d.get("choice"), "fallback text");
            }
        }
    }
}
