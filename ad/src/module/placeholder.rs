//! Placeholder interpolation for commands and paths
//!
//! `{name}` is replaced by the value registered under `name`; `{{` and `}}`
//! produce literal braces. The set of names is closed: referencing a name that
//! was never registered is an error rather than an empty substitution.

use std::collections::HashMap;

use thiserror::Error;

/// Errors raised while parsing or resolving placeholders
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaceholderError {
    #[error("unknown placeholder '{{{name}}}' in \"{input}\"")]
    Unknown { name: String, input: String },

    #[error("unclosed '{{' at byte {position} in \"{input}\"")]
    Unclosed { position: usize, input: String },

    #[error("unmatched '}}' at byte {position} in \"{input}\"")]
    UnmatchedClose { position: usize, input: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Brace(char),
    Placeholder(&'a str),
}

fn parse(input: &str) -> Result<Vec<Segment<'_>>, PlaceholderError> {
    let mut segments = Vec::new();
    let bytes = input.as_bytes();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                segments.push(Segment::Literal(&input[literal_start..i]));
                segments.push(Segment::Brace('{'));
                i += 2;
                literal_start = i;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                segments.push(Segment::Literal(&input[literal_start..i]));
                segments.push(Segment::Brace('}'));
                i += 2;
                literal_start = i;
            }
            b'{' => {
                let Some(len) = input[i + 1..].find('}') else {
                    return Err(PlaceholderError::Unclosed {
                        position: i,
                        input: input.to_string(),
                    });
                };
                segments.push(Segment::Literal(&input[literal_start..i]));
                segments.push(Segment::Placeholder(&input[i + 1..i + 1 + len]));
                i += len + 2;
                literal_start = i;
            }
            b'}' => {
                return Err(PlaceholderError::UnmatchedClose {
                    position: i,
                    input: input.to_string(),
                });
            }
            _ => i += 1,
        }
    }
    segments.push(Segment::Literal(&input[literal_start..]));
    Ok(segments)
}

/// Names referenced by `input`, in order of appearance
pub fn placeholder_names(input: &str) -> Result<Vec<&str>, PlaceholderError> {
    Ok(parse(input)?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Placeholder(name) => Some(name),
            _ => None,
        })
        .collect())
}

/// Closed set of named substitutions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placeholders {
    values: HashMap<String, String>,
}

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Replace every placeholder in `input`
    pub fn interpolate(&self, input: &str) -> Result<String, PlaceholderError> {
        let mut output = String::with_capacity(input.len());
        for segment in parse(input)? {
            match segment {
                Segment::Literal(text) => output.push_str(text),
                Segment::Brace(brace) => output.push(brace),
                Segment::Placeholder(name) => {
                    let value = self.values.get(name).ok_or_else(|| PlaceholderError::Unknown {
                        name: name.to_string(),
                        input: input.to_string(),
                    })?;
                    output.push_str(value);
                }
            }
        }
        Ok(output)
    }
}

/// Check that every placeholder in `input` is one of `known`
pub fn validate(input: &str, mut known: impl FnMut(&str) -> bool) -> Result<(), PlaceholderError> {
    for name in placeholder_names(input)? {
        if !known(name) {
            return Err(PlaceholderError::Unknown {
                name: name.to_string(),
                input: input.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn placeholders() -> Placeholders {
        let mut placeholders = Placeholders::new();
        placeholders.insert("event", "night");
        placeholders.insert("main", "/tmp/bar-abc");
        placeholders
    }

    #[test]
    fn test_interpolate_known_names() {
        let output = placeholders().interpolate("conky -c {main} --event {event}").unwrap();
        assert_eq!(output, "conky -c /tmp/bar-abc --event night");
    }

    #[test]
    fn test_repeated_placeholder() {
        let output = placeholders().interpolate("{event}-{event}").unwrap();
        assert_eq!(output, "night-night");
    }

    #[test]
    fn test_escaped_braces() {
        let output = placeholders().interpolate("awk '{{print $1}}' {event}").unwrap();
        assert_eq!(output, "awk '{print $1}' night");
    }

    #[test]
    fn test_unknown_placeholder() {
        let err = placeholders().interpolate("echo {nope}").unwrap_err();
        assert_eq!(
            err,
            PlaceholderError::Unknown {
                name: "nope".to_string(),
                input: "echo {nope}".to_string()
            }
        );
        assert!(err.to_string().contains("{nope}"));
    }

    #[test]
    fn test_empty_placeholder_is_unknown() {
        let err = placeholders().interpolate("echo {}").unwrap_err();
        assert!(matches!(err, PlaceholderError::Unknown { ref name, .. } if name.is_empty()));
    }

    #[test]
    fn test_unclosed_brace() {
        let err = placeholders().interpolate("echo {event").unwrap_err();
        assert!(matches!(err, PlaceholderError::Unclosed { position: 5, .. }));
    }

    #[test]
    fn test_unmatched_close() {
        let err = placeholders().interpolate("echo event}").unwrap_err();
        assert!(matches!(err, PlaceholderError::UnmatchedClose { position: 10, .. }));
    }

    #[test]
    fn test_placeholder_names() {
        assert_eq!(placeholder_names("{a} {{b}} {c}").unwrap(), vec!["a", "c"]);
    }

    #[test]
    fn test_validate() {
        assert!(validate("{event} {main}", |name| name == "event" || name == "main").is_ok());
        assert!(validate("{other}", |name| name == "event").is_err());
    }

    proptest! {
        #[test]
        fn prop_brace_free_text_is_unchanged(text in "[^{}]*") {
            prop_assert_eq!(placeholders().interpolate(&text).unwrap(), text);
        }

        #[test]
        fn prop_escaped_text_round_trips(text in "[a-z {}]*") {
            let escaped = text.replace('{', "{{").replace('}', "}}");
            prop_assert_eq!(Placeholders::new().interpolate(&escaped).unwrap(), text);
        }
    }
}
