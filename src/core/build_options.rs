// src/core/build_options.rs

//! # Build Options
//!
//! Typed model of the entries of `intro-buildoptions.json`. Each option is a set of common
//! fields plus one [`OptionKind`] payload; every kind knows how to render itself back into a
//! `-D<name>=<value>` override for `meson setup`/`meson configure`.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// The fixed choice list of `feature` options.
pub const FEATURE_CHOICES: [&str; 3] = ["enabled", "disabled", "auto"];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum OptionError {
    #[error("Option '{name}' expects a value of type {expected}.")]
    TypeMismatch { name: String, expected: &'static str },
    #[error("'{value}' is not a valid choice for option '{name}' (choices: {choices}).")]
    InvalidChoice {
        name: String,
        value: String,
        choices: String,
    },
    #[error("'{value}' is not a valid integer for option '{name}'.")]
    InvalidInteger { name: String, value: String },
    #[error("'{value}' is not a valid boolean for option '{name}' (use true or false).")]
    InvalidBoolean { name: String, value: String },
    #[error("Option '{0}' has an unknown type and cannot be changed.")]
    Unsupported(String),
}

/// A value handed to or read from a [`BuildOption`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Integer(i64),
    String(String),
    Boolean(bool),
    List(Vec<String>),
}

/// A choice list plus the index of the selected entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choices {
    choices: Vec<String>,
    current: usize,
}

impl Choices {
    /// Selects `value`; `None` if it is not one of `choices`.
    pub fn new(choices: Vec<String>, value: &str) -> Option<Self> {
        let current = choices.iter().position(|c| c == value)?;
        Some(Self { choices, current })
    }

    pub fn current(&self) -> &str {
        self.choices.get(self.current).map(String::as_str).unwrap_or("")
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    fn select(&mut self, value: &str) -> bool {
        match self.choices.iter().position(|c| c == value) {
            Some(index) => {
                self.current = index;
                true
            }
            None => false,
        }
    }
}

/// The per-type payload of a build option.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionKind {
    Integer(i64),
    String(String),
    Boolean(bool),
    Feature(Choices),
    Combo(Choices),
    Array(Vec<String>),
    /// Anything the generator reports that does not fit one of the known types.
    Unknown(Value),
}

/// One entry of `intro-buildoptions.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOption {
    pub name: String,
    pub section: String,
    pub description: String,
    /// Set when the option belongs to a subproject (`"sub:name"` on the wire).
    pub subproject: Option<String>,
    pub kind: OptionKind,
}

/// Wire shape of a build option as written by `meson introspect`.
#[derive(Deserialize, Debug)]
pub(crate) struct RawBuildOption {
    name: String,
    #[serde(default)]
    section: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "type", default)]
    option_type: String,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    choices: Option<Vec<Value>>,
}

impl From<RawBuildOption> for BuildOption {
    fn from(raw: RawBuildOption) -> Self {
        let kind = match raw.option_type.as_str() {
            "string" => match raw.value.as_str() {
                Some(s) => OptionKind::String(s.to_string()),
                None => OptionKind::Unknown(raw.value),
            },
            "boolean" => match raw.value.as_bool() {
                Some(b) => OptionKind::Boolean(b),
                None => OptionKind::Unknown(raw.value),
            },
            "integer" => match raw.value.as_i64() {
                Some(i) => OptionKind::Integer(i),
                None => OptionKind::Unknown(raw.value),
            },
            "combo" => {
                let choices = raw
                    .choices
                    .unwrap_or_default()
                    .iter()
                    .map(value_to_plain_string)
                    .collect();
                match Choices::new(choices, &value_to_plain_string(&raw.value)) {
                    Some(choices) => OptionKind::Combo(choices),
                    None => OptionKind::Unknown(raw.value),
                }
            }
            "feature" => match Choices::new(
                FEATURE_CHOICES.iter().map(|c| c.to_string()).collect(),
                &value_to_plain_string(&raw.value),
            ) {
                Some(choices) => OptionKind::Feature(choices),
                None => OptionKind::Unknown(raw.value),
            },
            "array" => match raw.value.as_array() {
                Some(items) => OptionKind::Array(items.iter().map(value_to_plain_string).collect()),
                None => OptionKind::Unknown(raw.value),
            },
            _ => OptionKind::Unknown(raw.value),
        };
        Self::new(&raw.name, raw.section, raw.description, kind)
    }
}

impl BuildOption {
    /// Creates an option, splitting a `"sub:name"` encoded name into subproject and name.
    pub fn new(encoded_name: &str, section: String, description: String, kind: OptionKind) -> Self {
        let (subproject, name) = match encoded_name.split_once(':') {
            Some((sub, name)) => (Some(sub.to_string()), name.to_string()),
            None => (None, encoded_name.to_string()),
        };
        Self {
            name,
            section,
            description,
            subproject,
            kind,
        }
    }

    /// Loads one option object; `None` if the object lacks even a name.
    pub fn from_json(value: &Value) -> Option<Self> {
        serde_json::from_value::<RawBuildOption>(value.clone())
            .ok()
            .map(Self::from)
    }

    /// The name as Meson expects it on the command line (`sub:name` for subproject options).
    pub fn full_name(&self) -> String {
        match &self.subproject {
            Some(sub) => format!("{}:{}", sub, self.name),
            None => self.name.clone(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            OptionKind::Integer(_) => "integer",
            OptionKind::String(_) => "string",
            OptionKind::Boolean(_) => "boolean",
            OptionKind::Feature(_) => "feature",
            OptionKind::Combo(_) => "combo",
            OptionKind::Array(_) => "array",
            OptionKind::Unknown(_) => "unknown",
        }
    }

    pub fn choices(&self) -> Option<&[String]> {
        match &self.kind {
            OptionKind::Feature(c) | OptionKind::Combo(c) => Some(c.choices()),
            _ => None,
        }
    }

    pub fn value(&self) -> OptionValue {
        match &self.kind {
            OptionKind::Integer(i) => OptionValue::Integer(*i),
            OptionKind::String(s) => OptionValue::String(s.clone()),
            OptionKind::Boolean(b) => OptionValue::Boolean(*b),
            OptionKind::Feature(c) | OptionKind::Combo(c) => {
                OptionValue::String(c.current().to_string())
            }
            OptionKind::Array(items) => OptionValue::List(items.clone()),
            OptionKind::Unknown(raw) => OptionValue::String(value_to_plain_string(raw)),
        }
    }

    /// The current value rendered the way Meson parses it from `-D`.
    pub fn value_str(&self) -> String {
        match &self.kind {
            OptionKind::Integer(i) => i.to_string(),
            OptionKind::String(s) => s.clone(),
            OptionKind::Boolean(b) => b.to_string(),
            OptionKind::Feature(c) | OptionKind::Combo(c) => c.current().to_string(),
            OptionKind::Array(items) => format!(
                "[{}]",
                items.iter().map(|i| quoted(i)).collect::<Vec<_>>().join(",")
            ),
            OptionKind::Unknown(raw) => value_to_plain_string(raw),
        }
    }

    pub fn set_value(&mut self, value: OptionValue) -> Result<(), OptionError> {
        let name = self.full_name();
        let expected = self.type_name();
        match (&mut self.kind, value) {
            (OptionKind::Integer(current), OptionValue::Integer(i)) => *current = i,
            (OptionKind::String(current), OptionValue::String(s)) => *current = s,
            (OptionKind::Boolean(current), OptionValue::Boolean(b)) => *current = b,
            (OptionKind::Array(current), OptionValue::List(items)) => *current = items,
            (OptionKind::Feature(choices) | OptionKind::Combo(choices), OptionValue::String(s)) => {
                if !choices.select(&s) {
                    return Err(OptionError::InvalidChoice {
                        name,
                        value: s,
                        choices: choices.choices().join(", "),
                    });
                }
            }
            (OptionKind::Unknown(_), _) => return Err(OptionError::Unsupported(name)),
            _ => return Err(OptionError::TypeMismatch { name, expected }),
        }
        Ok(())
    }

    /// Parses `text` according to this option's type and stores it.
    pub fn set_value_str(&mut self, text: &str) -> Result<(), OptionError> {
        let value = match &self.kind {
            OptionKind::Integer(_) => {
                let parsed = text.trim().parse::<i64>().map_err(|_| OptionError::InvalidInteger {
                    name: self.full_name(),
                    value: text.to_string(),
                })?;
                OptionValue::Integer(parsed)
            }
            OptionKind::Boolean(_) => match text.trim().to_ascii_lowercase().as_str() {
                "true" => OptionValue::Boolean(true),
                "false" => OptionValue::Boolean(false),
                _ => {
                    return Err(OptionError::InvalidBoolean {
                        name: self.full_name(),
                        value: text.to_string(),
                    });
                }
            },
            OptionKind::Array(_) => OptionValue::List(parse_list(text)),
            OptionKind::String(_) | OptionKind::Feature(_) | OptionKind::Combo(_) => {
                OptionValue::String(text.to_string())
            }
            OptionKind::Unknown(_) => return Err(OptionError::Unsupported(self.full_name())),
        };
        self.set_value(value)
    }

    /// The command-line override reproducing the current value, e.g. `-Dfoo=true`.
    pub fn meson_arg(&self) -> String {
        format!("-D{}={}", self.full_name(), self.value_str())
    }
}

/// `-D` overrides for every option of `edited` whose value differs from `original`.
pub fn changed_options_as_args(original: &[BuildOption], edited: &[BuildOption]) -> Vec<String> {
    edited
        .iter()
        .filter(|option| !matches!(option.kind, OptionKind::Unknown(_)))
        .filter(|option| {
            original
                .iter()
                .find(|o| o.full_name() == option.full_name())
                .is_none_or(|o| o.kind != option.kind)
        })
        .map(BuildOption::meson_arg)
        .collect()
}

/// Single-quotes an array element unless it already is.
fn quoted(item: &str) -> String {
    if item.len() >= 2 && item.starts_with('\'') && item.ends_with('\'') {
        item.to_string()
    } else {
        format!("'{}'", item)
    }
}

/// Accepts `a,b`, `['a', 'b']` or `["a","b"]`.
fn parse_list(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .unwrap_or(trimmed);
    inner
        .split(',')
        .map(|item| item.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn value_to_plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
