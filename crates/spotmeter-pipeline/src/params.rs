//! Named, typed parameters attached to a process step.
//!
//! A [`ParameterSet`] is read freely, but values can only be written
//! through [`ProcessStep::set_parameter`](crate::ProcessStep::set_parameter)
//! so that every write marks the owning step outdated.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors raised when reading or writing parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterError {
    /// No parameter with this name exists in the set.
    #[error("unknown parameter `{0}`")]
    Unknown(String),

    /// Two parameters in one set share a name.
    #[error("duplicate parameter `{0}`")]
    Duplicate(String),

    /// The value has a different type than the parameter.
    #[error("parameter `{name}` expects {expected}, got {found}")]
    TypeMismatch {
        /// Parameter name.
        name: String,
        /// Expected value type.
        expected: &'static str,
        /// Supplied value type.
        found: &'static str,
    },

    /// A numeric value lies outside the parameter's range or step grid.
    #[error("parameter `{name}` value {value} is outside {min}..={max} (step {step})")]
    OutOfRange {
        /// Parameter name.
        name: String,
        /// Rejected value.
        value: f64,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
        /// Step size.
        step: f64,
    },

    /// A choice value is not one of the options.
    #[error("parameter `{name}` has no option `{value}`")]
    InvalidChoice {
        /// Parameter name.
        name: String,
        /// Rejected value.
        value: String,
    },
}

/// A parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamValue {
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Boolean flag.
    Bool(bool),
    /// Choice option or free text (e.g. a file path).
    Text(String),
}

impl ParamValue {
    const fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "an integer",
            Self::Float(_) => "a number",
            Self::Bool(_) => "a boolean",
            Self::Text(_) => "text",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// The shape of values a parameter accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamKind {
    /// Integer slider over `min..=max`, in increments of `step` from `min`.
    IntRange {
        /// Lower bound.
        min: i64,
        /// Upper bound.
        max: i64,
        /// Increment.
        step: i64,
    },
    /// Float slider over `min..=max`.
    FloatRange {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
        /// Suggested increment for interactive controls.
        step: f64,
    },
    /// On/off flag.
    Bool,
    /// One of a fixed list of options.
    Choice {
        /// Allowed options.
        options: Vec<String>,
    },
    /// Free text, typically a file path.
    Text,
}

/// A single named parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    name: String,
    value: ParamValue,
    kind: ParamKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    description: String,
}

impl Parameter {
    /// Integer parameter with step 1.
    #[must_use]
    pub fn int_range(name: &str, value: i64, min: i64, max: i64) -> Self {
        Self::int_range_stepped(name, value, min, max, 1)
    }

    /// Integer parameter restricted to `min, min + step, ...`.
    #[must_use]
    pub fn int_range_stepped(name: &str, value: i64, min: i64, max: i64, step: i64) -> Self {
        Self {
            name: name.to_string(),
            value: ParamValue::Int(value),
            kind: ParamKind::IntRange {
                min,
                max,
                step: step.max(1),
            },
            description: String::new(),
        }
    }

    /// Float parameter.
    #[must_use]
    pub fn float_range(name: &str, value: f64, min: f64, max: f64, step: f64) -> Self {
        Self {
            name: name.to_string(),
            value: ParamValue::Float(value),
            kind: ParamKind::FloatRange { min, max, step },
            description: String::new(),
        }
    }

    /// Boolean flag.
    #[must_use]
    pub fn boolean(name: &str, value: bool) -> Self {
        Self {
            name: name.to_string(),
            value: ParamValue::Bool(value),
            kind: ParamKind::Bool,
            description: String::new(),
        }
    }

    /// Choice among `options`; the first option is the initial value.
    #[must_use]
    pub fn choice(name: &str, options: &[&str]) -> Self {
        let options: Vec<String> = options.iter().map(ToString::to_string).collect();
        Self {
            name: name.to_string(),
            value: ParamValue::Text(options.first().cloned().unwrap_or_default()),
            kind: ParamKind::Choice { options },
            description: String::new(),
        }
    }

    /// Free-text parameter.
    #[must_use]
    pub fn text(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: ParamValue::Text(value.to_string()),
            kind: ParamKind::Text,
            description: String::new(),
        }
    }

    /// Attach a human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value.
    #[must_use]
    pub const fn value(&self) -> &ParamValue {
        &self.value
    }

    /// Accepted values.
    #[must_use]
    pub const fn kind(&self) -> &ParamKind {
        &self.kind
    }

    /// Human-readable description (may be empty).
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Check `value` against this parameter's kind, returning the value
    /// as it would be stored.
    ///
    /// # Errors
    ///
    /// Returns a [`ParameterError`] describing why the value is rejected.
    #[allow(clippy::cast_precision_loss)]
    pub fn validate(&self, value: ParamValue) -> Result<ParamValue, ParameterError> {
        let mismatch = |expected: &'static str, found: &ParamValue| ParameterError::TypeMismatch {
            name: self.name.clone(),
            expected,
            found: found.type_name(),
        };
        match (&self.kind, value) {
            (&ParamKind::IntRange { min, max, step }, ParamValue::Int(v)) => {
                if v < min || v > max || (v - min) % step != 0 {
                    return Err(ParameterError::OutOfRange {
                        name: self.name.clone(),
                        value: v as f64,
                        min: min as f64,
                        max: max as f64,
                        step: step as f64,
                    });
                }
                Ok(ParamValue::Int(v))
            }
            (ParamKind::FloatRange { .. }, ParamValue::Int(i)) => {
                self.validate(ParamValue::Float(i as f64))
            }
            (&ParamKind::FloatRange { min, max, step }, ParamValue::Float(v)) => {
                if !(min..=max).contains(&v) {
                    return Err(ParameterError::OutOfRange {
                        name: self.name.clone(),
                        value: v,
                        min,
                        max,
                        step,
                    });
                }
                Ok(ParamValue::Float(v))
            }
            (ParamKind::Bool, ParamValue::Bool(v)) => Ok(ParamValue::Bool(v)),
            (ParamKind::Choice { options }, ParamValue::Text(v)) => {
                if options.iter().any(|o| *o == v) {
                    Ok(ParamValue::Text(v))
                } else {
                    Err(ParameterError::InvalidChoice {
                        name: self.name.clone(),
                        value: v,
                    })
                }
            }
            (ParamKind::Text, ParamValue::Text(v)) => Ok(ParamValue::Text(v)),
            (ParamKind::IntRange { .. }, other) => Err(mismatch("an integer", &other)),
            (ParamKind::FloatRange { .. }, other) => Err(mismatch("a number", &other)),
            (ParamKind::Bool, other) => Err(mismatch("a boolean", &other)),
            (ParamKind::Choice { .. } | ParamKind::Text, other) => Err(mismatch("text", &other)),
        }
    }

    /// Read `text` as a value of this parameter's kind and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::TypeMismatch`] if `text` does not parse,
    /// or any error of [`Self::validate`].
    pub fn parse(&self, text: &str) -> Result<ParamValue, ParameterError> {
        let unparsable = |expected: &'static str| ParameterError::TypeMismatch {
            name: self.name.clone(),
            expected,
            found: "text",
        };
        let value = match self.kind {
            ParamKind::IntRange { .. } => ParamValue::Int(
                text.trim()
                    .parse()
                    .map_err(|_| unparsable("an integer"))?,
            ),
            ParamKind::FloatRange { .. } => ParamValue::Float(
                text.trim()
                    .parse()
                    .map_err(|_| unparsable("a number"))?,
            ),
            ParamKind::Bool => ParamValue::Bool(
                text.trim()
                    .parse()
                    .map_err(|_| unparsable("a boolean"))?,
            ),
            ParamKind::Choice { .. } | ParamKind::Text => ParamValue::Text(text.to_string()),
        };
        self.validate(value)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// An ordered set of uniquely named parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    parameters: Vec<Parameter>,
}

impl ParameterSet {
    /// Build a set, rejecting duplicate names.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Duplicate`] if two parameters share a name.
    pub fn new(parameters: Vec<Parameter>) -> Result<Self, ParameterError> {
        for (i, p) in parameters.iter().enumerate() {
            if parameters[..i].iter().any(|q| q.name == p.name) {
                return Err(ParameterError::Duplicate(p.name.clone()));
            }
        }
        Ok(Self { parameters })
    }

    /// Build a set from parameters known to have distinct names.
    pub(crate) fn from_distinct(parameters: Vec<Parameter>) -> Self {
        debug_assert!(Self::new(parameters.clone()).is_ok());
        Self { parameters }
    }

    /// A set with no parameters.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Returns `true` if the set holds no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Iterate in declaration order.
    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.parameters.iter()
    }

    /// Parameter names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(Parameter::name)
    }

    /// Look up a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Current value of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Unknown`] if there is no such parameter.
    pub fn value(&self, name: &str) -> Result<&ParamValue, ParameterError> {
        self.get(name)
            .map(Parameter::value)
            .ok_or_else(|| ParameterError::Unknown(name.to_string()))
    }

    /// Integer value of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError`] if the parameter is missing or not an integer.
    pub fn int(&self, name: &str) -> Result<i64, ParameterError> {
        match self.value(name)? {
            ParamValue::Int(v) => Ok(*v),
            other => Err(ParameterError::TypeMismatch {
                name: name.to_string(),
                expected: "an integer",
                found: other.type_name(),
            }),
        }
    }

    /// Numeric value of `name`; integers are widened.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError`] if the parameter is missing or not numeric.
    #[allow(clippy::cast_precision_loss)]
    pub fn float(&self, name: &str) -> Result<f64, ParameterError> {
        match self.value(name)? {
            ParamValue::Float(v) => Ok(*v),
            ParamValue::Int(v) => Ok(*v as f64),
            other => Err(ParameterError::TypeMismatch {
                name: name.to_string(),
                expected: "a number",
                found: other.type_name(),
            }),
        }
    }

    /// Boolean value of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError`] if the parameter is missing or not a boolean.
    pub fn bool(&self, name: &str) -> Result<bool, ParameterError> {
        match self.value(name)? {
            ParamValue::Bool(v) => Ok(*v),
            other => Err(ParameterError::TypeMismatch {
                name: name.to_string(),
                expected: "a boolean",
                found: other.type_name(),
            }),
        }
    }

    /// Text or choice value of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError`] if the parameter is missing or not text.
    pub fn text(&self, name: &str) -> Result<&str, ParameterError> {
        match self.value(name)? {
            ParamValue::Text(v) => Ok(v),
            other => Err(ParameterError::TypeMismatch {
                name: name.to_string(),
                expected: "text",
                found: other.type_name(),
            }),
        }
    }

    /// Validate and store a new value. Only reachable through the owning
    /// step, which records the write.
    pub(crate) fn set(&mut self, name: &str, value: ParamValue) -> Result<(), ParameterError> {
        let parameter = self
            .parameters
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| ParameterError::Unknown(name.to_string()))?;
        parameter.value = parameter.validate(value)?;
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for p in &self.parameters {
            writeln!(f, "- {p}")?;
        }
        Ok(())
    }
}
