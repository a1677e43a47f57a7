use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// One configuration document: a file and the variables to sweep in it.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileSpec {
    pub path: PathBuf,
    pub configurations: Vec<VariableSpec>,
}

/// A `(line_number, variable, value)` entry of a [`FileSpec`].
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct VariableSpec {
    /// 1-based line number
    pub line_number: usize,
    pub variable: String,
    pub value: ParamValue,
}

/// Candidate value(s) for one variable.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ParamValue {
    List(Vec<Scalar>),
    Scalar(Scalar),
}

impl ParamValue {
    /// Candidates in declaration order; a scalar is a one-element axis.
    pub fn into_candidates(self) -> Vec<Scalar> {
        match self {
            ParamValue::List(values) => values,
            ParamValue::Scalar(value) => vec![value],
        }
    }

    pub fn cardinality(&self) -> usize {
        match self {
            ParamValue::List(values) => values.len(),
            ParamValue::Scalar(_) => 1,
        }
    }
}

/// A value that can be written into a line of text.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    /// Integers above `i64::MAX`
    UInt(u64),
    Float(f64),
    String(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(true) => f.write_str("True"),
            Scalar::Bool(false) => f.write_str("False"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::UInt(u) => write!(f, "{u}"),
            Scalar::Float(x) => write_float(f, *x),
            Scalar::String(s) => f.write_str(s),
        }
    }
}

/// Shortest round-trip spelling: `1.0` for integral values, exponent form
/// (`1e-05`, `1.5e+16`) below 1e-4 and from 1e16 up.
fn write_float(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
    if x.is_nan() {
        return f.write_str("nan");
    }
    if x.is_infinite() {
        return f.write_str(if x > 0.0 { "inf" } else { "-inf" });
    }

    let magnitude = x.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let exp_form = format!("{x:e}");
        let (mantissa, exponent) = exp_form.split_once('e').unwrap_or((exp_form.as_str(), "0"));
        let (sign, digits) = match exponent.strip_prefix('-') {
            Some(digits) => ('-', digits),
            None => ('+', exponent),
        };
        return write!(f, "{mantissa}e{sign}{digits:0>2}");
    }

    if x.fract() == 0.0 {
        write!(f, "{x:.1}")
    } else {
        write!(f, "{x}")
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<f64> for Scalar {
    fn from(x: f64) -> Self {
        Scalar::Float(x)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

/// Check a parsed configuration, collecting every issue.
pub fn validate(specs: &[FileSpec]) -> Result<(), ValidationError> {
    let mut issues = Vec::new();

    for (document, spec) in specs.iter().enumerate() {
        if spec.path.as_os_str().is_empty() {
            issues.push(ValidationIssue::MissingField {
                document,
                field: "path",
            });
        }

        for (entry, config) in spec.configurations.iter().enumerate() {
            if config.line_number == 0 {
                issues.push(ValidationIssue::InvalidLineNumber { document, entry });
            }
            if config.variable.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    document,
                    field: "variable",
                });
            }
            if config.value.cardinality() == 0 {
                issues.push(ValidationIssue::EmptyValueList {
                    document,
                    variable: config.variable.clone(),
                });
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { issues })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.is_empty() {
            return write!(f, "configuration validation failed");
        }
        write!(f, "configuration validation failed: ")?;
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Document and entry indices are 0-based, as they appear in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingField {
        document: usize,
        field: &'static str,
    },
    InvalidLineNumber {
        document: usize,
        entry: usize,
    },
    EmptyValueList {
        document: usize,
        variable: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { document, field } => {
                write!(f, "document {document}: missing or empty {field}")
            }
            ValidationIssue::InvalidLineNumber { document, entry } => {
                write!(
                    f,
                    "document {document}, configuration {entry}: line_number must be 1 or greater"
                )
            }
            ValidationIssue::EmptyValueList { document, variable } => {
                write!(f, "document {document}: `{variable}` has an empty value list")
            }
        }
    }
}
