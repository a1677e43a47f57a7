//! Expansion of a sweep configuration into concrete edit strategies.
//!
//! Every `(path, line_number, variable)` entry is one axis. Strategies are
//! the Cartesian product of all axes in declaration order, with the first
//! axis varying slowest and the last axis varying fastest:
//!
//! ```text
//! example.py   LR    = [0.1, 0.2]      ->  #1  LR=0.1 DECAY=0.5 FACTOR=2
//! example.py   DECAY = [0.5, 0.9]          #2  LR=0.1 DECAY=0.9 FACTOR=2
//! example_2.py FACTOR = 2                  #3  LR=0.2 DECAY=0.5 FACTOR=2
//!                                          #4  LR=0.2 DECAY=0.9 FACTOR=2
//! ```
//!
//! Axes with identical keys are not merged; both are applied, in order.

use crate::config::schema::{FileSpec, Scalar};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// One override point together with its candidate values.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterAxis {
    pub path: PathBuf,
    pub line_number: usize,
    pub variable: String,
    pub values: Vec<Scalar>,
}

/// A single `(line, variable, value)` instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct EditDirective {
    pub line_number: usize,
    pub variable: String,
    pub value: Scalar,
}

impl fmt::Display for EditDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}={}", self.line_number, self.variable, self.value)
    }
}

/// Ordered directives for one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileEditPlan {
    pub directives: Vec<EditDirective>,
}

impl FileEditPlan {
    /// Directives grouped by line number, declaration order kept within a line.
    pub fn by_line(&self) -> BTreeMap<usize, Vec<&EditDirective>> {
        let mut lines: BTreeMap<usize, Vec<&EditDirective>> = BTreeMap::new();
        for directive in &self.directives {
            lines.entry(directive.line_number).or_default().push(directive);
        }
        lines
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}

impl fmt::Display for FileEditPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, directive) in self.directives.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{directive}")?;
        }
        write!(f, "]")
    }
}

/// One fully resolved combination: a plan for every file, in the order the
/// files were first declared.
#[derive(Debug, Clone, PartialEq)]
pub struct EditStrategy {
    /// 0-based position in the sweep
    pub index: usize,
    pub files: Vec<(PathBuf, FileEditPlan)>,
}

impl EditStrategy {
    pub fn plan_for(&self, path: &Path) -> Option<&FileEditPlan> {
        self.files
            .iter()
            .find(|(file, _)| file == path)
            .map(|(_, plan)| plan)
    }
}

impl fmt::Display for EditStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (path, plan)) in self.files.iter().enumerate() {
            if idx > 0 {
                write!(f, " ")?;
            }
            write!(f, "{} {}", path.display(), plan)?;
        }
        Ok(())
    }
}

/// Flatten file specs into axes, in declaration order.
pub fn axes(specs: &[FileSpec]) -> Vec<ParameterAxis> {
    specs
        .iter()
        .flat_map(|spec| {
            spec.configurations.iter().map(move |config| ParameterAxis {
                path: spec.path.clone(),
                line_number: config.line_number,
                variable: config.variable.clone(),
                values: config.value.clone().into_candidates(),
            })
        })
        .collect()
}

/// Number of strategies the axes expand to, `None` on overflow.
pub fn strategy_count(axes: &[ParameterAxis]) -> Option<usize> {
    axes.iter()
        .try_fold(1usize, |acc, axis| acc.checked_mul(axis.values.len()))
}

/// Expand file specs into every edit strategy.
///
/// Zero axes yield exactly one strategy (with an empty plan for each declared
/// file); an axis with no candidates yields none.
pub fn expand(specs: &[FileSpec]) -> Vec<EditStrategy> {
    let axes = axes(specs);

    // Every strategy touches the same files, including ones with no entries.
    let mut file_order: Vec<PathBuf> = Vec::new();
    for spec in specs {
        if !file_order.contains(&spec.path) {
            file_order.push(spec.path.clone());
        }
    }

    if axes.iter().any(|axis| axis.values.is_empty()) {
        return Vec::new();
    }

    let mut strategies = Vec::with_capacity(strategy_count(&axes).unwrap_or(0));
    // Odometer over candidate indices; the last axis turns fastest.
    let mut cursor = vec![0usize; axes.len()];

    loop {
        let mut files: Vec<(PathBuf, FileEditPlan)> = file_order
            .iter()
            .map(|path| (path.clone(), FileEditPlan::default()))
            .collect();

        for (axis, &choice) in axes.iter().zip(&cursor) {
            if let Some((_, plan)) = files.iter_mut().find(|(path, _)| path == &axis.path) {
                plan.directives.push(EditDirective {
                    line_number: axis.line_number,
                    variable: axis.variable.clone(),
                    value: axis.values[choice].clone(),
                });
            }
        }

        strategies.push(EditStrategy {
            index: strategies.len(),
            files,
        });

        if !advance(&mut cursor, &axes) {
            break;
        }
    }

    strategies
}

fn advance(cursor: &mut [usize], axes: &[ParameterAxis]) -> bool {
    for position in (0..cursor.len()).rev() {
        cursor[position] += 1;
        if cursor[position] < axes[position].values.len() {
            return true;
        }
        cursor[position] = 0;
    }
    false
}
