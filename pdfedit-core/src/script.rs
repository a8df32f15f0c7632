use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::info;

use crate::error::{EditError, EditResult};
use crate::pages::{DocumentView, MergePosition};
use crate::selection::Selection;

#[derive(Debug, Clone, PartialEq)]
pub enum EditStep {
    Delete(Selection),
    Keep(Selection),
    Duplicate(Selection),
    Rotate { selection: Selection, degrees: i32 },
    Merge { position: MergePosition, path: PathBuf },
    Move { selection: Selection, to: usize },
}

impl FromStr for EditStep {
    type Err = EditError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (verb, args) = text
            .split_once('=')
            .ok_or_else(|| EditError::invalid_step(text, "expected `verb=arguments`"))?;
        let args = args.trim();
        let selection = |raw: &str| raw.parse::<Selection>().unwrap_or(Selection::None);

        match verb.trim().to_ascii_lowercase().as_str() {
            "delete" => Ok(EditStep::Delete(selection(args))),
            "keep" => Ok(EditStep::Keep(selection(args))),
            "duplicate" => Ok(EditStep::Duplicate(selection(args))),
            "rotate" => {
                let (raw, degrees) = split_at_sign(text, args)?;
                let degrees = degrees
                    .parse()
                    .map_err(|_| EditError::invalid_step(text, "rotation must be an integer"))?;
                Ok(EditStep::Rotate {
                    selection: selection(raw),
                    degrees,
                })
            }
            "merge" => {
                let (position, path) = args
                    .split_once('@')
                    .ok_or_else(|| EditError::invalid_step(text, "expected `position@path`"))?;
                if path.trim().is_empty() {
                    return Err(EditError::invalid_step(text, "missing file to merge"));
                }
                Ok(EditStep::Merge {
                    position: position.parse()?,
                    path: PathBuf::from(path.trim()),
                })
            }
            "move" => {
                let (raw, to) = split_at_sign(text, args)?;
                let to: usize = to
                    .parse()
                    .ok()
                    .filter(|to| *to >= 1)
                    .ok_or_else(|| EditError::invalid_step(text, "target must be a page >= 1"))?;
                Ok(EditStep::Move {
                    selection: selection(raw),
                    to: to - 1,
                })
            }
            other => Err(EditError::invalid_step(
                text,
                format!("unknown operation `{}`", other),
            )),
        }
    }
}

fn split_at_sign<'a>(step: &str, args: &'a str) -> EditResult<(&'a str, &'a str)> {
    args.rsplit_once('@')
        .map(|(left, right)| (left.trim(), right.trim()))
        .ok_or_else(|| EditError::invalid_step(step, "expected `pages@value`"))
}

impl fmt::Display for EditStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditStep::Delete(sel) => write!(f, "delete {:?}", sel),
            EditStep::Keep(sel) => write!(f, "keep {:?}", sel),
            EditStep::Duplicate(sel) => write!(f, "duplicate {:?}", sel),
            EditStep::Rotate { selection, degrees } => {
                write!(f, "rotate {:?} by {}", selection, degrees)
            }
            EditStep::Merge { position, path } => {
                write!(f, "merge {} at {:?}", path.display(), position)
            }
            EditStep::Move { selection, to } => write!(f, "move {:?} to {}", selection, to + 1),
        }
    }
}

pub fn parse_steps<I, S>(steps: I) -> EditResult<Vec<EditStep>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    steps.into_iter().map(|step| step.as_ref().parse()).collect()
}

impl DocumentView {
    pub fn apply_step(&mut self, step: &EditStep) -> EditResult<usize> {
        let affected = match step {
            EditStep::Delete(selection) => {
                let ids = self.ids_for(selection);
                self.delete(&ids)
            }
            EditStep::Keep(selection) => {
                let keep = self.ids_for(selection);
                let ids: Vec<_> = self
                    .ids()
                    .into_iter()
                    .filter(|id| !keep.contains(id))
                    .collect();
                self.delete(&ids)
            }
            EditStep::Duplicate(selection) => {
                let ids = self.ids_for(selection);
                self.duplicate(&ids).len()
            }
            EditStep::Rotate { selection, degrees } => {
                let ids = self.ids_for(selection);
                self.rotate(&ids, *degrees)?
            }
            EditStep::Merge { position, path } => self.merge(path, *position)?.len(),
            EditStep::Move { selection, to } => {
                let ids = self.ids_for(selection);
                self.move_pages(&ids, *to)
            }
        };
        info!(%step, affected, "applied edit step");
        Ok(affected)
    }

    /// Runs `steps` in order, stopping at the first failure. Steps that ran
    /// before the failure stay applied.
    pub fn apply_steps(&mut self, steps: &[EditStep]) -> EditResult<usize> {
        let mut affected = 0;
        for step in steps {
            affected += self.apply_step(step)?;
        }
        Ok(affected)
    }
}
