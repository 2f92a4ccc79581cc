//! Named custom hooks, the one escape hatch in an otherwise declarative
//! rule set.
//!
//! A hook runs once, after the raw→intermediate rename, and may add or
//! overwrite intermediate columns. Hooks are a closed enum dispatched by
//! name, not arbitrary code.

use serde::{Deserialize, Serialize};

use crate::table::RawTable;

/// The custom hooks sources are allowed to request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum HookKind {
    /// Join two name-part columns into one contact name.
    CombineContactName {
        first: String,
        last: String,
        output: String,
    },

    /// Fill a column with a fixed value wherever it is empty.
    DefaultColumn { column: String, value: String },

    /// Copy the first non-empty of several id-like columns into the output.
    FirstNonEmpty {
        inputs: Vec<String>,
        output: String,
    },
}

impl HookKind {
    /// Apply the hook to every row of the renamed table.
    pub fn apply(&self, table: &mut RawTable) {
        match self {
            Self::CombineContactName {
                first,
                last,
                output,
            } => {
                for i in 0..table.len() {
                    let joined = [table.get(i, first), table.get(i, last)]
                        .into_iter()
                        .flatten()
                        .collect::<Vec<_>>()
                        .join(" ");
                    if !joined.is_empty() {
                        table.set(i, output, joined);
                    }
                }
                table.ensure_column(output);
            }
            Self::DefaultColumn { column, value } => {
                table.ensure_column(column);
                for i in 0..table.len() {
                    if table.get(i, column).is_none() {
                        table.set(i, column, value.clone());
                    }
                }
            }
            Self::FirstNonEmpty { inputs, output } => {
                for i in 0..table.len() {
                    let found = inputs
                        .iter()
                        .find_map(|col| table.get(i, col).map(str::to_string));
                    if let Some(v) = found {
                        table.set(i, output, v);
                    }
                }
                table.ensure_column(output);
            }
        }
    }
}
