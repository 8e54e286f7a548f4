//! Hierarchy normalizer
//!
//! Whatever shape the resolver produced, the result here is one ordered map
//! from group path to flat table. Downstream code never learns whether the
//! file was opened as a tree, as a set of groups, or as a single table.

use crate::data_source::{normalize_group_path, GroupTable, OpenedDataset};
use crate::errors::{BackendError, BackendResult};
use crate::repr::{self, ReprLimits};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// How the canonical tree was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeOrigin {
    Tree,
    Grouped,
    Flat,
}

/// Ordered group path → table map for one request.
///
/// Tables are closed by [`CanonicalTree::close`] on the happy path and by
/// their `Drop` implementation on every other path.
#[derive(Debug)]
pub struct CanonicalTree {
    groups: BTreeMap<String, GroupTable>,
    origin: TreeOrigin,
}

impl CanonicalTree {
    pub fn origin(&self) -> TreeOrigin {
        self.origin
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &GroupTable)> {
        self.groups.iter().map(|(path, table)| (path.as_str(), table))
    }

    pub fn group(&self, path: &str) -> Option<&GroupTable> {
        self.groups.get(&normalize_group_path(path))
    }

    /// Per-group plain-text summaries.
    pub fn text_reprs(&self, limits: &ReprLimits) -> BTreeMap<String, String> {
        self.groups
            .iter()
            .map(|(path, table)| (path.clone(), repr::text_repr(table, limits.text_max_rows)))
            .collect()
    }

    /// Per-group HTML summaries.
    pub fn markup_reprs(&self, limits: &ReprLimits) -> BTreeMap<String, String> {
        self.groups
            .iter()
            .map(|(path, table)| (path.clone(), repr::markup_repr(table, limits.markup_max_rows)))
            .collect()
    }

    /// Whole-tree text summary: the root alone for a single group, otherwise
    /// every group under its own header.
    pub fn text_repr(&self, limits: &ReprLimits) -> String {
        match self.single_root() {
            Some(root) => repr::text_repr(root, limits.text_max_rows),
            None => repr::join_text_groups(
                self.groups()
                    .map(|(path, table)| (path, repr::text_repr(table, limits.text_max_rows))),
            ),
        }
    }

    /// Whole-tree HTML summary, same layout rules as [`Self::text_repr`].
    pub fn markup_repr(&self, limits: &ReprLimits) -> String {
        match self.single_root() {
            Some(root) => repr::markup_repr(root, limits.markup_max_rows),
            None => repr::join_markup_groups(
                self.groups()
                    .map(|(path, table)| (path, repr::markup_repr(table, limits.markup_max_rows))),
            ),
        }
    }

    fn single_root(&self) -> Option<&GroupTable> {
        if self.groups.len() == 1 {
            self.groups.get("/")
        } else {
            None
        }
    }

    /// Release every table.
    pub fn close(mut self) {
        for (path, table) in self.groups.iter_mut() {
            debug!(group = %path, "closing group");
            table.close();
        }
        info!(groups = self.groups.len(), "closed dataset");
    }
}

/// Reconcile any opened shape into a [`CanonicalTree`].
pub fn normalize(dataset: OpenedDataset) -> BackendResult<CanonicalTree> {
    let (groups, origin) = match dataset {
        OpenedDataset::Tree(mut handle) => {
            let mut groups = BTreeMap::new();
            let paths = handle.group_paths();
            let built = paths.and_then(|paths| {
                for path in paths {
                    let path = normalize_group_path(&path);
                    let table = handle.group_table(&path)?;
                    groups.insert(path, table);
                }
                Ok(())
            });
            handle.close();
            built?;
            (groups, TreeOrigin::Tree)
        }
        OpenedDataset::Grouped(tables) => {
            let groups = tables
                .into_iter()
                .map(|(path, table)| (normalize_group_path(&path), table))
                .collect();
            (groups, TreeOrigin::Grouped)
        }
        OpenedDataset::Flat(table) => {
            let mut groups = BTreeMap::new();
            groups.insert("/".to_string(), table);
            (groups, TreeOrigin::Flat)
        }
    };

    if !groups.contains_key("/") {
        return Err(BackendError::decode("dataset has no root group"));
    }
    debug!(groups = groups.len(), ?origin, "normalized dataset");
    Ok(CanonicalTree { groups, origin })
}
