use std::collections::BTreeSet;

use crate::{Error, Result};

/// How a parameter reference is used by the front end. Inferred from which
/// list the reference appears in, not from an explicit tag in the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Read,
    Write,
    Status,
    Special,
}

/// One parameter reference inside a menu node: a canonical address or a
/// symbolic name, with an optional more specific permission tag.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamRef {
    pub name: String,
    pub permission: Option<String>,
}

impl ParamRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            permission: None,
        }
    }
}

/// One entry in the hierarchical navigation tree extracted from a menu
/// bundle. Display names are i18n keys resolved lazily against the catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MenuNode {
    pub path_segment: String,
    pub display_name_key: String,
    pub icon_tag: Option<String>,
    /// Permission token captured textually from the bundle (dotted-access
    /// expressions included); `None` means unrestricted.
    pub required_permission: Option<String>,
    pub read_refs: Vec<ParamRef>,
    pub write_refs: Vec<ParamRef>,
    pub status_refs: Vec<ParamRef>,
    pub special_refs: Vec<ParamRef>,
    pub children: Vec<MenuNode>,
}

impl MenuNode {
    pub fn ref_count(&self) -> usize {
        self.read_refs.len() + self.write_refs.len() + self.status_refs.len() + self.special_refs.len()
    }

    pub fn refs(&self, kind: RefKind) -> &[ParamRef] {
        match kind {
            RefKind::Read => &self.read_refs,
            RefKind::Write => &self.write_refs,
            RefKind::Status => &self.status_refs,
            RefKind::Special => &self.special_refs,
        }
    }
}

/// Condition logic of a command rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleLogic {
    All,
    Any,
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleBranch {
    If,
    ElseIf,
    Else,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleCondition {
    pub operator: String,
    pub expected: serde_json::Value,
    pub target_addresses: Vec<String>,
}

/// One conditional automation rule attached to a parameter mapping.
/// An `Else` branch is an unconditional fallback and carries no conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRule {
    pub logic: RuleLogic,
    pub branch: RuleBranch,
    pub command: String,
    pub command_value: Option<serde_json::Value>,
    pub conditions: Vec<RuleCondition>,
}

/// Filter a menu tree down to what `granted` may see.
///
/// Permission tokens match by exact string equality only; ambiguous tokens
/// fail closed. The surviving tree is a stable subsequence of the input:
/// nothing is reordered. Container nodes left with zero visible children and
/// zero visible parameter refs are pruned. Returns `Ok(None)` when the root
/// itself is not visible.
///
/// A malformed tree (an empty-string permission token anywhere) fails loudly
/// rather than passing nodes through unfiltered.
pub fn filter_menu(tree: &MenuNode, granted: &BTreeSet<String>) -> Result<Option<MenuNode>> {
    if let Some(tok) = &tree.required_permission {
        if tok.is_empty() {
            return Err(Error::PermissionFilter(format!(
                "empty permission token on node {:?}",
                tree.path_segment
            )));
        }
        if !granted.contains(tok) {
            return Ok(None);
        }
    }

    let mut filtered = MenuNode {
        path_segment: tree.path_segment.clone(),
        display_name_key: tree.display_name_key.clone(),
        icon_tag: tree.icon_tag.clone(),
        required_permission: tree.required_permission.clone(),
        read_refs: filter_refs(&tree.read_refs, granted)?,
        write_refs: filter_refs(&tree.write_refs, granted)?,
        status_refs: filter_refs(&tree.status_refs, granted)?,
        special_refs: filter_refs(&tree.special_refs, granted)?,
        children: Vec::new(),
    };

    for child in &tree.children {
        if let Some(visible) = filter_menu(child, granted)? {
            filtered.children.push(visible);
        }
    }

    // A container that ended up empty is hidden entirely.
    if !tree.children.is_empty() || tree.ref_count() > 0 {
        if filtered.children.is_empty() && filtered.ref_count() == 0 {
            return Ok(None);
        }
    }

    Ok(Some(filtered))
}

/// Refs inherit the enclosing node's visibility unless they carry their own,
/// more specific tag.
fn filter_refs(refs: &[ParamRef], granted: &BTreeSet<String>) -> Result<Vec<ParamRef>> {
    let mut out = Vec::with_capacity(refs.len());
    for r in refs {
        match &r.permission {
            Some(tok) if tok.is_empty() => {
                return Err(Error::PermissionFilter(format!(
                    "empty permission token on ref {:?}",
                    r.name
                )));
            }
            Some(tok) if !granted.contains(tok) => {}
            _ => out.push(r.clone()),
        }
    }
    Ok(out)
}
