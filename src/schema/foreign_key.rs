//! Referential constraints: a child table's ordered FK column list, the
//! referenced key columns on the parent, and the declared actions for
//! UPDATE and DELETE on the parent side.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferentialAction {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    /// NO ACTION and RESTRICT both reject the mutation when a referencing
    /// row exists; this core checks them at the same point.
    pub fn is_restrict(&self) -> bool {
        matches!(self, ReferentialAction::NoAction | ReferentialAction::Restrict)
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyDef {
    name: String,
    child_table: u64,
    parent_table: u64,
    child_columns: Vec<usize>,
    parent_columns: Vec<usize>,
    update_action: ReferentialAction,
    delete_action: ReferentialAction,
}

impl ForeignKeyDef {
    pub fn new(
        name: impl Into<String>,
        child_table: u64,
        child_columns: Vec<usize>,
        parent_table: u64,
        parent_columns: Vec<usize>,
    ) -> Self {
        Self {
            name: name.into(),
            child_table,
            parent_table,
            child_columns,
            parent_columns,
            update_action: ReferentialAction::NoAction,
            delete_action: ReferentialAction::NoAction,
        }
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.update_action = action;
        self
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.delete_action = action;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn child_table(&self) -> u64 {
        self.child_table
    }

    pub fn parent_table(&self) -> u64 {
        self.parent_table
    }

    pub fn child_columns(&self) -> &[usize] {
        &self.child_columns
    }

    pub fn parent_columns(&self) -> &[usize] {
        &self.parent_columns
    }

    pub fn update_action(&self) -> ReferentialAction {
        self.update_action
    }

    pub fn delete_action(&self) -> ReferentialAction {
        self.delete_action
    }

    pub fn is_self_referencing(&self) -> bool {
        self.child_table == self.parent_table
    }
}
