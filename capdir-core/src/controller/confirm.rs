//! src/controller/confirm.rs
//!
//! Confirmation steps the engine cannot decide on its own. A UI implements
//! [`Confirmer`] with dialogs; the CLI prompts on stdin.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::operators::tree_copy::CopyReport;

/// What to do after a folder copy finished with failed items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialCopyChoice {
    /// Keep the source and the incomplete destination.
    KeepBoth,

    /// Remove the source anyway.
    DeleteSource,
}

#[async_trait]
pub trait Confirmer: Send + Sync + Debug {
    /// Asked before a folder rename starts copying.
    async fn confirm_directory_rename(&self, old_name: &str, new_name: &str) -> bool;

    /// Asked when the folder copy reported errors.
    async fn resolve_partial_copy(
        &self,
        old_name: &str,
        new_name: &str,
        report: &CopyReport,
    ) -> PartialCopyChoice;

    /// Asked when an added file would replace an existing one.
    async fn confirm_overwrite(&self, name: &str) -> bool;
}

/// Answers every question the same way.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm {
    pub accept: bool,
    pub on_partial: PartialCopyChoice,
}

impl AutoConfirm {
    /// Accepts everything and keeps both trees after a partial copy.
    pub const fn yes() -> Self {
        Self {
            accept: true,
            on_partial: PartialCopyChoice::KeepBoth,
        }
    }

    pub const fn no() -> Self {
        Self {
            accept: false,
            on_partial: PartialCopyChoice::KeepBoth,
        }
    }

    #[must_use]
    pub const fn with_partial(mut self, choice: PartialCopyChoice) -> Self {
        self.on_partial = choice;
        self
    }
}

impl Default for AutoConfirm {
    fn default() -> Self {
        Self::yes()
    }
}

#[async_trait]
impl Confirmer for AutoConfirm {
    async fn confirm_directory_rename(&self, _old_name: &str, _new_name: &str) -> bool {
        self.accept
    }

    async fn resolve_partial_copy(
        &self,
        _old_name: &str,
        _new_name: &str,
        _report: &CopyReport,
    ) -> PartialCopyChoice {
        self.on_partial
    }

    async fn confirm_overwrite(&self, _name: &str) -> bool {
        self.accept
    }
}
