pub mod error;

pub mod config;

pub mod settings;
pub use settings::{SessionSettings, SettingsStore, TomlSettingsStore};

pub mod storage;
pub use storage::{DirRef, DirectoryHandle, EntryKind, FileHandle, FileRef, PermissionState};

pub mod model {
    pub mod entry;
    pub use entry::{Entry, EntryHandle};

    pub mod navigation;
    pub use navigation::NavigationState;

    pub mod tree;
    pub use tree::{ExpandedSet, TreeNode};

    pub mod pagination;
    pub use pagination::{PageWindow, paginate};
}

pub mod fs {
    pub mod dir_scanner;
    pub use dir_scanner::{compare_entries, list_directory};

    pub mod search;
    pub use search::{SearchReport, search_tree};
}

pub mod operators {
    pub mod tree_copy;
    pub use tree_copy::{CopyLimits, CopyProgress, CopyReport, copy_tree};

    pub mod trash;
    pub use trash::{SoftDeleteOutcome, TrashManager, TrashRecord};

    pub mod rename;
    pub use rename::{DirectoryRename, RenameOutcome, RenamePhase};

    pub mod upload;
    pub use upload::{AddFileOutcome, UploadSource, UploadSummary};
}

pub mod controller {
    pub mod guard;
    pub use guard::{OperationGuard, OperationKind, OperationLocks};

    pub mod confirm;
    pub use confirm::{AutoConfirm, Confirmer, PartialCopyChoice};

    pub mod session;
    pub use session::{ClearPageSummary, FileSession};
}

pub mod logging;
pub use logging::Logger;

pub mod util {
    pub mod clock;
    pub use clock::{Clock, FixedClock, SystemClock};

    pub mod humanize;
}

pub use controller::FileSession;
pub use error::{AppError, CoreResult};
