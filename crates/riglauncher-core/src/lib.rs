mod config;
mod error;
mod events;
mod feed;
mod repo;
mod tag;

pub use config::{default_user_config_path, ConfigRecord, KEY_INSTALL_PATH, KEY_TAG};
pub use error::LauncherError;
pub use events::{DecisionSink, ProgressSink, SilentProgress};
pub use feed::{parse_release_feed, ReleaseCatalog, ReleaseEntry};
pub use repo::RepositorySlug;
pub use tag::{sanitize_version_label, ReleaseTag};
