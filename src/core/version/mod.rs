pub mod index;
pub mod resolver;
pub mod version_file;

pub use index::{VersionIndex, VERSION_INDEX_URL};
pub use resolver::{ManifestChain, ManifestResolver, ResolvedManifest};
pub use version_file::{current_os_name, LibraryEntry, LibraryLocation, VersionManifest};
