mod artifact;

pub use artifact::{LibraryKey, MavenArtifact};

/// Repositories the launcher downloads from.
pub const MOJANG_LIBRARIES: &str = "https://libraries.minecraft.net";
pub const MAVEN_CENTRAL: &str = "https://repo1.maven.org/maven2";
pub const FABRIC_MAVEN: &str = "https://maven.fabricmc.net";
