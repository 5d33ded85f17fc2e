// ─── AngelLauncher Core ───
// Backend for a single-server Fabric launcher.
//
// Architecture:
//   core/
//     downloader/ Concurrent downloads with SHA-1 validation
//     version/    Version manifests, inheritance chains, OS rules
//     maven/      Coordinate parsing and repository paths
//     launch/     Classpath, natives, command line, process supervision
//     loaders/    Fabric installer driver
//     java/       Java runtime discovery
//     profile/    Player profiles and their store
//     server/     Online players over HTTP and UDP query
//     state/      Settings, paths and shared services
//     auth/       Offline identities

pub mod auth;
pub mod downloader;
pub mod error;
pub mod http;
pub mod java;
pub mod launch;
pub mod loaders;
pub mod maven;
pub mod mods;
pub mod profile;
pub mod server;
pub mod state;
pub mod system;
pub mod version;

#[cfg(test)]
pub mod test_support;
