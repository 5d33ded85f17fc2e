use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};

/// Searches for a `java` executable in a fixed order:
/// explicit override, standard install dirs, `PATH`, then `JAVA_HOME`.
#[derive(Debug, Clone, Default)]
pub struct JavaLocator {
    override_path: Option<PathBuf>,
    install_roots: Vec<PathBuf>,
    path_var: Option<OsString>,
    java_home: Option<PathBuf>,
}

impl JavaLocator {
    /// Locator wired to the running system.
    pub fn from_env(override_path: Option<PathBuf>) -> Self {
        Self {
            override_path,
            install_roots: standard_install_roots(),
            path_var: std::env::var_os("PATH"),
            java_home: std::env::var_os("JAVA_HOME").map(PathBuf::from),
        }
    }

    pub fn with_install_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.install_roots = roots;
        self
    }

    pub fn with_path_var(mut self, path_var: Option<OsString>) -> Self {
        self.path_var = path_var;
        self
    }

    pub fn with_java_home(mut self, java_home: Option<PathBuf>) -> Self {
        self.java_home = java_home;
        self
    }

    pub fn locate(&self) -> LauncherResult<PathBuf> {
        if let Some(path) = self.override_path.as_ref().filter(|p| p.is_file()) {
            info!(java = %path.display(), "using configured java");
            return Ok(path.clone());
        }

        if let Some(path) = self.in_install_roots() {
            info!(java = %path.display(), "found java in install directory");
            return Ok(path);
        }

        if let Some(path) = self.on_path() {
            info!(java = %path.display(), "found java on PATH");
            return Ok(path);
        }

        if let Some(home) = &self.java_home {
            let candidate = home.join("bin").join(java_exe());
            if candidate.is_file() {
                info!(java = %candidate.display(), "found java via JAVA_HOME");
                return Ok(candidate);
            }
        }

        Err(LauncherError::JavaRuntimeNotFound)
    }

    /// Newest-looking runtime first: entries are sorted by name, descending.
    fn in_install_roots(&self) -> Option<PathBuf> {
        for root in &self.install_roots {
            let Ok(entries) = std::fs::read_dir(root) else {
                continue;
            };
            let mut runtimes: Vec<PathBuf> = entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            runtimes.sort_by(|a, b| b.cmp(a));

            for runtime in runtimes {
                if let Some(java) = java_in_runtime(&runtime) {
                    return Some(java);
                }
                debug!(dir = %runtime.display(), "no java binary in runtime dir");
            }
        }
        None
    }

    fn on_path(&self) -> Option<PathBuf> {
        let path_var = self.path_var.as_ref()?;
        std::env::split_paths(path_var)
            .map(|dir| dir.join(java_exe()))
            .find(|candidate| candidate.is_file())
    }
}

/// Shorthand for [`JavaLocator::from_env`] followed by `locate`.
pub fn find_java(override_path: Option<PathBuf>) -> LauncherResult<PathBuf> {
    JavaLocator::from_env(override_path).locate()
}

fn java_exe() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}

fn java_in_runtime(runtime_root: &Path) -> Option<PathBuf> {
    let primary = runtime_root.join("bin").join(java_exe());
    if primary.is_file() {
        return Some(primary);
    }

    let mac_layout = runtime_root
        .join("Contents")
        .join("Home")
        .join("bin")
        .join(java_exe());
    mac_layout.is_file().then_some(mac_layout)
}

fn standard_install_roots() -> Vec<PathBuf> {
    if cfg!(target_os = "windows") {
        let program_files = std::env::var_os("ProgramFiles")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\Program Files"));
        let program_files_x86 = std::env::var_os("ProgramFiles(x86)")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\Program Files (x86)"));
        vec![
            program_files.join("Java"),
            program_files_x86.join("Java"),
            program_files.join("Eclipse Adoptium"),
        ]
    } else if cfg!(target_os = "macos") {
        vec![PathBuf::from("/Library/Java/JavaVirtualMachines")]
    } else {
        vec![PathBuf::from("/usr/lib/jvm")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::scratch_dir;

    fn fake_java(dir: &Path) -> PathBuf {
        let bin = dir.join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let java = bin.join(java_exe());
        std::fs::write(&java, b"").unwrap();
        java
    }

    fn empty_locator() -> JavaLocator {
        JavaLocator::default()
    }

    #[test]
    fn override_wins() {
        let dir = scratch_dir("java-override");
        let java = fake_java(&dir.join("custom"));
        let root = dir.join("jvm");
        fake_java(&root.join("jdk-21"));

        let found = JavaLocator {
            override_path: Some(java.clone()),
            ..empty_locator()
        }
        .with_install_roots(vec![root])
        .locate()
        .unwrap();

        assert_eq!(found, java);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn newest_install_dir_first() {
        let dir = scratch_dir("java-roots");
        let root = dir.join("jvm");
        fake_java(&root.join("jdk-17"));
        let newest = fake_java(&root.join("jdk-21"));

        let found = empty_locator()
            .with_install_roots(vec![dir.join("absent"), root])
            .locate()
            .unwrap();

        assert_eq!(found, newest);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn path_then_java_home() {
        let dir = scratch_dir("java-path");
        let on_path = fake_java(&dir.join("path-jdk"));
        let home = dir.join("home-jdk");
        let from_home = fake_java(&home);

        let path_var = std::env::join_paths([dir.join("nothing"), dir.join("path-jdk").join("bin")]).unwrap();
        let found = empty_locator()
            .with_path_var(Some(path_var))
            .with_java_home(Some(home.clone()))
            .locate()
            .unwrap();
        assert_eq!(found, on_path);

        let found = empty_locator()
            .with_java_home(Some(home))
            .locate()
            .unwrap();
        assert_eq!(found, from_home);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn nothing_found_is_an_error() {
        let dir = scratch_dir("java-none");
        let err = JavaLocator {
            override_path: Some(dir.join("missing-java")),
            ..empty_locator()
        }
        .with_install_roots(vec![dir.clone()])
        .locate()
        .unwrap_err();

        assert!(matches!(err, LauncherError::JavaRuntimeNotFound));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
