use std::path::{Component, Path, PathBuf};

/// Renders a path for log lines and error messages.
///
/// Existing paths are shown canonicalized. Paths that cannot be canonicalized
/// (already deleted, never existed, or belonging to an in-memory filesystem)
/// are made absolute against the working directory and lexically normalized.
pub trait PathDisplayExt {
    fn display_best_effort(&self) -> String;
}

impl<P: AsRef<Path> + ?Sized> PathDisplayExt for P {
    fn display_best_effort(&self) -> String {
        let path = self.as_ref();
        if let Ok(canonical) = path.canonicalize() {
            return canonical.display().to_string();
        }

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        };

        normalize(&absolute).display().to_string()
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut kept: Vec<Component> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(kept.last(), Some(Component::Normal(_))) {
                    kept.pop();
                }
            }
            other => kept.push(other),
        }
    }

    kept.iter().collect()
}
