// files.rs — directory-backed file system used to fetch map files
//
// Only loose files are searched; archives are somebody else's problem.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::common::{com_dprintf, com_printf};

/// Anything that can hand over a whole file by name.
pub trait FileReader {
    fn load_file(&mut self, name: &str) -> Option<Vec<u8>>;
}

/// In-memory files, keyed by name. Used by tools and tests.
impl FileReader for HashMap<String, Vec<u8>> {
    fn load_file(&mut self, name: &str) -> Option<Vec<u8>> {
        self.get(name).cloned()
    }
}

// ============================================================
// Filesystem context
// ============================================================

/// Ordered list of directories; the most recently added one wins.
#[derive(Debug, Default)]
pub struct FsContext {
    pub search_paths: Vec<PathBuf>,
    /// Set by the last successful load.
    pub last_path: Option<PathBuf>,
}

impl FsContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a directory in front of the existing search paths.
    pub fn add_search_path(&mut self, dir: impl AsRef<Path>) {
        let dir = dir.as_ref().to_path_buf();
        if self.search_paths.contains(&dir) {
            return;
        }
        com_dprintf(&format!("Added search path {}\n", dir.display()));
        self.search_paths.insert(0, dir);
    }

    /// Rejects names that would escape the search directories.
    pub fn is_safe_name(name: &str) -> bool {
        !name.is_empty()
            && !name.contains("..")
            && !name.starts_with('/')
            && !name.starts_with('\\')
            && !name.contains(':')
    }

    /// Finds the file in the search path.
    pub fn find_file(&self, name: &str) -> Option<PathBuf> {
        if !Self::is_safe_name(name) {
            com_printf(&format!("FS_FindFile: refusing {}\n", name));
            return None;
        }
        for dir in &self.search_paths {
            let netpath = dir.join(name);
            if netpath.is_file() {
                com_dprintf(&format!("FindFile: {}\n", netpath.display()));
                return Some(netpath);
            }
        }
        com_dprintf(&format!("FindFile: can't find {}\n", name));
        None
    }

    /// Reads a whole file from the first search path that has it.
    pub fn read_file(&mut self, name: &str) -> io::Result<Vec<u8>> {
        let path = self
            .find_file(name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))?;
        let data = fs::read(&path)?;
        self.last_path = Some(path);
        Ok(data)
    }

    pub fn path_f(&self) {
        com_printf("Current search path:\n");
        for dir in &self.search_paths {
            com_printf(&format!("{}\n", dir.display()));
        }
    }
}

impl FileReader for FsContext {
    fn load_file(&mut self, name: &str) -> Option<Vec<u8>> {
        match self.read_file(name) {
            Ok(data) => Some(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                com_printf(&format!("FS_LoadFile: read error on {}: {}\n", name, e));
                None
            }
        }
    }
}

// ============================================================
// Global singleton
// ============================================================

static FS_CTX: Mutex<Option<FsContext>> = parking_lot::const_mutex(None);

pub fn fs_init(basedirs: &[PathBuf]) {
    let mut ctx = FsContext::new();
    for dir in basedirs {
        ctx.add_search_path(dir);
    }
    *FS_CTX.lock() = Some(ctx);
}

pub fn fs_shutdown() {
    *FS_CTX.lock() = None;
}

pub fn fs_load_file(name: &str) -> Option<Vec<u8>> {
    FS_CTX.lock().as_mut().and_then(|c| c.load_file(name))
}

/// Access the global FS_CTX with a closure. Returns None if not initialized.
pub fn with_fs_ctx<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut FsContext) -> R,
{
    FS_CTX.lock().as_mut().map(f)
}

/// Hands the global file system to code that wants a `FileReader`.
pub struct GlobalFs;

impl FileReader for GlobalFs {
    fn load_file(&mut self, name: &str) -> Option<Vec<u8>> {
        fs_load_file(name)
    }
}

// ============================================================
// Unit tests
// ============================================================
