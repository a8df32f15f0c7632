use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::cache::source_key;
use crate::pages::DocumentView;

pub type DocumentId = Uuid;

const DOCUMENT_NAMESPACE: Uuid = Uuid::from_u128(0x3f0c_9a51_6d2e_5b7a_8c41_2e9d_b0a6_71f4);

pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = source_key(path);
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&DOCUMENT_NAMESPACE, rendered.as_bytes())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub current_index: usize,
    pub zoom: f32,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            current_index: 0,
            zoom: 1.0,
        }
    }
}

impl DocumentView {
    pub fn view_state(&self) -> ViewState {
        ViewState {
            current_index: self.current_index,
            zoom: self.zoom,
        }
    }

    pub fn restore(&mut self, state: &ViewState) {
        self.set_current_index(state.current_index);
        self.set_zoom(state.zoom);
    }

    pub fn recall(&mut self, store: &dyn StateStore) -> Result<bool> {
        match store.load(self.host_path())? {
            Some(state) => {
                self.restore(&state);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remember(&self, store: &dyn StateStore) -> Result<()> {
        store.save(self.host_path(), &self.view_state())
    }
}

/// Remembered view positions, keyed by host document path.
pub trait StateStore: Send + Sync {
    fn load(&self, host: &Path) -> Result<Option<ViewState>>;
    fn save(&self, host: &Path, state: &ViewState) -> Result<()>;
}

pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create state directory at {:?}", root))?;
        Ok(Self { root })
    }

    fn state_path(&self, host: &Path) -> PathBuf {
        self.root
            .join(format!("{}.json", document_id_for_path(host)))
    }
}

impl StateStore for FileStateStore {
    fn load(&self, host: &Path) -> Result<Option<ViewState>> {
        let path = self.state_path(host);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(host = %host.display(), "no remembered view state");
                return Ok(None);
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read view state {:?}", path))
            }
        };
        let state = serde_json::from_str(&text)
            .with_context(|| format!("failed to decode view state {:?}", path))?;
        Ok(Some(state))
    }

    fn save(&self, host: &Path, state: &ViewState) -> Result<()> {
        let path = self.state_path(host);
        let partial = path.with_extension("json.partial");
        fs::write(&partial, serde_json::to_vec_pretty(state)?)
            .with_context(|| format!("failed to write view state {:?}", partial))?;
        fs::rename(&partial, &path)
            .with_context(|| format!("failed to move view state into {:?}", path))?;
        debug!(host = %host.display(), page = state.current_index, "saved view state");
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStateStore {
    inner: Mutex<HashMap<DocumentId, ViewState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, host: &Path) -> Result<Option<ViewState>> {
        Ok(self.inner.lock().get(&document_id_for_path(host)).cloned())
    }

    fn save(&self, host: &Path, state: &ViewState) -> Result<()> {
        self.inner
            .lock()
            .insert(document_id_for_path(host), state.clone());
        Ok(())
    }
}
