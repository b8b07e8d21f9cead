use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, RwLock};

use crate::errors::CoreError;
use crate::models::{LatLng, Polygon, PolygonId, PolygonPatch};

use super::store::AnnotationStore;
use super::view::ViewFocus;

/// What the rendering side repaints from.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub revision: u64,
    pub polygons: Vec<Polygon>,
}

/// Shared, async-aware access to the annotation store.
///
/// All access goes through one `RwLock`, so readers never see a half-applied
/// update. After every mutation that bumps the store revision a fresh
/// `StoreSnapshot` is published on a watch channel while the write lock is
/// still held, which keeps published revisions in order.
#[derive(Clone)]
pub struct AnnotationHandle {
    store: Arc<RwLock<AnnotationStore>>,
    snapshots: Arc<watch::Sender<StoreSnapshot>>,
}

impl AnnotationHandle {
    pub fn new(store: AnnotationStore) -> Self {
        let initial = StoreSnapshot {
            revision: store.revision(),
            polygons: store.list().to_vec(),
        };
        let (tx, _rx) = watch::channel(initial);
        Self {
            store: Arc::new(RwLock::new(store)),
            snapshots: Arc::new(tx),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.snapshots.subscribe()
    }

    /// Runs `f` under the read lock.
    pub async fn read<R>(&self, f: impl FnOnce(&AnnotationStore) -> R) -> R {
        let guard = self.store.read().await;
        f(&*guard)
    }

    /// Runs `f` under the write lock and publishes a snapshot if it changed anything.
    pub async fn mutate<R>(&self, f: impl FnOnce(&mut AnnotationStore) -> R) -> R {
        let mut guard = self.store.write().await;
        let before = guard.revision();
        let result = f(&mut *guard);
        if guard.revision() != before {
            self.snapshots.send_replace(StoreSnapshot {
                revision: guard.revision(),
                polygons: guard.list().to_vec(),
            });
        }
        result
    }

    pub async fn create(&self, vertices: Vec<LatLng>, source: &str) -> Result<Polygon, CoreError> {
        self.mutate(|store| store.create(vertices, source)).await
    }

    pub async fn update(&self, id: PolygonId, patch: PolygonPatch) -> Result<Polygon, CoreError> {
        self.mutate(|store| store.update(id, patch)).await
    }

    pub async fn remove(&self, id: PolygonId) -> Result<Polygon, CoreError> {
        self.mutate(|store| store.remove(id)).await
    }

    pub async fn remove_all(&self) -> usize {
        self.mutate(AnnotationStore::remove_all).await
    }

    pub async fn list(&self) -> Vec<Polygon> {
        self.read(|store| store.list().to_vec()).await
    }

    pub async fn get(&self, id: PolygonId) -> Option<Polygon> {
        self.read(|store| store.get(id).cloned()).await
    }

    pub async fn view_focus(&self, default_center: LatLng) -> ViewFocus {
        self.read(|store| store.view_focus(default_center)).await
    }
}
