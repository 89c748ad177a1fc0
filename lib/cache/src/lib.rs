use std::{collections::HashMap, hash::Hash, sync::Arc};

use tokio::sync::RwLock;

/// Simple async `RwLock<HashMap<K, T>>` wrapper shared by the status
/// caches. No eviction policy - entries are removed explicitly by callers
/// (typically the garbage collector or a `post_delete` hook) rather than
/// expiring on their own.
#[derive(Debug)]
pub struct CloneCache<K: PartialEq + Eq + Hash, T: Clone>(
  RwLock<HashMap<K, T>>,
);

impl<K: PartialEq + Eq + Hash, T: Clone> Default for CloneCache<K, T> {
  fn default() -> Self {
    Self(RwLock::new(HashMap::new()))
  }
}

impl<K: PartialEq + Eq + Hash + Clone, T: Clone> CloneCache<K, T> {
  pub async fn get(&self, key: &K) -> Option<T> {
    self.0.read().await.get(key).cloned()
  }

  pub async fn get_keys(&self) -> Vec<K> {
    self.0.read().await.keys().cloned().collect()
  }

  pub async fn get_entries(&self) -> Vec<(K, T)> {
    self
      .0
      .read()
      .await
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect()
  }

  pub async fn insert<Key: Into<K>>(
    &self,
    key: Key,
    val: T,
  ) -> Option<T> {
    self.0.write().await.insert(key.into(), val)
  }

  pub async fn remove(&self, key: &K) -> Option<T> {
    self.0.write().await.remove(key)
  }

  /// Removes every entry whose key does not satisfy `keep`. Used by the
  /// garbage collector to drop cached status for fingerprints that no
  /// longer have a live scheduled task.
  pub async fn retain_keys(&self, mut keep: impl FnMut(&K) -> bool) {
    self.0.write().await.retain(|k, _| keep(k));
  }
}

impl<K: PartialEq + Eq + Hash + Clone, T: Clone + Default>
  CloneCache<K, T>
{
  pub async fn get_or_insert_default(&self, key: &K) -> T {
    let mut lock = self.0.write().await;
    match lock.get(key).cloned() {
      Some(item) => item,
      None => {
        let item = T::default();
        lock.insert(key.clone(), item.clone());
        item
      }
    }
  }
}

pub type SharedCache<K, T> = Arc<CloneCache<K, T>>;

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn insert_and_get_roundtrip() {
    let cache: CloneCache<String, u32> = CloneCache::default();
    cache.insert("a".to_string(), 1).await;
    assert_eq!(cache.get(&"a".to_string()).await, Some(1));
    assert_eq!(cache.get(&"b".to_string()).await, None);
  }

  #[tokio::test]
  async fn retain_keys_drops_unwanted_entries() {
    let cache: CloneCache<String, u32> = CloneCache::default();
    cache.insert("keep".to_string(), 1).await;
    cache.insert("drop".to_string(), 2).await;
    cache.retain_keys(|k| k == "keep").await;
    assert_eq!(cache.get(&"keep".to_string()).await, Some(1));
    assert_eq!(cache.get(&"drop".to_string()).await, None);
  }
}
