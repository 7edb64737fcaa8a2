// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use dubrs::domain::repositories::{ObjectStorage, StorageError};

/// 内存对象存储
#[derive(Default)]
pub struct InMemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryStorage {
    /// 预置一个对象
    pub fn seed(&self, key: &str, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
    }

    /// 读取对象快照
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    /// 当前对象键列表
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn put_bytes(
        &self,
        key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn put_file(
        &self,
        key: &str,
        path: &Path,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let data = std::fs::read(path)?;
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn get_to_file(&self, key: &str, path: &Path) -> Result<(), StorageError> {
        let data = self.get_bytes(key).await?;
        std::fs::write(path, data)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn presigned_get_url(
        &self,
        key: &str,
        expiry: Duration,
    ) -> Result<String, StorageError> {
        Ok(format!(
            "http://storage.test/{key}?expires={}",
            expiry.as_secs()
        ))
    }
}
