// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::config::settings::MinioSettings;
use crate::domain::repositories::{ObjectStorage, StorageError};

/// MinIO 对象存储实现
///
/// 内部端点承担 put/get，预签名 URL 由公网端点上的独立客户端生成，
/// 这样签名中的 host 即外部可达的 host，无需事后改写
pub struct MinioStorage {
    client: Client,
    presign_client: Client,
    bucket: String,
}

fn build_client(endpoint: &str, use_ssl: bool, access_key: &str, secret_key: &str) -> Client {
    let scheme = if use_ssl { "https" } else { "http" };
    let endpoint_url = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("{scheme}://{endpoint}")
    };

    let credentials = Credentials::new(access_key, secret_key, None, None, "dubrs-minio");
    let config = aws_sdk_s3::Config::builder()
        .behavior_version_latest()
        .credentials_provider(credentials)
        .region(Region::new("us-east-1"))
        .endpoint_url(endpoint_url)
        .force_path_style(true) // Required for MinIO
        .build();

    Client::from_conf(config)
}

impl MinioStorage {
    /// 创建新的 MinIO 存储网关
    ///
    /// # 参数
    ///
    /// * `settings` - MinIO 配置
    ///
    /// # 返回值
    ///
    /// * `Ok(MinioStorage)` - 存储网关
    /// * `Err(StorageError)` - 配置不完整
    pub fn new(settings: &MinioSettings) -> Result<Self, StorageError> {
        if settings.endpoint.is_empty() {
            return Err(StorageError::InvalidConfig(
                "minio endpoint is required".to_string(),
            ));
        }
        if settings.access_key.is_empty() || settings.secret_key.is_empty() {
            return Err(StorageError::InvalidConfig(
                "minio credentials are required".to_string(),
            ));
        }

        let client = build_client(
            &settings.endpoint,
            settings.use_ssl,
            &settings.access_key,
            &settings.secret_key,
        );

        let presign_client = if settings.public_endpoint != settings.endpoint {
            build_client(
                &settings.public_endpoint,
                settings.use_ssl,
                &settings.access_key,
                &settings.secret_key,
            )
        } else {
            client.clone()
        };

        Ok(Self {
            client,
            presign_client,
            bucket: settings.bucket.clone(),
        })
    }
}

#[async_trait]
impl ObjectStorage for MinioStorage {
    async fn put_bytes(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|err| StorageError::Backend(format!("put {key}: {err}")))?;
        Ok(())
    }

    async fn put_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|err| StorageError::Backend(format!("read {}: {err}", path.display())))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|err| StorageError::Backend(format!("put {key}: {err}")))?;
        Ok(())
    }

    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err|

                match err.as_service_error() {
                    Some(service) if service.is_no_such_key() => {
                        StorageError::NotFound(key.to_string())
                    }
                    _ => StorageError::Backend(format!("get {key}: {err}")),
                })?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|err| StorageError::Backend(format!("read body {key}: {err}")))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn get_to_file(&self, key: &str, path: &Path) -> Result<(), StorageError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| match err.as_service_error() {
                Some(service) if service.is_no_such_key() => {
                    StorageError::NotFound(key.to_string())
                }
                _ => StorageError::Backend(format!("get {key}: {err}")),
            })?;

        let mut file = tokio::fs::File::create(path).await?;
        let mut body = resp.body.into_async_read();
        tokio::io::copy(&mut body, &mut file).await?;
        file.flush().await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| StorageError::Backend(format!("delete {key}: {err}")))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => match err.as_service_error() {
                Some(service) if service.is_not_found() => Ok(false),
                _ => Err(StorageError::Backend(format!("head {key}: {err}"))),
            },
        }
    }

    async fn presigned_get_url(
        &self,
        key: &str,
        expiry: Duration,
    ) -> Result<String, StorageError> {
        let config = PresigningConfig::expires_in(expiry)
            .map_err(|err| StorageError::Backend(format!("presign config: {err}")))?;

        let presigned = self
            .presign_client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|err| StorageError::Backend(format!("presign {key}: {err}")))?;

        Ok(presigned.uri().to_string())
    }
}
