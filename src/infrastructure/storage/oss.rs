// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use futures::StreamExt;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, DATE};
use reqwest::StatusCode;
use sha1::Sha1;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::config::settings::OssSettings;
use crate::domain::repositories::{ObjectStorage, StorageError};

type HmacSha1 = Hmac<Sha1>;

/// URL 路径段保留字符（'/' 不编码）
const PATH_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// 阿里云 OSS 对象存储实现
///
/// 读写请求使用 Header 签名（HMAC-SHA1），对外的下载链接使用
/// 查询参数签名；配置了 CNAME 公网域名时签名 URL 指向该域名
#[derive(Debug)]
pub struct OssStorage {
    http: reqwest::Client,
    endpoint: String,
    bucket: String,
    access_key_id: String,
    access_key_secret: String,
    public_domain: String,
    prefix: String,
    use_ssl: bool,
}

impl OssStorage {
    /// 创建新的 OSS 存储网关
    ///
    /// # 参数
    ///
    /// * `settings` - OSS 配置
    ///
    /// # 返回值
    ///
    /// * `Ok(OssStorage)` - 存储网关
    /// * `Err(StorageError)` - 配置不完整
    pub fn new(settings: &OssSettings) -> Result<Self, StorageError> {
        if settings.endpoint.is_empty()
            || settings.bucket.is_empty()
            || settings.access_key_id.is_empty()
            || settings.access_key_secret.is_empty()
        {
            return Err(StorageError::InvalidConfig(
                "oss endpoint/bucket/credentials are required".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(600)) // 跨区域大文件传输需要较长读取超时
            .build()
            .map_err(|err| StorageError::Backend(err.to_string()))?;

        Ok(Self {
            http,
            endpoint: settings.endpoint.clone(),
            bucket: settings.bucket.clone(),
            access_key_id: settings.access_key_id.clone(),
            access_key_secret: settings.access_key_secret.clone(),
            public_domain: settings.public_domain.clone(),
            prefix: settings.prefix.trim_matches('/').to_string(),
            use_ssl: settings.use_ssl,
        })
    }

    fn scheme(&self) -> &'static str {
        if self.use_ssl {
            "https"
        } else {
            "http"
        }
    }

    /// 构建完整的 OSS key（应用前缀）
    fn full_key(&self, key: &str) -> String {
        let key = key.trim_start_matches('/');
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix, key)
        }
    }

    fn object_url(&self, full_key: &str) -> String {
        let encoded = utf8_percent_encode(full_key, PATH_SET);
        format!(
            "{}://{}.{}/{}",
            self.scheme(),
            self.bucket,
            self.endpoint,
            encoded
        )
    }

    /// 规范化资源路径（签名用）
    fn resource(&self, full_key: &str) -> String {
        format!("/{}/{}", self.bucket, full_key)
    }

    fn sign(&self, string_to_sign: &str) -> String {
        let mut mac = HmacSha1::new_from_slice(self.access_key_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(string_to_sign.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    /// Header 签名：`{VERB}\n{Content-MD5}\n{Content-Type}\n{Date}\n{resource}`
    fn auth_header(&self, verb: &str, content_type: &str, date: &str, full_key: &str) -> String {
        let string_to_sign = format!(
            "{}\n\n{}\n{}\n{}",
            verb,
            content_type,
            date,
            self.resource(full_key)
        );
        format!("OSS {}:{}", self.access_key_id, self.sign(&string_to_sign))
    }

    fn http_date() -> String {
        Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    async fn check_status(
        resp: reqwest::Response,
        key: &str,
        op: &str,
    ) -> Result<reqwest::Response, StorageError> {
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(key.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Backend(format!(
                "{op} {key}: status {status}: {body}"
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl ObjectStorage for OssStorage {
    async fn put_bytes(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let full_key = self.full_key(key);
        let date = Self::http_date();
        let auth = self.auth_header("PUT", content_type, &date, &full_key);

        let resp = self
            .http
            .put(self.object_url(&full_key))
            .header(DATE, date)
            .header(CONTENT_TYPE, content_type)
            .header(AUTHORIZATION, auth)
            .body(data)
            .send()
            .await
            .map_err(|err| StorageError::Backend(format!("put {key}: {err}")))?;

        Self::check_status(resp, key, "put").await.map(|_| ())
    }

    async fn put_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();

        let full_key = self.full_key(key);
        let date = Self::http_date();
        let auth = self.auth_header("PUT", content_type, &date, &full_key);

        let resp = self
            .http
            .put(self.object_url(&full_key))
            .header(DATE, date)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, len)
            .header(AUTHORIZATION, auth)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await
            .map_err(|err| StorageError::Backend(format!("put {key}: {err}")))?;

        Self::check_status(resp, key, "put").await.map(|_| ())
    }

    async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let full_key = self.full_key(key);
        let date = Self::http_date();
        let auth = self.auth_header("GET", "", &date, &full_key);

        let resp = self
            .http
            .get(self.object_url(&full_key))
            .header(DATE, date)
            .header(AUTHORIZATION, auth)
            .send()
            .await
            .map_err(|err| StorageError::Backend(format!("get {key}: {err}")))?;

        let resp = Self::check_status(resp, key, "get").await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| StorageError::Backend(format!("read body {key}: {err}")))?;
        Ok(bytes.to_vec())
    }

    async fn get_to_file(&self, key: &str, path: &Path) -> Result<(), StorageError> {
        let full_key = self.full_key(key);
        let date = Self::http_date();
        let auth = self.auth_header("GET", "", &date, &full_key);

        let resp = self
            .http
            .get(self.object_url(&full_key))
            .header(DATE, date)
            .header(AUTHORIZATION, auth)
            .send()
            .await
            .map_err(|err| StorageError::Backend(format!("get {key}: {err}")))?;

        let resp = Self::check_status(resp, key, "get").await?;

        let mut file = tokio::fs::File::create(path).await?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|err| StorageError::Backend(format!("read body {key}: {err}")))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let full_key = self.full_key(key);
        let date = Self::http_date();
        let auth = self.auth_header("DELETE", "", &date, &full_key);

        let resp = self
            .http
            .delete(self.object_url(&full_key))
            .header(DATE, date)
            .header(AUTHORIZATION, auth)
            .send()
            .await
            .map_err(|err| StorageError::Backend(format!("delete {key}: {err}")))?;

        // 删除不存在的对象视为成功
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check_status(resp, key, "delete").await.map(|_| ())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let full_key = self.full_key(key);
        let date = Self::http_date();
        let auth = self.auth_header("HEAD", "", &date, &full_key);

        let resp = self
            .http
            .head(self.object_url(&full_key))
            .header(DATE, date)
            .header(AUTHORIZATION, auth)
            .send()
            .await
            .map_err(|err| StorageError::Backend(format!("head {key}: {err}")))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(StorageError::Backend(format!(
                "head {key}: status {status}"
            ))),
        }
    }

    async fn presigned_get_url(
        &self,
        key: &str,
        expiry: Duration,
    ) -> Result<String, StorageError> {
        let full_key = self.full_key(key);
        let expires = Utc::now().timestamp() + expiry.as_secs() as i64;

        let string_to_sign = format!("GET\n\n\n{}\n{}", expires, self.resource(&full_key));
        let signature = self.sign(&string_to_sign);

        // CNAME 公网域名优先，其次 bucket 虚拟主机域名
        let host = if self.public_domain.is_empty() {
            format!("{}.{}", self.bucket, self.endpoint)
        } else {
            self.public_domain.clone()
        };

        let encoded_key = utf8_percent_encode(&full_key, PATH_SET);
        let encoded_sig = utf8_percent_encode(&signature, NON_ALPHANUMERIC);
        Ok(format!(
            "{}://{}/{}?OSSAccessKeyId={}&Expires={}&Signature={}",
            self.scheme(),
            host,
            encoded_key,
            self.access_key_id,
            expires,
            encoded_sig
        ))
    }
}
