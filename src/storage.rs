//! File attachments: profile images, resumes and compliance report files.
//!
//! The store only ever records the object key returned by [`store_attachment`]; the bytes live in
//! the object storage backend.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use image::ImageFormat;
use uuid::Uuid;

use crate::config::AppConfig;

pub const PRESIGNED_URL_EXPIRY_SECONDS: u64 = 15 * 60;

#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()>;

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String>;

    async fn delete_object(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    ProfileImage,
    Resume,
    ComplianceReport,
}

impl AttachmentKind {
    pub const fn prefix(self) -> &'static str {
        match self {
            AttachmentKind::ProfileImage => "profile_images",
            AttachmentKind::Resume => "resumes",
            AttachmentKind::ComplianceReport => "compliance_reports",
        }
    }
}

/// A file part pulled out of a multipart request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    fn resolved_content_type(&self) -> String {
        self.content_type
            .clone()
            .filter(|value| !value.is_empty() && value != "application/octet-stream")
            .unwrap_or_else(|| {
                mime_guess::from_path(&self.file_name)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            })
    }
}

/// Builds a collision-free key such as `resumes/<uuid>-cv.pdf`.
pub fn object_key(kind: AttachmentKind, file_name: &str) -> String {
    let cleaned: String = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    let name = if cleaned.is_empty() { "upload" } else { cleaned };
    format!("{}/{}-{}", kind.prefix(), Uuid::new_v4(), name)
}

/// Profile images must decode as PNG or JPEG.
pub fn ensure_profile_image(file: &UploadedFile) -> Result<ImageFormat> {
    let format = image::guess_format(&file.bytes).context("profile_image is not an image")?;
    match format {
        ImageFormat::Png | ImageFormat::Jpeg => Ok(format),
        other => bail!("profile_image format {other:?} is not supported"),
    }
}

pub fn ensure_not_empty(file: &UploadedFile, field: &str) -> Result<()> {
    if file.bytes.is_empty() {
        bail!("{field} must not be empty");
    }
    Ok(())
}

pub async fn store_attachment(
    storage: &dyn ObjectStorage,
    kind: AttachmentKind,
    file: UploadedFile,
) -> Result<String> {
    let key = object_key(kind, &file.file_name);
    let content_type = file.resolved_content_type();
    let disposition = format!(
        "attachment; filename=\"{}\"",
        file.file_name.replace('"', "")
    );
    storage
        .put_object(&key, file.bytes, Some(content_type), Some(disposition))
        .await?;
    Ok(key)
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let region = Region::new(config.aws_region.clone());
        let region_provider = RegionProviderChain::first_try(Some(region))
            .or_default_provider()
            .or_else("us-east-1");

        #[allow(deprecated)]
        let mut loader = aws_config::from_env().region(region_provider);

        if let Some(endpoint) = &config.aws_endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        if let (Some(access_key), Some(secret_key)) = (
            config.aws_access_key_id.clone(),
            config.aws_secret_access_key.clone(),
        ) {
            let credentials = Credentials::new(access_key, secret_key, None, None, "static");
            loader = loader.credentials_provider(credentials);
        }

        let base_config = loader.load().await;
        let s3_config = S3ConfigBuilder::from(&base_config)
            .force_path_style(true)
            .build();

        Ok(Self::new(
            S3Client::from_conf(s3_config),
            config.s3_bucket.clone(),
        ))
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes));

        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        if let Some(content_disposition) = content_disposition {
            request = request.content_disposition(content_disposition);
        }

        request
            .send()
            .await
            .context("failed to upload attachment to S3")?;

        Ok(())
    }

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String> {
        let presign_config = PresigningConfig::builder()
            .expires_in(expires_in)
            .build()
            .context("failed to build S3 presigning config")?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .context("failed to generate presigned attachment URL")?;

        Ok(presigned.uri().to_string())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("failed to delete attachment from S3")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, bytes: &[u8]) -> UploadedFile {
        UploadedFile {
            file_name: name.to_string(),
            content_type: None,
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn keys_are_prefixed_and_sanitized() {
        let key = object_key(AttachmentKind::Resume, "../../My CV (final).pdf");
        assert!(key.starts_with("resumes/"));
        assert!(key.ends_with("-My_CV__final_.pdf"));
        assert!(!key.contains(".."));
    }

    #[test]
    fn empty_names_fall_back() {
        let key = object_key(AttachmentKind::ComplianceReport, "");
        assert!(key.starts_with("compliance_reports/"));
        assert!(key.ends_with("-upload"));
    }

    #[test]
    fn content_type_is_guessed_from_the_name() {
        assert_eq!(file("report.pdf", b"%PDF").resolved_content_type(), "application/pdf");
    }

    #[test]
    fn empty_attachments_are_rejected() {
        let err = ensure_not_empty(&file("cv.pdf", b""), "resume").unwrap_err();
        assert_eq!(err.to_string(), "resume must not be empty");
        assert!(ensure_not_empty(&file("cv.pdf", b"%PDF"), "resume").is_ok());
    }

    #[test]
    fn profile_images_must_be_png_or_jpeg() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(
            ensure_profile_image(&file("me.png", &png)).unwrap(),
            ImageFormat::Png
        );
        assert!(ensure_profile_image(&file("me.txt", b"hello there")).is_err());
    }
}
