//! Amazon S3 destination
//!
//! Small objects go up in a single `PutObject`. Anything larger than one part
//! becomes a multipart upload, which S3 only makes visible once it is
//! completed; any failure aborts the upload so no partial object is readable.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::core::error::{Error, Result};
use crate::core::store::ObjectStore;
use crate::core::stream::BridgeReader;

/// Part size for multipart uploads (S3 requires at least 5 MiB)
pub const PART_SIZE: usize = 8 * 1024 * 1024;

/// Map an S3 error code onto the error taxonomy
pub fn classify_code(code: Option<&str>, message: String) -> Error {
    match code {
        Some(
            "SlowDown" | "InternalError" | "ServiceUnavailable" | "RequestTimeout"
            | "RequestTimeTooSkewed" | "Throttling" | "ThrottlingException",
        ) => Error::Transient(message),
        Some(
            "ExpiredToken" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "InvalidToken"
            | "AccessDenied",
        ) => Error::AuthExpired(message),
        _ => Error::Destination(message),
    }
}

fn s3_error<E, R>(context: &str, err: SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = format!("{context}: {}", DisplayErrorContext(&err));
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            Error::Transient(message)
        }
        _ => classify_code(err.code(), message),
    }
}

/// Fill a buffer of up to `part_size` bytes, stopping early only at EOF
async fn read_part<R: AsyncRead + Unpin>(body: &mut R, part_size: usize) -> Result<Vec<u8>> {
    let mut part = Vec::with_capacity(part_size);
    let mut limited = body.take(part_size as u64);
    limited.read_to_end(&mut part).await?;
    Ok(part)
}

async fn abort_upload(client: &Client, bucket: &str, key: &str, upload_id: &str) {
    if let Err(e) = client
        .abort_multipart_upload()
        .bucket(bucket)
        .key(key)
        .upload_id(upload_id)
        .send()
        .await
    {
        warn!(
            "⚠️  Abort of multipart upload {upload_id} failed: {}",
            DisplayErrorContext(&e)
        );
    }
}

/// Aborts a multipart upload whose future was dropped before finishing
///
/// Cancellation drops `put_object` at an await point, so the explicit abort
/// on the error path never runs; the guard spawns it instead.
struct AbortOnDrop {
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,
    armed: bool,
}

impl AbortOnDrop {
    fn new(client: Client, bucket: &str, key: &str, upload_id: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("⚠️  Multipart upload {} for {} left open", self.upload_id, self.key);
            return;
        };
        let client = self.client.clone();
        let bucket = std::mem::take(&mut self.bucket);
        let key = std::mem::take(&mut self.key);
        let upload_id = std::mem::take(&mut self.upload_id);
        debug!("Upload of {key} dropped, aborting multipart upload {upload_id}");
        handle.spawn(async move {
            abort_upload(&client, &bucket, &key, &upload_id).await;
        });
    }
}

/// S3 bucket acting as the destination object store
pub struct S3Store {
    client: Client,
    bucket: String,
    part_size: usize,
}

impl S3Store {
    /// Resolve AWS configuration for `region`, optionally from a named profile
    pub async fn connect(bucket: &str, region: &str, profile: Option<&str>) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let sdk_config = loader.load().await;

        Self {
            client: Client::new(&sdk_config),
            bucket: bucket.to_string(),
            part_size: PART_SIZE,
        }
    }

    async fn put_single(&self, key: &str, body: Vec<u8>) -> Result<u64> {
        let len = body.len() as u64;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(len as i64)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| s3_error("put object", e))?;
        Ok(len)
    }

    async fn put_multipart(&self, key: &str, first_part: Vec<u8>, body: &mut BridgeReader) -> Result<u64> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| s3_error("create multipart upload", e))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| Error::Destination("multipart upload without an id".to_string()))?
            .to_string();

        let mut guard = AbortOnDrop::new(self.client.clone(), &self.bucket, key, &upload_id);
        let uploaded = self.upload_parts(key, &upload_id, first_part, body).await;
        if let Err(ref e) = uploaded {
            warn!("⚠️  Aborting multipart upload for {key}: {e}");
            abort_upload(&self.client, &self.bucket, key, &upload_id).await;
        }
        guard.disarm();
        uploaded
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first_part: Vec<u8>,
        body: &mut BridgeReader,
    ) -> Result<u64> {
        let mut parts = Vec::new();
        let mut total = 0u64;
        let mut part_number = 1i32;
        let mut data = first_part;

        while !data.is_empty() {
            total += data.len() as u64;
            let uploaded = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(data))
                .send()
                .await
                .map_err(|e| s3_error("upload part", e))?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
            debug!("Uploaded part {part_number} of {key}");

            part_number += 1;
            data = read_part(body, self.part_size).await?;
        }

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| s3_error("complete multipart upload", e))?;

        Ok(total)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_object(&self, key: &str, mut body: BridgeReader) -> Result<u64> {
        let first_part = read_part(&mut body, self.part_size).await?;

        if first_part.len() < self.part_size {
            self.put_single(key, first_part).await
        } else {
            self.put_multipart(key, first_part, &mut body).await
        }
    }

    fn describe(&self) -> String {
        format!("s3://{}", self.bucket)
    }
}
