use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client,
    config::{Builder as S3ConfigBuilder, Region, http::HttpResponse},
    error::{DisplayErrorContext, SdkError},
    operation::get_object::GetObjectError,
};
use bytes::Bytes;
use tracing::debug;

use crate::application::storage::{ObjectStore, StoreError};

/// S3 (or S3-compatible) object store. Credentials come from the default
/// provider chain.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub async fn connect(region: &str, endpoint: Option<&str>) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        let mut builder = S3ConfigBuilder::from(&shared);
        if let Some(endpoint) = endpoint {
            debug!(
                target = "infra::storage::s3",
                endpoint, "Using custom S3 endpoint with path-style addressing"
            );
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self::from_client(Client::from_conf(builder.build()))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify_get_error(bucket, key, err))?;

        let body = output.body.collect().await.map_err(|err| {
            StoreError::transport(format!("failed to read body of `{key}`: {err}"))
        })?;
        Ok(body.into_bytes())
    }
}

fn classify_get_error(
    bucket: &str,
    key: &str,
    err: SdkError<GetObjectError, HttpResponse>,
) -> StoreError {
    if err
        .as_service_error()
        .is_some_and(GetObjectError::is_no_such_key)
    {
        return StoreError::not_found(bucket, key);
    }
    StoreError::transport(DisplayErrorContext(&err).to_string())
}
