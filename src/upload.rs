//! Push mirrored ISMR files to the data platform.
//!
//! Per file: ask for a temporary upload URL with a signed request, then PUT
//! the bytes there. Files are uploaded by a bounded pool of tasks, no
//! retries; failures are collected and logged once at the end.

use std::{path::Path, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use serde::Deserialize;
use sha2::Sha512;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::{
    config::UploadSettings,
    error::{Result, ScintError},
    walker::list_ismr_files,
};

const ISMR_CONTENT_TYPE: &str = "application/text";

// ---

#[derive(Debug, Deserialize)]
struct UploadUrlResponse {
    #[serde(rename = "temporaryUploadUrl")]
    temporary_upload_url: String,
}

/// `Date` and `Authorization` header values for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureHeaders {
    pub date: String,
    pub authorization: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadReport {
    pub uploaded: Vec<String>,
    /// `(file name, reason)` of every failed upload.
    pub failed: Vec<(String, String)>,
}

impl UploadReport {
    pub fn log_summary(&self, dataset: &str) {
        // ---
        info!("Finished '{}' uploading: {} files", dataset, self.uploaded.len());
        if !self.failed.is_empty() {
            warn!("Failed to upload the following dataset files");
            for (file, reason) in &self.failed {
                warn!("  {}: {}", file, reason);
            }
        }
    }
}

/// HMAC-SHA512 over `date: <Date header>`, base64 then form-url encoded.
pub fn signature_headers(key_id: &str, secret: &str, now: DateTime<Utc>) -> std::result::Result<SignatureHeaders, hmac::digest::InvalidLength> {
    // ---
    let date = now.format("%a, %d %b %Y %H:%M:%S UTC").to_string();

    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes())?;
    mac.update(format!("date: {date}").as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());
    let encoded: String = url::form_urlencoded::byte_serialize(signature.as_bytes()).collect();

    Ok(SignatureHeaders {
        date,
        authorization: format!(r#"Signature keyId="{key_id}",algorithm="hmac-sha512",signature="{encoded}" "#),
    })
}

fn upload_error(file: &str, reason: impl std::fmt::Display) -> ScintError {
    ScintError::Upload {
        file: file.to_string(),
        reason: reason.to_string(),
    }
}

async fn upload_file(client: &Client, settings: &UploadSettings, path: &Path) -> Result<()> {
    // ---
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| upload_error(&path.display().to_string(), "not a file name"))?;

    let content = tokio::fs::read(path).await.map_err(|e| ScintError::io(path, e))?;
    let md5_b64 = STANDARD.encode(Md5::digest(&content));

    let endpoint = format!(
        "{}/{}/versions/{}/files/uploadUrl",
        settings.base_url.trim_end_matches('/'),
        settings.dataset,
        settings.version
    );
    let headers = signature_headers(&settings.api_key, &settings.api_secret, Utc::now()).map_err(|e| upload_error(name, e))?;

    let response = client
        .get(&endpoint)
        .header("Date", headers.date)
        .header("Authorization", headers.authorization)
        .query(&[
            ("filename", name),
            ("datasetFileContentType", ISMR_CONTENT_TYPE),
            ("md5", md5_b64.as_str()),
        ])
        .send()
        .await
        .map_err(|e| upload_error(name, e))?;

    if response.status() != StatusCode::OK {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(upload_error(name, format!("Unable to get upload url ({status}): {body}")));
    }
    let target: UploadUrlResponse = response.json().await.map_err(|e| upload_error(name, e))?;

    info!("Start file upload for: {}", name);
    let response = client
        .put(&target.temporary_upload_url)
        .header("Content-MD5", md5_b64)
        .header(CONTENT_TYPE, ISMR_CONTENT_TYPE)
        .body(content)
        .send()
        .await
        .map_err(|e| upload_error(name, e))?;

    if response.status() != StatusCode::OK {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(upload_error(name, format!("Unable to upload file ({status}): {body}")));
    }

    info!("Upload of '{}' successful", name);
    Ok(())
}

/// Upload every `.ismr` file directly inside `dir`.
///
/// Returns an error only when the directory itself cannot be listed.
pub async fn upload_directory(settings: &UploadSettings, dir: &Path) -> Result<UploadReport> {
    // ---
    if !dir.is_dir() {
        return Err(ScintError::io(
            dir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "Invalid or non-existing directory"),
        ));
    }

    let files = list_ismr_files(dir)?;
    info!("Number of files to upload: {}", files.len());

    let client = Client::new();
    let settings = Arc::new(settings.clone());
    let pool = Arc::new(Semaphore::new(settings.max_workers as usize));
    let span = tracing::info_span!("upload", run_id = %Uuid::new_v4(), dataset = %settings.dataset);

    let mut tasks = JoinSet::new();
    for path in files {
        let (client, settings, pool) = (client.clone(), settings.clone(), pool.clone());
        tasks.spawn(
            async move {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let _permit = pool
                    .acquire_owned()
                    .await
                    .map_err(|e| (name.clone(), e.to_string()))?;
                upload_file(&client, &settings, &path)
                    .await
                    .map(|()| name.clone())
                    .map_err(|e| (name, e.to_string()))
            }
            .instrument(span.clone()),
        );
    }

    let mut report = UploadReport::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(name)) => report.uploaded.push(name),
            Ok(Err((name, reason))) => report.failed.push((name, reason)),
            Err(e) => report.failed.push((String::new(), e.to_string())),
        }
    }
    report.uploaded.sort();
    report.failed.sort();
    Ok(report)
}
