// API client module: a small blocking HTTP client for the Gemini File
// Search endpoints. The session talks to it through `FileSearchApi` so the
// remote side can be swapped for an in-memory double in tests.

use reqwest::blocking::{Body, Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::{RagError, Result};
use crate::models::{
    CreateStoreRequest, FileSearchStore, GenerateContentRequest, GenerateContentResponse,
    ImportFileRequest, ListFilesResponse, ListStoresResponse, Operation, RemoteFile,
    UploadFileMetadata, UploadFileResponse, UploadStartRequest,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const API_VERSION: &str = "v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";
const STORES_PAGE_SIZE: u32 = 20;
const FILES_PAGE_SIZE: u32 = 100;

/// Remote operations the session needs. Every method is one logical
/// service call (listing methods follow page tokens internally).
pub trait FileSearchApi {
    fn create_store(&self, display_name: &str) -> Result<FileSearchStore>;
    fn list_stores(&self) -> Result<Vec<FileSearchStore>>;
    fn delete_store(&self, store_name: &str) -> Result<()>;
    fn upload_file(&self, path: &Path, display_name: &str, mime_type: &str)
        -> Result<RemoteFile>;
    fn list_files(&self) -> Result<Vec<RemoteFile>>;
    fn delete_file(&self, file_name: &str) -> Result<()>;
    fn import_file(&self, store_name: &str, file_name: &str) -> Result<Operation>;
    fn get_operation(&self, operation_name: &str) -> Result<Operation>;
    fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse>;
}

/// Blocking Gemini client holding the credential and base URL.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(RagError::MissingCredential);
        }
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(api_key).map_err(|_| {
            RagError::InvalidConfiguration("API key contains invalid header characters".into())
        })?;
        key.set_sensitive(true);
        headers.insert(API_KEY_HEADER, key);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        debug!(base_url, "Gemini client initialized");
        Ok(GeminiClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_VERSION, path)
    }

    /// Send and decode a JSON body, mapping non-success statuses to
    /// `RagError::Api`.
    fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder, context: &str) -> Result<T> {
        let res = check_status(req.send()?)?;
        let text = res.text()?;
        serde_json::from_str(&text).map_err(|e| RagError::parsing(context, e))
    }

    fn send_empty(&self, req: RequestBuilder) -> Result<()> {
        check_status(req.send()?)?;
        Ok(())
    }

    fn paged<T, P, F>(&self, path: &str, page_size: u32, context: &str, mut split: F) -> Result<Vec<T>>
    where
        P: DeserializeOwned,
        F: FnMut(P) -> (Vec<T>, Option<String>),
    {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut req = self
                .client
                .get(self.url(path))
                .query(&[("pageSize", page_size.to_string())]);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token)]);
            }
            let page: P = self.send_json(req, context)?;
            let (mut batch, next) = split(page);
            items.append(&mut batch);
            match next {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(items)
    }
}

fn check_status(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().unwrap_or_default();
    Err(RagError::from_api_body(status, &body))
}

impl FileSearchApi for GeminiClient {
    #[instrument(skip(self))]
    fn create_store(&self, display_name: &str) -> Result<FileSearchStore> {
        let req = self
            .client
            .post(self.url("fileSearchStores"))
            .json(&CreateStoreRequest { display_name });
        self.send_json(req, "create file search store")
    }

    fn list_stores(&self) -> Result<Vec<FileSearchStore>> {
        self.paged(
            "fileSearchStores",
            STORES_PAGE_SIZE,
            "list file search stores",
            |page: ListStoresResponse| (page.file_search_stores, page.next_page_token),
        )
    }

    #[instrument(skip(self))]
    fn delete_store(&self, store_name: &str) -> Result<()> {
        // force also removes the documents the store still holds
        let req = self
            .client
            .delete(self.url(store_name))
            .query(&[("force", "true")]);
        self.send_empty(req)
    }

    /// Resumable upload: a start request announces size and type and
    /// returns a session URL, then the bytes are sent and finalized.
    #[instrument(skip(self, path))]
    fn upload_file(&self, path: &Path, display_name: &str, mime_type: &str) -> Result<RemoteFile> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();

        let start = self
            .client
            .post(format!("{}/upload/{}/files", self.base_url, API_VERSION))
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", len.to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&UploadStartRequest {
                file: UploadFileMetadata { display_name },
            })
            .send()?;
        let start = check_status(start)?;
        let upload_url = start
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                RagError::UnexpectedResponse("upload start response has no upload URL".into())
            })?;

        let req = self
            .client
            .post(upload_url)
            .header(CONTENT_LENGTH, len)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(Body::sized(file, len));
        let uploaded: UploadFileResponse = self.send_json(req, "upload file")?;
        Ok(uploaded.file)
    }

    fn list_files(&self) -> Result<Vec<RemoteFile>> {
        self.paged(
            "files",
            FILES_PAGE_SIZE,
            "list files",
            |page: ListFilesResponse| (page.files, page.next_page_token),
        )
    }

    #[instrument(skip(self))]
    fn delete_file(&self, file_name: &str) -> Result<()> {
        self.send_empty(self.client.delete(self.url(file_name)))
    }

    #[instrument(skip(self))]
    fn import_file(&self, store_name: &str, file_name: &str) -> Result<Operation> {
        let req = self
            .client
            .post(self.url(&format!("{store_name}:importFile")))
            .json(&ImportFileRequest { file_name });
        self.send_json(req, "import file")
    }

    fn get_operation(&self, operation_name: &str) -> Result<Operation> {
        self.send_json(self.client.get(self.url(operation_name)), "get operation")
    }

    #[instrument(skip(self, request))]
    fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let model = model.strip_prefix("models/").unwrap_or(model);
        let req = self
            .client
            .post(self.url(&format!("models/{model}:generateContent")))
            .json(request);
        self.send_json(req, "generate content")
    }
}
