// Session state and the upload → import → poll → query sequence.
//
// `RagSession` owns at most one active store and the list of files it
// uploaded. That list is a local cache of remote state: files deleted
// through other clients are not noticed until a remote call fails.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::api::FileSearchApi;
use crate::documents::mime_for;
use crate::error::{RagError, Result};
use crate::models::{
    FileSearchStore, GenerateContentRequest, GenerateContentResponse, Operation, RemoteFile,
};
use crate::poll::{poll_until, CancelToken, PollPolicy};

pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_STORE_NAME: &str = "my-knowledge-base";

/// What the response says about the documents behind an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grounding {
    /// The response had no candidates at all.
    NoCandidates,
    /// The first candidate carried no grounding chunks.
    NoSources,
    /// Unique titles of the retrieved documents, sorted.
    Sources(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryAnswer {
    pub question: String,
    pub text: Option<String>,
    pub grounding: Grounding,
    pub response: GenerateContentResponse,
}

/// Source titles referenced by the first candidate of `response`.
pub fn grounding_sources(response: &GenerateContentResponse) -> Grounding {
    let Some(candidate) = response.candidates.first() else {
        return Grounding::NoCandidates;
    };
    let chunks = match &candidate.grounding_metadata {
        Some(meta) if !meta.grounding_chunks.is_empty() => &meta.grounding_chunks,
        _ => return Grounding::NoSources,
    };
    let titles: BTreeSet<String> = chunks
        .iter()
        .filter_map(|c| c.retrieved_context.as_ref()?.title.clone())
        .collect();
    Grounding::Sources(titles.into_iter().collect())
}

pub struct RagSession<A: FileSearchApi> {
    api: A,
    model: String,
    store: Option<FileSearchStore>,
    uploaded_files: Vec<RemoteFile>,
    poll: PollPolicy,
    cancel: CancelToken,
    metadata_filter: Option<String>,
}

impl<A: FileSearchApi> RagSession<A> {
    pub fn new(api: A) -> Self {
        RagSession {
            api,
            model: DEFAULT_MODEL.to_string(),
            store: None,
            uploaded_files: Vec::new(),
            poll: PollPolicy::default(),
            cancel: CancelToken::new(),
            metadata_filter: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Filter expression sent with every query (e.g. `author = "x"`).
    #[must_use]
    pub fn with_metadata_filter(mut self, filter: Option<String>) -> Self {
        self.metadata_filter = filter;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn store(&self) -> Option<&FileSearchStore> {
        self.store.as_ref()
    }

    pub fn uploaded_files(&self) -> &[RemoteFile] {
        &self.uploaded_files
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Token that aborts an in-progress upload or batch. It is cleared when
    /// `upload_file` or a batch upload starts, and checked before each raw
    /// upload and between import status checks.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Create a remote store and make it the active one.
    pub fn create_store(&mut self, display_name: &str) -> Result<&FileSearchStore> {
        info!(display_name, "creating file search store");
        let store = self.api.create_store(display_name)?;
        info!(store = %store.name, "file search store created");
        Ok(self.store.insert(store))
    }

    /// Delete the active store. Returns `false` when there was none.
    /// The local reference is only cleared once the remote delete succeeds.
    pub fn delete_store(&mut self) -> Result<bool> {
        let Some(store) = &self.store else {
            info!("no file search store to delete");
            return Ok(false);
        };
        self.api.delete_store(&store.name)?;
        info!(store = %store.name, "deleted file search store");
        self.store = None;
        Ok(true)
    }

    /// All remote stores. Failures are logged and yield an empty list.
    pub fn list_stores(&self) -> Vec<FileSearchStore> {
        self.api.list_stores().unwrap_or_else(|e| {
            warn!(error = %e, "error listing stores");
            Vec::new()
        })
    }

    /// All remote files. Failures are logged and yield an empty list.
    pub fn list_files(&self) -> Vec<RemoteFile> {
        self.api.list_files().unwrap_or_else(|e| {
            warn!(error = %e, "error listing files");
            Vec::new()
        })
    }

    /// Upload `path`, import it into the active store and wait for the
    /// import to finish.
    pub fn upload_file(&mut self, path: &Path) -> Result<RemoteFile> {
        self.cancel.reset();
        self.upload_one(path)
    }

    fn upload_one(&mut self, path: &Path) -> Result<RemoteFile> {
        if !path.exists() {
            return Err(RagError::FileNotFound(path.to_path_buf()));
        }
        let store_name = self.store.as_ref().ok_or(RagError::NoStore)?.name.clone();

        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        if self.cancel.is_cancelled() {
            return Err(RagError::PollCancelled { name: display_name });
        }
        let mime_type = mime_for(path);

        info!(file = %display_name, mime = %mime_type, "uploading file");
        let uploaded = self
            .api
            .upload_file(path, &display_name, mime_type.essence_str())?;
        info!(file = %uploaded.name, "file uploaded");

        info!(store = %store_name, "importing file into search store");
        let imported = self
            .api
            .import_file(&store_name, &uploaded.name)
            .and_then(|operation| self.wait_for(operation));
        if let Err(e) = imported {
            // the raw file is not tracked yet, so drop it here
            if let Err(delete_err) = self.api.delete_file(&uploaded.name) {
                warn!(file = %uploaded.name, error = %delete_err, "error deleting unimported file");
            }
            return Err(e);
        }

        info!(file = %display_name, "file imported");
        self.uploaded_files.push(uploaded.clone());
        Ok(uploaded)
    }

    fn wait_for(&self, operation: Operation) -> Result<Operation> {
        let name = operation.name.clone();
        let mut current = Some(operation);
        let done = poll_until(&name, &self.poll, &self.cancel, || {
            let op = match current.take() {
                Some(op) => op,
                None => self.api.get_operation(&name)?,
            };
            Ok(op.done.then_some(op))
        })?;
        if let Some(status) = &done.error {
            return Err(RagError::OperationFailed {
                name,
                message: status.message.clone(),
            });
        }
        Ok(done)
    }

    /// Upload every path, recording failures instead of stopping. Once the
    /// cancel token is set the remaining paths are reported as failed
    /// without any remote call.
    pub fn upload_multiple_files<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
    ) -> Vec<(PathBuf, Option<RemoteFile>)> {
        self.upload_multiple_files_with(paths, |_, _| {})
    }

    /// Like [`upload_multiple_files`](Self::upload_multiple_files), calling
    /// `on_item` after each path is handled.
    pub fn upload_multiple_files_with<P, F>(
        &mut self,
        paths: &[P],
        mut on_item: F,
    ) -> Vec<(PathBuf, Option<RemoteFile>)>
    where
        P: AsRef<Path>,
        F: FnMut(&Path, Option<&RemoteFile>),
    {
        self.cancel.reset();
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            if self.cancel.is_cancelled() {
                warn!(path = %path.display(), "upload cancelled");
                on_item(path, None);
                results.push((path.to_path_buf(), None));
                continue;
            }
            let outcome = match self.upload_one(path) {
                Ok(file) => Some(file),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "error uploading file");
                    None
                }
            };
            on_item(path, outcome.as_ref());
            results.push((path.to_path_buf(), outcome));
        }
        results
    }

    /// Ask `question` against the active store.
    pub fn query(&self, question: &str) -> Result<QueryAnswer> {
        let store = self.store.as_ref().ok_or(RagError::NoStore)?;
        if self.uploaded_files.is_empty() {
            return Err(RagError::NoFiles);
        }

        info!(question, model = %self.model, "querying");
        let request = GenerateContentRequest::with_file_search(
            question,
            vec![store.name.clone()],
            self.metadata_filter.clone(),
        );
        let response = self.api.generate_content(&self.model, &request)?;
        Ok(QueryAnswer {
            question: question.to_string(),
            text: response.text(),
            grounding: grounding_sources(&response),
            response,
        })
    }

    /// Delete every file this session uploaded. Individual failures are
    /// logged; the local list is empty afterwards either way. Returns the
    /// number of files actually deleted.
    pub fn delete_files(&mut self) -> usize {
        info!(count = self.uploaded_files.len(), "deleting uploaded files");
        let mut deleted = 0;
        for file in self.uploaded_files.drain(..) {
            match self.api.delete_file(&file.name) {
                Ok(()) => {
                    info!(file = %file.name, "deleted");
                    deleted += 1;
                }
                Err(e) => warn!(file = %file.name, error = %e, "error deleting file"),
            }
        }
        deleted
    }
}
