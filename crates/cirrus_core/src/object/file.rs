//! File metadata records.

use super::CloudObject;
use crate::error::{CoreError, CoreResult};
use crate::types::{ClassName, ObjectId, FILE_CLASS};
use cirrus_codec::Value;

const URL_KEY: &str = "url";
const SIZE_KEY: &str = "size";
const NAME_KEY: &str = "name";
const EXTENSION_KEY: &str = "ext";
const STATUS_KEY: &str = "status";

/// Upload status of a file record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileStatus {
    /// Not uploaded yet.
    #[default]
    Default,
    /// Upload in progress.
    Uploading,
    /// Upload succeeded.
    UploadSuccess,
    /// Upload failed.
    UploadFailure,
}

impl FileStatus {
    fn from_code(code: i64) -> Self {
        match code {
            1 => FileStatus::Uploading,
            2 => FileStatus::UploadSuccess,
            3 => FileStatus::UploadFailure,
            _ => FileStatus::Default,
        }
    }
}

/// A row of the `file__` system class.
///
/// Wraps a [`CloudObject`] and adds read-only accessors for the metadata the
/// blob store writes. The file content itself lives behind [`url`].
///
/// [`url`]: FileRecord::url
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    object: CloudObject,
}

impl FileRecord {
    /// A new, unsaved record pointing at `url`.
    pub fn with_url(url: impl Into<String>) -> CoreResult<Self> {
        let mut object = CloudObject::new(ClassName::file());
        object.set(URL_KEY, Value::String(url.into()))?;
        Ok(Self { object })
    }

    /// Placeholder for an existing record.
    pub fn existing(object_id: ObjectId) -> Self {
        Self {
            object: CloudObject::existing(ClassName::file(), object_id),
        }
    }

    /// Wraps an object of the `file__` class.
    pub fn from_object(object: CloudObject) -> CoreResult<Self> {
        if object.class_name().as_str() != FILE_CLASS {
            return Err(CoreError::invalid_operation(format!(
                "{} is not a file record",
                object.class_name()
            )));
        }
        Ok(Self { object })
    }

    /// The underlying object.
    pub fn object(&self) -> &CloudObject {
        &self.object
    }

    /// Mutable access to the underlying object, for saving and refreshing.
    pub fn object_mut(&mut self) -> &mut CloudObject {
        &mut self.object
    }

    /// Unwraps the underlying object.
    pub fn into_object(self) -> CloudObject {
        self.object
    }

    /// URL of the content, `None` until uploaded and refreshed.
    pub fn url(&self) -> Option<&str> {
        self.object.get(URL_KEY).and_then(Value::as_str)
    }

    /// Size in bytes, 0 when unknown.
    pub fn file_size(&self) -> i64 {
        self.object.get(SIZE_KEY).and_then(Value::as_i64).unwrap_or(0)
    }

    /// File name.
    pub fn file_name(&self) -> Option<&str> {
        self.object.get(NAME_KEY).and_then(Value::as_str)
    }

    /// File extension, without the dot.
    pub fn file_extension(&self) -> Option<&str> {
        self.object.get(EXTENSION_KEY).and_then(Value::as_str)
    }

    /// Upload status.
    pub fn status(&self) -> FileStatus {
        self.object
            .get(STATUS_KEY)
            .and_then(Value::as_i64)
            .map_or(FileStatus::Default, FileStatus::from_code)
    }
}
