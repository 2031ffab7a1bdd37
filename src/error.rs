// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use thiserror::Error;

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum PackageBuildError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("LZMA error: {0}")]
    Lzma(#[from] xz2::stream::Error),

    #[error("duplicate entry")]
    DuplicateEntry,

    #[error("{0} is not a directory")]
    NotADirectory(String),

    #[error("failed to insert \"{0}\" into the package file system: {1}")]
    FilesystemInsert(String, Box<PackageBuildError>),

    #[error("{0}")]
    Validation(String),

    #[error("group resolution for \"{0}\" failed: {1}")]
    GroupResolution(String, String),

    #[error("file already exists and has different contents; won't overwrite without --force")]
    OutputConflict,
}

impl PackageBuildError {
    /// Construct a validation error from a message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, PackageBuildError>;
