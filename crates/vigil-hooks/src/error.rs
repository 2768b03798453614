use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("failed to run '{cmd}': {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to '{cmd}': exit status = {status} stderr = {stderr}")]
    Failed {
        cmd: String,
        status: String,
        stderr: String,
    },
}

pub type HookResult<T> = Result<T, HookError>;
