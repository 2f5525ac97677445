use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatLedgerError {
    #[error(
        "ledger integrity: uploadFilesToVectorStore must map exactly one path to one id (paths={paths:?}, ids={ids:?})"
    )]
    BatchUploadMismatch { paths: Vec<String>, ids: Vec<String> },
    #[error("ledger integrity: {operation} entry does not reference the identifier it retires")]
    TombstoneMissingId { operation: String },
    #[error("assistant requested clarification for {file}:\n{reply}")]
    ClarificationRequested { file: String, reply: String },
    #[error("{operation} failed with status {status}: {body}")]
    RemoteCall {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("interrupted during {stage}; nothing further was sent")]
    Interrupted { stage: String },
    #[error("config file invalid or unreadable: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarnCode {
    W001LedgerWrite,
    W002LedgerRead,
    W003DeleteFailed,
    W004SearchSkipped,
    W005PartialAnswer,
    W006SkippedFile,
}

impl WarnCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::W001LedgerWrite => "W001_LEDGER_WRITE",
            Self::W002LedgerRead => "W002_LEDGER_READ",
            Self::W003DeleteFailed => "W003_DELETE_FAILED",
            Self::W004SearchSkipped => "W004_SEARCH_SKIPPED",
            Self::W005PartialAnswer => "W005_PARTIAL_ANSWER",
            Self::W006SkippedFile => "W006_SKIPPED_FILE",
        }
    }
}
