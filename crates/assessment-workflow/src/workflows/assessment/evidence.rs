use super::domain::{AnswerId, EvidenceRecord};

/// Read-only view over the evidence files attached to company answers. Storage mechanics
/// live with the file collaborator; the workflow only lists what is attached.
pub trait EvidenceIndex: Send + Sync {
    fn evidence(&self, answer: AnswerId) -> Result<Vec<EvidenceRecord>, EvidenceError>;

    fn count(&self, answer: AnswerId) -> Result<usize, EvidenceError> {
        Ok(self.evidence(answer)?.len())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
    #[error("evidence index unavailable: {0}")]
    Unavailable(String),
}

/// Index for deployments without an attached file store.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEvidence;

impl EvidenceIndex for NoEvidence {
    fn evidence(&self, _answer: AnswerId) -> Result<Vec<EvidenceRecord>, EvidenceError> {
        Ok(Vec::new())
    }
}
