use std::fmt;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::model::{NewProject, NewTask, ProjectId};

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

const DEFAULT_NAMESPACE: &[u8] = b"trackline/idempotency/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    CreateProject,
    CreateTask,
    CreateComment,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateProject => "project",
            Self::CreateTask => "task",
            Self::CreateComment => "comment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives `Idempotency-Key` values for mutating requests.
///
/// Deterministic keys are a SHA-256 over the client secret, the action and
/// every disambiguator, each length-prefixed so that no two distinct tuples
/// share an encoding.
#[derive(Clone)]
pub struct IdempotencyKeyPolicy {
    secret: Vec<u8>,
}

impl fmt::Debug for IdempotencyKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdempotencyKeyPolicy")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Default for IdempotencyKeyPolicy {
    fn default() -> Self {
        Self::new(None)
    }
}

impl IdempotencyKeyPolicy {
    pub fn new(secret: Option<&str>) -> Self {
        let secret = match secret.map(str::trim).filter(|s| !s.is_empty()) {
            Some(value) => value.as_bytes().to_vec(),
            None => DEFAULT_NAMESPACE.to_vec(),
        };
        Self { secret }
    }

    pub fn key_for(&self, action: ActionKind, disambiguators: &[&str]) -> IdempotencyKey {
        let mut hasher = Sha256::new();
        absorb(&mut hasher, &self.secret);
        absorb(&mut hasher, action.as_str().as_bytes());
        hasher.update((disambiguators.len() as u64).to_be_bytes());
        for part in disambiguators {
            absorb(&mut hasher, part.as_bytes());
        }
        IdempotencyKey(format!("{}-{:x}", action.as_str(), hasher.finalize()))
    }

    /// A random key, for actions where a resubmission counts as a new one.
    pub fn fresh(&self, action: ActionKind) -> IdempotencyKey {
        IdempotencyKey(format!("{}-{}", action.as_str(), Uuid::new_v4().simple()))
    }

    pub fn for_project(&self, draft: &NewProject) -> IdempotencyKey {
        self.key_for(
            ActionKind::CreateProject,
            &[&draft.name, draft.description.as_deref().unwrap_or_default()],
        )
    }

    pub fn for_task(&self, project_id: ProjectId, draft: &NewTask) -> IdempotencyKey {
        let project = project_id.to_string();
        self.key_for(
            ActionKind::CreateTask,
            &[
                &project,
                &draft.title,
                draft.description.as_deref().unwrap_or_default(),
            ],
        )
    }
}

fn absorb(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}
