use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::ResultExt;

use super::collection::ChatCollection;
use super::error::{
    CreateStoreDirectorySnafu, ReplaceSnapshotSnafu, SerializeSnapshotSnafu, StoreResult,
    WriteSnapshotSnafu,
};
use super::ids::ConversationId;
use super::memory::lock;
use super::types::{
    AUTH_NAMESPACE, AppendOutcome, CHATS_NAMESPACE, ConversationRecord, MutationOutcome,
    NewMessage, UserRecord,
};
use super::{ConversationStore, UserStore};

/// Durable store backend. Every applied mutation rewrites the owning
/// namespace snapshot (`<dir>/<namespace>.json`) before returning, so the
/// on-disk state always matches the last completed operation.
#[derive(Debug)]
pub struct JsonStore {
    directory: PathBuf,
    chats: Mutex<ChatCollection>,
    user: Mutex<Option<UserRecord>>,
}

impl JsonStore {
    /// Opens the store, restoring both namespace snapshots. A missing or
    /// unreadable snapshot starts empty; only directory creation can fail.
    pub fn open(directory: impl Into<PathBuf>) -> StoreResult<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory).context(CreateStoreDirectorySnafu {
            stage: "json-store-open",
            path: display_path(&directory),
        })?;

        let chats = load_snapshot::<ChatCollection>(&snapshot_path(&directory, CHATS_NAMESPACE));
        let user = load_snapshot::<Option<UserRecord>>(&snapshot_path(&directory, AUTH_NAMESPACE));

        Ok(Self {
            directory,
            chats: Mutex::new(chats),
            user: Mutex::new(user),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn persist_chats(&self, chats: &ChatCollection) -> StoreResult<()> {
        self.persist(CHATS_NAMESPACE, chats)
    }

    fn persist_user(&self, user: &Option<UserRecord>) -> StoreResult<()> {
        self.persist(AUTH_NAMESPACE, user)
    }

    fn persist<T: Serialize>(&self, namespace: &'static str, value: &T) -> StoreResult<()> {
        let payload = serde_json::to_string_pretty(value).context(SerializeSnapshotSnafu {
            stage: "serialize-snapshot",
            namespace,
        })?;

        let path = snapshot_path(&self.directory, namespace);
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, payload).context(WriteSnapshotSnafu {
            stage: "write-temporary-snapshot",
            path: display_path(&temp_path),
        })?;
        std::fs::rename(&temp_path, &path).context(ReplaceSnapshotSnafu {
            stage: "replace-snapshot",
            from: display_path(&temp_path),
            to: display_path(&path),
        })
    }
}

fn snapshot_path(directory: &Path, namespace: &str) -> PathBuf {
    directory.join(format!("{namespace}.json"))
}

fn load_snapshot<T: DeserializeOwned + Default>(path: &Path) -> T {
    if !path.exists() {
        return T::default();
    }

    let payload = match std::fs::read_to_string(path) {
        Ok(payload) => payload,
        Err(error) => {
            tracing::warn!(path = %path.display(), error = %error, "snapshot unreadable, starting empty");
            return T::default();
        }
    };

    match serde_json::from_str(&payload) {
        Ok(snapshot) => snapshot,
        Err(error) => {
            tracing::warn!(path = %path.display(), error = %error, "snapshot unparsable, starting empty");
            T::default()
        }
    }
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

impl ConversationStore for JsonStore {
    fn create_conversation(&self, title: &str) -> StoreResult<ConversationRecord> {
        let mut chats = lock(&self.chats);
        let conversation = chats.create(title);
        self.persist_chats(&chats)?;
        Ok(conversation)
    }

    fn list_conversations(&self) -> StoreResult<Vec<ConversationRecord>> {
        Ok(lock(&self.chats).list())
    }

    fn get_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> StoreResult<Option<ConversationRecord>> {
        Ok(lock(&self.chats).get(conversation_id).cloned())
    }

    fn delete_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> StoreResult<MutationOutcome> {
        let mut chats = lock(&self.chats);
        let outcome = chats.delete(conversation_id);
        if outcome.applied() {
            self.persist_chats(&chats)?;
        }
        Ok(outcome)
    }

    fn rename_conversation(
        &self,
        conversation_id: ConversationId,
        title: &str,
    ) -> StoreResult<MutationOutcome> {
        let mut chats = lock(&self.chats);
        let outcome = chats.rename(conversation_id, title);
        if outcome.applied() {
            self.persist_chats(&chats)?;
        }
        Ok(outcome)
    }

    fn append_message(
        &self,
        conversation_id: ConversationId,
        message: NewMessage,
    ) -> StoreResult<AppendOutcome> {
        let mut chats = lock(&self.chats);
        let outcome = chats.append(conversation_id, message);
        if outcome.appended() {
            self.persist_chats(&chats)?;
        }
        Ok(outcome)
    }

    fn active_conversation(&self) -> StoreResult<Option<ConversationId>> {
        Ok(lock(&self.chats).active())
    }

    fn select_conversation(
        &self,
        conversation_id: Option<ConversationId>,
    ) -> StoreResult<MutationOutcome> {
        let mut chats = lock(&self.chats);
        let outcome = chats.select(conversation_id);
        if outcome.applied() {
            self.persist_chats(&chats)?;
        }
        Ok(outcome)
    }
}

impl UserStore for JsonStore {
    fn current_user(&self) -> StoreResult<Option<UserRecord>> {
        Ok(lock(&self.user).clone())
    }

    fn set_user(&self, user: UserRecord) -> StoreResult<()> {
        let mut current = lock(&self.user);
        *current = Some(user);
        self.persist_user(&current)
    }

    fn clear_user(&self) -> StoreResult<()> {
        let mut current = lock(&self.user);
        *current = None;
        self.persist_user(&current)
    }
}
