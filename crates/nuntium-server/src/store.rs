//! Persistent per-message state.
//!
//! ```text
//! <data-dir>/store/<uuid>.db                   state record (JSON)
//! <data-dir>/store/<uuid>.mms                  raw M-Retrieve.Conf
//! <cache-dir>/store/<uuid>.m-notifyresp.ind    transient, removed after upload
//! <cache-dir>/store/<uuid>.m-send.req          transient, removed after upload
//! ```
//!
//! Records are written to a temporary file, synced and renamed over the
//! previous version, so a crash leaves either the old or the new record.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use nuntium_core::MNotificationInd;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

const STATE_EXT: &str = "db";
const CONTENT_EXT: &str = "mms";
pub const NOTIFY_RESP_SUFFIX: &str = "m-notifyresp.ind";
pub const SEND_REQ_SUFFIX: &str = "m-send.req";
pub const RETRIEVE_CONF_SUFFIX: &str = "m-retrieve.conf";

/// Lifecycle of a stored message. Incoming rows move through
/// `Notification..=Responded`, outgoing ones `Draft..=Sent`; a row never
/// moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageState {
    Notification,
    Downloaded,
    Received,
    Responded,
    Draft,
    Sent,
}

impl MessageState {
    pub fn is_outgoing(self) -> bool {
        matches!(self, Self::Draft | Self::Sent)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MmsState {
    pub id: Uuid,
    pub state: MessageState,
    #[serde(default)]
    pub content_location: String,
    /// Recipient to delivery status, for outgoing messages.
    #[serde(default)]
    pub send_state: BTreeMap<String, String>,
    #[serde(default)]
    pub modem_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m_notification_ind: Option<MNotificationInd>,
    /// Download attempts made by startup recovery.
    #[serde(default)]
    pub attempts: u32,
    /// Fields written by other versions, kept as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MmsState {
    fn new(id: Uuid, state: MessageState, modem_id: &str) -> Self {
        Self {
            id,
            state,
            content_location: String::new(),
            send_state: BTreeMap::new(),
            modem_id: modem_id.to_string(),
            m_notification_ind: None,
            attempts: 0,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MmsStore {
    data_dir: PathBuf,
    cache_dir: PathBuf,
}

impl MmsStore {
    /// Opens (creating if needed) `<data_dir>/store` and `<cache_dir>/store`.
    pub fn open(data_dir: &Path, cache_dir: &Path) -> StoreResult<Self> {
        let data_dir = data_dir.join("store");
        let cache_dir = cache_dir.join("store");
        for dir in [&data_dir, &cache_dir] {
            fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        }
        Ok(Self {
            data_dir,
            cache_dir,
        })
    }

    fn state_path(&self, uuid: Uuid) -> PathBuf {
        self.data_dir.join(format!("{uuid}.{STATE_EXT}"))
    }

    fn content_path(&self, uuid: Uuid) -> PathBuf {
        self.data_dir.join(format!("{uuid}.{CONTENT_EXT}"))
    }

    /// Path for a transient PDU file, e.g. `<uuid>.m-send.req`.
    pub fn transient_path(&self, uuid: Uuid, suffix: &str) -> PathBuf {
        self.cache_dir.join(format!("{uuid}.{suffix}"))
    }

    /// Records a fresh notification.
    pub fn create(&self, notification: &MNotificationInd, modem_id: &str) -> StoreResult<MmsState> {
        let mut state = MmsState::new(notification.uuid, MessageState::Notification, modem_id);
        state.content_location = notification.content_location.clone();
        state.m_notification_ind = Some(notification.clone());
        self.write(&state)?;
        debug!(uuid = %notification.uuid, "Stored notification");
        Ok(state)
    }

    /// Records an outgoing message that is not sent yet.
    pub fn create_draft(
        &self,
        uuid: Uuid,
        modem_id: &str,
        recipients: &[String],
    ) -> StoreResult<MmsState> {
        let mut state = MmsState::new(uuid, MessageState::Draft, modem_id);
        state.send_state = recipients
            .iter()
            .map(|r| (r.clone(), "pending".to_string()))
            .collect();
        self.write(&state)?;
        Ok(state)
    }

    pub fn get(&self, uuid: Uuid) -> StoreResult<MmsState> {
        let path = self.state_path(uuid);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(uuid.to_string()));
            }
            Err(e) => return Err(StoreError::io(path, e)),
        };
        serde_json::from_slice(&content).map_err(|source| StoreError::Json { path, source })
    }

    /// All readable records. Unreadable ones are logged and skipped.
    pub fn list(&self) -> StoreResult<Vec<MmsState>> {
        let entries = fs::read_dir(&self.data_dir).map_err(|e| StoreError::io(&self.data_dir, e))?;
        let mut rows = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(STATE_EXT) {
                continue;
            }
            let Some(uuid) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                continue;
            };
            match self.get(uuid) {
                Ok(row) => rows.push(row),
                Err(e) => warn!(error = %e, "Skipping unreadable state record"),
            }
        }
        rows.sort_by_key(|row| row.id);
        Ok(rows)
    }

    /// Moves the downloaded blob into place and marks the row `DOWNLOADED`.
    pub fn update_downloaded(&self, uuid: Uuid, tmp: &Path) -> StoreResult<MmsState> {
        let mut state = self.get(uuid)?;
        let dest = self.content_path(uuid);
        move_synced(tmp, &dest).map_err(|e| StoreError::io(tmp, e))?;
        advance(&mut state, MessageState::Downloaded);
        self.write(&state)?;
        Ok(state)
    }

    pub fn update_retrieved(&self, uuid: Uuid) -> StoreResult<MmsState> {
        self.update(uuid, |state| advance(state, MessageState::Received))
    }

    pub fn update_responded(&self, uuid: Uuid) -> StoreResult<MmsState> {
        self.update(uuid, |state| advance(state, MessageState::Responded))
    }

    pub fn update_sent(&self, uuid: Uuid, delivery_status: &str) -> StoreResult<MmsState> {
        self.update(uuid, |state| {
            advance(state, MessageState::Sent);
            for status in state.send_state.values_mut() {
                *status = delivery_status.to_string();
            }
        })
    }

    /// Counts a recovery download attempt, returning the new total.
    pub fn record_attempt(&self, uuid: Uuid) -> StoreResult<u32> {
        Ok(self.update(uuid, |state| state.attempts += 1)?.attempts)
    }

    /// Removes the record and its blob. Missing files are not an error.
    pub fn destroy(&self, uuid: Uuid) -> StoreResult<()> {
        for path in [self.state_path(uuid), self.content_path(uuid)] {
            match fs::remove_file(&path) {
                Ok(()) => trace!(path = %path.display(), "Removed"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(path, e)),
            }
        }
        Ok(())
    }

    /// Path of the stored M-Retrieve.Conf.
    pub fn get_content(&self, uuid: Uuid) -> StoreResult<PathBuf> {
        let path = self.content_path(uuid);
        if path.is_file() {
            Ok(path)
        } else {
            Err(StoreError::NotFound(format!("{uuid}.{CONTENT_EXT}")))
        }
    }

    fn update(&self, uuid: Uuid, f: impl FnOnce(&mut MmsState)) -> StoreResult<MmsState> {
        let mut state = self.get(uuid)?;
        f(&mut state);
        self.write(&state)?;
        Ok(state)
    }

    fn write(&self, state: &MmsState) -> StoreResult<()> {
        let path = self.state_path(state.id);
        let temp_path = path.with_extension("db.tmp");
        let content = serde_json::to_vec_pretty(state).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;

        let mut file = File::create(&temp_path).map_err(|e| StoreError::io(&temp_path, e))?;
        file.write_all(&content)
            .and_then(|()| file.sync_all())
            .map_err(|e| StoreError::io(&temp_path, e))?;
        fs::rename(&temp_path, &path).map_err(|e| StoreError::io(&path, e))?;
        trace!(uuid = %state.id, state = ?state.state, "Wrote state record");
        Ok(())
    }
}

/// Moves `from` over `to` and syncs it. The cache and data directories may
/// sit on different filesystems, in which case the blob is copied.
fn move_synced(from: &Path, to: &Path) -> std::io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => File::open(to)?.sync_all(),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            debug!(from = %from.display(), to = %to.display(), "Copying across filesystems");
            copy_synced(from, to)?;
            fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}

fn copy_synced(from: &Path, to: &Path) -> std::io::Result<()> {
    let temp_path = to.with_extension("mms.tmp");
    fs::copy(from, &temp_path)?;
    File::options().write(true).open(&temp_path)?.sync_all()?;
    fs::rename(&temp_path, to)
}

fn advance(state: &mut MmsState, to: MessageState) {
    if to > state.state {
        state.state = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, MmsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MmsStore::open(&dir.path().join("data"), &dir.path().join("cache")).unwrap();
        (dir, store)
    }

    fn notification() -> MNotificationInd {
        MNotificationInd {
            uuid: Uuid::new_v4(),
            transaction_id: "tid-1".into(),
            content_location: "http://mmsc.example.net/abc".into(),
            ..MNotificationInd::default()
        }
    }

    #[test]
    fn copy_synced_replaces_destination() {
        let (dir, _store) = store();
        let from = dir.path().join("cache").join("blob");
        let to = dir.path().join("data").join("store").join("blob.mms");
        fs::write(&from, [1, 2, 3]).unwrap();
        fs::write(&to, [9]).unwrap();

        copy_synced(&from, &to).unwrap();
        assert_eq!(fs::read(&to).unwrap(), [1, 2, 3]);
        assert!(!to.with_extension("mms.tmp").exists());

        move_synced(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), [1, 2, 3]);
    }

    #[test]
    fn nested_unknown_fields_survive_updates() {
        let (dir, store) = store();
        let n = notification();
        store.create(&n, "/ril_0").unwrap();

        let path = dir
            .path()
            .join("data")
            .join("store")
            .join(format!("{}.db", n.uuid));
        let mut json: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        json["m_notification_ind"]["x_newer_field"] = Value::from("kept");
        fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

        store.update_retrieved(n.uuid).unwrap();
        let json: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["m_notification_ind"]["x_newer_field"], "kept");
        assert_eq!(json["state"], "RECEIVED");
        let row = store.get(n.uuid).unwrap();
        assert_eq!(
            row.m_notification_ind.unwrap().extra["x_newer_field"],
            Value::from("kept")
        );
    }

    #[test]
    fn incoming_lifecycle() {
        let (_dir, store) = store();
        let n = notification();
        let row = store.create(&n, "/ril_0").unwrap();
        assert_eq!(row.state, MessageState::Notification);
        assert_eq!(row.m_notification_ind.as_ref(), Some(&n));

        let tmp = store.transient_path(n.uuid, RETRIEVE_CONF_SUFFIX);
        fs::write(&tmp, [0x8C, 0x84]).unwrap();
        assert_eq!(
            store.update_downloaded(n.uuid, &tmp).unwrap().state,
            MessageState::Downloaded
        );
        assert!(!tmp.exists());
        assert_eq!(fs::read(store.get_content(n.uuid).unwrap()).unwrap(), [0x8C, 0x84]);

        store.update_retrieved(n.uuid).unwrap();
        let once = store.get(n.uuid).unwrap();
        store.update_retrieved(n.uuid).unwrap();
        assert_eq!(store.get(n.uuid).unwrap(), once);

        store.update_responded(n.uuid).unwrap();
        // no regression from RESPONDED
        store.update_retrieved(n.uuid).unwrap();
        assert_eq!(store.get(n.uuid).unwrap().state, MessageState::Responded);

        store.destroy(n.uuid).unwrap();
        store.destroy(n.uuid).unwrap();
        assert!(matches!(store.get(n.uuid), Err(StoreError::NotFound(_))));
        assert!(store.get_content(n.uuid).is_err());
    }

    #[test]
    fn unknown_fields_survive_updates() {
        let (_dir, store) = store();
        let n = notification();
        store.create(&n, "/ril_0").unwrap();

        let path = store.state_path(n.uuid);
        let mut value: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        value["written_by_newer_version"] = Value::from(42);
        fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

        store.update_retrieved(n.uuid).unwrap();
        let value: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["written_by_newer_version"], 42);
        assert_eq!(value["state"], "RECEIVED");
    }

    #[test]
    fn drafts_and_sent() {
        let (_dir, store) = store();
        let uuid = Uuid::new_v4();
        let row = store
            .create_draft(uuid, "/ril_0", &["+15551234567".to_string()])
            .unwrap();
        assert!(row.state.is_outgoing());
        assert_eq!(row.send_state["+15551234567"], "pending");

        let row = store.update_sent(uuid, "sent").unwrap();
        assert_eq!(row.state, MessageState::Sent);
        assert_eq!(row.send_state["+15551234567"], "sent");
    }

    #[test]
    fn list_skips_garbage() {
        let (_dir, store) = store();
        let a = notification();
        let b = notification();
        store.create(&a, "/ril_0").unwrap();
        store.create(&b, "/ril_1").unwrap();
        fs::write(store.data_dir.join("not-a-uuid.db"), b"{}").unwrap();
        fs::write(store.state_path(Uuid::new_v4()), b"{truncated").unwrap();

        let rows = store.list().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(store.record_attempt(a.uuid).unwrap(), 1);
        assert_eq!(store.record_attempt(a.uuid).unwrap(), 2);
    }

    #[test]
    fn missing_row_is_not_found() {
        let (_dir, store) = store();
        let tmp = store.transient_path(Uuid::new_v4(), RETRIEVE_CONF_SUFFIX);
        assert!(matches!(
            store.update_downloaded(Uuid::new_v4(), &tmp),
            Err(StoreError::NotFound(_))
        ));
    }
}
