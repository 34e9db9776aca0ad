//! Filesystem-backed queue store, used in production.
//!
//! Messages are stored one-per-file under a queue root, sharded into
//! subdirectories keyed by the first characters of their [`SpooledMessageId`]
//! (a ULID, already lexicographically time-ordered) to keep any single
//! directory from growing without bound, following the directory-hashing
//! scheme long used by Postfix's own queue layout. Writes go to a `.tmp` file
//! under an exclusive advisory lock and are committed with an atomic rename;
//! readers take a shared lock. Disk I/O runs on the blocking thread pool since
//! the underlying lock and file operations are synchronous syscalls.

use std::{
    collections::HashMap,
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use fs4::fs_std::FileExt;
use mercator_common::{context::Context, delivery::DeliveryContext, envelope::Envelope};
use serde::{Deserialize, Serialize};

use crate::{
    SerializationError, SpoolError, ValidationError, r#trait::BackingStore,
    types::SpooledMessageId,
};

const BINCODE_CONFIG: bincode::config::Configuration = bincode::config::standard();

fn mail_addr_to_string(addr: &mailparse::MailAddr) -> String {
    match addr {
        mailparse::MailAddr::Group(group) => group.to_string(),
        mailparse::MailAddr::Single(single) => single.to_string(),
    }
}

fn default_path() -> PathBuf {
    PathBuf::from("/var/spool/mercator")
}

const fn default_hash_depth() -> usize {
    2
}

/// On-disk representation of a spooled [`Context`].
///
/// `Context` itself isn't `Serialize` (its envelope holds `mailparse` types
/// that don't round-trip through serde), so this flattened record is what
/// actually gets written to disk; `Context` is reconstructed from it on read.
#[derive(Debug, Serialize, Deserialize)]
struct Record {
    id: String,
    sender: Option<String>,
    recipients: Vec<String>,
    data: Vec<u8>,
    tracking_id: Option<String>,
    extended: bool,
    metadata: HashMap<String, String>,
    delivery: Option<DeliveryContext>,
}

impl From<&Context> for Record {
    fn from(context: &Context) -> Self {
        let recipients = context
            .envelope
            .recipients()
            .map_or_else(Vec::new, |addrs| addrs.iter().map(mail_addr_to_string).collect());

        Self {
            id: context.id.clone(),
            sender: context.envelope.sender().map(mail_addr_to_string),
            recipients,
            data: context
                .data
                .as_deref()
                .map(<[u8]>::to_vec)
                .unwrap_or_default(),
            tracking_id: context.tracking_id.clone(),
            extended: context.extended,
            metadata: context
                .metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            delivery: context.delivery.clone(),
        }
    }
}

impl Record {
    fn into_context(self) -> Context {
        let mut envelope = Envelope::default();

        if let Some(sender) = self.sender.as_deref() {
            *envelope.sender_mut() = mailparse::addrparse(sender)
                .ok()
                .and_then(|list| list.first().cloned());
        }

        let mut recipients: Option<mailparse::MailAddrList> = None;
        for recipient in &self.recipients {
            if let Ok(parsed) = mailparse::addrparse(recipient) {
                match recipients.as_mut() {
                    Some(existing) => existing.extend_from_slice(&parsed[..]),
                    None => recipients = Some(parsed),
                }
            }
        }
        *envelope.recipients_mut() = recipients;

        Context {
            id: self.id,
            envelope,
            data: (!self.data.is_empty()).then(|| Arc::from(self.data)),
            data_response: None,
            response: None,
            tracking_id: self.tracking_id,
            extended: self.extended,
            metadata: self
                .metadata
                .into_iter()
                .map(|(k, v)| (std::borrow::Cow::Owned(k), v))
                .collect(),
            delivery: self.delivery,
            banner: Arc::from(""),
            max_message_size: 0,
            capabilities: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileBackingStore {
    path: PathBuf,
    /// Number of leading ULID characters used to shard the queue root into
    /// subdirectories.
    #[serde(default = "default_hash_depth")]
    hash_depth: usize,
}

impl Default for FileBackingStore {
    fn default() -> Self {
        Self {
            path: default_path(),
            hash_depth: default_hash_depth(),
        }
    }
}

#[derive(Debug, Default)]
pub struct FileBackingStoreBuilder {
    path: Option<PathBuf>,
    hash_depth: Option<usize>,
}

impl FileBackingStoreBuilder {
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub const fn hash_depth(mut self, depth: usize) -> Self {
        self.hash_depth = Some(depth);
        self
    }

    /// # Errors
    /// Returns an error if the queue directory cannot be created or is not a directory.
    pub fn build(self) -> crate::Result<FileBackingStore> {
        let store = FileBackingStore {
            path: self.path.unwrap_or_else(default_path),
            hash_depth: self.hash_depth.unwrap_or_else(default_hash_depth).max(1),
        };
        store.ensure_layout()?;
        Ok(store)
    }
}

impl FileBackingStore {
    #[must_use]
    pub fn builder() -> FileBackingStoreBuilder {
        FileBackingStoreBuilder::default()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the queue root directory if it does not already exist.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or is not writable.
    pub fn ensure_layout(&self) -> crate::Result<()> {
        fs::create_dir_all(&self.path)?;
        if !self.path.is_dir() {
            return Err(SpoolError::Validation(ValidationError::NotDirectory(
                self.path.display().to_string(),
            )));
        }
        Ok(())
    }

    fn shard(&self, id: &SpooledMessageId) -> PathBuf {
        let rendered = id.to_string();
        self.path
            .join(&rendered[..self.hash_depth.min(rendered.len())])
    }

    fn data_path(&self, id: &SpooledMessageId) -> PathBuf {
        self.shard(id).join(format!("{id}.bin"))
    }

    fn tmp_path(&self, id: &SpooledMessageId) -> PathBuf {
        self.shard(id).join(format!("{id}.tmp"))
    }

    fn write_record_blocking(&self, id: &SpooledMessageId, record: &Record) -> crate::Result<()> {
        fs::create_dir_all(self.shard(id))?;

        let bytes = bincode::serde::encode_to_vec(record, BINCODE_CONFIG)
            .map_err(SerializationError::Encode)?;

        let tmp = self.tmp_path(id);
        let mut file = File::create(&tmp)?;
        file.try_lock_exclusive()
            .map_err(|_| SpoolError::Locked(id.clone()))?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        FileExt::unlock(&file)?;
        drop(file);

        fs::rename(&tmp, self.data_path(id))?;
        Ok(())
    }

    fn read_record_blocking(&self, id: &SpooledMessageId) -> crate::Result<Record> {
        let mut file = File::open(self.data_path(id)).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                SpoolError::NotFound(id.clone())
            } else {
                SpoolError::Io(err)
            }
        })?;

        file.try_lock_shared()
            .map_err(|_| SpoolError::Locked(id.clone()))?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        FileExt::unlock(&file)?;

        let (record, _) = bincode::serde::decode_from_slice(&bytes, BINCODE_CONFIG)
            .map_err(SerializationError::Decode)?;
        Ok(record)
    }

    fn delete_record_blocking(&self, id: &SpooledMessageId) -> crate::Result<()> {
        fs::remove_file(self.data_path(id)).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                SpoolError::NotFound(id.clone())
            } else {
                SpoolError::Io(err)
            }
        })
    }

    fn list_blocking(&self) -> crate::Result<Vec<SpooledMessageId>> {
        let mut ids = Vec::new();

        for shard in fs::read_dir(&self.path)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }

            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                if let Some(id) = entry
                    .file_name()
                    .to_str()
                    .and_then(SpooledMessageId::from_filename)
                {
                    ids.push(id);
                }
            }
        }

        ids.sort();
        Ok(ids)
    }
}

fn join_blocking<T>(result: std::result::Result<crate::Result<T>, tokio::task::JoinError>) -> crate::Result<T> {
    result.map_err(|err| SpoolError::Internal(format!("Blocking spool task panicked: {err}")))?
}

#[async_trait]
impl BackingStore for FileBackingStore {
    async fn write(&self, context: &mut Context) -> crate::Result<SpooledMessageId> {
        let id = SpooledMessageId::generate();
        context.tracking_id = Some(id.to_string());

        let record = Record::from(&*context);
        let store = self.clone();
        let write_id = id.clone();
        join_blocking(
            tokio::task::spawn_blocking(move || store.write_record_blocking(&write_id, &record))
                .await,
        )?;

        Ok(id)
    }

    async fn list(&self) -> crate::Result<Vec<SpooledMessageId>> {
        let store = self.clone();
        join_blocking(tokio::task::spawn_blocking(move || store.list_blocking()).await)
    }

    async fn read(&self, id: &SpooledMessageId) -> crate::Result<Context> {
        let store = self.clone();
        let id = id.clone();
        let record = join_blocking(
            tokio::task::spawn_blocking(move || store.read_record_blocking(&id)).await,
        )?;
        Ok(record.into_context())
    }

    async fn update(&self, id: &SpooledMessageId, context: &Context) -> crate::Result<()> {
        let record = Record::from(context);
        let store = self.clone();
        let id = id.clone();
        join_blocking(
            tokio::task::spawn_blocking(move || {
                if !store.data_path(&id).exists() {
                    return Err(SpoolError::NotFound(id.clone()));
                }
                store.write_record_blocking(&id, &record)
            })
            .await,
        )
    }

    async fn delete(&self, id: &SpooledMessageId) -> crate::Result<()> {
        let store = self.clone();
        let id = id.clone();
        join_blocking(
            tokio::task::spawn_blocking(move || store.delete_record_blocking(&id)).await,
        )
    }
}
