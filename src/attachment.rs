//! Attachments: picker ingestion, preview seam and the per-form working
//! list.
//!
//! # Working list
//!
//! A form never edits an owner's attachment collection directly. It edits
//! an [`AttachmentEditor`], and on save the owner's collection is
//! **replaced** by the editor's list:
//!
//! | Action | Working list | Store |
//! |--------|--------------|-------|
//! | `add` | appended | inserted now (`Immediate`) or at commit (`Deferred`) |
//! | `remove` | removed | untouched until commit |
//! | commit (create) | becomes the new owner's list | staged items inserted |
//! | commit (update) | replaces the owner's list | dropped items deleted |
//! | `cancel` | discarded | early inserts left unowned |

use crate::config::PersistencePolicy;
use crate::error::Result;
use crate::model::{Attachment, AttachmentOwner};
use crate::store::ObjectStore;
use uuid::Uuid;

/// A file handed over by a photo or document picker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PickedFile {
    pub file_name: String,
    pub type_tag: String,
    pub data: Vec<u8>,
}

impl PickedFile {
    pub fn new(file_name: impl Into<String>, type_tag: impl Into<String>, data: Vec<u8>) -> Self {
        PickedFile {
            file_name: file_name.into(),
            type_tag: type_tag.into(),
            data,
        }
    }

    /// A photo from the library; tagged `"image"`.
    pub fn photo(file_name: impl Into<String>, data: Vec<u8>) -> Self {
        PickedFile::new(file_name, "image", data)
    }

    /// A document; tagged with its lower-cased extension, if any.
    pub fn document(file_name: impl Into<String>, data: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let type_tag = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        PickedFile {
            file_name,
            type_tag,
            data,
        }
    }

    /// New unowned attachment carrying this file.
    pub fn into_attachment(self) -> Attachment {
        Attachment::new(self.file_name, self.type_tag, self.data)
    }
}

/// Keep the successfully loaded picker results; failed loads are dropped.
pub fn accept_picked<I>(results: I) -> Vec<PickedFile>
where
    I: IntoIterator<Item = Result<PickedFile>>,
{
    results
        .into_iter()
        .filter_map(|result| match result {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("Skipping attachment that failed to load: {}", e);
                None
            }
        })
        .collect()
}

/// Something that can show an attachment to the user.
pub trait AttachmentPreview: Send + Sync {
    /// Open a viewer for `attachment`.
    ///
    /// # Errors
    /// Returns `Error::AttachmentError` if the viewer cannot be opened
    fn preview(&self, attachment: &Attachment) -> Result<()>;
}

/// Preview that only logs. Useful headless and in tests.
#[derive(Clone, Default)]
pub struct NoOpPreview;

impl AttachmentPreview for NoOpPreview {
    fn preview(&self, attachment: &Attachment) -> Result<()> {
        info!(
            "Preview {} ({}, {} bytes)",
            attachment.file_name,
            attachment.file_type,
            attachment.size()
        );
        Ok(())
    }
}

/// Form-local working list of attachments.
#[derive(Clone, Debug)]
pub struct AttachmentEditor {
    owner: Option<AttachmentOwner>,
    policy: PersistencePolicy,
    working: Vec<Attachment>,
    persisted_early: Vec<Uuid>,
}

impl AttachmentEditor {
    /// Editor for an owner that does not exist yet.
    pub fn new(policy: PersistencePolicy) -> Self {
        AttachmentEditor {
            owner: None,
            policy,
            working: Vec::new(),
            persisted_early: Vec::new(),
        }
    }

    /// Editor seeded with an existing owner's attachments.
    pub fn for_existing(
        owner: AttachmentOwner,
        existing: Vec<Attachment>,
        policy: PersistencePolicy,
    ) -> Self {
        AttachmentEditor {
            owner: Some(owner),
            policy,
            working: existing,
            persisted_early: Vec::new(),
        }
    }

    pub fn owner(&self) -> Option<AttachmentOwner> {
        self.owner
    }

    pub fn items(&self) -> &[Attachment] {
        &self.working
    }

    pub fn len(&self) -> usize {
        self.working.len()
    }

    pub fn is_empty(&self) -> bool {
        self.working.is_empty()
    }

    /// Append a picked file. Under `Immediate` policy the attachment is
    /// inserted (unowned) right away.
    ///
    /// # Errors
    /// Returns `Err` if the store rejects the early insert; the working list
    /// is unchanged in that case
    pub async fn add<S: ObjectStore>(&mut self, store: &S, file: PickedFile) -> Result<Uuid> {
        let attachment = file.into_attachment();
        let id = attachment.id;

        if self.policy == PersistencePolicy::Immediate {
            store.insert(attachment.clone()).await?;
            self.persisted_early.push(id);
        }

        debug!(
            "Attachment {} added to working list ({})",
            attachment.file_name, id
        );
        self.working.push(attachment);
        Ok(id)
    }

    /// Add every successfully loaded picker result, in order.
    ///
    /// Returns the number of attachments added.
    ///
    /// # Errors
    /// Returns `Err` if the store rejects an early insert
    pub async fn add_picked<S, I>(&mut self, store: &S, results: I) -> Result<usize>
    where
        S: ObjectStore,
        I: IntoIterator<Item = Result<PickedFile>>,
    {
        let files = accept_picked(results);
        let count = files.len();
        for file in files {
            self.add(store, file).await?;
        }
        Ok(count)
    }

    /// Drop an attachment from the working list. The store is not touched.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.working.len();
        self.working.retain(|a| a.id != id);
        self.working.len() != before
    }

    /// The list to commit.
    pub fn into_working_list(self) -> Vec<Attachment> {
        self.working
    }

    /// Abandon the edit. Returns ids that were inserted early and are now
    /// unowned.
    pub fn cancel(self) -> Vec<Uuid> {
        if !self.persisted_early.is_empty() {
            debug!(
                "Attachment edit cancelled; {} early inserts left unowned",
                self.persisted_early.len()
            );
        }
        self.persisted_early
    }
}
