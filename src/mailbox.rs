//! Single-slot message channels shared by the renderer and the tracker.
//!
//! A slot is either EMPTY or FULL. Readers consume a message by removing it,
//! which is the only acknowledgement the writer ever sees. File slots stage
//! every write under a temporary name and rename it into place, so a reader
//! observes either the previous message or the new one, never a partial file.

use crate::{
    config::MailboxConfig,
    constants::{QUAD_CORNERS, STAGING_SUFFIX},
    projection::CornerSet,
    Error, Result,
};
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use log::{debug, warn};
use opencv::core::{Mat, Vector};
use opencv::imgcodecs;
use opencv::prelude::*;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Head position message, `[depth, horizontal, vertical]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoseMessage {
    pub pos: [f64; 3],
}

/// Screen corner message: `"0"`..`"3"` to `[x, y]` in renderer pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CornerMessage(pub BTreeMap<String, [f64; 2]>);

/// Schema checks applied after decoding
pub trait Validate {
    /// # Errors
    ///
    /// Returns a description of the first violation found.
    fn validate(&self) -> std::result::Result<(), String>;
}

impl Validate for PoseMessage {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.pos.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(format!("non-finite position {:?}", self.pos))
        }
    }
}

impl Validate for CornerMessage {
    fn validate(&self) -> std::result::Result<(), String> {
        CornerSet::try_from(self).map(|_| ())
    }
}

impl From<&CornerSet> for CornerMessage {
    fn from(corners: &CornerSet) -> Self {
        Self(
            corners
                .points()
                .iter()
                .enumerate()
                .map(|(i, p)| (i.to_string(), [p.x, p.y]))
                .collect(),
        )
    }
}

impl TryFrom<&CornerMessage> for CornerSet {
    type Error = String;

    fn try_from(message: &CornerMessage) -> std::result::Result<Self, Self::Error> {
        if message.0.len() != QUAD_CORNERS {
            return Err(format!("expected {QUAD_CORNERS} corners, found {}", message.0.len()));
        }

        let mut points = [(0.0, 0.0); QUAD_CORNERS];
        for (i, point) in points.iter_mut().enumerate() {
            let [x, y] = *message
                .0
                .get(&i.to_string())
                .ok_or_else(|| format!("missing corner \"{i}\""))?;
            if !x.is_finite() || !y.is_finite() {
                return Err(format!("corner \"{i}\" is not finite"));
            }
            *point = (x, y);
        }
        Ok(CornerSet::new(points))
    }
}

/// A single-message channel
pub trait Slot<T> {
    /// Write `message` only if the slot is EMPTY. Returns whether it was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn post(&self, message: &T) -> Result<bool>;

    /// Write `message`, replacing whatever is in the slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn publish(&self, message: &T) -> Result<()>;

    /// Consume the pending message, leaving the slot EMPTY.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` if the pending message violates its schema.
    fn take(&self) -> Result<Option<T>>;

    /// Whether a message is pending
    fn is_full(&self) -> bool;

    /// Drop any pending message.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn clear(&self) -> Result<()>;
}

/// Path a file is written to before being renamed over `path`.
///
/// The extension is preserved because image encoders are picked by it.
#[must_use]
pub fn staging_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("slot");
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}.{STAGING_SUFFIX}.{ext}"),
        None => format!("{stem}.{STAGING_SUFFIX}"),
    };
    path.with_file_name(name)
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

/// JSON message file
#[derive(Debug)]
pub struct JsonSlot<T> {
    path: PathBuf,
    _message: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned + Validate> JsonSlot<T> {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _message: PhantomData,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn malformed(&self, reason: String) -> Error {
        Error::MalformedMessage {
            slot: self.path.display().to_string(),
            reason,
        }
    }

    /// Read the pending message without consuming it.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMessage` for undecodable or invalid content.
    pub fn read(&self) -> Result<Option<T>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let message: T = serde_json::from_str(&content).map_err(|e| self.malformed(e.to_string()))?;
        message.validate().map_err(|reason| self.malformed(reason))?;
        Ok(Some(message))
    }
}

impl<T: Serialize + DeserializeOwned + Validate> Slot<T> for JsonSlot<T> {
    fn post(&self, message: &T) -> Result<bool> {
        if self.is_full() {
            return Ok(false);
        }
        self.publish(message)?;
        Ok(true)
    }

    fn publish(&self, message: &T) -> Result<()> {
        let staging = staging_path(&self.path);
        fs::write(&staging, serde_json::to_string_pretty(message)?)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }

    fn take(&self) -> Result<Option<T>> {
        match self.read() {
            Ok(message) => {
                if message.is_some() {
                    remove_if_present(&self.path)?;
                }
                Ok(message)
            }
            Err(e @ Error::MalformedMessage { .. }) => {
                // Removed so the next start does not trip over the same file
                warn!("Discarding malformed message at {}", self.path.display());
                remove_if_present(&self.path)?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn is_full(&self) -> bool {
        self.path.exists()
    }

    fn clear(&self) -> Result<()> {
        remove_if_present(&self.path)
    }
}

/// In-process slot for running renderer and tracker in one process
pub struct ChannelSlot<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
}

impl<T> ChannelSlot<T> {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        Self { sender, receiver }
    }
}

impl<T> Default for ChannelSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Slot<T> for ChannelSlot<T> {
    fn post(&self, message: &T) -> Result<bool> {
        match self.sender.try_send(message.clone()) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Disconnected(_)) => Err(Error::InvalidInput("slot disconnected".to_string())),
        }
    }

    fn publish(&self, message: &T) -> Result<()> {
        self.clear()?;
        if self.post(message)? {
            Ok(())
        } else {
            Err(Error::InvalidInput("slot refilled during publish".to_string()))
        }
    }

    fn take(&self) -> Result<Option<T>> {
        match self.receiver.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Error::InvalidInput("slot disconnected".to_string())),
        }
    }

    fn is_full(&self) -> bool {
        !self.receiver.is_empty()
    }

    fn clear(&self) -> Result<()> {
        while self.receiver.try_recv().is_ok() {}
        Ok(())
    }
}

/// Image file slot, overwritten in place by each new render
#[derive(Debug, Clone)]
pub struct ImageSlot {
    path: PathBuf,
}

impl ImageSlot {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.path.exists()
    }

    /// Produce the image with `write` at a staging path, then publish it.
    ///
    /// # Errors
    ///
    /// Propagates errors from `write` and fails if nothing was written.
    pub fn publish_with<F>(&self, write: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let staging = staging_path(&self.path);
        write(&staging)?;
        if !staging.exists() {
            return Err(Error::Render(format!("nothing was written to {}", staging.display())));
        }
        fs::rename(&staging, &self.path)?;
        Ok(())
    }

    /// Encode `image` into the slot.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the rename fails.
    pub fn write(&self, image: &Mat) -> Result<()> {
        self.publish_with(|staging| {
            let path = staging.to_string_lossy();
            if imgcodecs::imwrite(&path, image, &Vector::new())? {
                Ok(())
            } else {
                Err(Error::InvalidInput(format!("OpenCV could not encode {path}")))
            }
        })
    }

    /// Decode the current image; `None` when absent or unreadable
    ///
    /// # Errors
    ///
    /// Only propagates unexpected `OpenCV` failures.
    pub fn read(&self) -> Result<Option<Mat>> {
        if !self.is_full() {
            return Ok(None);
        }
        let image = imgcodecs::imread(&self.path.to_string_lossy(), imgcodecs::IMREAD_COLOR)?;
        if image.empty() {
            debug!("{} exists but could not be decoded", self.path.display());
            return Ok(None);
        }
        Ok(Some(image))
    }

    /// Move the current image to `backup`, emptying this slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails.
    pub fn retire_to(&self, backup: &ImageSlot) -> Result<()> {
        fs::rename(&self.path, &backup.path)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<()> {
        remove_if_present(&self.path)
    }
}

/// All mailbox locations under one shared root directory
#[derive(Debug)]
pub struct Mailbox {
    root: PathBuf,
    /// Tracker → renderer head position
    pub pose: JsonSlot<PoseMessage>,
    /// Renderer → tracker screen corners
    pub corners: JsonSlot<CornerMessage>,
    /// Renderer → tracker raw perspective frame
    pub perspective: ImageSlot,
    /// Renderer's final straight-on composite
    pub composite: ImageSlot,
    /// Tracker's copy of the last consumed perspective frame
    pub backup: ImageSlot,
}

impl Mailbox {
    /// Open the mailbox rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: &Path, names: &MailboxConfig) -> Result<Self> {
        fs::create_dir_all(root)?;
        debug!("Mailbox opened at {}", root.display());

        Ok(Self {
            root: root.to_path_buf(),
            pose: JsonSlot::new(root.join(&names.pose_file)),
            corners: JsonSlot::new(root.join(&names.corners_file)),
            perspective: ImageSlot::new(root.join(&names.perspective_file)),
            composite: ImageSlot::new(root.join(&names.composite_file)),
            backup: ImageSlot::new(root.join(&names.backup_file)),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_path_keeps_extension() {
        assert_eq!(
            staging_path(Path::new("/mb/perspective.jpg")),
            PathBuf::from("/mb/perspective.tmp.jpg")
        );
        assert_eq!(staging_path(Path::new("/mb/pose")), PathBuf::from("/mb/pose.tmp"));
    }

    #[test]
    fn test_pose_message_wire_format() {
        let message: PoseMessage = serde_json::from_str(r#"{ "pos": [15, -1.5, 0.25] }"#).unwrap();
        assert_eq!(message.pos, [15.0, -1.5, 0.25]);

        assert!(serde_json::from_str::<PoseMessage>(r#"{ "pos": [15, 1] }"#).is_err());
        assert!(serde_json::from_str::<PoseMessage>(r#"{ "pos": [15, 1, 2], "x": 1 }"#).is_err());
    }

    #[test]
    fn test_corner_message_round_trip() {
        let corners = CornerSet::new([(1.0, 2.0), (3.0, 4.0), (5.0, 6.0), (7.0, 8.0)]);
        let message = CornerMessage::from(&corners);
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"3\":[7.0,8.0]"));

        let decoded: CornerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(CornerSet::try_from(&decoded).unwrap(), corners);
    }

    #[test]
    fn test_corner_message_requires_four_indices() {
        let message: CornerMessage = serde_json::from_str(r#"{"0":[0,0],"1":[0,1],"2":[1,0]}"#).unwrap();
        assert!(message.validate().is_err());

        let message: CornerMessage = serde_json::from_str(r#"{"0":[0,0],"1":[0,1],"2":[1,0],"4":[1,1]}"#).unwrap();
        assert!(message.validate().unwrap_err().contains("\"3\""));
    }

    #[test]
    fn test_channel_slot_holds_one_message() {
        let slot = ChannelSlot::new();
        assert!(slot.post(&1).unwrap());
        assert!(!slot.post(&2).unwrap());
        assert!(slot.is_full());

        slot.publish(&3).unwrap();
        assert_eq!(slot.take().unwrap(), Some(3));
        assert_eq!(slot.take().unwrap(), None);
        assert!(!slot.is_full());
    }
}
