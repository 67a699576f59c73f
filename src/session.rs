use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::VolumeMatcherConfig;
use crate::error::SessionError;
use crate::playback::ClickTrack;
use crate::sync::{SyncPoint, SyncPointStore};

/// Everything the host needs to open one practice item.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PracticeSession {
    pub title: String,
    pub backing_track: ClickTrack,
    pub volume_matcher: VolumeMatcherConfig,
    /// Anchors for the backing track. When empty, one anchor per bar of the
    /// click track is used.
    pub sync_points: Vec<SyncPoint>,
}

impl PracticeSession {
    pub fn from_yaml_str(source: &str) -> Result<Self, SessionError> {
        let session: Self = serde_yaml::from_str(source)?;
        session.volume_matcher.validate()?;
        Ok(session)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("read session file {}", path.display()))?;
        Self::from_yaml_str(&source).with_context(|| format!("parse session {}", path.display()))
    }

    pub fn sync_store(&self) -> Result<SyncPointStore, SessionError> {
        let points = if self.sync_points.is_empty() {
            self.backing_track.sync_points()
        } else {
            self.sync_points.clone()
        };
        Ok(SyncPointStore::validated(points)?)
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "Untitled practice"
        } else {
            &self.title
        }
    }
}
