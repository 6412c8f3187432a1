//! Channel registry loading
//!
//! Channels are the remote data sources to back up. The registry is a JSON
//! file consumed once at startup:
//!
//! ```json
//! {
//!   "channels": [
//!     { "id": "sensors-east", "api_key": "k1" },
//!     { "id": "sensors-west", "api_key": "k2" }
//!   ]
//! }
//! ```
//!
//! Channels are immutable once loaded and unique by id; insertion order is
//! preserved (and is the fetch order within a backup cycle).

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// A remote data source identified by an id and authenticated with a
/// per-channel API key
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Channel {
    /// Channel identifier; also the destination file stem (`<id>.csv`)
    pub id: String,
    /// Static API key passed as a query parameter on every fetch
    pub api_key: String,
}

/// The full set of channels to back up each cycle
#[derive(Clone, Debug, Deserialize)]
pub struct ChannelSet {
    /// Channels in registry order
    pub channels: Vec<Channel>,
}

impl ChannelSet {
    /// Load the channel registry from a JSON file
    ///
    /// Fatal on a missing/unreadable file, malformed JSON, an empty channel
    /// list, or a duplicate channel id.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read channel list {}: {e}", path.display()),
            key: None,
        })?;

        let set: ChannelSet = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("cannot parse channel list {}: {e}", path.display()),
            key: None,
        })?;

        set.validate()?;
        Ok(set)
    }

    /// Reject empty registries and duplicate channel ids
    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(Error::config("channel list is empty", "channels"));
        }
        let mut seen = HashSet::new();
        for channel in &self.channels {
            if channel.id.is_empty() || channel.id.contains(['/', '\\']) {
                return Err(Error::config(
                    format!("channel id '{}' is not a valid file stem", channel.id),
                    "channels",
                ));
            }
            if !seen.insert(channel.id.as_str()) {
                return Err(Error::config(
                    format!("duplicate channel id '{}'", channel.id),
                    "channels",
                ));
            }
        }
        Ok(())
    }

    /// Number of channels in the registry
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether the registry is empty (never true after a successful load)
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn write_channels(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("channels.json");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_channels_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_channels(
            &dir,
            r#"{"channels": [
                {"id": "alpha", "api_key": "k1"},
                {"id": "beta", "api_key": "k2"},
                {"id": "gamma", "api_key": "k3"}
            ]}"#,
        );

        let set = ChannelSet::load(&path).unwrap();
        assert_eq!(set.len(), 3);
        let ids: Vec<&str> = set.channels.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "beta", "gamma"]);
        assert_eq!(set.channels[1].api_key, "k2");
    }

    #[test]
    fn missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = ChannelSet::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn malformed_json_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_channels(&dir, "{\"channels\": [");
        assert!(ChannelSet::load(&path).is_err());
    }

    #[test]
    fn empty_channel_list_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_channels(&dir, r#"{"channels": []}"#);
        let err = ChannelSet::load(&path).unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(ref k), .. } if k == "channels"));
    }

    #[test]
    fn channel_id_with_path_separator_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_channels(
            &dir,
            r#"{"channels": [{"id": "../escape", "api_key": "k1"}]}"#,
        );
        assert!(ChannelSet::load(&path).is_err());
    }

    #[test]
    fn duplicate_channel_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_channels(
            &dir,
            r#"{"channels": [
                {"id": "alpha", "api_key": "k1"},
                {"id": "alpha", "api_key": "k2"}
            ]}"#,
        );
        let err = ChannelSet::load(&path).unwrap_err();
        assert!(err.to_string().contains("duplicate channel id 'alpha'"));
    }
}
