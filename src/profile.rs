//! Web-clip configuration profiles.
//!
//! A [`MobileConfig`] is a `Configuration` payload holding one [`WebClip`]
//! per home-screen shortcut. [`MobileConfig::to_document`] renders it as an
//! XML property list, ready to be handed to
//! [`LocalServer::start`](crate::LocalServer::start).
//!
//! # Examples
//!
//! ```rust,ignore
//! use profile_server::profile::{MobileConfig, WebClip};
//!
//! let mut config = MobileConfig::new("Shortcuts", "Home screen shortcuts", "com.example");
//! config.add_clip(WebClip::new("Notes", "notes://", std::fs::read("notes.png")?));
//! server.start(config.to_document()?).await?;
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{errors::ServerError, Document};

pub const CONFIGURATION_PAYLOAD_TYPE: &str = "Configuration";
pub const WEB_CLIP_PAYLOAD_TYPE: &str = "com.apple.webClip.managed";

const PAYLOAD_VERSION: u64 = 1;
const DEFAULT_IDENTIFIER_PREFIX: &str = "profile-server";

fn payload_uuid() -> String {
    Uuid::new_v4()
        .to_string()
        .to_uppercase()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct MobileConfig {
    pub payload_display_name: String,
    pub payload_description: String,
    pub payload_content: Vec<WebClip>,
    #[serde(rename = "PayloadUUID")]
    pub payload_uuid: String,
    pub payload_identifier: String,
    pub has_removal_passcode: bool,
    pub payload_removal_disallowed: bool,
    pub payload_type: String,
    pub payload_version: u64,
}

impl MobileConfig {
    pub fn new(display_name: &str, description: &str, identifier_prefix: &str) -> MobileConfig {
        let payload_uuid = payload_uuid();
        MobileConfig {
            payload_display_name: display_name.to_string(),
            payload_description: description.to_string(),
            payload_content: Vec::new(),
            payload_identifier: format!("{}.{}", identifier_prefix, payload_uuid),
            payload_uuid,
            has_removal_passcode: false,
            payload_removal_disallowed: false,
            payload_type: CONFIGURATION_PAYLOAD_TYPE.to_string(),
            payload_version: PAYLOAD_VERSION,
        }
    }

    pub fn add_clip(&mut self, clip: WebClip) {
        self.payload_content
            .push(clip);
    }

    pub fn clips(&self) -> &[WebClip] {
        &self.payload_content
    }

    /// Renders the profile as an XML property list.
    pub fn to_document(&self) -> Result<Document, ServerError> {
        let mut xml = Vec::new();
        plist::to_writer_xml(&mut xml, self).map_err(|e| ServerError::Profile(e.to_string()))?;
        Ok(Document::from(xml))
    }

    pub fn from_document(document: &Document) -> Result<MobileConfig, ServerError> {
        plist::from_bytes(&document.bytes()).map_err(|e| ServerError::Profile(e.to_string()))
    }
}

/// One home-screen shortcut.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct WebClip {
    pub label: String,
    #[serde(rename = "URL")]
    pub url: String,
    pub icon: plist::Data,
    #[serde(rename = "PayloadUUID")]
    pub payload_uuid: String,
    pub payload_identifier: String,
    pub payload_display_name: String,
    pub payload_description: String,
    pub full_screen: bool,
    pub is_removable: bool,
    pub precomposed: bool,
    pub ignore_manifest_scope: bool,
    pub payload_type: String,
    pub payload_version: u64,
}

impl WebClip {
    pub fn new(label: &str, url: &str, icon: Vec<u8>) -> WebClip {
        let payload_uuid = payload_uuid();
        WebClip {
            label: label.to_string(),
            url: url.to_string(),
            icon: plist::Data::new(icon),
            payload_identifier: format!("{}.{}", WEB_CLIP_PAYLOAD_TYPE, payload_uuid),
            payload_uuid,
            payload_display_name: "Web Clip".to_string(),
            payload_description: "Configures settings for a web clip".to_string(),
            full_screen: true,
            is_removable: true,
            precomposed: true,
            ignore_manifest_scope: false,
            payload_type: WEB_CLIP_PAYLOAD_TYPE.to_string(),
            payload_version: PAYLOAD_VERSION,
        }
    }
}

fn default_identifier_prefix() -> String {
    DEFAULT_IDENTIFIER_PREFIX.to_string()
}

fn default_true() -> bool {
    true
}

/// YAML description of a web-clip profile.
///
/// ```yaml
/// name: Shortcuts
/// description: Home screen shortcuts
/// clips:
///   - label: Notes
///     url: "notes://"
///     icon: icons/notes.png
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProfileSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_identifier_prefix")]
    pub identifier_prefix: String,
    #[serde(default)]
    pub clips: Vec<ClipSpec>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ClipSpec {
    pub label: String,
    pub url: String,
    /// Image file, relative to the profile file.
    #[serde(default)]
    pub icon: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub full_screen: bool,
    #[serde(default = "default_true")]
    pub removable: bool,
}

impl ProfileSpec {
    pub fn from_yaml(yaml: &str) -> Result<ProfileSpec, ServerError> {
        serde_yaml_ng::from_str(yaml).map_err(|e| ServerError::Profile(e.to_string()))
    }

    /// Reads a profile description and builds it, resolving icons next to the file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<MobileConfig, ServerError> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path)
            .map_err(|e| ServerError::Profile(format!("{}: {}", path.display(), e)))?;
        let base_dir = path
            .parent()
            .unwrap_or_else(|| Path::new("."));

        Self::from_yaml(&yaml)?.to_mobile_config(base_dir)
    }

    pub fn to_mobile_config(&self, base_dir: &Path) -> Result<MobileConfig, ServerError> {
        if self
            .name
            .trim()
            .is_empty()
        {
            return Err(ServerError::Profile("profile name is empty".to_string()));
        }

        let mut config = MobileConfig::new(&self.name, &self.description, &self.identifier_prefix);

        for clip in &self.clips {
            let icon = match &clip.icon {
                Some(icon) => {
                    let file = base_dir.join(icon);
                    fs::read(&file)
                        .map_err(|e| ServerError::Profile(format!("{}: {}", file.display(), e)))?
                }
                None => Vec::new(),
            };

            let mut web_clip = WebClip::new(&clip.label, &clip.url, icon);
            web_clip.full_screen = clip.full_screen;
            web_clip.is_removable = clip.removable;
            config.add_clip(web_clip);
        }

        Ok(config)
    }
}
