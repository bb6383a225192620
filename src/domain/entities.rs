//! Domain entities: catalog entries and the change records produced by syncing them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::DomainError;
use super::value_objects::{
    RepositoryIdentity, RepositorySnapshot, format_catalog_date, parse_catalog_date,
};

/// Metadata fields of an entry that the synchronizer reads and writes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryMetadata {
    pub license: Option<String>,
    pub version: Option<String>,
    pub date_last_released: Option<String>,
    pub date_last_commit: Option<String>,
    pub github_stars: Option<u64>,
    /// Curated flag; read by the status service, never written by the synchronizer
    pub archived: Option<bool>,
}

/// Shape of the pre-sync `repository_status` block still present on older entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LegacyRepositoryStatus {
    #[serde(alias = "archived")]
    pub is_archived: bool,
    #[serde(alias = "last_commit_date")]
    pub last_commit: Option<String>,
}

/// Where an entry's maintenance facts come from, resolved once in priority order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataSource {
    SyncedMetadata {
        last_commit_at: DateTime<Utc>,
        is_archived: bool,
    },
    LegacyStatus {
        last_commit_at: Option<DateTime<Utc>>,
        is_archived: bool,
    },
    Unknown,
}

/// A catalog entry as stored on disk.
///
/// The full JSON object is retained so that a write-back touches only the
/// synchronized fields and leaves everything else, including key order, intact.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    slug: String,
    raw: Map<String, Value>,
}

const METADATA_KEY: &str = "metadata";
const RESOURCES_KEY: &str = "resources";

impl CatalogEntry {
    /// Wrap a parsed JSON document; the document must be an object
    pub fn from_value(slug: impl Into<String>, value: Value) -> Result<Self, DomainError> {
        let slug = slug.into();
        match value {
            Value::Object(raw) => Ok(Self { slug, raw }),
            other => Err(DomainError::InvalidEntry {
                entry: slug,
                message: format!("expected a JSON object, found {}", json_kind(&other)),
            }),
        }
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Display name, falling back to the slug
    pub fn name(&self) -> &str {
        self.raw
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.slug)
    }

    pub fn source_code(&self) -> Option<&str> {
        self.raw
            .get("source_code")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Typed view of the metadata block. Each field is read on its own; a
    /// mistyped field reads as absent.
    pub fn metadata(&self) -> EntryMetadata {
        let Some(Value::Object(block)) = self.raw.get(METADATA_KEY) else {
            return EntryMetadata::default();
        };
        let text = |key: &str| block.get(key).and_then(Value::as_str).map(str::to_string);
        EntryMetadata {
            license: text("license"),
            version: text("version"),
            date_last_released: text("date_last_released"),
            date_last_commit: text("date_last_commit"),
            github_stars: block.get("github_stars").and_then(Value::as_u64),
            archived: block.get("archived").and_then(Value::as_bool),
        }
    }

    pub fn legacy_status(&self) -> Option<LegacyRepositoryStatus> {
        self.raw
            .get("repository_status")
            .filter(|v| v.is_object())
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Resolve the metadata source: synced fields first, then the legacy block
    pub fn metadata_source(&self) -> MetadataSource {
        let metadata = self.metadata();
        if let Some(last_commit_at) = metadata
            .date_last_commit
            .as_deref()
            .and_then(|d| parse_catalog_date("date_last_commit", d).ok())
        {
            return MetadataSource::SyncedMetadata {
                last_commit_at,
                is_archived: metadata.archived.unwrap_or(false),
            };
        }

        if let Some(legacy) = self.legacy_status() {
            return MetadataSource::LegacyStatus {
                last_commit_at: legacy
                    .last_commit
                    .as_deref()
                    .and_then(|d| parse_catalog_date("repository_status.last_commit", d).ok()),
                is_archived: legacy.is_archived,
            };
        }

        MetadataSource::Unknown
    }

    /// Write the synchronized fields from `snapshot` into this entry.
    ///
    /// Metadata fields are overwritten when the snapshot has a value for them.
    /// Resource links are only filled in when the entry has none, so curated
    /// links always win.
    pub fn apply_snapshot(
        &mut self,
        identity: &RepositoryIdentity,
        snapshot: &RepositorySnapshot,
    ) -> ChangeRecord {
        let before = self.metadata();

        with_object(&mut self.raw, METADATA_KEY, |metadata| {
            if let Some(license) = &snapshot.license {
                metadata.insert("license".into(), Value::from(license.as_str()));
            }
            if let Some(tag) = &snapshot.latest_version_tag {
                metadata.insert("version".into(), Value::from(tag.as_str()));
            }
            if let Some(released) = &snapshot.last_release_at {
                metadata.insert(
                    "date_last_released".into(),
                    Value::from(format_catalog_date(released)),
                );
            }
            if let Some(commit) = &snapshot.last_commit_at {
                metadata.insert(
                    "date_last_commit".into(),
                    Value::from(format_catalog_date(commit)),
                );
            }
            metadata.insert("github_stars".into(), Value::from(snapshot.star_count));
        });

        let resources = [
            ("website", snapshot.homepage_url.as_deref()),
            ("documentation", snapshot.documentation_url.as_deref()),
            ("issues", snapshot.issues_url.as_deref()),
            ("releases", snapshot.releases_url.as_deref()),
        ];
        if resources.iter().any(|(_, v)| v.is_some_and(|s| !s.trim().is_empty())) {
            with_object(&mut self.raw, RESOURCES_KEY, |existing| {
                for (field, value) in resources {
                    let Some(value) = value.map(str::trim).filter(|s| !s.is_empty()) else {
                        continue;
                    };
                    let occupied = existing
                        .get(field)
                        .and_then(Value::as_str)
                        .is_some_and(|s| !s.trim().is_empty());
                    if !occupied {
                        existing.insert(field.into(), Value::from(value));
                    }
                }
            });
        }

        let after = self.metadata();
        ChangeRecord::between(
            identity.full_name(),
            self.source_code()
                .map(str::to_string)
                .unwrap_or_else(|| identity.web_url()),
            &before,
            &after,
        )
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.raw.clone())
    }

    /// Two-space pretty JSON with a trailing newline
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        self.to_json_with_indent("  ")
    }

    /// Pretty JSON indented with `indent` per level, plus a trailing newline
    pub fn to_json_with_indent(&self, indent: &str) -> Result<String, serde_json::Error> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.raw.serialize(&mut serializer)?;
        let mut out = String::from_utf8(buf)
            .map_err(<serde_json::Error as serde::ser::Error>::custom)?;
        out.push('\n');
        Ok(out)
    }

    /// Same document as `other`, ignoring formatting and key order
    pub fn same_content(&self, other: &Value) -> bool {
        matches!(other, Value::Object(map) if *map == self.raw)
    }
}

/// Run `f` against the object stored at `key`, creating it when absent.
/// Replacing an existing key keeps its position.
fn with_object<F>(raw: &mut Map<String, Value>, key: &str, f: F)
where
    F: FnOnce(&mut Map<String, Value>),
{
    if let Some(Value::Object(existing)) = raw.get_mut(key) {
        f(existing);
        return;
    }
    let mut fresh = Map::new();
    f(&mut fresh);
    raw.insert(key.to_string(), Value::Object(fresh));
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Per-entry summary of what a sync changed; report material only, never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub repository: String,
    pub old_stars: Option<u64>,
    pub new_stars: u64,
    pub star_diff: i64,
    pub old_version: Option<String>,
    pub new_version: Option<String>,
    pub version_changed: bool,
    pub license_changed: bool,
    pub link: String,
}

impl ChangeRecord {
    pub fn between(
        repository: String,
        link: String,
        before: &EntryMetadata,
        after: &EntryMetadata,
    ) -> Self {
        let new_stars = after.github_stars.unwrap_or(0);
        let star_diff = new_stars as i64 - before.github_stars.unwrap_or(0) as i64;
        Self {
            repository,
            old_stars: before.github_stars,
            new_stars,
            star_diff,
            old_version: before.version.clone(),
            new_version: after.version.clone(),
            version_changed: before.version != after.version,
            license_changed: before.license != after.license,
            link,
        }
    }

    pub fn stars_changed(&self) -> bool {
        self.star_diff != 0
    }

    pub fn has_changes(&self) -> bool {
        self.stars_changed() || self.version_changed || self.license_changed
    }
}
