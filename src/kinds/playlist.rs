//! The `playlist` kind
//!
//! A playlist cycles through a list of dashboards at a fixed interval.
//!
//! | version | change                                                     |
//! |---------|------------------------------------------------------------|
//! | 0.0     | initial: `uid`, `name`, `interval`, `items[{type, value, title}]` |
//! | 0.1     | items may reference dashboards by uid; item `title` removed |
//!
//! Going back from 0.1, items referencing a dashboard by uid have no 0.0
//! representation and are removed with a warning lacuna.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{FieldPath, JsonCodec};
use crate::error::Result;
use crate::kind::{Kind, KindMeta, Maturity, TypedKind};
use crate::lacuna::{Lacuna, LacunaCode};
use crate::lineage::Lineage;
use crate::migration::{reshape, Migration};
use crate::schema::{FieldDef, FieldType, Fields, Schema};
use crate::version::SyntacticVersion;

pub const NAME: &str = "playlist";

/// Where encoded playlists carry their schema version
pub const VERSION_FIELD: &str = "schemaVersion";

pub const CURRENT_VERSION: SyntacticVersion = SyntacticVersion::new(0, 1);

/// A playlist at the current schema version
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Playlist {
    pub uid: String,
    pub name: String,
    /// Time each dashboard stays on screen, e.g. `5m`
    pub interval: String,
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistItem {
    #[serde(rename = "type")]
    pub item_type: ItemType,
    /// Dashboard id, uid or tag depending on `item_type`
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    DashboardById,
    DashboardByTag,
    DashboardByUid,
}

fn item_fields(types: &[&str], with_title: bool) -> Fields {
    let mut fields = Fields::new();
    fields.insert(
        "type".to_string(),
        FieldDef::string().required().one_of(types.iter().copied()),
    );
    fields.insert("value".to_string(), FieldDef::string().required());
    if with_title {
        fields.insert("title".to_string(), FieldDef::string());
    }
    fields
}

fn schema(version: SyntacticVersion, items: Fields) -> Result<Schema> {
    Schema::builder(version)
        .field("uid", FieldDef::string().required())
        .field("name", FieldDef::string().required())
        .field("interval", FieldDef::string().with_default("5m"))
        .field(
            "items",
            FieldDef::array(FieldType::Struct(items)).with_default(Value::Array(Vec::new())),
        )
        .build()
}

/// Remove items a 0.0 reader cannot resolve
fn drop_uid_items(data: &mut Value) -> Vec<Lacuna> {
    let mut lacunas = Vec::new();
    let Some(Value::Array(items)) = data.get_mut("items") else {
        return lacunas;
    };
    let mut kept = Vec::with_capacity(items.len());
    for (i, item) in items.drain(..).enumerate() {
        if item.get("type").and_then(Value::as_str) == Some("dashboard_by_uid") {
            lacunas.push(Lacuna::warning(
                LacunaCode::Custom("item_dropped".to_string()),
                format!("items[{}]", i),
                format!("dashboard_by_uid item {} has no 0.0 representation", item["value"]),
            ));
        } else {
            kept.push(item);
        }
    }
    *items = kept;
    lacunas
}

/// Lineage of the playlist kind
pub fn lineage() -> Result<Lineage> {
    let v0 = schema(
        SyntacticVersion::new(0, 0),
        item_fields(&["dashboard_by_id", "dashboard_by_tag"], true),
    )?;
    let v1 = schema(
        CURRENT_VERSION,
        item_fields(&["dashboard_by_id", "dashboard_by_tag", "dashboard_by_uid"], false),
    )?;

    let up = v1.fields().clone();
    let down = v0.fields().clone();
    let migration = Migration::new(
        v0.version(),
        v1.version(),
        move |data| reshape(&up, false, data),
        move |mut data| {
            let mut lacunas = drop_uid_items(&mut data);
            let (value, reshaped) = reshape(&down, false, data)?;
            lacunas.extend(reshaped);
            Ok((value, lacunas))
        },
    );

    Lineage::builder(NAME)
        .schema(v0)
        .schema(v1)
        .migration(migration)
        .build()
}

pub fn meta() -> KindMeta {
    KindMeta {
        name: NAME.to_string(),
        plural_name: "playlists".to_string(),
        maturity: Maturity::Merged,
        current_version: CURRENT_VERSION,
    }
}

pub fn kind(lineage: Arc<Lineage>) -> Result<Kind> {
    Kind::new(meta(), lineage)
}

/// JSON codec for playlist payloads
pub fn codec() -> Result<JsonCodec> {
    Ok(JsonCodec::new("playlist.json").with_version_field(FieldPath::parse(VERSION_FIELD)?))
}

/// The playlist kind bound to [`Playlist`]
pub fn new_kind() -> Result<TypedKind<Playlist>> {
    let kind = kind(Arc::new(lineage()?))?;
    TypedKind::new(kind, &Playlist::default(), Arc::new(codec()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lacuna::Severity;
    use crate::translate::Translator;
    use serde_json::json;

    #[test]
    fn test_kind_metadata() {
        let kind = new_kind().unwrap();
        assert_eq!(kind.name(), "playlist");
        assert_eq!(kind.maturity(), Maturity::Merged);
        assert_eq!(kind.lineage().latest_version(), CURRENT_VERSION);
        assert_eq!(kind.convergent_schema().version(), CURRENT_VERSION);
    }

    #[test]
    fn test_decode_legacy_playlist() {
        let kind = new_kind().unwrap();
        let bytes = br#"{
            "schemaVersion": "0.0",
            "uid": "pl-1",
            "name": "Ops",
            "items": [{ "type": "dashboard_by_tag", "value": "ops", "title": "Ops dashboards" }]
        }"#;
        let result = kind.json_value_mux(bytes).unwrap();
        assert_eq!(result.source_version, SyntacticVersion::new(0, 0));
        assert_eq!(result.value.interval, "5m");
        assert_eq!(result.value.items[0].item_type, ItemType::DashboardByTag);

        let paths: Vec<&str> = result.lacunas.iter().map(|l| l.path.as_str()).collect();
        assert_eq!(paths, vec!["interval", "items[0].title"]);
    }

    #[test]
    fn test_untagged_playlist_with_title_detects_legacy() {
        let kind = new_kind().unwrap();
        let bytes = br#"{"uid":"a","name":"b","items":[{"type":"dashboard_by_id","value":"1","title":"t"}]}"#;
        let result = kind.json_value_mux(bytes).unwrap();
        assert_eq!(result.source_version, SyntacticVersion::new(0, 0));
    }

    #[test]
    fn test_backward_drops_uid_items() {
        let lineage = lineage().unwrap();
        let data = json!({
            "uid": "pl-1",
            "name": "Ops",
            "interval": "1m",
            "items": [
                { "type": "dashboard_by_uid", "value": "abc" },
                { "type": "dashboard_by_tag", "value": "ops" }
            ]
        });
        let out = Translator::new(&lineage)
            .translate(data, CURRENT_VERSION, SyntacticVersion::new(0, 0))
            .unwrap();
        assert_eq!(out.value["items"], json!([{ "type": "dashboard_by_tag", "value": "ops" }]));
        assert_eq!(out.lacunas.len(), 1);
        assert_eq!(out.lacunas[0].severity, Severity::Warning);
        assert_eq!(out.lacunas[0].code, LacunaCode::Custom("item_dropped".into()));
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let kind = new_kind().unwrap();
        let playlist = Playlist {
            uid: "pl-2".into(),
            name: "Night shift".into(),
            interval: "10m".into(),
            items: vec![PlaylistItem {
                item_type: ItemType::DashboardByUid,
                value: "xyz".into(),
            }],
        };
        let bytes = kind.encode(&playlist).unwrap();
        let decoded = kind.json_value_mux(&bytes).unwrap();
        assert_eq!(decoded.value, playlist);
        assert!(decoded.lacunas.is_empty());
    }
}
