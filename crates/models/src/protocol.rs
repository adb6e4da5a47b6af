use sea_orm::{entity::prelude::*, sea_query::StringLen, ConnectionTrait, QueryOrder, Set};
use uuid::Uuid;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors;

/// Last-known state of a protocol's service on this host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum ProtocolStatus {
    #[sea_orm(string_value = "uninstalled")]
    Uninstalled,
    #[sea_orm(string_value = "installing")]
    Installing,
    #[sea_orm(string_value = "uninstalling")]
    Uninstalling,
    #[sea_orm(string_value = "running")]
    Running,
    #[sea_orm(string_value = "stopped")]
    Stopped,
    #[sea_orm(string_value = "error")]
    Error,
}

impl ProtocolStatus {
    /// A background install or uninstall owns the row.
    pub fn is_busy(self) -> bool {
        matches!(self, ProtocolStatus::Installing | ProtocolStatus::Uninstalling)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolStatus::Uninstalled => "uninstalled",
            ProtocolStatus::Installing => "installing",
            ProtocolStatus::Uninstalling => "uninstalling",
            ProtocolStatus::Running => "running",
            ProtocolStatus::Stopped => "stopped",
            ProtocolStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ProtocolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "protocol")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub name: String,
    pub display_name: String,
    pub is_enabled: bool,
    pub is_installed: bool,
    pub port: Option<i32>,
    pub ssl_enabled: bool,
    pub config_json: Option<Json>,
    pub status: ProtocolStatus,
    pub error_message: Option<String>,
    pub installed_at: Option<DateTimeWithTimeZone>,
    pub updated_at: DateTimeWithTimeZone,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef { panic!("no relations defined here") }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Protocol-specific settings as a key/value map; a missing or non-object value reads as empty.
    pub fn config_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match &self.config_json {
            Some(serde_json::Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        }
    }
}

/// Entry of the fixed protocol catalog seeded at startup.
#[derive(Clone, Copy, Debug)]
pub struct ProtocolSeed {
    pub name: &'static str,
    pub display_name: &'static str,
    pub port: i32,
}

pub const DEFAULT_PROTOCOLS: &[ProtocolSeed] = &[
    ProtocolSeed { name: "ftp", display_name: "FTP/FTPS", port: 21 },
    ProtocolSeed { name: "sftp", display_name: "SFTP", port: 22 },
    ProtocolSeed { name: "nfs", display_name: "NFS", port: 2049 },
    ProtocolSeed { name: "smb", display_name: "SMB/CIFS", port: 445 },
    ProtocolSeed { name: "webdav", display_name: "WebDAV", port: 8080 },
    ProtocolSeed { name: "s3", display_name: "S3 (MinIO)", port: 9000 },
    ProtocolSeed { name: "nextcloud", display_name: "NextCloud", port: 8081 },
];

pub fn validate_port(port: i32) -> Result<(), errors::ModelError> {
    if !(1..=65535).contains(&port) {
        return Err(errors::ModelError::Validation("port must be in 1..=65535".into()));
    }
    Ok(())
}

pub fn validate_config(config: &serde_json::Value) -> Result<(), errors::ModelError> {
    if !config.is_object() {
        return Err(errors::ModelError::Validation("config must be a JSON object".into()));
    }
    Ok(())
}

pub async fn find_by_name<C: ConnectionTrait>(db: &C, name: &str) -> Result<Option<Model>, errors::ModelError> {
    Ok(Entity::find().filter(Column::Name.eq(name)).one(db).await?)
}

pub async fn list<C: ConnectionTrait>(db: &C) -> Result<Vec<Model>, errors::ModelError> {
    Ok(Entity::find().order_by_asc(Column::Name).all(db).await?)
}

pub async fn create<C: ConnectionTrait>(db: &C, seed: &ProtocolSeed) -> Result<Model, errors::ModelError> {
    if seed.name.trim().is_empty() { return Err(errors::ModelError::Validation("name required".into())); }
    validate_port(seed.port)?;
    let am = ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(seed.name.to_string()),
        display_name: Set(seed.display_name.to_string()),
        is_enabled: Set(false),
        is_installed: Set(false),
        port: Set(Some(seed.port)),
        ssl_enabled: Set(false),
        config_json: Set(None),
        status: Set(ProtocolStatus::Uninstalled),
        error_message: Set(None),
        installed_at: Set(None),
        updated_at: Set(Utc::now().into()),
        version: Set(0),
    };
    Ok(am.insert(db).await?)
}

/// Insert catalog rows that are missing; existing rows are left as they are.
/// Returns how many rows were inserted.
pub async fn seed_defaults<C: ConnectionTrait>(db: &C) -> Result<usize, errors::ModelError> {
    let mut inserted = 0;
    for seed in DEFAULT_PROTOCOLS {
        if find_by_name(db, seed.name).await?.is_none() {
            create(db, seed).await?;
            inserted += 1;
        }
    }
    Ok(inserted)
}

/// Write `next` only if the stored row still carries `expected_version`.
/// `next.version` must already be bumped by the caller.
pub async fn save_versioned<C: ConnectionTrait>(db: &C, next: Model, expected_version: i32) -> Result<Model, errors::ModelError> {
    let id = next.id;
    let am: ActiveModel = next.clone().into();
    let res = Entity::update_many()
        .set(am.reset_all())
        .filter(Column::Id.eq(id))
        .filter(Column::Version.eq(expected_version))
        .exec(db)
        .await?;
    if res.rows_affected == 0 {
        return Err(errors::ModelError::Conflict(format!("protocol {} changed since version {}", next.name, expected_version)));
    }
    Ok(next)
}
