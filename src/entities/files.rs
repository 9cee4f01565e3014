use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One stored file. Keyed by the destination path, which is also the
/// join key to the filesystem layout `<root>/static/<app>/<key>/<id>.<ext>`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "files")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub path: String,
    pub app: String,
    pub key: String,
    pub id: String,
    pub filename: String,
    pub fileurl: String,
    pub dataurl: String,
    pub filesize: i64,
    pub filetype: String,
    pub downloads: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
