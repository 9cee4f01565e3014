use crate::entities::{files, prelude::*};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};

/// Create-or-overwrite keyed by storage path. A record appears on first
/// successful placement; reusing the same path replaces every attribute
/// except the download counter.
pub async fn upsert(db: &DatabaseConnection, record: files::Model) -> Result<(), DbErr> {
    let active = files::ActiveModel {
        path: Set(record.path),
        app: Set(record.app),
        key: Set(record.key),
        id: Set(record.id),
        filename: Set(record.filename),
        fileurl: Set(record.fileurl),
        dataurl: Set(record.dataurl),
        filesize: Set(record.filesize),
        filetype: Set(record.filetype),
        downloads: Set(record.downloads),
    };

    Files::insert(active)
        .on_conflict(
            OnConflict::column(files::Column::Path)
                .update_columns([
                    files::Column::App,
                    files::Column::Key,
                    files::Column::Id,
                    files::Column::Filename,
                    files::Column::Fileurl,
                    files::Column::Dataurl,
                    files::Column::Filesize,
                    files::Column::Filetype,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Looks a record up by its composite address (app, key, generated id).
pub async fn find_by_address(
    db: &DatabaseConnection,
    app: &str,
    key: &str,
    id: &str,
) -> Result<Option<files::Model>, DbErr> {
    Files::find()
        .filter(files::Column::App.eq(app))
        .filter(files::Column::Key.eq(key))
        .filter(files::Column::Id.eq(id))
        .one(db)
        .await
}

/// Counts a download. The increment happens in the database, not on a
/// loaded model, so concurrent downloads of the same file never lose an
/// update to a stale read.
pub async fn increment_downloads(
    db: &DatabaseConnection,
    record: files::Model,
) -> Result<files::Model, DbErr> {
    Files::update_many()
        .col_expr(
            files::Column::Downloads,
            Expr::col(files::Column::Downloads).add(1),
        )
        .filter(files::Column::Path.eq(record.path.as_str()))
        .exec(db)
        .await?;

    Files::find_by_id(record.path)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound("file record vanished mid-download".to_string()))
}

/// Removes a record whose backing file turned out to be missing.
pub async fn delete_by_path(db: &DatabaseConnection, path: &str) -> Result<(), DbErr> {
    Files::delete_by_id(path).exec(db).await?;
    Ok(())
}

pub async fn list_scope(
    db: &DatabaseConnection,
    app: &str,
    key: &str,
) -> Result<Vec<files::Model>, DbErr> {
    Files::find()
        .filter(files::Column::App.eq(app))
        .filter(files::Column::Key.eq(key))
        .all(db)
        .await
}
