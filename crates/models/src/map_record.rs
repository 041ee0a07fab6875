use sea_orm::entity::prelude::*;
use sea_orm::{sea_query::OnConflict, ActiveValue::Set, ConnectionTrait, TransactionTrait};
use serde::{Deserialize, Serialize};

use crate::errors::ModelError;
use crate::record::{MapRecord, RecordColumns};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "map_record")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(column_type = "Text")]
    pub labels: String,
    #[sea_orm(column_type = "Text")]
    pub options: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub img_meta: Option<String>,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn into_record(self) -> Result<MapRecord, ModelError> {
        let columns = RecordColumns {
            labels: self.labels,
            options: self.options,
            img_meta: self.img_meta,
            updated_at: self.updated_at,
        };
        Ok(MapRecord::from_columns(&self.id, &columns)?)
    }
}

fn db_err(e: DbErr) -> ModelError {
    ModelError::Db(e.to_string())
}

pub async fn find<C: ConnectionTrait>(db: &C, id: &str) -> Result<Option<MapRecord>, ModelError> {
    let row = Entity::find_by_id(id.to_string()).one(db).await.map_err(db_err)?;
    row.map(Model::into_record).transpose()
}

/// Insert the row, or replace every column when the id already exists.
pub async fn upsert(db: &DatabaseConnection, id: &str, record: &MapRecord) -> Result<(), ModelError> {
    if id.is_empty() {
        return Err(ModelError::Validation("map id required".into()));
    }
    let columns = record.to_columns()?;
    let am = ActiveModel {
        id: Set(id.to_string()),
        labels: Set(columns.labels),
        options: Set(columns.options),
        img_meta: Set(columns.img_meta),
        updated_at: Set(columns.updated_at),
    };

    let txn = db.begin().await.map_err(db_err)?;
    Entity::insert(am)
        .on_conflict(
            OnConflict::column(Column::Id)
                .update_columns([Column::Labels, Column::Options, Column::ImgMeta, Column::UpdatedAt])
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await
        .map_err(db_err)?;
    txn.commit().await.map_err(db_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect;
    use serde_json::json;

    async fn temp_db() -> anyhow::Result<(DatabaseConnection, std::path::PathBuf)> {
        let path = std::env::temp_dir().join(format!("hexmap_models_{}.db", uuid::Uuid::new_v4()));
        let db = connect(&format!("sqlite://{}?mode=rwc", path.display())).await?;
        Ok((db, path))
    }

    #[tokio::test]
    async fn find_missing_returns_none() -> anyhow::Result<()> {
        let (db, path) = temp_db().await?;
        assert!(find(&db, "nope").await?.is_none());
        drop(db);
        let _ = std::fs::remove_file(path);
        Ok(())
    }

    #[tokio::test]
    async fn upsert_creates_then_replaces() -> anyhow::Result<()> {
        let (db, path) = temp_db().await?;

        let first = MapRecord::new(
            "m1",
            vec![json!({"q": 0, "r": 0, "text": "A"}), json!({"q": 1, "r": 0, "text": "B"})],
            json!({"theme": "dark"}).as_object().cloned().unwrap(),
            Some(json!({"src": "a.png"})),
            "2024-01-01T00:00:00.000000+00:00",
        );
        upsert(&db, "m1", &first).await?;
        assert_eq!(find(&db, "m1").await?, Some(first));

        let second = MapRecord::new(
            "m1",
            vec![json!({"q": 2, "r": 2, "text": "C"})],
            serde_json::Map::new(),
            None,
            "2024-01-02T00:00:00.000000+00:00",
        );
        upsert(&db, "m1", &second).await?;
        let stored = find(&db, "m1").await?.unwrap();
        assert_eq!(stored, second);
        assert_eq!(stored.labels.len(), 1);
        assert_eq!(stored.img_meta, None);

        assert_eq!(Entity::find().all(&db).await?.len(), 1);
        drop(db);
        let _ = std::fs::remove_file(path);
        Ok(())
    }

    #[tokio::test]
    async fn upsert_rejects_empty_id() -> anyhow::Result<()> {
        let (db, path) = temp_db().await?;
        let rec = MapRecord::new("", vec![], serde_json::Map::new(), None, "t");
        assert!(matches!(upsert(&db, "", &rec).await, Err(ModelError::Validation(_))));
        drop(db);
        let _ = std::fs::remove_file(path);
        Ok(())
    }
}
