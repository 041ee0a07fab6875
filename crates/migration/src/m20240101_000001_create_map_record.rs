//! Create `map_record` table.
//!
//! One row per map id; nested fields are JSON text columns.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MapRecord::Table)
                    .if_not_exists()
                    .col(string(MapRecord::Id).primary_key())
                    .col(text(MapRecord::Labels).not_null())
                    .col(text(MapRecord::Options).not_null())
                    .col(text_null(MapRecord::ImgMeta))
                    .col(string(MapRecord::UpdatedAt).not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(MapRecord::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum MapRecord { Table, Id, Labels, Options, ImgMeta, UpdatedAt }
