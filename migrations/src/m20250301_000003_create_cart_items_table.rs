use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250301_000003_create_cart_items_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CartItems::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(CartItems::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(CartItems::UserId).uuid().not_null())
                    .col(ColumnDef::new(CartItems::CourseId).uuid().not_null())
                    .col(ColumnDef::new(CartItems::CategoryId).uuid().null())
                    .col(ColumnDef::new(CartItems::InstructorId).uuid().null())
                    .col(
                        ColumnDef::new(CartItems::PriceSnapshot)
                            .decimal_len(12, 2)
                            .not_null(),
                    )
                    .col(ColumnDef::new(CartItems::AddedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_cart_items_user_course")
                    .table(CartItems::Table)
                    .col(CartItems::UserId)
                    .col(CartItems::CourseId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CartItems::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CartItems {
    Table,
    Id,
    UserId,
    CourseId,
    CategoryId,
    InstructorId,
    PriceSnapshot,
    AddedAt,
}
