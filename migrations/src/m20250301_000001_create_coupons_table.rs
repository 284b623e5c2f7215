use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250301_000001_create_coupons_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Coupons::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Coupons::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Coupons::Code).string_len(64).not_null())
                    .col(ColumnDef::new(Coupons::Title).string().not_null())
                    .col(ColumnDef::new(Coupons::Description).text().null())
                    .col(ColumnDef::new(Coupons::CouponType).string_len(32).not_null())
                    .col(ColumnDef::new(Coupons::Value).decimal_len(12, 2).not_null())
                    .col(ColumnDef::new(Coupons::MinimumAmount).decimal_len(12, 2).null())
                    .col(ColumnDef::new(Coupons::MaximumDiscount).decimal_len(12, 2).null())
                    .col(ColumnDef::new(Coupons::UsageLimit).integer().null())
                    .col(
                        ColumnDef::new(Coupons::UsedCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Coupons::ValidFrom).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Coupons::ValidUntil).timestamp_with_time_zone().not_null())
                    .col(
                        ColumnDef::new(Coupons::ApplicableTo)
                            .string_len(32)
                            .not_null()
                            .default("all_courses"),
                    )
                    .col(ColumnDef::new(Coupons::ApplicableIds).json().null())
                    .col(
                        ColumnDef::new(Coupons::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Coupons::CreatedBy).uuid().null())
                    .col(ColumnDef::new(Coupons::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Coupons::UpdatedAt).timestamp_with_time_zone().not_null())
                    // Last line of defence for the capacity invariant; the
                    // conditional increment is what normally enforces it.
                    .check(Expr::cust(
                        "usage_limit IS NULL OR used_count <= usage_limit",
                    ))
                    .check(Expr::cust("valid_from < valid_until"))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_coupons_code")
                    .table(Coupons::Table)
                    .col(Coupons::Code)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Coupons::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Coupons {
    Table,
    Id,
    Code,
    Title,
    Description,
    CouponType,
    Value,
    MinimumAmount,
    MaximumDiscount,
    UsageLimit,
    UsedCount,
    ValidFrom,
    ValidUntil,
    ApplicableTo,
    ApplicableIds,
    IsActive,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}
