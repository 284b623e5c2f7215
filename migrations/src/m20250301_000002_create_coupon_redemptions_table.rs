use sea_orm_migration::prelude::*;

use super::m20250301_000001_create_coupons_table::Coupons;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250301_000002_create_coupon_redemptions_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CouponRedemptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CouponRedemptions::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CouponRedemptions::CouponId).uuid().not_null())
                    .col(ColumnDef::new(CouponRedemptions::UserId).uuid().not_null())
                    .col(ColumnDef::new(CouponRedemptions::PaymentId).uuid().not_null())
                    .col(
                        ColumnDef::new(CouponRedemptions::DiscountAmount)
                            .decimal_len(12, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CouponRedemptions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_coupon_redemptions_coupon")
                            .from(CouponRedemptions::Table, CouponRedemptions::CouponId)
                            .to(Coupons::Table, Coupons::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // One redemption per (coupon, user). The redemption path relies on this
        // index rather than on a read-then-write check.
        manager
            .create_index(
                Index::create()
                    .name("uq_coupon_redemptions_coupon_user")
                    .table(CouponRedemptions::Table)
                    .col(CouponRedemptions::CouponId)
                    .col(CouponRedemptions::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_coupon_redemptions_payment")
                    .table(CouponRedemptions::Table)
                    .col(CouponRedemptions::PaymentId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CouponRedemptions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CouponRedemptions {
    Table,
    Id,
    CouponId,
    UserId,
    PaymentId,
    DiscountAmount,
    CreatedAt,
}
