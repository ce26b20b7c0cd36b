use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(
            m20240101_000001_create_crypto_payments_table::Migration,
        )]
    }
}

mod m20240101_000001_create_crypto_payments_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_crypto_payments_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CryptoPayments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CryptoPayments::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CryptoPayments::TransactionId)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(CryptoPayments::OrderId).string().not_null())
                        .col(
                            ColumnDef::new(CryptoPayments::IdempotencyKey)
                                .string()
                                .null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(CryptoPayments::AmountCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CryptoPayments::BaseAmountCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CryptoPayments::TaxAmountCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CryptoPayments::TaxRatePercentage)
                                .decimal_len(9, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(CryptoPayments::Currency).string().not_null())
                        .col(ColumnDef::new(CryptoPayments::Status).string().not_null())
                        .col(
                            ColumnDef::new(CryptoPayments::ReceivingAddress)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CryptoPayments::TokenContractAddress)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(CryptoPayments::Company).string().null())
                        .col(ColumnDef::new(CryptoPayments::Address).string().not_null())
                        .col(ColumnDef::new(CryptoPayments::AddressLine2).string().null())
                        .col(ColumnDef::new(CryptoPayments::City).string().not_null())
                        .col(ColumnDef::new(CryptoPayments::State).string().not_null())
                        .col(ColumnDef::new(CryptoPayments::Zipcode).string().not_null())
                        .col(ColumnDef::new(CryptoPayments::Country).string().not_null())
                        .col(ColumnDef::new(CryptoPayments::OrderItems).string().null())
                        .col(
                            ColumnDef::new(CryptoPayments::Quantity)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(CryptoPayments::Metadata).json().null())
                        .col(
                            ColumnDef::new(CryptoPayments::Pounds)
                                .decimal_len(10, 2)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CryptoPayments::Length)
                                .decimal_len(10, 2)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CryptoPayments::Width)
                                .decimal_len(10, 2)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CryptoPayments::Height)
                                .decimal_len(10, 2)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CryptoPayments::TransactionHash)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CryptoPayments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CryptoPayments::ConfirmedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_crypto_payments_created_at")
                        .table(CryptoPayments::Table)
                        .col(CryptoPayments::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_crypto_payments_status")
                        .table(CryptoPayments::Table)
                        .col(CryptoPayments::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CryptoPayments::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum CryptoPayments {
        Table,
        Id,
        TransactionId,
        OrderId,
        IdempotencyKey,
        AmountCents,
        BaseAmountCents,
        TaxAmountCents,
        TaxRatePercentage,
        Currency,
        Status,
        ReceivingAddress,
        TokenContractAddress,
        Company,
        Address,
        // Entity column is `address_line_2`; the derived identifier would
        // drop the second underscore.
        #[iden = "address_line_2"]
        AddressLine2,
        City,
        State,
        Zipcode,
        Country,
        OrderItems,
        Quantity,
        Metadata,
        Pounds,
        Length,
        Width,
        Height,
        TransactionHash,
        CreatedAt,
        ConfirmedAt,
    }
}
