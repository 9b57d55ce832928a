use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_catalog_tables::Migration),
            Box::new(m20240301_000002_create_supply_request_tables::Migration),
            Box::new(m20240301_000003_create_procurement_tables::Migration),
        ]
    }
}

// Migration implementations

mod m20240301_000001_create_catalog_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Supplier catalog, aligned with entities::catalog_item Model
            manager
                .create_table(
                    Table::create()
                        .table(CatalogItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CatalogItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CatalogItems::SupplierId).uuid().not_null())
                        .col(ColumnDef::new(CatalogItems::Name).string().not_null())
                        .col(ColumnDef::new(CatalogItems::Category).string().not_null())
                        .col(
                            ColumnDef::new(CatalogItems::UnitPrice)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CatalogItems::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CatalogItems::IsReusable)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(CatalogItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CatalogItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CatalogItems::CreatedBy).uuid().null())
                        .col(ColumnDef::new(CatalogItems::UpdatedBy).uuid().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_catalog_items_supplier_id")
                        .table(CatalogItems::Table)
                        .col(CatalogItems::SupplierId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrgInventory::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrgInventory::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrgInventory::CatalogItemId).uuid().not_null())
                        .col(ColumnDef::new(OrgInventory::OrganizationId).uuid().not_null())
                        .col(
                            ColumnDef::new(OrgInventory::QuantityInStock)
                                .integer()
                                .not_null()
                                .default(0)
                                .check(Expr::col(OrgInventory::QuantityInStock).gte(0)),
                        )
                        .col(
                            ColumnDef::new(OrgInventory::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrgInventory::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrgInventory::CreatedBy).uuid().null())
                        .col(ColumnDef::new(OrgInventory::UpdatedBy).uuid().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_org_inventory_catalog_item_id")
                                .from(OrgInventory::Table, OrgInventory::CatalogItemId)
                                .to(CatalogItems::Table, CatalogItems::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // One stock row per (catalog item, organization)
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_org_inventory_item_org")
                        .table(OrgInventory::Table)
                        .col(OrgInventory::CatalogItemId)
                        .col(OrgInventory::OrganizationId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrgInventory::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CatalogItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum CatalogItems {
        Table,
        Id,
        SupplierId,
        Name,
        Category,
        UnitPrice,
        Quantity,
        IsReusable,
        CreatedAt,
        UpdatedAt,
        CreatedBy,
        UpdatedBy,
    }

    #[derive(DeriveIden)]
    pub(super) enum OrgInventory {
        Table,
        Id,
        CatalogItemId,
        OrganizationId,
        QuantityInStock,
        CreatedAt,
        UpdatedAt,
        CreatedBy,
        UpdatedBy,
    }
}

mod m20240301_000002_create_supply_request_tables {

    use super::m20240301_000001_create_catalog_tables::OrgInventory;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_supply_request_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SupplyRequests::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SupplyRequests::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SupplyRequests::NurseId).uuid().not_null())
                        .col(
                            ColumnDef::new(SupplyRequests::OrganizationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplyRequests::IsEmergency)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(SupplyRequests::TotalItems)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(SupplyRequests::Status)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(SupplyRequests::ApprovedBy).uuid().null())
                        .col(
                            ColumnDef::new(SupplyRequests::ApprovedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(SupplyRequests::RejectedBy).uuid().null())
                        .col(
                            ColumnDef::new(SupplyRequests::RejectedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SupplyRequests::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SupplyRequests::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SupplyRequests::CreatedBy).uuid().null())
                        .col(ColumnDef::new(SupplyRequests::UpdatedBy).uuid().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_supply_requests_organization_id")
                        .table(SupplyRequests::Table)
                        .col(SupplyRequests::OrganizationId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(RequestedItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RequestedItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RequestedItems::RequestId).uuid().not_null())
                        .col(
                            ColumnDef::new(RequestedItems::OrgInventoryId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RequestedItems::QuantityRequested)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RequestedItems::QuantityReturned)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(RequestedItems::IsReturned)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(RequestedItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RequestedItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RequestedItems::CreatedBy).uuid().null())
                        .col(ColumnDef::new(RequestedItems::UpdatedBy).uuid().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_requested_items_request_id")
                                .from(RequestedItems::Table, RequestedItems::RequestId)
                                .to(SupplyRequests::Table, SupplyRequests::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_requested_items_org_inventory_id")
                                .from(RequestedItems::Table, RequestedItems::OrgInventoryId)
                                .to(OrgInventory::Table, OrgInventory::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_requested_items_request_id")
                        .table(RequestedItems::Table)
                        .col(RequestedItems::RequestId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(RequestedItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SupplyRequests::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SupplyRequests {
        Table,
        Id,
        NurseId,
        OrganizationId,
        IsEmergency,
        TotalItems,
        Status,
        ApprovedBy,
        ApprovedAt,
        RejectedBy,
        RejectedAt,
        CreatedAt,
        UpdatedAt,
        CreatedBy,
        UpdatedBy,
    }

    #[derive(DeriveIden)]
    enum RequestedItems {
        Table,
        Id,
        RequestId,
        OrgInventoryId,
        QuantityRequested,
        QuantityReturned,
        IsReturned,
        CreatedAt,
        UpdatedAt,
        CreatedBy,
        UpdatedBy,
    }
}

mod m20240301_000003_create_procurement_tables {

    use super::m20240301_000001_create_catalog_tables::CatalogItems;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_procurement_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Create carts table
            manager
                .create_table(
                    Table::create()
                        .table(Carts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Carts::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Carts::InventoryManagerId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Carts::OrganizationId).uuid().not_null())
                        .col(
                            ColumnDef::new(Carts::TotalProducts)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Carts::TotalPrice)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Carts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Carts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Carts::CreatedBy).uuid().null())
                        .col(ColumnDef::new(Carts::UpdatedBy).uuid().null())
                        .to_owned(),
                )
                .await?;

            // Create cart_items table
            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CartItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CartItems::CartId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::CatalogItemId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::SupplierId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(CartItems::TotalPrice)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CartItems::CreatedBy).uuid().null())
                        .col(ColumnDef::new(CartItems::UpdatedBy).uuid().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_cart_id")
                                .from(CartItems::Table, CartItems::CartId)
                                .to(Carts::Table, Carts::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_catalog_item_id")
                                .from(CartItems::Table, CartItems::CatalogItemId)
                                .to(CatalogItems::Table, CatalogItems::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_cart_items_cart_catalog_item")
                        .table(CartItems::Table)
                        .col(CartItems::CartId)
                        .col(CartItems::CatalogItemId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // Create orders table
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::SupplierId).uuid().not_null())
                        .col(ColumnDef::new(Orders::InventoryManagerId).uuid().not_null())
                        .col(ColumnDef::new(Orders::OrganizationId).uuid().not_null())
                        .col(
                            ColumnDef::new(Orders::TotalPrice)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::TotalProducts)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Orders::DeliveredBy).uuid().null())
                        .col(
                            ColumnDef::new(Orders::DeliveredAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Orders::ConfirmedBy).uuid().null())
                        .col(
                            ColumnDef::new(Orders::ConfirmedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::CreatedBy).uuid().null())
                        .col(ColumnDef::new(Orders::UpdatedBy).uuid().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_supplier_id")
                        .table(Orders::Table)
                        .col(Orders::SupplierId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_inventory_manager_id")
                        .table(Orders::Table)
                        .col(Orders::InventoryManagerId)
                        .to_owned(),
                )
                .await?;

            // Create order_items table
            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::CatalogItemId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderItems::UnitPrice)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::TotalPrice)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::CreatedBy).uuid().null())
                        .col(ColumnDef::new(OrderItems::UpdatedBy).uuid().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order_id")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_catalog_item_id")
                                .from(OrderItems::Table, OrderItems::CatalogItemId)
                                .to(CatalogItems::Table, CatalogItems::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Carts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Carts {
        Table,
        Id,
        InventoryManagerId,
        OrganizationId,
        TotalProducts,
        TotalPrice,
        CreatedAt,
        UpdatedAt,
        CreatedBy,
        UpdatedBy,
    }

    #[derive(DeriveIden)]
    enum CartItems {
        Table,
        Id,
        CartId,
        CatalogItemId,
        SupplierId,
        Quantity,
        TotalPrice,
        CreatedAt,
        UpdatedAt,
        CreatedBy,
        UpdatedBy,
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        SupplierId,
        InventoryManagerId,
        OrganizationId,
        TotalPrice,
        TotalProducts,
        Status,
        DeliveredBy,
        DeliveredAt,
        ConfirmedBy,
        ConfirmedAt,
        CreatedAt,
        UpdatedAt,
        CreatedBy,
        UpdatedBy,
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        CatalogItemId,
        Quantity,
        UnitPrice,
        TotalPrice,
        CreatedAt,
        UpdatedAt,
        CreatedBy,
        UpdatedBy,
    }
}
