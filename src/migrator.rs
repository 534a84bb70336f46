use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_users_table::Migration),
            Box::new(m20240301_000002_create_menu_and_cart_tables::Migration),
            Box::new(m20240301_000003_create_orders_tables::Migration),
            Box::new(m20240301_000004_create_blog_tables::Migration),
            Box::new(m20240301_000005_create_support_tables::Migration),
            Box::new(m20240301_000006_create_newsletter_tables::Migration),
        ]
    }
}

mod m20240301_000001_create_users_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_users_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(Users::Name).string().not_null())
                        .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                        .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                        .col(ColumnDef::new(Users::Role).string_len(20).not_null())
                        .col(ColumnDef::new(Users::Phone).string().null())
                        .col(ColumnDef::new(Users::Address).text().null())
                        .col(
                            ColumnDef::new(Users::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Users::NewsletterOptIn)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Users::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_users_role")
                        .table(Users::Table)
                        .col(Users::Role)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
        Name,
        Email,
        PasswordHash,
        Role,
        Phone,
        Address,
        IsActive,
        NewsletterOptIn,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_menu_and_cart_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_menu_and_cart_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(MenuItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(MenuItems::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(MenuItems::Name).string().not_null())
                        .col(ColumnDef::new(MenuItems::Description).text().not_null())
                        .col(ColumnDef::new(MenuItems::Category).string().not_null())
                        .col(
                            ColumnDef::new(MenuItems::Price)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(MenuItems::ImageUrl).string().null())
                        .col(
                            ColumnDef::new(MenuItems::IsAvailable)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(MenuItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MenuItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_menu_items_category")
                        .table(MenuItems::Table)
                        .col(MenuItems::Category)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(CartItems::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(CartItems::UserId).uuid().null())
                        .col(ColumnDef::new(CartItems::SessionToken).string().null())
                        .col(ColumnDef::new(CartItems::MenuItemId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::Quantity).integer().not_null())
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
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_menu_item")
                                .from(CartItems::Table, CartItems::MenuItemId)
                                .to(MenuItems::Table, MenuItems::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_cart_items_user_id")
                        .table(CartItems::Table)
                        .col(CartItems::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_cart_items_session_token")
                        .table(CartItems::Table)
                        .col(CartItems::SessionToken)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(MenuItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum MenuItems {
        Table,
        Id,
        Name,
        Description,
        Category,
        Price,
        ImageUrl,
        IsAvailable,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum CartItems {
        Table,
        Id,
        UserId,
        SessionToken,
        MenuItemId,
        Quantity,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_orders_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_orders_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().not_null().primary_key())
                        .col(
                            ColumnDef::new(Orders::OrderNumber)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(32).not_null())
                        .col(ColumnDef::new(Orders::Subtotal).decimal_len(10, 2).not_null())
                        .col(
                            ColumnDef::new(Orders::DeliveryFee)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::Total).decimal_len(10, 2).not_null())
                        .col(ColumnDef::new(Orders::DeliveryAddress).text().not_null())
                        .col(ColumnDef::new(Orders::DeliveryNotes).text().null())
                        .col(ColumnDef::new(Orders::ContactPhone).string().null())
                        .col(ColumnDef::new(Orders::DeliveryPersonId).uuid().null())
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
                        .col(
                            ColumnDef::new(Orders::DeliveredAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            for (name, col) in [
                ("idx_orders_customer_id", Orders::CustomerId),
                ("idx_orders_status", Orders::Status),
                ("idx_orders_delivery_person_id", Orders::DeliveryPersonId),
                ("idx_orders_created_at", Orders::CreatedAt),
            ] {
                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name(name)
                            .table(Orders::Table)
                            .col(col)
                            .to_owned(),
                    )
                    .await?;
            }

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(OrderItems::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::MenuItemId).uuid().null())
                        .col(ColumnDef::new(OrderItems::Name).string().not_null())
                        .col(
                            ColumnDef::new(OrderItems::UnitPrice)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderItems::LineTotal)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
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
                .await
        }
    }

    #[derive(DeriveIden, Clone, Copy)]
    enum Orders {
        Table,
        Id,
        OrderNumber,
        CustomerId,
        Status,
        Subtotal,
        DeliveryFee,
        Total,
        DeliveryAddress,
        DeliveryNotes,
        ContactPhone,
        DeliveryPersonId,
        CreatedAt,
        UpdatedAt,
        DeliveredAt,
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        MenuItemId,
        Name,
        UnitPrice,
        Quantity,
        LineTotal,
    }
}

mod m20240301_000004_create_blog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_blog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(BlogPosts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(BlogPosts::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(BlogPosts::AuthorId).uuid().not_null())
                        .col(ColumnDef::new(BlogPosts::Title).string().not_null())
                        .col(
                            ColumnDef::new(BlogPosts::Slug)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(BlogPosts::Excerpt).text().null())
                        .col(ColumnDef::new(BlogPosts::Content).text().not_null())
                        .col(ColumnDef::new(BlogPosts::Status).string_len(16).not_null())
                        .col(
                            ColumnDef::new(BlogPosts::LikesCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(BlogPosts::CommentsCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(BlogPosts::PublishedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(BlogPosts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BlogPosts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(BlogComments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BlogComments::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(BlogComments::PostId).uuid().not_null())
                        .col(ColumnDef::new(BlogComments::UserId).uuid().not_null())
                        .col(ColumnDef::new(BlogComments::Body).text().not_null())
                        .col(
                            ColumnDef::new(BlogComments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_blog_comments_post")
                                .from(BlogComments::Table, BlogComments::PostId)
                                .to(BlogPosts::Table, BlogPosts::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_blog_comments_post_id")
                        .table(BlogComments::Table)
                        .col(BlogComments::PostId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(BlogLikes::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(BlogLikes::Id).uuid().not_null().primary_key())
                        .col(ColumnDef::new(BlogLikes::PostId).uuid().not_null())
                        .col(ColumnDef::new(BlogLikes::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(BlogLikes::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_blog_likes_post")
                                .from(BlogLikes::Table, BlogLikes::PostId)
                                .to(BlogPosts::Table, BlogPosts::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_blog_likes_post_user")
                        .table(BlogLikes::Table)
                        .col(BlogLikes::PostId)
                        .col(BlogLikes::UserId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BlogLikes::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(BlogComments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(BlogPosts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum BlogPosts {
        Table,
        Id,
        AuthorId,
        Title,
        Slug,
        Excerpt,
        Content,
        Status,
        LikesCount,
        CommentsCount,
        PublishedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum BlogComments {
        Table,
        Id,
        PostId,
        UserId,
        Body,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum BlogLikes {
        Table,
        Id,
        PostId,
        UserId,
        CreatedAt,
    }
}

mod m20240301_000005_create_support_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_support_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CustomerMessages::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CustomerMessages::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(CustomerMessages::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(CustomerMessages::SenderId).uuid().not_null())
                        .col(
                            ColumnDef::new(CustomerMessages::SenderRole)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(ColumnDef::new(CustomerMessages::Body).text().not_null())
                        .col(ColumnDef::new(CustomerMessages::ClientToken).string().null())
                        .col(
                            ColumnDef::new(CustomerMessages::IsRead)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(CustomerMessages::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_customer_messages_thread")
                        .table(CustomerMessages::Table)
                        .col(CustomerMessages::CustomerId)
                        .col(CustomerMessages::CreatedAt)
                        .to_owned(),
                )
                .await?;

            // NULL tokens never collide, so only explicit client tokens are deduplicated
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_customer_messages_client_token")
                        .table(CustomerMessages::Table)
                        .col(CustomerMessages::CustomerId)
                        .col(CustomerMessages::ClientToken)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ActivityLogs::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ActivityLogs::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ActivityLogs::ActivityType).string().not_null())
                        .col(ColumnDef::new(ActivityLogs::Action).string().not_null())
                        .col(ColumnDef::new(ActivityLogs::Description).text().not_null())
                        .col(ColumnDef::new(ActivityLogs::EntityType).string().null())
                        .col(ColumnDef::new(ActivityLogs::EntityId).uuid().null())
                        .col(ColumnDef::new(ActivityLogs::ActorId).uuid().null())
                        .col(
                            ColumnDef::new(ActivityLogs::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_activity_logs_created_at")
                        .table(ActivityLogs::Table)
                        .col(ActivityLogs::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PasswordResets::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PasswordResets::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(PasswordResets::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(PasswordResets::TokenHash)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(PasswordResets::ExpiresAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PasswordResets::UsedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PasswordResets::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PasswordResets::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ActivityLogs::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CustomerMessages::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CustomerMessages {
        Table,
        Id,
        CustomerId,
        SenderId,
        SenderRole,
        Body,
        ClientToken,
        IsRead,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum ActivityLogs {
        Table,
        Id,
        ActivityType,
        Action,
        Description,
        EntityType,
        EntityId,
        ActorId,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum PasswordResets {
        Table,
        Id,
        UserId,
        TokenHash,
        ExpiresAt,
        UsedAt,
        CreatedAt,
    }
}

mod m20240301_000006_create_newsletter_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000006_create_newsletter_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(NewsletterTemplates::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(NewsletterTemplates::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(NewsletterTemplates::Name).string().not_null())
                        .col(
                            ColumnDef::new(NewsletterTemplates::Subject)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(NewsletterTemplates::Body).text().not_null())
                        .col(
                            ColumnDef::new(NewsletterTemplates::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(NewsletterTemplates::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(NewsletterCampaigns::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(NewsletterCampaigns::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(NewsletterCampaigns::TemplateId).uuid().null())
                        .col(
                            ColumnDef::new(NewsletterCampaigns::Subject)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(NewsletterCampaigns::Body).text().not_null())
                        .col(
                            ColumnDef::new(NewsletterCampaigns::Status)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(NewsletterCampaigns::ScheduledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(NewsletterCampaigns::SentAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(NewsletterCampaigns::RecipientsCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(NewsletterCampaigns::CreatedBy)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(NewsletterCampaigns::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(NewsletterCampaigns::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(NewsletterCampaigns::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(NewsletterTemplates::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum NewsletterTemplates {
        Table,
        Id,
        Name,
        Subject,
        Body,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum NewsletterCampaigns {
        Table,
        Id,
        TemplateId,
        Subject,
        Body,
        Status,
        ScheduledAt,
        SentAt,
        RecipientsCount,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }
}
