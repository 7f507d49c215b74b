use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
#[allow(dead_code)] // Used by SeaORM migration system
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create media_items table
        manager
            .create_table(
                Table::create()
                    .table(MediaItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MediaItems::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MediaItems::MediaType).string().not_null())
                    .col(ColumnDef::new(MediaItems::Source).string().not_null())
                    .col(ColumnDef::new(MediaItems::ImdbId).string())
                    .col(ColumnDef::new(MediaItems::TmdbId).string())
                    .col(ColumnDef::new(MediaItems::HostLibraryId).big_integer())
                    .col(ColumnDef::new(MediaItems::Title).string().not_null())
                    .col(ColumnDef::new(MediaItems::Year).integer())
                    .col(ColumnDef::new(MediaItems::Plot).text())
                    .col(ColumnDef::new(MediaItems::Rating).float())
                    .col(ColumnDef::new(MediaItems::Votes).integer())
                    .col(ColumnDef::new(MediaItems::DurationSeconds).big_integer())
                    .col(ColumnDef::new(MediaItems::Mpaa).string())
                    .col(ColumnDef::new(MediaItems::Genre).string())
                    .col(ColumnDef::new(MediaItems::Director).string())
                    .col(ColumnDef::new(MediaItems::Studio).string())
                    .col(ColumnDef::new(MediaItems::Country).string())
                    .col(ColumnDef::new(MediaItems::Writer).string())
                    .col(ColumnDef::new(MediaItems::PlayUrl).string())
                    .col(ColumnDef::new(MediaItems::Poster).string())
                    .col(ColumnDef::new(MediaItems::Fanart).string())
                    .col(ColumnDef::new(MediaItems::LastSeenScanId).big_integer())
                    .col(
                        ColumnDef::new(MediaItems::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_media_items_imdb_id")
                    .table(MediaItems::Table)
                    .col(MediaItems::ImdbId)
                    .to_owned(),
            )
            .await?;

        // Library rows are unique per (media_type, host_library_id); NULL host
        // ids (ext/manual rows) are distinct under SQLite semantics.
        manager
            .create_index(
                Index::create()
                    .name("idx_media_items_type_host_id")
                    .table(MediaItems::Table)
                    .col(MediaItems::MediaType)
                    .col(MediaItems::HostLibraryId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create media_details table (heavy-metadata cache)
        manager
            .create_table(
                Table::create()
                    .table(MediaDetails::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MediaDetails::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MediaDetails::MediaType).string().not_null())
                    .col(
                        ColumnDef::new(MediaDetails::HostLibraryId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MediaDetails::Details).json().not_null())
                    .col(ColumnDef::new(MediaDetails::FetchedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_media_details_type_host_id")
                    .table(MediaDetails::Table)
                    .col(MediaDetails::MediaType)
                    .col(MediaDetails::HostLibraryId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create folders table
        manager
            .create_table(
                Table::create()
                    .table(Folders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Folders::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Folders::Name).string().not_null())
                    .col(ColumnDef::new(Folders::ParentId).big_integer())
                    .col(
                        ColumnDef::new(Folders::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_folders_parent")
                            .from(Folders::Table, Folders::ParentId)
                            .to(Folders::Table, Folders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_folders_parent_name")
                    .table(Folders::Table)
                    .col(Folders::ParentId)
                    .col(Folders::Name)
                    .to_owned(),
            )
            .await?;

        // Create lists table
        manager
            .create_table(
                Table::create()
                    .table(Lists::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Lists::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Lists::FolderId).big_integer())
                    .col(ColumnDef::new(Lists::Name).string().not_null())
                    .col(
                        ColumnDef::new(Lists::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_lists_folder")
                            .from(Lists::Table, Lists::FolderId)
                            .to(Folders::Table, Folders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_lists_folder_name")
                    .table(Lists::Table)
                    .col(Lists::FolderId)
                    .col(Lists::Name)
                    .to_owned(),
            )
            .await?;

        // Create list_items table
        manager
            .create_table(
                Table::create()
                    .table(ListItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ListItems::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ListItems::ListId).big_integer().not_null())
                    .col(
                        ColumnDef::new(ListItems::MediaItemId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ListItems::Position).big_integer().not_null())
                    .col(
                        ColumnDef::new(ListItems::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_list_items_list")
                            .from(ListItems::Table, ListItems::ListId)
                            .to(Lists::Table, Lists::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_list_items_media_item")
                            .from(ListItems::Table, ListItems::MediaItemId)
                            .to(MediaItems::Table, MediaItems::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_list_items_list_media")
                    .table(ListItems::Table)
                    .col(ListItems::ListId)
                    .col(ListItems::MediaItemId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_list_items_list_position")
                    .table(ListItems::Table)
                    .col(ListItems::ListId)
                    .col(ListItems::Position)
                    .to_owned(),
            )
            .await?;

        // Create imdb_mappings table
        manager
            .create_table(
                Table::create()
                    .table(ImdbMappings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ImdbMappings::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ImdbMappings::ImdbId).string().not_null())
                    .col(
                        ColumnDef::new(ImdbMappings::HostLibraryId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ImdbMappings::MediaType).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_imdb_mappings_triple")
                    .table(ImdbMappings::Table)
                    .col(ImdbMappings::ImdbId)
                    .col(ImdbMappings::HostLibraryId)
                    .col(ImdbMappings::MediaType)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create sync_state table (singleton)
        manager
            .create_table(
                Table::create()
                    .table(SyncStates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncStates::Id)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncStates::LocalSnapshot).json().not_null())
                    .col(ColumnDef::new(SyncStates::ServerVersion).string())
                    .col(ColumnDef::new(SyncStates::ServerEtag).string())
                    .col(ColumnDef::new(SyncStates::LastSyncAt).timestamp())
                    .to_owned(),
            )
            .await?;

        // Create pending_operations table
        manager
            .create_table(
                Table::create()
                    .table(PendingOperations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PendingOperations::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PendingOperations::Operation)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PendingOperations::ImdbIds).json().not_null())
                    .col(
                        ColumnDef::new(PendingOperations::IdempotencyKey)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PendingOperations::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PendingOperations::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Create auth_state table (singleton)
        manager
            .create_table(
                Table::create()
                    .table(AuthStates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuthStates::Id)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AuthStates::AccessToken).text())
                    .col(ColumnDef::new(AuthStates::TokenType).string().not_null())
                    .col(ColumnDef::new(AuthStates::Scope).string())
                    .col(ColumnDef::new(AuthStates::ServerUrl).string())
                    .col(ColumnDef::new(AuthStates::UserId).string())
                    .col(ColumnDef::new(AuthStates::ExpiresAt).timestamp())
                    .to_owned(),
            )
            .await?;

        // Create scan_logs table
        manager
            .create_table(
                Table::create()
                    .table(ScanLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScanLogs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ScanLogs::ScanType).string().not_null())
                    .col(ColumnDef::new(ScanLogs::StartedAt).timestamp().not_null())
                    .col(ColumnDef::new(ScanLogs::FinishedAt).timestamp())
                    .col(
                        ColumnDef::new(ScanLogs::ItemsAdded)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ScanLogs::ItemsUpdated)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ScanLogs::ItemsRemoved)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ScanLogs::Error).text())
                    .col(ColumnDef::new(ScanLogs::HostVersion).integer())
                    .col(ColumnDef::new(ScanLogs::ChangeToken).string())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ScanLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AuthStates::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PendingOperations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SyncStates::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ImdbMappings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ListItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Lists::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Folders::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MediaDetails::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MediaItems::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(Iden)]
enum MediaItems {
    Table,
    Id,
    MediaType,
    Source,
    ImdbId,
    TmdbId,
    HostLibraryId,
    Title,
    Year,
    Plot,
    Rating,
    Votes,
    DurationSeconds,
    Mpaa,
    Genre,
    Director,
    Studio,
    Country,
    Writer,
    PlayUrl,
    Poster,
    Fanart,
    LastSeenScanId,
    CreatedAt,
}

#[derive(Iden)]
enum MediaDetails {
    Table,
    Id,
    MediaType,
    HostLibraryId,
    Details,
    FetchedAt,
}

#[derive(Iden)]
enum Folders {
    Table,
    Id,
    Name,
    ParentId,
    CreatedAt,
}

#[derive(Iden)]
enum Lists {
    Table,
    Id,
    FolderId,
    Name,
    CreatedAt,
}

#[derive(Iden)]
enum ListItems {
    Table,
    Id,
    ListId,
    MediaItemId,
    Position,
    CreatedAt,
}

#[derive(Iden)]
enum ImdbMappings {
    Table,
    Id,
    ImdbId,
    HostLibraryId,
    MediaType,
}

#[derive(Iden)]
enum SyncStates {
    #[iden = "sync_state"]
    Table,
    Id,
    LocalSnapshot,
    ServerVersion,
    ServerEtag,
    LastSyncAt,
}

#[derive(Iden)]
enum PendingOperations {
    Table,
    Id,
    Operation,
    ImdbIds,
    IdempotencyKey,
    RetryCount,
    CreatedAt,
}

#[derive(Iden)]
enum AuthStates {
    #[iden = "auth_state"]
    Table,
    Id,
    AccessToken,
    TokenType,
    Scope,
    ServerUrl,
    UserId,
    ExpiresAt,
}

#[derive(Iden)]
enum ScanLogs {
    Table,
    Id,
    ScanType,
    StartedAt,
    FinishedAt,
    ItemsAdded,
    ItemsUpdated,
    ItemsRemoved,
    Error,
    HostVersion,
    ChangeToken,
}
