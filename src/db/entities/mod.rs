pub mod auth_state;
pub mod folders;
pub mod imdb_mappings;
pub mod list_items;
pub mod lists;
pub mod media_details;
pub mod media_items;
pub mod pending_operations;
pub mod scan_logs;
pub mod sync_state;

// Re-export entities for convenience
pub use auth_state::{
    ActiveModel as AuthStateActiveModel, Entity as AuthState, Model as AuthStateModel,
};
pub use folders::{ActiveModel as FolderActiveModel, Entity as Folder, Model as FolderModel};
pub use imdb_mappings::{
    ActiveModel as ImdbMappingActiveModel, Entity as ImdbMapping, Model as ImdbMappingModel,
};
pub use list_items::{
    ActiveModel as ListItemActiveModel, Entity as ListItem, Model as ListItemModel,
};
pub use lists::{ActiveModel as ListActiveModel, Entity as List, Model as ListModel};
pub use media_details::{
    ActiveModel as MediaDetailActiveModel, Entity as MediaDetail, Model as MediaDetailModel,
};
pub use media_items::{
    ActiveModel as MediaItemActiveModel, Entity as MediaItem, Model as MediaItemModel,
};
pub use pending_operations::{
    ActiveModel as PendingOperationActiveModel, Entity as PendingOperation,
    Model as PendingOperationModel, PendingKind,
};
pub use scan_logs::{ActiveModel as ScanLogActiveModel, Entity as ScanLog, Model as ScanLogModel};
pub use sync_state::{
    ActiveModel as SyncStateActiveModel, Entity as SyncState, Model as SyncStateModel,
};
