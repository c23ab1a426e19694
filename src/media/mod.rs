mod storage;

pub use storage::{
    MediaKind, MediaObject, MediaStorage, MediaStorageError, content_type_for, extension_of,
};
