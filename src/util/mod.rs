pub mod image_fetch;
pub mod local_spawn;
pub mod url_utils;
