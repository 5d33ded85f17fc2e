pub mod model;
pub mod store;

pub use model::{Profile, MAX_PLAYER_NAME_LEN};
pub use store::ProfileStore;
