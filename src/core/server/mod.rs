pub mod players;
pub mod query;

pub use players::{OnlinePlayers, PlayerRecord, PlayersClient, PlayersSource};
pub use query::{query_full_stat, QueryStats};
