pub mod repository;

pub use repository::{ProtocolRepository, SeaOrmProtocolRepository};
