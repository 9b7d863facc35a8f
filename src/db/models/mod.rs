mod checkpoint;
mod delegation;

pub use checkpoint::SyncCheckpoint;
pub use delegation::Delegation;
