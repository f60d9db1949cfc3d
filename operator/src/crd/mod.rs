pub mod backup;
pub mod cluster;
pub mod group_snapshot;
pub mod snapshot;
